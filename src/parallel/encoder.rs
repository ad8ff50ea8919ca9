//! Parallel encode pipeline (spec.md §4.7): slice the input into pages,
//! compress pages concurrently, and reassemble them in page order while the
//! index tower and footer are built from the recorded offsets.
//!
//! The teacher's streaming encoder in [`crate::ragzip::writer`] pairs one
//! `MemberWriter` with the single output sink and advances it byte by byte;
//! here every page is compressed into its own in-memory buffer by a
//! [`crate::parallel::threadpool::BoundedPool`] worker, and a dedicated
//! orderer thread appends the finished buffers to the sink strictly in page
//! order, recording each page's start offset for the tower built afterward.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::mpsc;
use std::thread;

use flate2::Compression;

use crate::config;
use crate::error::{RagzipError, Result};
use crate::gzip::member;
use crate::parallel::threadpool::BoundedPool;
use crate::ragzip::format;
use crate::ragzip::metadata::{self, Extension, Footer};

/// Tuning knobs for [`encode_parallel`], mirroring the CLI's `-P`/`-I`/worker
/// count flags plus the back-pressure bound of spec.md §4.7.
pub struct ParallelEncodeOptions {
    pub page_exp: u32,
    pub index_exp: u32,
    pub nb_workers: usize,
    pub max_buffered_pages: usize,
}

impl ParallelEncodeOptions {
    pub fn validate(&self) -> Result<()> {
        format::validate_page_index_exponents(self.page_exp, self.index_exp)?;
        if self.page_exp > config::MAX_PARALLEL_PAGE_EXPONENT {
            return Err(RagzipError::Capacity(format!(
                "parallel mode requires P<={}, got {}",
                config::MAX_PARALLEL_PAGE_EXPONENT,
                self.page_exp
            )));
        }
        Ok(())
    }
}

/// A compressed page arriving at the orderer out of order; `Ord` is reversed
/// so a `BinaryHeap<OrderedPage>` behaves as a min-heap by `page_id`.
struct OrderedPage {
    page_id: u64,
    bytes: Vec<u8>,
}

impl PartialEq for OrderedPage {
    fn eq(&self, other: &Self) -> bool {
        self.page_id == other.page_id
    }
}
impl Eq for OrderedPage {}
impl PartialOrd for OrderedPage {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for OrderedPage {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.page_id.cmp(&self.page_id)
    }
}

/// A `Write` wrapper that tracks the absolute byte count written through it,
/// so the caller always knows the file offset the next member will start
/// at without needing a seekable sink (same purpose as the streaming
/// writer's `CountingSink`).
struct PosTrackingSink<W: Write> {
    inner: W,
    count: u64,
}

impl<W: Write> Write for PosTrackingSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Encodes `input` into a ragzip container, compressing pages with
/// `opts.nb_workers` worker threads. `input` must be seekable so the main
/// thread can dispatch page-sized reads without buffering the whole file.
pub fn encode_parallel<R, W>(mut input: R, sink: W, opts: ParallelEncodeOptions, extensions: Vec<Extension>) -> Result<W>
where
    R: Read + Seek,
    W: Write + Send + 'static,
{
    opts.validate()?;

    let total_size = input.seek(SeekFrom::End(0))?;
    input.seek(SeekFrom::Start(0))?;
    let page_size = format::page_size(opts.page_exp);
    let npages = if total_size == 0 { 0 } else { (total_size + page_size - 1) / page_size };

    if npages == 0 {
        let tracked = PosTrackingSink { inner: sink, count: 0 };
        return finish_parallel(tracked, Vec::new(), opts.page_exp, opts.index_exp, 0, extensions);
    }

    // Bounded so a worker's `tx.send` blocks once this many finished pages are
    // sitting ahead of the orderer, giving the dispatch loop below real
    // back-pressure instead of letting completed page buffers pile up
    // unboundedly while the orderer is still draining earlier pages.
    let (tx, rx) = mpsc::sync_channel::<(u64, Vec<u8>)>(opts.max_buffered_pages.max(1));
    let orderer = thread::spawn(move || -> Result<(PosTrackingSink<W>, Vec<u64>)> {
        use std::collections::BinaryHeap;
        let mut heap = BinaryHeap::new();
        let mut next_wanted = 0u64;
        let mut offsets = Vec::with_capacity(npages as usize);
        let mut sink = PosTrackingSink { inner: sink, count: 0 };
        for (page_id, bytes) in rx {
            heap.push(OrderedPage { page_id, bytes });
            while let Some(top) = heap.peek() {
                if top.page_id != next_wanted {
                    break;
                }
                let page = heap.pop().unwrap();
                offsets.push(sink.count);
                sink.write_all(&page.bytes)?;
                next_wanted += 1;
            }
        }
        Ok((sink, offsets))
    });

    let pool = BoundedPool::new(opts.nb_workers.max(1), opts.max_buffered_pages.max(1))?;
    for page_id in 0..npages {
        let mut buf = vec![0u8; page_size as usize];
        let want = ((total_size - page_id * page_size).min(page_size)) as usize;
        input.read_exact(&mut buf[..want])?;
        buf.truncate(want);

        let tx = tx.clone();
        pool.submit(move || -> Result<()> {
            let mut out = Vec::new();
            let mut mw = member::MemberWriter::begin(&mut out, Compression::default())?;
            mw.write_all(&buf)?;
            mw.finish()?;
            tx.send((page_id, out)).map_err(|_| RagzipError::concurrency("orderer thread is gone", RagzipError::format("channel closed")))?;
            Ok(())
        });
    }
    drop(tx);
    pool.join()?;

    let (tracked, offsets) = orderer
        .join()
        .map_err(|_| RagzipError::concurrency("orderer thread panicked", RagzipError::format("panic")))??;

    finish_parallel(tracked, offsets, opts.page_exp, opts.index_exp, total_size, extensions)
}

/// Builds the index tower, extensions, and footer over `sink` (already
/// positioned right after the last page member), given page start offsets
/// in page-id order. Grouping `offsets` into `index_fanout`-sized chunks
/// bottom-up produces the same tree shape as the streaming writer's
/// incremental cascade ([`crate::ragzip::writer::RagzipWriter::add_record`]);
/// doing it in one pass here is simpler because every offset is already
/// known up front, whereas the streaming writer discovers them one at a
/// time.
fn finish_parallel<W: Write>(mut sink: PosTrackingSink<W>, offsets: Vec<u64>, page_exp: u32, index_exp: u32, uncompressed_size: u64, extensions: Vec<Extension>) -> Result<W> {
    let (levels, top_index_offset) = if offsets.len() <= 1 {
        (0u32, offsets.first().copied().unwrap_or(0))
    } else {
        build_index_tower(&mut sink, &offsets, index_exp)?
    };

    let mut extensions_tail_offset: i64 = -1;
    let mut previous: i64 = -1;
    for ext in extensions {
        if ext.payload.len() > config::MAX_EXTENSION_PAYLOAD {
            crate::display!(1, "warning: dropping oversized extension id={} in parallel finish", ext.id);
            continue;
        }
        let offset = sink.count;
        let mut e = ext;
        e.previous_extension_offset = previous;
        e.write_member(&mut sink)?;
        previous = offset as i64;
        extensions_tail_offset = offset as i64;
    }

    let footer = Footer::new(levels, index_exp, page_exp, uncompressed_size, top_index_offset, extensions_tail_offset);
    footer.write_member(&mut sink)?;

    Ok(sink.inner)
}

fn build_index_tower<W: Write>(sink: &mut PosTrackingSink<W>, offsets: &[u64], index_exp: u32) -> Result<(u32, u64)> {
    let fanout = format::index_fanout(index_exp) as usize;
    let mut current: Vec<u64> = offsets.to_vec();
    let mut level = 1u32;
    loop {
        let mut next_level = Vec::new();
        for chunk in current.chunks(fanout) {
            let member_offset = sink.count;
            metadata::write_index_member(sink, chunk)?;
            next_level.push(member_offset);
        }
        if next_level.len() == 1 {
            return Ok((level, next_level[0]));
        }
        current = next_level;
        level += 1;
        if level > config::MAX_LEVELS {
            return Err(RagzipError::Capacity("index tower exceeds maximum levels".into()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ragzip::reader::RagzipReader;
    use std::io::Cursor;

    #[test]
    fn parallel_encode_round_trips_through_reader() {
        let data: Vec<u8> = (0..20000u32).map(|i| (i % 251) as u8).collect();
        let opts = ParallelEncodeOptions { page_exp: 10, index_exp: 3, nb_workers: 4, max_buffered_pages: 4 };
        let out = encode_parallel(Cursor::new(data.clone()), Vec::new(), opts, Vec::new()).unwrap();

        let mut reader = RagzipReader::open(Cursor::new(out)).unwrap();
        assert_eq!(reader.uncompressed_size(), data.len() as u64);
        let mut got = Vec::new();
        io::Read::read_to_end(&mut reader, &mut got).unwrap();
        assert_eq!(got, data);
    }

    #[test]
    fn empty_input_produces_footer_only_file() {
        let opts = ParallelEncodeOptions { page_exp: 10, index_exp: 3, nb_workers: 2, max_buffered_pages: 2 };
        let out = encode_parallel(Cursor::new(Vec::<u8>::new()), Vec::new(), opts, Vec::new()).unwrap();
        assert_eq!(out.len() as u64, config::FOOTER_MEMBER_SIZE);
    }

    #[test]
    fn single_page_elides_level_one_like_the_streaming_writer() {
        let data = vec![5u8; 100];
        let opts = ParallelEncodeOptions { page_exp: 10, index_exp: 3, nb_workers: 2, max_buffered_pages: 2 };
        let out = encode_parallel(Cursor::new(data.clone()), Vec::new(), opts, Vec::new()).unwrap();
        let reader = RagzipReader::open(Cursor::new(out)).unwrap();
        assert_eq!(reader.levels(), 0);
    }

    #[test]
    fn rejects_page_exponent_too_large_for_parallel_mode() {
        let opts = ParallelEncodeOptions { page_exp: 25, index_exp: 3, nb_workers: 2, max_buffered_pages: 2 };
        assert!(opts.validate().is_err());
    }
}
