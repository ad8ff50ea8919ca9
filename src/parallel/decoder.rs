//! Parallel decode pipeline (spec.md §4.8): walk the index tree once to
//! collect every page's start offset, then decompress pages concurrently
//! and write each one directly to its fixed logical offset. Unlike the
//! encoder, no orderer stage is needed — a page's final offset in the
//! output is already known before decompression starts, so workers can
//! write straight into a shared, seekable sink.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use crate::error::{RagzipError, Result};
use crate::gzip::member;
use crate::parallel::threadpool::BoundedPool;
use crate::ragzip::format;
use crate::ragzip::reader::RagzipReader;

/// Mutex-guarded sink shared by every unzipper worker. True lock-free
/// positional writes would need a raw file descriptor (`pwrite`-style);
/// without the platform-specific code that requires, writes are serialized
/// through the lock while decompression — the expensive part — still runs
/// fully in parallel across workers.
struct SharedOutput<W: Write + Seek> {
    inner: Mutex<W>,
}

impl<W: Write + Seek> SharedOutput<W> {
    fn write_page(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        let mut w = self.inner.lock().unwrap();
        w.seek(SeekFrom::Start(offset))?;
        w.write_all(bytes)?;
        Ok(())
    }
}

/// Descends the whole index tree breadth-by-level and returns every page's
/// start offset, in ascending page-id order. Level `k`'s entries are
/// visited left to right, matching the order pages were appended in, so the
/// resulting list's index *is* the page id.
fn walk_pages<R: Read + Seek>(reader: &mut RagzipReader<R>) -> Result<Vec<u64>> {
    if reader.uncompressed_size() == 0 {
        return Ok(Vec::new());
    }
    if reader.levels() == 0 {
        return Ok(vec![reader.top_index_offset()]);
    }
    let mut frontier = vec![reader.top_index_offset()];
    for _ in 0..reader.levels() {
        let mut next = Vec::with_capacity(frontier.len() * 2);
        for offset in frontier {
            next.extend(reader.read_index_entries_at(offset)?);
        }
        frontier = next;
    }
    Ok(frontier)
}

/// Decodes a ragzip container into `sink`, dispatching one job per page to
/// `nb_workers` worker threads. `open_source` is called once per page job to
/// obtain an independent handle onto the same underlying bytes (e.g.
/// re-opening the same path), since a single `R` cannot be shared mutably
/// across threads.
pub fn decode_parallel<R, W, F>(open_source: F, sink: W, nb_workers: usize) -> Result<W>
where
    R: Read + Seek,
    W: Write + Seek + Send + 'static,
    F: Fn() -> io::Result<R> + Send + Sync + 'static,
{
    let mut walker = RagzipReader::open(open_source()?)?;
    let page_exp = walker.page_exponent();
    let page_size = format::page_size(page_exp);
    let uncompressed_size = walker.uncompressed_size();
    let page_offsets = walk_pages(&mut walker)?;
    drop(walker);

    let shared = Arc::new(SharedOutput { inner: Mutex::new(sink) });
    let open_source = Arc::new(open_source);
    let pool = BoundedPool::new(nb_workers.max(1), nb_workers.max(1) * 2)?;

    let last_page_id = page_offsets.len().saturating_sub(1) as u64;
    for (page_id, member_offset) in page_offsets.into_iter().enumerate() {
        let page_id = page_id as u64;
        let expected_len = if page_id == last_page_id {
            uncompressed_size - page_id * page_size
        } else {
            page_size
        };
        let shared = Arc::clone(&shared);
        let open_source = Arc::clone(&open_source);
        pool.submit(move || -> Result<()> {
            let mut source = open_source()?;
            source.seek(SeekFrom::Start(member_offset))?;
            let (mut decoder, _header) = member::MemberReader::open(source)?;
            let mut bytes = Vec::with_capacity(expected_len as usize);
            decoder.read_to_end(&mut bytes)?;
            if bytes.len() as u64 != expected_len {
                return Err(RagzipError::integrity_at(
                    format!("page {page_id} decoded to {} bytes, expected {expected_len}", bytes.len()),
                    member_offset,
                ));
            }
            shared.write_page(page_id * page_size, &bytes)
        });
    }
    pool.join()?;

    let shared = Arc::try_unwrap(shared)
        .map_err(|_| ())
        .expect("every page worker has finished and released its Arc clone by the time pool.join() returns");
    Ok(shared.inner.into_inner().unwrap())
}
