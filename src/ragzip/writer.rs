//! Streaming ragzip writer (C4): page partitioning, the cascading index
//! tower, extension and footer emission, and resumable append.

use std::io::{self, Read, Seek, SeekFrom, Write};

use flate2::Compression;

use crate::config;
use crate::error::{RagzipError, Result};
use crate::gzip::member;
use crate::ragzip::format;
use crate::ragzip::metadata::{self, Extension, Footer};

/// Wraps a sink and counts every byte written through it, so the writer
/// always knows the absolute file offset at which the next member will
/// start without needing a seekable destination.
struct CountingSink<W: Write> {
    inner: W,
    count: u64,
}

impl<W: Write> Write for CountingSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

enum Inner<W: Write> {
    Idle(CountingSink<W>),
    Page(member::MemberWriter<CountingSink<W>>),
}

/// Streaming ragzip encoder. Accepts any `Write` sink; resuming an existing
/// file additionally requires `Read + Write + Seek` (see [`resume`]).
pub struct RagzipWriter<W: Write> {
    state: Option<Inner<W>>,
    page_exp: u32,
    index_exp: u32,
    page_start_offset: u64,
    page_bytes_in: u64,
    uncompressed_size: u64,
    /// `levels[idx]` is `buf[idx + 1]` in spec.md §4.4's naming.
    levels: Vec<Option<Vec<u64>>>,
    extensions: Vec<Extension>,
    finished: bool,
}

impl<W: Write> RagzipWriter<W> {
    pub fn new(sink: W, page_exp: u32, index_exp: u32) -> Result<Self> {
        format::validate_page_index_exponents(page_exp, index_exp)?;
        Ok(RagzipWriter {
            state: Some(Inner::Idle(CountingSink { inner: sink, count: 0 })),
            page_exp,
            index_exp,
            page_start_offset: 0,
            page_bytes_in: 0,
            uncompressed_size: 0,
            levels: Vec::new(),
            extensions: Vec::new(),
            finished: false,
        })
    }

    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    /// Registers an extension to be emitted at [`finish`](Self::finish).
    /// Rejects the append outright if the count or payload ceilings would be
    /// exceeded (spec.md §4.4, §7 Capacity).
    pub fn append_extension(&mut self, flags: u8, id: i32, payload: Vec<u8>) -> Result<()> {
        if self.extensions.len() >= config::MAX_EXTENSIONS {
            return Err(RagzipError::Capacity(format!(
                "extension count would exceed {}",
                config::MAX_EXTENSIONS
            )));
        }
        if payload.len() > config::MAX_EXTENSION_PAYLOAD {
            return Err(RagzipError::Capacity(format!(
                "extension payload of {} bytes exceeds {}",
                payload.len(),
                config::MAX_EXTENSION_PAYLOAD
            )));
        }
        self.extensions.push(Extension::new(flags, id, payload));
        Ok(())
    }

    pub fn write_all(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            self.ensure_page_open()?;
            let page_size = format::page_size(self.page_exp);
            let remaining_in_page = page_size - self.page_bytes_in;
            let take = remaining_in_page.min(data.len() as u64) as usize;

            if self.uncompressed_size + take as u64 >= config::MAX_UNCOMPRESSED_SIZE {
                return Err(RagzipError::Capacity("uncompressed size would reach 2^62".into()));
            }

            self.write_to_page(&data[..take])?;
            self.page_bytes_in += take as u64;
            self.uncompressed_size += take as u64;
            data = &data[take..];

            if self.page_bytes_in == page_size {
                self.finish_current_page()?;
            }
        }
        Ok(())
    }

    /// Flushes the index tower, emits extensions and the footer, and
    /// returns the underlying sink.
    pub fn finish(mut self) -> Result<W> {
        if matches!(self.state, Some(Inner::Page(_))) {
            self.finish_current_page()?;
        }

        let single_page_only = self.levels.len() <= 1
            && self.levels.first().map_or(true, |l| l.as_ref().map_or(true, |b| b.len() <= 1))
            && self.levels.get(1).map_or(true, |l| l.is_none());

        let mut levels_out = 0u32;
        let mut top_index_offset = 0u64;

        if single_page_only {
            if !self.levels.is_empty() {
                self.levels[0] = None;
            }
        } else {
            let mut level = 1u32;
            loop {
                let idx = (level - 1) as usize;
                if idx >= self.levels.len() {
                    break;
                }
                if let Some(buf) = self.levels[idx].take() {
                    if !buf.is_empty() {
                        let offset = self.current_offset();
                        self.write_index_member(&buf)?;
                        top_index_offset = offset;
                        levels_out = level;
                        let higher_idx = level as usize;
                        if higher_idx < self.levels.len() && self.levels[higher_idx].is_some() {
                            self.add_record(offset, level + 1)?;
                        }
                    }
                }
                level += 1;
            }
        }

        let mut extensions_tail_offset: i64 = -1;
        let mut previous: i64 = -1;
        for ext in self.extensions.clone() {
            if ext.payload.len() > config::MAX_EXTENSION_PAYLOAD {
                crate::display!(1, "warning: dropping oversized extension id={} at finish time", ext.id);
                continue;
            }
            let offset = self.current_offset();
            let mut e = ext;
            e.previous_extension_offset = previous;
            self.write_extension_member(&e)?;
            previous = offset as i64;
            extensions_tail_offset = offset as i64;
        }

        let footer = Footer::new(levels_out, self.index_exp, self.page_exp, self.uncompressed_size, top_index_offset, extensions_tail_offset);
        self.write_footer_member(&footer)?;

        self.finished = true;
        self.into_sink()
    }

    // -- internal plumbing ---------------------------------------------

    fn ensure_page_open(&mut self) -> Result<()> {
        if matches!(self.state, Some(Inner::Page(_))) {
            return Ok(());
        }
        let sink = match self.state.take() {
            Some(Inner::Idle(s)) => s,
            _ => unreachable!("writer state invariant violated"),
        };
        self.page_start_offset = sink.count;
        let mw = member::MemberWriter::begin(sink, Compression::default())?;
        self.state = Some(Inner::Page(mw));
        self.page_bytes_in = 0;
        Ok(())
    }

    fn write_to_page(&mut self, data: &[u8]) -> Result<()> {
        match self.state.as_mut() {
            Some(Inner::Page(mw)) => {
                mw.write_all(data)?;
                Ok(())
            }
            _ => unreachable!("write_to_page called without an open page"),
        }
    }

    fn finish_current_page(&mut self) -> Result<()> {
        let mw = match self.state.take() {
            Some(Inner::Page(mw)) => mw,
            _ => unreachable!("finish_current_page called without an open page"),
        };
        let sink = mw.finish()?;
        self.state = Some(Inner::Idle(sink));
        self.add_record(self.page_start_offset, 1)?;
        Ok(())
    }

    fn current_offset(&self) -> u64 {
        match &self.state {
            Some(Inner::Idle(sink)) => sink.count,
            _ => unreachable!("current_offset called while a page is open"),
        }
    }

    fn into_sink(self) -> Result<W> {
        match self.state {
            Some(Inner::Idle(sink)) => Ok(sink.inner),
            _ => unreachable!("into_sink called while a page is open"),
        }
    }

    fn write_index_member(&mut self, offsets: &[u64]) -> Result<()> {
        match self.state.as_mut() {
            Some(Inner::Idle(sink)) => Ok(metadata::write_index_member(sink, offsets)?),
            _ => unreachable!("write_index_member called while a page is open"),
        }
    }

    fn write_extension_member(&mut self, ext: &Extension) -> Result<()> {
        match self.state.as_mut() {
            Some(Inner::Idle(sink)) => Ok(ext.write_member(sink)?),
            _ => unreachable!("write_extension_member called while a page is open"),
        }
    }

    fn write_footer_member(&mut self, footer: &Footer) -> Result<()> {
        match self.state.as_mut() {
            Some(Inner::Idle(sink)) => Ok(footer.write_member(sink)?),
            _ => unreachable!("write_footer_member called while a page is open"),
        }
    }

    /// Cascading tower update (spec.md §4.4 `addRecord`), implemented
    /// recursively per the design notes' suggested iterative-or-recursive
    /// equivalence; `MAX_LEVELS` bounds the recursion depth.
    fn add_record(&mut self, offset: u64, level: u32) -> Result<()> {
        let idx = (level - 1) as usize;
        if idx >= self.levels.len() {
            self.levels.resize(idx + 1, None);
        }
        if self.levels[idx].is_none() {
            self.levels[idx] = Some(Vec::new());
        }
        let fanout = format::index_fanout(self.index_exp) as usize;
        let is_full = self.levels[idx].as_ref().unwrap().len() == fanout;
        if is_full {
            let index_offset = self.current_offset();
            let buf = self.levels[idx].take().unwrap();
            self.write_index_member(&buf)?;
            self.levels[idx] = Some(Vec::new());
            self.add_record(index_offset, level + 1)?;
        }
        self.levels[idx].as_mut().unwrap().push(offset);
        Ok(())
    }
}

/// A random-access sink that can also be truncated, needed by [`resume`] to
/// drop the stale tail artifacts (index towers built past the last
/// hydratable page, the old footer) before appending. Implemented for
/// `std::fs::File`; test code implements it for `Cursor<Vec<u8>>` as well.
pub trait Truncate {
    fn set_len(&mut self, size: u64) -> io::Result<()>;
}

impl Truncate for std::fs::File {
    fn set_len(&mut self, size: u64) -> io::Result<()> {
        std::fs::File::set_len(self, size)
    }
}

/// Resumes an existing ragzip file for continued appending (spec.md §4.4
/// Resume-append). Requires a random-access, truncatable sink; append-only
/// sinks cannot resume.
pub fn resume<F: Read + Write + Seek + Truncate>(mut file: F, page_exp: u32, index_exp: u32) -> Result<RagzipWriter<F>> {
    format::validate_page_index_exponents(page_exp, index_exp)?;

    let file_size = file.seek(SeekFrom::End(0))?;
    if file_size < config::FOOTER_MEMBER_SIZE {
        return Err(RagzipError::format("file too short to contain a ragzip footer"));
    }
    let footer_offset = file_size - config::FOOTER_MEMBER_SIZE;
    file.seek(SeekFrom::Start(footer_offset))?;
    let (mut reader, header) = member::MemberReader::open(&mut file)?;
    let payload = metadata::require_ra_payload(&header)?.to_vec();
    {
        let mut discard = Vec::new();
        reader.read_to_end(&mut discard)?;
    }
    let footer = Footer::decode(&payload)?;
    if footer.version != config::FORMAT_VERSION {
        return Err(RagzipError::Configuration(format!(
            "resume target has version {:#010x}, expected {:#010x}",
            footer.version,
            config::FORMAT_VERSION
        )));
    }
    let (levels, found_index_exp, found_page_exp) = footer.levels_index_page();
    if found_page_exp != page_exp || found_index_exp != index_exp {
        return Err(RagzipError::Configuration(format!(
            "resume target has (P={found_page_exp}, I={found_index_exp}), requested (P={page_exp}, I={index_exp})"
        )));
    }

    if footer.uncompressed_size == 0 {
        file.seek(SeekFrom::Start(0))?;
        file.set_len(0)?;
        return RagzipWriter::new(file, page_exp, index_exp);
    }

    // Resume never re-processes the existing last page; it starts a fresh
    // one immediately. The reader assumes every page but the last occupies
    // exactly 2^P logical bytes, so a partial tail page would become a
    // mis-sized interior page the moment a new page follows it.
    if footer.uncompressed_size % format::page_size(page_exp) != 0 {
        return Err(RagzipError::Configuration(
            "cannot resume: the existing file's last page is partial, append requires a full final page".into(),
        ));
    }

    let mut levels_buf: Vec<Option<Vec<u64>>> = Vec::new();
    let truncate_offset;

    if levels >= 2 {
        // Ladder-descend from the top index down to level 2. Each parent
        // buffer keeps every entry except its last: that last entry points
        // at the child index being reopened (and truncated away) one level
        // down, so it would otherwise dangle the moment the parent buffer
        // is flushed again.
        levels_buf.resize(levels as usize, None);
        let mut current_offset = footer.top_index_offset;
        let mut last_level1_offset = current_offset;
        for level in (2..=levels).rev() {
            let mut offsets = read_index_member(&mut file, current_offset)?;
            let next = offsets.pop().ok_or_else(|| RagzipError::format("empty tail index during resume"))?;
            levels_buf[(level - 1) as usize] = Some(offsets);
            current_offset = next;
            last_level1_offset = next;
        }
        // The bottom buffer holds page offsets, which stay valid on disk
        // (only the level-1 index member itself and everything after it is
        // truncated), so it keeps every entry.
        let level1_offsets = read_index_member(&mut file, last_level1_offset)?;
        levels_buf[0] = Some(level1_offsets);
        truncate_offset = last_level1_offset;
    } else if levels == 1 {
        // The single level-1 index is itself a finish-time artifact (it may
        // be only partially full). Reload its entries into the bottom
        // buffer, same as the levels >= 2 case's bottom buffer, and
        // truncate it away so it gets rewritten once it fills again.
        levels_buf.resize(1, None);
        let offsets = read_index_member(&mut file, footer.top_index_offset)?;
        levels_buf[0] = Some(offsets);
        truncate_offset = footer.top_index_offset;
    } else {
        // levels == 0: the sole existing page (at offset 0) is not tracked
        // by any index member yet; seed level 1 with it so the next page
        // appended is correctly paired into a level-1 index.
        levels_buf.resize(1, None);
        levels_buf[0] = Some(vec![0u64]);
        truncate_offset = if footer.extensions_tail_offset >= 0 {
            first_extension_offset(&mut file, footer.extensions_tail_offset)?
        } else {
            footer_offset
        };
    }

    file.seek(SeekFrom::Start(truncate_offset))?;
    file.set_len(truncate_offset)?;
    file.seek(SeekFrom::Start(truncate_offset))?;

    Ok(RagzipWriter {
        state: Some(Inner::Idle(CountingSink { inner: file, count: truncate_offset })),
        page_exp,
        index_exp,
        page_start_offset: truncate_offset,
        page_bytes_in: 0,
        uncompressed_size: footer.uncompressed_size,
        levels: levels_buf,
        extensions: Vec::new(),
        finished: false,
    })
}

fn read_index_member<F: Read + Write + Seek>(file: &mut F, offset: u64) -> Result<Vec<u64>> {
    file.seek(SeekFrom::Start(offset))?;
    let (mut reader, header) = member::MemberReader::open(&mut *file)?;
    let payload = metadata::require_ra_payload(&header)?.to_vec();
    let mut discard = Vec::new();
    reader.read_to_end(&mut discard)?;
    metadata::decode_index(&payload)
}

/// Walks the extension chain backward from `tail_offset` to find the
/// offset of the first-added (oldest) extension.
fn first_extension_offset<F: Read + Write + Seek>(file: &mut F, tail_offset: i64) -> Result<u64> {
    let mut offset = tail_offset;
    let mut steps = 0u32;
    loop {
        file.seek(SeekFrom::Start(offset as u64))?;
        let (mut reader, header) = member::MemberReader::open(&mut *file)?;
        let payload = metadata::require_ra_payload(&header)?.to_vec();
        let mut discard = Vec::new();
        reader.read_to_end(&mut discard)?;
        let ext = Extension::decode(&payload)?;
        steps += 1;
        if ext.previous_extension_offset < 0 || steps >= config::MAX_EXTENSIONS as u32 {
            return Ok(offset as u64);
        }
        offset = ext.previous_extension_offset;
    }
}
