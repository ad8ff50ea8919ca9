//! Seekable ragzip reader (C5): footer parsing, extension chain walk, the
//! three index-descent modes, and per-position/transfer reads.

use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::config;
use crate::error::{RagzipError, Result};
use crate::gzip::member;
use crate::ragzip::format;
use crate::ragzip::metadata::{self, Extension, Footer};

fn to_io_error(e: RagzipError) -> io::Error {
    match e {
        RagzipError::Io(io_err) => io_err,
        other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
    }
}

/// Index-descent strategy, per spec.md §4.5.
#[derive(Debug, Clone, Copy)]
pub enum CacheMode {
    /// Read the 8-byte slot directly at its computed file offset, trusting
    /// the footer-validated `RA`-subfield-is-first invariant; never
    /// decompresses a metadata member.
    Direct,
    /// Decompress the metadata member and extract the slot; never caches.
    Loaded,
    /// Decompress and keep an LRU of decoded index payloads per level,
    /// keyed by `pageId >> (level * I)`.
    Cached(usize),
}

/// Small per-level LRU over decoded index payloads (vectors of offsets),
/// distinct from [`crate::ragzip::cache::PageCache`], which caches raw bytes
/// of an arbitrary source rather than already-decoded index entries.
struct IndexLru {
    capacity: usize,
    map: HashMap<u64, Vec<u64>>,
    order: Vec<u64>,
}

impl IndexLru {
    fn new(capacity: usize) -> Self {
        IndexLru { capacity, map: HashMap::new(), order: Vec::new() }
    }

    fn get(&mut self, key: u64) -> Option<Vec<u64>> {
        if let Some(v) = self.map.get(&key) {
            let v = v.clone();
            self.order.retain(|&k| k != key);
            self.order.push(key);
            Some(v)
        } else {
            None
        }
    }

    fn insert(&mut self, key: u64, value: Vec<u64>) {
        self.map.insert(key, value);
        self.order.retain(|&k| k != key);
        self.order.push(key);
        while self.order.len() > self.capacity.max(1) {
            let evict = self.order.remove(0);
            self.map.remove(&evict);
        }
    }
}

enum ReaderState<R: Read + Seek> {
    Idle(R),
    OnPage { decoder: member::MemberReader<R>, page_id: u64 },
}

/// Random-access reader over a ragzip file.
pub struct RagzipReader<R: Read + Seek> {
    state: Option<ReaderState<R>>,
    page_exp: u32,
    index_exp: u32,
    levels: u32,
    uncompressed_size: u64,
    top_index_offset: u64,
    footer_offset: u64,
    first_extension_offset: Option<u64>,
    extensions: Vec<Extension>,
    cache_mode: CacheMode,
    caches: Vec<IndexLru>,
    current_pos: u64,
}

impl<R: Read + Seek> RagzipReader<R> {
    pub fn open(mut source: R) -> Result<Self> {
        let file_size = source.seek(SeekFrom::End(0))?;
        if file_size < config::FOOTER_MEMBER_SIZE {
            return Err(RagzipError::format("file too short to contain a ragzip footer"));
        }
        let footer_offset = file_size - config::FOOTER_MEMBER_SIZE;
        source.seek(SeekFrom::Start(footer_offset))?;
        let (mut reader, header) = member::MemberReader::open(&mut source)?;
        let payload = metadata::require_ra_payload(&header)?.to_vec();
        let mut discard = Vec::new();
        reader.read_to_end(&mut discard)?;
        let footer = Footer::decode(&payload)?;

        if footer.version != config::FORMAT_VERSION {
            return Err(RagzipError::format(format!("unsupported ragzip version {:#010x}", footer.version)));
        }
        let (levels, index_exp, page_exp) = footer.levels_index_page();
        format::validate_page_index_exponents(page_exp, index_exp)?;
        if levels > config::MAX_LEVELS {
            return Err(RagzipError::format(format!("levels {levels} exceeds {}", config::MAX_LEVELS)));
        }
        if levels > 0 && footer.top_index_offset >= footer_offset {
            return Err(RagzipError::format_at("top index offset is not before the footer", footer.top_index_offset));
        }
        if footer.extensions_tail_offset != -1 && !(0..footer_offset as i64).contains(&footer.extensions_tail_offset) {
            return Err(RagzipError::format("extensions tail offset out of range"));
        }

        let mut extensions = Vec::new();
        let mut truncated = false;
        let mut next = footer.extensions_tail_offset;
        let mut first_extension_offset = None;
        while next >= 0 {
            if extensions.len() >= config::MAX_EXTENSIONS {
                truncated = true;
                break;
            }
            first_extension_offset = Some(next as u64);
            source.seek(SeekFrom::Start(next as u64))?;
            let (mut r, h) = member::MemberReader::open(&mut source)?;
            let p = metadata::require_ra_payload(&h)?.to_vec();
            let mut d = Vec::new();
            r.read_to_end(&mut d)?;
            let ext = Extension::decode(&p)?;
            let prev = ext.previous_extension_offset;
            extensions.push(ext);
            next = prev;
        }
        extensions.reverse();
        if truncated {
            crate::display!(1, "warning: further extensions not loaded (chain exceeds {} entries)", config::MAX_EXTENSIONS);
        }

        Ok(RagzipReader {
            state: Some(ReaderState::Idle(source)),
            page_exp,
            index_exp,
            levels,
            uncompressed_size: footer.uncompressed_size,
            top_index_offset: footer.top_index_offset,
            footer_offset,
            first_extension_offset,
            extensions,
            cache_mode: CacheMode::Loaded,
            caches: Vec::new(),
            current_pos: 0,
        })
    }

    pub fn top_index_offset(&self) -> u64 {
        self.top_index_offset
    }

    pub fn footer_offset(&self) -> u64 {
        self.footer_offset
    }

    /// Offset of the single page's end bound when `levels() == 0`: the
    /// first extension, if any, else the footer (spec.md §4.8 special case).
    pub fn single_page_bound(&self) -> u64 {
        self.first_extension_offset.unwrap_or(self.footer_offset)
    }

    /// Decodes the entries of the index metadata member at `offset`.
    /// Exposed for the parallel decoder's walker, which needs the same
    /// descent the reader performs internally but must visit every index
    /// rather than a single seek path.
    pub fn read_index_entries_at(&mut self, offset: u64) -> Result<Vec<u64>> {
        self.load_index_entries(offset)
    }

    pub fn set_cache_mode(&mut self, mode: CacheMode) {
        self.cache_mode = mode;
        self.caches.clear();
    }

    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    pub fn levels(&self) -> u32 {
        self.levels
    }

    pub fn page_exponent(&self) -> u32 {
        self.page_exp
    }

    pub fn index_exponent(&self) -> u32 {
        self.index_exp
    }

    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    pub fn position(&self) -> u64 {
        self.current_pos
    }

    /// Moves the streaming cursor to `pos`, honoring the same-page fast
    /// paths of spec.md §4.5.
    pub fn seek_to(&mut self, pos: u64) -> Result<()> {
        if pos > self.uncompressed_size {
            return Err(RagzipError::format("seek position out of range"));
        }

        let currently_open_page = match &self.state {
            Some(ReaderState::OnPage { page_id, .. }) => Some(*page_id),
            _ => None,
        };

        if pos < self.uncompressed_size {
            let target_page = format::page_id_for_pos(pos, self.page_exp);
            if let Some(cur_id) = currently_open_page {
                if cur_id == target_page && pos >= self.current_pos {
                    let delta = pos - self.current_pos;
                    if delta > 0 {
                        if let Some(ReaderState::OnPage { decoder, .. }) = self.state.as_mut() {
                            decoder.skip_n_bytes(delta).map_err(RagzipError::from)?;
                        }
                    }
                    self.current_pos = pos;
                    return Ok(());
                }
            }

            let member_offset = if self.levels == 0 { self.top_index_offset } else { self.descend_to_page(target_page)? };
            self.open_page(target_page, member_offset)?;
            let skip = format::offset_in_page(pos, self.page_exp);
            if skip > 0 {
                if let Some(ReaderState::OnPage { decoder, .. }) = self.state.as_mut() {
                    decoder.skip_n_bytes(skip).map_err(RagzipError::from)?;
                }
            }
        } else if currently_open_page.is_some() {
            let source = self.take_idle()?;
            self.state = Some(ReaderState::Idle(source));
        }

        self.current_pos = pos;
        Ok(())
    }

    /// Reads `count` logical bytes starting at `pos` without disturbing the
    /// streaming cursor's logical position (spec.md §4.5 "per-position
    /// read"). The underlying source's raw position is restored afterward;
    /// any page the streaming cursor had open is transparently reopened by
    /// the next sequential [`Read::read`] call.
    pub fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<usize> {
        if pos >= self.uncompressed_size {
            return Ok(0);
        }
        let mut source = self.take_idle()?;
        let saved_raw_pos = source.stream_position()?;

        let page_id = format::page_id_for_pos(pos, self.page_exp);
        let member_offset = if self.levels == 0 {
            self.top_index_offset
        } else {
            self.state = Some(ReaderState::Idle(source));
            let off = self.descend_to_page(page_id)?;
            source = self.take_idle()?;
            off
        };

        source.seek(SeekFrom::Start(member_offset))?;
        let (mut decoder, _header) = member::MemberReader::open(source)?;
        let skip = format::offset_in_page(pos, self.page_exp);
        if skip > 0 {
            decoder.skip_n_bytes(skip).map_err(RagzipError::from)?;
        }
        let page_size = format::page_size(self.page_exp);
        let remaining_in_page = page_size - skip;
        let remaining_total = self.uncompressed_size - pos;
        let want = (buf.len() as u64).min(remaining_in_page).min(remaining_total) as usize;
        let n = decoder.read(&mut buf[..want])?;

        let mut source = decoder.into_inner_after_trailer()?;
        source.seek(SeekFrom::Start(saved_raw_pos))?;
        self.state = Some(ReaderState::Idle(source));
        Ok(n)
    }

    /// Copies `count` logical bytes starting at `pos` into `sink`, per
    /// spec.md §4.5 "transfer".
    pub fn transfer_to<W: Write>(&mut self, pos: u64, mut count: u64, sink: &mut W) -> Result<u64> {
        let mut pos = pos;
        let mut total = 0u64;
        let mut buf = vec![0u8; 64 * 1024];
        while count > 0 {
            let want = count.min(buf.len() as u64) as usize;
            let n = self.read_at(pos, &mut buf[..want])?;
            if n == 0 {
                break;
            }
            sink.write_all(&buf[..n])?;
            pos += n as u64;
            total += n as u64;
            count -= n as u64;
        }
        Ok(total)
    }

    // -- internal plumbing ---------------------------------------------

    fn take_idle(&mut self) -> Result<R> {
        match self.state.take() {
            Some(ReaderState::Idle(r)) => Ok(r),
            Some(ReaderState::OnPage { decoder, .. }) => decoder.into_inner_after_trailer(),
            None => unreachable!("reader state invariant violated"),
        }
    }

    fn open_page(&mut self, page_id: u64, member_offset: u64) -> Result<()> {
        let mut source = self.take_idle()?;
        source.seek(SeekFrom::Start(member_offset))?;
        let (decoder, _header) = member::MemberReader::open(source)?;
        self.state = Some(ReaderState::OnPage { decoder, page_id });
        Ok(())
    }

    fn descend_to_page(&mut self, page_id: u64) -> Result<u64> {
        let mut current_offset = self.top_index_offset;
        for level in (1..=self.levels).rev() {
            let slot = format::slot_at_level(page_id, level, self.index_exp);
            let new_offset = self.read_slot(current_offset, level, page_id, slot)?;
            if new_offset >= current_offset {
                return Err(RagzipError::format_at("index entry is not strictly before its container", current_offset));
            }
            current_offset = new_offset;
        }
        Ok(current_offset)
    }

    fn read_slot(&mut self, member_offset: u64, level: u32, page_id: u64, slot: u64) -> Result<u64> {
        match self.cache_mode {
            CacheMode::Direct => self.read_slot_direct(member_offset, slot),
            CacheMode::Loaded => self.read_slot_loaded(member_offset, slot),
            CacheMode::Cached(capacity) => self.read_slot_cached(member_offset, level, page_id, slot, capacity),
        }
    }

    fn read_slot_direct(&mut self, member_offset: u64, slot: u64) -> Result<u64> {
        let mut source = self.take_idle()?;
        let result = (|| -> Result<u64> {
            source.seek(SeekFrom::Start(member_offset + config::RA_PAYLOAD_OFFSET + slot * 8))?;
            let mut buf = [0u8; 8];
            source.read_exact(&mut buf)?;
            Ok(u64::from_be_bytes(buf))
        })();
        self.state = Some(ReaderState::Idle(source));
        result
    }

    fn read_slot_loaded(&mut self, member_offset: u64, slot: u64) -> Result<u64> {
        let entries = self.load_index_entries(member_offset)?;
        entries.get(slot as usize).copied().ok_or_else(|| RagzipError::format_at("index slot out of range", member_offset))
    }

    fn read_slot_cached(&mut self, member_offset: u64, level: u32, page_id: u64, slot: u64, capacity: usize) -> Result<u64> {
        let idx = (level - 1) as usize;
        if self.caches.len() <= idx {
            self.caches.resize_with(idx + 1, || IndexLru::new(capacity));
        }
        let key = format::cache_key(page_id, level, self.index_exp);
        if let Some(entries) = self.caches[idx].get(key) {
            return entries.get(slot as usize).copied().ok_or_else(|| RagzipError::format_at("index slot out of range", member_offset));
        }
        let entries = self.load_index_entries(member_offset)?;
        let v = entries.get(slot as usize).copied().ok_or_else(|| RagzipError::format_at("index slot out of range", member_offset))?;
        self.caches[idx].insert(key, entries);
        Ok(v)
    }

    fn load_index_entries(&mut self, member_offset: u64) -> Result<Vec<u64>> {
        let mut source = self.take_idle()?;
        source.seek(SeekFrom::Start(member_offset))?;
        let (mut decoder, header) = member::MemberReader::open(source)?;
        let payload = metadata::require_ra_payload(&header)?.to_vec();
        let mut discard = Vec::new();
        decoder.read_to_end(&mut discard)?;
        let source = decoder.into_inner_after_trailer()?;
        self.state = Some(ReaderState::Idle(source));
        metadata::decode_index(&payload)
    }
}

impl<R: Read + Seek> Read for RagzipReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.current_pos >= self.uncompressed_size {
            return Ok(0);
        }
        let target_page = format::page_id_for_pos(self.current_pos, self.page_exp);
        let page_matches = matches!(&self.state, Some(ReaderState::OnPage { page_id, .. }) if *page_id == target_page);
        if !page_matches {
            let pos = self.current_pos;
            self.seek_to(pos).map_err(to_io_error)?;
        }

        let page_size = format::page_size(self.page_exp);
        let offset_in_page = format::offset_in_page(self.current_pos, self.page_exp);
        let remaining_in_page = page_size - offset_in_page;
        let remaining_total = self.uncompressed_size - self.current_pos;
        let want = (buf.len() as u64).min(remaining_in_page).min(remaining_total) as usize;

        let n = match self.state.as_mut() {
            Some(ReaderState::OnPage { decoder, .. }) => decoder.read(&mut buf[..want])?,
            _ => 0,
        };
        self.current_pos += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ragzip::writer::RagzipWriter;
    use std::io::Cursor;

    fn build(data: &[u8], page_exp: u32, index_exp: u32) -> Vec<u8> {
        let mut w = RagzipWriter::new(Vec::new(), page_exp, index_exp).unwrap();
        w.write_all(data).unwrap();
        w.finish().unwrap()
    }

    #[test]
    fn empty_file_reports_zero_size_and_zero_levels() {
        let bytes = build(b"", 10, 5);
        let reader = RagzipReader::open(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.uncompressed_size(), 0);
        assert_eq!(reader.levels(), 0);
    }

    #[test]
    fn random_access_matches_streamed_decode() {
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let bytes = build(&data, 10, 5);
        let mut reader = RagzipReader::open(Cursor::new(bytes)).unwrap();

        reader.seek_to(2500).unwrap();
        let mut got = vec![0u8; 100];
        let n = reader.read(&mut got).unwrap();
        assert_eq!(&got[..n], &data[2500..2500 + n]);
    }

    #[test]
    fn per_position_read_does_not_disturb_streaming_cursor() {
        let data: Vec<u8> = (0..3000u32).map(|i| (i % 200) as u8).collect();
        let bytes = build(&data, 10, 5);
        let mut reader = RagzipReader::open(Cursor::new(bytes)).unwrap();

        reader.seek_to(10).unwrap();
        let mut side = vec![0u8; 50];
        reader.read_at(2000, &mut side).unwrap();
        assert_eq!(side, data[2000..2050]);
        assert_eq!(reader.position(), 10);

        let mut got = vec![0u8; 20];
        let n = reader.read(&mut got).unwrap();
        assert_eq!(&got[..n], &data[10..10 + n]);
    }

    #[test]
    fn cached_mode_returns_same_results_as_loaded_mode() {
        let data: Vec<u8> = (0..70000u32).map(|i| (i % 255) as u8).collect();
        let bytes = build(&data, 10, 5);

        let mut direct_reader = RagzipReader::open(Cursor::new(bytes.clone())).unwrap();
        direct_reader.set_cache_mode(CacheMode::Direct);
        let mut buf1 = vec![0u8; 100];
        direct_reader.read_at(65000, &mut buf1).unwrap();

        let mut cached_reader = RagzipReader::open(Cursor::new(bytes)).unwrap();
        cached_reader.set_cache_mode(CacheMode::Cached(4));
        let mut buf2 = vec![0u8; 100];
        cached_reader.read_at(65000, &mut buf2).unwrap();

        assert_eq!(buf1, buf2);
        assert_eq!(buf1, data[65000..65100]);
    }

    #[test]
    fn transfer_to_copies_exact_range() {
        let data: Vec<u8> = (0..4000u32).map(|i| (i % 256) as u8).collect();
        let bytes = build(&data, 10, 5);
        let mut reader = RagzipReader::open(Cursor::new(bytes)).unwrap();
        let mut sink = Vec::new();
        let n = reader.transfer_to(1000, 500, &mut sink).unwrap();
        assert_eq!(n, 500);
        assert_eq!(sink, data[1000..1500]);
    }
}
