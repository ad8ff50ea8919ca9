//! Single gzip member encode/decode, and a concatenation-aware reader that
//! seamlessly crosses member boundaries (C1).
//!
//! Framing is written and parsed by hand rather than through a high-level
//! gzip wrapper, because the ragzip format depends on exact byte placement
//! (the `extra` field of metadata members, the fixed 64-byte footer) that a
//! generic encoder's own header choices would not guarantee. The deflate
//! stream itself is delegated to `flate2`'s raw (wrapper-less) `Compress`/
//! `Decompress`, and the trailer checksum to `crc32fast`, mirroring the
//! header-manual / deflate-delegated split used by gzip-family crates such
//! as `informationsea-bgzip-rs`.

use std::io::{self, Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::{RagzipError, Result};
use crate::gzip::extra::{self, SubField};

const MAGIC: [u8; 2] = [0x1f, 0x8b];
const CM_DEFLATE: u8 = 8;

const FLG_FTEXT: u8 = 0x01;
const FLG_FHCRC: u8 = 0x02;
const FLG_FEXTRA: u8 = 0x04;
const FLG_FNAME: u8 = 0x08;
const FLG_FCOMMENT: u8 = 0x10;

/// Bound on FNAME/FCOMMENT length accepted while parsing a header, per
/// spec.md §4.1 ("bounded ≤ 65535 bytes").
const MAX_HEADER_STRING: usize = 65535;

/// XFL byte chosen per compression level, matching gzip convention: 2 for
/// maximum compression, 4 for fastest, 0 otherwise.
fn xfl_for_level(level: Compression) -> u8 {
    match level.level() {
        9 => 2,
        1 => 4,
        _ => 0,
    }
}

/// Parsed gzip member header, excluding the deflate stream and trailer.
#[derive(Debug, Clone, Default)]
pub struct MemberHeader {
    pub extra: Vec<SubField>,
    pub name: Option<Vec<u8>>,
    pub comment: Option<Vec<u8>>,
    pub had_hcrc: bool,
}

impl MemberHeader {
    /// Returns the `RA` subfield payload, if this member carries one.
    pub fn ra_payload(&self) -> Option<&[u8]> {
        extra::find(&self.extra, b'R', b'A').map(|f| f.payload.as_slice())
    }
}

// ---------------------------------------------------------------------------
// Header I/O
// ---------------------------------------------------------------------------

fn write_header<W: Write>(w: &mut W, level: Compression, extra_bytes: Option<&[u8]>) -> io::Result<()> {
    let mut flg = 0u8;
    if extra_bytes.is_some() {
        flg |= FLG_FEXTRA;
    }
    w.write_all(&MAGIC)?;
    w.write_all(&[CM_DEFLATE, flg])?;
    w.write_all(&0u32.to_le_bytes())?; // MTIME = 0
    w.write_all(&[xfl_for_level(level), 0xFF])?; // XFL, OS=unknown
    if let Some(extra) = extra_bytes {
        w.write_all(&(extra.len() as u16).to_le_bytes())?;
        w.write_all(extra)?;
    }
    Ok(())
}

/// Reads exactly `buf.len()` bytes, or fewer if the source hit a clean EOF
/// before any bytes were produced. Returns `Ok(n)` for the number of bytes
/// actually filled; `n < buf.len()` with `n > 0` is a truncation error for
/// the caller to raise, `n == 0` is a legitimate end-of-stream.
fn fill_or_eof<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

fn read_nul_terminated<R: Read>(r: &mut R) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        if out.len() > MAX_HEADER_STRING {
            return Err(RagzipError::format("FNAME/FCOMMENT exceeds 65535 bytes"));
        }
        let n = r.read(&mut byte)?;
        if n == 0 {
            return Err(RagzipError::format("unexpected EOF inside FNAME/FCOMMENT"));
        }
        if byte[0] == 0 {
            return Ok(out);
        }
        out.push(byte[0]);
    }
}

/// Reads one gzip member header from `r`. Returns `None` on a clean
/// end-of-stream (no bytes at all before EOF) so callers can distinguish
/// "no more members" from a truncated one.
fn try_read_header<R: Read>(r: &mut R) -> Result<Option<MemberHeader>> {
    let mut fixed = [0u8; 10];
    let n = fill_or_eof(r, &mut fixed)?;
    if n == 0 {
        return Ok(None);
    }
    if n != fixed.len() {
        return Err(RagzipError::format("truncated gzip header"));
    }
    if fixed[0] != MAGIC[0] || fixed[1] != MAGIC[1] {
        return Err(RagzipError::format("bad gzip magic number"));
    }
    if fixed[2] != CM_DEFLATE {
        return Err(RagzipError::format("unsupported compression method"));
    }
    let flg = fixed[3];
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&fixed);

    let mut extra_bytes = Vec::new();
    if flg & FLG_FEXTRA != 0 {
        let mut len_buf = [0u8; 2];
        if fill_or_eof(r, &mut len_buf)? != 2 {
            return Err(RagzipError::format("truncated XLEN"));
        }
        hasher.update(&len_buf);
        let xlen = u16::from_le_bytes(len_buf) as usize;
        extra_bytes.resize(xlen, 0);
        if fill_or_eof(r, &mut extra_bytes)? != xlen {
            return Err(RagzipError::format("truncated extra field"));
        }
        hasher.update(&extra_bytes);
    }
    let extra = extra::parse_subfields(&extra_bytes)?;

    let name = if flg & FLG_FNAME != 0 {
        let s = read_nul_terminated(r)?;
        hasher.update(&s);
        hasher.update(&[0]);
        Some(s)
    } else {
        None
    };
    let comment = if flg & FLG_FCOMMENT != 0 {
        let s = read_nul_terminated(r)?;
        hasher.update(&s);
        hasher.update(&[0]);
        Some(s)
    } else {
        None
    };

    let had_hcrc = flg & FLG_FHCRC != 0;
    if had_hcrc {
        let mut crc16_buf = [0u8; 2];
        if fill_or_eof(r, &mut crc16_buf)? != 2 {
            return Err(RagzipError::format("truncated header CRC16"));
        }
        let expected = u16::from_le_bytes(crc16_buf);
        let actual = (hasher.clone().finalize() & 0xFFFF) as u16;
        if actual != expected {
            return Err(RagzipError::integrity("gzip header CRC16 mismatch"));
        }
    }

    Ok(Some(MemberHeader { extra, name, comment, had_hcrc }))
}

// ---------------------------------------------------------------------------
// Page-member writer (content-bearing members)
// ---------------------------------------------------------------------------

/// Streaming writer for a single content-bearing gzip member (a page, §3).
/// Tracks CRC32 and uncompressed length as bytes are written; `finish`
/// flushes the deflate stream and appends the trailer.
pub struct MemberWriter<W: Write> {
    encoder: DeflateEncoder<W>,
    crc: crc32fast::Hasher,
    isize: u64,
}

impl<W: Write> MemberWriter<W> {
    /// Begins a new member with no `extra`/name/comment fields.
    pub fn begin(mut w: W, level: Compression) -> io::Result<Self> {
        write_header(&mut w, level, None)?;
        Ok(MemberWriter {
            encoder: DeflateEncoder::new(w, level),
            crc: crc32fast::Hasher::new(),
            isize: 0,
        })
    }

    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.crc.update(buf);
        self.isize = self.isize.wrapping_add(buf.len() as u64);
        self.encoder.write_all(buf)
    }

    /// Flushes the deflate stream and writes the CRC32+ISIZE trailer,
    /// returning the underlying writer.
    pub fn finish(self) -> io::Result<W> {
        let mut w = self.encoder.finish()?;
        w.write_all(&self.crc.finalize().to_le_bytes())?;
        w.write_all(&(self.isize as u32).to_le_bytes())?;
        Ok(w)
    }
}

// ---------------------------------------------------------------------------
// Metadata-member writer (C3: empty gzip member carrying one RA subfield)
// ---------------------------------------------------------------------------

/// Writes an "empty" gzip member whose only content is the `extra` field's
/// subfields, as specified by C3: `FLG=FEXTRA`, an empty two-byte deflate
/// block (`0x03 0x00`), and a zeroed CRC32/ISIZE trailer.
pub fn write_metadata_member<W: Write>(w: &mut W, fields: &[SubField]) -> io::Result<()> {
    let extra_bytes = extra::write_subfields(fields);
    write_header(w, Compression::default(), Some(&extra_bytes))?;
    w.write_all(&[0x03, 0x00])?; // final empty deflate block
    w.write_all(&0u32.to_le_bytes())?; // CRC32 = 0
    w.write_all(&0u32.to_le_bytes())?; // ISIZE = 0
    Ok(())
}

/// Encoded length, in bytes, of a metadata member carrying exactly the
/// given `extra` subfields: 10-byte header + 2-byte XLEN + subfields +
/// 2-byte empty deflate block + 8-byte trailer.
pub fn metadata_member_len(fields: &[SubField]) -> u64 {
    let extra_len: usize = fields.iter().map(SubField::encoded_len).sum();
    (10 + 2 + extra_len + 2 + 8) as u64
}

// ---------------------------------------------------------------------------
// Single-member reader
// ---------------------------------------------------------------------------

/// Reads the decompressed content of one gzip member, verifying the
/// CRC32/ISIZE trailer once the deflate stream is exhausted.
pub struct MemberReader<R: Read> {
    decoder: DeflateDecoder<R>,
    crc: crc32fast::Hasher,
    isize: u64,
    finished: bool,
}

impl<R: Read> MemberReader<R> {
    /// Reads a member header from `r` and returns a reader over its
    /// decompressed content, or `None` on clean end-of-stream.
    pub fn try_open(mut r: R) -> Result<Option<(Self, MemberHeader)>> {
        let header = match try_read_header(&mut r)? {
            Some(h) => h,
            None => return Ok(None),
        };
        Ok(Some((
            MemberReader {
                decoder: DeflateDecoder::new(r),
                crc: crc32fast::Hasher::new(),
                isize: 0,
                finished: false,
            },
            header,
        )))
    }

    /// Opens a member, failing (rather than returning `None`) if the source
    /// is already at end-of-stream. Used where a member is mandatory, e.g.
    /// the footer or a specific page offset.
    pub fn open(r: R) -> Result<(Self, MemberHeader)> {
        Self::try_open(r)?.ok_or_else(|| RagzipError::format("expected a gzip member, found none"))
    }

    /// Decodes and discards exactly `n` bytes. Equivalent to the C1 contract's
    /// `skipNBytes`.
    pub fn skip_n_bytes(&mut self, mut n: u64) -> io::Result<()> {
        let mut buf = [0u8; 8192];
        while n > 0 {
            let want = n.min(buf.len() as u64) as usize;
            let got = self.read(&mut buf[..want])?;
            if got == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "skip_n_bytes ran past end of member"));
            }
            n -= got as u64;
        }
        Ok(())
    }

    /// Finishes the member (if not already) and returns the underlying
    /// reader, positioned immediately after this member's trailer.
    pub fn into_inner_after_trailer(mut self) -> Result<R> {
        if !self.finished {
            let mut sink = [0u8; 8192];
            loop {
                if self.read(&mut sink)? == 0 {
                    break;
                }
            }
        }
        Ok(self.decoder.into_inner())
    }

    fn verify_trailer(&mut self) -> Result<()> {
        let expected_crc = self.crc.clone().finalize();
        let expected_isize = (self.isize & 0xFFFF_FFFF) as u32;
        let r = self.decoder.get_mut();
        let mut trailer = [0u8; 8];
        let n = fill_or_eof(r, &mut trailer)?;
        if n != 8 {
            return Err(RagzipError::format("truncated gzip trailer"));
        }
        let actual_crc = u32::from_le_bytes(trailer[0..4].try_into().unwrap());
        let actual_isize = u32::from_le_bytes(trailer[4..8].try_into().unwrap());
        if actual_crc != expected_crc {
            return Err(RagzipError::integrity("gzip CRC32 mismatch"));
        }
        if actual_isize != expected_isize {
            return Err(RagzipError::integrity("gzip ISIZE mismatch"));
        }
        Ok(())
    }
}

impl<R: Read> Read for MemberReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.finished {
            return Ok(0);
        }
        let n = self.decoder.read(buf)?;
        if n == 0 {
            self.verify_trailer().map_err(to_io_error)?;
            self.finished = true;
            return Ok(0);
        }
        self.crc.update(&buf[..n]);
        self.isize = self.isize.wrapping_add(n as u64);
        Ok(n)
    }
}

fn to_io_error(e: RagzipError) -> io::Error {
    match e {
        RagzipError::Io(io_err) => io_err,
        other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Concatenation-aware multi-member reader
// ---------------------------------------------------------------------------

enum MultiState<R: Read> {
    InMember(MemberReader<R>),
    Between(R),
    Done,
}

/// A sequential byte source that transparently crosses gzip member
/// boundaries, including empty metadata members, satisfying C1's
/// "seamless across member boundaries" contract. Used for plain front-to-
/// back decoding (the CLI's non-random-access decode path).
pub struct MultiMemberReader<R: Read> {
    state: MultiState<R>,
}

impl<R: Read> MultiMemberReader<R> {
    pub fn new(r: R) -> Self {
        MultiMemberReader { state: MultiState::Between(r) }
    }
}

impl<R: Read> Read for MultiMemberReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match std::mem::replace(&mut self.state, MultiState::Done) {
                MultiState::InMember(mut m) => {
                    let n = m.read(buf)?;
                    if n > 0 {
                        self.state = MultiState::InMember(m);
                        return Ok(n);
                    }
                    let r = m.into_inner_after_trailer().map_err(to_io_error)?;
                    self.state = MultiState::Between(r);
                }
                MultiState::Between(r) => {
                    match MemberReader::try_open(r).map_err(to_io_error)? {
                        Some((m, _header)) => self.state = MultiState::InMember(m),
                        None => return Ok(0),
                    }
                }
                MultiState::Done => return Ok(0),
            }
        }
    }
}
