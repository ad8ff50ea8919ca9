//! Metadata-member payload encoding (C3 + supplement): index payloads,
//! `Extension`, and `Footer`, all carried inside the single `RA` subfield of
//! an otherwise-empty gzip member (spec.md §3, §4.3).

use crate::config;
use crate::error::{RagzipError, Result};
use crate::gzip::extra::SubField;
use crate::gzip::member;
use crate::ragzip::format;

/// `SI1`/`SI2` of the `RA` subfield: `'R'`, `'A'`.
pub const RA_SI1: u8 = b'R';
pub const RA_SI2: u8 = b'A';

/// Wraps an `RA` payload into the single-element subfield list every
/// metadata member carries.
fn ra_fields(payload: Vec<u8>) -> Vec<SubField> {
    vec![SubField::new(RA_SI1, RA_SI2, payload)]
}

/// Extracts the `RA` payload from a parsed member header, failing with a
/// [`RagzipError::Format`] if absent (spec.md §3: "every metadata member
/// contains exactly one `RA` subfield, placed first").
pub fn require_ra_payload(header: &member::MemberHeader) -> Result<&[u8]> {
    header
        .ra_payload()
        .ok_or_else(|| RagzipError::format("metadata member is missing its RA subfield"))
}

// ---------------------------------------------------------------------------
// Index payloads
// ---------------------------------------------------------------------------

/// Encodes a level's buffered offsets as the concatenation of 8-byte
/// big-endian values that make up an index's `RA` payload.
pub fn encode_index(offsets: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(offsets.len() * 8);
    for o in offsets {
        out.extend_from_slice(&o.to_be_bytes());
    }
    out
}

/// Decodes an index `RA` payload back into its offsets. The length of the
/// sequence is `payload_length / 8`; a dangling remainder is a format error.
pub fn decode_index(payload: &[u8]) -> Result<Vec<u64>> {
    if payload.len() % 8 != 0 {
        return Err(RagzipError::format(format!(
            "index payload length {} is not a multiple of 8",
            payload.len()
        )));
    }
    Ok(payload.chunks_exact(8).map(|c| u64::from_be_bytes(c.try_into().unwrap())).collect())
}

/// Writes an index metadata member with the given offsets to `w`, returning
/// nothing — callers position `w` themselves and learn the member's start
/// offset from their own byte counter (writer/orderer responsibility).
pub fn write_index_member<W: std::io::Write>(w: &mut W, offsets: &[u64]) -> std::io::Result<()> {
    member::write_metadata_member(w, &ra_fields(encode_index(offsets)))
}

/// Reads exactly one big-endian 8-byte offset at byte index `slot` of an
/// index payload, per spec.md §4.5 ("read N big-endian bytes starting at
/// offset K of payload").
pub fn read_index_slot(payload: &[u8], slot: u64) -> Result<u64> {
    let start = (slot as usize) * 8;
    let end = start + 8;
    if end > payload.len() {
        return Err(RagzipError::format(format!(
            "index slot {slot} out of range for payload of {} bytes",
            payload.len()
        )));
    }
    Ok(u64::from_be_bytes(payload[start..end].try_into().unwrap()))
}

// ---------------------------------------------------------------------------
// Extension
// ---------------------------------------------------------------------------

/// Fixed header size of an extension's `RA` payload, preceding its variable
/// payload bytes: `previousExtensionOffset` (8) + `flags` (1) + `id` (4).
const EXTENSION_HEADER_LEN: usize = 13;

/// Bit 7 of `flags`: reserved to the format owner ("spec" directives).
const FLAG_SPEC: u8 = 0x80;

/// A forward-compatible directive record, linked backward through
/// `previous_extension_offset` (spec.md §3 Extension).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub previous_extension_offset: i64,
    pub flags: u8,
    pub id: i32,
    pub payload: Vec<u8>,
}

impl Extension {
    pub fn new(flags: u8, id: i32, payload: Vec<u8>) -> Self {
        Extension { previous_extension_offset: -1, flags, id, payload }
    }

    /// `true` when bit 7 of `flags` is set, marking this a spec-reserved
    /// directive rather than a user-defined one.
    pub fn is_spec(&self) -> bool {
        self.flags & FLAG_SPEC != 0
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(EXTENSION_HEADER_LEN + self.payload.len());
        out.extend_from_slice(&self.previous_extension_offset.to_be_bytes());
        out.push(self.flags);
        out.extend_from_slice(&self.id.to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < EXTENSION_HEADER_LEN {
            return Err(RagzipError::format("extension payload shorter than its fixed header"));
        }
        let previous_extension_offset = i64::from_be_bytes(payload[0..8].try_into().unwrap());
        let flags = payload[8];
        let id = i32::from_be_bytes(payload[9..13].try_into().unwrap());
        let body = payload[EXTENSION_HEADER_LEN..].to_vec();
        Ok(Extension { previous_extension_offset, flags, id, payload: body })
    }

    pub fn write_member<W: std::io::Write>(&self, w: &mut W) -> std::io::Result<()> {
        member::write_metadata_member(w, &ra_fields(self.encode()))
    }
}

// ---------------------------------------------------------------------------
// Footer
// ---------------------------------------------------------------------------

/// Un-padded footer payload length: `version`(4) + `treespec`(4) +
/// `uncompressedSize`(8) + `topIndexOffset`(8) + `extensionsTailOffset`(8).
const FOOTER_PAYLOAD_LEN: usize = 32;

/// Footer `RA` payload length after padding, derived from the fixed 64-byte
/// member size and the codec's fixed overhead (spec.md §4.3: `64 - 26 = 38`).
const FOOTER_PADDED_PAYLOAD_LEN: usize = 38;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footer {
    pub version: i32,
    pub treespec: i32,
    pub uncompressed_size: u64,
    pub top_index_offset: u64,
    pub extensions_tail_offset: i64,
}

impl Footer {
    pub fn new(levels: u32, index_exp: u32, page_exp: u32, uncompressed_size: u64, top_index_offset: u64, extensions_tail_offset: i64) -> Self {
        Footer {
            version: config::FORMAT_VERSION,
            treespec: format::pack_treespec(levels, index_exp, page_exp),
            uncompressed_size,
            top_index_offset,
            extensions_tail_offset,
        }
    }

    pub fn levels_index_page(&self) -> (u32, u32, u32) {
        format::unpack_treespec(self.treespec)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FOOTER_PADDED_PAYLOAD_LEN);
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(&self.treespec.to_be_bytes());
        out.extend_from_slice(&self.uncompressed_size.to_be_bytes());
        out.extend_from_slice(&self.top_index_offset.to_be_bytes());
        out.extend_from_slice(&self.extensions_tail_offset.to_be_bytes());
        debug_assert_eq!(out.len(), FOOTER_PAYLOAD_LEN);
        out.resize(FOOTER_PADDED_PAYLOAD_LEN, 0);
        out
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < FOOTER_PAYLOAD_LEN {
            return Err(RagzipError::format(format!(
                "footer payload too short: {} bytes, need at least {FOOTER_PAYLOAD_LEN}",
                payload.len()
            )));
        }
        let version = i32::from_be_bytes(payload[0..4].try_into().unwrap());
        let treespec = i32::from_be_bytes(payload[4..8].try_into().unwrap());
        let uncompressed_size = u64::from_be_bytes(payload[8..16].try_into().unwrap());
        let top_index_offset = u64::from_be_bytes(payload[16..24].try_into().unwrap());
        let extensions_tail_offset = i64::from_be_bytes(payload[24..32].try_into().unwrap());
        Ok(Footer { version, treespec, uncompressed_size, top_index_offset, extensions_tail_offset })
    }

    pub fn write_member<W: std::io::Write>(&self, w: &mut W) -> std::io::Result<()> {
        member::write_metadata_member(w, &ra_fields(self.encode()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trips() {
        let offsets = vec![0u64, 1024, 1 << 40];
        let payload = encode_index(&offsets);
        assert_eq!(decode_index(&payload).unwrap(), offsets);
    }

    #[test]
    fn index_slot_reads_the_right_offset() {
        let offsets = vec![10u64, 20, 30];
        let payload = encode_index(&offsets);
        assert_eq!(read_index_slot(&payload, 1).unwrap(), 20);
        assert!(read_index_slot(&payload, 3).is_err());
    }

    #[test]
    fn extension_round_trips_and_detects_spec_bit() {
        let ext = Extension { previous_extension_offset: -1, flags: 0x80, id: 3, payload: b"hi".to_vec() };
        let encoded = ext.encode();
        let decoded = Extension::decode(&encoded).unwrap();
        assert_eq!(decoded, ext);
        assert!(decoded.is_spec());

        let user_ext = Extension::new(0x0a, 1001, b"my extension 1001".to_vec());
        assert!(!user_ext.is_spec());
    }

    #[test]
    fn footer_round_trips_and_member_is_exactly_64_bytes() {
        let footer = Footer::new(2, 12, 13, 123456, 4096, -1);
        let mut out = Vec::new();
        footer.write_member(&mut out).unwrap();
        assert_eq!(out.len() as u64, config::FOOTER_MEMBER_SIZE);

        let (mut reader, header) = member::MemberReader::open(out.as_slice()).unwrap();
        let mut content = Vec::new();
        std::io::Read::read_to_end(&mut reader, &mut content).unwrap();
        assert!(content.is_empty());

        let payload = require_ra_payload(&header).unwrap();
        let decoded = Footer::decode(payload).unwrap();
        assert_eq!(decoded.uncompressed_size, 123456);
        assert_eq!(decoded.levels_index_page(), (2, 12, 13));
    }
}
