//! Compile-time configuration constants for the ragzip format and engine.
//!
//! Holds the same two kinds of constant the teacher's `config.rs` held: CLI
//! defaults (page/index exponent, worker count) and the format's hard
//! capacity ceilings, so both the writer and the parallel pipelines can
//! reference a single source of truth instead of scattering magic numbers.

/// Default page-size exponent (`-P`), giving `2^13` = 8 KiB pages.
pub const DEFAULT_PAGE_EXPONENT: u32 = 13;

/// Default index-size exponent (`-I`), giving `2^12` = 4096 entries per index.
pub const DEFAULT_INDEX_EXPONENT: u32 = 12;

/// Smallest allowed page-size exponent.
pub const MIN_PAGE_EXPONENT: u32 = 9;
/// Largest allowed page-size exponent.
pub const MAX_PAGE_EXPONENT: u32 = 30;
/// Largest page-size exponent usable by the parallel encoder: an in-memory
/// page buffer must never exceed 2 MiB (spec.md §4.7).
pub const MAX_PARALLEL_PAGE_EXPONENT: u32 = 21;

/// Smallest allowed index-size exponent.
pub const MIN_INDEX_EXPONENT: u32 = 1;
/// Largest allowed index-size exponent.
pub const MAX_INDEX_EXPONENT: u32 = 12;

/// Maximum number of index-tree levels.
pub const MAX_LEVELS: u32 = 53;

/// Ragzip format version, packed as `(major << 16) | minor`.
pub const FORMAT_VERSION: i32 = 0x0001_0000;

/// Uncompressed size must stay strictly below this ceiling.
pub const MAX_UNCOMPRESSED_SIZE: u64 = 1 << 62;

/// Maximum number of extensions in the linked list.
pub const MAX_EXTENSIONS: usize = 50;

/// Maximum extension payload size, in bytes.
pub const MAX_EXTENSION_PAYLOAD: usize = 32 * 1024;

/// Fixed size of the footer gzip member.
pub const FOOTER_MEMBER_SIZE: u64 = 64;

/// Fixed distance from a metadata gzip-member's start to the first byte of
/// its `RA` subfield payload: 10-byte gzip header + 2-byte XLEN + 4-byte
/// subfield header (`SI1 SI2 sflen-lo sflen-hi`).
pub const RA_PAYLOAD_OFFSET: u64 = 16;

/// Default number of worker threads used by the parallel pipelines when the
/// caller asks for "auto" (0).
pub const NB_WORKERS_DEFAULT: usize = 4;

/// Largest worker count the CLI will honor; larger requests are clamped.
pub const NB_WORKERS_MAX: usize = 200;

/// Fixed page-buffer chunk used by the parallel reader stage before
/// compression, matching the per-page granularity of the format itself.
pub const KB: usize = 1 << 10;
pub const MB: usize = 1 << 20;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_in_range() {
        assert!((MIN_PAGE_EXPONENT..=MAX_PAGE_EXPONENT).contains(&DEFAULT_PAGE_EXPONENT));
        assert!((MIN_INDEX_EXPONENT..=MAX_INDEX_EXPONENT).contains(&DEFAULT_INDEX_EXPONENT));
    }
}
