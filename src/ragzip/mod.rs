//! The ragzip container format: geometry, metadata-member payloads, the
//! streaming writer (C4), the seekable reader (C5), and the page cache (C6).

pub mod cache;
pub mod format;
pub mod metadata;
pub mod reader;
pub mod writer;

pub use cache::PageCache;
pub use metadata::{Extension, Footer};
pub use reader::{CacheMode, RagzipReader};
pub use writer::{resume, RagzipWriter};
