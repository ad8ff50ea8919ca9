//! `ragzip`: a random-access gzip container format and engine.
//!
//! A ragzip file is an ordinary sequence of gzip members — any gzip decoder
//! can stream it front to back and get the original bytes back — with extra
//! "metadata" members interleaved that carry an index tree, letting a
//! [`ragzip::RagzipReader`](crate::ragzip::RagzipReader) seek directly to any
//! byte offset without decompressing everything before it. See `SPEC_FULL.md`
//! for the full format and engine specification.

pub mod cli;
pub mod config;
pub mod error;
pub mod gzip;
#[cfg(feature = "multithread")]
pub mod parallel;
pub mod ragzip;

pub use error::{RagzipError, Result};
pub use ragzip::{resume, CacheMode, Extension, Footer, PageCache, RagzipReader, RagzipWriter};
