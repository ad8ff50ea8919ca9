//! Parallel encode/decode pipelines (spec.md §4.7, §4.8), gated behind the
//! `multithread` feature.

pub mod decoder;
pub mod encoder;
pub mod threadpool;

pub use decoder::decode_parallel;
pub use encoder::{encode_parallel, ParallelEncodeOptions};
pub use threadpool::BoundedPool;
