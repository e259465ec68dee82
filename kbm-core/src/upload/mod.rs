//! Multi-file upload
//!
//! `UploadPipeline` takes candidates plus category and tags and produces a
//! `BatchResult`; `UploadBatch` tracks per-file outcomes while it runs.

pub mod batch;
pub mod pipeline;

pub use batch::{BatchEntry, BatchResult, FileOutcome, UploadBatch, CANCELLED_REASON};
pub use pipeline::UploadPipeline;
