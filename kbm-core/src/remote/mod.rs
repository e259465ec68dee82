//! Remote knowledge base collaborator
//!
//! Every library read and mutation goes through the `KnowledgeApi` trait.
//! Two implementations ship with the crate:
//! - `HttpKnowledgeApi`: JSON over HTTP via reqwest
//! - `MemoryKnowledgeApi`: in-process store with failure injection, used by
//!   tests and the CLI's offline mode

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use kbm_common::models::{
    BulkDeleteReport, Category, FileId, FilePatch, KnowledgeFile, ListFilesRequest,
    ListFilesResponse, SearchOptions, SearchResult, Tag,
};
use thiserror::Error;

use crate::validator::Candidate;

pub mod http;
pub mod memory;

pub use http::HttpKnowledgeApi;
pub use memory::{MemoryKnowledgeApi, RemoteOp};

/// Remote collaborator errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Server returned {0}: {1}")]
    Status(u16, String),

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    Decode(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Byte-level progress callback for a single transfer
///
/// Called with `(bytes_sent, bytes_total)`.
#[derive(Clone)]
pub struct TransferProgress(Arc<dyn Fn(u64, u64) + Send + Sync>);

impl TransferProgress {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(u64, u64) + Send + Sync + 'static,
    {
        Self(Arc::new(callback))
    }

    pub fn report(&self, bytes_sent: u64, bytes_total: u64) {
        (self.0)(bytes_sent, bytes_total)
    }
}

impl fmt::Debug for TransferProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TransferProgress")
    }
}

/// Contract of the remote knowledge base service
///
/// Any error means the operation did not take effect remotely.
#[async_trait]
pub trait KnowledgeApi: Send + Sync {
    /// One page of files plus the unfiltered library total
    async fn list_files(&self, request: &ListFilesRequest) -> RemoteResult<ListFilesResponse>;

    /// Transfer one file, tagging it with the given category and tags
    async fn upload_file(
        &self,
        candidate: &Candidate,
        category: Option<&str>,
        tags: &BTreeSet<String>,
        progress: Option<TransferProgress>,
    ) -> RemoteResult<KnowledgeFile>;

    async fn delete_file(&self, id: &FileId) -> RemoteResult<()>;

    /// Delete many files in one call
    ///
    /// `Ok` with a non-empty `failed` list means a partial success.
    async fn bulk_delete_files(&self, ids: &[FileId]) -> RemoteResult<BulkDeleteReport>;

    async fn update_file(&self, id: &FileId, patch: &FilePatch) -> RemoteResult<KnowledgeFile>;

    /// Apply one patch to many files; returns the updated entries
    async fn bulk_update_files(
        &self,
        ids: &[FileId],
        patch: &FilePatch,
    ) -> RemoteResult<Vec<KnowledgeFile>>;

    async fn list_categories(&self) -> RemoteResult<Vec<Category>>;

    async fn list_tags(&self) -> RemoteResult<Vec<Tag>>;

    async fn search(&self, query: &str, options: &SearchOptions) -> RemoteResult<Vec<SearchResult>>;
}
