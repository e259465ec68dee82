//! Error types for kbm-core
//!
//! Taxonomy of knowledge base operation failures and how each one reaches
//! the caller.

use kbm_common::FileId;
use thiserror::Error;

use crate::remote::RemoteError;
use crate::validator::RejectReason;

/// Knowledge base operation error
#[derive(Debug, Error)]
pub enum KbError {
    /// File failed local validation before any network call
    #[error("{name} was rejected: {reason}")]
    ValidationRejected { name: String, reason: RejectReason },

    /// Remote upload of one file failed
    #[error("Failed to upload {name}: {reason}")]
    TransferFailed { name: String, reason: String },

    /// Delete or update target is missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Some but not all ids in a bulk operation succeeded
    #[error(
        "Bulk operation partially failed: {} of {} items failed",
        .failed.len(),
        .failed.len() + .succeeded.len()
    )]
    BulkPartialFailure {
        succeeded: Vec<FileId>,
        failed: Vec<FileId>,
    },

    /// Generic network or server failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Operation was cancelled before it completed
    #[error("Operation cancelled")]
    Cancelled,

    /// kbm-common error
    #[error("Common error: {0}")]
    Common(#[from] kbm_common::Error),
}

impl From<RemoteError> for KbError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::NotFound(what) => KbError::NotFound(what),
            other => KbError::Transport(other.to_string()),
        }
    }
}

impl From<std::io::Error> for KbError {
    fn from(err: std::io::Error) -> Self {
        KbError::Common(kbm_common::Error::Io(err))
    }
}

/// Result type for knowledge base operations
pub type KbResult<T> = Result<T, KbError>;
