//! Upload and library event payload types
//!
//! Supporting types for upload progress tracking and library mutation
//! notifications.

use serde::{Deserialize, Serialize};

/// Terminal or pending state of one file in an upload batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcomeData {
    /// Not yet attempted
    Pending,
    /// Transferred and accepted by the server
    Succeeded,
    /// Rejected locally, refused by the server, or cancelled
    Failed { reason: String },
}

/// Library mutation that changed local state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Delete,
    BulkDelete,
    SetCategory,
    AddTags,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MutationKind::Delete => "delete",
            MutationKind::BulkDelete => "bulk_delete",
            MutationKind::SetCategory => "set_category",
            MutationKind::AddTags => "add_tags",
        }
    }
}
