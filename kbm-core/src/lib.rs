//! kbm-core - knowledge base manager client core
//!
//! Ingests documents into a categorized, searchable library and queries or
//! mutates that library through a remote `KnowledgeApi`:
//! - multi-file uploads where each file succeeds or fails on its own
//! - combined category / tag / type / free-text filtering over server-side pages
//! - bulk delete, recategorize and tag operations that keep the page,
//!   selection and counts consistent after partial success

pub mod controller;
pub mod error;
pub mod filter;
pub mod library;
pub mod notifications;
pub mod pagination;
pub mod remote;
pub mod search;
pub mod selection;
pub mod upload;
pub mod validator;

pub use controller::{BulkDeleteOutcome, DeleteOutcome, KnowledgeBaseController, ViewMode};
pub use error::{KbError, KbResult};
pub use filter::FilterState;
pub use remote::{HttpKnowledgeApi, KnowledgeApi, MemoryKnowledgeApi};
