//! # KBM Common Library
//!
//! Shared code for the knowledge base manager crates:
//! - Library data model (files, categories, tags, search results)
//! - Event types (KbEvent enum) and the EventBus
//! - Configuration loading
//! - Common error type

pub mod config;
pub mod error;
pub mod events;
pub mod models;

pub use error::{Error, Result};
pub use models::{FileId, KnowledgeFile};
