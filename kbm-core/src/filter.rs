//! Library filter model
//!
//! A `FilterState` combines category, tags, file type and a free-text query.
//! Matching rules:
//! - category: exact, case-sensitive, single value
//! - tags: a file matches if it carries ANY selected tag
//! - file type: the file's kind equals the selected kind
//! - query: case-insensitive substring of the name or of any tag
//!
//! An empty filter matches every file.

use std::collections::BTreeSet;

use kbm_common::models::{FileKind, KnowledgeFile, ListFilesRequest, SearchOptions};

/// Active filter values shared by browse and search mode
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    pub category: Option<String>,
    pub tags: BTreeSet<String>,
    pub file_type: Option<FileKind>,
    pub query: String,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_file_type(mut self, kind: FileKind) -> Self {
        self.file_type = Some(kind);
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    /// Trimmed query, `None` when blank
    pub fn normalized_query(&self) -> Option<&str> {
        let q = self.query.trim();
        (!q.is_empty()).then_some(q)
    }

    pub fn is_empty(&self) -> bool {
        self.category.is_none()
            && self.tags.is_empty()
            && self.file_type.is_none()
            && self.normalized_query().is_none()
    }

    /// True if `file` satisfies every active filter
    pub fn matches(&self, file: &KnowledgeFile) -> bool {
        if let Some(category) = &self.category {
            if file.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }

        if !self.tags.is_empty() && !file.has_any_tag(&self.tags) {
            return false;
        }

        if let Some(kind) = self.file_type {
            if file.kind() != kind {
                return false;
            }
        }

        if let Some(query) = self.normalized_query() {
            let needle = query.to_lowercase();
            let in_name = file.name.to_lowercase().contains(&needle);
            let in_tags = file.tags.iter().any(|t| t.to_lowercase().contains(&needle));
            if !in_name && !in_tags {
                return false;
            }
        }

        true
    }

    /// Options for the search index carrying the same filters
    pub fn search_options(&self, include_snippets: bool) -> SearchOptions {
        SearchOptions {
            category: self.category.clone(),
            tags: self.tags.clone(),
            file_type: self.file_type,
            include_snippets,
        }
    }
}

/// Build the list request for a filter and page
///
/// Pure: the same arguments always produce the same request.
pub fn build_request(filter: &FilterState, page_index: u64, page_size: u64) -> ListFilesRequest {
    ListFilesRequest {
        offset: page_index.saturating_mul(page_size),
        limit: page_size,
        category: filter.category.clone(),
        tags: filter.tags.clone(),
        file_type: filter.file_type,
        query: filter.normalized_query().map(str::to_string),
    }
}

/// Keep only the entries matching every active filter, preserving order
pub fn reduce<'a>(files: &'a [KnowledgeFile], filter: &FilterState) -> Vec<&'a KnowledgeFile> {
    files.iter().filter(|f| filter.matches(f)).collect()
}

/// Request descriptor plus the page index it was built for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRequest {
    pub page_index: u64,
    pub request: ListFilesRequest,
}

/// Request builder that remembers the previous filter
///
/// Any change in filter values between calls resets the page index to 0,
/// so a narrower filter never asks for an offset past its last page.
#[derive(Debug, Clone, Default)]
pub struct FilterEngine {
    previous: Option<FilterState>,
}

impl FilterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build_request(
        &mut self,
        filter: &FilterState,
        page_index: u64,
        page_size: u64,
    ) -> ResolvedRequest {
        let changed = self.previous.as_ref().map_or(false, |prev| prev != filter);
        let page_index = if changed { 0 } else { page_index };
        self.previous = Some(filter.clone());

        ResolvedRequest {
            page_index,
            request: build_request(filter, page_index, page_size),
        }
    }
}
