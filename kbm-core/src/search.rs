//! Free-text search
//!
//! `SearchIndexClient` sends a query with the active filters to the remote
//! index and turns each result into a `SearchHit` whose name and snippets
//! are split into plain and highlighted segments.
//!
//! Highlighting is case-insensitive over Unicode text and never splits a
//! character.

use std::sync::Arc;

use kbm_common::KnowledgeFile;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{KbError, KbResult};
use crate::filter::FilterState;
use crate::remote::KnowledgeApi;

/// Lowercased, deduplicated query terms
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for term in query.split_whitespace().map(str::to_lowercase) {
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

/// Run of snippet text, either plain or a query match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnippetSegment {
    pub text: String,
    pub highlighted: bool,
}

/// Text split into plain and highlighted segments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HighlightedSnippet {
    pub segments: Vec<SnippetSegment>,
}

impl HighlightedSnippet {
    pub fn plain_text(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }

    /// Text with every match wrapped in `open` / `close`
    pub fn render_marked(&self, open: &str, close: &str) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            if segment.highlighted {
                out.push_str(open);
                out.push_str(&segment.text);
                out.push_str(close);
            } else {
                out.push_str(&segment.text);
            }
        }
        out
    }

    pub fn has_highlights(&self) -> bool {
        self.segments.iter().any(|s| s.highlighted)
    }

    fn push(&mut self, text: &str, highlighted: bool) {
        if text.is_empty() {
            return;
        }
        match self.segments.last_mut() {
            Some(last) if last.highlighted == highlighted => last.text.push_str(text),
            _ => self.segments.push(SnippetSegment {
                text: text.to_string(),
                highlighted,
            }),
        }
    }
}

/// Byte length of the prefix of `haystack` that case-insensitively equals `needle`
///
/// `needle` must already be lowercased.
fn match_at(haystack: &str, needle: &[char]) -> Option<usize> {
    let mut want = needle.iter();
    let mut remaining = needle.len();
    let mut consumed = 0;

    for ch in haystack.chars() {
        for lower in ch.to_lowercase() {
            match want.next() {
                Some(w) if *w == lower => remaining -= 1,
                _ => return None,
            }
        }
        consumed += ch.len_utf8();
        if remaining == 0 {
            return Some(consumed);
        }
    }
    None
}

/// Mark every occurrence of any term in `text`
///
/// Longer terms win when several match at the same position.
pub fn highlight(text: &str, terms: &[String]) -> HighlightedSnippet {
    let mut needles: Vec<Vec<char>> = terms
        .iter()
        .filter(|t| !t.is_empty())
        .map(|t| t.chars().flat_map(char::to_lowercase).collect())
        .collect();
    needles.sort_by_key(|n| std::cmp::Reverse(n.len()));

    let mut snippet = HighlightedSnippet::default();
    let mut plain_start = 0;
    let mut pos = 0;

    while pos < text.len() {
        let rest = &text[pos..];
        let matched = needles.iter().find_map(|n| match_at(rest, n));

        match matched {
            Some(len) => {
                snippet.push(&text[plain_start..pos], false);
                snippet.push(&text[pos..pos + len], true);
                pos += len;
                plain_start = pos;
            }
            None => {
                pos += rest.chars().next().map_or(1, char::len_utf8);
            }
        }
    }
    snippet.push(&text[plain_start..], false);
    snippet
}

/// Display record for one search result
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub file: KnowledgeFile,
    pub score: f32,
    /// File name with matched terms marked
    pub title: HighlightedSnippet,
    pub snippets: Vec<HighlightedSnippet>,
}

/// Client for the remote search index
pub struct SearchIndexClient {
    api: Arc<dyn KnowledgeApi>,
}

impl SearchIndexClient {
    pub fn new(api: Arc<dyn KnowledgeApi>) -> Self {
        Self { api }
    }

    /// Search with the active filters
    ///
    /// Whitespace-only queries return no hits without calling the index.
    /// Results the index returns outside the category, tag or type filters
    /// are dropped. Returns `KbError::Cancelled` if `cancel` fires first.
    pub async fn search(
        &self,
        query: &str,
        filter: &FilterState,
        cancel: &CancellationToken,
    ) -> KbResult<Vec<SearchHit>> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let query = query.trim();
        let options = filter.search_options(true);

        let results = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(query = %query, "Search cancelled");
                return Err(KbError::Cancelled);
            }
            results = self.api.search(query, &options) => results?,
        };

        // The free-text part is the index's job; only the facets are re-checked.
        let facets = FilterState {
            query: String::new(),
            ..filter.clone()
        };

        let hits: Vec<SearchHit> = results
            .into_iter()
            .filter(|r| facets.matches(&r.file))
            .map(|r| SearchHit {
                title: highlight(&r.file.name, &terms),
                snippets: r.snippets.iter().map(|s| highlight(s, &terms)).collect(),
                score: r.score,
                file: r.file,
            })
            .collect();

        debug!(query = %query, hits = hits.len(), "Search completed");
        Ok(hits)
    }
}
