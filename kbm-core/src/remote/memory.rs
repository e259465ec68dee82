//! In-memory knowledge base
//!
//! Behaves like the remote service for a single process: `list_files`
//! ignores filters and pages by offset/limit (newest first), categories and
//! tags are derived from the stored files, and search matches names, tags
//! and UTF-8 file content. Individual operations can be made to fail so
//! partial-failure paths can be exercised.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use kbm_common::models::{
    BulkDeleteReport, Category, FileId, FilePatch, KnowledgeFile, ListFilesRequest,
    ListFilesResponse, SearchOptions, SearchResult, Tag, UsageCount,
};

use super::{KnowledgeApi, RemoteError, RemoteResult, TransferProgress};
use crate::validator::Candidate;

/// Characters of context kept on each side of a search match
const SNIPPET_CONTEXT: usize = 40;

/// Operations that can be forced to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    ListFiles,
    Upload,
    Delete,
    BulkDelete,
    Update,
    BulkUpdate,
    ListCategories,
    ListTags,
    Search,
}

#[derive(Default)]
struct MemoryState {
    /// Newest first
    files: Vec<KnowledgeFile>,
    contents: HashMap<FileId, String>,
    next_id: u64,
    failing_ops: HashSet<RemoteOp>,
    failing_uploads: HashSet<String>,
    /// Ids `bulk_delete_files` reports as failed
    undeletable: HashSet<FileId>,
    /// Ids `bulk_update_files` silently skips
    unupdatable: HashSet<FileId>,
    max_upload_bytes: Option<u64>,
    calls: HashMap<RemoteOp, usize>,
}

impl MemoryState {
    fn enter(&mut self, op: RemoteOp) -> RemoteResult<()> {
        *self.calls.entry(op).or_insert(0) += 1;
        if self.failing_ops.contains(&op) {
            return Err(RemoteError::Status(503, format!("{:?} unavailable", op)));
        }
        Ok(())
    }

    fn position(&self, id: &FileId) -> Option<usize> {
        self.files.iter().position(|f| &f.id == id)
    }
}

/// Knowledge base held entirely in process memory
#[derive(Default)]
pub struct MemoryKnowledgeApi {
    state: Mutex<MemoryState>,
}

impl MemoryKnowledgeApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A poisoned lock only means a test panicked mid-call; the data is still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store a file directly, bypassing upload; returns its id
    pub fn seed(&self, name: &str, category: Option<&str>, tags: &[&str], content: &str) -> FileId {
        let mut state = self.lock();
        state.next_id += 1;
        let id = FileId::new(format!("file-{}", state.next_id));
        let now = Utc::now();
        let ext = kbm_common::models::extension_of(name);
        let content_type = ext
            .as_deref()
            .and_then(crate::validator::mime_for_extension)
            .unwrap_or("application/octet-stream");

        let file = KnowledgeFile {
            id: id.clone(),
            name: name.to_string(),
            size_bytes: content.len() as u64,
            content_type: content_type.to_string(),
            category: category.map(str::to_string),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            created_at: now,
            updated_at: now,
        };
        state.files.insert(0, file);
        state.contents.insert(id.clone(), content.to_string());
        id
    }

    /// Make every call of `op` fail with a 503 until `heal` is called
    pub fn fail(&self, op: RemoteOp) {
        self.lock().failing_ops.insert(op);
    }

    pub fn heal(&self, op: RemoteOp) {
        self.lock().failing_ops.remove(&op);
    }

    /// Make uploads of the named file fail
    pub fn fail_upload_of(&self, name: &str) {
        self.lock().failing_uploads.insert(name.to_string());
    }

    /// Refuse uploads larger than `bytes` (413)
    pub fn set_max_upload_bytes(&self, bytes: u64) {
        self.lock().max_upload_bytes = Some(bytes);
    }

    /// Report `id` as failed in bulk deletes
    pub fn protect_from_bulk_delete(&self, id: &FileId) {
        self.lock().undeletable.insert(id.clone());
    }

    /// Leave `id` out of bulk update responses
    pub fn skip_in_bulk_update(&self, id: &FileId) {
        self.lock().unupdatable.insert(id.clone());
    }

    /// Number of times `op` was invoked (including failed calls)
    pub fn calls(&self, op: RemoteOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn file_count(&self) -> usize {
        self.lock().files.len()
    }

    pub fn get(&self, id: &FileId) -> Option<KnowledgeFile> {
        let state = self.lock();
        state.position(id).map(|i| state.files[i].clone())
    }
}

fn usage<'a, I>(names: I) -> Vec<UsageCount>
where
    I: Iterator<Item = &'a String>,
{
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for name in names {
        *counts.entry(name.as_str()).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|(name, count)| UsageCount::new(name, count))
        .collect()
}

/// Excerpts of `content` around each case-insensitive match of `terms`
fn snippets(content: &str, terms: &[String]) -> Vec<String> {
    let lower = content.to_lowercase();
    // Byte offsets only line up when lowercasing preserved lengths.
    if lower.len() != content.len() {
        return Vec::new();
    }

    let mut out = Vec::new();
    let mut covered_until = 0;
    let mut starts: Vec<usize> = terms
        .iter()
        .flat_map(|t| lower.match_indices(t.as_str()).map(|(i, _)| i))
        .collect();
    starts.sort_unstable();

    for start in starts {
        if start < covered_until {
            continue;
        }
        let from = floor_char_boundary(content, start.saturating_sub(SNIPPET_CONTEXT));
        let to = ceil_char_boundary(content, (start + SNIPPET_CONTEXT).min(content.len()));
        out.push(content[from..to].trim().to_string());
        covered_until = to;
    }
    out
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(s: &str, mut i: usize) -> usize {
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

#[async_trait]
impl KnowledgeApi for MemoryKnowledgeApi {
    async fn list_files(&self, request: &ListFilesRequest) -> RemoteResult<ListFilesResponse> {
        let mut state = self.lock();
        state.enter(RemoteOp::ListFiles)?;

        let files = state
            .files
            .iter()
            .skip(request.offset as usize)
            .take(request.limit as usize)
            .cloned()
            .collect();

        Ok(ListFilesResponse {
            files,
            total: state.files.len() as u64,
        })
    }

    async fn upload_file(
        &self,
        candidate: &Candidate,
        category: Option<&str>,
        tags: &BTreeSet<String>,
        progress: Option<TransferProgress>,
    ) -> RemoteResult<KnowledgeFile> {
        let body = candidate
            .read_body()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        if let Some(p) = &progress {
            p.report(0, body.len() as u64);
        }

        let mut state = self.lock();
        state.enter(RemoteOp::Upload)?;

        if state.failing_uploads.contains(&candidate.name) {
            return Err(RemoteError::Status(
                422,
                format!("{} could not be processed", candidate.name),
            ));
        }
        if let Some(max) = state.max_upload_bytes {
            if body.len() as u64 > max {
                return Err(RemoteError::Status(413, "payload too large".to_string()));
            }
        }
        if state.files.iter().any(|f| f.name == candidate.name) {
            return Err(RemoteError::Status(
                409,
                format!("{} already exists", candidate.name),
            ));
        }

        state.next_id += 1;
        let id = FileId::new(format!("file-{}", state.next_id));
        let now = Utc::now();
        let file = KnowledgeFile {
            id: id.clone(),
            name: candidate.name.clone(),
            size_bytes: body.len() as u64,
            content_type: candidate.effective_content_type(),
            category: category.map(str::to_string),
            tags: tags.clone(),
            created_at: now,
            updated_at: now,
        };
        state.files.insert(0, file.clone());
        state
            .contents
            .insert(id, String::from_utf8_lossy(&body).into_owned());
        drop(state);

        if let Some(p) = &progress {
            p.report(body.len() as u64, body.len() as u64);
        }

        Ok(file)
    }

    async fn delete_file(&self, id: &FileId) -> RemoteResult<()> {
        let mut state = self.lock();
        state.enter(RemoteOp::Delete)?;

        let index = state
            .position(id)
            .ok_or_else(|| RemoteError::NotFound(format!("file {}", id)))?;
        state.files.remove(index);
        state.contents.remove(id);
        Ok(())
    }

    async fn bulk_delete_files(&self, ids: &[FileId]) -> RemoteResult<BulkDeleteReport> {
        let mut state = self.lock();
        state.enter(RemoteOp::BulkDelete)?;

        let mut report = BulkDeleteReport::default();
        for id in ids {
            if state.undeletable.contains(id) {
                report.failed.push(id.clone());
                continue;
            }
            if let Some(index) = state.position(id) {
                state.files.remove(index);
                state.contents.remove(id);
            }
        }
        Ok(report)
    }

    async fn update_file(&self, id: &FileId, patch: &FilePatch) -> RemoteResult<KnowledgeFile> {
        let mut state = self.lock();
        state.enter(RemoteOp::Update)?;

        let index = state
            .position(id)
            .ok_or_else(|| RemoteError::NotFound(format!("file {}", id)))?;
        let file = &mut state.files[index];
        patch.apply_to(file);
        file.updated_at = Utc::now();
        Ok(file.clone())
    }

    async fn bulk_update_files(
        &self,
        ids: &[FileId],
        patch: &FilePatch,
    ) -> RemoteResult<Vec<KnowledgeFile>> {
        let mut state = self.lock();
        state.enter(RemoteOp::BulkUpdate)?;

        let mut updated = Vec::new();
        for id in ids {
            if state.unupdatable.contains(id) {
                continue;
            }
            if let Some(index) = state.position(id) {
                let file = &mut state.files[index];
                patch.apply_to(file);
                file.updated_at = Utc::now();
                updated.push(file.clone());
            }
        }
        Ok(updated)
    }

    async fn list_categories(&self) -> RemoteResult<Vec<Category>> {
        let mut state = self.lock();
        state.enter(RemoteOp::ListCategories)?;
        Ok(usage(state.files.iter().filter_map(|f| f.category.as_ref())))
    }

    async fn list_tags(&self) -> RemoteResult<Vec<Tag>> {
        let mut state = self.lock();
        state.enter(RemoteOp::ListTags)?;
        Ok(usage(state.files.iter().flat_map(|f| f.tags.iter())))
    }

    async fn search(&self, query: &str, options: &SearchOptions) -> RemoteResult<Vec<SearchResult>> {
        let mut state = self.lock();
        state.enter(RemoteOp::Search)?;

        let terms: Vec<String> = query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        for file in &state.files {
            if let Some(category) = &options.category {
                if file.category.as_ref() != Some(category) {
                    continue;
                }
            }
            if !options.tags.is_empty() && !file.has_any_tag(&options.tags) {
                continue;
            }
            if let Some(kind) = options.file_type {
                if file.kind() != kind {
                    continue;
                }
            }

            let content = state.contents.get(&file.id).map(String::as_str).unwrap_or("");
            let haystack = format!(
                "{} {} {}",
                file.name.to_lowercase(),
                file.tags.iter().cloned().collect::<Vec<_>>().join(" ").to_lowercase(),
                content.to_lowercase()
            );
            let score: usize = terms.iter().map(|t| haystack.matches(t.as_str()).count()).sum();
            if score == 0 {
                continue;
            }

            results.push(SearchResult {
                file: file.clone(),
                score: score as f32,
                snippets: if options.include_snippets {
                    snippets(content, &terms)
                } else {
                    Vec::new()
                },
            });
        }

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(results)
    }
}
