//! Knowledge base controller
//!
//! Owns one instance of every component (library store, filter engine,
//! selection, upload pipeline, search client, notifications) and performs
//! the remote calls that move state between them. All mutation happens
//! through `&mut self`, so operations are applied one at a time in the
//! order they are awaited.
//!
//! Browse and search are mutually exclusive view modes sharing a single
//! `FilterState`.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use kbm_common::config::{DeleteFailurePolicy, KbmConfig};
use kbm_common::events::{EventBus, KbEvent, MutationKind};
use kbm_common::models::{Category, FilePatch, ListFilesResponse, Tag};
use kbm_common::{FileId, KnowledgeFile};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{KbError, KbResult};
use crate::filter::{self, FilterEngine, FilterState};
use crate::library::{FetchOutcome, FetchTicket, LibraryPage, LibraryStore};
use crate::notifications::NotificationCenter;
use crate::pagination::{calculate_pagination, Pagination};
use crate::remote::{KnowledgeApi, RemoteError, RemoteResult};
use crate::search::{SearchHit, SearchIndexClient};
use crate::selection::SelectionSet;
use crate::upload::{BatchResult, UploadPipeline};
use crate::validator::{Candidate, FileValidator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Browse,
    Search,
}

/// Result of `delete_one`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The server no longer had the file; treated as success
    NotFound,
}

/// Ids removed by a fully successful bulk delete
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkDeleteOutcome {
    pub deleted: Vec<FileId>,
}

pub struct KnowledgeBaseController {
    api: Arc<dyn KnowledgeApi>,
    store: LibraryStore,
    filter: FilterState,
    engine: FilterEngine,
    selection: SelectionSet,
    pipeline: UploadPipeline,
    search_client: SearchIndexClient,
    notifications: NotificationCenter,
    events: EventBus,
    page_size: u64,
    page_index: u64,
    delete_policy: DeleteFailurePolicy,
    mode: ViewMode,
    search_hits: Vec<SearchHit>,
}

impl KnowledgeBaseController {
    pub fn new(api: Arc<dyn KnowledgeApi>, config: &KbmConfig, events: EventBus) -> Self {
        let pipeline = UploadPipeline::new(
            Arc::clone(&api),
            FileValidator::new(&config.upload),
            events.clone(),
        );
        let search_client = SearchIndexClient::new(Arc::clone(&api));

        Self {
            api,
            store: LibraryStore::new(),
            filter: FilterState::default(),
            engine: FilterEngine::new(),
            selection: SelectionSet::new(),
            pipeline,
            search_client,
            notifications: NotificationCenter::from_config(&config.notifications),
            events,
            page_size: config.page_size,
            page_index: 0,
            delete_policy: config.library.delete_failure_policy,
            mode: ViewMode::Browse,
            search_hits: Vec::new(),
        }
    }

    // ---- read access ----

    pub fn page(&self) -> &LibraryPage {
        self.store.page()
    }

    pub fn store(&self) -> &LibraryStore {
        &self.store
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    pub fn notifications_mut(&mut self) -> &mut NotificationCenter {
        &mut self.notifications
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn search_hits(&self) -> &[SearchHit] {
        &self.search_hits
    }

    pub fn page_index(&self) -> u64 {
        self.page_index
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn pagination(&self) -> Pagination {
        calculate_pagination(self.store.total_count(), self.page_index, self.page_size)
    }

    /// Page entries that match every active filter
    pub fn visible_files(&self) -> Vec<&KnowledgeFile> {
        filter::reduce(self.store.items(), &self.filter)
    }

    fn visible_ids(&self) -> Vec<FileId> {
        self.visible_files().iter().map(|f| f.id.clone()).collect()
    }

    // ---- browsing ----

    /// Fetch the current page for the current filter
    ///
    /// On failure the previous page stays visible and an error banner is
    /// raised.
    pub async fn refresh(&mut self) -> KbResult<FetchOutcome> {
        let ticket = self.begin_refresh();
        let response = self.api.list_files(&ticket.request).await;
        self.complete_refresh(&ticket, response)
    }

    /// Build the request for the current filter and page and start a fetch
    ///
    /// Any fetch started earlier becomes stale.
    pub fn begin_refresh(&mut self) -> FetchTicket {
        let resolved = self
            .engine
            .build_request(&self.filter, self.page_index, self.page_size);
        self.page_index = resolved.page_index;
        self.store.begin_fetch(resolved.request)
    }

    /// Apply the response to a fetch started with `begin_refresh`
    pub fn complete_refresh(
        &mut self,
        ticket: &FetchTicket,
        response: RemoteResult<ListFilesResponse>,
    ) -> KbResult<FetchOutcome> {
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                if !self.store.is_current(ticket) {
                    debug!(error = %e, "Ignoring failure of a stale fetch");
                    return Ok(FetchOutcome::Stale);
                }
                error!(error = %e, offset = ticket.request.offset, "Failed to load library page");
                self.notifications
                    .error(format!("Failed to load files: {}", e), Instant::now());
                return Err(e.into());
            }
        };

        let outcome = self.store.apply_fetch(ticket, response);
        if outcome == FetchOutcome::Applied {
            let visible = self.visible_ids();
            self.selection.retain_visible(&visible);

            let page = self.store.page();
            debug!(
                offset = page.offset,
                items = page.items.len(),
                total = page.total_count,
                "Library page loaded"
            );
            self.events.emit_lossy(KbEvent::LibraryPageLoaded {
                offset: page.offset,
                limit: page.limit,
                item_count: page.items.len(),
                total_count: page.total_count,
                timestamp: Utc::now(),
            });
        }
        Ok(outcome)
    }

    /// Replace the filter and reload from the first page
    ///
    /// In search mode the search is re-run with the new filter instead.
    pub async fn set_filter(&mut self, filter: FilterState) -> KbResult<()> {
        self.filter = filter;
        match self.mode {
            ViewMode::Browse => self.refresh().await.map(|_| ()),
            ViewMode::Search => {
                let query = self.filter.query.clone();
                self.search(&query, &CancellationToken::new()).await.map(|_| ())
            }
        }
    }

    pub async fn clear_filters(&mut self) -> KbResult<()> {
        self.set_filter(FilterState::default()).await
    }

    /// Move to a page, clamped to the known page range
    pub async fn go_to_page(&mut self, page_index: u64) -> KbResult<FetchOutcome> {
        self.page_index =
            calculate_pagination(self.store.total_count(), page_index, self.page_size).page_index;
        self.refresh().await
    }

    // ---- selection ----

    /// Toggle an id; ids not visible on the page are ignored
    pub fn toggle_selection(&mut self, id: &FileId) -> bool {
        if !self.visible_files().iter().any(|f| &f.id == id) {
            return false;
        }
        self.selection.toggle(id);
        true
    }

    /// Select every visible entry, or clear when all are selected already
    pub fn select_all(&mut self) {
        let visible = self.visible_ids();
        self.selection.select_all(&visible);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    // ---- uploads ----

    /// Upload a batch with advisory validation and refresh on any success
    pub async fn upload_files(
        &mut self,
        files: Vec<Candidate>,
        category: Option<&str>,
        tags: &BTreeSet<String>,
        cancel: &CancellationToken,
    ) -> BatchResult {
        let result = self.pipeline.submit(files, category, tags, cancel).await;

        for file in &result.uploaded {
            self.store.record_uploaded(file);
        }

        if let Some(message) = result.summary_message() {
            if result.has_failures() {
                self.notifications.error(message, Instant::now());
            } else {
                self.notifications.success(message, Instant::now());
            }
        }

        if result.has_successes() {
            self.refresh_after_mutation().await;
        }
        result
    }

    /// Upload one file with strict validation
    pub async fn upload_single(
        &mut self,
        candidate: &Candidate,
        category: Option<&str>,
        tags: &BTreeSet<String>,
    ) -> KbResult<KnowledgeFile> {
        match self.pipeline.submit_single(candidate, category, tags).await {
            Ok(file) => {
                self.store.record_uploaded(&file);
                self.notifications
                    .success(format!("Successfully uploaded {}", file.name), Instant::now());
                self.refresh_after_mutation().await;
                Ok(file)
            }
            Err(e) => {
                self.notifications.error(e.to_string(), Instant::now());
                Err(e)
            }
        }
    }

    // ---- mutations ----

    /// Delete one file with an optimistic local removal
    ///
    /// The entry leaves the page and the selection before the remote call.
    /// A file the server no longer has counts as deleted. On any other
    /// failure the configured `DeleteFailurePolicy` decides whether the
    /// entry comes back.
    pub async fn delete_one(&mut self, id: &FileId) -> KbResult<DeleteOutcome> {
        let removed = self.store.remove_local(id);
        self.selection.remove(id);
        if removed.is_some() {
            self.store.decrement_total(1);
        }

        let outcome = match self.api.delete_file(id).await {
            Ok(()) => {
                if removed.is_none() {
                    self.store.decrement_total(1);
                }
                DeleteOutcome::Deleted
            }
            Err(RemoteError::NotFound(_)) => {
                info!(id = %id, "File already gone on the server");
                DeleteOutcome::NotFound
            }
            Err(e) => {
                error!(id = %id, error = %e, policy = ?self.delete_policy, "Delete failed");
                if let (DeleteFailurePolicy::RollBack, Some(entry)) = (self.delete_policy, removed) {
                    self.store.restore_local(entry);
                    self.store.increment_total(1);
                }
                self.notifications
                    .error(format!("Failed to delete file: {}", e), Instant::now());
                return Err(e.into());
            }
        };

        if let Some(entry) = &removed {
            self.store.record_removed(&entry.file);
        }
        self.emit_mutation(MutationKind::Delete, usize::from(removed.is_some()));
        self.notifications.success("File deleted", Instant::now());
        Ok(outcome)
    }

    /// Delete several files in one remote call
    ///
    /// A transport failure changes nothing locally. When the server reports
    /// per-id failures the other ids are removed and
    /// `KbError::BulkPartialFailure` names both sets.
    pub async fn bulk_delete(&mut self, ids: &[FileId]) -> KbResult<BulkDeleteOutcome> {
        let mut seen = HashSet::new();
        let ids: Vec<FileId> = ids.iter().filter(|id| seen.insert(*id)).cloned().collect();
        if ids.is_empty() {
            return Ok(BulkDeleteOutcome::default());
        }

        let report = match self.api.bulk_delete_files(&ids).await {
            Ok(report) => report,
            Err(e) => {
                error!(count = ids.len(), error = %e, "Bulk delete failed");
                self.notifications
                    .error(format!("Failed to delete files: {}", e), Instant::now());
                return Err(e.into());
            }
        };

        let failed_set: HashSet<&FileId> = report.failed.iter().collect();
        let deleted: Vec<FileId> = ids
            .iter()
            .filter(|id| !failed_set.contains(id))
            .cloned()
            .collect();

        let removed_files: Vec<KnowledgeFile> = deleted
            .iter()
            .filter_map(|id| self.store.page().get(id).cloned())
            .collect();
        for file in &removed_files {
            self.store.record_removed(file);
        }
        let removed = self.store.apply_bulk_delete(&deleted);
        for id in &deleted {
            self.selection.remove(id);
        }
        self.emit_mutation(MutationKind::BulkDelete, removed);

        if report.failed.is_empty() {
            info!(count = deleted.len(), "Bulk delete completed");
            self.notifications
                .success(format!("Deleted {} files", deleted.len()), Instant::now());
            Ok(BulkDeleteOutcome { deleted })
        } else {
            let err = KbError::BulkPartialFailure {
                succeeded: deleted,
                failed: report.failed,
            };
            warn!(error = %err, "Bulk delete partially failed");
            self.notifications.error(err.to_string(), Instant::now());
            Err(err)
        }
    }

    /// Bulk delete whatever is selected
    pub async fn bulk_delete_selected(&mut self) -> KbResult<BulkDeleteOutcome> {
        let ids = self.selection.ids();
        self.bulk_delete(&ids).await
    }

    /// Assign one category to many files
    pub async fn bulk_set_category(
        &mut self,
        ids: &[FileId],
        category: &str,
    ) -> KbResult<Vec<KnowledgeFile>> {
        self.bulk_update(ids, FilePatch::set_category(category), MutationKind::SetCategory)
            .await
    }

    /// Add tags to many files, keeping their existing tags
    pub async fn bulk_add_tags(
        &mut self,
        ids: &[FileId],
        tags: &BTreeSet<String>,
    ) -> KbResult<Vec<KnowledgeFile>> {
        self.bulk_update(ids, FilePatch::add_tags(tags.iter().cloned()), MutationKind::AddTags)
            .await
    }

    async fn bulk_update(
        &mut self,
        ids: &[FileId],
        patch: FilePatch,
        kind: MutationKind,
    ) -> KbResult<Vec<KnowledgeFile>> {
        if ids.is_empty() || patch.is_empty() {
            return Ok(Vec::new());
        }

        let updated = match self.api.bulk_update_files(ids, &patch).await {
            Ok(updated) => updated,
            Err(e) => {
                error!(kind = kind.as_str(), count = ids.len(), error = %e, "Bulk update failed");
                self.notifications
                    .error(format!("Failed to update files: {}", e), Instant::now());
                return Err(e.into());
            }
        };

        let merged = self.store.apply_updates(&updated);
        let visible = self.visible_ids();
        self.selection.retain_visible(&visible);
        self.emit_mutation(kind, merged);

        let returned: HashSet<&FileId> = updated.iter().map(|f| &f.id).collect();
        let missing: Vec<FileId> = ids
            .iter()
            .filter(|id| !returned.contains(id))
            .cloned()
            .collect();

        if missing.is_empty() {
            info!(kind = kind.as_str(), count = updated.len(), "Bulk update completed");
            self.notifications
                .success(format!("Updated {} files", updated.len()), Instant::now());
            Ok(updated)
        } else {
            let err = KbError::BulkPartialFailure {
                succeeded: updated.into_iter().map(|f| f.id).collect(),
                failed: missing,
            };
            warn!(kind = kind.as_str(), error = %err, "Bulk update partially failed");
            self.notifications.error(err.to_string(), Instant::now());
            Err(err)
        }
    }

    // ---- facets ----

    pub async fn list_categories(&mut self) -> KbResult<Vec<Category>> {
        match self.api.list_categories().await {
            Ok(categories) => {
                self.store.set_categories(categories.clone());
                Ok(categories)
            }
            Err(e) => {
                self.notifications
                    .error(format!("Failed to load categories: {}", e), Instant::now());
                Err(e.into())
            }
        }
    }

    pub async fn list_tags(&mut self) -> KbResult<Vec<Tag>> {
        match self.api.list_tags().await {
            Ok(tags) => {
                self.store.set_tags(tags.clone());
                Ok(tags)
            }
            Err(e) => {
                self.notifications
                    .error(format!("Failed to load tags: {}", e), Instant::now());
                Err(e.into())
            }
        }
    }

    /// Refresh both facet listings
    pub async fn load_facets(&mut self) -> KbResult<()> {
        self.list_categories().await?;
        self.list_tags().await?;
        Ok(())
    }

    // ---- search ----

    /// Switch to search mode and run `query` with the active filters
    ///
    /// Returns the number of hits. A blank query yields no hits without a
    /// remote call. A cancelled search leaves the previous hits in place.
    pub async fn search(&mut self, query: &str, cancel: &CancellationToken) -> KbResult<usize> {
        self.mode = ViewMode::Search;
        self.filter.query = query.to_string();

        match self.search_client.search(query, &self.filter, cancel).await {
            Ok(hits) => {
                self.events.emit_lossy(KbEvent::SearchCompleted {
                    query: query.trim().to_string(),
                    hit_count: hits.len(),
                    timestamp: Utc::now(),
                });
                self.search_hits = hits;
                Ok(self.search_hits.len())
            }
            Err(KbError::Cancelled) => {
                debug!(query = %query, "Search discarded after cancellation");
                Err(KbError::Cancelled)
            }
            Err(e) => {
                error!(query = %query, error = %e, "Search failed");
                self.notifications
                    .error(format!("Search failed: {}", e), Instant::now());
                Err(e)
            }
        }
    }

    /// Replace the whole filter, query included, and search with it
    pub async fn search_with(
        &mut self,
        filter: FilterState,
        cancel: &CancellationToken,
    ) -> KbResult<usize> {
        let query = filter.query.clone();
        self.filter = filter;
        self.search(&query, cancel).await
    }

    /// Leave search mode, drop the query and reload the page
    pub async fn enter_browse_mode(&mut self) -> KbResult<FetchOutcome> {
        self.mode = ViewMode::Browse;
        self.search_hits.clear();
        self.filter.query.clear();
        self.refresh().await
    }

    pub fn dismiss_banner(&mut self) {
        self.notifications.dismiss_banner();
    }

    // ---- helpers ----

    /// Reload after a mutation; failures only surface as a banner
    async fn refresh_after_mutation(&mut self) {
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "Refresh after mutation failed");
        }
    }

    fn emit_mutation(&self, kind: MutationKind, affected: usize) {
        self.events.emit_lossy(KbEvent::LibraryMutated {
            kind,
            affected,
            timestamp: Utc::now(),
        });
    }
}
