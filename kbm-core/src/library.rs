//! Local library state
//!
//! `LibraryStore` holds the current page, the authoritative total count and
//! the known categories and tags. It performs no I/O: the controller calls
//! the remote API and hands results to the store, which keeps the page,
//! the count and the facet listings consistent with each other.
//!
//! Page fetches are tagged with a generation number. Only the response to
//! the most recent `begin_fetch` is applied; anything older is stale.

use std::collections::BTreeSet;

use kbm_common::models::{Category, ListFilesRequest, ListFilesResponse, Tag, UsageCount};
use kbm_common::{FileId, KnowledgeFile};
use tracing::debug;

/// Files for one offset/limit window plus the unfiltered library total
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LibraryPage {
    pub items: Vec<KnowledgeFile>,
    pub total_count: u64,
    pub offset: u64,
    pub limit: u64,
}

impl LibraryPage {
    pub fn ids(&self) -> Vec<FileId> {
        self.items.iter().map(|f| f.id.clone()).collect()
    }

    pub fn get(&self, id: &FileId) -> Option<&KnowledgeFile> {
        self.items.iter().find(|f| &f.id == id)
    }

    pub fn contains(&self, id: &FileId) -> bool {
        self.get(id).is_some()
    }
}

/// Handle for an in-flight page fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    generation: u64,
    pub request: ListFilesRequest,
}

impl FetchTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied,
    /// A newer fetch was started; the response was discarded
    Stale,
}

/// Entry taken off the page by an optimistic delete
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedEntry {
    /// Position the entry occupied on the page
    pub index: usize,
    pub file: KnowledgeFile,
}

/// Current page, total count and facet listings
#[derive(Debug, Default)]
pub struct LibraryStore {
    page: LibraryPage,
    categories: Vec<Category>,
    tags: Vec<Tag>,
    generation: u64,
}

impl LibraryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(&self) -> &LibraryPage {
        &self.page
    }

    pub fn items(&self) -> &[KnowledgeFile] {
        &self.page.items
    }

    pub fn total_count(&self) -> u64 {
        self.page.total_count
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Start a fetch; any earlier ticket becomes stale
    pub fn begin_fetch(&mut self, request: ListFilesRequest) -> FetchTicket {
        self.generation += 1;
        FetchTicket {
            generation: self.generation,
            request,
        }
    }

    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        ticket.generation == self.generation
    }

    /// Replace the page wholesale with a fetch response
    pub fn apply_fetch(&mut self, ticket: &FetchTicket, response: ListFilesResponse) -> FetchOutcome {
        if !self.is_current(ticket) {
            debug!(
                generation = ticket.generation,
                latest = self.generation,
                "Discarding stale page response"
            );
            return FetchOutcome::Stale;
        }

        let mut items = response.files;
        // Guards against a server that ignores `limit`.
        items.truncate(ticket.request.limit as usize);

        self.page = LibraryPage {
            items,
            total_count: response.total,
            offset: ticket.request.offset,
            limit: ticket.request.limit,
        };
        FetchOutcome::Applied
    }

    /// Take an entry off the page without touching the total
    pub fn remove_local(&mut self, id: &FileId) -> Option<RemovedEntry> {
        let index = self.page.items.iter().position(|f| &f.id == id)?;
        let file = self.page.items.remove(index);
        Some(RemovedEntry { index, file })
    }

    /// Put an optimistically removed entry back where it was
    pub fn restore_local(&mut self, entry: RemovedEntry) {
        if self.page.contains(&entry.file.id) {
            return;
        }
        let index = entry.index.min(self.page.items.len());
        self.page.items.insert(index, entry.file);
    }

    pub fn decrement_total(&mut self, by: u64) {
        self.page.total_count = self.page.total_count.saturating_sub(by);
    }

    pub fn increment_total(&mut self, by: u64) {
        self.page.total_count += by;
    }

    /// Apply a remote bulk delete for the ids the server actually removed
    ///
    /// `total_count` drops by the number of page rows removed, so repeated
    /// ids and ids never shown on the page leave it alone.
    /// Returns that number.
    pub fn apply_bulk_delete(&mut self, deleted: &[FileId]) -> usize {
        let before = self.page.items.len();
        self.page.items.retain(|f| !deleted.contains(&f.id));
        let removed = before - self.page.items.len();
        debug!(requested = deleted.len(), removed, "Applied bulk delete");
        self.decrement_total(removed as u64);
        removed
    }

    /// Merge updated entries into the page by id
    ///
    /// Rows not in `updated` are untouched and updated entries missing from
    /// the page are not inserted. Category and tag usage counts follow the
    /// change.
    /// Returns the number of page rows replaced.
    pub fn apply_updates(&mut self, updated: &[KnowledgeFile]) -> usize {
        let mut merged = 0;
        for file in updated {
            let previous = self
                .page
                .items
                .iter()
                .position(|f| f.id == file.id)
                .map(|i| std::mem::replace(&mut self.page.items[i], file.clone()));

            if previous.is_some() {
                merged += 1;
            }
            self.track_facets(previous.as_ref(), Some(file));
        }
        merged
    }

    /// Count a freshly uploaded entry in the facet listings
    pub fn record_uploaded(&mut self, file: &KnowledgeFile) {
        self.track_facets(None, Some(file));
    }

    /// Drop facet usage held by deleted entries
    pub fn record_removed(&mut self, file: &KnowledgeFile) {
        self.track_facets(Some(file), None);
    }

    pub fn set_categories(&mut self, categories: Vec<Category>) {
        self.categories = categories;
    }

    pub fn set_tags(&mut self, tags: Vec<Tag>) {
        self.tags = tags;
    }

    fn track_facets(&mut self, before: Option<&KnowledgeFile>, after: Option<&KnowledgeFile>) {
        let old_category = before.and_then(|f| f.category.as_deref());
        let new_category = after.and_then(|f| f.category.as_deref());
        if old_category != new_category {
            if let Some(name) = old_category {
                adjust_usage(&mut self.categories, name, -1);
            }
            if let Some(name) = new_category {
                adjust_usage(&mut self.categories, name, 1);
            }
        }

        let empty = BTreeSet::new();
        let old_tags = before.map(|f| &f.tags).unwrap_or(&empty);
        let new_tags = after.map(|f| &f.tags).unwrap_or(&empty);
        for tag in old_tags.difference(new_tags) {
            adjust_usage(&mut self.tags, tag, -1);
        }
        for tag in new_tags.difference(old_tags) {
            adjust_usage(&mut self.tags, tag, 1);
        }
    }
}

/// Change the count for `name`, creating the entry on first positive use
///
/// Listings stay sorted by name. Counts never drop below zero and entries
/// are kept at zero since categories outlive their last file.
fn adjust_usage(list: &mut Vec<UsageCount>, name: &str, delta: i64) {
    match list.iter_mut().find(|u| u.name == name) {
        Some(entry) => {
            entry.count = if delta < 0 {
                entry.count.saturating_sub(delta.unsigned_abs())
            } else {
                entry.count + delta as u64
            };
        }
        None if delta > 0 => {
            let index = list.partition_point(|u| u.name.as_str() < name);
            list.insert(index, UsageCount::new(name, delta as u64));
        }
        None => {}
    }
}
