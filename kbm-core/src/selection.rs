//! Bulk-action selection
//!
//! The selection only ever holds ids visible on the current page. Callers
//! prune it with `retain_visible` or `remove` whenever entries leave the page.

use std::collections::BTreeSet;

use kbm_common::FileId;

/// Set of file ids marked for a bulk action
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    ids: BTreeSet<FileId>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip one id in or out of the selection
    pub fn toggle(&mut self, id: &FileId) {
        if !self.ids.remove(id) {
            self.ids.insert(id.clone());
        }
    }

    /// Select every id on the page, or clear if they are all selected already
    pub fn select_all<'a, I>(&mut self, current_page_ids: I)
    where
        I: IntoIterator<Item = &'a FileId>,
    {
        let page: BTreeSet<FileId> = current_page_ids.into_iter().cloned().collect();
        if !page.is_empty() && page.is_subset(&self.ids) {
            self.ids.clear();
        } else {
            self.ids.extend(page);
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn is_selected(&self, id: &FileId) -> bool {
        self.ids.contains(id)
    }

    pub fn remove(&mut self, id: &FileId) -> bool {
        self.ids.remove(id)
    }

    /// Drop every id not present in `visible`
    pub fn retain_visible<'a, I>(&mut self, visible: I)
    where
        I: IntoIterator<Item = &'a FileId>,
    {
        let visible: BTreeSet<&FileId> = visible.into_iter().collect();
        self.ids.retain(|id| visible.contains(id));
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Selected ids in stable order
    pub fn ids(&self) -> Vec<FileId> {
        self.ids.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileId> {
        self.ids.iter()
    }
}
