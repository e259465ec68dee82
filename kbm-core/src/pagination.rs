//! Pagination utilities
//!
//! Pages are 0-indexed: page 0 starts at offset 0.

/// Pagination metadata calculated from the total count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Current page index (0-indexed, clamped to the last page)
    pub page_index: u64,
    /// Total number of pages (0 for an empty library)
    pub total_pages: u64,
    /// Offset for the list request
    pub offset: u64,
}

/// Calculate pagination metadata from total results and requested page
///
/// Ensures the page index is within `[0, total_pages - 1]` so a request is
/// never issued for an out-of-range offset.
///
/// # Examples
/// ```
/// use kbm_core::pagination::calculate_pagination;
///
/// // 45 entries at 20 per page = 3 pages (20 + 20 + 5)
/// let p = calculate_pagination(45, 1, 20);
/// assert_eq!(p.page_index, 1);
/// assert_eq!(p.total_pages, 3);
/// assert_eq!(p.offset, 20);
///
/// // Requesting an out-of-bounds page gets clamped
/// let p = calculate_pagination(45, 99, 20);
/// assert_eq!(p.page_index, 2);
/// assert_eq!(p.offset, 40);
/// ```
pub fn calculate_pagination(total_results: u64, requested_page: u64, page_size: u64) -> Pagination {
    let page_size = page_size.max(1);
    let total_pages = total_results.div_ceil(page_size);
    let page_index = requested_page.min(total_pages.saturating_sub(1));
    let offset = page_index * page_size;

    Pagination {
        page_index,
        total_pages,
        offset,
    }
}
