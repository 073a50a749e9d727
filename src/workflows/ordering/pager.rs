//! Stateless slicing of ordered sequences into fixed-size pages.
//!
//! A page index past the end clamps to the FIRST page, not the last. The
//! surrounding portal resets to page one whenever a result set shrinks below
//! the previously selected page, and callers depend on that behavior.

/// Page size used when a caller does not supply one.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Number of pages needed to show `len` items at `page_size` per page.
pub fn max_pages(len: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    len.div_ceil(page_size)
}

/// Borrow the requested page of `items`, clamping out-of-range indexes to
/// page zero.
pub fn page<T>(items: &[T], page_index: usize, page_size: usize) -> &[T] {
    if page_size == 0 {
        return &items[..0];
    }

    let pages = max_pages(items.len(), page_size);
    let effective = if page_index >= pages { 0 } else { page_index };

    let start = effective * page_size;
    if start >= items.len() {
        return &items[..0];
    }
    let end = usize::min(start + page_size, items.len());
    &items[start..end]
}
