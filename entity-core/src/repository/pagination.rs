//! Page requests and page results
//!
//! Pagination is 1-based. [`paginate`] slices an already filtered and ordered
//! result and reports the total of the unsliced set, so callers can tell
//! "nothing matched" (page 1, total 0) apart from "that page does not exist".
//!
//! # Example
//!
//! ```rust
//! use entity_core::repository::{paginate, PageRequest};
//!
//! let items: Vec<u32> = (0..7).collect();
//! let page = paginate(items, PageRequest::new(2, 3).unwrap()).unwrap();
//!
//! assert_eq!(page.items, vec![3, 4, 5]);
//! assert_eq!(page.total, 7);
//! assert_eq!(page.total_pages(), 3);
//! ```

use serde::{Deserialize, Serialize};

use super::error::RepositoryError;
use super::traits::RepositoryResult;

/// Page size used when a query does not specify one
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// A validated 1-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    page: u64,
    page_size: u64,
}

impl PageRequest {
    /// Validate a page number and page size
    ///
    /// # Errors
    ///
    /// Returns `InvalidPagination` if either value is below 1.
    pub fn new(page: u64, page_size: u64) -> RepositoryResult<Self> {
        if page < 1 {
            return Err(RepositoryError::invalid_pagination(format!(
                "Page must be at least 1, got {}",
                page
            )));
        }
        if page_size < 1 {
            return Err(RepositoryError::invalid_pagination(format!(
                "Page size must be at least 1, got {}",
                page_size
            )));
        }
        Ok(Self { page, page_size })
    }

    /// The first page of the given size
    pub fn first(page_size: u64) -> RepositoryResult<Self> {
        Self::new(1, page_size)
    }

    /// 1-based page number
    pub fn page(&self) -> u64 {
        self.page
    }

    /// Maximum number of items on the page
    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Number of items preceding this page
    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// One page of an ordered, filtered result
///
/// `total` counts every entity that matched the filter, not just `items`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Entities on this page, in query order
    pub items: Vec<T>,
    /// 1-based page number
    pub page: u64,
    /// Requested page size
    pub page_size: u64,
    /// Number of entities matching the filter before slicing
    pub total: u64,
}

impl<T> Page<T> {
    /// Number of pages needed to hold `total` entities
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(self.page_size)
    }

    /// Whether a later page exists
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    /// Whether an earlier page exists
    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    /// Whether this page holds no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Transform the items while keeping page metadata
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            page_size: self.page_size,
            total: self.total,
        }
    }
}

/// Slice `ordered` to the requested page
///
/// # Errors
///
/// Returns `PageOutOfRange` when `page > 1` and no item falls on it. Page 1
/// always succeeds, even when nothing matched.
pub fn paginate<T>(ordered: Vec<T>, request: PageRequest) -> RepositoryResult<Page<T>> {
    let total = ordered.len() as u64;
    let offset = request.offset();

    if request.page > 1 && offset >= total {
        return Err(RepositoryError::page_out_of_range(
            request.page,
            request.page_size,
            total,
        ));
    }

    let skip = usize::try_from(offset).unwrap_or(usize::MAX);
    let take = usize::try_from(request.page_size).unwrap_or(usize::MAX);
    let items = ordered.into_iter().skip(skip).take(take).collect();

    Ok(Page {
        items,
        page: request.page,
        page_size: request.page_size,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryErrorKind;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("A{}", i)).collect()
    }

    #[test]
    fn test_request_rejects_zero() {
        let err = PageRequest::new(0, 10).unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::InvalidPagination);
        let err = PageRequest::new(1, 0).unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::InvalidPagination);
    }

    #[test]
    fn test_request_offset() {
        assert_eq!(PageRequest::new(1, 20).unwrap().offset(), 0);
        assert_eq!(PageRequest::new(3, 20).unwrap().offset(), 40);
        assert_eq!(PageRequest::default().page_size(), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_seven_items_in_pages_of_three() {
        let page = paginate(names(7), PageRequest::new(2, 3).unwrap()).unwrap();
        assert_eq!(page.items, vec!["A3", "A4", "A5"]);
        assert_eq!(page.total, 7);
        assert_eq!(page.page, 2);
        assert_eq!(page.page_size, 3);
        assert!(page.has_next());
        assert!(page.has_previous());

        let last = paginate(names(7), PageRequest::new(3, 3).unwrap()).unwrap();
        assert_eq!(last.items, vec!["A6"]);
        assert_eq!(last.total, 7);
        assert!(!last.has_next());

        let err = paginate(names(7), PageRequest::new(4, 3).unwrap()).unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::PageOutOfRange);
    }

    #[test]
    fn test_empty_first_page_is_not_an_error() {
        let page = paginate(Vec::<String>::new(), PageRequest::first(10).unwrap()).unwrap();
        assert!(page.is_empty());
        assert_eq!(page.total, 0);
        assert_eq!(page.total_pages(), 0);

        let err = paginate(Vec::<String>::new(), PageRequest::new(2, 10).unwrap()).unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::PageOutOfRange);
    }

    #[test]
    fn test_exact_multiple_has_no_trailing_page() {
        let err = paginate(names(6), PageRequest::new(3, 3).unwrap()).unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::PageOutOfRange);
    }

    #[test]
    fn test_page_serializes_camel_case() {
        let page = paginate(vec![1, 2], PageRequest::first(5).unwrap()).unwrap();
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"items": [1, 2], "page": 1, "pageSize": 5, "total": 2})
        );
    }

    #[test]
    fn test_map_keeps_metadata() {
        let page = paginate(names(5), PageRequest::new(2, 2).unwrap())
            .unwrap()
            .map(|s| s.len());
        assert_eq!(page.items, vec![2, 2]);
        assert_eq!(page.total, 5);
        assert_eq!(page.page, 2);
    }

    proptest! {
        /// Walking every page visits each item exactly once
        #[test]
        fn pages_partition_the_result(total in 0usize..60, page_size in 1u64..10) {
            let items: Vec<usize> = (0..total).collect();
            let first = paginate(items.clone(), PageRequest::first(page_size).unwrap()).unwrap();
            prop_assert_eq!(first.total, total as u64);

            let mut seen = HashSet::new();
            let mut count = 0usize;
            for page in 1..=first.total_pages() {
                let slice = paginate(items.clone(), PageRequest::new(page, page_size).unwrap()).unwrap();
                prop_assert!(slice.items.len() as u64 <= page_size);
                prop_assert_eq!(slice.total, total as u64);
                count += slice.items.len();
                for item in slice.items {
                    prop_assert!(seen.insert(item));
                }
            }
            prop_assert_eq!(count, total);

            let beyond = first.total_pages() + 1;
            if total > 0 {
                let err = paginate(items, PageRequest::new(beyond, page_size).unwrap()).unwrap_err();
                prop_assert_eq!(err.kind, RepositoryErrorKind::PageOutOfRange);
            }
        }
    }
}
