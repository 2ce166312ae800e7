//! Shared types and result types for the database layer

pub mod errors;

use chrono::{SecondsFormat, Utc};

pub use errors::DatabaseError;

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Current UTC time as stored in every timestamp column.
///
/// Microsecond precision with a `Z` suffix keeps lexical and chronological
/// ordering identical.
pub fn current_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Offset-based window into a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Pagination {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: limit.max(0),
            offset: offset.max(0),
        }
    }

    /// One-based page number to offset translation. Offsets past
    /// `i64::MAX` saturate.
    pub fn page(page: i64, page_size: i64) -> Self {
        let page_size = page_size.max(1);
        Self::new(page_size, (page.max(1) - 1).saturating_mul(page_size))
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(20, 0)
    }
}

/// One page of results together with the unpaginated total.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_numbers_translate_to_offsets() {
        assert_eq!(Pagination::page(1, 20), Pagination::new(20, 0));
        assert_eq!(Pagination::page(3, 20), Pagination::new(20, 40));
        assert_eq!(Pagination::page(0, 10).offset, 0);
        assert_eq!(Pagination::page(i64::MAX, 100).offset, i64::MAX);
    }

    #[test]
    fn timestamps_sort_lexically() {
        let first = current_timestamp();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = current_timestamp();
        assert!(first < second);
        assert!(first.ends_with('Z'));
    }
}
