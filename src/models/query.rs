//! Listing helpers shared by the components.

use serde::{Deserialize, Serialize};

/// Offset/limit window passed straight through to the store query. A limit of zero means
/// no limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pagination {
    pub offset: i64,
    pub limit: i64,
}

impl Pagination {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(offset: i64, limit: i64) -> Self {
        Self { offset, limit }
    }

    /// SQLite treats a negative LIMIT as unbounded.
    pub(crate) fn sql_limit(&self) -> i64 {
        if self.limit > 0 {
            self.limit
        } else {
            -1
        }
    }

    /// Number of pages needed for `total` records, if a limit is set.
    pub fn page_count(&self, total: i64) -> Option<i64> {
        (self.limit > 0).then(|| total / self.limit + i64::from(total % self.limit != 0))
    }
}

/// Result of a delete-by-filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub deleted_count: u64,
}
