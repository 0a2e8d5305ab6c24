//! Page/limit pagination shared by listing operations.

use serde::{Deserialize, Serialize};

use crate::DomainError;

/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, limit: 10 }
    }
}

impl PageRequest {
    /// Creates a page request, rejecting `page < 1` and limits outside `1..=100`.
    pub fn new(page: u32, limit: u32) -> Result<Self, DomainError> {
        let mut problems = Vec::new();
        if page < 1 {
            problems.push("page must be at least 1".to_string());
        }
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            problems.push(format!("limit must be between 1 and {MAX_PAGE_SIZE}"));
        }
        if problems.is_empty() {
            Ok(Self { page, limit })
        } else {
            Err(DomainError::ValidationFailed(problems))
        }
    }

    /// Builds the response metadata for `total` matching items.
    pub fn paginate(&self, total: u64) -> Pagination {
        Pagination {
            page: self.page,
            limit: self.limit,
            total,
            pages: total.div_ceil(u64::from(self.limit)),
        }
    }
}

/// Pagination metadata returned alongside a page of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}
