//! Common response types

use serde::{Deserialize, Serialize};

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    #[serde(rename = "totalPages")]
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        let total_pages = if limit > 0 {
            total.div_ceil(limit)
        } else {
            0
        };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PaginatedResponse<U> {
        PaginatedResponse {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
        }
    }
}

/// Normalize `page`/`limit` query values: page starts at 1, limit capped at 100
pub fn page_bounds(page: Option<u64>, limit: Option<u64>) -> (u64, u64) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(50).clamp(1, 100);
    (page, limit)
}

/// Number of records before `page`. Saturates instead of overflowing and
/// stays within the signed range a database skip accepts.
pub fn page_offset(page: u64, limit: u64) -> u64 {
    page.saturating_sub(1)
        .saturating_mul(limit)
        .min(i64::MAX as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages_rounds_up() {
        let page = PaginatedResponse::new(vec![1, 2], 5, 1, 2);
        assert_eq!(page.total_pages, 3);
        let empty: PaginatedResponse<u8> = PaginatedResponse::new(vec![], 0, 1, 50);
        assert_eq!(empty.total_pages, 0);
    }

    #[test]
    fn test_page_bounds() {
        assert_eq!(page_bounds(None, None), (1, 50));
        assert_eq!(page_bounds(Some(0), Some(1000)), (1, 100));
        assert_eq!(page_bounds(Some(3), Some(0)), (3, 1));
    }

    #[test]
    fn test_page_offset_saturates() {
        assert_eq!(page_offset(1, 50), 0);
        assert_eq!(page_offset(3, 20), 40);
        let (page, limit) = page_bounds(Some(u64::MAX), Some(100));
        assert_eq!(page_offset(page, limit), i64::MAX as u64);
    }
}
