use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use crate::errors::{DomainError, DomainResult};
use uuid::Uuid;

// Re-export UserRole and Permission from the permission module
pub use crate::domains::permission::{UserRole, Permission};

/// Pagination parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaginationParams {
    pub page: u32,
    pub per_page: u32,
}

impl PaginationParams {
    pub fn offset(&self) -> u32 {
        self.page.saturating_sub(1) * self.per_page
    }
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

/// Paginated result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl<T> PaginatedResult<T> {
    pub fn new(items: Vec<T>, total: u64, params: PaginationParams) -> Self {
        let total_pages = if params.per_page == 0 {
            0
        } else {
            (total as f64 / params.per_page as f64).ceil() as u32
        };
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
            total_pages,
        }
    }
}

/// Fixed-width RFC3339 so stored timestamps sort lexicographically.
pub fn db_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_db_timestamp(value: &str, field: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DomainError::Internal(format!("Invalid RFC3339 for {} '{}': {}", field, value, e)))
}

pub fn parse_db_uuid(value: &str, field: &str) -> DomainResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| DomainError::Internal(format!("Invalid UUID for {} '{}': {}", field, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_db_timestamps_sort_lexicographically() {
        let whole = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        let later = whole + chrono::Duration::microseconds(1500);
        assert!(db_timestamp(&whole) < db_timestamp(&later));
        assert_eq!(parse_db_timestamp(&db_timestamp(&later), "t").unwrap(), later);
    }

    #[test]
    fn test_pagination_offset_and_pages() {
        let params = PaginationParams { page: 3, per_page: 10 };
        assert_eq!(params.offset(), 20);
        let result: PaginatedResult<u8> = PaginatedResult::new(vec![], 21, params);
        assert_eq!(result.total_pages, 3);
    }
}
