//! Pagination and ordering types shared by list queries

use serde::{Deserialize, Serialize};

/// Default number of items per page
pub const DEFAULT_PAGE_SIZE: u32 = 10;
/// Upper bound for `page_size`
pub const MAX_PAGE_SIZE: u32 = 100;

/// Pagination parameters for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub page_size: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ListParams {
    /// Create pagination parameters, clamping out-of-range values
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.page_size as i64
    }

    pub fn limit(&self) -> i64 {
        self.page_size as i64
    }
}

/// Paginated result container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    /// Total number of items across all pages
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        Self {
            items,
            total,
            page: params.page,
            page_size: params.page_size,
        }
    }

    pub fn total_pages(&self) -> u32 {
        if self.page_size == 0 || self.total <= 0 {
            return 0;
        }
        let size = self.page_size as i64;
        ((self.total + size - 1) / size) as u32
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    /// Convert every item while keeping the page metadata
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> PagedResult<U> {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
        }
    }
}

/// A column a list endpoint may be ordered by
pub trait SortField: Copy + PartialEq + std::fmt::Debug {
    fn parse(name: &str) -> Option<Self>;
    fn name(&self) -> &'static str;
    /// Fully qualified SQL column
    fn column(&self) -> &'static str;
}

/// Ordering expressed as `field` or `-field`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder<F> {
    pub field: F,
    pub descending: bool,
}

impl<F: SortField> SortOrder<F> {
    pub fn asc(field: F) -> Self {
        Self {
            field,
            descending: false,
        }
    }

    pub fn desc(field: F) -> Self {
        Self {
            field,
            descending: true,
        }
    }

    /// Parse `created_at` / `-created_at`. Unknown fields yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (descending, name) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        F::parse(name).map(|field| Self { field, descending })
    }

    /// Parse an optional query value, falling back to `default` when absent or unknown
    pub fn parse_or(raw: Option<&str>, default: Self) -> Self {
        raw.and_then(Self::parse).unwrap_or(default)
    }

    /// `ORDER BY` fragment
    pub fn to_sql(&self) -> String {
        format!(
            "{} {}",
            self.field.column(),
            if self.descending { "DESC" } else { "ASC" }
        )
    }

    /// Canonical query form, used in cache keys
    pub fn as_param(&self) -> String {
        if self.descending {
            format!("-{}", self.field.name())
        } else {
            self.field.name().to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum TestField {
        Name,
        CreatedAt,
    }

    impl SortField for TestField {
        fn parse(name: &str) -> Option<Self> {
            match name {
                "name" => Some(Self::Name),
                "created_at" => Some(Self::CreatedAt),
                _ => None,
            }
        }
        fn name(&self) -> &'static str {
            match self {
                Self::Name => "name",
                Self::CreatedAt => "created_at",
            }
        }
        fn column(&self) -> &'static str {
            match self {
                Self::Name => "t.name",
                Self::CreatedAt => "t.created_at",
            }
        }
    }

    #[test]
    fn test_list_params_clamps() {
        let params = ListParams::new(0, 1000);
        assert_eq!(params.page, 1);
        assert_eq!(params.page_size, MAX_PAGE_SIZE);

        let params = ListParams::new(3, 0);
        assert_eq!(params.page_size, 1);
        assert_eq!(params.offset(), 2);
    }

    #[test]
    fn test_total_pages() {
        let params = ListParams::new(1, 10);
        assert_eq!(PagedResult::<()>::new(vec![], 0, &params).total_pages(), 0);
        assert_eq!(PagedResult::<()>::new(vec![], 10, &params).total_pages(), 1);
        assert_eq!(PagedResult::<()>::new(vec![], 11, &params).total_pages(), 2);

        let page = PagedResult::<()>::new(vec![], 25, &ListParams::new(2, 10));
        assert!(page.has_next());
        assert!(page.has_prev());
    }

    #[test]
    fn test_sort_order_parse() {
        let order = SortOrder::<TestField>::parse("-created_at").unwrap();
        assert!(order.descending);
        assert_eq!(order.field, TestField::CreatedAt);
        assert_eq!(order.to_sql(), "t.created_at DESC");
        assert_eq!(order.as_param(), "-created_at");

        assert!(SortOrder::<TestField>::parse("password").is_none());

        let fallback = SortOrder::parse_or(Some("bogus"), SortOrder::asc(TestField::Name));
        assert_eq!(fallback.to_sql(), "t.name ASC");
    }

    proptest! {
        #[test]
        fn offset_matches_page(page in 1u32..10_000, size in 1u32..=100) {
            let params = ListParams::new(page, size);
            prop_assert_eq!(params.offset(), (page as i64 - 1) * size as i64);
            prop_assert!(params.limit() >= 1 && params.limit() <= 100);
        }
    }
}
