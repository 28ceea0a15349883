//! Offset pagination shared by the listing endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

const DEFAULT_PER_PAGE: i64 = 15;
const MAX_PER_PAGE: i64 = 100;

/// Query-string parameters accepted by paginated listings.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub order: Option<String>,
    pub q: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// Normalized pagination parameters.
#[derive(Debug, Clone)]
pub struct PageParams {
    pub page: i64,
    pub per_page: i64,
    pub order: Order,
    pub search: Option<String>,
}

impl PageParams {
    #[must_use]
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }
}

impl From<PageQuery> for PageParams {
    fn from(query: PageQuery) -> Self {
        let page = query.page.unwrap_or(1).max(1);
        let per_page = query
            .per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE);
        let order = match query.order.as_deref() {
            Some("asc") => Order::Asc,
            _ => Order::Desc,
        };
        Self {
            page,
            per_page,
            order,
            search: query.q.filter(|q| !q.trim().is_empty()),
        }
    }
}

/// One page of results plus the total row count.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

impl<T> Page<T> {
    #[must_use]
    pub fn pages(&self) -> i64 {
        if self.total == 0 {
            0
        } else {
            (self.total + self.per_page - 1) / self.per_page
        }
    }
}

/// The `pagination` envelope serialized alongside listing data.
#[derive(Debug, Serialize, ToSchema)]
pub struct PageInfo {
    pub page: i64,
    pub pages: i64,
    pub per_page: i64,
    pub prev: Option<i64>,
    pub next: Option<i64>,
    pub total: i64,
}

impl<T> From<&Page<T>> for PageInfo {
    fn from(page: &Page<T>) -> Self {
        let pages = page.pages();
        Self {
            page: page.page,
            pages,
            per_page: page.per_page,
            prev: (page.page > 1).then(|| page.page - 1),
            next: (page.page < pages).then(|| page.page + 1),
            total: page.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Order, Page, PageInfo, PageParams, PageQuery};

    fn query(page: Option<i64>, per_page: Option<i64>) -> PageQuery {
        PageQuery {
            page,
            per_page,
            order: None,
            q: None,
        }
    }

    #[test]
    fn defaults_and_clamping() {
        let params = PageParams::from(query(None, None));
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, 15);
        assert_eq!(params.order, Order::Desc);

        let params = PageParams::from(query(Some(0), Some(1000)));
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, 100);
    }

    #[test]
    fn offset_follows_page() {
        let params = PageParams::from(query(Some(3), Some(10)));
        assert_eq!(params.offset(), 20);
    }

    #[test]
    fn blank_search_is_dropped() {
        let params = PageParams::from(PageQuery {
            page: None,
            per_page: None,
            order: Some("asc".to_string()),
            q: Some("   ".to_string()),
        });
        assert_eq!(params.order, Order::Asc);
        assert!(params.search.is_none());
    }

    #[test]
    fn page_info_links() {
        let page = Page {
            items: vec![1, 2, 3],
            page: 2,
            per_page: 3,
            total: 7,
        };
        let info = PageInfo::from(&page);
        assert_eq!(info.pages, 3);
        assert_eq!(info.prev, Some(1));
        assert_eq!(info.next, Some(3));

        let empty: Page<i32> = Page {
            items: Vec::new(),
            page: 1,
            per_page: 15,
            total: 0,
        };
        let info = PageInfo::from(&empty);
        assert_eq!(info.pages, 0);
        assert_eq!(info.prev, None);
        assert_eq!(info.next, None);
    }
}
