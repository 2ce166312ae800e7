//! Page-number pagination for list endpoints.
//!
//! Responses carry `count`, `next`, `previous` and `results`. The links are
//! relative and keep every other query parameter of the request.

use axum::http::Uri;
use messaging_config::PaginationConfig;
use messaging_database::{Page, Pagination};
use serde::{Deserialize, Serialize};

use crate::ApiError;

const INVALID_PAGE: &str = "Invalid page.";

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub page_size: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub page_size: i64,
}

impl PageRequest {
    /// An unparsable or non-positive page is an error, as is one whose
    /// offset does not fit in an `i64`. An unusable page size falls back to
    /// the default and oversized ones are clamped.
    pub fn from_query(query: &PageQuery, config: &PaginationConfig) -> Result<Self, ApiError> {
        let page = match query.page.as_deref().map(str::trim) {
            None | Some("") => 1,
            Some(raw) => match raw.parse::<i64>() {
                Ok(page) if page >= 1 => page,
                _ => return Err(ApiError::not_found(INVALID_PAGE)),
            },
        };

        let page_size = query
            .page_size
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|size| *size > 0)
            .map(|size| size.min(i64::from(config.max_page_size)))
            .unwrap_or_else(|| i64::from(config.default_page_size));

        if (page - 1).checked_mul(page_size).is_none() {
            return Err(ApiError::not_found(INVALID_PAGE));
        }

        Ok(Self { page, page_size })
    }

    pub fn pagination(&self) -> Pagination {
        Pagination::page(self.page, self.page_size)
    }

    fn last_page(&self, total: i64) -> i64 {
        if total <= 0 {
            1
        } else {
            (total + self.page_size - 1) / self.page_size
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Paginated<T> {
    pub fn build<U>(
        page: Page<U>,
        request: &PageRequest,
        uri: &Uri,
        convert: impl FnMut(U) -> T,
    ) -> Result<Self, ApiError> {
        let last_page = request.last_page(page.total);
        if request.page > last_page {
            return Err(ApiError::not_found(INVALID_PAGE));
        }

        let next = (request.page < last_page).then(|| page_link(uri, Some(request.page + 1)));
        let previous = (request.page > 1).then(|| {
            let target = request.page - 1;
            page_link(uri, (target > 1).then_some(target))
        });

        Ok(Self {
            count: page.total,
            next,
            previous,
            results: page.items.into_iter().map(convert).collect(),
        })
    }
}

fn page_link(uri: &Uri, page: Option<i64>) -> String {
    let mut params: Vec<String> = uri
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split('=').next() != Some("page"))
        .map(str::to_string)
        .collect();

    if let Some(page) = page {
        params.push(format!("page={page}"));
    }

    if params.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{}", uri.path(), params.join("&"))
    }
}
