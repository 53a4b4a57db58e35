//! Full-scan pagination shared by the whitelist and artifact listings.
//!
//! Every page scans the whole prefix in key order. Records passing the
//! filter get a 1-based rank; a page holds ranks `(start, start + per_page]`
//! and `has_more` is decided only after the scan completes.

use serde::{Deserialize, Serialize};

pub const WHITELIST_DEFAULT_PER_PAGE: usize = 50;
pub const ARTIFACT_DEFAULT_PER_PAGE: usize = 10;

/// Validated 1-indexed page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub per_page: usize,
}

impl PageRequest {
    pub fn new(page: i64, per_page: i64) -> Result<Self, String> {
        if page < 1 {
            return Err("page must be >= 1".to_string());
        }
        if per_page < 1 {
            return Err("perPage must be >= 1".to_string());
        }
        Ok(Self {
            page: page as usize,
            per_page: per_page as usize,
        })
    }

    /// Parse optional textual arguments; blank values take the defaults
    pub fn parse(
        page: Option<&str>,
        per_page: Option<&str>,
        default_per_page: usize,
    ) -> Result<Self, String> {
        let page = match page.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|e| format!("invalid page parameter: {}", e))?,
            None => 1,
        };
        let per_page = match per_page.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|e| format!("invalid perPage parameter: {}", e))?,
            None => default_per_page as i64,
        };
        Self::new(page, per_page)
    }

    /// Number of matched records preceding this page
    pub fn start(&self) -> usize {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    /// Number of records that passed the filter
    pub total: usize,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
            has_more: self.has_more,
        }
    }
}

pub fn paginate<T>(
    records: impl IntoIterator<Item = T>,
    mut keep: impl FnMut(&T) -> bool,
    request: PageRequest,
) -> Page<T> {
    let start = request.start();
    let mut matched = 0usize;
    let mut items = Vec::new();

    for record in records {
        if !keep(&record) {
            continue;
        }
        matched += 1;
        if matched <= start || items.len() >= request.per_page {
            continue;
        }
        items.push(record);
    }

    let has_more = matched > start + items.len();
    Page {
        items,
        page: request.page,
        per_page: request.per_page,
        total: matched,
        has_more,
    }
}
