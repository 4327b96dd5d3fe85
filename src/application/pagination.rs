//! Offset pagination for the tree listing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::tree::TreeNode;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaginationError {
    #[error("page must be a positive integer, got `{0}`")]
    InvalidPage(String),
    #[error("pageSize must be a positive integer, got `{0}`")]
    InvalidPageSize(String),
    #[error("pageSize cannot exceed {MAX_PAGE_SIZE}, got {0}")]
    PageSizeTooLarge(u64),
}

/// Validated `(page, pageSize)` pair. Out-of-range values are rejected, never clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Result<Self, PaginationError> {
        if page == 0 {
            return Err(PaginationError::InvalidPage(page.to_string()));
        }
        if page_size == 0 {
            return Err(PaginationError::InvalidPageSize(page_size.to_string()));
        }
        if page_size > MAX_PAGE_SIZE {
            return Err(PaginationError::PageSizeTooLarge(page_size.into()));
        }
        Ok(Self { page, page_size })
    }

    /// Parse raw query values. Missing or empty strings fall back to the defaults.
    pub fn parse(page: Option<&str>, page_size: Option<&str>) -> Result<Self, PaginationError> {
        let page = match page.map(str::trim).filter(|value| !value.is_empty()) {
            None => DEFAULT_PAGE,
            Some(raw) => match raw.parse::<u32>() {
                Ok(value) if value > 0 => value,
                _ => return Err(PaginationError::InvalidPage(raw.to_string())),
            },
        };

        let page_size = match page_size.map(str::trim).filter(|value| !value.is_empty()) {
            None => DEFAULT_PAGE_SIZE,
            Some(raw) => match raw.parse::<u64>() {
                Ok(value) if value > u64::from(MAX_PAGE_SIZE) => {
                    return Err(PaginationError::PageSizeTooLarge(value));
                }
                Ok(value) if value > 0 => value as u32,
                _ => return Err(PaginationError::InvalidPageSize(raw.to_string())),
            },
        };

        Self::new(page, page_size)
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Number of rows preceding this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PaginationMeta {
    pub fn compute(request: PageRequest, total: u64) -> Self {
        let page_size = u64::from(request.page_size());
        let total_pages = total.div_ceil(page_size);
        let page = request.page();
        Self {
            page,
            page_size: request.page_size(),
            total,
            total_pages,
            has_next: u64::from(page) < total_pages,
            has_prev: page > 1,
        }
    }
}

/// One rendered page of the forest: the top-level entries plus paging metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginatedTree {
    pub data: Vec<TreeNode>,
    pub pagination: PaginationMeta,
}

impl PaginatedTree {
    pub fn empty(request: PageRequest, total: u64) -> Self {
        Self {
            data: Vec::new(),
            pagination: PaginationMeta::compute(request, total),
        }
    }
}
