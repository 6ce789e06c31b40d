// crates/geofeed-core/src/core/paging.rs
// ============================================================================
// Module: Geofeed Paging
// Description: Page options for list queries against the store.
// Purpose: Validate paging inputs once, at the boundary.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Pages are 1-based. Both the page number and the page size are validated:
//! `page >= 1` and `1 <= page_size <= MAX_PAGE_SIZE`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Largest page size accepted by list queries.
pub const MAX_PAGE_SIZE: u32 = 1_000;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Paging validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PageError {
    /// Page number was zero.
    #[error("page must be at least 1")]
    Page,
    /// Page size was zero or above the limit.
    #[error("page_size must be between 1 and {MAX_PAGE_SIZE}, got {0}")]
    PageSize(u32),
}

/// Validated 1-based paging options.
///
/// # Invariants
/// - `page >= 1`.
/// - `1 <= page_size <= MAX_PAGE_SIZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPageOptions")]
pub struct PageOptions {
    /// 1-based page number.
    page: u32,
    /// Number of entries per page.
    page_size: u32,
}

/// Unvalidated paging input used for deserialization.
#[derive(Deserialize)]
struct RawPageOptions {
    /// 1-based page number.
    page: u32,
    /// Number of entries per page.
    page_size: u32,
}

impl TryFrom<RawPageOptions> for PageOptions {
    type Error = PageError;

    fn try_from(raw: RawPageOptions) -> Result<Self, Self::Error> {
        Self::new(raw.page, raw.page_size)
    }
}

impl PageOptions {
    /// Validates and constructs paging options.
    ///
    /// # Errors
    ///
    /// Returns [`PageError`] when the page or page size is out of range.
    pub const fn new(page: u32, page_size: u32) -> Result<Self, PageError> {
        if page < 1 {
            return Err(PageError::Page);
        }
        if page_size < 1 || page_size > MAX_PAGE_SIZE {
            return Err(PageError::PageSize(page_size));
        }
        Ok(Self {
            page,
            page_size,
        })
    }

    /// Returns the first page with the given size.
    ///
    /// # Errors
    ///
    /// Returns [`PageError`] when the page size is out of range.
    pub const fn first(page_size: u32) -> Result<Self, PageError> {
        Self::new(1, page_size)
    }

    /// Returns the 1-based page number.
    #[must_use]
    pub const fn page(&self) -> u32 {
        self.page
    }

    /// Returns the page size.
    #[must_use]
    pub const fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Returns the zero-based row offset of the first entry on this page.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.page_size as u64
    }

    /// Returns the following page, or `None` on overflow.
    #[must_use]
    pub const fn next(&self) -> Option<Self> {
        match self.page.checked_add(1) {
            Some(page) => Some(Self {
                page,
                page_size: self.page_size,
            }),
            None => None,
        }
    }
}
