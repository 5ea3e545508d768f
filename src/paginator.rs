//! Page arithmetic over the filtered view.
//!
//! Pages are 1-based. Every computation clamps the current page into
//! `[1, total_pages]`, so a stale page number after a filter change is corrected
//! rather than rejected.

use serde::{Deserialize, Serialize};
use std::ops::Range;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageCommand {
    /// Recompute the window without moving.
    Stay,
    First,
    Prev,
    Next,
    Last,
    JumpTo(usize),
}

/// Per-session page position. Owned by the caller and passed into every pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationState {
    pub page_size: usize,
    pub current_page: usize,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl PaginationState {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: clamp_page_size(page_size),
            current_page: 1,
        }
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.current_page = page.max(1);
        self
    }

    /// Changes the page size and returns to the first page.
    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = clamp_page_size(page_size);
        self.current_page = 1;
    }
}

pub fn clamp_page_size(page_size: usize) -> usize {
    page_size.clamp(1, MAX_PAGE_SIZE)
}

/// The visible slice of the filtered view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageWindow {
    pub page: usize,
    pub total_pages: usize,
    pub total_rows: usize,
    pub page_size: usize,
    /// Position of the first row in the filtered view; display numbering starts at
    /// `offset + 1`.
    pub offset: usize,
    pub len: usize,
}

impl PageWindow {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_first(&self) -> bool {
        self.page == 1
    }

    pub fn is_last(&self) -> bool {
        self.page == self.total_pages
    }
}

pub fn total_pages(total_rows: usize, page_size: usize) -> usize {
    let page_size = clamp_page_size(page_size);
    total_rows.div_ceil(page_size).max(1)
}

/// Applies `command` to `current_page` and returns the new page with its window.
pub fn paginate(
    total_rows: usize,
    page_size: usize,
    current_page: usize,
    command: PageCommand,
) -> (usize, PageWindow) {
    let page_size = clamp_page_size(page_size);
    let total = total_pages(total_rows, page_size);
    let current = current_page.clamp(1, total);
    let page = match command {
        PageCommand::Stay => current,
        PageCommand::First => 1,
        PageCommand::Prev => current.saturating_sub(1).max(1),
        PageCommand::Next => (current + 1).min(total),
        PageCommand::Last => total,
        PageCommand::JumpTo(p) => p.clamp(1, total),
    };
    let offset = (page - 1) * page_size;
    let end = (page * page_size).min(total_rows);
    let window = PageWindow {
        page,
        total_pages: total,
        total_rows,
        page_size,
        offset,
        len: end.saturating_sub(offset),
    };
    (page, window)
}

impl PaginationState {
    /// Runs `command` against a view of `total_rows` and stores the resulting page.
    pub fn apply(&mut self, total_rows: usize, command: PageCommand) -> PageWindow {
        let (page, window) = paginate(total_rows, self.page_size, self.current_page, command);
        self.current_page = page;
        window
    }
}
