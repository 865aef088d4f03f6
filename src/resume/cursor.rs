//! Resumption cursor over discovery pages

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of the next unit to visit: a discovery page and an index within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Cursor {
    /// Discovery page index
    pub page: u32,
    /// Index of the next unit within `page`
    pub unit_index: usize,
}

impl Cursor {
    /// Cursor at an explicit position
    pub fn new(page: u32, unit_index: usize) -> Self {
        Self { page, unit_index }
    }

    /// First unit of the first page
    pub fn start() -> Self {
        Self::default()
    }

    /// Whether this is the start position
    pub fn is_start(&self) -> bool {
        *self == Self::start()
    }

    /// Next unit on the same page
    pub fn advance(self) -> Self {
        Self {
            page: self.page,
            unit_index: self.unit_index.saturating_add(1),
        }
    }

    /// First unit of the following page
    pub fn next_page(self) -> Self {
        Self {
            page: self.page.saturating_add(1),
            unit_index: 0,
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {}, unit {}", self.page, self.unit_index)
    }
}
