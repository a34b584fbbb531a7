//! Fixed-width paging window over a completed result set.

use std::sync::Arc;

use thiserror::Error;

use crate::event::{Recommendation, ResultSet};

/// Three entries per page, matching the podium display.
pub const PAGE_SIZE: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PagerError {
    #[error("no recommendation under key {key}")]
    NotFound { key: String },
}

/// Sliding window plus single-item selection over an immutable result set.
/// The window starts page-aligned at 0 and advancing past the end wraps
/// back to 0, so every entry is shown exactly once per cycle.
#[derive(Debug, Clone)]
pub struct ResultPager {
    results: Arc<ResultSet>,
    start_index: usize,
    selected: Option<String>,
}

impl ResultPager {
    pub fn new(results: Arc<ResultSet>) -> Self {
        Self {
            results,
            start_index: 0,
            selected: None,
        }
    }

    pub fn results(&self) -> &ResultSet {
        &self.results
    }

    pub fn start_index(&self) -> usize {
        self.start_index
    }

    /// Up to [`PAGE_SIZE`] entries from the current start, in canonical
    /// order. A final short page is returned as-is; wrapping only moves
    /// the start for the next call.
    pub fn window(&self) -> &[(String, Recommendation)] {
        let end = (self.start_index + PAGE_SIZE).min(self.results.len());
        self.results
            .entries()
            .get(self.start_index..end)
            .unwrap_or(&[])
    }

    /// Steps the window forward one page, wrapping to 0 once the step
    /// passes the end. No-op on an empty set.
    pub fn advance(&mut self) {
        let len = self.results.len();
        if len == 0 {
            return;
        }
        let next = self.start_index + PAGE_SIZE;
        self.start_index = if next >= len { 0 } else { next };
    }

    /// Marks the recommendation under `key` for detail display.
    pub fn select(&mut self, key: &str) -> Result<&Recommendation, PagerError> {
        match self.results.get(key) {
            Some(found) => {
                self.selected = Some(key.to_string());
                Ok(found)
            }
            None => Err(PagerError::NotFound {
                key: key.to_string(),
            }),
        }
    }

    pub fn selection(&self) -> Option<&Recommendation> {
        self.selected.as_deref().and_then(|key| self.results.get(key))
    }

    pub fn selected_key(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Drops the selection; the window is unaffected.
    pub fn clear_selection(&mut self) {
        self.selected = None;
    }
}
