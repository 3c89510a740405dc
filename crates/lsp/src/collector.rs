// ==============================================================================
// Bounded completion collection
// ==============================================================================
//
// Every provider appends into one `BoundedItems`, so they share a single size
// budget. A refused insertion returns `SizeExceeded`; providers propagate it
// with `?` and only the request entry point turns it into `isIncomplete`.

use thiserror::Error;
use tower_lsp::lsp_types::{CompletionItem, CompletionList};

/// Large lists are slow to ship to the editor. Past this size the list is
/// marked incomplete and the editor re-queries as the user types.
pub const MAX_COMPLETION_SIZE: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("completion size exceeded")]
pub struct SizeExceeded;

#[derive(Debug)]
pub struct BoundedItems {
    items: Vec<CompletionItem>,
    limit: usize,
}

impl Default for BoundedItems {
    fn default() -> Self {
        Self::new(MAX_COMPLETION_SIZE)
    }
}

impl BoundedItems {
    pub fn new(limit: usize) -> Self {
        Self {
            items: Vec::with_capacity(limit.min(MAX_COMPLETION_SIZE)),
            limit,
        }
    }

    /// True when the next insertion would be refused.
    pub fn would_exceed(&self) -> bool {
        self.items.len() >= self.limit
    }

    pub fn push(&mut self, item: CompletionItem) -> Result<(), SizeExceeded> {
        if self.would_exceed() {
            return Err(SizeExceeded);
        }
        self.items.push(item);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn items(&self) -> &[CompletionItem] {
        &self.items
    }

    /// The collected items, in insertion order. `is_incomplete` is left for
    /// the caller that observed (or didn't) a `SizeExceeded`.
    pub fn into_list(self) -> CompletionList {
        CompletionList {
            is_incomplete: false,
            items: self.items,
        }
    }
}
