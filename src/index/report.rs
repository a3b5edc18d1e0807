//! Per-item outcomes of batch operations.

use crate::error::{LshError, Result};
use crate::VectorId;

/// What indexing did to one id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexAction {
    /// The id was new.
    Inserted,
    /// The id existed; its old bucket memberships were purged first.
    Replaced,
}

/// What removal did to one id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveAction {
    Removed,
    /// Nothing was stored under the id.
    Absent,
}

/// Outcome for one input item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemOutcome<T> {
    pub id: VectorId,
    pub result: Result<T>,
}

/// Outcomes of a batch call, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport<T> {
    pub outcomes: Vec<ItemOutcome<T>>,
}

pub type IndexReport = BatchReport<IndexAction>;
pub type RemoveReport = BatchReport<RemoveAction>;

impl<T> BatchReport<T> {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Number of items that succeeded.
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    /// Failed items with their errors, in input order.
    pub fn failed(&self) -> impl Iterator<Item = (VectorId, &LshError)> + '_ {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.id, e)))
    }

    /// Ids whose failure is worth retrying as-is.
    pub fn retryable_ids(&self) -> Vec<VectorId> {
        self.failed()
            .filter(|(_, e)| e.is_retryable())
            .map(|(id, _)| id)
            .collect()
    }

    /// Whether every item succeeded.
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }
}

impl<T: PartialEq> BatchReport<T> {
    /// Number of items whose successful outcome was `action`.
    pub fn count(&self, action: T) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(&o.result, Ok(a) if *a == action))
            .count()
    }
}
