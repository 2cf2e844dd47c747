//! Per-item outcomes of parallel batch operations.

use std::time::Duration;

use crate::engine::{EngineError, SearchStats};
use crate::error::{Error, FailureKind, ItemFailure, Result};
use crate::identifier_map::{ExternalId, UNRESOLVED};

/// Outcome of one insert or delete item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The engine call succeeded and the identifier map was updated.
    Success,
    /// The external id was unknown; nothing was attempted.
    NotFound,
    /// The engine returned a non-success status; the map was left untouched.
    Failed(EngineError),
}

impl ItemOutcome {
    /// Returns true for [`ItemOutcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Slot-ordered outcomes of an insert or delete batch.
///
/// `outcomes()[j]` always belongs to input item `j`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchReport {
    outcomes: Vec<ItemOutcome>,
    elapsed: Duration,
}

impl BatchReport {
    /// Wraps slot-ordered outcomes.
    #[must_use]
    pub fn new(outcomes: Vec<ItemOutcome>, elapsed: Duration) -> Self {
        Self { outcomes, elapsed }
    }

    /// Per-item outcomes in input order.
    #[must_use]
    pub fn outcomes(&self) -> &[ItemOutcome] {
        &self.outcomes
    }

    /// Outcome of item `j`.
    #[must_use]
    pub fn outcome(&self, j: usize) -> Option<&ItemOutcome> {
        self.outcomes.get(j)
    }

    /// Number of items in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Returns true for an empty batch.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Wall-clock duration of the batch.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Number of successful items.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Number of items whose external id was unknown.
    #[must_use]
    pub fn not_found(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ItemOutcome::NotFound))
            .count()
    }

    /// Engine failures as `(index, error)` pairs.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &EngineError)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(j, o)| match o {
                ItemOutcome::Failed(err) => Some((j, err)),
                _ => None,
            })
    }

    /// Number of engine failures.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    /// Returns true if every item succeeded.
    #[must_use]
    pub fn is_complete_success(&self) -> bool {
        self.outcomes.iter().all(ItemOutcome::is_success)
    }

    /// Turns engine failures into [`Error::PartialFailure`]. `NotFound` is not a failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PartialFailure`] if any item failed in the engine.
    pub fn into_result(self) -> Result<Self> {
        self.check(false)
    }

    /// Like [`BatchReport::into_result`], but `NotFound` items count as failures too.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PartialFailure`] if any item failed or was not found.
    pub fn into_strict_result(self) -> Result<Self> {
        self.check(true)
    }

    fn check(self, strict: bool) -> Result<Self> {
        let failed: Vec<ItemFailure> = self
            .outcomes
            .iter()
            .enumerate()
            .filter_map(|(index, outcome)| match outcome {
                ItemOutcome::Success => None,
                ItemOutcome::NotFound if !strict => None,
                ItemOutcome::NotFound => Some(ItemFailure {
                    index,
                    kind: FailureKind::NotFound,
                }),
                ItemOutcome::Failed(err) => Some(ItemFailure {
                    index,
                    kind: FailureKind::Engine(err.clone()),
                }),
            })
            .collect();

        if failed.is_empty() {
            Ok(self)
        } else {
            Err(Error::PartialFailure {
                failed,
                total: self.outcomes.len(),
            })
        }
    }
}

/// One query's translated result.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// Exactly `k` external ids in engine rank order, padded with [`UNRESOLVED`].
    pub ids: Vec<ExternalId>,
    /// Engine distances aligned with `ids`; `f32::INFINITY` for padding.
    pub distances: Vec<f32>,
    /// Failure of either search phase, if any. The row is then all padding.
    pub error: Option<EngineError>,
}

impl QueryResult {
    /// An all-sentinel row of length `k`.
    #[must_use]
    pub fn unresolved(k: usize) -> Self {
        Self {
            ids: vec![UNRESOLVED; k],
            distances: vec![f32::INFINITY; k],
            error: None,
        }
    }

    /// Resolved (non-sentinel) ids in rank order.
    pub fn resolved(&self) -> impl Iterator<Item = ExternalId> + '_ {
        self.ids.iter().copied().filter(|&id| id != UNRESOLVED)
    }
}

/// Slot-ordered results of a search batch.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchReport {
    results: Vec<QueryResult>,
    stats: SearchStats,
    elapsed: Duration,
}

impl SearchReport {
    /// Wraps slot-ordered query results.
    #[must_use]
    pub fn new(results: Vec<QueryResult>, stats: SearchStats, elapsed: Duration) -> Self {
        Self {
            results,
            stats,
            elapsed,
        }
    }

    /// Per-query results in input order.
    #[must_use]
    pub fn results(&self) -> &[QueryResult] {
        &self.results
    }

    /// Result of query `j`.
    #[must_use]
    pub fn result(&self, j: usize) -> Option<&QueryResult> {
        self.results.get(j)
    }

    /// Number of queries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns true for an empty batch.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Aggregated statistics over all workers.
    #[must_use]
    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    /// Wall-clock duration of the batch.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// `Q × k` matrix of external ids with [`UNRESOLVED`] padding.
    #[must_use]
    pub fn to_matrix(&self) -> Vec<Vec<ExternalId>> {
        self.results.iter().map(|r| r.ids.clone()).collect()
    }

    /// Failed queries as `(index, error)` pairs.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &EngineError)> {
        self.results
            .iter()
            .enumerate()
            .filter_map(|(j, r)| r.error.as_ref().map(|err| (j, err)))
    }

    /// Consumes the report into the id matrix.
    #[must_use]
    pub fn into_matrix(self) -> Vec<Vec<ExternalId>> {
        self.results.into_iter().map(|r| r.ids).collect()
    }

    /// Turns failed queries into [`Error::PartialFailure`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::PartialFailure`] if any query failed.
    pub fn into_result(self) -> Result<Self> {
        let failed: Vec<ItemFailure> = self
            .failures()
            .map(|(index, err)| ItemFailure {
                index,
                kind: FailureKind::Engine(err.clone()),
            })
            .collect();

        if failed.is_empty() {
            Ok(self)
        } else {
            Err(Error::PartialFailure {
                failed,
                total: self.results.len(),
            })
        }
    }
}
