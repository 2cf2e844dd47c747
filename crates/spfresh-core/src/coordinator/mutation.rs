//! Concurrent insert and delete batches.

use std::sync::Arc;
use std::time::Instant;

use crate::dispatch::ParallelDispatcher;
use crate::engine::{guarded, Engine};
use crate::error::{Error, Result};
use crate::identifier_map::{ExternalId, IdentifierMap, InternalId, UNRESOLVED};
use crate::report::{BatchReport, ItemOutcome};
use crate::vector::VectorMatrix;

/// Fans insert/delete batches out over worker threads.
///
/// One item's engine failure is recorded in the [`BatchReport`] and never
/// stops its siblings.
#[derive(Debug)]
pub struct MutationCoordinator<E> {
    engine: Arc<E>,
    ids: Arc<IdentifierMap>,
}

impl<E: Engine> MutationCoordinator<E> {
    /// Creates a coordinator over a shared engine and identifier map.
    #[must_use]
    pub fn new(engine: Arc<E>, ids: Arc<IdentifierMap>) -> Self {
        Self { engine, ids }
    }

    /// Inserts row `j` of `vectors` under `external_ids[j]`.
    ///
    /// Each item reserves a fresh internal id, hands the vector to the engine
    /// and registers the mapping only if the engine accepted it. Re-inserting
    /// a mapped external id replaces its mapping; the displaced engine vector
    /// is deleted best-effort.
    ///
    /// # Errors
    ///
    /// - [`Error::ArgumentMismatch`] if the row and id counts differ
    /// - [`Error::InvalidArgument`] if an external id is negative
    pub fn insert(
        &self,
        vectors: VectorMatrix<'_, E::Element>,
        external_ids: &[ExternalId],
        threads: usize,
    ) -> Result<BatchReport> {
        if vectors.rows() != external_ids.len() {
            return Err(Error::ArgumentMismatch {
                what: "external ids",
                expected: vectors.rows(),
                actual: external_ids.len(),
            });
        }
        if let Some(&id) = external_ids.iter().find(|&&id| id < 0) {
            return Err(Error::InvalidArgument(format!(
                "external id {id} is negative ({UNRESOLVED} is reserved)"
            )));
        }

        let start = Instant::now();
        let outcomes = ParallelDispatcher::new(threads)
            .with_label("insert")
            .run(external_ids.len(), |j| {
                self.insert_one(vectors.row(j), external_ids[j])
            });
        let report = BatchReport::new(outcomes, start.elapsed());

        log_batch("insert", threads, &report);
        Ok(report)
    }

    fn insert_one(&self, vector: &[E::Element], external: ExternalId) -> ItemOutcome {
        let internal = self.ids.reserve_next_internal_id();
        match guarded("insert_one", || self.engine.insert_one(vector, internal)) {
            Ok(()) => {
                if let Some(displaced) = self.ids.register(external, internal) {
                    self.retire(external, displaced);
                }
                ItemOutcome::Success
            }
            Err(err) => {
                tracing::warn!(
                    external,
                    internal,
                    code = err.code,
                    error = %err.message,
                    "Engine rejected insert"
                );
                ItemOutcome::Failed(err)
            }
        }
    }

    fn retire(&self, external: ExternalId, displaced: InternalId) {
        if let Err(err) = guarded("delete_one", || self.engine.delete_one(displaced)) {
            tracing::warn!(
                external,
                displaced,
                code = err.code,
                error = %err.message,
                "Failed to delete vector replaced by re-insert"
            );
        }
    }

    /// Deletes every external id in `external_ids`.
    ///
    /// Unknown ids are reported as [`ItemOutcome::NotFound`]. On engine
    /// failure the mapping is left intact, unless a concurrent re-insert
    /// already replaced it, in which case the item counts as deleted.
    pub fn delete(&self, external_ids: &[ExternalId], threads: usize) -> BatchReport {
        let start = Instant::now();
        let outcomes = ParallelDispatcher::new(threads)
            .with_label("delete")
            .run(external_ids.len(), |j| self.delete_one(external_ids[j]));
        let report = BatchReport::new(outcomes, start.elapsed());

        log_batch("delete", threads, &report);
        report
    }

    fn delete_one(&self, external: ExternalId) -> ItemOutcome {
        let Some(internal) = self.ids.lookup_internal(external) else {
            return ItemOutcome::NotFound;
        };
        match guarded("delete_one", || self.engine.delete_one(internal)) {
            Ok(()) => {
                // A concurrent re-insert may already own `external`.
                self.ids.unregister_if_current(external, internal);
                ItemOutcome::Success
            }
            // A concurrent re-insert displaced `internal` and retired it first.
            Err(_) if self.ids.lookup_internal(external) != Some(internal) => {
                ItemOutcome::Success
            }
            Err(err) => {
                tracing::warn!(
                    external,
                    internal,
                    code = err.code,
                    error = %err.message,
                    "Engine rejected delete"
                );
                ItemOutcome::Failed(err)
            }
        }
    }
}

fn log_batch(operation: &'static str, threads: usize, report: &BatchReport) {
    tracing::info!(
        operation,
        threads,
        items = report.len(),
        succeeded = report.succeeded(),
        not_found = report.not_found(),
        failed = report.failed(),
        elapsed_ms = report.elapsed().as_millis() as u64,
        "Batch completed"
    );
}
