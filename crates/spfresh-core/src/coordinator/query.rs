//! Concurrent two-phase search.

use std::sync::Arc;
use std::time::Instant;

use crate::dispatch::ParallelDispatcher;
use crate::engine::{guarded, Engine, EngineError, SearchStats};
use crate::identifier_map::{IdentifierMap, InternalId, UNRESOLVED};
use crate::report::{QueryResult, SearchReport};
use crate::vector::VectorMatrix;

/// Per-worker search state: accumulated stats and the setup error, if the
/// worker could not be prepared.
struct SearchWorker {
    stats: SearchStats,
    setup_error: Option<EngineError>,
}

/// Fans query batches out over worker threads and translates results back
/// into external ids.
#[derive(Debug)]
pub struct QueryCoordinator<E> {
    engine: Arc<E>,
    ids: Arc<IdentifierMap>,
}

impl<E: Engine> QueryCoordinator<E> {
    /// Creates a coordinator over a shared engine and identifier map.
    #[must_use]
    pub fn new(engine: Arc<E>, ids: Arc<IdentifierMap>) -> Self {
        Self { engine, ids }
    }

    /// Searches every row of `queries` for its `k` nearest neighbours.
    ///
    /// Result `j` belongs to query `j` and always holds exactly `k` ids in
    /// engine rank order. Internal ids that no longer resolve (deleted after
    /// the engine returned them) and unfilled ranks read [`UNRESOLVED`].
    /// A query whose search fails in either phase gets an all-sentinel row
    /// and its error; the other queries are unaffected. If a worker's
    /// [`Engine::prepare_search_worker`] panics, every query it claims fails
    /// that way.
    pub fn search(
        &self,
        queries: VectorMatrix<'_, E::Element>,
        k: usize,
        threads: usize,
    ) -> SearchReport {
        let start = Instant::now();
        let (results, workers) = ParallelDispatcher::new(threads)
            .with_label("search")
            .run_with_state(
                queries.rows(),
                || self.prepare_worker(),
                |worker, j| match &worker.setup_error {
                    Some(err) => {
                        worker.stats.queries += 1;
                        Self::failed(k, err.clone(), &mut worker.stats)
                    }
                    None => self.search_one(queries.row(j), k, &mut worker.stats),
                },
            );

        let mut stats = SearchStats::default();
        for worker in &workers {
            stats.merge(&worker.stats);
        }
        let report = SearchReport::new(results, stats, start.elapsed());

        tracing::info!(
            threads,
            queries = report.len(),
            k,
            failed = report.stats().failed_queries,
            elapsed_ms = report.elapsed().as_millis() as u64,
            "Search batch completed"
        );
        report
    }

    fn prepare_worker(&self) -> SearchWorker {
        let setup = guarded("prepare_search_worker", || {
            self.engine.prepare_search_worker();
            Ok(())
        });
        if let Err(err) = &setup {
            tracing::warn!(code = err.code, error = %err.message, "Search worker setup failed");
        }
        SearchWorker {
            stats: SearchStats::default(),
            setup_error: setup.err(),
        }
    }

    fn search_one(&self, query: &[E::Element], k: usize, stats: &mut SearchStats) -> QueryResult {
        stats.queries += 1;
        if k == 0 {
            return QueryResult::unresolved(0);
        }

        let phase_start = Instant::now();
        let memory = guarded("search_memory", || self.engine.search_memory(query, k));
        stats.memory_latency += phase_start.elapsed();
        let candidates = match memory {
            Ok(candidates) => candidates,
            Err(err) => return Self::failed(k, err, stats),
        };
        stats.memory_candidates += candidates.len() as u64;

        let phase_start = Instant::now();
        let secondary = guarded("search_secondary", || {
            self.engine.search_secondary(query, candidates, stats)
        });
        stats.secondary_latency += phase_start.elapsed();
        let mut refined = match secondary {
            Ok(refined) => refined,
            Err(err) => return Self::failed(k, err, stats),
        };
        refined.truncate(k);
        stats.secondary_results += refined.len() as u64;

        let internals: Vec<InternalId> = refined.iter().map(|n| n.internal_id).collect();
        let mut ids = self.ids.resolve_all(&internals);
        let mut distances: Vec<f32> = refined.iter().map(|n| n.distance).collect();
        ids.resize(k, UNRESOLVED);
        distances.resize(k, f32::INFINITY);

        QueryResult {
            ids,
            distances,
            error: None,
        }
    }

    fn failed(k: usize, err: EngineError, stats: &mut SearchStats) -> QueryResult {
        stats.failed_queries += 1;
        tracing::warn!(code = err.code, error = %err.message, "Query failed");
        QueryResult {
            error: Some(err),
            ..QueryResult::unresolved(k)
        }
    }
}
