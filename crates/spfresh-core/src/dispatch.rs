//! Bounded parallel-for over index-addressable work items.
//!
//! Workers share an atomic cursor and claim items with `fetch_add` until the
//! cursor passes the item count, so every item is processed exactly once.
//! Each worker keeps `(item, outcome)` pairs locally; after the barrier the
//! pairs are merged into slot order, which makes the output deterministic
//! even though completion order is not.
//!
//! Workers are a per-call `rayon` pool driven by `broadcast`: the call blocks
//! until every worker has returned. There is no early exit and no
//! cancellation; an item's failure is whatever value the closure returns.

use rayon::ThreadPoolBuilder;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Parallel fan-out primitive with exactly-once item processing.
///
/// # Example
///
/// ```rust
/// use spfresh_core::ParallelDispatcher;
///
/// let squares = ParallelDispatcher::new(4).run(8, |j| j * j);
/// assert_eq!(squares, vec![0, 1, 4, 9, 16, 25, 36, 49]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ParallelDispatcher {
    workers: usize,
    label: &'static str,
}

impl ParallelDispatcher {
    /// Creates a dispatcher that uses up to `workers` threads.
    #[must_use]
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            label: "worker",
        }
    }

    /// Sets the label used for worker thread names (`spfresh-<label>-<n>`).
    #[must_use]
    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    /// Configured worker count.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Processes items `0..items`, returning outcome `j` in slot `j`.
    ///
    /// `workers == 0` or `items == 0` completes immediately with an empty result.
    pub fn run<R, F>(&self, items: usize, work: F) -> Vec<R>
    where
        R: Send,
        F: Fn(usize) -> R + Sync,
    {
        self.run_with_state(items, || (), |_, j| work(j)).0
    }

    /// Like [`ParallelDispatcher::run`], with per-worker state.
    ///
    /// `init` runs once on each worker before it claims its first item; the
    /// final states are returned alongside the slot-ordered results (one per
    /// worker that ran, in no particular order).
    pub fn run_with_state<S, R, I, F>(&self, items: usize, init: I, work: F) -> (Vec<R>, Vec<S>)
    where
        S: Send,
        R: Send,
        I: Fn() -> S + Sync,
        F: Fn(&mut S, usize) -> R + Sync,
    {
        if items == 0 || self.workers == 0 {
            return (Vec::new(), Vec::new());
        }

        let workers = self.workers.min(items);
        let cursor = AtomicUsize::new(0);
        let drain = || {
            let mut state = init();
            let mut claimed = Vec::new();
            loop {
                let j = cursor.fetch_add(1, Ordering::Relaxed);
                if j >= items {
                    break;
                }
                claimed.push((j, work(&mut state, j)));
            }
            (claimed, state)
        };

        let label = self.label;
        let per_worker = match ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(move |i| format!("spfresh-{label}-{i}"))
            .build()
        {
            Ok(pool) => pool.broadcast(|_| drain()),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    label,
                    workers,
                    "Worker pool unavailable, draining on the calling thread"
                );
                vec![drain()]
            }
        };

        let mut slots = Vec::with_capacity(items);
        let mut states = Vec::with_capacity(per_worker.len());
        for (claimed, state) in per_worker {
            slots.extend(claimed);
            states.push(state);
        }
        slots.sort_unstable_by_key(|&(j, _)| j);
        debug_assert_eq!(slots.len(), items, "every item must be claimed exactly once");

        (slots.into_iter().map(|(_, r)| r).collect(), states)
    }
}
