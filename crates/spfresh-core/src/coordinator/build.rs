//! One-shot bulk ingestion.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustc_hash::FxHashSet;

use crate::engine::{guarded, BuildParams, Engine, MetadataBatch};
use crate::error::{Error, Result};
use crate::identifier_map::{ExternalId, IdentifierMap, InternalId, UNRESOLVED};
use crate::vector::VectorMatrix;

/// Outcome of a successful build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildSummary {
    /// Number of vectors indexed.
    pub vectors: usize,
    /// Wall-clock duration of engine build and save.
    pub elapsed: Duration,
}

/// Builds the engine index and installs the matching identifier map.
#[derive(Debug)]
pub struct BuildCoordinator<E> {
    engine: Arc<E>,
    ids: Arc<IdentifierMap>,
}

impl<E: Engine> BuildCoordinator<E> {
    /// Creates a coordinator over a shared engine and identifier map.
    #[must_use]
    pub fn new(engine: Arc<E>, ids: Arc<IdentifierMap>) -> Self {
        Self { engine, ids }
    }

    /// Builds the index from `vectors`, assigning internal ids `0..N` in row order.
    ///
    /// External ids default to the row index. When `output_dir` is given the
    /// engine state is saved there right after the build. The identifier map
    /// is only installed once both steps succeed; on engine failure it is
    /// cleared, so nothing from the previous index stays reachable.
    ///
    /// The caller must guarantee that no insert, delete or search runs
    /// against the same engine while this executes.
    ///
    /// # Errors
    ///
    /// - [`Error::ArgumentMismatch`] if `external_ids` has the wrong length
    /// - [`Error::InvalidArgument`] for negative or duplicate external ids
    /// - [`Error::Engine`] if the engine build or save fails
    pub fn build(
        &self,
        vectors: VectorMatrix<'_, E::Element>,
        external_ids: Option<&[ExternalId]>,
        params: &BuildParams,
        output_dir: Option<&Path>,
    ) -> Result<BuildSummary> {
        let count = vectors.rows();
        let next = InternalId::try_from(count)
            .map_err(|_| Error::InvalidArgument(format!("{count} vectors exceed the id space")))?;

        let externals: Vec<ExternalId> = match external_ids {
            Some(ids) => {
                validate_build_ids(ids, count)?;
                ids.to_vec()
            }
            None => (0..next).collect(),
        };
        let metadata = MetadataBatch::from_external_ids(externals.iter().copied());

        let start = Instant::now();
        let built = guarded("build", || self.engine.build(vectors, &metadata, params)).and_then(
            |()| match output_dir {
                Some(dir) => guarded("save", || self.engine.save(dir)),
                None => Ok(()),
            },
        );

        if let Err(err) = built {
            self.ids.clear();
            tracing::error!(
                vectors = count,
                code = err.code,
                error = %err.message,
                "Index build failed, identifier map cleared"
            );
            return Err(Error::Engine(err));
        }

        self.ids.reset_with(externals.into_iter().zip(0..next), next);
        let elapsed = start.elapsed();

        tracing::info!(
            vectors = count,
            dimension = vectors.dimension(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Index build completed"
        );

        Ok(BuildSummary {
            vectors: count,
            elapsed,
        })
    }
}

fn validate_build_ids(ids: &[ExternalId], rows: usize) -> Result<()> {
    if ids.len() != rows {
        return Err(Error::ArgumentMismatch {
            what: "external ids",
            expected: rows,
            actual: ids.len(),
        });
    }

    let mut seen = FxHashSet::with_capacity_and_hasher(ids.len(), Default::default());
    for &id in ids {
        if id < 0 {
            return Err(Error::InvalidArgument(format!(
                "external id {id} is negative ({UNRESOLVED} is reserved)"
            )));
        }
        if !seen.insert(id) {
            return Err(Error::InvalidArgument(format!(
                "external id {id} appears more than once"
            )));
        }
    }
    Ok(())
}
