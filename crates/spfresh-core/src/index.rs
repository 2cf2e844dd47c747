//! `FreshIndex`: the caller-facing wrapper around an [`Engine`].
//!
//! Owns the engine handle, the [`IdentifierMap`] and the three coordinators,
//! and enforces the build phase:
//!
//! - `build` holds the phase lock exclusively for its whole duration
//! - `insert`, `remove` and `search` hold it shared for their whole batch
//!
//! so a build never overlaps a mutation or a query, while mutations and
//! queries run concurrently with each other.
//!
//! An index opened from disk stays [`IndexPhase::Loaded`] until its
//! identifier map is restored; only `search` runs in that phase.
//!
//! Building again on a built index is a full reset: the identifier map is
//! replaced by the new build's mapping and the allocator restarts at `N`.

use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};

use crate::config::{FreshConfig, ThreadsConfig};
use crate::coordinator::{BuildCoordinator, BuildSummary, MutationCoordinator, QueryCoordinator};
use crate::engine::{guarded, BuildParams, Engine};
use crate::error::{Error, Result};
use crate::identifier_map::{ExternalId, IdentifierMap, IdentifierSnapshot};
use crate::report::{BatchReport, SearchReport};
use crate::vector::{VectorElement, VectorMatrix, VectorValueType};

/// File written next to the engine state by [`FreshIndex::save`].
pub const ID_MAP_FILE: &str = "id_map.bin";

/// Lifecycle phase of a [`FreshIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPhase {
    /// Constructed, never built or loaded.
    Empty,
    /// Engine loaded from disk, identifier map not restored yet.
    Loaded,
    /// Built or restored; accepts mutations and queries.
    Built,
    /// The last build failed; only a new build recovers.
    Invalid,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexManifest {
    dimension: usize,
    value_type: VectorValueType,
    normalized: bool,
    ids: IdentifierSnapshot,
}

/// Concurrent identifier-mapping wrapper over an ANN engine.
///
/// # Example
///
/// ```rust,no_run
/// use spfresh_core::{FreshIndex, InMemoryEngine, VectorValueType};
///
/// # fn main() -> spfresh_core::Result<()> {
/// let index = FreshIndex::new(InMemoryEngine::<f32>::new(), 4, VectorValueType::Float)?;
/// let data = vec![0.0_f32; 4 * 100];
/// index.build(&data, "./data/index", 4, false)?;
///
/// index.insert(&[1.0, 0.0, 0.0, 0.0], &[1000], 2)?;
/// let report = index.search(&[1.0, 0.0, 0.0, 0.0], 5, 1)?;
/// assert_eq!(report.results()[0].ids[0], 1000);
/// # Ok(())
/// # }
/// ```
pub struct FreshIndex<E: Engine> {
    dimension: usize,
    value_type: VectorValueType,
    config: FreshConfig,
    engine: Arc<E>,
    ids: Arc<IdentifierMap>,
    phase: RwLock<IndexPhase>,
    normalized: AtomicBool,
    builder: BuildCoordinator<E>,
    mutations: MutationCoordinator<E>,
    queries: QueryCoordinator<E>,
}

impl<E: Engine> FreshIndex<E> {
    /// Creates an empty index with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero or oversized dimension, or a
    /// value type that differs from the engine's element type.
    pub fn new(engine: E, dimension: usize, value_type: VectorValueType) -> Result<Self> {
        Self::with_config(engine, dimension, value_type, FreshConfig::default())
    }

    /// Creates an empty index with explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid or does not
    /// fit `dimension`/`value_type`.
    pub fn with_config(
        engine: E,
        dimension: usize,
        value_type: VectorValueType,
        config: FreshConfig,
    ) -> Result<Self> {
        config.validate()?;
        if dimension == 0 || dimension > config.limits.max_dimension {
            return Err(Error::Config(format!(
                "dimension {dimension} is out of range [1, {}]",
                config.limits.max_dimension
            )));
        }
        let engine_type = <E::Element as VectorElement>::VALUE_TYPE;
        if value_type != engine_type {
            return Err(Error::Config(format!(
                "value type {value_type} does not match engine element type {engine_type}"
            )));
        }

        let engine = Arc::new(engine);
        let ids = Arc::new(IdentifierMap::new());

        Ok(Self {
            dimension,
            value_type,
            config,
            builder: BuildCoordinator::new(Arc::clone(&engine), Arc::clone(&ids)),
            mutations: MutationCoordinator::new(Arc::clone(&engine), Arc::clone(&ids)),
            queries: QueryCoordinator::new(Arc::clone(&engine), Arc::clone(&ids)),
            engine,
            ids,
            phase: RwLock::new(IndexPhase::Empty),
            normalized: AtomicBool::new(false),
        })
    }

    /// Loads engine state from `dir`.
    ///
    /// The returned index is [`IndexPhase::Loaded`]: its identifier map is
    /// empty, searches resolve no ids, and `insert`/`remove`/`save` fail with
    /// [`Error::MapNotRestored`] until [`FreshIndex::restore_identifier_map`]
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Engine`] if the engine cannot load, or
    /// [`Error::Config`] as for [`FreshIndex::with_config`].
    pub fn open(
        dir: impl AsRef<Path>,
        dimension: usize,
        value_type: VectorValueType,
        config: FreshConfig,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        let engine = guarded("load", || E::load(dir))?;
        let index = Self::with_config(engine, dimension, value_type, config)?;
        *index.phase.write() = IndexPhase::Loaded;

        tracing::info!(path = %dir.display(), "Engine loaded, identifier map not restored");
        Ok(index)
    }

    /// Builds the index from `data` with identity external ids `0..N`.
    ///
    /// `data` is row-major with `dimension` columns. A `build_threads` of `0`
    /// uses `build.threads` from the configuration.
    ///
    /// # Errors
    ///
    /// See [`FreshIndex::build_with_ids`].
    pub fn build(
        &self,
        data: &[E::Element],
        output_dir: impl AsRef<Path>,
        build_threads: usize,
        normalize: bool,
    ) -> Result<BuildSummary> {
        self.build_inner(data, None, output_dir.as_ref(), build_threads, normalize)
    }

    /// Builds the index from `data` with the configured `build.threads` and
    /// `build.normalize`.
    ///
    /// # Errors
    ///
    /// See [`FreshIndex::build_with_ids`].
    pub fn build_default(
        &self,
        data: &[E::Element],
        output_dir: impl AsRef<Path>,
    ) -> Result<BuildSummary> {
        self.build_inner(
            data,
            None,
            output_dir.as_ref(),
            0,
            self.config.build.normalize,
        )
    }

    /// Builds the index from `data`, mapping row `j` to `external_ids[j]`.
    ///
    /// Replaces any previous index. On engine failure the index becomes
    /// [`IndexPhase::Invalid`] and its identifier map is empty.
    ///
    /// # Errors
    ///
    /// - [`Error::DimensionMismatch`] / [`Error::ArgumentMismatch`] for a malformed batch
    /// - [`Error::InvalidArgument`] for negative or duplicate external ids
    /// - [`Error::Engine`] if the engine build or save fails
    pub fn build_with_ids(
        &self,
        data: &[E::Element],
        external_ids: &[ExternalId],
        output_dir: impl AsRef<Path>,
        build_threads: usize,
        normalize: bool,
    ) -> Result<BuildSummary> {
        self.build_inner(
            data,
            Some(external_ids),
            output_dir.as_ref(),
            build_threads,
            normalize,
        )
    }

    fn build_inner(
        &self,
        data: &[E::Element],
        external_ids: Option<&[ExternalId]>,
        output_dir: &Path,
        build_threads: usize,
        normalize: bool,
    ) -> Result<BuildSummary> {
        let mut phase = self.phase.write();

        let matrix = self.matrix(data)?;
        let normalize = normalize && self.value_type == VectorValueType::Float;
        let owned;
        let matrix = if normalize {
            owned = matrix.to_normalized();
            VectorMatrix::new(&owned, self.dimension)?
        } else {
            matrix
        };

        let threads = self.worker_count(build_threads, self.config.build.threads);
        let params = BuildParams::from_config(
            &self.config.build,
            self.dimension,
            self.value_type,
            output_dir,
            threads,
        );

        match self
            .builder
            .build(matrix, external_ids, &params, Some(output_dir))
        {
            Ok(summary) => {
                *phase = IndexPhase::Built;
                self.normalized.store(normalize, Ordering::SeqCst);
                Ok(summary)
            }
            Err(err @ Error::Engine(_)) => {
                *phase = IndexPhase::Invalid;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Inserts row `j` of `vectors` under `external_ids[j]`.
    ///
    /// A `threads` of `0` uses `threads.insert` from the configuration.
    ///
    /// # Errors
    ///
    /// Returns batch-level errors only ([`Error::NotBuilt`],
    /// [`Error::MapNotRestored`], [`Error::IndexUnusable`], length/dimension
    /// mismatches). Per-item engine
    /// failures are recorded in the returned [`BatchReport`].
    pub fn insert(
        &self,
        vectors: &[E::Element],
        external_ids: &[ExternalId],
        threads: usize,
    ) -> Result<BatchReport> {
        let _phase = self.ready()?;
        let matrix = self.matrix(vectors)?;
        let threads = self.worker_count(threads, self.config.threads.insert);

        if self.normalized.load(Ordering::SeqCst) {
            let owned = matrix.to_normalized();
            let matrix = VectorMatrix::new(&owned, self.dimension)?;
            self.mutations.insert(matrix, external_ids, threads)
        } else {
            self.mutations.insert(matrix, external_ids, threads)
        }
    }

    /// Removes every external id in `external_ids`.
    ///
    /// Unknown ids are reported as not found, not as errors. A `threads` of
    /// `0` uses `threads.delete` from the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotBuilt`], [`Error::MapNotRestored`] or
    /// [`Error::IndexUnusable`] if the index cannot accept mutations.
    pub fn remove(&self, external_ids: &[ExternalId], threads: usize) -> Result<BatchReport> {
        let _phase = self.ready()?;
        let threads = self.worker_count(threads, self.config.threads.delete);
        Ok(self.mutations.delete(external_ids, threads))
    }

    /// Searches each row of `queries` for its `k` nearest neighbours.
    ///
    /// Every result row has exactly `k` external ids, `-1` marking unfilled
    /// or unresolved ranks. A `threads` of `0` uses `threads.search` from the
    /// configuration.
    ///
    /// # Errors
    ///
    /// Returns batch-level errors only; per-query engine failures are
    /// recorded in the returned [`SearchReport`].
    pub fn search(&self, queries: &[E::Element], k: usize, threads: usize) -> Result<SearchReport> {
        let _phase = self.searchable()?;
        if k > self.config.search.max_k {
            return Err(Error::InvalidArgument(format!(
                "k = {k} exceeds search.max_k ({})",
                self.config.search.max_k
            )));
        }
        let matrix = self.matrix(queries)?;
        let threads = self.worker_count(threads, self.config.threads.search);

        if self.normalized.load(Ordering::SeqCst) {
            let owned = matrix.to_normalized();
            let matrix = VectorMatrix::new(&owned, self.dimension)?;
            Ok(self.queries.search(matrix, k, threads))
        } else {
            Ok(self.queries.search(matrix, k, threads))
        }
    }

    /// Saves engine state and an identifier-map snapshot under `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MapNotRestored`] on a loaded index whose identifier
    /// map was not restored, [`Error::Engine`] if the engine save fails, or
    /// [`Error::Io`]/[`Error::Serialization`] for the snapshot.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let _phase = self.ready()?;
        let dir = dir.as_ref();
        guarded("save", || self.engine.save(dir))?;

        let manifest = IndexManifest {
            dimension: self.dimension,
            value_type: self.value_type,
            normalized: self.normalized.load(Ordering::SeqCst),
            ids: self.ids.snapshot(),
        };
        fs::create_dir_all(dir)?;
        let file = fs::File::create(dir.join(ID_MAP_FILE))?;
        bincode::serialize_into(BufWriter::new(file), &manifest)?;

        tracing::info!(
            path = %dir.display(),
            mappings = manifest.ids.pairs.len(),
            "Index saved"
        );
        Ok(())
    }

    /// Reloads the identifier map saved by [`FreshIndex::save`].
    ///
    /// Returns the number of restored mappings. A loaded index becomes
    /// [`IndexPhase::Built`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the snapshot is missing, or
    /// [`Error::InvalidArgument`] if it was written for a different
    /// dimension or value type.
    pub fn restore_identifier_map(&self, dir: impl AsRef<Path>) -> Result<usize> {
        let mut phase = self.phase.write();
        let file = fs::File::open(dir.as_ref().join(ID_MAP_FILE))?;
        let manifest: IndexManifest = bincode::deserialize_from(BufReader::new(file))?;

        if manifest.dimension != self.dimension || manifest.value_type != self.value_type {
            return Err(Error::InvalidArgument(format!(
                "snapshot is for {}x{}, index is {}x{}",
                manifest.value_type, manifest.dimension, self.value_type, self.dimension
            )));
        }

        let restored = manifest.ids.pairs.len();
        self.ids.restore(manifest.ids);
        self.normalized.store(manifest.normalized, Ordering::SeqCst);
        if *phase == IndexPhase::Loaded {
            *phase = IndexPhase::Built;
        }

        tracing::info!(mappings = restored, "Identifier map restored");
        Ok(restored)
    }

    /// Vector dimension.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Vector value type.
    #[must_use]
    pub fn value_type(&self) -> VectorValueType {
        self.value_type
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &FreshConfig {
        &self.config
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> IndexPhase {
        *self.phase.read()
    }

    /// Whether inputs are normalized before reaching the engine.
    #[must_use]
    pub fn is_normalized(&self) -> bool {
        self.normalized.load(Ordering::SeqCst)
    }

    /// The shared identifier map.
    #[must_use]
    pub fn identifier_map(&self) -> &IdentifierMap {
        &self.ids
    }

    /// The wrapped engine.
    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Number of live external ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if no external id is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn ready(&self) -> Result<RwLockReadGuard<'_, IndexPhase>> {
        let phase = self.phase.read();
        match *phase {
            IndexPhase::Built => Ok(phase),
            IndexPhase::Loaded => Err(Error::MapNotRestored),
            other => Err(Self::unavailable(other)),
        }
    }

    fn searchable(&self) -> Result<RwLockReadGuard<'_, IndexPhase>> {
        let phase = self.phase.read();
        match *phase {
            IndexPhase::Built | IndexPhase::Loaded => Ok(phase),
            other => Err(Self::unavailable(other)),
        }
    }

    fn unavailable(phase: IndexPhase) -> Error {
        match phase {
            IndexPhase::Invalid => {
                Error::IndexUnusable("last build failed; rebuild the index".to_string())
            }
            _ => Error::NotBuilt,
        }
    }

    // A trailing partial row is reported with its length as the actual dimension.
    fn matrix<'a>(&self, data: &'a [E::Element]) -> Result<VectorMatrix<'a, E::Element>> {
        if data.len() % self.dimension != 0 {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: data.len() % self.dimension,
            });
        }
        VectorMatrix::new(data, self.dimension)
    }

    fn worker_count(&self, requested: usize, configured: usize) -> usize {
        ThreadsConfig::resolve(requested, configured).min(self.config.limits.max_threads)
    }
}
