//! Exact in-memory engine.
//!
//! Brute-force squared-L2 over every live vector. Phase 1 scans and keeps the
//! closest `max(k, SearchInternalResultNum)` candidates; phase 2 re-reads the
//! candidates, drops the ones deleted in between, re-scores them and returns
//! them in ascending distance order. Suitable for tests, benches and small
//! collections; it is not an approximate index.

use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::{
    BuildParams, Engine, EngineError, EngineStatus, MetadataBatch, Neighbour, SearchStats,
};
use crate::identifier_map::InternalId;
use crate::vector::{squared_l2, VectorElement, VectorMatrix};

/// Status codes returned by [`InMemoryEngine`].
pub mod status {
    /// Row/metadata counts or dimensions disagree.
    pub const INVALID_ARGUMENT: i32 = 2;
    /// Vector dimension differs from the built index.
    pub const DIMENSION_MISMATCH: i32 = 3;
    /// Internal id already present.
    pub const DUPLICATE_ID: i32 = 4;
    /// Internal id not present.
    pub const VECTOR_NOT_FOUND: i32 = 5;
    /// Operation issued before `build`/`load`.
    pub const NOT_BUILT: i32 = 6;
    /// Snapshot could not be written or read.
    pub const IO: i32 = 7;
}

const SNAPSHOT_FILE: &str = "engine.bin";
const DEFAULT_SEARCH_INTERNAL_RESULT_NUM: usize = 32;

#[derive(Debug)]
struct Store<T> {
    dimension: usize,
    vectors: FxHashMap<InternalId, Vec<T>>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot<T> {
    dimension: usize,
    search_internal_result_num: usize,
    vectors: Vec<(InternalId, Vec<T>)>,
}

/// Exact brute-force engine keeping every vector in memory.
#[derive(Debug)]
pub struct InMemoryEngine<T> {
    store: RwLock<Option<Store<T>>>,
    search_internal_result_num: AtomicUsize,
}

impl<T: VectorElement> Default for InMemoryEngine<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: VectorElement> InMemoryEngine<T> {
    /// Creates an engine with no index; `build` or `load` must run first.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: RwLock::new(None),
            search_internal_result_num: AtomicUsize::new(DEFAULT_SEARCH_INTERNAL_RESULT_NUM),
        }
    }

    /// Number of live vectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.read().as_ref().map_or(0, |s| s.vectors.len())
    }

    /// Returns true if no vector is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `internal_id` is live.
    #[must_use]
    pub fn contains(&self, internal_id: InternalId) -> bool {
        self.store
            .read()
            .as_ref()
            .is_some_and(|s| s.vectors.contains_key(&internal_id))
    }

    /// Copy of the stored vector for `internal_id`.
    #[must_use]
    pub fn vector(&self, internal_id: InternalId) -> Option<Vec<T>> {
        self.store
            .read()
            .as_ref()
            .and_then(|s| s.vectors.get(&internal_id).cloned())
    }

    fn not_built() -> EngineError {
        EngineError::new(status::NOT_BUILT, "index has not been built")
    }

    fn check_dimension(expected: usize, actual: usize) -> EngineStatus {
        if expected == actual {
            Ok(())
        } else {
            Err(EngineError::new(
                status::DIMENSION_MISMATCH,
                format!("expected dimension {expected}, got {actual}"),
            ))
        }
    }
}

impl<T: VectorElement> Engine for InMemoryEngine<T> {
    type Element = T;

    fn build(
        &self,
        vectors: VectorMatrix<'_, T>,
        metadata: &MetadataBatch,
        params: &BuildParams,
    ) -> EngineStatus {
        if metadata.len() != vectors.rows() {
            return Err(EngineError::new(
                status::INVALID_ARGUMENT,
                format!(
                    "{} metadata entries for {} vectors",
                    metadata.len(),
                    vectors.rows()
                ),
            ));
        }
        if let Some(dim) = params.get_parsed::<usize>(BuildParams::BASE, "Dim") {
            Self::check_dimension(dim, vectors.dimension())?;
        }
        if let Some(n) =
            params.get_parsed::<usize>(BuildParams::BUILD_SSD_INDEX, "SearchInternalResultNum")
        {
            self.search_internal_result_num.store(n, Ordering::Relaxed);
        }

        let mut map = FxHashMap::with_capacity_and_hasher(vectors.rows(), Default::default());
        for (row, vector) in vectors.iter_rows().enumerate() {
            map.insert(row as InternalId, vector.to_vec());
        }

        *self.store.write() = Some(Store {
            dimension: vectors.dimension(),
            vectors: map,
        });
        Ok(())
    }

    fn insert_one(&self, vector: &[T], internal_id: InternalId) -> EngineStatus {
        let mut guard = self.store.write();
        let store = guard.as_mut().ok_or_else(Self::not_built)?;
        Self::check_dimension(store.dimension, vector.len())?;
        if store.vectors.contains_key(&internal_id) {
            return Err(EngineError::new(
                status::DUPLICATE_ID,
                format!("internal id {internal_id} already present"),
            ));
        }
        store.vectors.insert(internal_id, vector.to_vec());
        Ok(())
    }

    fn delete_one(&self, internal_id: InternalId) -> EngineStatus {
        let mut guard = self.store.write();
        let store = guard.as_mut().ok_or_else(Self::not_built)?;
        match store.vectors.remove(&internal_id) {
            Some(_) => Ok(()),
            None => Err(EngineError::new(
                status::VECTOR_NOT_FOUND,
                format!("internal id {internal_id} not present"),
            )),
        }
    }

    fn search_memory(&self, query: &[T], k: usize) -> Result<Vec<Neighbour>, EngineError> {
        let guard = self.store.read();
        let store = guard.as_ref().ok_or_else(Self::not_built)?;
        Self::check_dimension(store.dimension, query.len())?;

        let limit = k.max(self.search_internal_result_num.load(Ordering::Relaxed));
        let mut candidates: Vec<Neighbour> = store
            .vectors
            .iter()
            .map(|(&id, v)| Neighbour::new(id, squared_l2(query, v)))
            .collect();
        drop(guard);

        sort_ascending(&mut candidates);
        candidates.truncate(limit);
        Ok(candidates)
    }

    fn search_secondary(
        &self,
        query: &[T],
        candidates: Vec<Neighbour>,
        stats: &mut SearchStats,
    ) -> Result<Vec<Neighbour>, EngineError> {
        let guard = self.store.read();
        let store = guard.as_ref().ok_or_else(Self::not_built)?;
        Self::check_dimension(store.dimension, query.len())?;

        stats.disk_reads += 1;
        stats.pages_read += candidates.len() as u64;

        let mut refined: Vec<Neighbour> = candidates
            .into_iter()
            .filter_map(|c| {
                store
                    .vectors
                    .get(&c.internal_id)
                    .map(|v| Neighbour::new(c.internal_id, squared_l2(query, v)))
            })
            .collect();
        drop(guard);

        sort_ascending(&mut refined);
        Ok(refined)
    }

    fn save(&self, path: &Path) -> EngineStatus {
        let guard = self.store.read();
        let store = guard.as_ref().ok_or_else(Self::not_built)?;

        let mut vectors: Vec<(InternalId, Vec<T>)> = store
            .vectors
            .iter()
            .map(|(&id, v)| (id, v.clone()))
            .collect();
        let dimension = store.dimension;
        drop(guard);
        vectors.sort_unstable_by_key(|(id, _)| *id);

        let snapshot = Snapshot {
            dimension,
            search_internal_result_num: self.search_internal_result_num.load(Ordering::Relaxed),
            vectors,
        };

        fs::create_dir_all(path).map_err(io_error)?;
        let file = fs::File::create(path.join(SNAPSHOT_FILE)).map_err(io_error)?;
        bincode::serialize_into(BufWriter::new(file), &snapshot)
            .map_err(|e| EngineError::new(status::IO, e.to_string()))
    }

    fn load(path: &Path) -> Result<Self, EngineError> {
        let file = fs::File::open(path.join(SNAPSHOT_FILE)).map_err(io_error)?;
        let snapshot: Snapshot<T> = bincode::deserialize_from(BufReader::new(file))
            .map_err(|e| EngineError::new(status::IO, e.to_string()))?;

        Ok(Self {
            store: RwLock::new(Some(Store {
                dimension: snapshot.dimension,
                vectors: snapshot.vectors.into_iter().collect(),
            })),
            search_internal_result_num: AtomicUsize::new(snapshot.search_internal_result_num),
        })
    }
}

fn io_error(err: std::io::Error) -> EngineError {
    EngineError::new(status::IO, err.to_string())
}

/// Ascending by distance, ties broken by internal id.
fn sort_ascending(candidates: &mut [Neighbour]) {
    candidates.sort_unstable_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then(a.internal_id.cmp(&b.internal_id))
    });
}
