//! External ANN engine contract.
//!
//! This module defines the [`Engine`] trait that the coordinators call into.
//! Graph/cluster construction, posting-list layout, distance computation and
//! on-disk persistence all live behind it. The coordinators only assume:
//!
//! - `build` assigns internal ids `0..N` in input row order
//! - `insert_one`, `delete_one` and both search phases are safe to call
//!   concurrently from several threads
//! - `search_secondary` returns candidates in ascending distance order
//!
//! [`memory::InMemoryEngine`] is an exact brute-force implementation used by
//! tests and benches.

pub mod memory;
#[cfg(test)]
mod memory_tests;

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::BuildConfig;
use crate::identifier_map::{ExternalId, InternalId};
use crate::vector::{VectorElement, VectorMatrix, VectorValueType};

/// Non-success status reported by the engine, with its original code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("engine status {code}: {message}")]
pub struct EngineError {
    /// Engine status code.
    pub code: i32,
    /// Human-readable description.
    pub message: String,
}

impl EngineError {
    /// Status code reserved for a panic caught inside an engine call.
    pub const PANIC_STATUS: i32 = i32::MIN;

    /// Creates an engine error from a status code and message.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn panicked(operation: &str, payload: &(dyn std::any::Any + Send)) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::new(Self::PANIC_STATUS, format!("{operation} panicked: {detail}"))
    }
}

/// Result of an engine call that produces no value.
pub type EngineStatus = std::result::Result<(), EngineError>;

/// A search candidate: internal id plus engine distance (lower is closer).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbour {
    /// Internal id of the candidate vector.
    pub internal_id: InternalId,
    /// Distance to the query.
    pub distance: f32,
}

impl Neighbour {
    /// Creates a candidate.
    #[must_use]
    pub fn new(internal_id: InternalId, distance: f32) -> Self {
        Self {
            internal_id,
            distance,
        }
    }
}

/// Per-search statistics.
///
/// The engine fills the I/O counters during `search_secondary`; the query
/// coordinator fills the rest and merges per-worker values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchStats {
    /// Queries processed.
    pub queries: u64,
    /// Queries whose search failed in either phase.
    pub failed_queries: u64,
    /// Candidates produced by the in-memory phase.
    pub memory_candidates: u64,
    /// Results produced by the secondary phase.
    pub secondary_results: u64,
    /// Posting pages read by the engine.
    pub pages_read: u64,
    /// Secondary-storage read requests issued by the engine.
    pub disk_reads: u64,
    /// Time spent in the in-memory phase.
    pub memory_latency: Duration,
    /// Time spent in the secondary phase.
    pub secondary_latency: Duration,
}

impl SearchStats {
    /// Adds `other` into `self`.
    pub fn merge(&mut self, other: &Self) {
        self.queries += other.queries;
        self.failed_queries += other.failed_queries;
        self.memory_candidates += other.memory_candidates;
        self.secondary_results += other.secondary_results;
        self.pages_read += other.pages_read;
        self.disk_reads += other.disk_reads;
        self.memory_latency += other.memory_latency;
        self.secondary_latency += other.secondary_latency;
    }
}

/// Per-vector metadata handed to the engine at build time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataBatch {
    entries: Vec<String>,
}

impl MetadataBatch {
    /// One entry per vector holding the decimal external id.
    #[must_use]
    pub fn from_external_ids<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = ExternalId>,
    {
        Self {
            entries: ids.into_iter().map(|id| id.to_string()).collect(),
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry for row `j`.
    #[must_use]
    pub fn get(&self, j: usize) -> Option<&str> {
        self.entries.get(j).map(String::as_str)
    }
}

/// Sectioned key/value build parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildParams {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl BuildParams {
    /// Section holding index-wide settings.
    pub const BASE: &'static str = "Base";
    /// Section for head selection.
    pub const SELECT_HEAD: &'static str = "SelectHead";
    /// Section for head graph construction.
    pub const BUILD_HEAD: &'static str = "BuildHead";
    /// Section for posting-list (secondary storage) construction.
    pub const BUILD_SSD_INDEX: &'static str = "BuildSSDIndex";

    /// Derives the full parameter set for one build call.
    #[must_use]
    pub fn from_config(
        config: &BuildConfig,
        dimension: usize,
        value_type: VectorValueType,
        index_directory: &Path,
        threads: usize,
    ) -> Self {
        let threads = threads.to_string();
        let mut params = Self::default();

        params
            .set(Self::BASE, "IndexAlgoType", &config.algorithm)
            .set(Self::BASE, "DistCalcMethod", &config.distance)
            .set(Self::BASE, "Dim", dimension)
            .set(Self::BASE, "ValueType", value_type)
            .set(Self::BASE, "IndexDirectory", index_directory.display());

        params
            .set(Self::SELECT_HEAD, "isExecute", true)
            .set(Self::SELECT_HEAD, "NumberOfThreads", &threads)
            .set(Self::SELECT_HEAD, "Ratio", config.select_head_ratio);

        params
            .set(Self::BUILD_HEAD, "isExecute", true)
            .set(Self::BUILD_HEAD, "RefineIterations", config.refine_iterations)
            .set(Self::BUILD_HEAD, "NumberOfThreads", &threads);

        params
            .set(Self::BUILD_SSD_INDEX, "isExecute", true)
            .set(Self::BUILD_SSD_INDEX, "BuildSsdIndex", true)
            .set(Self::BUILD_SSD_INDEX, "NumberOfThreads", &threads)
            .set(Self::BUILD_SSD_INDEX, "PostingPageLimit", config.posting_page_limit)
            .set(
                Self::BUILD_SSD_INDEX,
                "SearchPostingPageLimit",
                config.search_posting_page_limit,
            )
            .set(Self::BUILD_SSD_INDEX, "InternalResultNum", config.internal_result_num)
            .set(
                Self::BUILD_SSD_INDEX,
                "SearchInternalResultNum",
                config.search_internal_result_num,
            )
            .set(Self::BUILD_SSD_INDEX, "ResultNum", config.result_num)
            .set(Self::BUILD_SSD_INDEX, "MaxDistRatio", config.max_dist_ratio)
            .set(Self::BUILD_SSD_INDEX, "TmpDir", &config.tmp_dir);

        params
    }

    /// Sets `name` in `section`, replacing any previous value.
    pub fn set(
        &mut self,
        section: &str,
        name: &str,
        value: impl std::fmt::Display,
    ) -> &mut Self {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(name.to_string(), value.to_string());
        self
    }

    /// Returns the value of `name` in `section`.
    #[must_use]
    pub fn get(&self, section: &str, name: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|entries| entries.get(name))
            .map(String::as_str)
    }

    /// Parses the value of `name` in `section`.
    #[must_use]
    pub fn get_parsed<T: std::str::FromStr>(&self, section: &str, name: &str) -> Option<T> {
        self.get(section, name).and_then(|v| v.parse().ok())
    }

    /// Iterates `(section, name, value)` triples in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.sections.iter().flat_map(|(section, entries)| {
            entries
                .iter()
                .map(move |(name, value)| (section.as_str(), name.as_str(), value.as_str()))
        })
    }
}

/// Capabilities the coordinators consume from an ANN engine.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; every method except `build` and
/// `load` may be called concurrently from several worker threads.
pub trait Engine: Send + Sync {
    /// Vector component type.
    type Element: VectorElement;

    /// Builds the index from scratch. Row `j` receives internal id `j`.
    fn build(
        &self,
        vectors: VectorMatrix<'_, Self::Element>,
        metadata: &MetadataBatch,
        params: &BuildParams,
    ) -> EngineStatus;

    /// Inserts one vector under a caller-assigned internal id.
    fn insert_one(&self, vector: &[Self::Element], internal_id: InternalId) -> EngineStatus;

    /// Deletes one vector by internal id.
    fn delete_one(&self, internal_id: InternalId) -> EngineStatus;

    /// Phase 1: approximate candidates from the in-memory structure.
    fn search_memory(
        &self,
        query: &[Self::Element],
        k: usize,
    ) -> std::result::Result<Vec<Neighbour>, EngineError>;

    /// Phase 2: refines candidates against secondary storage.
    ///
    /// Returns candidates in ascending distance order.
    fn search_secondary(
        &self,
        query: &[Self::Element],
        candidates: Vec<Neighbour>,
        stats: &mut SearchStats,
    ) -> std::result::Result<Vec<Neighbour>, EngineError>;

    /// Per-thread setup run once by each search worker before its first query.
    fn prepare_search_worker(&self) {}

    /// Persists engine state under `path`.
    fn save(&self, path: &Path) -> EngineStatus;

    /// Loads engine state previously written by [`Engine::save`].
    fn load(path: &Path) -> std::result::Result<Self, EngineError>
    where
        Self: Sized;
}

/// Runs an engine call, converting a panic into [`EngineError::PANIC_STATUS`].
pub(crate) fn guarded<T, F>(operation: &str, call: F) -> std::result::Result<T, EngineError>
where
    F: FnOnce() -> std::result::Result<T, EngineError>,
{
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(payload) => Err(EngineError::panicked(operation, payload.as_ref())),
    }
}
