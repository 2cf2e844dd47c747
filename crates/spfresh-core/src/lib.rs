//! # `spfresh-core`
//!
//! Concurrent identifier mapping and parallel batch dispatch for an external
//! SPFresh-style ANN engine.
//!
//! The engine (graph/cluster construction, posting lists, distance
//! computation, persistence) sits behind the [`Engine`] trait. This crate
//! owns what surrounds it:
//!
//! - **[`IdentifierMap`]**: bidirectional external ↔ internal id mapping under
//!   one lock, with a never-reusing internal id allocator
//! - **[`ParallelDispatcher`]**: exactly-once fan-out of `M` items over `T`
//!   workers with per-slot results
//! - **Coordinators**: build, insert/delete and two-phase search, each
//!   reporting per-item outcomes instead of aborting a batch
//! - **[`FreshIndex`]**: the caller-facing wrapper enforcing build exclusivity
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use spfresh_core::{FreshIndex, InMemoryEngine, VectorValueType};
//!
//! let index = FreshIndex::new(InMemoryEngine::<f32>::new(), 128, VectorValueType::Float)?;
//! index.build(&base, "./data/index", 8, true)?;
//!
//! // Insert 1000 vectors under external ids 10000..11000
//! let ids: Vec<i64> = (10_000..11_000).collect();
//! index.insert(&fresh, &ids, 4)?.into_result()?;
//!
//! // Remove, then search: unresolved ranks read -1
//! index.remove(&[1000, 1001, 1002], 4)?;
//! let neighbours = index.search(&queries, 5, 4)?.into_matrix();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
// Counters and latencies are reported as u64/f32; truncation is bounded by batch size.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
#[cfg(test)]
mod config_tests;
pub mod coordinator;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod identifier_map;
pub mod index;
pub mod report;
#[cfg(test)]
mod report_tests;
pub mod vector;

pub use config::{
    BuildConfig, ConfigError, FreshConfig, LimitsConfig, SearchConfig, ThreadsConfig,
};
pub use coordinator::{BuildCoordinator, BuildSummary, MutationCoordinator, QueryCoordinator};
pub use dispatch::ParallelDispatcher;
pub use engine::memory::InMemoryEngine;
pub use engine::{
    BuildParams, Engine, EngineError, EngineStatus, MetadataBatch, Neighbour, SearchStats,
};
pub use error::{Error, FailureKind, ItemFailure, Result};
pub use identifier_map::{ExternalId, IdentifierMap, IdentifierSnapshot, InternalId, UNRESOLVED};
pub use index::{FreshIndex, IndexPhase, ID_MAP_FILE};
pub use report::{BatchReport, ItemOutcome, QueryResult, SearchReport};
pub use vector::{VectorElement, VectorMatrix, VectorValueType};
