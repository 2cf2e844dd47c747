//! Coordinators translating caller batches into engine calls.
//!
//! Each coordinator shares the engine handle and the [`IdentifierMap`] with
//! the others through `Arc`. None of them enforces build exclusivity; that
//! is the job of [`crate::FreshIndex`].
//!
//! [`IdentifierMap`]: crate::IdentifierMap

mod build;
mod mutation;
mod query;

pub use build::{BuildCoordinator, BuildSummary};
pub use mutation::MutationCoordinator;
pub use query::QueryCoordinator;
