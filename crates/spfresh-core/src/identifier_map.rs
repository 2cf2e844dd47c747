//! Bidirectional external ↔ internal identifier mapping.
//!
//! Both directions live behind one `parking_lot::Mutex`, so a caller never
//! observes a half-applied mapping. Critical sections are pure map
//! operations; no engine call or I/O happens under the lock.
//!
//! Internal ids come from a separate atomic allocator. Issued ids are never
//! handed out again, including ids freed by a delete: a search that still
//! holds a stale internal id then resolves to [`UNRESOLVED`] instead of to a
//! different vector.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};

/// Caller-visible vector identifier.
pub type ExternalId = i64;

/// Engine-side vector identifier, allocated by [`IdentifierMap`].
pub type InternalId = i64;

/// Sentinel returned for an internal id that no longer resolves.
pub const UNRESOLVED: ExternalId = -1;

#[derive(Debug, Default)]
struct Directions {
    forward: FxHashMap<ExternalId, InternalId>,
    reverse: FxHashMap<InternalId, ExternalId>,
}

impl Directions {
    /// Installs `external -> internal`, evicting stale entries on both sides.
    ///
    /// Returns the internal id previously mapped to `external`, if it differed.
    fn install(&mut self, external: ExternalId, internal: InternalId) -> Option<InternalId> {
        let displaced = self.forward.insert(external, internal);
        if let Some(old_internal) = displaced {
            if old_internal != internal {
                self.reverse.remove(&old_internal);
            }
        }
        if let Some(old_external) = self.reverse.insert(internal, external) {
            if old_external != external {
                self.forward.remove(&old_external);
            }
        }
        displaced.filter(|&old| old != internal)
    }
}

/// Serializable snapshot of an [`IdentifierMap`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierSnapshot {
    /// `(external, internal)` pairs.
    pub pairs: Vec<(ExternalId, InternalId)>,
    /// Next internal id the allocator will issue.
    pub next_internal_id: InternalId,
}

/// Thread-safe bidirectional identifier map with a monotonic allocator.
///
/// # Example
///
/// ```rust
/// use spfresh_core::IdentifierMap;
///
/// let ids = IdentifierMap::new();
/// let internal = ids.reserve_next_internal_id();
/// ids.register(42, internal);
/// assert_eq!(ids.lookup_internal(42), Some(internal));
/// assert_eq!(ids.lookup_external(internal), Some(42));
/// ```
#[derive(Debug, Default)]
pub struct IdentifierMap {
    directions: Mutex<Directions>,
    next_internal_id: AtomicI64,
}

impl IdentifierMap {
    /// Creates an empty map whose allocator starts at 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `external` to `internal`, replacing any prior mapping of either.
    ///
    /// Returns the internal id `external` was previously mapped to, if any
    /// (and different from `internal`). That id no longer resolves.
    pub fn register(&self, external: ExternalId, internal: InternalId) -> Option<InternalId> {
        self.directions.lock().install(external, internal)
    }

    /// Removes both directions for `external`.
    ///
    /// Returns `false` (a no-op) if `external` is unknown.
    pub fn unregister(&self, external: ExternalId) -> bool {
        let mut dirs = self.directions.lock();
        match dirs.forward.remove(&external) {
            Some(internal) => {
                dirs.reverse.remove(&internal);
                true
            }
            None => false,
        }
    }

    /// Removes the mapping only if `external` still maps to `internal`.
    ///
    /// Used by delete so that a concurrent re-insert of the same external id,
    /// which installed a newer internal id, is left in place.
    pub fn unregister_if_current(&self, external: ExternalId, internal: InternalId) -> bool {
        let mut dirs = self.directions.lock();
        if dirs.forward.get(&external) != Some(&internal) {
            return false;
        }
        dirs.forward.remove(&external);
        dirs.reverse.remove(&internal);
        true
    }

    /// Returns the internal id mapped to `external`.
    #[must_use]
    pub fn lookup_internal(&self, external: ExternalId) -> Option<InternalId> {
        self.directions.lock().forward.get(&external).copied()
    }

    /// Returns the external id mapped to `internal`, or `None` if unresolved.
    #[must_use]
    pub fn lookup_external(&self, internal: InternalId) -> Option<ExternalId> {
        self.directions.lock().reverse.get(&internal).copied()
    }

    /// Translates internal ids in order, substituting [`UNRESOLVED`] for
    /// ids without a mapping. Takes the lock once for the whole slice.
    #[must_use]
    pub fn resolve_all(&self, internals: &[InternalId]) -> Vec<ExternalId> {
        let dirs = self.directions.lock();
        internals
            .iter()
            .map(|internal| dirs.reverse.get(internal).copied().unwrap_or(UNRESOLVED))
            .collect()
    }

    /// Allocates a fresh internal id, strictly greater than any issued before.
    pub fn reserve_next_internal_id(&self) -> InternalId {
        self.next_internal_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Returns the id the allocator will issue next, without reserving it.
    #[must_use]
    pub fn next_internal_id(&self) -> InternalId {
        self.next_internal_id.load(Ordering::SeqCst)
    }

    /// Number of live mappings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.directions.lock().forward.len()
    }

    /// Returns true if no mapping is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.directions.lock().forward.is_empty()
    }

    /// Drops every mapping and restarts the allocator at 0.
    pub fn clear(&self) {
        let mut dirs = self.directions.lock();
        dirs.forward.clear();
        dirs.reverse.clear();
        self.next_internal_id.store(0, Ordering::SeqCst);
    }

    /// Replaces the whole map with `pairs` and sets the allocator to `next`.
    ///
    /// Runs under a single lock acquisition; pairs are installed in order with
    /// [`IdentifierMap::register`] semantics.
    pub fn reset_with<I>(&self, pairs: I, next: InternalId)
    where
        I: IntoIterator<Item = (ExternalId, InternalId)>,
    {
        let mut dirs = self.directions.lock();
        dirs.forward.clear();
        dirs.reverse.clear();
        for (external, internal) in pairs {
            dirs.install(external, internal);
        }
        self.next_internal_id.store(next, Ordering::SeqCst);
    }

    /// Captures a consistent copy of the map, sorted by external id.
    #[must_use]
    pub fn snapshot(&self) -> IdentifierSnapshot {
        let dirs = self.directions.lock();
        let mut pairs: Vec<_> = dirs.forward.iter().map(|(&e, &i)| (e, i)).collect();
        let next_internal_id = self.next_internal_id.load(Ordering::SeqCst);
        drop(dirs);
        pairs.sort_unstable();
        IdentifierSnapshot {
            pairs,
            next_internal_id,
        }
    }

    /// Replaces the map contents with a snapshot.
    ///
    /// The allocator never moves backwards past an id that was already issued
    /// by this map, nor below any internal id present in the snapshot.
    pub fn restore(&self, snapshot: IdentifierSnapshot) {
        let floor = snapshot
            .pairs
            .iter()
            .map(|&(_, internal)| internal + 1)
            .max()
            .unwrap_or(0);
        let next = snapshot.next_internal_id.max(floor).max(self.next_internal_id());
        self.reset_with(snapshot.pairs, next);
    }
}
