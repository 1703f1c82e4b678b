//! Broad-phase spatial index backing the pick index.

use crate::types::Aabb;
use std::collections::BTreeMap;

/// Broad-phase interface: insert/update/remove AABB proxies and query them
/// by point or area.
///
/// Implementations must iterate candidates deterministically; the pick
/// index relies on that determinism to resolve z-rank ties reproducibly.
pub trait BroadPhase {
    /// Inserts or updates the proxy with the given `id` and `aabb`.
    fn upsert(&mut self, id: u32, aabb: Aabb);
    /// Removes a proxy if present.
    fn remove(&mut self, id: u32);
    /// Returns every proxy id whose AABB overlaps `query`, in ascending id
    /// order.
    fn query(&self, query: &Aabb) -> Vec<u32>;
    /// Looks up the current AABB for `id`, if tracked.
    fn get(&self, id: u32) -> Option<Aabb>;
}

/// A minimal `O(n)`-scan broad phase keyed by a `BTreeMap` for deterministic
/// iteration order.
///
/// This is a correctness baseline, not a spatial-partitioning structure: at
/// document scales the engine targets (thousands, not millions, of
/// entities) a full scan per query is fast enough that a grid or BVH is not
/// yet justified. Replacing the `BTreeMap` scan with a uniform grid is a
/// drop-in change behind the [`BroadPhase`] trait if profiling ever shows
/// otherwise.
#[derive(Default)]
pub struct AabbIndex {
    items: BTreeMap<u32, Aabb>,
}

impl AabbIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }

    /// Number of tracked proxies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if no proxies are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Clears every tracked proxy.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl BroadPhase for AabbIndex {
    fn upsert(&mut self, id: u32, aabb: Aabb) {
        self.items.insert(id, aabb);
    }

    fn remove(&mut self, id: u32) {
        self.items.remove(&id);
    }

    fn query(&self, query: &Aabb) -> Vec<u32> {
        let mut out: Vec<u32> = self
            .items
            .iter()
            .filter(|(_, aabb)| aabb.overlaps(query))
            .map(|(id, _)| *id)
            .collect();
        out.sort_unstable();
        out
    }

    fn get(&self, id: u32) -> Option<Aabb> {
        self.items.get(&id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vec2;

    fn aabb(x0: f32, y0: f32, x1: f32, y1: f32) -> Aabb {
        Aabb::new(Vec2::new(x0, y0), Vec2::new(x1, y1))
    }

    #[test]
    fn query_returns_overlapping_ids_sorted() {
        let mut idx = AabbIndex::new();
        idx.upsert(5, aabb(0.0, 0.0, 10.0, 10.0));
        idx.upsert(2, aabb(5.0, 5.0, 15.0, 15.0));
        idx.upsert(9, aabb(100.0, 100.0, 110.0, 110.0));
        assert_eq!(idx.query(&aabb(0.0, 0.0, 20.0, 20.0)), vec![2, 5]);
    }

    #[test]
    fn remove_drops_proxy_from_future_queries() {
        let mut idx = AabbIndex::new();
        idx.upsert(1, aabb(0.0, 0.0, 1.0, 1.0));
        idx.remove(1);
        assert!(idx.query(&aabb(0.0, 0.0, 1.0, 1.0)).is_empty());
    }

    #[test]
    fn upsert_replaces_existing_aabb() {
        let mut idx = AabbIndex::new();
        idx.upsert(1, aabb(0.0, 0.0, 1.0, 1.0));
        idx.upsert(1, aabb(100.0, 100.0, 101.0, 101.0));
        assert!(idx.query(&aabb(0.0, 0.0, 1.0, 1.0)).is_empty());
        assert_eq!(idx.query(&aabb(99.0, 99.0, 102.0, 102.0)), vec![1]);
    }
}
