// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

use super::points_to::PointsToSet;
use crate::util::bit_vec::Idx;

/// Diff points-to data.
///
/// The points-to set of each pointer is split in two parts: the `diff` part
/// holds objects that still have to be propagated, the `propa` part holds
/// objects that already were. Merges only ever add objects, so the union of
/// both parts forms a chain over the lifetime of the solve.
pub struct DiffPTData<K, D> {
    /// Diff points-to to be propagated.
    diff_pts_map: HashMap<K, PointsToSet<D>>,
    /// Points-to already propagated.
    propa_pts_map: HashMap<K, PointsToSet<D>>,

    marker: PhantomData<D>,
}

impl<K, D> DiffPTData<K, D>
where
    K: Hash + Eq + Copy,
    D: Idx,
{
    pub fn new() -> DiffPTData<K, D> {
        DiffPTData {
            diff_pts_map: HashMap::new(),
            propa_pts_map: HashMap::new(),
            marker: PhantomData,
        }
    }

    /// Adds `elem` to the points-to set associated with `key`.
    /// Returns false if `elem` is already known for `key`.
    pub fn add_pts(&mut self, key: K, elem: D) -> bool {
        if let Some(propa) = self.propa_pts_map.get(&key) {
            if propa.contains(elem) {
                return false;
            }
        }
        self.diff_pts_map.entry(key).or_default().insert(elem)
    }

    /// Performs `diff(key) = diff(key) U (other - propa(key))`.
    pub fn union_pts_to(&mut self, key: K, other: &PointsToSet<D>) -> bool {
        let propa = self.propa_pts_map.entry(key).or_default();
        let fresh: PointsToSet<D> = other.iter().filter(|o| !propa.contains(*o)).collect();
        if fresh.is_empty() {
            return false;
        }
        self.diff_pts_map.entry(key).or_default().union(&fresh)
    }

    /// Get the unpropagated part of `key`'s points-to set.
    #[inline]
    pub fn get_diff_pts(&self, key: K) -> Option<&PointsToSet<D>> {
        self.diff_pts_map.get(&key)
    }

    /// Get the already-propagated part of `key`'s points-to set.
    #[inline]
    pub fn get_propa_pts(&self, key: K) -> Option<&PointsToSet<D>> {
        self.propa_pts_map.get(&key)
    }

    /// Returns the full points-to set of `key` (diff U propa).
    pub fn full_pts(&self, key: K) -> PointsToSet<D> {
        let mut pts = self
            .propa_pts_map
            .get(&key)
            .cloned()
            .unwrap_or_default();
        if let Some(diff) = self.diff_pts_map.get(&key) {
            pts.union(diff);
        }
        pts
    }

    pub fn contains(&self, key: K, elem: D) -> bool {
        self.propa_pts_map
            .get(&key)
            .map_or(false, |p| p.contains(elem))
            || self
                .diff_pts_map
                .get(&key)
                .map_or(false, |d| d.contains(elem))
    }

    /// Moves all diff elems of `key` to its propa set.
    pub fn flush(&mut self, key: K) {
        let Some(diff) = self.diff_pts_map.get_mut(&key) else {
            return;
        };
        let propa = self.propa_pts_map.entry(key).or_default();
        propa.union(diff);
        diff.clear();
    }

    /// All keys with a points-to entry.
    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        let mut seen: Vec<K> = self.propa_pts_map.keys().copied().collect();
        for k in self.diff_pts_map.keys() {
            if !self.propa_pts_map.contains_key(k) {
                seen.push(*k);
            }
        }
        seen.into_iter()
    }
}

impl<K, D> Default for DiffPTData<K, D>
where
    K: Hash + Eq + Copy,
    D: Idx,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, D> fmt::Debug for DiffPTData<K, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        "DiffPTData".fmt(f)
    }
}

#[cfg(test)]
mod test {
    use super::DiffPTData;
    use crate::pts_set::points_to::PointsToSet;

    #[test]
    fn add_flush_add() {
        let mut data = DiffPTData::<u32, u32>::new();
        assert!(data.add_pts(1, 10));
        assert!(data.add_pts(1, 11));
        assert!(!data.add_pts(1, 10));
        assert_eq!(data.get_diff_pts(1).unwrap().count(), 2);

        data.flush(1);
        assert!(data.get_diff_pts(1).unwrap().is_empty());
        assert_eq!(data.get_propa_pts(1).unwrap().count(), 2);

        // elements already propagated are not re-added to the diff
        assert!(!data.add_pts(1, 10));
        assert!(data.add_pts(1, 12));
        assert_eq!(data.get_diff_pts(1).unwrap().count(), 1);
        assert_eq!(data.full_pts(1).count(), 3);
    }

    #[test]
    fn union_pts_to_skips_propagated() {
        let mut data = DiffPTData::<u32, u32>::new();
        data.add_pts(1, 10);
        data.flush(1);

        let incoming: PointsToSet<u32> = [10u32, 20, 30].into_iter().collect();
        assert!(data.union_pts_to(1, &incoming));
        let diff = data.get_diff_pts(1).unwrap();
        assert!(!diff.contains(10));
        assert!(diff.contains(20));
        assert!(diff.contains(30));
        assert!(!data.union_pts_to(1, &incoming.iter().filter(|o| *o == 10).collect()));
    }
}
