// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt;
use std::slice;

use crate::util::bit_vec::{BitIter, BitVec, Idx};

const SMALL_SET_CAPACITY: usize = 16;

/// Hybrid implementation of points-to set, which uses an explicit array for
/// small sets, and a bit vector for large sets.
///
/// Points-to sets only ever grow during a solve, so no removal operations
/// are provided.
#[derive(Clone)]
pub struct PointsToSet<T> {
    objects: HybridSet<T>,
}

impl<T: Idx> PointsToSet<T> {
    pub fn new() -> Self {
        PointsToSet {
            objects: HybridSet::new(),
        }
    }

    /// Count the number of elements in the set.
    pub fn count(&self) -> usize {
        self.objects.count()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Returns `true` if `self` contains `elem`.
    pub fn contains(&self, elem: T) -> bool {
        self.objects.contains(elem)
    }

    /// Is `self` a superset of `other`?
    pub fn superset(&self, other: &PointsToSet<T>) -> bool {
        self.objects.superset(&other.objects)
    }

    /// Adds `elem` to this set, returns true if it was not already present.
    pub fn insert(&mut self, elem: T) -> bool {
        self.objects.insert(elem)
    }

    /// `self = self U other`, returns true if `self` changed.
    pub fn union(&mut self, other: &PointsToSet<T>) -> bool {
        self.objects.union(&other.objects)
    }

    /// Clear all elements.
    pub fn clear(&mut self) {
        self.objects.clear();
    }

    pub fn iter(&self) -> HybridIter<'_, T> {
        self.objects.iter()
    }
}

impl<T: Idx> Default for PointsToSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Idx> fmt::Debug for PointsToSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.objects.fmt(f)
    }
}

impl<'a, T: Idx> IntoIterator for &'a PointsToSet<T> {
    type Item = T;
    type IntoIter = HybridIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: Idx> FromIterator<T> for PointsToSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = PointsToSet::new();
        for elem in iter {
            set.insert(elem);
        }
        set
    }
}

#[derive(Clone)]
enum HybridSet<T> {
    Small(Vec<T>),
    Large(BitVec<T>),
}

impl<T: Idx> HybridSet<T> {
    fn new() -> Self {
        HybridSet::Small(Vec::new())
    }

    fn count(&self) -> usize {
        match self {
            HybridSet::Small(small) => small.len(),
            HybridSet::Large(large) => large.count(),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            HybridSet::Small(small) => small.is_empty(),
            HybridSet::Large(large) => large.is_empty(),
        }
    }

    fn contains(&self, elem: T) -> bool {
        match self {
            HybridSet::Small(small) => small.contains(&elem),
            HybridSet::Large(large) => large.contains(elem),
        }
    }

    fn superset(&self, other: &HybridSet<T>) -> bool {
        match (self, other) {
            (HybridSet::Large(self_large), HybridSet::Large(other_large)) => {
                self_large.superset(other_large)
            }
            _ => other.iter().all(|elem| self.contains(elem)),
        }
    }

    fn insert(&mut self, elem: T) -> bool {
        match self {
            HybridSet::Small(small) if small.contains(&elem) => false,
            HybridSet::Small(small) if small.len() < SMALL_SET_CAPACITY => {
                small.push(elem);
                true
            }
            HybridSet::Small(small) => {
                // The set is small and full. Convert to a large set.
                let mut large = BitVec::new_empty();
                for elem in small.iter() {
                    large.insert(*elem);
                }
                let changed = large.insert(elem);
                *self = HybridSet::Large(large);
                changed
            }
            HybridSet::Large(large) => large.insert(elem),
        }
    }

    fn union(&mut self, other: &HybridSet<T>) -> bool {
        if let (HybridSet::Large(self_large), HybridSet::Large(other_large)) = (&mut *self, other)
        {
            return self_large.union(other_large);
        }
        let mut changed = false;
        for elem in other.iter() {
            changed |= self.insert(elem);
        }
        changed
    }

    fn clear(&mut self) {
        match self {
            HybridSet::Small(small) => small.clear(),
            HybridSet::Large(_) => *self = HybridSet::Small(Vec::new()),
        }
    }

    fn iter(&self) -> HybridIter<'_, T> {
        match self {
            HybridSet::Small(small) => HybridIter::Small(small.iter()),
            HybridSet::Large(large) => HybridIter::Large(large.iter()),
        }
    }
}

impl<T: Idx> fmt::Debug for HybridSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

pub enum HybridIter<'a, T: Idx> {
    Small(slice::Iter<'a, T>),
    Large(BitIter<'a, T>),
}

impl<'a, T: Idx> Iterator for HybridIter<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        match self {
            HybridIter::Small(small) => small.next().copied(),
            HybridIter::Large(large) => large.next(),
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use rand::Rng;

    use super::{HybridSet, PointsToSet, SMALL_SET_CAPACITY};

    fn random_set(len: usize) -> HashSet<u32> {
        let mut rng = rand::thread_rng();
        let mut set = HashSet::new();
        while set.len() < len {
            set.insert(rng.gen_range(1..1000));
        }
        set
    }

    fn from_hash_set(elems: &HashSet<u32>) -> PointsToSet<u32> {
        elems.iter().copied().collect()
    }

    #[test]
    fn small_set() {
        let rand_set = random_set(8);
        let small_set = from_hash_set(&rand_set);
        assert_eq!(small_set.count(), 8);
        assert!(matches!(small_set.objects, HybridSet::Small(_)));
        assert_eq!(small_set.iter().collect::<HashSet<_>>(), rand_set);

        let elem = *rand_set.iter().next().unwrap();
        assert!(small_set.contains(elem));
    }

    #[test]
    fn large_set() {
        let rand_set = random_set(SMALL_SET_CAPACITY + 3);
        let large_set = from_hash_set(&rand_set);
        assert_eq!(large_set.count(), SMALL_SET_CAPACITY + 3);
        assert!(matches!(large_set.objects, HybridSet::Large(_)));
        assert_eq!(large_set.iter().collect::<HashSet<_>>(), rand_set);
    }

    #[test]
    fn union_across_representations() {
        let rand_small_set = random_set(8);
        let rand_large_set = random_set(SMALL_SET_CAPACITY + 3);
        let small_set = from_hash_set(&rand_small_set);
        let large_set = from_hash_set(&rand_large_set);

        let expected = rand_small_set
            .union(&rand_large_set)
            .cloned()
            .collect::<HashSet<_>>();

        let mut union_set = small_set.clone();
        assert!(union_set.union(&large_set));
        assert!(union_set.superset(&small_set));
        assert!(union_set.superset(&large_set));
        assert_eq!(union_set.iter().collect::<HashSet<_>>(), expected);

        let mut union_set = large_set.clone();
        union_set.union(&small_set);
        assert_eq!(union_set.iter().collect::<HashSet<_>>(), expected);
    }

    #[test]
    fn union_is_monotone() {
        let mut set = PointsToSet::<u32>::new();
        let mut snapshot = HashSet::new();
        for _ in 0..10 {
            let delta = from_hash_set(&random_set(6));
            set.union(&delta);
            let now = set.iter().collect::<HashSet<_>>();
            assert!(now.is_superset(&snapshot));
            snapshot = now;
        }
    }
}
