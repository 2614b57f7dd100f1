// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! A small-size-optimized map for the inner level of context-sensitive
//! element lookups, where the number of contexts per entity is usually tiny.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

const SMALL_MAP_CAPACITY: usize = 8;

/// Association-list map that converts itself to a hash map once it
/// outgrows [`SMALL_MAP_CAPACITY`].
#[derive(Clone)]
pub enum HybridMap<K, V> {
    Small(Vec<(K, V)>),
    Large(HashMap<K, V>),
}

impl<K: Copy + Eq + Hash, V: Copy> HybridMap<K, V> {
    pub fn new() -> Self {
        HybridMap::Small(Vec::new())
    }

    pub fn len(&self) -> usize {
        match self {
            HybridMap::Small(small) => small.len(),
            HybridMap::Large(large) => large.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: K) -> Option<V> {
        match self {
            HybridMap::Small(small) => small.iter().find(|(k, _)| *k == key).map(|(_, v)| *v),
            HybridMap::Large(large) => large.get(&key).copied(),
        }
    }

    /// Returns the value for `key`, inserting `make()` if absent.
    pub fn get_or_insert_with(&mut self, key: K, make: impl FnOnce() -> V) -> V {
        if let Some(v) = self.get(key) {
            return v;
        }
        let value = make();
        match self {
            HybridMap::Small(small) if small.len() < SMALL_MAP_CAPACITY => {
                small.push((key, value));
            }
            HybridMap::Small(small) => {
                let mut large: HashMap<K, V> = small.iter().copied().collect();
                large.insert(key, value);
                *self = HybridMap::Large(large);
            }
            HybridMap::Large(large) => {
                large.insert(key, value);
            }
        }
        value
    }

    pub fn iter(&self) -> HybridMapIter<'_, K, V> {
        match self {
            HybridMap::Small(small) => HybridMapIter::Small(small.iter()),
            HybridMap::Large(large) => HybridMapIter::Large(large.iter()),
        }
    }

    pub fn values(&self) -> impl Iterator<Item = V> + '_ {
        self.iter().map(|(_, v)| v)
    }
}

impl<K: Copy + Eq + Hash, V: Copy> Default for HybridMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy + Eq + Hash + fmt::Debug, V: Copy + fmt::Debug> fmt::Debug for HybridMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

pub enum HybridMapIter<'a, K, V> {
    Small(std::slice::Iter<'a, (K, V)>),
    Large(std::collections::hash_map::Iter<'a, K, V>),
}

impl<'a, K: Copy, V: Copy> Iterator for HybridMapIter<'a, K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        match self {
            HybridMapIter::Small(iter) => iter.next().copied(),
            HybridMapIter::Large(iter) => iter.next().map(|(k, v)| (*k, *v)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{HybridMap, SMALL_MAP_CAPACITY};

    #[test]
    fn get_or_insert_is_idempotent() {
        let mut map = HybridMap::<u32, u32>::new();
        let a = map.get_or_insert_with(7, || 70);
        let b = map.get_or_insert_with(7, || 71);
        assert_eq!(a, 70);
        assert_eq!(b, 70);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn promotes_to_large_map() {
        let mut map = HybridMap::<u32, u32>::new();
        for i in 0..(SMALL_MAP_CAPACITY as u32 + 4) {
            map.get_or_insert_with(i, || i * 10);
        }
        assert!(matches!(map, HybridMap::Large(_)));
        for i in 0..(SMALL_MAP_CAPACITY as u32 + 4) {
            assert_eq!(map.get(i), Some(i * 10));
        }
        assert_eq!(map.len(), SMALL_MAP_CAPACITY + 4);
    }
}
