use std::collections::HashMap;
use std::hash::Hash;
use std::iter::FromIterator;

use anyhow::Result;

use crate::containers::MappableSet;
use crate::errors::Error;
use crate::genome::{ContigRegion, Mappable};
use crate::ContigName;

/// Keyed interval indexes: one [`MappableSet`] per key, with the set
/// predicates lifted to the keyed collection. A key without entries behaves
/// like an empty set rather than an error.
#[derive(Debug, Clone)]
pub struct MappableMap<K, M> {
    inner: HashMap<K, MappableSet<M>>,
}

/// Per-contig interval union, e.g. the region-possibility summary of a
/// read file.
pub type ContigMap = MappableMap<ContigName, ContigRegion>;

impl<K, M> Default for MappableMap<K, M> {
    fn default() -> Self {
        MappableMap {
            inner: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, M: Mappable> MappableMap<K, M> {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn insert(&mut self, key: K, mappable: M) {
        self.inner
            .entry(key)
            .or_insert_with(MappableSet::new)
            .insert(mappable);
    }

    pub fn get(&self, key: &K) -> Option<&MappableSet<M>> {
        self.inner.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.inner.keys()
    }

    pub fn num_keys(&self) -> usize {
        self.inner.len()
    }

    /// Total number of elements across all keys.
    pub fn len(&self) -> usize {
        self.inner.values().map(MappableSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.values().all(MappableSet::is_empty)
    }

    pub fn has_overlapped(&self, key: &K, region: ContigRegion) -> bool {
        self.inner
            .get(key)
            .map_or(false, |set| set.has_overlapped(region))
    }

    pub fn count_overlapped(&self, key: &K, region: ContigRegion) -> u64 {
        self.inner
            .get(key)
            .map_or(0, |set| set.count_overlapped(region))
    }

    pub fn has_contained(&self, key: &K, region: ContigRegion) -> bool {
        self.inner
            .get(key)
            .map_or(false, |set| set.has_contained(region))
    }

    pub fn count_contained(&self, key: &K, region: ContigRegion) -> u64 {
        self.inner
            .get(key)
            .map_or(0, |set| set.count_contained(region))
    }

    /// The overlapping element under `key` with the smallest begin; fails
    /// on a map with no elements at all.
    pub fn leftmost_overlapped(&self, key: &K, region: ContigRegion) -> Result<Option<&M>> {
        if self.is_empty() {
            return Err(Error::EmptyMappableMap.into());
        }
        Ok(self
            .inner
            .get(key)
            .and_then(|set| set.leftmost_overlapped(region)))
    }

    /// The overlapping element under `key` with the largest end; fails on a
    /// map with no elements at all.
    pub fn rightmost_overlapped(&self, key: &K, region: ContigRegion) -> Result<Option<&M>> {
        if self.is_empty() {
            return Err(Error::EmptyMappableMap.into());
        }
        Ok(self
            .inner
            .get(key)
            .and_then(|set| set.rightmost_overlapped(region)))
    }
}

impl<K: Eq + Hash, M: Mappable> FromIterator<(K, M)> for MappableMap<K, M> {
    fn from_iter<I: IntoIterator<Item = (K, M)>>(iter: I) -> Self {
        let mut map = MappableMap::new();
        for (key, mappable) in iter {
            map.insert(key, mappable);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(begin: u32, end: u32) -> ContigRegion {
        ContigRegion::new(begin, end).unwrap()
    }

    fn contig_map() -> ContigMap {
        vec![
            ("1".to_owned(), region(0, 1000)),
            ("1".to_owned(), region(5000, 6000)),
            ("X".to_owned(), region(100, 200)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_dispatches_per_key() {
        let map = contig_map();
        assert!(map.has_overlapped(&"1".to_owned(), region(500, 700)));
        assert!(!map.has_overlapped(&"X".to_owned(), region(500, 700)));
        assert_eq!(map.count_overlapped(&"1".to_owned(), region(900, 5500)), 2);
    }

    #[test]
    fn test_missing_key_is_empty_not_an_error() {
        let map = contig_map();
        assert!(!map.has_overlapped(&"Z".to_owned(), region(0, 1000)));
        assert_eq!(map.count_overlapped(&"Z".to_owned(), region(0, 1000)), 0);
        assert_eq!(
            map.leftmost_overlapped(&"Z".to_owned(), region(0, 1000))
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_leftmost_rightmost() {
        let map = contig_map();
        assert_eq!(
            map.leftmost_overlapped(&"1".to_owned(), region(500, 5500))
                .unwrap(),
            Some(&region(0, 1000))
        );
        assert_eq!(
            map.rightmost_overlapped(&"1".to_owned(), region(500, 5500))
                .unwrap(),
            Some(&region(5000, 6000))
        );
    }

    #[test]
    fn test_empty_map_queries_fail() {
        let map = ContigMap::new();
        let err = map
            .leftmost_overlapped(&"1".to_owned(), region(0, 10))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::EmptyMappableMap)
        ));
    }

    #[test]
    fn test_len_counts_all_keys() {
        let map = contig_map();
        assert_eq!(map.len(), 3);
        assert_eq!(map.num_keys(), 2);
        assert!(!map.is_empty());
    }
}
