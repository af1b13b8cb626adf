//! In-memory cache of fetched terrain heights.
//!
//! Remote elevation services only answer asynchronously, but the session
//! needs a synchronous height estimate for the polygon corners. Prefetched
//! corner heights are recorded here, keyed by a fine
//! longitude/latitude grid, and served back as the synchronous estimate.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, PoisonError, RwLock},
};

use crate::ellipsoid::Cartographic;

/// Grid spacing of cache keys, in radians (about 6 mm on the ground).
const CELL_SIZE: f64 = 1e-9;

type CellKey = (i64, i64);

#[allow(clippy::cast_possible_truncation)]
fn cell(point: &Cartographic) -> CellKey {
    (
        (point.longitude / CELL_SIZE).round() as i64,
        (point.latitude / CELL_SIZE).round() as i64,
    )
}

/// A shared map from footprint to terrain height.
///
/// The cache has an optional maximum number of entries. When the limit is
/// exceeded, the oldest entries are evicted. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct HeightCache {
    data: Arc<RwLock<HeightCacheInner>>,
    max_entries: Option<usize>,
}

#[derive(Debug, Default)]
struct HeightCacheInner {
    entries: HashMap<CellKey, f64>,
    /// Insertion order for eviction.
    order: VecDeque<CellKey>,
}

impl HeightCache {
    /// Create a cache with no size limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache holding at most `max_entries` heights.
    #[must_use]
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            data: Arc::default(),
            max_entries: Some(max_entries),
        }
    }

    /// The cached height at `point`, if any.
    #[must_use]
    pub fn get(&self, point: &Cartographic) -> Option<f64> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        data.entries.get(&cell(point)).copied()
    }

    /// Record the height at `point`, replacing any previous value.
    pub fn insert(&self, point: &Cartographic, height: f64) {
        self.extend([(*point, height)]);
    }

    /// Record many heights at once.
    pub fn extend(&self, samples: impl IntoIterator<Item = (Cartographic, f64)>) {
        let mut cache = self.data.write().unwrap_or_else(PoisonError::into_inner);

        for (point, height) in samples {
            let key = cell(&point);
            if cache.entries.insert(key, height).is_none() {
                cache.order.push_back(key);
            }

            if let Some(max_entries) = self.max_entries {
                while cache.entries.len() > max_entries {
                    let Some(oldest) = cache.order.pop_front() else {
                        break;
                    };
                    cache.entries.remove(&oldest);
                }
            }
        }
    }

    /// Number of cached heights.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all cached heights.
    pub fn clear(&self) {
        let mut cache = self.data.write().unwrap_or_else(PoisonError::into_inner);
        cache.entries.clear();
        cache.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(lon: f64, lat: f64) -> Cartographic {
        Cartographic::from_degrees(lon, lat, 0.0)
    }

    #[test]
    fn test_insert_and_get() {
        let cache = HeightCache::new();
        assert!(cache.is_empty());

        cache.insert(&at(1.0, 2.0), 12.5);
        assert_eq!(cache.get(&at(1.0, 2.0)), Some(12.5));
        assert_eq!(cache.get(&at(1.0, 2.001)), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_height_is_ignored_in_key() {
        let cache = HeightCache::new();
        cache.insert(&Cartographic::from_degrees(5.0, 5.0, 900.0), 3.0);
        assert_eq!(cache.get(&at(5.0, 5.0)), Some(3.0));
    }

    #[test]
    fn test_replace_keeps_one_entry() {
        let cache = HeightCache::new();
        cache.insert(&at(1.0, 1.0), 1.0);
        cache.insert(&at(1.0, 1.0), 2.0);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&at(1.0, 1.0)), Some(2.0));
    }

    #[test]
    fn test_eviction() {
        let cache = HeightCache::with_max_entries(2);
        cache.extend([(at(0.0, 0.0), 1.0), (at(0.0, 1.0), 2.0), (at(0.0, 2.0), 3.0)]);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&at(0.0, 0.0)), None);
        assert_eq!(cache.get(&at(0.0, 2.0)), Some(3.0));
    }

    #[test]
    fn test_clones_share_storage() {
        let cache = HeightCache::new();
        let other = cache.clone();
        other.insert(&at(3.0, 3.0), 7.0);
        assert_eq!(cache.get(&at(3.0, 3.0)), Some(7.0));

        cache.clear();
        assert!(other.is_empty());
    }
}
