//! Aggregation cache.
//!
//! Caches aggregate cell values by [`SegmentKey`] (base cube, measure,
//! sorted constraints). One [`AggregationManager`] is owned by each
//! session and shared by every query on it.
//!
//! # Design
//!
//! - One slot per key in a `DashMap`; a slot wraps a `OnceCell`, so at
//!   most one thread runs the loader for a key and the others block on the
//!   same cell and share its result
//! - No shard guard is held while a loader runs
//! - A failed load leaves the cell empty; the next request retries
//! - `flush` removes matching slots with `retain`; requests after it
//!   create fresh slots and reload
//! - Unbounded unless `cache.max_segments` is set, in which case the least
//!   recently used ready segments are evicted
//!
//! # Lifecycle
//!
//! ```text
//! Absent -> Loading -> Ready -> (flush / eviction) -> Absent
//! ```

mod hash;
pub mod key;
pub mod region;

pub use hash::{compute_hash, short_hash};
pub use key::{GroupSpec, MemberPath, Predicate, SegmentKey};
pub use region::CellRegion;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::CacheSettings;
use crate::connection::{ConnectionError, Value};
use crate::olap::member::HierarchyMembers;
use crate::olap::CellValue;
use crate::schema::Cube;

/// Errors that can occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Failed to load segment {fingerprint}: {source}")]
    Load {
        fingerprint: String,
        #[source]
        source: ConnectionError,
    },
}

pub type CacheResult<T> = Result<T, CacheError>;

/// A loaded aggregate: one value per group key (a single entry with an
/// empty key when the segment is not grouped).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segment {
    pub values: HashMap<Vec<Value>, CellValue>,
    /// Statement the segment was loaded with.
    pub sql: String,
}

impl Segment {
    pub fn new(sql: String) -> Self {
        Self {
            values: HashMap::new(),
            sql,
        }
    }

    pub fn insert(&mut self, key: Vec<Value>, value: CellValue) {
        self.values.insert(key, value);
    }

    /// Value for a group key; missing keys had no fact rows.
    pub fn value(&self, key: &[Value]) -> CellValue {
        self.values.get(key).cloned().unwrap_or(CellValue::Empty)
    }
}

struct Slot {
    cell: OnceCell<Arc<Segment>>,
    last_used: AtomicU64,
}

impl Slot {
    fn new() -> Self {
        Self {
            cell: OnceCell::new(),
            last_used: AtomicU64::new(0),
        }
    }
}

/// Cache statistics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub segments: usize,
    pub ready: usize,
    pub requests: u64,
    pub misses: u64,
    pub hit_ratio: Option<f64>,
}

/// Session-owned cache of aggregation segments.
pub struct AggregationManager {
    segments: DashMap<SegmentKey, Arc<Slot>>,
    requests: AtomicU64,
    misses: AtomicU64,
    counters_enabled: bool,
    max_segments: Option<usize>,
    clock: AtomicU64,
}

impl AggregationManager {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            segments: DashMap::new(),
            requests: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            counters_enabled: settings.counters_enabled,
            max_segments: settings.segment_limit(),
            clock: AtomicU64::new(0),
        }
    }

    /// The segment for `key`, running `loader` if it is not cached.
    ///
    /// Concurrent callers with the same key wait for a single loader.
    pub fn get_or_load<F>(&self, key: &SegmentKey, loader: F) -> CacheResult<Arc<Segment>>
    where
        F: FnOnce() -> Result<Segment, ConnectionError>,
    {
        if self.counters_enabled {
            self.requests.fetch_add(1, Ordering::Relaxed);
        }

        // Clone the slot out so the shard lock is released before loading
        let slot = self
            .segments
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Slot::new()))
            .clone();
        slot.last_used
            .store(self.clock.fetch_add(1, Ordering::Relaxed), Ordering::Relaxed);

        let mut loaded = false;
        let segment = slot
            .cell
            .get_or_try_init(|| {
                loaded = true;
                if self.counters_enabled {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                }
                let fingerprint = key.fingerprint();
                debug!(
                    segment = %short_hash(key),
                    cube = key.cube.0,
                    measure = %key.measure,
                    "loading segment"
                );
                loader()
                    .map(Arc::new)
                    .map_err(|source| CacheError::Load {
                        fingerprint,
                        source,
                    })
            })?
            .clone();

        if loaded {
            self.evict(key);
        }
        Ok(segment)
    }

    /// Drop least recently used ready segments beyond the limit.
    fn evict(&self, keep: &SegmentKey) {
        let Some(limit) = self.max_segments else {
            return;
        };
        while self.segments.len() > limit {
            let victim = self
                .segments
                .iter()
                .filter(|e| e.key() != keep && e.value().cell.get().is_some())
                .min_by_key(|e| e.value().last_used.load(Ordering::Relaxed))
                .map(|e| e.key().clone());
            let Some(victim) = victim else {
                break;
            };
            warn!(
                segment = %short_hash(&victim),
                limit,
                "evicting least recently used segment"
            );
            self.segments
                .remove_if(&victim, |_, slot| slot.cell.get().is_some());
        }
    }

    /// Remove every segment intersecting `region`. Returns how many were
    /// removed.
    pub fn flush(&self, region: &CellRegion) -> usize {
        let before = self.segments.len();
        self.segments.retain(|key, _| !region.intersects(key));
        let removed = before.saturating_sub(self.segments.len());
        info!(removed, remaining = self.segments.len(), "flushed cache region");
        removed
    }

    pub fn reset_counters(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// `(requests - misses) / requests`; `None` before the first request.
    pub fn hit_ratio(&self) -> Option<f64> {
        let requests = self.request_count();
        let misses = self.miss_count();
        (requests > 0).then(|| requests.saturating_sub(misses) as f64 / requests as f64)
    }

    /// All measures of `cube`. For a virtual cube, the measures of its base
    /// cubes that it exposes.
    pub fn create_measures_region(&self, cube: &Cube) -> CellRegion {
        CellRegion::Measures(
            cube.measures
                .iter()
                .map(|m| (m.base_cube, m.name.clone()))
                .collect(),
        )
    }

    /// Cells at or below one member.
    pub fn create_member_region(&self, members: &HierarchyMembers, index: usize) -> CellRegion {
        CellRegion::Member {
            hierarchy: members.hierarchy,
            path: members.key_path(index),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            segments: self.segments.len(),
            ready: self
                .segments
                .iter()
                .filter(|e| e.value().cell.get().is_some())
                .count(),
            requests: self.request_count(),
            misses: self.miss_count(),
            hit_ratio: self.hit_ratio(),
        }
    }
}
