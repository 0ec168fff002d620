//! Time-expiring route result cache shared across requests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::geo::Coordinate;
use crate::routing::{RouteOptions, RouteRequest, RouteResult, TravelMode};

/// Decimal places kept when keying coordinates (~1 m).
const KEY_PRECISION: usize = 5;

/// Cache key: mode plus both coordinates rounded to five decimals.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(origin: &Coordinate, destination: &Coordinate, mode: TravelMode) -> Self {
        Self(format!(
            "{:.p$},{:.p$}-{:.p$},{:.p$}-{mode}",
            origin.lat,
            origin.lng,
            destination.lat,
            destination.lng,
            p = KEY_PRECISION
        ))
    }

    /// Key for a request. Non-default options get their own entries.
    pub fn for_request(request: &RouteRequest) -> Self {
        let mut key = Self::new(&request.origin, &request.destination, request.mode);
        if request.options != RouteOptions::default() {
            let options = &request.options;
            key.0.push_str(&format!(
                "-s{}p{}a{}{}",
                u8::from(options.avoid_steps),
                u8::from(options.prefer_paved),
                options.alternatives,
                options.algorithm
            ));
        }
        key
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: RouteResult,
    inserted: Instant,
}

#[derive(Debug, Default)]
struct Store {
    entries: HashMap<CacheKey, CacheEntry>,
    /// Bumped by every [`RouteCache::clear`].
    generation: u64,
}

/// Thread-safe TTL cache of route results.
///
/// Expired entries are only removed by the sweep that runs when an insert
/// pushes the cache past its capacity; live entries are never evicted.
///
/// Clearing starts a new generation. Results computed before a clear can be
/// offered with [`RouteCache::insert_for`] and are dropped if the generation
/// has moved on.
#[derive(Debug)]
pub struct RouteCache {
    ttl: Duration,
    capacity: usize,
    store: Mutex<Store>,
}

impl RouteCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            store: Mutex::new(Store::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Live result for `key`, if any.
    pub fn get(&self, key: &CacheKey) -> Option<RouteResult> {
        self.get_at(key, Instant::now())
    }

    pub fn insert(&self, key: CacheKey, result: RouteResult) {
        let mut store = self.lock();
        self.insert_locked(&mut store, key, result, Instant::now());
    }

    /// Current generation; read it before computing a result.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Insert `result` only if no clear happened since `generation` was read.
    ///
    /// Returns whether the entry was stored.
    pub fn insert_for(&self, generation: u64, key: CacheKey, result: RouteResult) -> bool {
        let mut store = self.lock();
        if store.generation != generation {
            debug!(key = key.as_str(), "dropping route computed before cache clear");
            return false;
        }
        self.insert_locked(&mut store, key, result, Instant::now());
        true
    }

    fn get_at(&self, key: &CacheKey, now: Instant) -> Option<RouteResult> {
        let store = self.lock();
        let entry = store.entries.get(key)?;
        if now.saturating_duration_since(entry.inserted) < self.ttl {
            Some(entry.result.clone())
        } else {
            None
        }
    }

    #[cfg(test)]
    fn insert_at(&self, key: CacheKey, result: RouteResult, now: Instant) {
        let mut store = self.lock();
        self.insert_locked(&mut store, key, result, now);
    }

    fn insert_locked(&self, store: &mut Store, key: CacheKey, result: RouteResult, now: Instant) {
        let entries = &mut store.entries;
        entries.insert(
            key,
            CacheEntry {
                result,
                inserted: now,
            },
        );
        if entries.len() > self.capacity {
            let before = entries.len();
            let ttl = self.ttl;
            entries.retain(|_, entry| now.saturating_duration_since(entry.inserted) < ttl);
            debug!(
                removed = before - entries.len(),
                remaining = entries.len(),
                "swept expired route cache entries"
            );
        }
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Drop every entry and start a new generation.
    pub fn clear(&self) {
        let mut store = self.lock();
        store.entries.clear();
        store.generation += 1;
    }
}
