use std::{
    collections::HashMap,
    sync::RwLock,
    time::{Duration, Instant},
};

use crate::facts::ImageFacts;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// One cached facts record with its insertion time and time-to-live.
///
/// An entry is valid iff `now - inserted_at <= ttl`.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached facts record.
    pub facts: ImageFacts,

    /// When the entry was inserted.
    pub inserted_at: Instant,

    /// How long the entry stays valid.
    pub ttl: Duration,
}

/// A TTL-indexed in-memory map from reference string to [`ImageFacts`].
///
/// Keyed by the original reference string, not the canonical normalization, so cache behavior
/// matches what the caller actually asked for. Expired entries are removed lazily on access
/// and eagerly by [`FactsCache::cleanup`]. Not shared across engine instances.
#[derive(Debug)]
pub struct FactsCache {
    /// The cached entries.
    entries: RwLock<HashMap<String, CacheEntry>>,

    /// The time-to-live applied by [`FactsCache::insert`].
    default_ttl: Duration,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl CacheEntry {
    /// Reports whether the entry is still within its time-to-live.
    pub fn is_valid(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) <= self.ttl
    }
}

impl FactsCache {
    /// Creates an empty cache with the given default time-to-live.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Looks up a reference, removing the entry when it has expired.
    pub fn get(&self, reference: &str) -> Option<ImageFacts> {
        let mut entries = self.entries.write().expect("facts cache lock poisoned");

        match entries.get(reference) {
            Some(entry) if entry.is_valid(Instant::now()) => Some(entry.facts.clone()),
            Some(_) => {
                entries.remove(reference);
                None
            }
            None => None,
        }
    }

    /// Inserts a facts record with the cache's default time-to-live.
    pub fn insert(&self, reference: impl Into<String>, facts: ImageFacts) {
        self.insert_with_ttl(reference, facts, self.default_ttl);
    }

    /// Inserts a facts record with an explicit time-to-live.
    pub fn insert_with_ttl(
        &self,
        reference: impl Into<String>,
        facts: ImageFacts,
        ttl: Duration,
    ) {
        let entry = CacheEntry {
            facts,
            inserted_at: Instant::now(),
            ttl,
        };
        self.entries
            .write()
            .expect("facts cache lock poisoned")
            .insert(reference.into(), entry);
    }

    /// Drops every entry whose time-to-live has elapsed, returning how many were removed.
    pub fn cleanup(&self) -> usize {
        let mut entries = self.entries.write().expect("facts cache lock poisoned");
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_valid(now));
        before - entries.len()
    }

    /// Returns the number of live and expired entries currently held.
    pub fn len(&self) -> usize {
        self.entries.read().expect("facts cache lock poisoned").len()
    }

    /// Reports whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
