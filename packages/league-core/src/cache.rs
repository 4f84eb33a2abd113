//! Key/pattern cache for computed tables and team stats, write-invalidated.
//!
//! Backed by a [`dashmap::DashMap`] so reads never block on unrelated keys and
//! writes to the same key serialize through the map's own sharding, rather than
//! a crate-wide mutex.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;

/// The four key types in the cache's key grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKeyType {
    TableData,
    TeamStats,
    QueueStatus,
    Entry,
}

impl CacheKeyType {
    pub fn prefix(self) -> &'static str {
        match self {
            CacheKeyType::TableData => "table",
            CacheKeyType::TeamStats => "team_stats",
            CacheKeyType::QueueStatus => "queue_status",
            CacheKeyType::Entry => "entry",
        }
    }
}

struct CacheEntry {
    value: Value,
    inserted_at: Instant,
    ttl: Option<Duration>,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        match self.ttl {
            Some(ttl) => self.inserted_at.elapsed() >= ttl,
            None => false,
        }
    }
}

#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub total_keys: u64,
    pub hit_rate: f64,
}

/// Key/pattern cache. `*` in an invalidation pattern matches any run of
/// characters within a single `:`-delimited segment position.
pub struct Cache {
    entries: DashMap<String, CacheEntry>,
    default_ttl: Option<Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl Cache {
    pub fn new(default_ttl: Option<Duration>) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.value.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn set(&self, key: impl Into<String>, value: Value, ttl_seconds: Option<u64>) {
        let ttl = ttl_seconds
            .map(Duration::from_secs)
            .or(self.default_ttl);
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    pub fn del(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Invalidate every key matching `pattern`, where `*` matches any run of
    /// characters within the segment it occupies.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let matcher = segments(pattern);
        let to_remove: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| matches(&matcher, entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        let count = to_remove.len();
        for key in &to_remove {
            self.entries.remove(key);
        }
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    /// Drop every expired entry. Intended to run on a periodic interval owned
    /// by the Runtime.
    pub fn sweep_expired(&self) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.is_expired())
            .map(|entry| entry.key().clone())
            .collect();
        let count = expired.len();
        for key in &expired {
            self.entries.remove(key);
        }
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let hit_rate = if hits + misses == 0 {
            0.0
        } else {
            (hits as f64 / (hits + misses) as f64) * 100.0
        };
        CacheStats {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            total_keys: self.entries.len() as u64,
            hit_rate,
        }
    }
}

fn segments(pattern: &str) -> Vec<&str> {
    pattern.split(':').collect()
}

fn matches(pattern_segments: &[&str], key: &str) -> bool {
    let key_segments: Vec<&str> = key.split(':').collect();
    if pattern_segments.len() != key_segments.len() {
        return false;
    }
    pattern_segments
        .iter()
        .zip(key_segments.iter())
        .all(|(p, k)| *p == "*" || p == k)
}
