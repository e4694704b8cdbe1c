// Copyright 2026 The Toolmux Project
// SPDX-License-Identifier: Apache-2.0

// Tool result cache
//
// Bounded TTL + LRU cache from (tool name, canonical arguments) to the last
// successful ToolResult. Entries live in a DashMap so lookups and updates of
// existing keys only lock their shard. Recency is a global monotonic tick
// stamped on every touch. Admitting a new key takes a single admission lock
// so that the size check and the eviction it triggers cannot interleave with
// another admission.
//
// Expiry is lazy: an entry older than the TTL is removed by the `get` that
// finds it. There is no background sweep.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::time::Instant;

use crate::tool::{Arguments, ToolResult};

struct CacheEntry {
    result: ToolResult,
    inserted_at: Instant,
    touched: AtomicU64,
}

/// Snapshot returned by `ResultCache::stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub ttl_secs: u64,
    pub hits: u64,
    pub misses: u64,
}

pub struct ResultCache {
    entries: DashMap<String, CacheEntry>,
    tick: AtomicU64,
    admission: Mutex<()>,
    max_size: AtomicUsize,
    ttl_ms: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    /// Create a cache holding at most `max_size` entries (minimum 1), each
    /// valid for `ttl` after insertion.
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            tick: AtomicU64::new(0),
            admission: Mutex::new(()),
            max_size: AtomicUsize::new(max_size.max(1)),
            ttl_ms: AtomicU64::new(ttl.as_millis() as u64),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a cached result. Expired entries are removed and reported as
    /// a miss.
    pub fn get(&self, tool: &str, arguments: &Arguments) -> Option<ToolResult> {
        let key = cache_key(tool, arguments);
        let ttl = self.ttl();

        let found = match self.entries.get(&key) {
            Some(entry) if entry.inserted_at.elapsed() <= ttl => {
                entry.touched.store(self.next_tick(), Ordering::Relaxed);
                Some(entry.result.clone())
            }
            Some(entry) => {
                drop(entry);
                self.entries
                    .remove_if(&key, |_, e| e.inserted_at.elapsed() > ttl);
                tracing::debug!(tool, "cache entry expired");
                None
            }
            None => None,
        };

        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Store a successful result. Failed results are ignored.
    pub fn set(&self, tool: &str, arguments: &Arguments, result: &ToolResult) {
        if !result.success {
            return;
        }
        let key = cache_key(tool, arguments);

        if let Some(mut entry) = self.entries.get_mut(&key) {
            *entry = self.fresh_entry(result);
            return;
        }

        let _admission = self.admission.lock().unwrap_or_else(PoisonError::into_inner);
        let max_size = self.max_size.load(Ordering::Relaxed);
        while self.entries.len() >= max_size && !self.entries.contains_key(&key) {
            if !self.evict_lru() {
                break;
            }
        }
        self.entries.insert(key, self.fresh_entry(result));
    }

    /// Remove every entry. Hit and miss counters are kept.
    pub fn clear(&self) {
        let _admission = self.admission.lock().unwrap_or_else(PoisonError::into_inner);
        self.entries.clear();
        tracing::info!("result cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            max_size: self.max_size.load(Ordering::Relaxed),
            ttl_secs: self.ttl().as_secs(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Change the TTL. Applies to existing entries on their next read.
    pub fn set_ttl(&self, ttl: Duration) {
        self.ttl_ms.store(ttl.as_millis() as u64, Ordering::Relaxed);
    }

    /// Change the bound, evicting least recently touched entries if the
    /// cache is now over it.
    pub fn set_max_size(&self, max_size: usize) {
        let max_size = max_size.max(1);
        let _admission = self.admission.lock().unwrap_or_else(PoisonError::into_inner);
        self.max_size.store(max_size, Ordering::Relaxed);
        while self.entries.len() > max_size {
            if !self.evict_lru() {
                break;
            }
        }
    }

    fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms.load(Ordering::Relaxed))
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn fresh_entry(&self, result: &ToolResult) -> CacheEntry {
        CacheEntry {
            result: result.clone(),
            inserted_at: Instant::now(),
            touched: AtomicU64::new(self.next_tick()),
        }
    }

    /// Remove the entry with the lowest touch tick. Caller holds the
    /// admission lock.
    fn evict_lru(&self) -> bool {
        let victim = self
            .entries
            .iter()
            .min_by_key(|e| e.value().touched.load(Ordering::Relaxed))
            .map(|e| e.key().clone());

        match victim {
            Some(key) => {
                self.entries.remove(&key);
                tracing::debug!(key = %key, "evicted least recently used cache entry");
                true
            }
            None => false,
        }
    }
}

/// SHA-256 over `tool:canonical_json`, hex encoded. Object keys are sorted at
/// every depth so argument order never changes the key.
pub fn cache_key(tool: &str, arguments: &Arguments) -> String {
    let canonical = canonicalize(&serde_json::Value::Object(arguments.clone()));
    let mut hasher = Sha256::new();
    hasher.update(tool.as_bytes());
    hasher.update(b":");
    hasher.update(canonical.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(canonicalize).collect())
        }
        other => other.clone(),
    }
}
