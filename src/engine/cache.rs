//! Bounded render-result cache keyed by schema id.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;

use super::result::RenderResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
}

#[derive(Debug, Default)]
struct Entries {
    results: HashMap<String, (u64, Arc<RenderResult>)>,
    /// Insertion order, oldest first.
    order: VecDeque<String>,
    generation: u64,
}

impl Entries {
    fn remove(&mut self, key: &str) -> bool {
        if self.results.remove(key).is_none() {
            return false;
        }
        self.order.retain(|k| k != key);
        true
    }
}

/// Insertion-ordered cache. When full, the oldest inserted entry goes first;
/// re-inserting a key replaces it and makes it the newest.
///
/// With a non-zero TTL every insertion schedules its own removal on the
/// current tokio runtime. A later insertion under the same key is not
/// affected by the earlier timer.
#[derive(Debug, Clone)]
pub struct RenderCache {
    entries: Arc<Mutex<Entries>>,
    max_size: usize,
    ttl: Duration,
}

fn lock(entries: &Mutex<Entries>) -> MutexGuard<'_, Entries> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RenderCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(Entries::default())),
            max_size,
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<RenderResult>> {
        lock(&self.entries)
            .results
            .get(key)
            .map(|(_, result)| result.clone())
    }

    /// Stores `result`, returning the key evicted to make room, if any.
    pub fn insert(&self, key: &str, result: Arc<RenderResult>) -> Option<String> {
        if self.max_size == 0 {
            return None;
        }

        let (generation, evicted) = {
            let mut entries = lock(&self.entries);
            entries.remove(key);
            let evicted = if entries.results.len() >= self.max_size {
                let oldest = entries.order.pop_front();
                if let Some(oldest) = &oldest {
                    entries.results.remove(oldest);
                    tracing::debug!("Render cache full, evicted `{}`", oldest);
                }
                oldest
            } else {
                None
            };
            entries.generation += 1;
            let generation = entries.generation;
            entries.results.insert(key.to_string(), (generation, result));
            entries.order.push_back(key.to_string());
            (generation, evicted)
        };

        if !self.ttl.is_zero() {
            self.schedule_expiry(key.to_string(), generation);
        }
        evicted
    }

    fn schedule_expiry(&self, key: String, generation: u64) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No tokio runtime, cache entry `{}` will not expire", key);
            return;
        };
        let entries: Weak<Mutex<Entries>> = Arc::downgrade(&self.entries);
        let ttl = self.ttl;
        runtime.spawn(async move {
            tokio::time::sleep(ttl).await;
            let Some(entries) = entries.upgrade() else {
                return;
            };
            let mut entries = lock(&entries);
            if matches!(entries.results.get(&key), Some((current, _)) if *current == generation) {
                entries.remove(&key);
                tracing::trace!("Render cache entry `{}` expired", key);
            }
        });
    }

    pub fn remove(&self, key: &str) -> bool {
        lock(&self.entries).remove(key)
    }

    pub fn clear(&self) {
        let mut entries = lock(&self.entries);
        entries.results.clear();
        entries.order.clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.len(),
            max_size: self.max_size,
        }
    }
}
