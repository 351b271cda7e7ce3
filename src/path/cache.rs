//! A bounded, thread-safe cache of compiled paths keyed by the raw path
//! string.
//!
//! Readers and writers both take a short-lived lock; the cache is
//! read-dominant in practice (the same handful of paths get queried
//! repeatedly) so a `Mutex` around a small `HashMap` is simpler than a
//! lock-free structure and plenty fast for this workload. Eviction is FIFO
//! once the entry cap is hit — an approximation of LRU that avoids the
//! bookkeeping cost of tracking access recency on the hot path.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

use crate::limits::MAX_PATH_CACHE_ENTRIES;
use crate::path::segment::CompiledPath;

struct Cache {
    entries: HashMap<String, Arc<CompiledPath>>,
    order: VecDeque<String>,
}

impl Cache {
    fn new() -> Self {
        Cache {
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, key: &str) -> Option<Arc<CompiledPath>> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: String, value: Arc<CompiledPath>) {
        if self.entries.contains_key(&key) {
            return;
        }
        if self.entries.len() >= MAX_PATH_CACHE_ENTRIES {
            if let Some(oldest) = self.order.pop_front() {
                log::debug!("pathxml: path cache full at {MAX_PATH_CACHE_ENTRIES} entries, evicting {oldest:?}");
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, value);
    }
}

static CACHE: Lazy<Mutex<Cache>> = Lazy::new(|| Mutex::new(Cache::new()));

/// Returns a cached compiled path for `key` if present.
pub(crate) fn lookup(key: &str) -> Option<Arc<CompiledPath>> {
    let hit = CACHE.lock().unwrap().get(key);
    if hit.is_none() {
        log::trace!("pathxml: path cache miss for {key:?}");
    }
    hit
}

/// Publishes a freshly compiled path into the cache.
pub(crate) fn store(key: &str, value: Arc<CompiledPath>) {
    let mut cache = CACHE.lock().unwrap();
    cache.insert(key.to_string(), value);
}
