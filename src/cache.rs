//! LRU Resolver Cache
//!
//! A byte-budgeted cache of resolved index nodes. The configured byte
//! budget is converted into an approximate entry count by dividing by an
//! estimated per-entry footprint; construction refuses budgets that admit
//! fewer than ten entries.
//!
//! Lookup contract:
//! - hit: promote to most-recently-used, deliver the cached value
//! - miss: invoke the loader exactly once for concurrent lookups of the
//!   same key (single-flight); insert on success; never insert on error
//! - eviction (budget overflow or explicit) fires the registered hook so
//!   downstream holders can drop resolved child lists promptly
//!
//! A loader error is delivered to every in-flight waiter, and the in-flight
//! registry is cleared so the next lookup starts a fresh load.

use crate::error::{Error, Result};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

/// Estimated bytes held alive by one resolved node.
const ESTIMATED_ENTRY_BYTES: u64 = 100 * 1024;

/// Smallest entry budget the cache will run with.
const MIN_ENTRIES: u64 = 10;

/// Default byte budget when none is configured.
pub const DEFAULT_MEMORY_BUDGET_BYTES: u64 = 1024 * 1024;

type SharedLoad<V> = Shared<BoxFuture<'static, std::result::Result<V, Arc<Error>>>>;

/// Called with each evicted entry.
pub type EvictHook<K, V> = Box<dyn Fn(&K, &V) + Send + Sync>;

pub struct ResolverCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    entries: Mutex<LruCache<K, V>>,
    in_flight: Mutex<HashMap<K, SharedLoad<V>>>,
    capacity: usize,
    on_evict: Option<EvictHook<K, V>>,
}

impl<K, V> ResolverCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Build a cache from a byte budget. Budgets below ten entries are a
    /// configuration error.
    pub fn new(memory_budget_bytes: u64) -> Result<Self> {
        Self::build(memory_budget_bytes, None)
    }

    /// Same as [`ResolverCache::new`] with an eviction hook.
    pub fn with_evict_hook(memory_budget_bytes: u64, hook: EvictHook<K, V>) -> Result<Self> {
        Self::build(memory_budget_bytes, Some(hook))
    }

    fn build(memory_budget_bytes: u64, on_evict: Option<EvictHook<K, V>>) -> Result<Self> {
        let entry_budget = memory_budget_bytes / ESTIMATED_ENTRY_BYTES;
        if entry_budget < MIN_ENTRIES {
            return Err(Error::invalid_configuration(format!(
                "cache memory budget of {memory_budget_bytes} bytes admits only {entry_budget} \
                 entries; at least {MIN_ENTRIES} are required"
            )));
        }
        Ok(ResolverCache {
            // Capacity enforced by hand so every eviction passes through the
            // hook.
            entries: Mutex::new(LruCache::unbounded()),
            in_flight: Mutex::new(HashMap::new()),
            capacity: entry_budget as usize,
            on_evict,
        })
    }

    /// Entry budget derived from the byte budget.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Look up `key`, loading on miss. Concurrent lookups of a missing key
    /// share a single loader invocation.
    pub async fn lookup<F, Fut>(&self, key: &K, loader: F) -> Result<V>
    where
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        if let Some(value) = self.entries.lock().get(key).cloned() {
            return Ok(value);
        }

        let (load, leader) = {
            let mut in_flight = self.in_flight.lock();
            // The value may have landed between the two locks.
            if let Some(value) = self.entries.lock().get(key).cloned() {
                return Ok(value);
            }
            match in_flight.get(key) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let fut = loader(key.clone())
                        .map(|result| result.map_err(Arc::new))
                        .boxed()
                        .shared();
                    in_flight.insert(key.clone(), fut.clone());
                    (fut, true)
                }
            }
        };

        let outcome = load.await;

        if leader {
            self.in_flight.lock().remove(key);
            if let Ok(value) = &outcome {
                self.insert(key.clone(), value.clone());
            }
        }

        outcome.map_err(|err| err.replicate())
    }

    /// Insert directly, evicting from the LRU end until within budget.
    pub fn insert(&self, key: K, value: V) {
        let mut evicted = Vec::new();
        {
            let mut entries = self.entries.lock();
            entries.put(key, value);
            while entries.len() > self.capacity {
                if let Some(old) = entries.pop_lru() {
                    evicted.push(old);
                } else {
                    break;
                }
            }
        }
        if let Some(hook) = &self.on_evict {
            for (k, v) in &evicted {
                hook(k, v);
            }
        }
    }

    /// Drop one entry, firing the evict hook if it was present.
    pub fn evict(&self, key: &K) {
        let removed = self.entries.lock().pop(key);
        if let (Some(hook), Some(value)) = (&self.on_evict, removed) {
            hook(key, &value);
        }
    }
}
