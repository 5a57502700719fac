// Response cache used by the gateway.
//
// `CacheStore` is a bounded key/value store with a TTL per entry. Expired
// entries are dropped lazily on read and by a periodic sweep. When the store
// is full, the oldest entries (by insertion time) are evicted in batches.
// `TwoTierCache` layers a short-lived ephemeral store over a larger shared
// store.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::debug;

use crate::config::CacheConfig;

// Stats for a single cache tier
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub items_count: usize,
    pub hit_count: usize,
    pub miss_count: usize,
    pub eviction_count: usize,
    pub expired_count: usize,
    pub insert_count: usize,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hit_count + self.miss_count;
        if lookups == 0 {
            0.0
        } else {
            self.hit_count as f64 / lookups as f64
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    ttl: Duration,
    // tie-breaker for entries created within the same clock tick
    seq: u64,
}

impl<V> CacheEntry<V> {
    fn is_alive(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) < self.ttl
    }

    fn remaining(&self, now: Instant) -> Duration {
        self.ttl
            .saturating_sub(now.saturating_duration_since(self.created_at))
    }

    fn age_key(&self) -> (Instant, u64) {
        (self.created_at, self.seq)
    }
}

struct Store<V> {
    config: CacheConfig,
    entries: HashMap<String, CacheEntry<V>>,
    // oldest first
    by_age: BTreeMap<(Instant, u64), String>,
    next_seq: u64,
    stats: CacheStats,
}

impl<V> Store<V> {
    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.by_age.remove(&entry.age_key());
        Some(entry)
    }

    fn evict_oldest(&mut self, count: usize) -> usize {
        let mut evicted = 0;
        while evicted < count {
            let Some((_, key)) = self.by_age.pop_first() else {
                break;
            };
            if self.entries.remove(&key).is_some() {
                evicted += 1;
            }
        }
        self.stats.eviction_count += evicted;
        evicted
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_alive(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove_entry(key);
        }
        self.stats.expired_count += expired.len();
        expired.len()
    }
}

pub struct CacheStore<V> {
    name: &'static str,
    inner: Mutex<Store<V>>,
}

impl<V: Clone> CacheStore<V> {
    pub fn new(name: &'static str, config: CacheConfig) -> Self {
        Self {
            name,
            inner: Mutex::new(Store {
                config,
                entries: HashMap::new(),
                by_age: BTreeMap::new(),
                next_seq: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.get_with_remaining(key).map(|(value, _)| value)
    }

    // Like `get`, but also reports how long the entry has left to live.
    pub fn get_with_remaining(&self, key: &str) -> Option<(V, Duration)> {
        let now = Instant::now();
        let mut store = self.inner.lock();

        let alive = match store.entries.get(key) {
            Some(entry) => entry.is_alive(now),
            None => {
                store.stats.miss_count += 1;
                return None;
            }
        };

        if !alive {
            store.remove_entry(key);
            store.stats.expired_count += 1;
            store.stats.miss_count += 1;
            return None;
        }

        store.stats.hit_count += 1;
        store
            .entries
            .get(key)
            .map(|entry| (entry.value.clone(), entry.remaining(now)))
    }

    // Store `value` under `key` with the tier's default TTL.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        let ttl = self.default_ttl();
        self.set(key, value, ttl);
    }

    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        if ttl.is_zero() {
            return;
        }

        let now = Instant::now();
        let mut store = self.inner.lock();

        if store.remove_entry(&key).is_none() {
            let max_entries = store.config.max_entries;
            if store.entries.len() >= max_entries {
                let expired = store.purge_expired(now);
                if store.entries.len() >= max_entries {
                    let batch = store.config.eviction_batch();
                    let evicted = store.evict_oldest(batch);
                    debug!(cache = self.name, expired, evicted, "cache at capacity");
                }
            }
        }

        let seq = store.next_seq;
        store.next_seq += 1;

        let entry = CacheEntry {
            value,
            created_at: now,
            ttl,
            seq,
        };
        store.by_age.insert(entry.age_key(), key.clone());
        store.entries.insert(key, entry);
        store.stats.insert_count += 1;
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.inner.lock().remove_entry(key).map(|entry| entry.value)
    }

    // Bulk invalidate every entry whose key starts with `prefix`, e.g. all
    // hotel offers regardless of search parameters.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut store = self.inner.lock();
        let keys: Vec<String> = store
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();

        for key in &keys {
            store.remove_entry(key);
        }
        keys.len()
    }

    pub fn purge_expired(&self) -> usize {
        self.inner.lock().purge_expired(Instant::now())
    }

    // Resize the cache, dropping the oldest entries when shrinking.
    pub fn resize(&self, new_max_entries: usize) -> usize {
        let mut store = self.inner.lock();
        store.config.max_entries = new_max_entries.max(1);

        let overflow = store
            .entries
            .len()
            .saturating_sub(store.config.max_entries);
        store.evict_oldest(overflow)
    }

    pub fn clear(&self) {
        let mut store = self.inner.lock();
        store.entries.clear();
        store.by_age.clear();
    }

    // Number of stored entries, including expired ones not yet purged.
    pub fn size(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().config.max_entries
    }

    pub fn default_ttl(&self) -> Duration {
        self.inner.lock().config.default_ttl()
    }

    pub fn stats(&self) -> CacheStats {
        let store = self.inner.lock();
        CacheStats {
            items_count: store.entries.len(),
            ..store.stats.clone()
        }
    }
}

impl<V: Clone + Send + 'static> CacheStore<V> {
    // Periodically purge expired entries. The task holds only a weak
    // reference and exits once the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let period = self
            .inner
            .lock()
            .config
            .cleanup_interval()
            .max(Duration::from_secs(1));
        let weak = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(store) = weak.upgrade() else {
                    break;
                };
                let purged = store.purge_expired();
                if purged > 0 {
                    debug!(cache = store.name, purged, "swept expired entries");
                }
            }
        })
    }
}

// Ephemeral tier in front of a shared tier. Reads go ephemeral -> shared,
// and a shared hit is copied back into the ephemeral tier.
pub struct TwoTierCache<V> {
    ephemeral: Arc<CacheStore<V>>,
    shared: Arc<CacheStore<V>>,
}

impl<V> Clone for TwoTierCache<V> {
    fn clone(&self) -> Self {
        Self {
            ephemeral: self.ephemeral.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl<V: Clone> TwoTierCache<V> {
    pub fn new(ephemeral: CacheStore<V>, shared: CacheStore<V>) -> Self {
        Self {
            ephemeral: Arc::new(ephemeral),
            shared: Arc::new(shared),
        }
    }

    pub fn from_config(ephemeral: CacheConfig, shared: CacheConfig) -> Self {
        Self::new(
            CacheStore::new("ephemeral", ephemeral),
            CacheStore::new("shared", shared),
        )
    }

    pub fn get(&self, key: &str) -> Option<V> {
        if let Some(value) = self.ephemeral.get(key) {
            debug!(key, tier = "ephemeral", "cache hit");
            return Some(value);
        }

        let (value, remaining) = self.shared.get_with_remaining(key)?;
        debug!(key, tier = "shared", "cache hit, back-filling ephemeral tier");

        // never outlive the shared copy
        let ttl = remaining.min(self.ephemeral.default_ttl());
        self.ephemeral.set(key, value.clone(), ttl);
        Some(value)
    }

    pub fn set(&self, key: &str, value: V, session_ttl: Duration, persistent_ttl: Duration) {
        self.ephemeral.set(key, value.clone(), session_ttl);
        self.shared.set(key, value, persistent_ttl);
    }

    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        self.ephemeral.invalidate_prefix(prefix) + self.shared.invalidate_prefix(prefix)
    }

    pub fn ephemeral(&self) -> &CacheStore<V> {
        &self.ephemeral
    }

    pub fn shared(&self) -> &CacheStore<V> {
        &self.shared
    }
}

impl<V: Clone + Send + 'static> TwoTierCache<V> {
    pub fn spawn_sweepers(&self) -> [JoinHandle<()>; 2] {
        [self.ephemeral.spawn_sweeper(), self.shared.spawn_sweeper()]
    }
}
