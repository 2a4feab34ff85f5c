//! Cache Epoch Registry and Plugin Cache (spec §4.5).

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock, Weak};

/// Anything a bumped epoch must clear.
pub trait CacheClear: Send + Sync {
    fn clear(&self);
}

/// Process-wide monotonic epoch counter, paired with the set of caches it
/// invalidates on bump.
pub struct EpochRegistry {
    epoch: AtomicU64,
    caches: Mutex<Vec<Weak<dyn CacheClear>>>,
}

impl EpochRegistry {
    pub fn new() -> Self {
        Self {
            epoch: AtomicU64::new(0),
            caches: Mutex::new(Vec::new()),
        }
    }

    pub fn current(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Idempotent in effect: registering the same cache handle twice just
    /// means it gets cleared twice on the next bump, which is harmless.
    pub fn register(&self, cache: Weak<dyn CacheClear>) {
        self.caches.lock().unwrap().push(cache);
    }

    /// Increments the epoch and clears every still-live registered cache
    /// before returning, so no reader observes a bumped epoch with a stale
    /// cache (invariant §8.3).
    pub fn bump(&self) -> u64 {
        let mut caches = self.caches.lock().unwrap();
        let next = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        caches.retain(|weak| {
            if let Some(cache) = weak.upgrade() {
                cache.clear();
                true
            } else {
                false
            }
        });
        next
    }
}

impl Default for EpochRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// `(plugin-type, platform, option-fingerprint, hub-state-version)`.
pub type PluginCacheKey = (String, String, String, u64);

struct Entry<T> {
    value: T,
    created_at_epoch: u64,
}

/// Bounded plugin cache keyed by the tuple above. Evicts the oldest entry
/// once `size > 3` (spec §4.5); cleared entirely on epoch bump.
pub struct PluginCache<T> {
    entries: RwLock<HashMap<PluginCacheKey, Entry<T>>>,
    insertion_order: Mutex<Vec<PluginCacheKey>>,
}

const MAX_ENTRIES: usize = 3;

impl<T: Clone + Send + Sync> PluginCache<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            insertion_order: Mutex::new(Vec::new()),
        }
    }

    pub fn get(&self, key: &PluginCacheKey) -> Option<T> {
        self.entries.read().unwrap().get(key).map(|e| e.value.clone())
    }

    pub fn insert(&self, key: PluginCacheKey, value: T, epoch: u64) {
        let mut entries = self.entries.write().unwrap();
        let mut order = self.insertion_order.lock().unwrap();
        if !entries.contains_key(&key) {
            order.push(key.clone());
        }
        entries.insert(key.clone(), Entry { value, created_at_epoch: epoch });
        while entries.len() > MAX_ENTRIES {
            if order.is_empty() {
                break;
            }
            let oldest = order.remove(0);
            entries.remove(&oldest);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + Send + Sync> Default for PluginCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync> CacheClear for PluginCache<T> {
    fn clear(&self) {
        self.entries.write().unwrap().clear();
        self.insertion_order.lock().unwrap().clear();
    }
}

/// A plugin descriptor registered at startup (spec §9): the Query API
/// looks plugins up by `type` rather than discovering them via a scan.
///
/// `compute` takes owned arguments (the Hub handle is a cheap `Arc` clone)
/// so the returned future can be `'static`.
pub struct PluginDescriptor {
    pub plugin_type: &'static str,
    pub requires: &'static [&'static str],
    pub compute: fn(crate::hub::Hub, String, HashMap<String, String>) -> futures_util::future::BoxFuture<'static, serde_json::Value>,
    /// Patches the volatile subset of a cached payload (current athlete,
    /// group, session status) with a live value on a cache hit — the cache
    /// key's epoch only changes on database/asset reloads, not on every
    /// `update`/`timer` event, so a hit can otherwise serve a stale athlete
    /// or session state (spec §4.5).
    pub refresh_volatile: fn(crate::hub::Hub, String, serde_json::Value) -> futures_util::future::BoxFuture<'static, serde_json::Value>,
}

pub struct PluginRegistry {
    plugins: Vec<PluginDescriptor>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self { plugins: Vec::new() }
    }

    pub fn register(&mut self, descriptor: PluginDescriptor) {
        self.plugins.push(descriptor);
    }

    pub fn find(&self, plugin_type: &str) -> Option<&PluginDescriptor> {
        self.plugins.iter().find(|p| p.plugin_type == plugin_type)
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a fingerprint string for the plugin cache key out of a stable
/// ordering of the option map (excludes `type`/`platform`, which are
/// already part of the key tuple).
pub fn option_fingerprint(options: &HashMap<String, String>) -> String {
    let mut pairs: Vec<_> = options
        .iter()
        .filter(|(k, _)| k.as_str() != "type" && k.as_str() != "platform")
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    pairs
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn bump_clears_every_registered_cache() {
        let registry = EpochRegistry::new();
        let cache: Arc<PluginCache<String>> = Arc::new(PluginCache::new());
        registry.register(Arc::downgrade(&cache) as Weak<dyn CacheClear>);
        cache.insert(("scoreboard".into(), "A".into(), String::new(), 0), "v".into(), 0);
        assert_eq!(cache.len(), 1);
        registry.bump();
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn epoch_increases_monotonically() {
        let registry = EpochRegistry::new();
        assert_eq!(registry.current(), 0);
        assert_eq!(registry.bump(), 1);
        assert_eq!(registry.bump(), 2);
    }

    #[test]
    fn dropped_cache_handles_are_pruned_from_registry() {
        let registry = EpochRegistry::new();
        {
            let cache: Arc<PluginCache<String>> = Arc::new(PluginCache::new());
            registry.register(Arc::downgrade(&cache) as Weak<dyn CacheClear>);
        }
        // The cache has been dropped; bump() must not panic.
        registry.bump();
    }

    #[test]
    fn plugin_cache_evicts_oldest_past_three_entries() {
        let cache: PluginCache<i32> = PluginCache::new();
        for i in 0..5 {
            cache.insert(("t".into(), "A".into(), i.to_string(), 0), i, 0);
        }
        assert_eq!(cache.len(), MAX_ENTRIES);
        assert!(cache.get(&("t".into(), "A".into(), "0".into(), 0)).is_none());
        assert!(cache.get(&("t".into(), "A".into(), "4".into(), 0)).is_some());
    }

    #[test]
    fn option_fingerprint_is_stable_regardless_of_insertion_order() {
        let mut a = HashMap::new();
        a.insert("b".to_owned(), "2".to_owned());
        a.insert("a".to_owned(), "1".to_owned());
        let mut b = HashMap::new();
        b.insert("a".to_owned(), "1".to_owned());
        b.insert("b".to_owned(), "2".to_owned());
        assert_eq!(option_fingerprint(&a), option_fingerprint(&b));
        assert_eq!(option_fingerprint(&a), "a=1&b=2");
    }
}
