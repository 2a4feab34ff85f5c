//! Shared application state: the Hub, Broker, Cache Epoch Registry, and
//! Plugin Registry, wired together once at startup and handed to axum as
//! shared `State<AppState>`.

use std::sync::Arc;

use serde_json::Value;

use tracker_protocol::Version;

use crate::broker::Broker;
use crate::cache::{option_fingerprint, CacheClear, EpochRegistry, PluginCache, PluginDescriptor, PluginRegistry};
use crate::config::Config;
use crate::hub::Hub;

#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub broker: Arc<Broker>,
    pub epoch: Arc<EpochRegistry>,
    pub plugins: Arc<PluginRegistry>,
    pub scoreboard_cache: Arc<PluginCache<Value>>,
    pub results_cache: Arc<PluginCache<Value>>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let broker = Arc::new(Broker::new());
        let epoch = Arc::new(EpochRegistry::new());
        let min_version = Version::parse(&config.min_version).unwrap_or(Version { major: 2, minor: 0, patch: 0 });
        let hub = Hub::new(broker.clone(), epoch.clone(), min_version);

        let scoreboard_cache: Arc<PluginCache<Value>> = Arc::new(PluginCache::new());
        let results_cache: Arc<PluginCache<Value>> = Arc::new(PluginCache::new());
        epoch.register(Arc::downgrade(&scoreboard_cache) as std::sync::Weak<dyn CacheClear>);
        epoch.register(Arc::downgrade(&results_cache) as std::sync::Weak<dyn CacheClear>);

        let mut plugins = PluginRegistry::new();
        plugins.register(PluginDescriptor {
            plugin_type: "scoreboard",
            requires: &["database"],
            compute: crate::query::compute_scoreboard,
            refresh_volatile: crate::query::refresh_scoreboard_volatile,
        });
        plugins.register(PluginDescriptor {
            plugin_type: "results",
            requires: &["database"],
            compute: crate::query::compute_results,
            refresh_volatile: crate::query::refresh_results_volatile,
        });

        Self {
            hub,
            broker,
            epoch,
            plugins: Arc::new(plugins),
            scoreboard_cache,
            results_cache,
            config: Arc::new(config),
        }
    }

    pub fn cache_for(&self, plugin_type: &str) -> Option<&PluginCache<Value>> {
        match plugin_type {
            "scoreboard" => Some(&self.scoreboard_cache),
            "results" => Some(&self.results_cache),
            _ => None,
        }
    }

    pub fn cache_key(&self, plugin_type: &str, platform: &str, options: &std::collections::HashMap<String, String>) -> crate::cache::PluginCacheKey {
        (
            plugin_type.to_owned(),
            platform.to_owned(),
            option_fingerprint(options),
            self.epoch.current(),
        )
    }
}
