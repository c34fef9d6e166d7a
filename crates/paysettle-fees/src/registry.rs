//! Fee configuration registry
//!
//! A plain lookup table keyed by fee key. The last registration for a key
//! wins; there is no other validation.

use std::collections::HashMap;

use parking_lot::RwLock;

use paysettle_types::FeeConfiguration;

#[derive(Default)]
pub struct FeeRegistry {
    configs: RwLock<HashMap<String, FeeConfiguration>>,
}

impl FeeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of configurations
    pub fn from_configs(configs: impl IntoIterator<Item = FeeConfiguration>) -> Self {
        let registry = Self::new();
        for config in configs {
            registry.register(config);
        }
        registry
    }

    /// Register a configuration, replacing any previous one with the same key
    pub fn register(&self, config: FeeConfiguration) {
        self.configs.write().insert(config.key.clone(), config);
    }

    pub fn remove(&self, key: &str) -> Option<FeeConfiguration> {
        self.configs.write().remove(key)
    }

    pub fn get(&self, key: &str) -> Option<FeeConfiguration> {
        self.configs.read().get(key).cloned()
    }

    /// All configurations, ordered by key
    pub fn all(&self) -> Vec<FeeConfiguration> {
        let mut configs: Vec<FeeConfiguration> = self.configs.read().values().cloned().collect();
        configs.sort_by(|a, b| a.key.cmp(&b.key));
        configs
    }

    pub fn len(&self) -> usize {
        self.configs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.read().is_empty()
    }
}
