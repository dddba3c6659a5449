//! Process-wide plugin registry.
//!
//! The registry is a cache of the durable tier plus the host-registered
//! factories, never authoritative. Reinit events replace entries wholesale;
//! remove events evict them. Factories outlive both, since they are code the
//! host linked in, not state derived from a record.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::OnceCell;

use super::plugin::{PluginFactory, PluginRef};
use crate::error::PluginResult;
use crate::store::PluginStore;

/// How instances are produced for a key, fixed at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstantiationStrategy {
    /// One shared instance for the registry's lifetime.
    Singleton,
    /// A fresh instance per invocation, dropped after the call.
    PerCall,
}

/// In-memory view of one enabled plugin.
#[derive(Debug, Clone)]
pub struct RuntimePluginInfo {
    pub key_name: String,
    pub config: Value,
    pub strategy: InstantiationStrategy,
}

#[derive(Default)]
pub struct PluginRegistry {
    infos: DashMap<String, Arc<RuntimePluginInfo>>,
    factories: DashMap<String, Arc<dyn PluginFactory>>,
    singletons: DashMap<String, Arc<OnceCell<PluginRef>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the factory backing `key`. Replaces any previous factory.
    pub fn register_factory(&self, key: impl Into<String>, factory: Arc<dyn PluginFactory>) {
        self.factories.insert(key.into(), factory);
    }

    pub fn factory(&self, key: &str) -> Option<Arc<dyn PluginFactory>> {
        self.factories.get(key).map(|f| f.clone())
    }

    pub fn info(&self, key: &str) -> Option<Arc<RuntimePluginInfo>> {
        self.infos.get(key).map(|i| i.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.infos.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.infos.iter().map(|e| e.key().clone()).collect()
    }

    /// Live config for `key`, if loaded.
    pub fn config(&self, key: &str) -> Option<Value> {
        self.infos.get(key).map(|i| i.config.clone())
    }

    /// Construct-once holder for a singleton key.
    pub(crate) fn singleton_cell(&self, key: &str) -> Arc<OnceCell<PluginRef>> {
        self.singletons
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// Converge this process's entry for `key` with the durable record.
    ///
    /// Enabled record → (re)insert the info and reset the memoized singleton
    /// so the next resolution constructs against fresh metadata. Missing or
    /// disabled record → evict.
    pub async fn reload(&self, key: &str, store: &dyn PluginStore) -> PluginResult<()> {
        match store.find_by_key(key).await? {
            Some(record) if record.status.is_enabled() => {
                let strategy = if record.singleton() {
                    InstantiationStrategy::Singleton
                } else {
                    InstantiationStrategy::PerCall
                };
                self.infos.insert(
                    key.to_string(),
                    Arc::new(RuntimePluginInfo {
                        key_name: record.key_name.clone(),
                        config: record.config.clone(),
                        strategy,
                    }),
                );
                self.singletons
                    .insert(key.to_string(), Arc::new(OnceCell::new()));
                tracing::debug!(key = %key, ?strategy, "plugin registered");
                Ok(())
            }
            _ => {
                self.evict(key);
                Ok(())
            }
        }
    }

    /// Load every enabled record. Returns how many entries were registered.
    pub async fn bootstrap(&self, store: &dyn PluginStore) -> PluginResult<usize> {
        let records = store.list_enabled().await?;
        let mut registered = 0;
        for record in records {
            self.reload(&record.key_name, store).await?;
            registered += 1;
        }
        tracing::info!(count = registered, "plugin registry bootstrapped");
        Ok(registered)
    }

    /// Drop the entry and any memoized instance. The factory stays.
    pub fn evict(&self, key: &str) {
        self.infos.remove(key);
        self.singletons.remove(key);
        tracing::debug!(key = %key, "plugin evicted");
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.keys())
            .finish()
    }
}
