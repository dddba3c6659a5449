//! Wires the subsystem together for one process.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::PluginHostConfig;
use crate::error::PluginResult;
use crate::events::{EventBus, LocalBus, spawn_listener};
use crate::lifecycle::LifecycleManager;
use crate::runtime::{
    InstanceManager, PluginFactory, PluginRegistry, PluginServices, ServiceCache,
};
use crate::store::{CodeCache, DataStore, MemoryStore, PluginStore};
use crate::stubs::{DeclarationSink, FsDeclarationSink};

/// One process's view of the plugin subsystem.
///
/// Owns the registry and the event listener; everything else is shared
/// handles. Dropping the host stops the listener.
pub struct PluginHost {
    config: PluginHostConfig,
    store: Arc<dyn PluginStore>,
    data: DataStore,
    registry: Arc<PluginRegistry>,
    bus: Arc<dyn EventBus>,
    lifecycle: LifecycleManager,
    instances: InstanceManager,
    listener: JoinHandle<()>,
}

impl PluginHost {
    pub fn builder() -> PluginHostBuilder {
        PluginHostBuilder::default()
    }

    pub fn config(&self) -> &PluginHostConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn PluginStore> {
        &self.store
    }

    pub fn data(&self) -> &DataStore {
        &self.data
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.bus
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn instances(&self) -> &InstanceManager {
        &self.instances
    }

    /// Register the factory backing a plugin key.
    pub fn register_factory(&self, key: impl Into<String>, factory: Arc<dyn PluginFactory>) {
        self.registry.register_factory(key, factory);
    }

    /// Load every enabled record into the registry. Call after factories are
    /// registered. Returns how many plugins were loaded.
    pub async fn start(&self) -> PluginResult<usize> {
        self.registry.bootstrap(self.store.as_ref()).await
    }
}

impl Drop for PluginHost {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[derive(Default)]
pub struct PluginHostBuilder {
    config: PluginHostConfig,
    store: Option<Arc<dyn PluginStore>>,
    bus: Option<Arc<dyn EventBus>>,
    stubs: Option<Arc<dyn DeclarationSink>>,
}

impl PluginHostBuilder {
    pub fn config(mut self, config: PluginHostConfig) -> Self {
        self.config = config;
        self
    }

    /// Durable tier override; defaults to [`MemoryStore`].
    pub fn store(mut self, store: Arc<dyn PluginStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Event bus override; defaults to [`LocalBus`].
    pub fn bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Declaration sink override; defaults to [`FsDeclarationSink`] under
    /// the configured declarations directory.
    pub fn stubs(mut self, stubs: Arc<dyn DeclarationSink>) -> Self {
        self.stubs = Some(stubs);
        self
    }

    /// Assemble the host and spawn its event listener. Requires a tokio
    /// runtime.
    pub fn build(self) -> PluginHost {
        let config = self.config;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let bus = self
            .bus
            .unwrap_or_else(|| Arc::new(LocalBus::new(config.bus_capacity)));
        let stubs = self
            .stubs
            .unwrap_or_else(|| Arc::new(FsDeclarationSink::new(&config.declarations_dir)));

        let cache = Arc::new(CodeCache::new(&config.data_dir));
        let data = DataStore::new(store.clone(), cache);
        let registry = Arc::new(PluginRegistry::new());
        let services = PluginServices {
            cache: Arc::new(ServiceCache::new()),
            data: data.clone(),
        };

        let lifecycle = LifecycleManager::new(
            store.clone(),
            data.clone(),
            bus.clone(),
            stubs.clone(),
            registry.clone(),
            config.cluster,
        );
        let instances = InstanceManager::new(
            registry.clone(),
            store.clone(),
            config.hooks.clone(),
            services,
        );
        let listener = spawn_listener(bus.subscribe(), registry.clone(), store.clone(), stubs);

        PluginHost {
            config,
            store,
            data,
            registry,
            bus,
            lifecycle,
            instances,
            listener,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::CodePayload;
    use crate::record::{NewPluginRecord, PluginStatus};
    use crate::runtime::{CommandTable, PluginRef};
    use serde_json::json;
    use tempfile::tempdir;

    fn test_config(dir: &std::path::Path) -> PluginHostConfig {
        PluginHostConfig::default()
            .with_data_dir(dir.join("data"))
            .with_declarations_dir(dir.join("declarations"))
    }

    fn new_record(key: &str) -> NewPluginRecord {
        NewPluginRecord {
            key_name: key.into(),
            name: key.into(),
            version: "1.0.0".into(),
            author: String::new(),
            description: String::new(),
            hook: None,
            status: PluginStatus::Enabled,
            readme: String::new(),
            logo: String::new(),
            content: CodePayload::comm("code"),
            ts_content: CodePayload::ts(""),
            config: json!({}),
            plugin_json: json!({"key": key}),
        }
    }

    #[tokio::test]
    async fn test_builder_defaults() {
        let dir = tempdir().unwrap();
        let host = PluginHost::builder().config(test_config(dir.path())).build();

        assert_eq!(host.store().name(), "memory");
        assert_eq!(host.bus().name(), "local");
        assert!(host.registry().is_empty());
    }

    #[tokio::test]
    async fn test_start_bootstraps_enabled_plugins() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.insert(new_record("pay")).await.unwrap();

        let host = PluginHost::builder()
            .config(test_config(dir.path()))
            .store(store)
            .build();
        host.register_factory(
            "pay",
            Arc::new(|| -> PluginRef { Arc::new(CommandTable::new("pay")) }),
        );

        let loaded = host.start().await.unwrap();
        assert_eq!(loaded, 1);
        assert!(host.registry().contains("pay"));
    }

    #[tokio::test]
    async fn test_listener_converges_registry_after_install() {
        let dir = tempdir().unwrap();
        let host = PluginHost::builder().config(test_config(dir.path())).build();
        host.store().insert(new_record("pay")).await.unwrap();

        host.lifecycle().reinit("pay").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(host.registry().contains("pay"));
    }
}
