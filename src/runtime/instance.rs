//! Instance resolution and named-operation dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::plugin::{HostInfo, PluginContext, PluginRef, PluginServices, RequestContext};
use super::registry::{InstantiationStrategy, PluginRegistry};
use crate::error::{PluginError, PluginResult};
use crate::store::PluginStore;

/// Read-only consumer of the registry: resolves instances and dispatches
/// calls, never mutates registration state.
pub struct InstanceManager {
    registry: Arc<PluginRegistry>,
    store: Arc<dyn PluginStore>,
    /// Static allowlist of built-in/always-on hook types. Keys listed here
    /// pass `check_status` without a durable lookup.
    hooks: HashMap<String, Value>,
    services: PluginServices,
    host: HostInfo,
}

impl InstanceManager {
    pub fn new(
        registry: Arc<PluginRegistry>,
        store: Arc<dyn PluginStore>,
        hooks: HashMap<String, Value>,
        services: PluginServices,
    ) -> Self {
        Self {
            registry,
            store,
            hooks,
            services,
            host: HostInfo::default(),
        }
    }

    pub fn with_host(mut self, host: HostInfo) -> Self {
        self.host = host;
        self
    }

    /// Allowlisted keys are always on; everything else must have an enabled
    /// durable record.
    pub async fn check_status(&self, key: &str) -> PluginResult<bool> {
        if self.hooks.contains_key(key) {
            return Ok(true);
        }
        self.store.is_enabled(key).await
    }

    pub async fn get_instance(&self, key: &str) -> PluginResult<PluginRef> {
        self.get_instance_with(key, RequestContext::default()).await
    }

    /// Resolve an instance for `key`, constructing according to the
    /// registered strategy. Concurrent first calls for a singleton key
    /// converge on exactly one constructed instance.
    pub async fn get_instance_with(
        &self,
        key: &str,
        request: RequestContext,
    ) -> PluginResult<PluginRef> {
        if !self.check_status(key).await? {
            return Err(PluginError::not_found(key));
        }
        let info = self
            .registry
            .info(key)
            .ok_or_else(|| PluginError::not_found(key))?;
        let factory = self
            .registry
            .factory(key)
            .ok_or_else(|| PluginError::not_found(key))?;
        let ctx = PluginContext {
            info: info.clone(),
            request,
            host: self.host.clone(),
            services: self.services.clone(),
        };
        match info.strategy {
            InstantiationStrategy::Singleton => {
                let cell = self.registry.singleton_cell(key);
                let instance = cell
                    .get_or_try_init(|| async {
                        let instance = factory.create();
                        instance.init(ctx.clone()).await?;
                        Ok::<PluginRef, PluginError>(instance)
                    })
                    .await?;
                Ok(instance.clone())
            }
            InstantiationStrategy::PerCall => {
                let instance = factory.create();
                instance.init(ctx).await?;
                Ok(instance)
            }
        }
    }

    /// Resolve and dispatch in one step.
    pub async fn invoke(&self, key: &str, method: &str, args: Vec<Value>) -> PluginResult<Value> {
        let instance = self.get_instance(key).await?;
        instance.call(method, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::CodePayload;
    use crate::record::{NewPluginRecord, PluginStatus};
    use crate::runtime::{CommandTable, Plugin, PluginFactory};
    use crate::store::{CodeCache, DataStore, MemoryStore};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn new_record(key: &str, singleton: bool) -> NewPluginRecord {
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
            plugin_json: json!({"key": key, "singleton": singleton}),
        }
    }

    struct CountingPlugin {
        constructed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Plugin for CountingPlugin {
        async fn init(&self, _ctx: PluginContext) -> PluginResult<()> {
            // widen the race window for concurrent first callers
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(())
        }

        async fn call(&self, method: &str, _args: Vec<Value>) -> PluginResult<Value> {
            match method {
                "constructions" => Ok(json!(self.constructed.load(Ordering::SeqCst))),
                other => Err(PluginError::MethodNotFound {
                    key: "counting".into(),
                    method: other.into(),
                }),
            }
        }
    }

    struct CountingFactory {
        constructed: Arc<AtomicUsize>,
    }

    impl PluginFactory for CountingFactory {
        fn create(&self) -> PluginRef {
            self.constructed.fetch_add(1, Ordering::SeqCst);
            Arc::new(CountingPlugin {
                constructed: self.constructed.clone(),
            })
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        registry: Arc<PluginRegistry>,
        manager: InstanceManager,
        _dir: tempfile::TempDir,
    }

    fn fixture(hooks: HashMap<String, Value>) -> Fixture {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(PluginRegistry::new());
        let services = PluginServices {
            cache: Arc::new(crate::runtime::ServiceCache::new()),
            data: DataStore::new(store.clone(), Arc::new(CodeCache::new(dir.path()))),
        };
        let manager =
            InstanceManager::new(registry.clone(), store.clone(), hooks, services);
        Fixture {
            store,
            registry,
            manager,
            _dir: dir,
        }
    }

    fn echo_factory(key: &'static str) -> Arc<dyn PluginFactory> {
        Arc::new(move || -> PluginRef {
            let mut table = CommandTable::new(key);
            table.register("say", |args| async move {
                Ok(args.into_iter().next().unwrap_or(Value::Null))
            });
            Arc::new(table)
        })
    }

    #[tokio::test]
    async fn test_check_status_allowlist_bypasses_store() {
        let mut hooks = HashMap::new();
        hooks.insert("builtin-upload".to_string(), json!({}));
        let f = fixture(hooks);

        // no durable record for this key at all
        assert!(f.manager.check_status("builtin-upload").await.unwrap());
        assert!(!f.manager.check_status("unknown").await.unwrap());
    }

    #[tokio::test]
    async fn test_check_status_from_durable_record() {
        let f = fixture(HashMap::new());
        f.store.insert(new_record("pay", false)).await.unwrap();
        assert!(f.manager.check_status("pay").await.unwrap());
    }

    #[tokio::test]
    async fn test_invoke_disabled_plugin_is_not_found() {
        let f = fixture(HashMap::new());
        let mut record = new_record("pay", false);
        record.status = PluginStatus::Disabled;
        f.store.insert(record).await.unwrap();

        let err = f
            .manager
            .invoke("pay", "say", vec![json!("hi")])
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_invoke_dispatches_and_flags_unknown_methods() {
        let f = fixture(HashMap::new());
        f.store.insert(new_record("echo", false)).await.unwrap();
        f.registry.register_factory("echo", echo_factory("echo"));
        f.registry.reload("echo", f.store.as_ref()).await.unwrap();

        let result = f
            .manager
            .invoke("echo", "say", vec![json!("hello")])
            .await
            .unwrap();
        assert_eq!(result, json!("hello"));

        let err = f
            .manager
            .invoke("echo", "shout", Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::MethodNotFound { .. }));
    }

    #[tokio::test]
    async fn test_enabled_record_without_registry_entry_is_not_found() {
        let f = fixture(HashMap::new());
        f.store.insert(new_record("pay", false)).await.unwrap();
        // registry never reloaded: enabled in the store, absent locally

        let err = f.manager.get_instance("pay").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_per_call_constructs_fresh_instances() {
        let f = fixture(HashMap::new());
        f.store.insert(new_record("fresh", false)).await.unwrap();
        let constructed = Arc::new(AtomicUsize::new(0));
        f.registry.register_factory(
            "fresh",
            Arc::new(CountingFactory {
                constructed: constructed.clone(),
            }),
        );
        f.registry.reload("fresh", f.store.as_ref()).await.unwrap();

        f.manager.get_instance("fresh").await.unwrap();
        f.manager.get_instance("fresh").await.unwrap();
        assert_eq!(constructed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_singleton_resolution_constructs_once() {
        let f = fixture(HashMap::new());
        f.store.insert(new_record("shared", true)).await.unwrap();
        let constructed = Arc::new(AtomicUsize::new(0));
        f.registry.register_factory(
            "shared",
            Arc::new(CountingFactory {
                constructed: constructed.clone(),
            }),
        );
        f.registry.reload("shared", f.store.as_ref()).await.unwrap();

        let manager = Arc::new(f.manager);
        let a = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.get_instance("shared").await })
        };
        let b = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.get_instance("shared").await })
        };
        let first = a.await.unwrap().unwrap();
        let second = b.await.unwrap().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(constructed.load(Ordering::SeqCst), 1);
    }
}
