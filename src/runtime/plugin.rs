//! Plugin capability interface and named-operation dispatch.
//!
//! Operations are dispatched through an explicit command table per plugin —
//! a string-keyed map of typed handlers — rather than any reflective lookup.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;

use super::registry::RuntimePluginInfo;
use crate::error::{PluginError, PluginResult};
use crate::store::DataStore;

pub type PluginRef = Arc<dyn Plugin>;

/// One installed extension's runtime behavior.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Called once per construction, before the instance serves calls.
    async fn init(&self, _ctx: PluginContext) -> PluginResult<()> {
        Ok(())
    }

    /// Dispatch a named operation.
    async fn call(&self, method: &str, args: Vec<Value>) -> PluginResult<Value>;
}

/// Produces instances for a key. Registered once by the host; how often
/// `create` runs is decided by the registry's instantiation strategy.
pub trait PluginFactory: Send + Sync {
    fn create(&self) -> PluginRef;
}

impl<F> PluginFactory for F
where
    F: Fn() -> PluginRef + Send + Sync,
{
    fn create(&self) -> PluginRef {
        self()
    }
}

type Handler = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, PluginResult<Value>> + Send + Sync>;

/// Operation-name → handler map.
#[derive(Clone)]
pub struct CommandTable {
    key: String,
    handlers: HashMap<String, Handler>,
}

impl CommandTable {
    /// `key` is only used to label dispatch errors.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            handlers: HashMap::new(),
        }
    }

    pub fn register<F, Fut>(&mut self, method: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = PluginResult<Value>> + Send + 'static,
    {
        self.handlers
            .insert(method.into(), Arc::new(move |args| Box::pin(handler(args))));
        self
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    pub fn methods(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    pub async fn dispatch(&self, method: &str, args: Vec<Value>) -> PluginResult<Value> {
        match self.handlers.get(method) {
            Some(handler) => handler(args).await,
            None => Err(PluginError::MethodNotFound {
                key: self.key.clone(),
                method: method.to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for dyn Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Plugin")
    }
}

/// A bare command table is a complete plugin.
#[async_trait]
impl Plugin for CommandTable {
    async fn call(&self, method: &str, args: Vec<Value>) -> PluginResult<Value> {
        self.dispatch(method, args).await
    }
}

/// Identity of the embedding application.
#[derive(Debug, Clone)]
pub struct HostInfo {
    pub name: String,
    pub version: String,
}

impl Default for HostInfo {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Caller-scoped data for one invocation.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub request_id: Option<String>,
    pub metadata: HashMap<String, Value>,
}

/// Process-wide key/value scratch cache exposed to plugin instances.
#[derive(Debug, Default)]
pub struct ServiceCache {
    entries: DashMap<String, Value>,
}

impl ServiceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|v| v.clone())
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.entries.remove(key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

/// Shared facilities handed to every constructed instance.
#[derive(Clone)]
pub struct PluginServices {
    pub cache: Arc<ServiceCache>,
    pub data: DataStore,
}

/// Per-construction context passed to [`Plugin::init`].
#[derive(Clone)]
pub struct PluginContext {
    pub info: Arc<RuntimePluginInfo>,
    pub request: RequestContext,
    pub host: HostInfo,
    pub services: PluginServices,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_table() -> CommandTable {
        let mut table = CommandTable::new("echo");
        table.register("say", |args| async move {
            Ok(args.into_iter().next().unwrap_or(Value::Null))
        });
        table.register("count", |args| async move { Ok(json!(args.len())) });
        table
    }

    #[tokio::test]
    async fn test_dispatch_known_method() {
        let table = echo_table();
        let result = table.dispatch("say", vec![json!("hello")]).await.unwrap();
        assert_eq!(result, json!("hello"));

        let result = table
            .dispatch("count", vec![json!(1), json!(2)])
            .await
            .unwrap();
        assert_eq!(result, json!(2));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_method_is_not_found() {
        let table = echo_table();
        let err = table.dispatch("refund", Vec::new()).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("refund"));
        assert!(err.to_string().contains("echo"));
    }

    #[tokio::test]
    async fn test_command_table_is_a_plugin() {
        let plugin: PluginRef = Arc::new(echo_table());
        let result = plugin.call("say", vec![json!(42)]).await.unwrap();
        assert_eq!(result, json!(42));
    }

    #[test]
    fn test_table_introspection() {
        let table = echo_table();
        assert!(table.contains("say"));
        assert!(!table.contains("refund"));
        assert_eq!(table.methods().len(), 2);
    }

    #[test]
    fn test_service_cache() {
        let cache = ServiceCache::new();
        assert!(cache.is_empty());

        cache.set("token", json!("abc"));
        assert_eq!(cache.get("token"), Some(json!("abc")));
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.remove("token"), Some(json!("abc")));
        assert!(cache.get("token").is_none());
    }

    #[test]
    fn test_factory_from_closure() {
        let factory: Arc<dyn PluginFactory> = Arc::new(|| -> PluginRef { Arc::new(echo_table()) });
        let a = factory.create();
        let b = factory.create();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
