//! Reinit/remove notification fan-out.
//!
//! Events drive other processes' registries toward the durable tier, so
//! delivery is deliberately loose: at-least-once, unordered across event
//! kinds, no acknowledgment and no latency bound. Nothing blocks waiting for
//! a sibling process.

mod listener;
mod local;
#[cfg(feature = "redis-backend")]
mod redis;

pub use listener::spawn_listener;
pub use local::LocalBus;
#[cfg(feature = "redis-backend")]
pub use redis::{RedisBus, RedisBusConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::PluginResult;

/// Wire identifier for reinit events.
pub const PLUGIN_INIT: &str = "PLUGIN_INIT";
/// Wire identifier for remove events.
pub const PLUGIN_REMOVE: &str = "PLUGIN_REMOVE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum PluginEvent {
    /// Reload the named plugin's metadata from the durable tier.
    #[serde(rename = "PLUGIN_INIT", rename_all = "camelCase")]
    Reinit { key_name: String },
    /// Evict the named plugin; `is_hook` additionally drops its declaration
    /// artifact.
    #[serde(rename = "PLUGIN_REMOVE", rename_all = "camelCase")]
    Remove { key_name: String, is_hook: bool },
}

impl PluginEvent {
    pub fn reinit(key: impl Into<String>) -> Self {
        Self::Reinit {
            key_name: key.into(),
        }
    }

    pub fn remove(key: impl Into<String>, is_hook: bool) -> Self {
        Self::Remove {
            key_name: key.into(),
            is_hook,
        }
    }

    pub fn key_name(&self) -> &str {
        match self {
            Self::Reinit { key_name } | Self::Remove { key_name, .. } => key_name,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Reinit { .. } => PLUGIN_INIT,
            Self::Remove { .. } => PLUGIN_REMOVE,
        }
    }
}

/// Fan-out abstraction with two backends: in-process broadcast for
/// single-process deployments, external pub/sub for clusters.
#[async_trait]
pub trait EventBus: Send + Sync {
    fn name(&self) -> &str;

    /// Emit an event. `cluster = true` fans out to sibling processes,
    /// `false` stays within this process. Backends without an external
    /// channel treat both the same.
    async fn emit(&self, event: PluginEvent, cluster: bool) -> PluginResult<()>;

    /// Receiver for events delivered to this process, whatever their origin.
    fn subscribe(&self) -> broadcast::Receiver<PluginEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reinit_wire_format() {
        let event = PluginEvent::reinit("pay");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], PLUGIN_INIT);
        assert_eq!(json["keyName"], "pay");

        let parsed: PluginEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_remove_wire_format() {
        let event = PluginEvent::remove("upload-oss", true);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], PLUGIN_REMOVE);
        assert_eq!(json["keyName"], "upload-oss");
        assert_eq!(json["isHook"], true);

        let parsed: PluginEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_event_accessors() {
        assert_eq!(PluginEvent::reinit("a").key_name(), "a");
        assert_eq!(PluginEvent::remove("b", false).key_name(), "b");
        assert_eq!(PluginEvent::reinit("a").name(), PLUGIN_INIT);
        assert_eq!(PluginEvent::remove("b", false).name(), PLUGIN_REMOVE);
    }
}
