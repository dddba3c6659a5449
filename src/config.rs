//! Host configuration for the plugin subsystem.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginHostConfig {
    /// Directory for the cache tier, one JSON file per plugin key.
    pub data_dir: PathBuf,
    /// Directory for declaration artifacts.
    pub declarations_dir: PathBuf,
    /// Built-in/always-on hook types, keyed by plugin key with their
    /// default configuration. Keys listed here pass `check_status` without a
    /// durable lookup.
    #[serde(default)]
    pub hooks: HashMap<String, Value>,
    /// Emit lifecycle events cluster-wide instead of process-local.
    #[serde(default)]
    pub cluster: bool,
    /// Capacity of the in-process event channel.
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
}

fn default_bus_capacity() -> usize {
    64
}

impl Default for PluginHostConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/plugins"),
            declarations_dir: PathBuf::from("data/declarations"),
            hooks: HashMap::new(),
            cluster: false,
            bus_capacity: default_bus_capacity(),
        }
    }
}

impl PluginHostConfig {
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_declarations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.declarations_dir = dir.into();
        self
    }

    /// Register a built-in hook type.
    pub fn with_hook(mut self, key: impl Into<String>, config: Value) -> Self {
        self.hooks.insert(key.into(), config);
        self
    }

    pub fn with_cluster(mut self, cluster: bool) -> Self {
        self.cluster = cluster;
        self
    }

    pub fn with_bus_capacity(mut self, capacity: usize) -> Self {
        self.bus_capacity = capacity;
        self
    }
}
