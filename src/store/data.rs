//! Dual-tier payload access.

use std::sync::Arc;

use super::{CodeCache, PluginStore};
use crate::error::PluginResult;
use crate::manifest::PluginData;

/// Durable tier is the source of truth; the file cache is a read-through
/// mirror. Mutating callers must write the durable tier first and only then
/// touch the cache, never the reverse, so a crash in between can at worst
/// leave a stale cache file that the next read repopulates.
#[derive(Clone)]
pub struct DataStore {
    durable: Arc<dyn PluginStore>,
    cache: Arc<CodeCache>,
}

impl DataStore {
    pub fn new(durable: Arc<dyn PluginStore>, cache: Arc<CodeCache>) -> Self {
        Self { durable, cache }
    }

    pub fn cache(&self) -> &CodeCache {
        &self.cache
    }

    /// Cache hit, else durable lookup with lazy cache repopulation.
    ///
    /// Returns `None` (with a warning) when neither tier has the payload —
    /// the plugin needs a reinstall.
    pub async fn get_data(&self, key: &str) -> PluginResult<Option<PluginData>> {
        if let Some(data) = self.cache.load(key).await? {
            return Ok(Some(data));
        }
        match self.durable.payload(key).await? {
            Some(data) => {
                self.cache.save(&data, key).await?;
                Ok(Some(data))
            }
            None => {
                tracing::warn!(
                    key = %key,
                    path = %self.cache.path(key).display(),
                    "plugin data missing from both tiers, uninstall and reinstall the plugin"
                );
                Ok(None)
            }
        }
    }

    /// Refresh the cache tier. The caller has already committed the payload
    /// to the durable tier.
    pub async fn save_data(&self, data: &PluginData, key: &str) -> PluginResult<()> {
        self.cache.save(data, key).await
    }

    /// Drop the cached file; missing file is a success no-op.
    pub async fn delete_data(&self, key: &str) -> PluginResult<()> {
        self.cache.delete(key).await
    }
}
