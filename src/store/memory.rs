//! In-memory store (testing and single-instance deployments).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::PluginStore;
use crate::error::{PluginError, PluginResult};
use crate::manifest::PluginData;
use crate::record::{NewPluginRecord, PluginId, PluginPatch, PluginRecord, PluginStatus};

#[derive(Debug, Default)]
struct State {
    next_id: PluginId,
    rows: HashMap<PluginId, PluginRecord>,
}

/// All mutations run under one write lock, so the conditional disable is a
/// single critical section.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn count(&self) -> usize {
        self.inner.read().await.rows.len()
    }

    /// Drop all records.
    pub async fn clear(&self) {
        self.inner.write().await.rows.clear();
    }
}

fn materialize(id: PluginId, record: NewPluginRecord) -> PluginRecord {
    let now = Utc::now();
    PluginRecord {
        id,
        key_name: record.key_name,
        name: record.name,
        version: record.version,
        author: record.author,
        description: record.description,
        hook: record.hook,
        status: record.status,
        readme: record.readme,
        logo: record.logo,
        content: record.content,
        ts_content: record.ts_content,
        config: record.config,
        plugin_json: record.plugin_json,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl PluginStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn insert(&self, record: NewPluginRecord) -> PluginResult<PluginId> {
        let mut state = self.inner.write().await;
        if state.rows.values().any(|r| r.key_name == record.key_name) {
            return Err(PluginError::Storage {
                message: format!("duplicate keyName '{}'", record.key_name),
            });
        }
        state.next_id += 1;
        let id = state.next_id;
        state.rows.insert(id, materialize(id, record));
        Ok(id)
    }

    async fn reinstall(&self, id: PluginId, record: NewPluginRecord) -> PluginResult<()> {
        let mut state = self.inner.write().await;
        let row = state.rows.get_mut(&id).ok_or_else(|| PluginError::Storage {
            message: format!("plugin record {} not found", id),
        })?;
        let created_at = row.created_at;
        let mut replacement = materialize(id, record);
        replacement.created_at = created_at;
        *row = replacement;
        Ok(())
    }

    async fn update(&self, id: PluginId, patch: PluginPatch) -> PluginResult<()> {
        let mut state = self.inner.write().await;
        let row = state.rows.get_mut(&id).ok_or_else(|| PluginError::Storage {
            message: format!("plugin record {} not found", id),
        })?;
        if let Some(status) = patch.status {
            row.status = status;
        }
        if let Some(config) = patch.config {
            row.config = config;
        }
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn find_by_key(&self, key: &str) -> PluginResult<Option<PluginRecord>> {
        let state = self.inner.read().await;
        Ok(state.rows.values().find(|r| r.key_name == key).cloned())
    }

    async fn find_by_id(&self, id: PluginId) -> PluginResult<Option<PluginRecord>> {
        let state = self.inner.read().await;
        Ok(state.rows.get(&id).cloned())
    }

    async fn find_by_ids(&self, ids: &[PluginId]) -> PluginResult<Vec<PluginRecord>> {
        let state = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.rows.get(id).cloned())
            .collect())
    }

    async fn list_enabled(&self) -> PluginResult<Vec<PluginRecord>> {
        let state = self.inner.read().await;
        Ok(state
            .rows
            .values()
            .filter(|r| r.status.is_enabled())
            .cloned()
            .collect())
    }

    async fn disable_conflicting(&self, hook: &str, keep: PluginId) -> PluginResult<u64> {
        let mut state = self.inner.write().await;
        let now = Utc::now();
        let mut changed = 0;
        for row in state.rows.values_mut() {
            if row.id != keep && row.hook.as_deref() == Some(hook) && row.status.is_enabled() {
                row.status = PluginStatus::Disabled;
                row.updated_at = now;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn is_enabled(&self, key: &str) -> PluginResult<bool> {
        let state = self.inner.read().await;
        Ok(state
            .rows
            .values()
            .any(|r| r.key_name == key && r.status.is_enabled()))
    }

    async fn payload(&self, key: &str) -> PluginResult<Option<PluginData>> {
        let state = self.inner.read().await;
        Ok(state
            .rows
            .values()
            .find(|r| r.key_name == key)
            .map(PluginRecord::data))
    }

    async fn delete(&self, id: PluginId) -> PluginResult<bool> {
        let mut state = self.inner.write().await;
        Ok(state.rows.remove(&id).is_some())
    }
}
