//! Install / update / remove / delete orchestration.
//!
//! All mutations follow the same discipline: durable tier first, cache tier
//! second, events last. A record walks `Absent → Installed(Enabled) ⇄
//! Installed(Disabled) → Removed`; reinit/remove events are orthogonal and
//! only drive other processes' registries toward the durable state.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::archive::ArchiveBundle;
use crate::error::{PluginError, PluginResult};
use crate::events::{EventBus, PluginEvent};
use crate::record::{
    NewPluginRecord, PluginId, PluginPatch, PluginStatus, RESERVED_KEY, merge_config,
};
use crate::runtime::PluginRegistry;
use crate::store::{DataStore, PluginStore};
use crate::stubs::DeclarationSink;

/// `check` classification, in ascending order of cleanliness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CheckOutcome {
    /// Package incomplete or unparsable.
    Invalid = 0,
    /// Valid, but installing overwrites an existing non-hook plugin.
    Overwrite = 1,
    /// Valid, but an enabled plugin for the same hook already exists.
    /// Advisory only: installing will not disable the existing one.
    HookConflict = 2,
    Clean = 3,
}

impl CheckOutcome {
    pub fn code(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone)]
pub struct CheckReport {
    pub outcome: CheckOutcome,
    pub message: String,
}

impl CheckReport {
    fn new(outcome: CheckOutcome, message: impl Into<String>) -> Self {
        Self {
            outcome,
            message: message.into(),
        }
    }
}

/// What `install` did, or why it stopped.
#[derive(Debug)]
pub enum InstallOutcome {
    /// Check came back non-clean and `force` was not set; nothing mutated.
    Rejected(CheckReport),
    Installed { key_name: String, replaced: bool },
}

pub struct LifecycleManager {
    store: Arc<dyn PluginStore>,
    data: DataStore,
    bus: Arc<dyn EventBus>,
    stubs: Arc<dyn DeclarationSink>,
    registry: Arc<PluginRegistry>,
    /// Emit events cluster-wide rather than process-local.
    cluster: bool,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<dyn PluginStore>,
        data: DataStore,
        bus: Arc<dyn EventBus>,
        stubs: Arc<dyn DeclarationSink>,
        registry: Arc<PluginRegistry>,
        cluster: bool,
    ) -> Self {
        Self {
            store,
            data,
            bus,
            stubs,
            registry,
            cluster,
        }
    }

    /// Classify an install without side effects, so the caller can decide
    /// whether to demand an explicit force flag.
    pub async fn check(&self, archive: &Path) -> PluginResult<CheckReport> {
        let bundle = match ArchiveBundle::load(archive) {
            Ok(bundle) => bundle,
            Err(e) if e.is_validation() => {
                return Ok(CheckReport::new(CheckOutcome::Invalid, e.to_string()));
            }
            Err(e) => return Err(e),
        };
        let existing = self.store.find_by_key(&bundle.manifest.key).await?;
        Ok(match existing {
            Some(record) if record.hook.is_none() => CheckReport::new(
                CheckOutcome::Overwrite,
                "plugin already exists, continuing will overwrite it",
            ),
            Some(record) if record.status.is_enabled() => CheckReport::new(
                CheckOutcome::HookConflict,
                "an enabled plugin for the same hook already exists; \
                 only one plugin per hook can be enabled at a time",
            ),
            _ => CheckReport::new(CheckOutcome::Clean, "check passed"),
        })
    }

    /// Install or reinstall a package.
    ///
    /// Idempotent per key: reinstalling preserves the operator-chosen status
    /// and merges configuration (saved values win, manifest defaults fill
    /// gaps). The reserved key is rejected regardless of `force`.
    pub async fn install(&self, archive: &Path, force: bool) -> PluginResult<InstallOutcome> {
        let report = self.check(archive).await?;
        if report.outcome != CheckOutcome::Clean && !force {
            return Ok(InstallOutcome::Rejected(report));
        }

        let bundle = ArchiveBundle::load(archive)?;
        if bundle.manifest.key == RESERVED_KEY {
            return Err(PluginError::conflict(format!(
                "plugin key cannot be '{}', pick another key",
                RESERVED_KEY
            )));
        }

        let existing = self.store.find_by_key(&bundle.manifest.key).await?;
        let mut record = NewPluginRecord::from_bundle(&bundle)?;
        let key = record.key_name.clone();
        let replaced = existing.is_some();

        match existing {
            Some(old) => {
                record.status = old.status;
                record.config = merge_config(&bundle.manifest.config, &old.config);
                self.store.reinstall(old.id, record).await?;
            }
            None => {
                self.store.insert(record).await?;
            }
        }

        // durable tier is committed; now refresh the mirrors
        self.data.save_data(&bundle.data(), &key).await?;
        if let Some(ts) = &bundle.ts_content {
            self.stubs.write(&key, ts)?;
        }
        self.reinit(&key).await?;

        tracing::info!(key = %key, replaced, "plugin installed");
        Ok(InstallOutcome::Installed {
            key_name: key,
            replaced,
        })
    }

    /// Apply a status/config patch, enforcing hook exclusivity on enable,
    /// then raise Reinit or Remove to match the resulting status.
    pub async fn update(&self, id: PluginId, patch: PluginPatch) -> PluginResult<()> {
        let old = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| PluginError::Storage {
                message: format!("plugin record {} not found", id),
            })?;

        let enabling =
            patch.status == Some(PluginStatus::Enabled) && !old.status.is_enabled();
        if enabling {
            if let Some(hook) = &old.hook {
                let disabled = self.store.disable_conflicting(hook, id).await?;
                if disabled > 0 {
                    tracing::info!(
                        hook = %hook,
                        disabled,
                        key = %old.key_name,
                        "disabled competing hook plugins"
                    );
                }
            }
        }

        self.store.update(id, patch).await?;

        if let Some(current) = self.store.find_by_id(id).await? {
            if current.status.is_enabled() {
                self.reinit(&current.key_name).await?;
            } else {
                self.remove(&current.key_name, current.is_hook()).await?;
            }
        }
        Ok(())
    }

    /// Raise a reinit event for `key`.
    pub async fn reinit(&self, key: &str) -> PluginResult<()> {
        self.bus.emit(PluginEvent::reinit(key), self.cluster).await
    }

    /// Soft unregister: every process evicts its registry entry, the durable
    /// record stays untouched.
    pub async fn remove(&self, key: &str, is_hook: bool) -> PluginResult<()> {
        self.bus
            .emit(PluginEvent::remove(key, is_hook), self.cluster)
            .await?;
        if is_hook {
            self.stubs.remove(key)?;
        }
        Ok(())
    }

    /// Hard delete, bypassing any recycle semantics. Per record: raise
    /// Remove, drop the cached code file, then delete the durable row.
    pub async fn delete(&self, ids: &[PluginId]) -> PluginResult<usize> {
        let records = self.store.find_by_ids(ids).await?;
        let mut deleted = 0;
        for record in records {
            self.remove(&record.key_name, record.is_hook()).await?;
            self.data.delete_data(&record.key_name).await?;
            if self.store.delete(record.id).await? {
                deleted += 1;
            }
            tracing::info!(key = %record.key_name, "plugin deleted");
        }
        Ok(deleted)
    }

    /// Live configuration from this process's registry, if loaded.
    pub fn get_config(&self, key: &str) -> Option<Value> {
        self.registry.config(key)
    }
}
