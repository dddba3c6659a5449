//! Dual-tier plugin storage.
//!
//! The durable tier ([`PluginStore`]) is the source of truth for records,
//! code payloads and configuration. The cache tier ([`CodeCache`]) mirrors
//! `{content, tsContent}` to one file per key. [`DataStore`] ties the two
//! together with a strict write-durable-then-refresh-cache ordering.

mod cache;
mod data;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use cache::CodeCache;
pub use data::DataStore;
pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

use async_trait::async_trait;

use crate::error::PluginResult;
use crate::manifest::PluginData;
use crate::record::{NewPluginRecord, PluginId, PluginPatch, PluginRecord};

/// Durable tier for plugin records.
///
/// `disable_conflicting` is the hook-exclusivity enforcement boundary: it
/// must be a single atomic conditional write against the backing store, never
/// a read-then-write pair, so that two processes racing to enable competing
/// hook plugins cannot both end up enabled.
#[async_trait]
pub trait PluginStore: Send + Sync {
    fn name(&self) -> &str;

    /// Insert a new record; `key_name` must be unique.
    async fn insert(&self, record: NewPluginRecord) -> PluginResult<PluginId>;

    /// Update-in-place for a reinstall: overwrites the row but keeps its id
    /// and creation time. Status and config are whatever the caller resolved.
    async fn reinstall(&self, id: PluginId, record: NewPluginRecord) -> PluginResult<()>;

    /// Apply a status/config patch.
    async fn update(&self, id: PluginId, patch: PluginPatch) -> PluginResult<()>;

    async fn find_by_key(&self, key: &str) -> PluginResult<Option<PluginRecord>>;

    async fn find_by_id(&self, id: PluginId) -> PluginResult<Option<PluginRecord>>;

    async fn find_by_ids(&self, ids: &[PluginId]) -> PluginResult<Vec<PluginRecord>>;

    /// Enabled records, for registry bootstrap.
    async fn list_enabled(&self) -> PluginResult<Vec<PluginRecord>>;

    /// Disable every *other* enabled record sharing `hook`, as one atomic
    /// conditional write. Returns the number of rows changed.
    async fn disable_conflicting(&self, hook: &str, keep: PluginId) -> PluginResult<u64>;

    /// True iff an enabled record exists for `key`.
    async fn is_enabled(&self, key: &str) -> PluginResult<bool>;

    /// Code payload straight from the durable tier.
    async fn payload(&self, key: &str) -> PluginResult<Option<PluginData>>;

    /// Hard delete. Returns true if a row was removed.
    async fn delete(&self, id: PluginId) -> PluginResult<bool>;
}
