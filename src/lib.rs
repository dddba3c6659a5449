//! # plugin-host
//!
//! Runtime plugin subsystem for long-running host applications: install
//! packaged code bundles without restarting the process, enforce mutual
//! exclusion between competing extensions of the same extension point
//! ("hook"), and propagate activation/removal events across a cluster of
//! worker processes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use plugin_host::{CommandTable, PluginHost, PluginHostConfig, PluginRef};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), plugin_host::PluginError> {
//!     let host = PluginHost::builder()
//!         .config(PluginHostConfig::default().with_data_dir("data/plugins"))
//!         .build();
//!
//!     host.register_factory("greeter", Arc::new(|| -> PluginRef {
//!         let mut table = CommandTable::new("greeter");
//!         table.register("hello", |_args| async move {
//!             Ok(serde_json::json!("hi"))
//!         });
//!         Arc::new(table)
//!     }));
//!     host.start().await?;
//!
//!     host.lifecycle()
//!         .install(std::path::Path::new("greeter.zip"), false)
//!         .await?;
//!     let reply = host.instances().invoke("greeter", "hello", vec![]).await?;
//!     println!("{reply}");
//!     Ok(())
//! }
//! ```
//!
//! The durable tier defaults to an in-memory store; enable the `postgres`
//! feature for a PostgreSQL backend and `redis-backend` for cluster-wide
//! event fan-out over Redis pub/sub.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod archive;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod lifecycle;
pub mod manifest;
pub mod record;
pub mod runtime;
pub mod store;
pub mod stubs;

// Re-exports for convenience
pub use archive::{ArchiveBundle, CONTENT_ENTRY, DECLARATION_ENTRY, MANIFEST_ENTRY};
pub use config::PluginHostConfig;
pub use error::{ArchiveSection, PluginError, PluginResult};
pub use events::{EventBus, LocalBus, PLUGIN_INIT, PLUGIN_REMOVE, PluginEvent, spawn_listener};
#[cfg(feature = "redis-backend")]
pub use events::{RedisBus, RedisBusConfig};
pub use host::{PluginHost, PluginHostBuilder};
pub use lifecycle::{CheckOutcome, CheckReport, InstallOutcome, LifecycleManager};
pub use manifest::{CodePayload, PayloadKind, PluginData, PluginManifest};
pub use record::{
    NewPluginRecord, PluginId, PluginPatch, PluginRecord, PluginStatus, RESERVED_KEY, merge_config,
};
pub use runtime::{
    CommandTable, HostInfo, InstanceManager, InstantiationStrategy, Plugin, PluginContext,
    PluginFactory, PluginRef, PluginRegistry, PluginServices, RequestContext, RuntimePluginInfo,
    ServiceCache,
};
#[cfg(feature = "postgres")]
pub use store::PostgresStore;
pub use store::{CodeCache, DataStore, MemoryStore, PluginStore};
pub use stubs::{DeclarationSink, FsDeclarationSink, NoopDeclarationSink};
