//! In-process plugin runtime: capability interface, registry, instances.

mod instance;
mod plugin;
mod registry;

pub use instance::InstanceManager;
pub use plugin::{
    CommandTable, HostInfo, Plugin, PluginContext, PluginFactory, PluginRef, PluginServices,
    RequestContext, ServiceCache,
};
pub use registry::{InstantiationStrategy, PluginRegistry, RuntimePluginInfo};
