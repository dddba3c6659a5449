//! Applies bus events to this process's registry.
//!
//! This task and the lifecycle manager are the only writers of the registry.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::PluginEvent;
use crate::runtime::PluginRegistry;
use crate::store::PluginStore;
use crate::stubs::DeclarationSink;

/// Drain `rx` until the bus closes, converging the registry with the durable
/// tier on every event. Lagged receivers skip ahead: a missed Reinit is
/// compensated by the next one, since reload always reads current state.
pub fn spawn_listener(
    mut rx: broadcast::Receiver<PluginEvent>,
    registry: Arc<PluginRegistry>,
    store: Arc<dyn PluginStore>,
    stubs: Arc<dyn DeclarationSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(PluginEvent::Reinit { key_name }) => {
                    tracing::debug!(key = %key_name, "reinit event received");
                    if let Err(e) = registry.reload(&key_name, store.as_ref()).await {
                        tracing::warn!(
                            key = %key_name,
                            error = %e,
                            "failed to reload plugin after reinit event"
                        );
                    }
                }
                Ok(PluginEvent::Remove { key_name, is_hook }) => {
                    tracing::debug!(key = %key_name, is_hook, "remove event received");
                    registry.evict(&key_name);
                    if is_hook {
                        if let Err(e) = stubs.remove(&key_name) {
                            tracing::warn!(
                                key = %key_name,
                                error = %e,
                                "failed to remove declaration artifact"
                            );
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event listener lagged behind the bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
