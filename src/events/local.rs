//! Single-process fan-out over a broadcast channel.

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{EventBus, PluginEvent};
use crate::error::PluginResult;

pub struct LocalBus {
    tx: broadcast::Sender<PluginEvent>,
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EventBus for LocalBus {
    fn name(&self) -> &str {
        "local"
    }

    async fn emit(&self, event: PluginEvent, _cluster: bool) -> PluginResult<()> {
        // no subscribers yet is fine
        let _ = self.tx.send(event);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.tx.subscribe()
    }
}
