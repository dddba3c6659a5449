//! Redis pub/sub backend for clustered deployments.
//!
//! Publishing is fire-and-forget: the emitter learns about connection
//! failures but never waits for receivers. Every process (including the
//! publisher) receives cluster events through its own subscription, which is
//! what makes delivery at-least-once rather than exactly-once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::{EventBus, PluginEvent};
use crate::error::{PluginError, PluginResult};

#[derive(Clone, Debug)]
pub struct RedisBusConfig {
    /// Pub/sub channel shared by all worker processes.
    pub channel: String,
    /// Capacity of the local re-delivery channel.
    pub capacity: usize,
    /// Initial backoff before re-subscribing after a dropped connection.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
}

impl Default for RedisBusConfig {
    fn default() -> Self {
        Self {
            channel: "plugin:events".to_string(),
            capacity: 64,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
        }
    }
}

pub struct RedisBus {
    client: Arc<redis::Client>,
    config: RedisBusConfig,
    local: broadcast::Sender<PluginEvent>,
}

impl RedisBus {
    pub fn new(redis_url: &str) -> Result<Self, redis::RedisError> {
        Self::from_config(redis_url, RedisBusConfig::default())
    }

    pub fn from_config(
        redis_url: &str,
        config: RedisBusConfig,
    ) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        let (local, _) = broadcast::channel(config.capacity);
        Ok(Self {
            client: Arc::new(client),
            config,
            local,
        })
    }

    /// Spawn the subscriber task that re-delivers cluster messages to local
    /// subscribers. Reconnects with jittered exponential backoff.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let bus = Arc::clone(self);
        tokio::spawn(async move { bus.run_subscriber().await })
    }

    async fn run_subscriber(&self) {
        let mut backoff = self.config.initial_backoff;
        loop {
            match self.client.get_async_pubsub().await {
                Ok(mut pubsub) => match pubsub.subscribe(&self.config.channel).await {
                    Ok(()) => {
                        backoff = self.config.initial_backoff;
                        let mut messages = pubsub.on_message();
                        while let Some(msg) = messages.next().await {
                            let payload: String = match msg.get_payload() {
                                Ok(payload) => payload,
                                Err(e) => {
                                    tracing::warn!(error = %e, "unreadable cluster event payload");
                                    continue;
                                }
                            };
                            match serde_json::from_str::<PluginEvent>(&payload) {
                                Ok(event) => {
                                    let _ = self.local.send(event);
                                }
                                Err(e) => {
                                    tracing::warn!(
                                        error = %e,
                                        payload = %payload,
                                        "discarding malformed cluster event"
                                    );
                                }
                            }
                        }
                        tracing::warn!(
                            channel = %self.config.channel,
                            "cluster event subscription ended, reconnecting"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to subscribe to cluster events");
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, "failed to connect to cluster event channel");
                }
            }

            let jitter = 1.0 + (rand::random::<f64>() * 0.2 - 0.1);
            tokio::time::sleep(backoff.mul_f64(jitter)).await;
            backoff = (backoff * 2).min(self.config.max_backoff);
        }
    }
}

#[async_trait]
impl EventBus for RedisBus {
    fn name(&self) -> &str {
        "redis"
    }

    async fn emit(&self, event: PluginEvent, cluster: bool) -> PluginResult<()> {
        if !cluster {
            let _ = self.local.send(event);
            return Ok(());
        }
        let payload = serde_json::to_string(&event)?;
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| PluginError::Bus {
                message: format!("cluster event connection: {}", e),
            })?;
        redis::cmd("PUBLISH")
            .arg(&self.config.channel)
            .arg(payload)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| PluginError::Bus {
                message: e.to_string(),
            })?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.local.subscribe()
    }
}
