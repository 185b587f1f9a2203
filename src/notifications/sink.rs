use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Payload pushed to live subscribers of `user:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    pub message: String,
    pub title: String,
    pub link: Option<String>,
    pub time: String,
    pub image: Option<String>,
    pub fallback: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEvent {
    pub channel: String,
    pub payload: PushPayload,
}

#[must_use]
pub fn user_channel(user_id: uuid::Uuid) -> String {
    format!("user:{user_id}")
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, channel: &str, payload: &PushPayload) -> Result<()>;
}

/// In-process fan-out over a tokio broadcast channel.
///
/// Publishing with no subscribers is not an error; the event is dropped.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<PushEvent>,
}

impl BroadcastSink {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PushEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl NotificationSink for BroadcastSink {
    async fn publish(&self, channel: &str, payload: &PushPayload) -> Result<()> {
        let event = PushEvent {
            channel: channel.to_string(),
            payload: payload.clone(),
        };
        match self.sender.send(event) {
            Ok(receivers) => debug!(channel, receivers, "notification published"),
            Err(_) => debug!(channel, "notification published without subscribers"),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn publish(&self, channel: &str, payload: &PushPayload) -> Result<()> {
        tracing::info!(channel, title = %payload.title, "notification push stub");
        Ok(())
    }
}
