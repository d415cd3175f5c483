//! Typed events for the host's UI channel

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// An event the host UI renders while a tool runs
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum UiEvent {
    Status { description: String, done: bool },
    Notification {
        #[serde(rename = "type")]
        level: NotificationLevel,
        content: String,
    },
    Message { content: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl UiEvent {
    pub fn status(description: impl Into<String>, done: bool) -> Self {
        UiEvent::Status {
            description: description.into(),
            done,
        }
    }

    pub fn notification(level: NotificationLevel, content: impl Into<String>) -> Self {
        UiEvent::Notification {
            level,
            content: content.into(),
        }
    }
}

/// Sink for UI events
#[async_trait]
pub trait EventEmitter: Send + Sync {
    async fn emit(&self, event: UiEvent);
}

/// Forwards events into an mpsc channel; a closed receiver drops them
#[derive(Debug, Clone)]
pub struct ChannelEmitter {
    tx: mpsc::Sender<UiEvent>,
}

impl ChannelEmitter {
    pub fn new(tx: mpsc::Sender<UiEvent>) -> Self {
        Self { tx }
    }

    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<UiEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl EventEmitter for ChannelEmitter {
    async fn emit(&self, event: UiEvent) {
        if let Err(e) = self.tx.send(event).await {
            tracing::debug!(event = ?e.0, "UI channel closed, dropping event");
        }
    }
}
