use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{Notification, NotificationKind};

pub const HISTORY_LIMIT: usize = 100;
const CHANNEL_CAPACITY: usize = 256;

/// What subscribers receive on the live channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum NotificationEvent {
    Notification(Notification),
    NotificationsCleared,
}

/// Keeps the most recent notifications and broadcasts new ones to every
/// live subscriber. Subscribers unregister by dropping their receiver.
pub struct Notifier {
    history: Mutex<VecDeque<Notification>>,
    tx: broadcast::Sender<NotificationEvent>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            history: Mutex::new(VecDeque::with_capacity(HISTORY_LIMIT)),
            tx,
        }
    }

    pub fn notify(
        &self,
        kind: NotificationKind,
        title: &str,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
    ) -> Notification {
        let notification = Notification {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            title: title.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
            details,
        };

        if let Ok(mut history) = self.history.lock() {
            history.push_front(notification.clone());
            history.truncate(HISTORY_LIMIT);
        }

        tracing::info!(
            kind = ?notification.kind,
            title = %notification.title,
            message = %notification.message,
            "notification"
        );

        // No receivers is fine
        let _ = self
            .tx
            .send(NotificationEvent::Notification(notification.clone()));
        notification
    }

    pub fn info(&self, title: &str, message: impl Into<String>) -> Notification {
        self.notify(NotificationKind::Info, title, message, None)
    }

    pub fn success(&self, title: &str, message: impl Into<String>) -> Notification {
        self.notify(NotificationKind::Success, title, message, None)
    }

    pub fn warning(&self, title: &str, message: impl Into<String>) -> Notification {
        self.notify(NotificationKind::Warning, title, message, None)
    }

    pub fn error(&self, title: &str, message: impl Into<String>) -> Notification {
        self.notify(NotificationKind::Error, title, message, None)
    }

    /// Newest first.
    pub fn history(&self, limit: usize) -> Vec<Notification> {
        self.history
            .lock()
            .map(|h| h.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut history) = self.history.lock() {
            history.clear();
        }
        let _ = self.tx.send(NotificationEvent::NotificationsCleared);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
