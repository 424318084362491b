//! User-facing notification fan-out.
//!
//! The sink is explicitly constructed and injected wherever notifications
//! originate; UI layers subscribe to the broadcast end and render toasts
//! however they like. Emitting with no subscribers is fine.

use tokio::sync::broadcast;
use tracing::debug;

use crate::api::ApiError;

/// Severity of a notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationLevel {
    /// Neutral information.
    Info,
    /// A completed action.
    Success,
    /// Something degraded but recoverable.
    Warning,
    /// An error the user should see.
    Danger,
}

impl NotificationLevel {
    /// Lowercase name, matching the original toast variants.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Danger => "danger",
        }
    }
}

/// One user-visible notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    /// Severity.
    pub level: NotificationLevel,
    /// Message text.
    pub message: String,
}

/// Broadcast sender for notifications.
#[derive(Clone, Debug)]
pub struct NotificationSink {
    tx: broadcast::Sender<Notification>,
}

impl Default for NotificationSink {
    fn default() -> Self {
        Self::new(64)
    }
}

impl NotificationSink {
    /// Create a sink with the given subscriber buffer capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Emit an info notification.
    pub fn info(&self, message: impl Into<String>) {
        self.emit(NotificationLevel::Info, message.into());
    }

    /// Emit a success notification.
    pub fn success(&self, message: impl Into<String>) {
        self.emit(NotificationLevel::Success, message.into());
    }

    /// Emit a warning notification.
    pub fn warning(&self, message: impl Into<String>) {
        self.emit(NotificationLevel::Warning, message.into());
    }

    /// Emit an error notification.
    pub fn error(&self, message: impl Into<String>) {
        self.emit(NotificationLevel::Danger, message.into());
    }

    /// Report a REST failure at the right severity with a readable message.
    pub fn http_error(&self, err: &ApiError) {
        self.emit(NotificationLevel::Danger, err.user_message());
    }

    fn emit(&self, level: NotificationLevel, message: String) {
        debug!(level = level.as_str(), message, "notification");
        let _ = self.tx.send(Notification { level, message });
    }
}
