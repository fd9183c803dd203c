//! Outbound notifications
//!
//! Notifications are fire-and-forget. Implementations log their own delivery
//! failures; nothing here returns an error to the engine.

use std::fmt;

use tracing::{error, info};

/// Severity tag carried by every notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Error,
    Info,
}

impl NotificationLevel {
    /// Tag prefixed to the message text
    pub fn tag(&self) -> &'static str {
        match self {
            NotificationLevel::Success => "SUCCESS",
            NotificationLevel::Error => "ERROR",
            NotificationLevel::Info => "INFO",
        }
    }
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Render a notification as `TAG: message`
pub fn format_notification(level: NotificationLevel, message: &str) -> String {
    format!("{}: {}", level.tag(), message)
}

/// Sink for human-readable operational messages
pub trait Notifier: Send + Sync {
    /// Deliver one message; must not block on slow delivery
    fn notify(&self, level: NotificationLevel, message: &str);

    fn success(&self, message: &str) {
        self.notify(NotificationLevel::Success, message);
    }

    fn error(&self, message: &str) {
        self.notify(NotificationLevel::Error, message);
    }

    fn info(&self, message: &str) {
        self.notify(NotificationLevel::Info, message);
    }
}

/// Writes notifications to the tracing log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, level: NotificationLevel, message: &str) {
        let line = format_notification(level, message);
        match level {
            NotificationLevel::Error => error!(target: "companion::notify", "{}", line),
            _ => info!(target: "companion::notify", "{}", line),
        }
    }
}

/// Discards every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _level: NotificationLevel, _message: &str) {}
}
