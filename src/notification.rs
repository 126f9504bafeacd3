//! User-facing notifications
//!
//! The form reports outcomes through a `Notifier`. `NotificationCenter` is the
//! context object the presentation layer holds and renders from.

use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

pub const SUBMIT_SUCCESS_MESSAGE: &str = "Expense submitted successfully!";
pub const SUBMIT_FAILURE_MESSAGE: &str = "Failed to submit expense. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
    pub open: bool,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Success,
            open: true,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Error,
            open: true,
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Holds the most recent notification until it is closed or replaced
pub struct NotificationCenter {
    current: Mutex<Option<Notification>>,
    auto_hide: Duration,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::with_auto_hide(Duration::from_millis(6000))
    }

    pub fn with_auto_hide(auto_hide: Duration) -> Self {
        Self {
            current: Mutex::new(None),
            auto_hide,
        }
    }

    /// How long the presentation layer keeps a notification visible
    pub fn auto_hide(&self) -> Duration {
        self.auto_hide
    }

    pub fn current(&self) -> Option<Notification> {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Keeps the message, flips `open` off
    pub fn close(&self) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(notification) = current.as_mut() {
            notification.open = false;
        }
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for NotificationCenter {
    fn notify(&self, notification: Notification) {
        info!(
            severity = ?notification.severity,
            message = %notification.message,
            "Notification raised"
        );
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(notification);
    }
}
