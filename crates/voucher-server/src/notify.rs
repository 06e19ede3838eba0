//! Post-commit notifications.
//!
//! Delivery is best-effort: a failure is logged and never reaches the caller
//! of the operation that triggered it.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn new(user_id: Uuid, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            user_id,
            title: title.into(),
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyReceipt {
    pub sent: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification transport error: {0}")]
    Transport(String),
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<NotifyReceipt, NotifyError>;
}

/// Writes notifications to the log.  There is no push transport.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<NotifyReceipt, NotifyError> {
        tracing::info!(
            user = %notification.user_id,
            title = %notification.title,
            body = %notification.body,
            "Notification"
        );
        Ok(NotifyReceipt {
            sent: false,
            reason: Some("push transport disabled".into()),
        })
    }
}

/// Hands notifications to a [`Notifier`] off the request path.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Deliver each notification once.  Runs on the Tokio blocking pool when
    /// a runtime is available, inline otherwise.
    pub fn dispatch(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            let notifier = Arc::clone(&self.notifier);
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn_blocking(move || deliver(notifier.as_ref(), &notification));
                }
                Err(_) => deliver(notifier.as_ref(), &notification),
            }
        }
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new(Arc::new(LogNotifier))
    }
}

fn deliver(notifier: &dyn Notifier, notification: &Notification) {
    match notifier.notify(notification) {
        Ok(receipt) if receipt.sent => {
            debug!(user = %notification.user_id, "Notification delivered");
        }
        Ok(receipt) => {
            debug!(
                user = %notification.user_id,
                reason = receipt.reason.as_deref().unwrap_or("unknown"),
                "Notification not sent"
            );
        }
        Err(e) => {
            error!(user = %notification.user_id, error = %e, "Notification failed");
        }
    }
}
