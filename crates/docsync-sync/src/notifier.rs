//! Notification service that writes to the log
//!
//! The daemon has no desktop session to talk to, so user-facing
//! notifications end up as structured log lines.

use tracing::{info, warn};

use docsync_core::ports::{INotificationService, Notification, NotificationPriority};

#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl INotificationService for LogNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        match notification.priority {
            NotificationPriority::High => warn!(
                category = %notification.category,
                title = %notification.title,
                "{}",
                notification.body
            ),
            _ => info!(
                category = %notification.category,
                title = %notification.title,
                "{}",
                notification.body
            ),
        }
        Ok(())
    }
}
