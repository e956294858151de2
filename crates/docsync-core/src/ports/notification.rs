//! Notification service port (driven/secondary port)
//!
//! This module defines the interface for telling the user about events
//! that need their attention: conflicts, conflict copies left behind, and
//! passes that failed unexpectedly.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because notification delivery is adapter-specific.
//! - Notifications are fire-and-forget; a failed delivery never fails a pass.

use serde::{Deserialize, Serialize};

use crate::domain::events::ExceptionLevel;

// ============================================================================
// Notification struct and NotificationPriority enum
// ============================================================================

/// Priority level for a notification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    /// Low priority, may not be shown immediately
    Low,
    /// Normal priority, shown in the notification area
    #[default]
    Normal,
    /// High priority, may trigger a banner or sound
    High,
}

impl std::fmt::Display for NotificationPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotificationPriority::Low => "low",
            NotificationPriority::Normal => "normal",
            NotificationPriority::High => "high",
        };
        write!(f, "{}", s)
    }
}

impl From<ExceptionLevel> for NotificationPriority {
    fn from(level: ExceptionLevel) -> Self {
        match level {
            ExceptionLevel::Warning => NotificationPriority::Normal,
            ExceptionLevel::Error => NotificationPriority::High,
        }
    }
}

/// A notification to display to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Title of the notification (short, descriptive)
    pub title: String,
    /// Body text with details about the event
    pub body: String,
    /// Priority level affecting how the notification is displayed
    pub priority: NotificationPriority,
    /// Category for grouping/filtering: "sync", "conflict", "error"
    pub category: String,
}

impl Notification {
    /// Creates a new notification with `Normal` priority and no category
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            priority: NotificationPriority::Normal,
            category: String::new(),
        }
    }

    /// Sets the priority level
    pub fn with_priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the category
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Creates an error notification with High priority
    pub fn error(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(title, body)
            .with_priority(NotificationPriority::High)
            .with_category("error")
    }

    /// Creates a conflict notification with High priority
    pub fn conflict(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(title, body)
            .with_priority(NotificationPriority::High)
            .with_category("conflict")
    }

    /// A conflict was resolved in favour of the remote copy
    ///
    /// Names the local path that was edited, where the local edits were
    /// kept, and who last edited the remote copy.
    pub fn conflict_resolved(local_path: &str, kept_as: &str, remote_editor: &str) -> Self {
        Self::conflict(
            "File modified on both sides",
            format!(
                "{local_path} was also changed by {remote_editor}. \
                 Their version was downloaded; your version was saved as {kept_as}."
            ),
        )
    }

    /// A conflict copy is still present after several passes
    pub fn stale_conflict(path: &str, passes: u32) -> Self {
        Self::conflict(
            "Unresolved conflict copy",
            format!("{path} has been waiting for review for {passes} sync passes."),
        )
        .with_priority(NotificationPriority::Normal)
    }
}

// ============================================================================
// INotificationService trait
// ============================================================================

/// Port trait for user-facing notifications
#[async_trait::async_trait]
pub trait INotificationService: Send + Sync {
    /// Sends a notification to the user
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}
