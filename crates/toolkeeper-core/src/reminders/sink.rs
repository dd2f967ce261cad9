//! Platform notification delivery.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SinkError;

/// What the user sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalNotification {
    /// Acknowledgement key of the reminder; doubles as the OS notification id.
    pub key: String,
    pub title: String,
    pub body: String,
}

/// Host-provided notification capability.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Ask for (or confirm) permission to post notifications.
    async fn request_permission(&self) -> bool;

    /// Whether [`schedule`](Self::schedule) delivers at a future instant.
    fn supports_scheduling(&self) -> bool;

    async fn show(&self, notification: &LocalNotification) -> Result<(), SinkError>;

    async fn schedule(
        &self,
        notification: &LocalNotification,
        at: DateTime<Utc>,
    ) -> Result<(), SinkError>;

    /// Drop every pending scheduled notification.
    async fn cancel_all_scheduled(&self) -> Result<(), SinkError>;
}
