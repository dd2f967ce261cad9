//! Server-side notification inbox and push token registration.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::client::ApiClient;
use super::request::RequestConfig;
use crate::error::ApiError;

const NOTIFICATIONS_ENDPOINT: &str = "/api/notifications";
const PUSH_REGISTER_ENDPOINT: &str = "/api/push/register";

/// Error code the backend returns for ids that do not name a notification.
pub const INVALID_NOTIFICATION_ID: &str = "invalid_notification_id";

/// A notification stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerNotification {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "body")]
    pub message: Option<String>,
    #[serde(default, alias = "is_read", alias = "isRead")]
    pub read: bool,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!("unexpected id {other}"))),
    }
}

/// Pull the list out of a response that is either a bare array or an object
/// wrapping one under one of `keys`.
pub fn extract_list(body: Value, keys: &[&str]) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut obj) => keys
            .iter()
            .find_map(|k| match obj.remove(*k) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Whether `err` reports an unknown notification id.
pub fn is_invalid_notification_id(err: &ApiError) -> bool {
    err.code()
        .is_some_and(|c| c.eq_ignore_ascii_case(INVALID_NOTIFICATION_ID))
}

fn notification_path(id: &str, action: &str) -> String {
    format!(
        "{NOTIFICATIONS_ENDPOINT}/{}/{action}",
        urlencoding::encode(id)
    )
}

impl ApiClient {
    /// Fetch the inbox. Entries that do not parse are skipped.
    pub async fn list_notifications(&self) -> Result<Vec<ServerNotification>, ApiError> {
        let body = self
            .request(NOTIFICATIONS_ENDPOINT, RequestConfig::get())
            .await?;
        let notifications = extract_list(body, &["items", "data", "notifications"])
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(n) => Some(n),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping malformed notification");
                    None
                }
            })
            .collect();
        Ok(notifications)
    }

    pub async fn mark_notification_read(&self, id: &str) -> Result<(), ApiError> {
        self.request(&notification_path(id, "read"), RequestConfig::post())
            .await
            .map(drop)
    }

    pub async fn mark_notification_unread(&self, id: &str) -> Result<(), ApiError> {
        self.request(&notification_path(id, "unread"), RequestConfig::post())
            .await
            .map(drop)
    }

    pub async fn mark_all_notifications_read(&self) -> Result<(), ApiError> {
        self.request(
            &format!("{NOTIFICATIONS_ENDPOINT}/read-all"),
            RequestConfig::post(),
        )
        .await
        .map(drop)
    }

    pub async fn mark_all_notifications_unread(&self) -> Result<(), ApiError> {
        self.request(
            &format!("{NOTIFICATIONS_ENDPOINT}/unread-all"),
            RequestConfig::post(),
        )
        .await
        .map(drop)
    }

    /// Register this device's push token with the backend.
    pub async fn register_push_token(&self, token: &str) -> Result<(), ApiError> {
        let config = RequestConfig::post().json(json!({ "token": token }));
        self.request(PUSH_REGISTER_ENDPOINT, config).await.map(drop)
    }
}
