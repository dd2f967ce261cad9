//! Where reminder passes get their items from.

use async_trait::async_trait;

use super::item::{InventoryItem, ItemSource};
use crate::api::{extract_list, ApiClient, RequestConfig};
use crate::error::ApiError;
use crate::storage::RemindersConfig;

/// Wrapper keys seen around inventory lists.
const LIST_KEYS: &[&str] = &["items", "data", "results", "tools", "bhp"];

#[async_trait]
pub trait ReminderBackend: Send + Sync {
    async fn fetch_items(&self, source: ItemSource) -> Result<Vec<InventoryItem>, ApiError>;

    /// Reset the read state of server-side notifications.
    async fn mark_all_unread(&self) -> Result<(), ApiError>;
}

/// Fetches inventories over the API, trying alternate endpoints in order
/// while the earlier ones fail or come back empty.
#[derive(Clone)]
pub struct HttpReminderBackend {
    client: ApiClient,
    tool_endpoints: Vec<String>,
    bhp_endpoints: Vec<String>,
}

impl HttpReminderBackend {
    pub fn new(client: ApiClient, config: &RemindersConfig) -> Self {
        Self {
            client,
            tool_endpoints: config.tool_endpoints.clone(),
            bhp_endpoints: config.bhp_endpoints.clone(),
        }
    }

    fn endpoints(&self, source: ItemSource) -> &[String] {
        match source {
            ItemSource::Tools => &self.tool_endpoints,
            ItemSource::Bhp => &self.bhp_endpoints,
        }
    }
}

#[async_trait]
impl ReminderBackend for HttpReminderBackend {
    async fn fetch_items(&self, source: ItemSource) -> Result<Vec<InventoryItem>, ApiError> {
        let mut last_err = None;
        let mut answered = false;

        for endpoint in self.endpoints(source) {
            match self.client.request(endpoint, RequestConfig::get()).await {
                Ok(body) => {
                    answered = true;
                    let items: Vec<InventoryItem> = extract_list(body, LIST_KEYS)
                        .into_iter()
                        .filter_map(|v| InventoryItem::from_value(source, v))
                        .collect();
                    if !items.is_empty() {
                        tracing::debug!(%endpoint, count = items.len(), "fetched inventory");
                        return Ok(items);
                    }
                }
                Err(e) => {
                    tracing::debug!(%endpoint, error = %e, "inventory endpoint failed");
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) if !answered => Err(e),
            _ => Ok(Vec::new()),
        }
    }

    async fn mark_all_unread(&self) -> Result<(), ApiError> {
        self.client.mark_all_notifications_unread().await
    }
}
