//! Persisted set of reminder keys that were already delivered.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::storage::{keys, KeyValueStore};

/// Acknowledgement set stored as a JSON array of strings.
///
/// Reads and writes are whole-set and not atomic: two concurrent `add`
/// calls may lose one update. Storage failures are logged and otherwise
/// ignored.
#[derive(Clone)]
pub struct AckStore {
    store: Arc<dyn KeyValueStore>,
}

impl AckStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn load(&self) -> BTreeSet<String> {
        let raw = match self.store.get(keys::NOTIFICATION_ACKS).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return BTreeSet::new(),
            Err(e) => {
                tracing::warn!(error = %e, "could not read acknowledgements");
                return BTreeSet::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "stored acknowledgements are malformed");
            BTreeSet::new()
        })
    }

    pub async fn has(&self, key: &str) -> bool {
        self.load().await.contains(key)
    }

    pub async fn add(&self, key: &str) {
        self.add_many([key.to_string()]).await;
    }

    pub async fn add_many<I>(&self, new_keys: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut acks = self.load().await;
        let before = acks.len();
        acks.extend(new_keys);
        if acks.len() != before {
            self.write(&acks).await;
        }
    }

    pub async fn clear(&self) {
        if let Err(e) = self.store.remove(keys::NOTIFICATION_ACKS).await {
            tracing::warn!(error = %e, "could not clear acknowledgements");
        }
    }

    async fn write(&self, acks: &BTreeSet<String>) {
        let raw = match serde_json::to_string(acks) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "could not encode acknowledgements");
                return;
            }
        };
        if let Err(e) = self.store.set(keys::NOTIFICATION_ACKS, &raw).await {
            tracing::warn!(error = %e, "could not save acknowledgements");
        }
    }
}
