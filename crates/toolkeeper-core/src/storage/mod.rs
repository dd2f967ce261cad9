mod config;
pub mod database;
pub mod credentials;

pub use config::{ApiConfig, Config, RemindersConfig, RetryConfig, SessionConfig};
pub use database::SqliteStore;
pub use credentials::KeyringStore;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::StorageError;

/// Keys under which the core persists its state.
pub mod keys {
    /// Bearer token of the current session.
    pub const TOKEN: &str = "auth_token";
    /// Set when the user logged out on purpose; suppresses silent refresh.
    pub const EXPLICIT_LOGOUT: &str = "auth_explicit_logout";
    /// JSON record of reminder toggles and times.
    pub const NOTIFICATION_SETTINGS: &str = "notification_settings";
    /// JSON array of acknowledged reminder keys.
    pub const NOTIFICATION_ACKS: &str = "notification_acks";
}

/// Async string-keyed storage shared by every core component.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

/// Returns `~/.config/toolkeeper[-dev]/` based on TOOLKEEPER_ENV.
///
/// Set TOOLKEEPER_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("TOOLKEEPER_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("toolkeeper-dev")
    } else {
        base_dir.join("toolkeeper")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get("k").await.unwrap().is_none());
        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        store.remove("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_remove_missing_is_ok() {
        let store = MemoryStore::new();
        assert!(store.remove("never-set").await.is_ok());
    }
}
