//! Core error types for toolkeeper-core.
//!
//! Only the request engine lets errors escape to its callers. Storage and
//! reminder code degrade to defaults, so most of these surface through
//! [`ApiError`] or the CLI.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for toolkeeper-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Request engine errors
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Persistent store errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Failure of a single logical API call.
#[derive(Error, Debug)]
pub enum ApiError {
    /// No HTTP response was obtained (DNS, refused connection, timeout).
    #[error("Network error: {message}")]
    Transport {
        message: String,
        timed_out: bool,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The server answered with a non-success status.
    #[error("{message}")]
    Http {
        status: u16,
        message: String,
        /// Machine-readable error code from the response body, if any.
        code: Option<String>,
        /// Full parsed body when it was a JSON object.
        payload: Option<serde_json::Value>,
    },

    /// The request could not be built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The response body did not match the expected shape.
    #[error("Unexpected response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Session state could not be read or written.
    #[error("Session storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Lower-cased fragments of transport messages that mean "the device is offline".
const OFFLINE_SIGNATURES: &[&str] = &[
    "network request failed",
    "network error",
    "failed to fetch",
    "offline",
    "internet connection",
    "connection refused",
    "dns error",
    "error sending request",
];

impl ApiError {
    pub(crate) fn transport(err: reqwest::Error) -> Self {
        ApiError::Transport {
            message: err.to_string(),
            timed_out: err.is_timeout(),
            source: Some(err),
        }
    }

    /// HTTP status, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Machine-readable code from an error body (`code`, `key` or `error`).
    pub fn code(&self) -> Option<&str> {
        match self {
            ApiError::Http { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Parsed JSON object returned with the error.
    pub fn payload(&self) -> Option<&serde_json::Value> {
        match self {
            ApiError::Http { payload, .. } => payload.as_ref(),
            _ => None,
        }
    }

    /// 401 or 403.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }

    /// Whether this failure qualifies for the wait-for-connectivity retry.
    pub fn is_network_failure(&self) -> bool {
        match self {
            ApiError::Transport { .. } => true,
            ApiError::Http { message, .. } => is_offline_message(message),
            _ => false,
        }
    }
}

pub(crate) fn is_offline_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    OFFLINE_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

/// Persistent store errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// SQLite failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// OS keyring failure
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// Data directory could not be prepared
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record could not be (de)serialized
    #[error("Malformed stored value for '{key}': {message}")]
    Malformed { key: String, message: String },

    /// A lock guarding the store was poisoned by a panic
    #[error("Store lock poisoned")]
    Poisoned,
}

/// Failure reported by a platform notification sink.
#[derive(Error, Debug)]
#[error("Notification sink error: {0}")]
pub struct SinkError(pub String);

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Data directory could not be determined or created
    #[error("Data directory unavailable: {0}")]
    DataDir(#[from] std::io::Error),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
