//! # Toolkeeper Core Library
//!
//! This library provides the client core for the tool and BHP inventory
//! backend. Every host (the `toolkeeper` CLI, a mobile shell, a desktop UI)
//! drives the same session, request and reminder logic through it.
//!
//! ## Architecture
//!
//! - **Storage**: async key-value stores (SQLite, OS keyring, memory) and
//!   TOML-based configuration
//! - **Session**: the bearer token and its change listeners
//! - **API**: request engine with session refresh and offline retry, plus
//!   the auth, inbox and push endpoints
//! - **Reminders**: turns inspection due dates into local notifications
//!
//! ## Key Components
//!
//! - [`ApiClient`]: HTTP request engine
//! - [`TokenManager`]: Session token lifecycle
//! - [`ReminderScheduler`]: Reminder passes
//! - [`Config`]: Application configuration management

pub mod api;
pub mod error;
pub mod events;
pub mod reminders;
pub mod session;
pub mod storage;

pub use api::{ApiClient, Body, RequestConfig, RequestPolicy};
pub use error::{ApiError, ConfigError, CoreError, SinkError, StorageError};
pub use events::{ApiEvent, BroadcastSink, EventSink, NoopSink, TracingSink};
pub use reminders::{NotificationSettings, PassReport, ReminderScheduler};
pub use session::{Subscription, TokenManager};
pub use storage::{Config, KeyValueStore, KeyringStore, MemoryStore, SqliteStore};
