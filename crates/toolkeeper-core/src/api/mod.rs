//! Backend access: the request engine plus the auth and inbox endpoints.
//!
//! Every call carries the session token when one is held, renews the session
//! once on 401/403 and waits out short connectivity gaps.

mod auth;
mod client;
mod inbox;
mod refresh;
mod request;
mod retry;

pub use client::{ApiClient, ApiClientBuilder};
pub use inbox::{extract_list, is_invalid_notification_id, ServerNotification, INVALID_NOTIFICATION_ID};
pub use request::{join_url, Body, Method, RequestConfig, RequestPolicy};
pub use retry::{AlwaysOnline, Connectivity, RetryPolicy, TcpProbe};
pub use reqwest::multipart;
