//! Request descriptions handed to [`ApiClient`](super::ApiClient).

use serde::Serialize;

pub use reqwest::Method;

use crate::error::ApiError;

/// Request payload.
#[derive(Debug, Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    /// Structured value, JSON-encoded on the wire. `Value::Null` sends no body.
    Json(serde_json::Value),
    /// Wire-ready bytes sent unchanged.
    Raw {
        bytes: Vec<u8>,
        content_type: Option<String>,
    },
}

impl Body {
    /// Serialize any value into a JSON body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, ApiError> {
        Ok(Body::Json(serde_json::to_value(value)?))
    }
}

/// Which recovery behaviors wrap a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPolicy {
    /// On 401/403, refresh the session once and replay the request.
    pub refresh_on_auth_failure: bool,
    /// On transport failure, wait for connectivity and retry.
    pub retry_on_network_failure: bool,
}

impl RequestPolicy {
    /// Everything on. Used by [`ApiClient::request`](super::ApiClient::request).
    pub const fn standard() -> Self {
        Self {
            refresh_on_auth_failure: true,
            retry_on_network_failure: true,
        }
    }

    /// Multipart uploads: the form body is a one-shot stream, so neither
    /// replay path applies.
    pub const fn upload() -> Self {
        Self {
            refresh_on_auth_failure: false,
            retry_on_network_failure: false,
        }
    }

    /// No recovery at all; the first outcome is final.
    pub const fn none() -> Self {
        Self::upload()
    }
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

/// Everything about a request except its endpoint.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub method: Method,
    pub body: Body,
    /// Layered over the defaults; a header given here replaces the default
    /// of the same name.
    pub headers: Vec<(String, String)>,
    pub policy: RequestPolicy,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            method: Method::GET,
            body: Body::Empty,
            headers: Vec::new(),
            policy: RequestPolicy::standard(),
        }
    }
}

impl RequestConfig {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post() -> Self {
        Self::new(Method::POST)
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn json(self, value: serde_json::Value) -> Self {
        self.body(Body::Json(value))
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn policy(mut self, policy: RequestPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Join a base URL and an endpoint with exactly one slash between them.
///
/// Absolute `http(s)://` endpoints bypass the base URL.
pub fn join_url(base_url: &str, endpoint: &str) -> String {
    let endpoint = endpoint.trim();
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return endpoint.to_string();
    }
    let base = base_url.trim().trim_end_matches('/');
    let path = endpoint.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(join_url("http://h/", "/api/tools"), "http://h/api/tools");
        assert_eq!(join_url("  http://h///  ", "api/tools"), "http://h/api/tools");
        assert_eq!(join_url("http://h", "//api/tools"), "http://h/api/tools");
    }

    #[test]
    fn join_url_keeps_absolute_endpoints() {
        assert_eq!(
            join_url("http://h", "https://cdn.example/file"),
            "https://cdn.example/file"
        );
    }

    #[test]
    fn policies() {
        assert!(RequestPolicy::standard().refresh_on_auth_failure);
        assert!(!RequestPolicy::upload().retry_on_network_failure);
        assert_eq!(RequestConfig::default().policy, RequestPolicy::standard());
    }

    proptest! {
        #[test]
        fn joined_url_has_single_separator(
            base in "[a-z]{1,8}",
            trailing in 0usize..4,
            leading in 0usize..4,
            path in "[a-z]{1,8}(/[a-z]{1,8}){0,2}",
        ) {
            let base_url = format!("http://{base}{}", "/".repeat(trailing));
            let endpoint = format!("{}{path}", "/".repeat(leading));
            let joined = join_url(&base_url, &endpoint);
            prop_assert_eq!(joined, format!("http://{base}/{path}"));
        }
    }
}
