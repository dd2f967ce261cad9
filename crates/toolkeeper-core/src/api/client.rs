//! HTTP request engine.
//!
//! One [`ApiClient`] per process, built once and cloned into every consumer.
//! A call goes through three layers, innermost first:
//!
//! 1. a single attempt (URL/header/body construction, telemetry, status mapping)
//! 2. one refresh-and-replay on 401/403
//! 3. wait-for-connectivity retries on transport failure

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::Form;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::refresh::RefreshGate;
use super::request::{join_url, Body, Method, RequestConfig};
use super::retry::{AlwaysOnline, Connectivity, RetryPolicy};
use crate::error::ApiError;
use crate::events::{ApiEvent, EventSink, TracingSink};
use crate::session::TokenManager;
use crate::storage::{keys, Config, KeyValueStore, MemoryStore};

/// Response fields that may carry a bearer token.
const TOKEN_FIELDS: &[&str] = &["token", "accessToken", "access_token"];

const SESSION_EXPIRED_MESSAGE: &str = "Session expired, please log in again";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

struct ClientInner {
    http: Client,
    base_url: String,
    refresh_endpoint: String,
    session: TokenManager,
    store: Arc<dyn KeyValueStore>,
    events: Arc<dyn EventSink>,
    connectivity: Arc<dyn Connectivity>,
    retry: RetryPolicy,
    refresh_gate: RefreshGate,
}

/// Client for the inventory backend. Clones share session and refresh state.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

/// Builder for [`ApiClient`]. Unset collaborators get in-memory or no-op
/// defaults.
pub struct ApiClientBuilder {
    base_url: String,
    refresh_endpoint: String,
    timeout: Duration,
    session: Option<TokenManager>,
    store: Option<Arc<dyn KeyValueStore>>,
    events: Option<Arc<dyn EventSink>>,
    connectivity: Option<Arc<dyn Connectivity>>,
    retry: RetryPolicy,
}

impl ApiClientBuilder {
    /// General-purpose store for the explicit-logout flag.
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Token manager. Defaults to one backed by the general store.
    pub fn session(mut self, session: TokenManager) -> Self {
        self.session = Some(session);
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Per-request timeout covering connect, send and body read.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn refresh_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.refresh_endpoint = endpoint.into();
        self
    }

    pub fn build(self) -> Result<ApiClient, ApiError> {
        let http = Client::builder()
            .cookie_store(true)
            .timeout(self.timeout)
            .build()
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>);
        let session = self
            .session
            .unwrap_or_else(|| TokenManager::new(Arc::clone(&store)));

        Ok(ApiClient {
            inner: Arc::new(ClientInner {
                http,
                base_url: self.base_url.trim().trim_end_matches('/').to_string(),
                refresh_endpoint: self.refresh_endpoint,
                session,
                store,
                events: self
                    .events
                    .unwrap_or_else(|| Arc::new(TracingSink) as Arc<dyn EventSink>),
                connectivity: self
                    .connectivity
                    .unwrap_or_else(|| Arc::new(AlwaysOnline) as Arc<dyn Connectivity>),
                retry: self.retry,
                refresh_gate: RefreshGate::new(),
            }),
        })
    }
}

impl ApiClient {
    pub fn builder(base_url: impl Into<String>) -> ApiClientBuilder {
        ApiClientBuilder {
            base_url: base_url.into(),
            refresh_endpoint: "/api/auth/refresh".to_string(),
            timeout: DEFAULT_TIMEOUT,
            session: None,
            store: None,
            events: None,
            connectivity: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Builder pre-filled from the `api` and `retry` config sections.
    pub fn builder_from_config(config: &Config) -> ApiClientBuilder {
        Self::builder(config.api.base_url.clone())
            .refresh_endpoint(config.api.refresh_endpoint.clone())
            .timeout(config.api.request_timeout())
            .retry_policy(RetryPolicy::from(&config.retry))
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn session(&self) -> &TokenManager {
        &self.inner.session
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.inner.store
    }

    /// Perform a request with the recovery layers selected by `config.policy`.
    ///
    /// # Errors
    /// [`ApiError::Http`] for non-success statuses that could not be
    /// recovered, [`ApiError::Transport`] once retries are exhausted.
    pub async fn request(&self, endpoint: &str, config: RequestConfig) -> Result<Value, ApiError> {
        let first = self.attempt_with_refresh(endpoint, &config).await;
        if !config.policy.retry_on_network_failure {
            return first;
        }

        let err = match first {
            Err(e) if e.is_network_failure() => e,
            other => return other,
        };

        tracing::warn!(endpoint, error = %err, "no response from server, waiting for connectivity");
        if !self
            .inner
            .connectivity
            .wait_for_online(self.inner.retry.online_wait)
            .await
        {
            tracing::warn!(endpoint, "still offline, giving up");
            return Err(err);
        }

        let err = match self.attempt_with_refresh(endpoint, &config).await {
            Err(e) if e.is_network_failure() => e,
            other => return other,
        };

        tracing::warn!(endpoint, error = %err, "retry after reconnect failed, trying once more");
        tokio::time::sleep(self.inner.retry.retry_delay).await;
        self.attempt_with_refresh(endpoint, &config).await
    }

    /// [`request`](Self::request) with the result decoded into `T`.
    pub async fn request_as<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        config: RequestConfig,
    ) -> Result<T, ApiError> {
        let value = self.request(endpoint, config).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.request_as(endpoint, RequestConfig::get()).await
    }

    pub async fn post<B, T>(&self, endpoint: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request_as(endpoint, RequestConfig::post().body(Body::json(body)?))
            .await
    }

    pub async fn put<B, T>(&self, endpoint: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request_as(endpoint, RequestConfig::new(Method::PUT).body(Body::json(body)?))
            .await
    }

    pub async fn patch<B, T>(&self, endpoint: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request_as(endpoint, RequestConfig::new(Method::PATCH).body(Body::json(body)?))
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.request_as(endpoint, RequestConfig::new(Method::DELETE))
            .await
    }

    /// POST a multipart form. The transport sets the boundary content type.
    ///
    /// Runs under [`RequestPolicy::upload`](super::RequestPolicy::upload):
    /// no refresh-and-replay and no offline retry, since the form cannot be
    /// sent twice.
    pub async fn upload(&self, endpoint: &str, form: Form) -> Result<Value, ApiError> {
        let url = join_url(&self.inner.base_url, endpoint);
        let mut headers = HeaderMap::new();
        let authorized = self.insert_authorization(&mut headers)?;
        let builder = self.inner.http.post(&url).headers(headers).multipart(form);
        self.execute(&Method::POST, &url, builder, authorized).await
    }

    /// Renew the session. Concurrent callers share one exchange.
    ///
    /// Returns `false` (and clears the local token) when the user logged out
    /// on purpose, the server rejects the refresh, or the call fails.
    pub async fn refresh_session(&self) -> bool {
        self.inner
            .refresh_gate
            .run(|| self.exchange_refresh())
            .await
    }

    async fn attempt_with_refresh(
        &self,
        endpoint: &str,
        config: &RequestConfig,
    ) -> Result<Value, ApiError> {
        let err = match self.send(endpoint, config).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !(config.policy.refresh_on_auth_failure && err.is_auth_failure()) {
            return Err(err);
        }

        tracing::debug!(endpoint, status = ?err.status(), "auth failure, refreshing session");
        if self.refresh_session().await {
            return match self.send(endpoint, config).await {
                Ok(value) => Ok(value),
                Err(retry_err) => {
                    self.invalidate_session().await;
                    Err(retry_err)
                }
            };
        }

        self.invalidate_session().await;
        Err(err)
    }

    /// One attempt: build, send, map the status.
    async fn send(&self, endpoint: &str, config: &RequestConfig) -> Result<Value, ApiError> {
        let url = join_url(&self.inner.base_url, endpoint);
        let raw_content_type = match &config.body {
            Body::Raw { content_type, .. } => content_type.as_deref(),
            _ => None,
        };
        let (headers, authorized) = self.headers(&config.headers, raw_content_type)?;

        let mut builder = self
            .inner
            .http
            .request(config.method.clone(), &url)
            .headers(headers);
        builder = match &config.body {
            Body::Empty | Body::Json(Value::Null) => builder,
            Body::Json(value) => builder.body(serde_json::to_vec(value)?),
            Body::Raw { bytes, .. } => builder.body(bytes.clone()),
        };

        self.execute(&config.method, &url, builder, authorized).await
    }

    async fn execute(
        &self,
        method: &Method,
        url: &str,
        builder: RequestBuilder,
        authorized: bool,
    ) -> Result<Value, ApiError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.inner.events.publish(&ApiEvent::RequestDebug {
            request_id: request_id.clone(),
            method: method.to_string(),
            url: url.to_string(),
            authorized,
            at: Utc::now(),
        });

        let started = Instant::now();
        let response = builder.send().await.map_err(|e| {
            tracing::debug!(%request_id, error = %e, "transport failure");
            ApiError::transport(e)
        })?;
        let status = response.status();

        self.inner.events.publish(&ApiEvent::ResponseDebug {
            request_id,
            method: method.to_string(),
            url: url.to_string(),
            status: status.as_u16(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            at: Utc::now(),
        });

        let text = response.text().await.map_err(ApiError::transport)?;
        if !status.is_success() {
            return Err(error_from_response(status.as_u16(), &text));
        }
        Ok(parse_success_body(&text))
    }

    /// Default headers with caller overrides layered on top.
    fn headers(
        &self,
        overrides: &[(String, String)],
        content_type: Option<&str>,
    ) -> Result<(HeaderMap, bool), ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(ct) = content_type {
            headers.insert(CONTENT_TYPE, header_value(ct)?);
        }
        let authorized = self.insert_authorization(&mut headers)?;

        for (name, value) in overrides {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ApiError::InvalidRequest(format!("header '{name}': {e}")))?;
            headers.insert(name, header_value(value)?);
        }
        Ok((headers, authorized))
    }

    fn insert_authorization(&self, headers: &mut HeaderMap) -> Result<bool, ApiError> {
        match self.inner.session.token() {
            Some(token) => {
                headers.insert(AUTHORIZATION, header_value(&format!("Bearer {token}"))?);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn exchange_refresh(&self) -> bool {
        if self.explicitly_logged_out().await {
            tracing::info!("explicit logout recorded, not refreshing session");
            self.clear_token().await;
            return false;
        }

        let url = join_url(&self.inner.base_url, &self.inner.refresh_endpoint);
        let builder = self
            .inner
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json");

        match self.execute(&Method::POST, &url, builder, false).await {
            Ok(body) => {
                let token = token_from_body(&body);
                let rotated = token.is_some();
                if let Some(token) = token {
                    if let Err(e) = self.inner.session.set_token(Some(token)).await {
                        tracing::warn!(error = %e, "could not store refreshed token");
                        self.clear_token().await;
                        return false;
                    }
                }
                self.inner.events.publish(&ApiEvent::AuthRefreshed {
                    token_rotated: rotated,
                    at: Utc::now(),
                });
                true
            }
            Err(e) => {
                tracing::info!(error = %e, "session refresh rejected");
                self.clear_token().await;
                false
            }
        }
    }

    pub(crate) async fn explicitly_logged_out(&self) -> bool {
        match self.inner.store.get(keys::EXPLICIT_LOGOUT).await {
            Ok(Some(flag)) => matches!(flag.as_str(), "1" | "true"),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(error = %e, "could not read logout flag");
                false
            }
        }
    }

    async fn clear_token(&self) {
        if let Err(e) = self.inner.session.set_token(None).await {
            tracing::warn!(error = %e, "could not clear session token");
        }
    }

    /// Drop the session after an unrecoverable auth failure. No toast when
    /// the user logged out on purpose.
    async fn invalidate_session(&self) {
        if self.inner.session.token().is_some() {
            self.clear_token().await;
        }
        if self.explicitly_logged_out().await {
            return;
        }
        self.inner.events.publish(&ApiEvent::AuthInvalid {
            message: SESSION_EXPIRED_MESSAGE.to_string(),
            at: Utc::now(),
        });
    }
}

fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value).map_err(|e| ApiError::InvalidRequest(e.to_string()))
}

/// First non-empty token among the accepted field spellings.
pub(crate) fn token_from_body(body: &Value) -> Option<String> {
    TOKEN_FIELDS
        .iter()
        .filter_map(|field| body.get(*field).and_then(Value::as_str))
        .find(|t| !t.is_empty())
        .map(str::to_string)
}

/// Successful bodies that are empty or not JSON count as `{}`.
fn parse_success_body(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::Object(Default::default()))
}

/// Map a non-success response to [`ApiError::Http`].
pub(crate) fn error_from_response(status: u16, text: &str) -> ApiError {
    let object = serde_json::from_str::<Value>(text)
        .ok()
        .filter(Value::is_object);

    let message = object
        .as_ref()
        .and_then(|o| o.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| format!("HTTP {status}"));

    let code = object.as_ref().and_then(|o| {
        ["code", "key", "error"]
            .iter()
            .find_map(|k| o.get(*k).and_then(Value::as_str))
            .map(str::to_string)
    });

    ApiError::Http {
        status,
        message,
        code,
        payload: object,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RequestPolicy;
    use crate::events::BroadcastSink;
    use async_trait::async_trait;
    use mockito::{Matcher, Server};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            online_wait: Duration::from_millis(50),
            retry_delay: Duration::from_millis(10),
        }
    }

    fn client_for(server: &Server) -> ApiClient {
        ApiClient::builder(server.url())
            .retry_policy(fast_retry())
            .build()
            .unwrap()
    }

    #[test]
    fn error_mapping_prefers_message_field() {
        let err = error_from_response(422, r#"{"message":"Invalid code","code":"E_CODE"}"#);
        assert_eq!(err.to_string(), "Invalid code");
        assert_eq!(err.status(), Some(422));
        assert_eq!(err.code(), Some("E_CODE"));
        assert_eq!(err.payload().unwrap()["code"], "E_CODE");
    }

    #[test]
    fn error_mapping_falls_back_to_text_then_status() {
        let err = error_from_response(500, "upstream exploded");
        assert_eq!(err.to_string(), "upstream exploded");
        assert!(err.payload().is_none());

        let err = error_from_response(502, "   ");
        assert_eq!(err.to_string(), "HTTP 502");
    }

    #[test]
    fn error_mapping_reads_key_as_code() {
        let err = error_from_response(404, r#"{"key":"invalid_notification_id"}"#);
        assert_eq!(err.code(), Some("invalid_notification_id"));
    }

    #[test]
    fn token_field_spellings() {
        assert_eq!(token_from_body(&json!({"token": "a"})).as_deref(), Some("a"));
        assert_eq!(token_from_body(&json!({"accessToken": "b"})).as_deref(), Some("b"));
        assert_eq!(token_from_body(&json!({"access_token": "c"})).as_deref(), Some("c"));
        assert_eq!(token_from_body(&json!({"token": ""})), None);
        assert_eq!(token_from_body(&json!({})), None);
    }

    #[tokio::test]
    async fn sends_bearer_and_json_content_type() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/tools")
            .match_header("authorization", "Bearer tkn")
            .match_header("content-type", "application/json")
            .with_status(200)
            .with_body(r#"[{"id":1}]"#)
            .create_async()
            .await;

        let client = client_for(&server);
        client.session().set_token(Some("tkn".into())).await.unwrap();

        let body = client.request("api/tools", RequestConfig::get()).await.unwrap();
        assert_eq!(body, json!([{"id": 1}]));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn omits_authorization_without_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/ping")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = client_for(&server);
        client.request("/api/ping", RequestConfig::get()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn caller_headers_override_defaults() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/import")
            .match_header("content-type", "text/csv")
            .match_body("id;name")
            .with_status(200)
            .create_async()
            .await;

        let client = client_for(&server);
        let config = RequestConfig::post()
            .body(Body::Raw {
                bytes: b"id;name".to_vec(),
                content_type: None,
            })
            .header("Content-Type", "text/csv");
        client.request("/api/import", config).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn json_body_is_encoded() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/tools")
            .match_body(Matcher::Json(json!({"name": "Drill"})))
            .with_status(201)
            .with_body(r#"{"id":"T9"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let created: Value = client.post("/api/tools", &json!({"name": "Drill"})).await.unwrap();
        assert_eq!(created["id"], "T9");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn empty_success_body_is_empty_object() {
        let mut server = Server::new_async().await;
        server
            .mock("DELETE", "/api/tools/1")
            .with_status(204)
            .create_async()
            .await;

        let client = client_for(&server);
        let body = client
            .request("/api/tools/1", RequestConfig::new(Method::DELETE))
            .await
            .unwrap();
        assert_eq!(body, json!({}));
    }

    #[tokio::test]
    async fn application_error_is_structured() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/tools/404")
            .with_status(404)
            .with_body(r#"{"message":"Tool not found","code":"NOT_FOUND"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .request("/api/tools/404", RequestConfig::get())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.code(), Some("NOT_FOUND"));
        assert_eq!(err.to_string(), "Tool not found");
    }

    #[tokio::test]
    async fn unauthorized_refreshes_and_replays_once() {
        let mut server = Server::new_async().await;
        let stale = server
            .mock("GET", "/api/me")
            .match_header("authorization", "Bearer old")
            .with_status(401)
            .with_body(r#"{"message":"expired"}"#)
            .expect(1)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/api/auth/refresh")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_body(r#"{"accessToken":"new"}"#)
            .expect(1)
            .create_async()
            .await;
        let fresh = server
            .mock("GET", "/api/me")
            .match_header("authorization", "Bearer new")
            .with_status(200)
            .with_body(r#"{"user":"kowalski"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server);
        client.session().set_token(Some("old".into())).await.unwrap();

        let body = client.request("/api/me", RequestConfig::get()).await.unwrap();
        assert_eq!(body, json!({"user": "kowalski"}));
        assert_eq!(client.session().token().as_deref(), Some("new"));
        stale.assert_async().await;
        refresh.assert_async().await;
        fresh.assert_async().await;
    }

    #[tokio::test]
    async fn failed_refresh_clears_session_and_reports_invalid() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/me")
            .with_status(403)
            .with_body(r#"{"message":"forbidden"}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/api/auth/refresh")
            .with_status(401)
            .create_async()
            .await;

        let events = BroadcastSink::new(16);
        let mut rx = events.subscribe();
        let client = ApiClient::builder(server.url())
            .events(Arc::new(events.clone()))
            .retry_policy(fast_retry())
            .build()
            .unwrap();
        client.session().set_token(Some("old".into())).await.unwrap();

        let err = client.request("/api/me", RequestConfig::get()).await.unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert_eq!(err.to_string(), "forbidden");
        assert!(client.session().token().is_none());

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        assert!(names.contains(&"auth:invalid"));
        assert!(!names.contains(&"auth:refreshed"));
    }

    #[tokio::test]
    async fn failed_refresh_clears_token_once() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/me")
            .with_status(401)
            .create_async()
            .await;
        server
            .mock("POST", "/api/auth/refresh")
            .with_status(401)
            .create_async()
            .await;

        let client = client_for(&server);
        client.session().set_token(Some("old".into())).await.unwrap();
        let cleared = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&cleared);
        let _subscription = client.session().on_token_change(move |token| {
            if token.is_none() {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert!(client.request("/api/me", RequestConfig::get()).await.is_err());
        assert_eq!(cleared.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn explicit_logout_does_not_report_expired_session() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/me")
            .with_status(401)
            .create_async()
            .await;

        let events = BroadcastSink::new(16);
        let mut rx = events.subscribe();
        let client = ApiClient::builder(server.url())
            .events(Arc::new(events.clone()))
            .retry_policy(fast_retry())
            .build()
            .unwrap();
        client.store().set(keys::EXPLICIT_LOGOUT, "1").await.unwrap();

        let err = client.request("/api/me", RequestConfig::get()).await.unwrap_err();
        assert_eq!(err.status(), Some(401));

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        assert!(!names.contains(&"auth:invalid"));
    }

    #[tokio::test]
    async fn failed_replay_clears_session() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/me")
            .with_status(401)
            .expect(2)
            .create_async()
            .await;
        server
            .mock("POST", "/api/auth/refresh")
            .with_status(200)
            .with_body(r#"{"token":"new"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        client.session().set_token(Some("old".into())).await.unwrap();

        let err = client.request("/api/me", RequestConfig::get()).await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(client.session().token().is_none());
    }

    #[tokio::test]
    async fn explicit_logout_suppresses_refresh() {
        let mut server = Server::new_async().await;
        let refresh = server
            .mock("POST", "/api/auth/refresh")
            .with_status(200)
            .expect(0)
            .create_async()
            .await;

        let client = client_for(&server);
        client.session().set_token(Some("t".into())).await.unwrap();
        client.store().set(keys::EXPLICIT_LOGOUT, "1").await.unwrap();

        assert!(!client.refresh_session().await);
        assert!(client.session().token().is_none());
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn cookie_only_refresh_keeps_token() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/auth/refresh")
            .with_status(200)
            .with_body("")
            .create_async()
            .await;

        let client = client_for(&server);
        client.session().set_token(Some("kept".into())).await.unwrap();
        assert!(client.refresh_session().await);
        assert_eq!(client.session().token().as_deref(), Some("kept"));
    }

    #[tokio::test]
    async fn refresh_uses_configured_endpoint() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/auth/renew")
            .with_status(200)
            .with_body(r#"{"access_token":"r"}"#)
            .create_async()
            .await;

        let client = ApiClient::builder(server.url())
            .refresh_endpoint("/auth/renew")
            .build()
            .unwrap();
        assert!(client.refresh_session().await);
        assert_eq!(client.session().token().as_deref(), Some("r"));
        mock.assert_async().await;
    }

    struct CountingConnectivity {
        online: bool,
        waits: AtomicUsize,
    }

    #[async_trait]
    impl Connectivity for CountingConnectivity {
        async fn is_online(&self) -> bool {
            self.online
        }

        async fn wait_for_online(&self, _limit: Duration) -> bool {
            self.waits.fetch_add(1, Ordering::SeqCst);
            self.online
        }
    }

    /// Listens on a port, accepts and drops the first `failures`
    /// connections, then hands further connections to `upstream`.
    async fn flaky_proxy(failures: usize, upstream: String) -> String {
        use tokio::io::copy_bidirectional;
        use tokio::net::{TcpListener, TcpStream};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut seen = 0;
            loop {
                let (mut inbound, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                seen += 1;
                if seen <= failures {
                    drop(inbound);
                    continue;
                }
                let upstream = upstream.clone();
                tokio::spawn(async move {
                    if let Ok(mut outbound) = TcpStream::connect(upstream).await {
                        let _ = copy_bidirectional(&mut inbound, &mut outbound).await;
                    }
                });
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn transport_failure_waits_for_connectivity_then_succeeds() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/tools")
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let base = flaky_proxy(2, server.host_with_port()).await;
        let connectivity = Arc::new(CountingConnectivity {
            online: true,
            waits: AtomicUsize::new(0),
        });
        let client = ApiClient::builder(base)
            .connectivity(connectivity.clone())
            .retry_policy(fast_retry())
            .build()
            .unwrap();

        let body = client.request("/api/tools", RequestConfig::get()).await.unwrap();
        assert_eq!(body, json!({"ok": true}));
        assert_eq!(connectivity.waits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn offline_device_gives_up_after_wait() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connectivity = Arc::new(CountingConnectivity {
            online: false,
            waits: AtomicUsize::new(0),
        });
        let client = ApiClient::builder(format!("http://{addr}"))
            .connectivity(connectivity.clone())
            .retry_policy(fast_retry())
            .build()
            .unwrap();

        let err = client.request("/api/tools", RequestConfig::get()).await.unwrap_err();
        assert!(matches!(err, ApiError::Transport { .. }));
        assert_eq!(connectivity.waits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hung_server_times_out_as_transport_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&accepted);
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((conn, _)) = listener.accept().await {
                seen.fetch_add(1, Ordering::SeqCst);
                held.push(conn);
            }
        });

        let connectivity = Arc::new(CountingConnectivity {
            online: true,
            waits: AtomicUsize::new(0),
        });
        let client = ApiClient::builder(format!("http://{addr}"))
            .connectivity(connectivity.clone())
            .retry_policy(fast_retry())
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();

        let err = client.request("/api/tools", RequestConfig::get()).await.unwrap_err();
        assert!(matches!(err, ApiError::Transport { timed_out: true, .. }));
        // first attempt, retry after reconnect, final attempt
        assert_eq!(accepted.load(Ordering::SeqCst), 3);
        assert_eq!(connectivity.waits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn policy_none_skips_retry() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connectivity = Arc::new(CountingConnectivity {
            online: true,
            waits: AtomicUsize::new(0),
        });
        let client = ApiClient::builder(format!("http://{addr}"))
            .connectivity(connectivity.clone())
            .build()
            .unwrap();

        let config = RequestConfig::get().policy(RequestPolicy::none());
        assert!(client.request("/api/tools", config).await.is_err());
        assert_eq!(connectivity.waits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn upload_does_not_refresh() {
        let mut server = Server::new_async().await;
        let upload = server
            .mock("POST", "/api/tools/1/photo")
            .match_header(
                "content-type",
                Matcher::Regex("multipart/form-data; boundary=.*".into()),
            )
            .with_status(401)
            .expect(1)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/api/auth/refresh")
            .expect(0)
            .create_async()
            .await;

        let client = client_for(&server);
        client.session().set_token(Some("t".into())).await.unwrap();
        let form = Form::new().text("caption", "front");

        let err = client.upload("/api/tools/1/photo", form).await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(client.session().token().as_deref(), Some("t"));
        upload.assert_async().await;
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn emits_request_and_response_debug_events() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/bhp")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let events = BroadcastSink::new(8);
        let mut rx = events.subscribe();
        let client = ApiClient::builder(server.url())
            .events(Arc::new(events.clone()))
            .build()
            .unwrap();
        client.request("/api/bhp", RequestConfig::get()).await.unwrap();

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first.name(), "api:request-debug");
        match second {
            ApiEvent::ResponseDebug { status, .. } => assert_eq!(status, 200),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
