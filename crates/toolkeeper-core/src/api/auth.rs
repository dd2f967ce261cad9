//! Login and logout.

use serde_json::json;

use super::client::{token_from_body, ApiClient};
use super::request::{RequestConfig, RequestPolicy};
use crate::error::ApiError;
use crate::storage::keys;

const LOGIN_ENDPOINT: &str = "/api/auth/login";
const LOGOUT_ENDPOINT: &str = "/api/auth/logout";

impl ApiClient {
    /// Exchange credentials for a session.
    ///
    /// Returns `true` when the response carried a bearer token, `false` for a
    /// cookie-only session. Either way the explicit-logout flag is cleared so
    /// later 401s may refresh again.
    pub async fn login(&self, username: &str, password: &str) -> Result<bool, ApiError> {
        // a 401 here means bad credentials, not an expired session
        let config = RequestConfig::post()
            .json(json!({ "username": username, "password": password }))
            .policy(RequestPolicy {
                refresh_on_auth_failure: false,
                retry_on_network_failure: true,
            });
        let body = self.request(LOGIN_ENDPOINT, config).await?;

        self.store().remove(keys::EXPLICIT_LOGOUT).await?;
        let token = token_from_body(&body);
        let received = token.is_some();
        if received {
            self.session().set_token(token).await?;
        }
        tracing::info!(token = received, "logged in");
        Ok(received)
    }

    /// End the session locally and, best effort, on the server.
    ///
    /// Sets the explicit-logout flag so no later refresh revives the session.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let config = RequestConfig::post().policy(RequestPolicy::none());
        if let Err(e) = self.request(LOGOUT_ENDPOINT, config).await {
            tracing::debug!(error = %e, "server logout failed, continuing locally");
        }

        self.store().set(keys::EXPLICIT_LOGOUT, "1").await?;
        self.session().set_token(None).await?;
        tracing::info!("logged out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn login_stores_token_and_clears_logout_flag() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/auth/login")
            .match_body(Matcher::Json(json!({"username": "jan", "password": "pw"})))
            .with_status(200)
            .with_body(r#"{"access_token":"fresh"}"#)
            .create_async()
            .await;

        let client = ApiClient::builder(server.url()).build().unwrap();
        client.store().set(keys::EXPLICIT_LOGOUT, "1").await.unwrap();

        assert!(client.login("jan", "pw").await.unwrap());
        assert_eq!(client.session().token().as_deref(), Some("fresh"));
        assert!(!client.explicitly_logged_out().await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn bad_credentials_do_not_trigger_refresh() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/auth/login")
            .with_status(401)
            .with_body(r#"{"message":"Invalid credentials"}"#)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", "/api/auth/refresh")
            .expect(0)
            .create_async()
            .await;

        let client = ApiClient::builder(server.url()).build().unwrap();
        let err = client.login("jan", "wrong").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid credentials");
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn logout_survives_server_failure() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/auth/logout")
            .with_status(500)
            .create_async()
            .await;

        let client = ApiClient::builder(server.url()).build().unwrap();
        client.session().set_token(Some("t".into())).await.unwrap();

        client.logout().await.unwrap();
        assert!(client.session().token().is_none());
        assert!(client.explicitly_logged_out().await);
        assert!(!client.refresh_session().await);
    }
}
