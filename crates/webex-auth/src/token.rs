//! OAuth token exchange and refresh
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (grant callback)
//! 2. Refresh-token exchange (after the API rejects an access token)
//!
//! Both POST form-encoded bodies to `{api_base}/access_token` with the
//! integration's client id and secret.

use common::Secret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{AUTHORIZE_PATH, TOKEN_PATH, endpoint};
use crate::error::{Error, Result};
use crate::state::build_authorization_url;
use crate::store::TokenPair;

/// Response from the token endpoint for both exchange and refresh.
///
/// Webex always returns a refresh token on the code exchange; on refresh it
/// echoes one back, but the integration keeps the original.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires
    #[serde(default)]
    pub expires_in: u64,
}

/// Integration credentials registered with Webex.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub redirect_uri: String,
    pub scopes: String,
}

/// Token endpoint client for one Webex integration.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    api_base: String,
    credentials: ClientCredentials,
}

impl OAuthClient {
    pub fn new(http: reqwest::Client, api_base: impl Into<String>, credentials: ClientCredentials) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            credentials,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.credentials.client_id
    }

    /// Consent URL carrying the given anti-forgery state.
    pub fn authorization_url(&self, state: &str) -> Result<String> {
        build_authorization_url(
            &endpoint(&self.api_base, AUTHORIZE_PATH),
            &self.credentials.client_id,
            &self.credentials.redirect_uri,
            &self.credentials.scopes,
            state,
        )
    }

    /// Exchange an authorization code for the initial token pair.
    ///
    /// Called once per successful callback. No refresh wrapper applies:
    /// there is no token yet to refresh.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenPair> {
        let response = self
            .post_token_form(&[
                ("grant_type", "authorization_code"),
                ("client_id", &self.credentials.client_id),
                ("client_secret", self.credentials.client_secret.expose()),
                ("code", code),
                ("redirect_uri", &self.credentials.redirect_uri),
            ])
            .await?;

        let refresh_token = response.refresh_token.ok_or_else(|| {
            Error::TokenExchange("token endpoint returned no refresh_token".into())
        })?;
        debug!(expires_in = response.expires_in, "authorization code exchanged");
        Ok(TokenPair {
            access_token: response.access_token,
            refresh_token,
        })
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// Only the access token is returned; the refresh token is not rotated.
    pub async fn refresh_access_token(&self, refresh: &str) -> Result<String> {
        let response = self
            .post_token_form(&[
                ("grant_type", "refresh_token"),
                ("client_id", &self.credentials.client_id),
                ("client_secret", self.credentials.client_secret.expose()),
                ("refresh_token", refresh),
            ])
            .await?;
        debug!(expires_in = response.expires_in, "access token refreshed");
        Ok(response.access_token)
    }

    async fn post_token_form(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http
            .post(endpoint(&self.api_base, TOKEN_PATH))
            .form(form)
            .send()
            .await
            .map_err(|e| Error::Http(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));

            // 400/401/403 mean the code or refresh token is revoked, expired or unknown
            if matches!(status.as_u16(), 400 | 401 | 403) {
                return Err(Error::InvalidCredentials(format!(
                    "token endpoint rejected grant ({status}): {body}"
                )));
            }

            return Err(Error::TokenExchange(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::Form;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    type Captured = Arc<Mutex<Vec<HashMap<String, String>>>>;

    /// Start a token endpoint that records each form it receives and answers
    /// with the given status and JSON body.
    async fn start_token_server(status: StatusCode, body: serde_json::Value) -> (String, Captured) {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let seen = captured.clone();
        let app = Router::new().route(
            "/access_token",
            post(move |Form(form): Form<HashMap<String, String>>| {
                let seen = seen.clone();
                let body = body.clone();
                async move {
                    seen.lock().unwrap().push(form);
                    (status, axum::Json(body)).into_response()
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), captured)
    }

    fn test_client(api_base: &str) -> OAuthClient {
        OAuthClient::new(
            reqwest::Client::new(),
            api_base,
            ClientCredentials {
                client_id: "client-1".into(),
                client_secret: Secret::new("shh".into()),
                redirect_uri: "http://localhost/oauth".into(),
                scopes: "spark:all".into(),
            },
        )
    }

    #[test]
    fn token_response_tolerates_missing_optional_fields() {
        let json = r#"{"access_token":"at_abc"}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "at_abc");
        assert!(token.refresh_token.is_none());
        assert_eq!(token.expires_in, 0);
    }

    #[test]
    fn authorization_url_targets_authorize_endpoint() {
        let client = test_client("https://webexapis.com/v1");
        let url = client.authorization_url("xyz").unwrap();
        assert!(url.starts_with("https://webexapis.com/v1/authorize?"));
        assert!(url.contains("state=xyz"));
        assert!(url.contains("client_id=client-1"));
    }

    #[tokio::test]
    async fn exchange_code_posts_authorization_code_grant() {
        let (base, captured) = start_token_server(
            StatusCode::OK,
            serde_json::json!({
                "access_token": "at_1",
                "refresh_token": "rt_1",
                "expires_in": 1209600
            }),
        )
        .await;

        let pair = test_client(&base).exchange_code("code-42").await.unwrap();
        assert_eq!(pair.access_token, "at_1");
        assert_eq!(pair.refresh_token, "rt_1");

        let forms = captured.lock().unwrap();
        assert_eq!(forms.len(), 1);
        assert_eq!(forms[0]["grant_type"], "authorization_code");
        assert_eq!(forms[0]["code"], "code-42");
        assert_eq!(forms[0]["client_id"], "client-1");
        assert_eq!(forms[0]["client_secret"], "shh");
        assert_eq!(forms[0]["redirect_uri"], "http://localhost/oauth");
    }

    #[tokio::test]
    async fn exchange_code_requires_refresh_token() {
        let (base, _) =
            start_token_server(StatusCode::OK, serde_json::json!({"access_token": "at_1"})).await;
        let result = test_client(&base).exchange_code("code").await;
        assert!(matches!(result, Err(Error::TokenExchange(_))));
    }

    #[tokio::test]
    async fn refresh_posts_refresh_token_grant() {
        let (base, captured) = start_token_server(
            StatusCode::OK,
            serde_json::json!({"access_token": "at_2", "refresh_token": "rt_echo"}),
        )
        .await;

        let access = test_client(&base).refresh_access_token("rt_1").await.unwrap();
        assert_eq!(access, "at_2");

        let forms = captured.lock().unwrap();
        assert_eq!(forms[0]["grant_type"], "refresh_token");
        assert_eq!(forms[0]["refresh_token"], "rt_1");
    }

    #[tokio::test]
    async fn rejected_refresh_is_invalid_credentials() {
        let (base, _) = start_token_server(
            StatusCode::BAD_REQUEST,
            serde_json::json!({"message": "invalid_grant"}),
        )
        .await;
        let result = test_client(&base).refresh_access_token("rt_revoked").await;
        assert!(matches!(result, Err(Error::InvalidCredentials(_))));
    }

    #[tokio::test]
    async fn server_error_is_token_exchange_failure() {
        let (base, _) = start_token_server(
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({"message": "boom"}),
        )
        .await;
        let result = test_client(&base).refresh_access_token("rt_1").await;
        assert!(matches!(result, Err(Error::TokenExchange(_))));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_http_error() {
        let result = test_client("http://127.0.0.1:1")
            .refresh_access_token("rt_1")
            .await;
        assert!(matches!(result, Err(Error::Http(_))));
    }
}
