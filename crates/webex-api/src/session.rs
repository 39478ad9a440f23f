//! Refresh-on-401 coordination
//!
//! `Session::call` applies the same bounded policy to every API operation:
//! one attempt with the stored access token, and on `Reply::Unauthorized`
//! one refresh exchange followed by exactly one replay. The replay's result is
//! returned as-is; a second 401 becomes `Error::Unauthorized`.
//!
//! Refreshes are serialized through the store's refresh guard. A caller that
//! acquires the guard after someone else already swapped the token replays
//! with the new token without exchanging again.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};
use webex_auth::{OAuthClient, TokenPair, TokenState, TokenStore};

use crate::client::ApiClient;
use crate::error::{Error, Result};
use crate::types::{Message, NewWebhook, Reply, Room, Webhook, WebhookCreation};

/// API access bound to the process-wide token store.
pub struct Session {
    api: ApiClient,
    oauth: OAuthClient,
    store: Arc<TokenStore>,
}

impl Session {
    pub fn new(api: ApiClient, oauth: OAuthClient, store: Arc<TokenStore>) -> Self {
        Self { api, oauth, store }
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    pub fn oauth(&self) -> &OAuthClient {
        &self.oauth
    }

    /// Run `invoke` under the refresh-then-retry-once policy.
    ///
    /// `invoke` receives the access token to use and is called at most twice.
    pub async fn call<T, F, Fut>(&self, op: &'static str, mut invoke: F) -> Result<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<Reply<T>>>,
    {
        let token = self.current_access_token().await?;
        match invoke(token.clone()).await? {
            Reply::Ok(value) => return Ok(value),
            Reply::Unauthorized => {
                warn!(op, "access token rejected, refreshing");
            }
        }

        let fresh = self.refresh(op, &token).await?;
        match invoke(fresh).await? {
            Reply::Ok(value) => Ok(value),
            Reply::Unauthorized => {
                warn!(op, "access token rejected again after refresh");
                Err(Error::Unauthorized { op })
            }
        }
    }

    pub async fn get_room_id(&self, title: &str) -> Result<Option<String>> {
        self.call("get_room_id", move |token| async move {
            self.api.get_room_id(&token, title).await
        })
        .await
    }

    pub async fn room_details(&self, room_id: &str) -> Result<Option<Room>> {
        self.call("room_details", move |token| async move {
            self.api.room_details(&token, room_id).await
        })
        .await
    }

    pub async fn message_details(&self, message_id: &str) -> Result<Option<Message>> {
        self.call("message_details", move |token| async move {
            self.api.message_details(&token, message_id).await
        })
        .await
    }

    pub async fn list_webhooks(&self) -> Result<Vec<Webhook>> {
        self.call("list_webhooks", move |token| async move {
            self.api.list_webhooks(&token).await
        })
        .await
    }

    pub async fn configure_webhook(&self, webhook: &NewWebhook<'_>) -> Result<WebhookCreation> {
        self.call("configure_webhook", move |token| async move {
            self.api.configure_webhook(&token, webhook).await
        })
        .await
    }

    async fn current_access_token(&self) -> Result<String> {
        match self.store.state().await {
            TokenState::Authorized(pair) => Ok(pair.access_token),
            TokenState::Unauthorized => Err(Error::NotAuthorized),
            TokenState::ReauthorizationRequired => Err(Error::ReauthorizationRequired),
        }
    }

    /// Obtain a replacement for the `rejected` access token.
    async fn refresh(&self, op: &'static str, rejected: &str) -> Result<String> {
        let _guard = self.store.lock_refresh().await;

        let pair = match self.store.state().await {
            TokenState::Authorized(pair) => pair,
            TokenState::Unauthorized => return Err(Error::NotAuthorized),
            TokenState::ReauthorizationRequired => return Err(Error::ReauthorizationRequired),
        };
        if pair.access_token != rejected {
            debug!(op, "access token already refreshed by a concurrent call");
            return Ok(pair.access_token);
        }

        match self.oauth.refresh_access_token(&pair.refresh_token).await {
            Ok(access_token) => {
                let replacement = TokenPair {
                    access_token: access_token.clone(),
                    refresh_token: pair.refresh_token,
                };
                self.store.compare_and_swap(rejected, replacement).await;
                metrics::counter!("webex_token_refresh_total", "outcome" => "success").increment(1);
                info!(op, "access token refreshed");
                Ok(access_token)
            }
            Err(e @ webex_auth::Error::Http(_)) => {
                metrics::counter!("webex_token_refresh_total", "outcome" => "transport_error")
                    .increment(1);
                warn!(op, error = %e, "token endpoint unreachable, keeping current tokens");
                Err(Error::Refresh(e))
            }
            Err(e) => {
                metrics::counter!("webex_token_refresh_total", "outcome" => "rejected").increment(1);
                warn!(op, error = %e, "refresh exchange failed");
                self.store.require_reauthorization(rejected).await;
                Err(Error::ReauthorizationRequired)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;
    use common::Secret;
    use webex_auth::ClientCredentials;

    fn session(mock: &MockProvider, store: Arc<TokenStore>) -> Session {
        let http = reqwest::Client::new();
        let oauth = OAuthClient::new(
            http.clone(),
            &mock.base_url,
            ClientCredentials {
                client_id: "client-1".into(),
                client_secret: Secret::new("shh".into()),
                redirect_uri: "http://localhost/oauth".into(),
                scopes: "spark:all".into(),
            },
        );
        Session::new(ApiClient::new(http, &mock.base_url), oauth, store)
    }

    async fn authorized_store(access: &str) -> Arc<TokenStore> {
        let store = Arc::new(TokenStore::in_memory());
        store
            .install(TokenPair {
                access_token: access.into(),
                refresh_token: "rt_1".into(),
            })
            .await;
        store
    }

    #[tokio::test]
    async fn valid_token_makes_single_call() {
        let mock = MockProvider::start("at_live").await;
        mock.add_room("room-1", "TeamRoom");
        let session = session(&mock, authorized_store("at_live").await);

        let room = session.room_details("room-1").await.unwrap().unwrap();
        assert_eq!(room.title, "TeamRoom");
        assert_eq!(mock.api_calls(), 1);
        assert_eq!(mock.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn expired_token_refreshes_once_and_retries_once() {
        let mock = MockProvider::start("at_live").await;
        mock.add_room("room-1", "TeamRoom");
        mock.grant_refresh("at_new");
        let store = authorized_store("at_expired").await;
        let session = session(&mock, store.clone());

        let room = session.room_details("room-1").await.unwrap().unwrap();
        assert_eq!(room.title, "TeamRoom");
        assert_eq!(mock.refresh_calls(), 1, "exactly one refresh exchange");
        assert_eq!(mock.api_calls(), 2, "original call plus exactly one replay");
        assert_eq!(
            *mock.state.refresh_tokens_seen.lock().unwrap(),
            vec!["rt_1".to_string()]
        );

        assert_eq!(
            store.state().await,
            TokenState::Authorized(TokenPair {
                access_token: "at_new".into(),
                refresh_token: "rt_1".into(),
            }),
            "refresh token is carried over, not rotated"
        );
    }

    #[tokio::test]
    async fn second_rejection_is_surfaced_without_another_refresh() {
        let mock = MockProvider::start("at_live").await;
        mock.add_room("room-1", "TeamRoom");
        mock.reject_all();
        mock.grant_refresh("at_new");
        let session = session(&mock, authorized_store("at_live").await);

        let err = session.room_details("room-1").await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized { op: "room_details" }), "got: {err:?}");
        assert_eq!(mock.refresh_calls(), 1);
        assert_eq!(mock.api_calls(), 2);
    }

    #[tokio::test]
    async fn rejected_refresh_requires_reauthorization() {
        let mock = MockProvider::start("at_live").await;
        mock.add_room("room-1", "TeamRoom");
        let store = authorized_store("at_expired").await;
        let session = session(&mock, store.clone());

        let err = session.room_details("room-1").await.unwrap_err();
        assert!(matches!(err, Error::ReauthorizationRequired), "got: {err:?}");
        assert_eq!(mock.refresh_calls(), 1);
        assert_eq!(mock.api_calls(), 1, "no replay after a failed refresh");
        assert_eq!(store.state().await, TokenState::ReauthorizationRequired);

        // Later calls fail fast without touching the provider
        let err = session.list_webhooks().await.unwrap_err();
        assert!(matches!(err, Error::ReauthorizationRequired));
        assert_eq!(mock.api_calls(), 1);
        assert_eq!(mock.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn unauthorized_store_makes_no_calls() {
        let mock = MockProvider::start("at_live").await;
        let session = session(&mock, Arc::new(TokenStore::in_memory()));

        let err = session.get_room_id("TeamRoom").await.unwrap_err();
        assert!(matches!(err, Error::NotAuthorized));
        assert_eq!(mock.api_calls(), 0);
    }

    #[tokio::test]
    async fn provider_error_is_not_retried() {
        let mock = MockProvider::start("at_live").await;
        let session = session(&mock, authorized_store("at_live").await);

        let err = session.room_details("broken").await.unwrap_err();
        assert!(matches!(err, Error::Status { status: 500, .. }), "got: {err:?}");
        assert_eq!(mock.api_calls(), 1);
        assert_eq!(mock.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_rejections_share_one_refresh() {
        let mock = MockProvider::start("at_live").await;
        mock.add_room("room-1", "TeamRoom");
        mock.grant_refresh("at_new");
        let session = Arc::new(session(&mock, authorized_store("at_stale").await));

        let mut handles = vec![];
        for _ in 0..5 {
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                session.room_details("room-1").await
            }));
        }
        for h in handles {
            let room = h.await.unwrap().unwrap().unwrap();
            assert_eq!(room.title, "TeamRoom");
        }

        assert_eq!(mock.refresh_calls(), 1, "concurrent 401s coalesce into one exchange");
        assert!(mock.api_calls() <= 10, "at most one replay per call");
    }

    #[tokio::test]
    async fn configure_webhook_goes_through_refresh_policy() {
        let mock = MockProvider::start("at_live").await;
        mock.grant_refresh("at_live");
        let session = session(&mock, authorized_store("at_stale").await);
        let hook = NewWebhook::messages_created("room-1", "https://bridge.example.com/webhook", "k");

        let created = session.configure_webhook(&hook).await.unwrap();
        assert!(matches!(created, WebhookCreation::Created(_)));
        let again = session.configure_webhook(&hook).await.unwrap();
        assert!(matches!(again, WebhookCreation::AlreadyExists));
        assert_eq!(mock.refresh_calls(), 1);
        assert_eq!(mock.webhook_count(), 1);
    }

    #[tokio::test]
    async fn refresh_server_error_also_requires_reauthorization() {
        let mock = MockProvider::start("at_live").await;
        mock.add_room("room-1", "TeamRoom");
        mock.fail_refreshes();
        let store = authorized_store("at_expired").await;
        let session = session(&mock, store.clone());

        let err = session.room_details("room-1").await.unwrap_err();
        assert!(matches!(err, Error::ReauthorizationRequired), "got: {err:?}");
        assert_eq!(mock.refresh_calls(), 1);
        assert_eq!(mock.api_calls(), 1, "no replay after a failed refresh");
        assert_eq!(store.state().await, TokenState::ReauthorizationRequired);
    }
}
