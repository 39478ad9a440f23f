//! Outbound calls to the Webex REST API
//!
//! Each operation performs exactly one HTTP request with the given bearer
//! token. Status handling is uniform:
//! - 2xx → typed value
//! - 401 → `Reply::Unauthorized` (the session decides whether to refresh)
//! - 404 on a single-resource lookup → `Reply::Ok(None)`
//! - 409 on webhook creation → `WebhookCreation::AlreadyExists`
//! - anything else, transport errors and timeouts → `Error`

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::{ItemList, Message, NewWebhook, Reply, Room, Webhook, WebhookCreation};

/// Upper bound on items requested from list endpoints in one page.
const ROOM_PAGE_SIZE: u32 = 1000;
const WEBHOOK_PAGE_SIZE: u32 = 100;

/// Thin client over the Webex REST endpoints the integration uses.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_base: String,
}

impl ApiClient {
    pub fn new(http: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        webex_auth::endpoint(&self.api_base, path)
    }

    /// Find the id of the first room titled exactly `title`.
    ///
    /// Titles are not unique in Webex. When several rooms share the title the
    /// first one in provider order wins and a warning is logged.
    pub async fn get_room_id(&self, token: &str, title: &str) -> Result<Reply<Option<String>>> {
        const OP: &str = "get_room_id";
        let url = self.url(&format!("rooms?max={ROOM_PAGE_SIZE}"));
        let response = send(OP, self.http.get(url), token).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(Reply::Unauthorized);
        }
        warn_if_truncated(OP, &response);
        let rooms: ItemList<Room> = decode_success(OP, response).await?;

        let mut matches = rooms.items.into_iter().filter(|room| room.title == title);
        let Some(room) = matches.next() else {
            info!(space = title, "room not found");
            return Ok(Reply::Ok(None));
        };
        let duplicates = matches.count();
        if duplicates > 0 {
            warn!(space = title, duplicates, "several rooms share this title, using the first");
        }
        debug!(space = title, room_id = %room.id, "found room");
        Ok(Reply::Ok(Some(room.id)))
    }

    /// Fetch a room by id. `None` when the room does not exist.
    pub async fn room_details(&self, token: &str, room_id: &str) -> Result<Reply<Option<Room>>> {
        self.get_one("room_details", &format!("rooms/{room_id}"), token)
            .await
    }

    /// Fetch a message by id. `None` when the message does not exist.
    pub async fn message_details(
        &self,
        token: &str,
        message_id: &str,
    ) -> Result<Reply<Option<Message>>> {
        self.get_one("message_details", &format!("messages/{message_id}"), token)
            .await
    }

    /// List every webhook registered by the authorizing user.
    pub async fn list_webhooks(&self, token: &str) -> Result<Reply<Vec<Webhook>>> {
        const OP: &str = "list_webhooks";
        let url = self.url(&format!("webhooks?max={WEBHOOK_PAGE_SIZE}"));
        let response = send(OP, self.http.get(url), token).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(Reply::Unauthorized);
        }
        warn_if_truncated(OP, &response);
        let hooks: ItemList<Webhook> = decode_success(OP, response).await?;
        debug!(count = hooks.items.len(), "listed webhooks");
        Ok(Reply::Ok(hooks.items))
    }

    /// Register a webhook. A 409 means it already exists and is not an error.
    pub async fn configure_webhook(
        &self,
        token: &str,
        webhook: &NewWebhook<'_>,
    ) -> Result<Reply<WebhookCreation>> {
        const OP: &str = "configure_webhook";
        let response = send(OP, self.http.post(self.url("webhooks")).json(webhook), token).await?;
        match response.status() {
            StatusCode::UNAUTHORIZED => Ok(Reply::Unauthorized),
            StatusCode::CONFLICT => {
                info!(filter = %webhook.filter, "webhook already exists");
                Ok(Reply::Ok(WebhookCreation::AlreadyExists))
            }
            _ => {
                let created: Webhook = decode_success(OP, response).await?;
                info!(webhook_id = %created.id, filter = %webhook.filter, "webhook created");
                Ok(Reply::Ok(WebhookCreation::Created(created)))
            }
        }
    }

    async fn get_one<T: DeserializeOwned>(
        &self,
        op: &'static str,
        path: &str,
        token: &str,
    ) -> Result<Reply<Option<T>>> {
        let response = send(op, self.http.get(self.url(path)), token).await?;
        match response.status() {
            StatusCode::UNAUTHORIZED => Ok(Reply::Unauthorized),
            StatusCode::NOT_FOUND => {
                debug!(op, path, "resource not found");
                Ok(Reply::Ok(None))
            }
            _ => Ok(Reply::Ok(Some(decode_success(op, response).await?))),
        }
    }
}

async fn send(
    op: &'static str,
    request: reqwest::RequestBuilder,
    token: &str,
) -> Result<reqwest::Response> {
    request.bearer_auth(token).send().await.map_err(|e| Error::Http {
        op,
        message: e.to_string(),
    })
}

/// Whether a list response advertises a further page via `Link: <...>; rel="next"`.
fn has_next_page(headers: &reqwest::header::HeaderMap) -> bool {
    headers
        .get_all(reqwest::header::LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|link| link.contains("rel=\"next\""))
}

/// Only the first page is read; say so when the provider has more.
fn warn_if_truncated(op: &'static str, response: &reqwest::Response) {
    if has_next_page(response.headers()) {
        warn!(op, "provider returned more items than one page, later pages are ignored");
    }
}

/// Decode a 2xx body, or turn any other status into `Error::Status`.
async fn decode_success<T: DeserializeOwned>(
    op: &'static str,
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        warn!(op, status = status.as_u16(), body = %body, "unexpected provider status");
        return Err(Error::Status {
            op,
            status: status.as_u16(),
            body,
        });
    }
    response.json::<T>().await.map_err(|e| Error::Decode {
        op,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;

    #[tokio::test]
    async fn room_details_returns_room() {
        let mock = MockProvider::start("at_1").await;
        mock.add_room("room-1", "TeamRoom");
        let client = ApiClient::new(reqwest::Client::new(), &mock.base_url);

        let reply = client.room_details("at_1", "room-1").await.unwrap();
        assert_eq!(
            reply,
            Reply::Ok(Some(Room {
                id: "room-1".into(),
                title: "TeamRoom".into()
            }))
        );
    }

    #[tokio::test]
    async fn expired_token_is_unauthorized_reply() {
        let mock = MockProvider::start("at_live").await;
        mock.add_room("room-1", "TeamRoom");
        let client = ApiClient::new(reqwest::Client::new(), &mock.base_url);

        let reply = client.room_details("at_expired", "room-1").await.unwrap();
        assert_eq!(reply, Reply::Unauthorized);
    }

    #[tokio::test]
    async fn missing_room_is_none() {
        let mock = MockProvider::start("at_1").await;
        let client = ApiClient::new(reqwest::Client::new(), &mock.base_url);

        let reply = client.room_details("at_1", "nope").await.unwrap();
        assert_eq!(reply, Reply::Ok(None));
    }

    #[tokio::test]
    async fn server_error_is_status_error() {
        let mock = MockProvider::start("at_1").await;
        let client = ApiClient::new(reqwest::Client::new(), &mock.base_url);

        let err = client.room_details("at_1", "broken").await.unwrap_err();
        assert!(
            matches!(err, Error::Status { op: "room_details", status: 500, .. }),
            "got: {err:?}"
        );
    }

    #[tokio::test]
    async fn get_room_id_takes_first_exact_title_match() {
        let mock = MockProvider::start("at_1").await;
        mock.add_room("room-a", "Team");
        mock.add_room("room-b", "TeamRoom");
        mock.add_room("room-c", "TeamRoom");
        let client = ApiClient::new(reqwest::Client::new(), &mock.base_url);

        let reply = client.get_room_id("at_1", "TeamRoom").await.unwrap();
        assert_eq!(reply, Reply::Ok(Some("room-b".to_string())));

        let reply = client.get_room_id("at_1", "teamroom").await.unwrap();
        assert_eq!(reply, Reply::Ok(None));
    }

    #[tokio::test]
    async fn message_details_parses_message() {
        let mock = MockProvider::start("at_1").await;
        mock.add_message("msg-1", "room-1", "hello", "a@x.com");
        let client = ApiClient::new(reqwest::Client::new(), &mock.base_url);

        let Reply::Ok(Some(message)) = client.message_details("at_1", "msg-1").await.unwrap() else {
            panic!("expected message");
        };
        assert_eq!(message.content(), "hello");
        assert_eq!(message.person_email, "a@x.com");
        assert_eq!(message.room_id.as_deref(), Some("room-1"));
    }

    #[tokio::test]
    async fn configure_webhook_twice_is_idempotent() {
        let mock = MockProvider::start("at_1").await;
        let client = ApiClient::new(reqwest::Client::new(), &mock.base_url);
        let hook = NewWebhook::messages_created("room-1", "https://bridge.example.com/webhook", "k");

        let first = client.configure_webhook("at_1", &hook).await.unwrap();
        assert!(matches!(first, Reply::Ok(WebhookCreation::Created(_))));

        let second = client.configure_webhook("at_1", &hook).await.unwrap();
        assert!(matches!(second, Reply::Ok(WebhookCreation::AlreadyExists)));

        let Reply::Ok(hooks) = client.list_webhooks("at_1").await.unwrap() else {
            panic!("expected webhook list");
        };
        assert_eq!(hooks.len(), 1);
        assert_eq!(hooks[0].room_id(), Some("room-1"));
    }

    #[tokio::test]
    async fn unreachable_provider_is_http_error() {
        let client = ApiClient::new(reqwest::Client::new(), "http://127.0.0.1:1");
        let err = client.list_webhooks("at_1").await.unwrap_err();
        assert!(matches!(err, Error::Http { op: "list_webhooks", .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn timeout_is_http_error_without_refresh() {
        let mock = MockProvider::start("at_1").await;
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(200))
            .build()
            .unwrap();
        let client = ApiClient::new(http, &mock.base_url);

        let err = client.room_details("at_1", "slow").await.unwrap_err();
        assert!(matches!(err, Error::Http { op: "room_details", .. }), "got: {err:?}");
        assert_eq!(mock.api_calls(), 1);
        assert_eq!(mock.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn first_page_is_used_when_more_are_advertised() {
        let mock = MockProvider::start("at_1").await;
        mock.add_room("room-1", "TeamRoom");
        mock.advertise_next_page();
        let client = ApiClient::new(reqwest::Client::new(), &mock.base_url);

        let reply = client.get_room_id("at_1", "TeamRoom").await.unwrap();
        assert_eq!(reply, Reply::Ok(Some("room-1".to_string())));
    }

    #[test]
    fn next_page_detected_from_link_header() {
        use reqwest::header::{HeaderMap, HeaderValue, LINK};

        let mut headers = HeaderMap::new();
        assert!(!has_next_page(&headers));

        headers.insert(
            LINK,
            HeaderValue::from_static("<https://webexapis.com/v1/rooms?cursor=p1>; rel=\"prev\""),
        );
        assert!(!has_next_page(&headers));

        headers.append(
            LINK,
            HeaderValue::from_static("<https://webexapis.com/v1/rooms?cursor=n1>; rel=\"next\""),
        );
        assert!(has_next_page(&headers));
    }
}
