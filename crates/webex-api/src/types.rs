//! Webex resource shapes consumed and produced by the integration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name given to every webhook this integration registers. Listing filters on it.
pub const WEBHOOK_NAME: &str = "Space Email Webhook";

/// Outcome of one API call before the refresh policy is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<T> {
    Ok(T),
    /// The provider rejected the access token (HTTP 401)
    Unauthorized,
}

/// A Webex space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub title: String,
}

/// A message posted in a space.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub markdown: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    pub person_email: String,
    pub created: DateTime<Utc>,
}

impl Message {
    /// Richest available representation: html, then markdown, then text.
    pub fn content(&self) -> &str {
        self.html
            .as_deref()
            .or(self.markdown.as_deref())
            .or(self.text.as_deref())
            .unwrap_or_default()
    }
}

/// A registered webhook as returned by `GET /webhooks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub id: String,
    pub name: String,
    pub target_url: String,
    pub resource: String,
    pub event: String,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl Webhook {
    /// Room id from a `roomId=<id>` filter, if the webhook is scoped to a room.
    pub fn room_id(&self) -> Option<&str> {
        self.filter
            .as_deref()?
            .split('&')
            .find_map(|pair| pair.strip_prefix("roomId="))
    }
}

/// Body of `POST /webhooks`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWebhook<'a> {
    pub resource: &'a str,
    pub event: &'a str,
    pub filter: String,
    pub target_url: &'a str,
    pub name: &'a str,
    pub secret: &'a str,
}

impl<'a> NewWebhook<'a> {
    /// Webhook firing on every new message in `room_id`.
    pub fn messages_created(room_id: &str, target_url: &'a str, secret: &'a str) -> Self {
        Self {
            resource: "messages",
            event: "created",
            filter: format!("roomId={room_id}"),
            target_url,
            name: WEBHOOK_NAME,
            secret,
        }
    }
}

/// Outcome of a webhook registration.
#[derive(Debug, Clone)]
pub enum WebhookCreation {
    Created(Webhook),
    /// 409: an identical webhook is already registered
    AlreadyExists,
}

/// Payload Webex posts to the webhook target.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub event: String,
    pub data: WebhookEventData,
}

/// The resource reference inside a webhook event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEventData {
    pub id: String,
    pub room_id: String,
    #[serde(default)]
    pub person_email: Option<String>,
}

impl WebhookEvent {
    pub fn is_message_created(&self) -> bool {
        self.resource == "messages" && self.event == "created"
    }
}

/// Envelope of Webex list endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct ItemList<T> {
    pub items: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(json: serde_json::Value) -> Message {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn message_content_prefers_html_then_markdown_then_text() {
        let base = serde_json::json!({
            "id": "m1",
            "personEmail": "sender@example.com",
            "created": "2022-06-01T18:40:33.209Z",
            "text": "plain",
        });

        assert_eq!(message(base.clone()).content(), "plain");

        let mut with_md = base.clone();
        with_md["markdown"] = "**md**".into();
        assert_eq!(message(with_md.clone()).content(), "**md**");

        let mut with_html = with_md;
        with_html["html"] = "<b>html</b>".into();
        assert_eq!(message(with_html).content(), "<b>html</b>");
    }

    #[test]
    fn message_without_any_body_is_empty() {
        let msg = message(serde_json::json!({
            "id": "m1",
            "personEmail": "sender@example.com",
            "created": "2022-06-01T18:40:33.209Z",
        }));
        assert_eq!(msg.content(), "");
    }

    #[test]
    fn webhook_room_id_parsed_from_filter() {
        let hook: Webhook = serde_json::from_value(serde_json::json!({
            "id": "w1",
            "name": WEBHOOK_NAME,
            "targetUrl": "https://bridge.example.com/webhook",
            "resource": "messages",
            "event": "created",
            "filter": "roomId=Y2lzY29zcGFyazovL3VzL1JPT00v",
        }))
        .unwrap();
        assert_eq!(hook.room_id(), Some("Y2lzY29zcGFyazovL3VzL1JPT00v"));
    }

    #[test]
    fn webhook_without_filter_has_no_room() {
        let hook: Webhook = serde_json::from_value(serde_json::json!({
            "id": "w1",
            "name": "other",
            "targetUrl": "https://bridge.example.com/webhook",
            "resource": "messages",
            "event": "created",
        }))
        .unwrap();
        assert_eq!(hook.room_id(), None);
    }

    #[test]
    fn new_webhook_serializes_camel_case() {
        let hook = NewWebhook::messages_created("room-1", "https://b.example.com/webhook", "k");
        let json = serde_json::to_value(&hook).unwrap();
        assert_eq!(json["resource"], "messages");
        assert_eq!(json["event"], "created");
        assert_eq!(json["filter"], "roomId=room-1");
        assert_eq!(json["targetUrl"], "https://b.example.com/webhook");
        assert_eq!(json["name"], WEBHOOK_NAME);
        assert_eq!(json["secret"], "k");
    }

    #[test]
    fn webhook_event_parses_room_and_message_ids() {
        let event: WebhookEvent = serde_json::from_value(serde_json::json!({
            "id": "hook-1",
            "name": WEBHOOK_NAME,
            "resource": "messages",
            "event": "created",
            "data": {"id": "msg-1", "roomId": "room-1", "personEmail": "a@x.com"}
        }))
        .unwrap();
        assert!(event.is_message_created());
        assert_eq!(event.data.id, "msg-1");
        assert_eq!(event.data.room_id, "room-1");
        assert_eq!(event.name.as_deref(), Some(WEBHOOK_NAME));
        assert_eq!(event.data.person_email.as_deref(), Some("a@x.com"));
    }
}
