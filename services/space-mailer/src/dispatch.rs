//! Inbound webhook handling
//!
//! A delivery is authenticated before anything else happens: an unsigned or
//! mis-signed body never reaches JSON parsing or the Webex API. Accepted
//! `messages/created` events are resolved to their room and message, and the
//! message is mailed to every recipient configured for the room's title.

use std::sync::Arc;

use common::Secret;
use tracing::{debug, info, warn};
use webex_api::{Session, WebhookEvent};

use crate::config::Spaces;
use crate::mailer::Mailer;
use crate::metrics::Stats;
use crate::signature;

/// How one webhook request was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Signature missing or wrong
    Rejected,
    /// Signed but not a webhook event
    Malformed,
    /// Not a `messages/created` event
    Ignored,
    /// Room or message could not be fetched
    Aborted,
    /// Room title has no configured recipients
    Unrouted,
    Delivered { attempted: usize, failed: usize },
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Rejected => "rejected",
            Outcome::Malformed => "malformed",
            Outcome::Ignored => "ignored",
            Outcome::Aborted => "aborted",
            Outcome::Unrouted => "unrouted",
            Outcome::Delivered { .. } => "delivered",
        }
    }
}

pub struct Dispatcher {
    session: Arc<Session>,
    spaces: Arc<Spaces>,
    mailer: Arc<dyn Mailer>,
    secret: Secret<String>,
    stats: Arc<Stats>,
}

impl Dispatcher {
    pub fn new(
        session: Arc<Session>,
        spaces: Arc<Spaces>,
        mailer: Arc<dyn Mailer>,
        secret: Secret<String>,
        stats: Arc<Stats>,
    ) -> Self {
        Self {
            session,
            spaces,
            mailer,
            secret,
            stats,
        }
    }

    /// Authenticate, parse and dispatch one webhook body.
    pub async fn handle(&self, body: &[u8], signature: Option<&str>) -> Outcome {
        let outcome = self.process(body, signature).await;
        self.stats.webhook_event(outcome.label());
        outcome
    }

    async fn process(&self, body: &[u8], signature: Option<&str>) -> Outcome {
        if !signature::verify(self.secret.expose().as_bytes(), body, signature) {
            warn!(
                signature_present = signature.is_some(),
                "webhook signature mismatch, dropping request"
            );
            return Outcome::Rejected;
        }

        let event: WebhookEvent = match serde_json::from_slice(body) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "signed webhook body is not an event");
                return Outcome::Malformed;
            }
        };
        if !event.is_message_created() {
            debug!(resource = %event.resource, event = %event.event, "ignoring webhook event");
            return Outcome::Ignored;
        }
        debug!(
            webhook = event.name.as_deref().unwrap_or("-"),
            author = event.data.person_email.as_deref().unwrap_or("-"),
            message_id = %event.data.id,
            "dispatching message event"
        );

        self.dispatch(&event).await
    }

    async fn dispatch(&self, event: &WebhookEvent) -> Outcome {
        let room_id = event.data.room_id.as_str();
        let message_id = event.data.id.as_str();

        let room = match self.session.room_details(room_id).await {
            Ok(Some(room)) => room,
            Ok(None) => {
                warn!(room_id, "room not found, dropping event");
                return Outcome::Aborted;
            }
            Err(e) => {
                warn!(room_id, error = %e, "room lookup failed, dropping event");
                return Outcome::Aborted;
            }
        };

        let message = match self.session.message_details(message_id).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                warn!(room_id, message_id, "message not found, dropping event");
                return Outcome::Aborted;
            }
            Err(e) => {
                warn!(room_id, message_id, error = %e, "message lookup failed, dropping event");
                return Outcome::Aborted;
            }
        };

        let Some(recipients) = self.spaces.recipients(&room.title) else {
            info!(space = %room.title, room_id, "no recipients configured for space");
            return Outcome::Unrouted;
        };

        let mut failed = 0;
        for recipient in recipients {
            match self.mailer.deliver(&room.title, recipient, &message).await {
                Ok(()) => {
                    self.stats.delivery(true);
                    info!(space = %room.title, recipient = %recipient, message_id, "message forwarded");
                }
                Err(e) => {
                    failed += 1;
                    self.stats.delivery(false);
                    warn!(space = %room.title, recipient = %recipient, error = %e, "delivery failed");
                }
            }
        }

        Outcome::Delivered {
            attempted: recipients.len(),
            failed,
        }
    }
}
