//! Webex REST API client with transparent token refresh
//!
//! `ApiClient` performs one HTTP call per operation and reports a 401 as
//! `Reply::Unauthorized` instead of an error. `Session` wraps every operation
//! with the refresh policy:
//!
//! 1. Call with the current access token from the `TokenStore`
//! 2. On `Unauthorized`, exchange the refresh token once (serialized across callers)
//! 3. Replay the call once with the new token and return whatever it yields
//! 4. A rejected refresh token moves the store to `ReauthorizationRequired`
//!    and every later call fails fast until a new grant completes

pub mod client;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod session;
pub mod types;

pub use client::ApiClient;
pub use error::{Error, Result};
pub use session::Session;
pub use types::{
    Message, NewWebhook, Reply, Room, WEBHOOK_NAME, Webhook, WebhookCreation, WebhookEvent,
};
