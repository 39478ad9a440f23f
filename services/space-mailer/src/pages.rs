//! HTML pages served to the operator's browser

use askama::Template;

use crate::subscribe::Provisioning;

/// Landing page carrying the consent link.
#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexPage<'a> {
    pub client_id: &'a str,
    pub authorization_url: &'a str,
    /// The previous grant was revoked
    pub regrant: bool,
}

/// Result of (re)provisioning webhooks.
#[derive(Template)]
#[template(path = "subscribed.html")]
pub struct SubscribedPage<'a> {
    pub provisioning: &'a Provisioning,
}

/// Minimal acknowledgement returned to Webex for every accepted webhook.
#[derive(Template)]
#[template(path = "ack.html")]
pub struct AckPage;

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorPage {
    pub detail: String,
    pub reauthorize: bool,
}
