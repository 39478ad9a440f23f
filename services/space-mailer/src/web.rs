//! Browser and webhook routes
//!
//! Endpoints:
//! - `GET /`: landing page with a fresh consent link
//! - `GET /oauth`: grant callback, verifies state and exchanges the code
//! - `GET /subscribe`: (re)provision webhooks and show their status
//! - `GET|POST /webhook`: inbound Webex event

use std::sync::Arc;

use askama::Template;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use common::Secret;
use serde::Deserialize;
use tracing::{info, warn};
use webex_api::Session;
use webex_auth::TokenState;

use crate::config::Spaces;
use crate::dispatch::{Dispatcher, Outcome};
use crate::error::Result;
use crate::grant::PendingGrants;
use crate::pages::{AckPage, IndexPage, SubscribedPage};
use crate::signature::SIGNATURE_HEADER;
use crate::subscribe;

/// Shared state for browser and webhook handlers.
#[derive(Clone)]
pub struct WebState {
    pub session: Arc<Session>,
    pub grants: Arc<PendingGrants>,
    pub dispatcher: Arc<Dispatcher>,
    pub spaces: Arc<Spaces>,
    /// Public URL Webex posts events to
    pub webhook_uri: Arc<str>,
    pub webhook_secret: Secret<String>,
}

pub fn build_web_router(state: WebState) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/oauth", get(oauth_callback))
        .route("/subscribe", get(subscribe_handler))
        .route("/webhook", get(webhook).post(webhook))
        .with_state(state)
}

/// GET /: issue a state and render the consent link.
async fn landing(State(state): State<WebState>) -> Result<Html<String>> {
    let grant_state = state.grants.issue().await;
    let oauth = state.session.oauth();
    let authorization_url = oauth.authorization_url(&grant_state)?;
    let regrant = matches!(
        state.session.store().state().await,
        TokenState::ReauthorizationRequired
    );

    let page = IndexPage {
        client_id: oauth.client_id(),
        authorization_url: &authorization_url,
        regrant,
    };
    Ok(Html(page.render()?))
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    state: Option<String>,
    code: Option<String>,
    error: Option<String>,
}

/// GET /oauth: complete the grant.
///
/// Anything but an issued state sends the user back to `/` without touching
/// the code.
async fn oauth_callback(
    State(state): State<WebState>,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect> {
    if let Some(error) = &params.error {
        warn!(error = %error, "consent was not granted");
        return Ok(Redirect::to("/"));
    }
    let Some(returned) = params.state.as_deref() else {
        warn!("grant callback without state");
        return Ok(Redirect::to("/"));
    };
    if !state.grants.consume(returned).await {
        return Ok(Redirect::to("/"));
    }
    let Some(code) = params.code.as_deref() else {
        warn!("grant callback without code");
        return Ok(Redirect::to("/"));
    };

    let pair = state.session.oauth().exchange_code(code).await?;
    state.session.store().install(pair).await;
    info!("grant completed");
    Ok(Redirect::to("/subscribe"))
}

/// GET /subscribe: provision webhooks for every configured space.
async fn subscribe_handler(State(state): State<WebState>) -> Result<Html<String>> {
    let provisioning = subscribe::provision(
        &state.session,
        &state.spaces,
        &state.webhook_uri,
        state.webhook_secret.expose(),
    )
    .await?;
    let page = SubscribedPage {
        provisioning: &provisioning,
    };
    Ok(Html(page.render()?))
}

/// GET|POST /webhook: authenticate and dispatch one event.
///
/// A bad signature is answered with 401; every other outcome is acknowledged
/// so Webex does not retry deliveries the bridge chose not to forward.
async fn webhook(State(state): State<WebState>, headers: HeaderMap, body: Bytes) -> Response {
    let event_id = format!("evt_{}", uuid::Uuid::new_v4().as_simple());
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state.dispatcher.handle(&body, signature).await;
    match &outcome {
        Outcome::Delivered { attempted, failed } => {
            info!(event_id, attempted, failed, "webhook handled");
        }
        other => info!(event_id, outcome = other.label(), "webhook handled"),
    }

    if outcome == Outcome::Rejected {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match AckPage.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => crate::error::Error::from(e).into_response(),
    }
}
