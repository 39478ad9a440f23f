//! Webex Space Mailer
//!
//! Single-binary service that:
//! 1. Walks an operator through the Webex OAuth grant
//! 2. Registers `messages/created` webhooks for the configured spaces
//! 3. Verifies each inbound webhook's signature
//! 4. Emails new messages to the recipients configured for their space

mod config;
mod dispatch;
mod error;
mod grant;
mod mailer;
mod metrics;
mod pages;
mod signature;
mod subscribe;
mod web;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use webex_api::{ApiClient, Session};
use webex_auth::{ClientCredentials, OAuthClient, TokenState, TokenStore};

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::grant::{PendingGrants, STATE_TTL};
use crate::mailer::SmtpMailer;
use crate::metrics::Stats;
use crate::web::{WebState, build_web_router};

/// How long in-flight requests get to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// State for the operational endpoints
#[derive(Clone)]
struct AppState {
    store: Arc<TokenStore>,
    stats: Arc<Stats>,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// The concurrency limit applies to every route, webhooks included.
fn build_router(state: AppState, web: WebState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .merge(build_web_router(web))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs, filter from LOG_LEVEL then RUST_LOG
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting space-mailer");

    // Install before any metric is emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        api_base_url = %config.webex.api_base_url,
        webhook_uri = %config.webex.webhook_uri,
        smtp_host = %config.smtp.host,
        spaces = config.spaces.len(),
        persistent_tokens = config.webex.token_file.is_some(),
        "configuration loaded"
    );

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.webex.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let store = match &config.webex.token_file {
        Some(path) => TokenStore::load(path.clone())
            .await
            .with_context(|| format!("failed to load token file {}", path.display()))?,
        None => TokenStore::in_memory(),
    };
    let store = Arc::new(store);
    info!(token_state = store.state().await.label(), "token store ready");

    let oauth = OAuthClient::new(
        http.clone(),
        config.webex.api_base_url.clone(),
        ClientCredentials {
            client_id: config.webex.client_id.clone(),
            client_secret: config.webex.client_secret.clone(),
            redirect_uri: config.webex.redirect_uri.clone(),
            scopes: config.webex.scopes.clone(),
        },
    );
    let api = ApiClient::new(http, config.webex.api_base_url.clone());
    let session = Arc::new(Session::new(api, oauth, store.clone()));

    let mailer = Arc::new(SmtpMailer::new(&config.smtp).context("failed to set up SMTP mailer")?);
    let stats = Arc::new(Stats::new());
    let spaces = Arc::new(config.spaces);

    let dispatcher = Arc::new(Dispatcher::new(
        session.clone(),
        spaces.clone(),
        mailer,
        config.webex.webhook_secret.clone(),
        stats.clone(),
    ));

    let web_state = WebState {
        session,
        grants: Arc::new(PendingGrants::new(STATE_TTL)),
        dispatcher,
        spaces,
        webhook_uri: Arc::from(config.webex.webhook_uri.as_str()),
        webhook_secret: config.webex.webhook_secret.clone(),
    };
    let app_state = AppState {
        store,
        stats,
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, web_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timer starts at signal receipt, not at server start
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    info!("shutdown complete");
    Ok(())
}

/// Health endpoint: token state, uptime and delivery counters.
///
/// Returns 200 while authorized, 503 while waiting for a (new) grant since
/// no event can be forwarded until then.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let token_state = state.store.state().await;
    let healthy = matches!(token_state, TokenState::Authorized(_));

    let body = serde_json::json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "token_state": token_state.label(),
        "uptime_seconds": state.stats.started_at.elapsed().as_secs(),
        "webhook_events": state.stats.webhook_events.load(Ordering::Relaxed),
        "deliveries_sent": state.stats.deliveries_sent.load(Ordering::Relaxed),
        "deliveries_failed": state.stats.deliveries_failed.load(Ordering::Relaxed),
    });
    let status = if healthy {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
