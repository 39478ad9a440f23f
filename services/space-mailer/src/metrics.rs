//! Prometheus metrics exposition
//!
//! - `mailer_webhook_events_total` (counter): label `outcome`
//! - `mailer_deliveries_total` (counter): label `outcome`
//! - `webex_token_refresh_total` (counter): label `outcome`, recorded by `webex-api`
//!
//! `Stats` keeps the same totals in atomics for the `/health` body.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder and return a handle for rendering.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Record one inbound webhook request by how it was handled.
pub fn record_webhook_event(outcome: &'static str) {
    metrics::counter!("mailer_webhook_events_total", "outcome" => outcome).increment(1);
}

/// Record one email delivery attempt.
pub fn record_delivery(outcome: &'static str) {
    metrics::counter!("mailer_deliveries_total", "outcome" => outcome).increment(1);
}

/// Process-lifetime counters reported by `/health`.
#[derive(Debug)]
pub struct Stats {
    pub started_at: Instant,
    pub webhook_events: AtomicU64,
    pub deliveries_sent: AtomicU64,
    pub deliveries_failed: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            webhook_events: AtomicU64::new(0),
            deliveries_sent: AtomicU64::new(0),
            deliveries_failed: AtomicU64::new(0),
        }
    }

    pub fn webhook_event(&self, outcome: &'static str) {
        self.webhook_events.fetch_add(1, Ordering::Relaxed);
        record_webhook_event(outcome);
    }

    pub fn delivery(&self, delivered: bool) {
        if delivered {
            self.deliveries_sent.fetch_add(1, Ordering::Relaxed);
            record_delivery("sent");
        } else {
            self.deliveries_failed.fetch_add(1, Ordering::Relaxed);
            record_delivery("failed");
        }
    }
}
