//! Pending anti-forgery states for the authorization-code grant
//!
//! Every render of the landing page issues a fresh state. Several may be
//! outstanding at once (two browser tabs, a reload); each is single-use and
//! expires after `STATE_TTL`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Maximum age of an issued state before the callback must be restarted.
pub const STATE_TTL: Duration = Duration::from_secs(600);

/// Upper bound on outstanding states; the oldest is evicted beyond it.
const MAX_PENDING: usize = 64;

/// When a state was issued. `seq` orders states issued within the same instant.
#[derive(Clone, Copy)]
struct Issued {
    at: Instant,
    seq: u64,
}

#[derive(Default)]
struct Pending {
    states: HashMap<String, Issued>,
    next_seq: u64,
}

impl Pending {
    fn expire(&mut self, ttl: Duration) {
        self.states.retain(|_, issued| issued.at.elapsed() < ttl);
    }
}

pub struct PendingGrants {
    ttl: Duration,
    pending: Mutex<Pending>,
}

impl PendingGrants {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pending: Mutex::new(Pending::default()),
        }
    }

    /// Issue and record a new state.
    pub async fn issue(&self) -> String {
        let state = webex_auth::generate_state();
        let mut pending = self.pending.lock().await;
        pending.expire(self.ttl);
        if pending.states.len() >= MAX_PENDING {
            if let Some(oldest) = pending
                .states
                .iter()
                .min_by_key(|(_, issued)| issued.seq)
                .map(|(s, _)| s.clone())
            {
                pending.states.remove(&oldest);
                debug!("evicted oldest pending grant state");
            }
        }
        let seq = pending.next_seq;
        pending.next_seq += 1;
        pending.states.insert(
            state.clone(),
            Issued {
                at: Instant::now(),
                seq,
            },
        );
        state
    }

    /// Consume `returned` if it matches an unexpired issued state.
    ///
    /// Every pending state is compared in constant time; the match, if any,
    /// is removed so the same state cannot complete two grants.
    pub async fn consume(&self, returned: &str) -> bool {
        let mut pending = self.pending.lock().await;
        pending.expire(self.ttl);

        let mut matched = None;
        for issued in pending.states.keys() {
            if webex_auth::states_match(issued, returned) {
                matched = Some(issued.clone());
            }
        }
        match matched {
            Some(issued) => {
                pending.states.remove(&issued);
                info!("grant state accepted");
                true
            }
            None => {
                warn!(pending = pending.states.len(), "grant state rejected");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn issued_state_is_accepted_once() {
        let grants = PendingGrants::new(STATE_TTL);
        let state = grants.issue().await;
        assert_eq!(state.len(), webex_auth::STATE_LEN);

        assert!(grants.consume(&state).await);
        assert!(!grants.consume(&state).await, "states are single-use");
    }

    #[tokio::test]
    async fn fabricated_state_is_rejected() {
        let grants = PendingGrants::new(STATE_TTL);
        let state = grants.issue().await;

        assert!(!grants.consume("forged-state-00").await);
        assert!(!grants.consume("").await);
        assert!(grants.consume(&state).await, "a failed attempt does not consume the real state");
    }

    #[tokio::test]
    async fn overlapping_page_loads_both_complete() {
        let grants = PendingGrants::new(STATE_TTL);
        let first = grants.issue().await;
        let second = grants.issue().await;
        assert_ne!(first, second);

        assert!(grants.consume(&first).await);
        assert!(grants.consume(&second).await);
    }

    #[tokio::test]
    async fn expired_state_is_rejected() {
        let grants = PendingGrants::new(Duration::ZERO);
        let state = grants.issue().await;
        assert!(!grants.consume(&state).await);
    }

    #[tokio::test]
    async fn oldest_state_is_evicted_at_capacity() {
        let grants = PendingGrants::new(STATE_TTL);
        let oldest = grants.issue().await;
        let mut newest = String::new();
        for _ in 0..MAX_PENDING {
            newest = grants.issue().await;
        }

        assert!(!grants.consume(&oldest).await);
        assert!(grants.consume(&newest).await);
    }
}
