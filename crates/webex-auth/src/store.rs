//! Process-wide token storage
//!
//! Holds the single live access/refresh pair for the integration. The grant
//! callback installs a pair; the refresh coordinator replaces the access token
//! through `compare_and_swap`, which only succeeds when the caller saw the
//! token currently in the store. A refresh guard serializes refresh exchanges
//! so concurrent 401s produce one exchange.
//!
//! When a token file is configured, every change is persisted with an atomic
//! temp-file + rename write. Memory is authoritative: a failed write is logged
//! and the in-memory state still changes.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Access/refresh token pair. Replaced wholesale, never patched in place.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

/// Authorization state of the integration.
///
/// Transitions:
/// - Unauthorized → Authorized (grant exchange)
/// - Authorized → Authorized (access token refreshed)
/// - Authorized → ReauthorizationRequired (refresh token rejected)
/// - ReauthorizationRequired → Authorized (new grant exchange)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    Unauthorized,
    Authorized(TokenPair),
    ReauthorizationRequired,
}

impl TokenState {
    /// Status label for health/logging.
    pub fn label(&self) -> &'static str {
        match self {
            TokenState::Unauthorized => "unauthorized",
            TokenState::Authorized(_) => "authorized",
            TokenState::ReauthorizationRequired => "reauthorization_required",
        }
    }
}

/// Guarded token store shared by all request handlers.
pub struct TokenStore {
    path: Option<PathBuf>,
    state: RwLock<TokenState>,
    refresh_guard: Mutex<()>,
}

impl TokenStore {
    /// Store that lives only in memory. A restart requires a new grant.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(TokenState::Unauthorized),
            refresh_guard: Mutex::new(()),
        }
    }

    /// Load a previously granted pair from `path`.
    ///
    /// A missing file is a cold start: the store begins `Unauthorized` and the
    /// file is created on the first grant.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading token file: {e}")))?;
            let pair: TokenPair = serde_json::from_str(&contents)
                .map_err(|e| Error::TokenFileParse(format!("parsing token file: {e}")))?;
            info!(path = %path.display(), "loaded token pair");
            TokenState::Authorized(pair)
        } else {
            info!(path = %path.display(), "token file not found, awaiting grant");
            TokenState::Unauthorized
        };

        Ok(Self {
            path: Some(path),
            state: RwLock::new(state),
            refresh_guard: Mutex::new(()),
        })
    }

    /// Snapshot of the current state.
    pub async fn state(&self) -> TokenState {
        self.state.read().await.clone()
    }

    /// Install a pair from a completed grant, replacing any previous state.
    pub async fn install(&self, pair: TokenPair) {
        let mut state = self.state.write().await;
        self.persist(&pair).await;
        *state = TokenState::Authorized(pair);
        info!("token pair installed");
    }

    /// Replace the pair only if the live access token is still `expected_access`.
    ///
    /// Returns `false` when another caller already replaced it (or the store
    /// left the authorized state), leaving the store untouched.
    pub async fn compare_and_swap(&self, expected_access: &str, pair: TokenPair) -> bool {
        let mut state = self.state.write().await;
        match &*state {
            TokenState::Authorized(current) if current.access_token == expected_access => {
                self.persist(&pair).await;
                *state = TokenState::Authorized(pair);
                debug!("access token swapped");
                true
            }
            _ => false,
        }
    }

    /// Move to `ReauthorizationRequired` if the live access token is still
    /// `expected_access`. Returns whether the transition happened.
    pub async fn require_reauthorization(&self, expected_access: &str) -> bool {
        let mut state = self.state.write().await;
        match &*state {
            TokenState::Authorized(current) if current.access_token == expected_access => {
                *state = TokenState::ReauthorizationRequired;
                warn!("refresh token rejected, reauthorization required");
                true
            }
            _ => false,
        }
    }

    /// Serialize refresh exchanges. Hold the guard across read-exchange-swap.
    pub async fn lock_refresh(&self) -> MutexGuard<'_, ()> {
        self.refresh_guard.lock().await
    }

    async fn persist(&self, pair: &TokenPair) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = write_atomic(path, pair).await {
            warn!(path = %path.display(), error = %e, "failed to persist token pair");
        }
    }
}

/// Write the pair atomically with 0600 permissions.
async fn write_atomic(path: &Path, pair: &TokenPair) -> Result<()> {
    let json = serde_json::to_string_pretty(pair)
        .map_err(|e| Error::TokenFileParse(format!("serializing token pair: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("token path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".tokens.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp token file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting token file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp token file: {e}")))?;

    debug!(path = %path.display(), "persisted token pair");
    Ok(())
}
