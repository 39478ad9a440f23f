//! Webex OAuth constants
//!
//! Endpoint paths are relative to the configurable API base so tests and
//! staging environments can point the integration elsewhere.

/// Production Webex REST API base
pub const DEFAULT_API_BASE: &str = "https://webexapis.com/v1";

/// Token endpoint (code exchange and refresh), relative to the API base
pub const TOKEN_PATH: &str = "access_token";

/// Consent endpoint, relative to the API base
pub const AUTHORIZE_PATH: &str = "authorize";

/// Scope requested when the configuration does not override it.
/// Webhook management and message reads both fall under `spark:all`.
pub const DEFAULT_SCOPES: &str = "spark:all";

/// Length of the anti-forgery `state` value issued per grant attempt
pub const STATE_LEN: usize = 15;

/// Join an API base and a relative path without doubling slashes.
pub fn endpoint(api_base: &str, path: &str) -> String {
    format!("{}/{}", api_base.trim_end_matches('/'), path.trim_start_matches('/'))
}
