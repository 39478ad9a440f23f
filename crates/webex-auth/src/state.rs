//! Anti-forgery `state` values for the authorization-code grant
//!
//! A fresh state is issued every time the landing page renders and is echoed
//! back by Webex on the redirect. The callback only exchanges the code when
//! the echoed value matches one we issued.

use rand::RngExt;
use rand::distr::Alphanumeric;

use crate::constants::STATE_LEN;
use crate::error::{Error, Result};

/// Generate a random alphanumeric state value of `STATE_LEN` characters.
pub fn generate_state() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(STATE_LEN)
        .map(char::from)
        .collect()
}

/// Compare an echoed state against an issued one in constant time.
pub fn states_match(issued: &str, returned: &str) -> bool {
    common::constant_time_eq(issued.as_bytes(), returned.as_bytes())
}

/// Build the consent URL the user follows to grant access.
pub fn build_authorization_url(
    authorize_url: &str,
    client_id: &str,
    redirect_uri: &str,
    scopes: &str,
    state: &str,
) -> Result<String> {
    let url = reqwest::Url::parse_with_params(
        authorize_url,
        &[
            ("client_id", client_id),
            ("response_type", "code"),
            ("redirect_uri", redirect_uri),
            ("scope", scopes),
            ("state", state),
        ],
    )
    .map_err(|e| Error::InvalidUrl(format!("{authorize_url}: {e}")))?;
    Ok(url.into())
}
