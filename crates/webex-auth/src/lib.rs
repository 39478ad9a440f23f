//! Webex OAuth authentication library
//!
//! Provides the pieces of the authorization-code grant: anti-forgery state
//! values, the consent URL, code exchange and refresh against the token
//! endpoint, and the process-wide token store.
//!
//! Grant flow:
//! 1. Landing page calls `state::generate_state()` and `OAuthClient::authorization_url()`
//! 2. User consents; Webex redirects back with `state` and `code`
//! 3. Callback verifies the state, then `OAuthClient::exchange_code()`
//! 4. Resulting pair installed via `TokenStore::install()`
//! 5. On a 401 from the API, `OAuthClient::refresh_access_token()` and
//!    `TokenStore::compare_and_swap()` replace the access token

pub mod constants;
pub mod error;
pub mod state;
pub mod store;
pub mod token;

pub use constants::*;
pub use error::{Error, Result};
pub use state::{generate_state, states_match};
pub use store::{TokenPair, TokenState, TokenStore};
pub use token::{ClientCredentials, OAuthClient, TokenResponse};
