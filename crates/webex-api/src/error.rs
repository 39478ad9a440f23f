//! Error types for Webex API operations

/// Errors from API operations. A 401 is not an error here; it is
/// `Reply::Unauthorized` until the refresh retry has been spent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{op}: HTTP request failed: {message}")]
    Http { op: &'static str, message: String },

    #[error("{op}: provider returned {status}: {body}")]
    Status {
        op: &'static str,
        status: u16,
        body: String,
    },

    #[error("{op}: undecodable response: {message}")]
    Decode { op: &'static str, message: String },

    #[error("{op}: access token rejected after refresh")]
    Unauthorized { op: &'static str },

    #[error("integration has not been authorized yet")]
    NotAuthorized,

    #[error("refresh token rejected, reauthorization required")]
    ReauthorizationRequired,

    #[error("token refresh failed: {0}")]
    Refresh(#[source] webex_auth::Error),
}

impl Error {
    /// Whether the only way forward is a new grant through the landing page.
    pub fn needs_grant(&self) -> bool {
        matches!(self, Error::NotAuthorized | Error::ReauthorizationRequired)
    }
}

/// Result alias for API operations.
pub type Result<T> = std::result::Result<T, Error>;
