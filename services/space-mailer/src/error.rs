//! Service-specific error types
//!
//! Handler failures render as an HTML error page. Failures caused by a
//! missing or revoked grant link back to `/` so an operator can consent again.

use askama::Template;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use crate::pages::ErrorPage;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Webex API error: {0}")]
    Api(#[from] webex_api::Error),

    #[error("authorization failed: {0}")]
    Auth(#[from] webex_auth::Error),

    #[error("page rendering failed: {0}")]
    Render(#[from] askama::Error),
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Error::Api(e) if e.needs_grant() => StatusCode::UNAUTHORIZED,
            Error::Api(_) | Error::Auth(_) => StatusCode::BAD_GATEWAY,
            Error::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn needs_grant(&self) -> bool {
        matches!(self, Error::Api(e) if e.needs_grant())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "request needs a new grant");
        }

        let page = ErrorPage {
            detail: self.to_string(),
            reauthorize: self.needs_grant(),
        };
        match page.render() {
            Ok(html) => (status, Html(html)).into_response(),
            Err(e) => {
                error!(error = %e, "failed to render error page");
                (status, self.to_string()).into_response()
            }
        }
    }
}
