use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{error, warn};

/// Errors surfaced by the relay to HTTP callers
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The inbound request carried no `destination` query parameter
    #[error("Missing destination query parameter")]
    MissingDestination,

    /// The destination is not a fetchable http(s) URL
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    /// The upstream could not be reached or the exchange broke before headers arrived
    #[error("Failed to fetch from upstream: {0}")]
    UpstreamFetch(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::MissingDestination | RelayError::InvalidDestination(_) => {
                StatusCode::BAD_REQUEST
            }
            RelayError::UpstreamFetch(_) => StatusCode::BAD_GATEWAY,
            RelayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", self);
        } else {
            warn!("{}", self);
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
