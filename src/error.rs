use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::envelope::Envelope;

/// Every failure the proxy and the client library can surface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CafeError {
    /// Required configuration is absent. Not retryable without a redeploy.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network failure or non-2xx HTTP status.
    #[error("{0}")]
    Transport(String),

    /// The response body did not have the expected envelope shape.
    #[error("Unexpected response: {0}")]
    Decode(String),

    /// The backend answered with `success: false`.
    #[error("{0}")]
    Backend(String),

    /// Caller input rejected before any network call.
    #[error("{0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl CafeError {
    /// Whether re-invoking the same operation (manually or on the next timer
    /// tick) may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CafeError::Transport(_) | CafeError::Decode(_) | CafeError::Backend(_)
        )
    }

    fn status(&self) -> StatusCode {
        match self {
            CafeError::Validation(_) => StatusCode::BAD_REQUEST,
            CafeError::Decode(_) => StatusCode::BAD_GATEWAY,
            CafeError::Config(_)
            | CafeError::Transport(_)
            | CafeError::Backend(_)
            | CafeError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<rusqlite::Error> for CafeError {
    fn from(e: rusqlite::Error) -> Self {
        CafeError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for CafeError {
    fn from(e: serde_json::Error) -> Self {
        CafeError::Decode(e.to_string())
    }
}

impl IntoResponse for CafeError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(Envelope::failure(self.to_string()))).into_response()
    }
}
