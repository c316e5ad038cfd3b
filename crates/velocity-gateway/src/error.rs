//! Error types for the gateway.
//!
//! [`GatewayError`] covers every way a client request can fail. It converts
//! into an HTTP response via [`IntoResponse`] and into a `WebSocket`
//! `error` frame via its `Display` text, so both transports report the same
//! message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use velocity_core::ControllerError;

use crate::protocol::ProtocolError;

/// Errors that can occur while handling a client request.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The request was malformed or incomplete.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The request named a junction that is not configured.
    #[error("Unknown junction: {0}")]
    UnknownJunction(String),

    /// The junction's worker is not running.
    #[error("controller unavailable: {0}")]
    Controller(#[from] ControllerError),
}

impl GatewayError {
    /// HTTP status this error maps to.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Protocol(_) => StatusCode::BAD_REQUEST,
            Self::UnknownJunction(_) => StatusCode::NOT_FOUND,
            Self::Controller(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = serde_json::json!({
            "success": false,
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use velocity_types::JunctionId;

    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(
            GatewayError::UnknownJunction("x".to_owned()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::Protocol(ProtocolError::NoBody).status(),
            StatusCode::BAD_REQUEST
        );
        let gone = ControllerError::WorkerGone {
            junction_id: JunctionId::from("j1"),
        };
        assert_eq!(
            GatewayError::from(gone).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn unknown_junction_message_names_the_id() {
        let err = GatewayError::UnknownJunction("junction9".to_owned());
        assert_eq!(err.to_string(), "Unknown junction: junction9");
    }
}
