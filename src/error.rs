//! # Error Handling
//!
//! Two families of errors live here:
//!
//! - **AppError**: failures of the HTTP surface and its upstream collaborators,
//!   converted into JSON responses through actix's `ResponseError`.
//! - **BridgeError**: failures of a connection inside a running bridge session.
//!   These end exactly one session and are only ever logged.
//!
//! Per-frame problems (bad JSON, bad base64, unsupported resampling) have their
//! own error types next to the code that produces them, and never reach here.
//!
//! ## JSON Response Format:
//! ```json
//! {
//!   "error": {
//!     "type": "upstream_error",
//!     "message": "assistant call returned HTTP 401",
//!     "timestamp": "2025-01-01T12:00:00Z"
//!   }
//! }
//! ```

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;
use std::time::Duration;

/// Errors returned by HTTP handlers and outbound clients.
#[derive(Debug)]
pub enum AppError {
    /// Server-side problems
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// An external API (assistant, ngrok) failed or answered unexpectedly
    Upstream(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// User input failed validation rules
    ValidationError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Upstream(msg) => write!(f, "Upstream error: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Map each error to a status code and a machine-readable type.
///
/// - Internal/ConfigError → 500
/// - BadRequest/ValidationError → 400
/// - Upstream → 502
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::Internal(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
            AppError::BadRequest(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "bad_request",
                msg.clone(),
            ),
            AppError::Upstream(msg) => (
                actix_web::http::StatusCode::BAD_GATEWAY,
                "upstream_error",
                msg.clone(),
            ),
            AppError::ConfigError(msg) => (
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                msg.clone(),
            ),
            AppError::ValidationError(msg) => (
                actix_web::http::StatusCode::BAD_REQUEST,
                "validation_error",
                msg.clone(),
            ),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// JSON parsing errors are almost always the client's fault, hence 400.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Transport-level failures talking to an external API.
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => AppError::Upstream(format!("HTTP {}: {}", status.as_u16(), err)),
            None => AppError::Upstream(err.to_string()),
        }
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;

/// Errors that terminate a bridge session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The socket reported an error while reading or writing
    Transport(String),

    /// An outbound send did not complete in time
    SendTimeout(Duration),

    /// The connection is already gone
    Closed,

    /// An outbound envelope could not be serialised
    Encode(String),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Transport(msg) => write!(f, "transport error: {}", msg),
            BridgeError::SendTimeout(timeout) => {
                write!(f, "send did not complete within {}ms", timeout.as_millis())
            }
            BridgeError::Closed => write!(f, "connection closed"),
            BridgeError::Encode(msg) => write!(f, "failed to encode frame: {}", msg),
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<tokio_tungstenite::tungstenite::Error> for BridgeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => BridgeError::Closed,
            other => BridgeError::Transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::Upstream("down".into()).error_response().status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::ValidationError("bad".into()).error_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::ConfigError("missing".into()).error_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_tungstenite_close_maps_to_closed() {
        let err: BridgeError = tokio_tungstenite::tungstenite::Error::ConnectionClosed.into();
        assert_eq!(err, BridgeError::Closed);
    }

    #[test]
    fn test_bridge_error_display() {
        let err = BridgeError::SendTimeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "send did not complete within 1500ms");
    }
}
