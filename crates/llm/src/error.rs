//! Gateway-wide error taxonomy (§7) and its Anthropic-shaped HTTP envelope.
//!
//! One `thiserror::Error` enum carrying both the HTTP status and the
//! Anthropic `error.type` string, with an `IntoResponse` impl so handlers
//! can just `?` their way out.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::protocol::anthropic::error::{Error as AnthropicError, ErrorResponse};

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors surfaced to a caller of this gateway, mapped from §7's taxonomy:
/// authentication/invalid-request/rate-limit/overloaded/api/network/cancelled.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("upstream overloaded: {0}")]
    Overloaded(String),

    #[error("upstream error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    /// The node this request belonged to was cancelled (branch/tree cancel,
    /// client disconnect). Never surfaced as an HTTP error body - callers
    /// close the stream (or drop the response) instead of rendering this.
    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimit(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Overloaded(_) => StatusCode::from_u16(529).unwrap_or(StatusCode::SERVICE_UNAVAILABLE),
            Self::Api { status, .. } => StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
            Self::Network(_) => StatusCode::BAD_GATEWAY,
            Self::Cancelled | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Maps this error onto the Anthropic `error.type` taxonomy the client
    /// expects in both the JSON envelope and a streamed `error` event.
    pub fn to_anthropic_error(&self) -> AnthropicError {
        match self {
            Self::Authentication(message) => AnthropicError::authentication_error(message.clone()),
            Self::InvalidRequest(message) => AnthropicError::invalid_request_error(message.clone()),
            Self::RateLimit(message) => AnthropicError::rate_limit_error(message.clone()),
            Self::Overloaded(message) => AnthropicError::overloaded_error(message.clone()),
            Self::Api { message, .. } => AnthropicError::api_error(message.clone()),
            Self::Network(message) => AnthropicError::api_error(message.clone()),
            Self::Cancelled => AnthropicError::api_error("cancelled"),
            Self::Internal(message) => AnthropicError::api_error(message.clone()),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse { request_id: None, error: self.to_anthropic_error() };

        (status, Json(body)).into_response()
    }
}

/// Classifies an upstream HTTP status code into the gateway's taxonomy
/// (§7), given the response body text for the "overloaded" 5xx heuristic.
pub fn classify_upstream_status(status: u16, body: &str) -> GatewayError {
    match status {
        401 | 403 => GatewayError::Authentication(body.to_string()),
        400 => GatewayError::InvalidRequest(body.to_string()),
        429 => GatewayError::RateLimit(body.to_string()),
        500..=599 if body.to_lowercase().contains("overloaded") || body.to_lowercase().contains("capacity") => {
            GatewayError::Overloaded(body.to_string())
        }
        _ => GatewayError::Api { status, message: body.to_string() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overloaded_heuristic_matches_capacity_wording() {
        let error = classify_upstream_status(503, "server overloaded, try again");
        assert!(matches!(error, GatewayError::Overloaded(_)));
    }

    #[test]
    fn unmatched_5xx_falls_back_to_api_error() {
        let error = classify_upstream_status(502, "bad gateway");
        assert!(matches!(error, GatewayError::Api { status: 502, .. }));
    }

    #[test]
    fn status_code_maps_rate_limit_to_429() {
        assert_eq!(GatewayError::RateLimit("x".to_string()).status_code(), StatusCode::TOO_MANY_REQUESTS);
    }
}
