use crate::protocol::error_shapes::openai_error_payload;

/// Error type shared by every relay stage.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),
    #[error("Upstream error: status={status}, message={message}")]
    Upstream { status: u16, message: String },
    #[error("Upstream did not respond within {0}s")]
    Timeout(u64),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Client closed the request")]
    ClientClosed,
}

/// Non-standard status recorded when the client went away first.
const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Broad error category for status code and error-type selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    NotFound,
    Authentication,
    Permission,
    RateLimit,
    Timeout,
    ServerError,
    Unknown,
}

/// Map an upstream HTTP status code to an error category.
#[must_use]
pub fn category_from_upstream_status(status: u16) -> ErrorCategory {
    match status {
        400 | 413 | 422 => ErrorCategory::InvalidRequest,
        401 => ErrorCategory::Authentication,
        403 => ErrorCategory::Permission,
        404 => ErrorCategory::NotFound,
        408 | 504 => ErrorCategory::Timeout,
        429 => ErrorCategory::RateLimit,
        500..=599 => ErrorCategory::ServerError,
        _ => ErrorCategory::Unknown,
    }
}

impl RelayError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            RelayError::InvalidRequest(_)
            | RelayError::PayloadTooLarge(_)
            | RelayError::ClientClosed => ErrorCategory::InvalidRequest,
            RelayError::NotFound(_) => ErrorCategory::NotFound,
            RelayError::Timeout(_) => ErrorCategory::Timeout,
            RelayError::Config(_) | RelayError::Transport(_) | RelayError::Internal(_) => {
                ErrorCategory::ServerError
            }
            RelayError::Upstream { status, .. } => category_from_upstream_status(*status),
        }
    }

    /// HTTP status returned to the client. Upstream failures mirror the
    /// upstream status verbatim.
    #[must_use]
    pub fn status_code(&self) -> http::StatusCode {
        match self {
            RelayError::InvalidRequest(_) => http::StatusCode::BAD_REQUEST,
            RelayError::NotFound(_) => http::StatusCode::NOT_FOUND,
            RelayError::PayloadTooLarge(_) => http::StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::Timeout(_) => http::StatusCode::GATEWAY_TIMEOUT,
            RelayError::ClientClosed => http::StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
                .unwrap_or(http::StatusCode::BAD_REQUEST),
            RelayError::Upstream { status, .. } => http::StatusCode::from_u16(*status)
                .unwrap_or(http::StatusCode::BAD_GATEWAY),
            RelayError::Config(_) | RelayError::Transport(_) | RelayError::Internal(_) => {
                http::StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message placed in the client-facing error body.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            RelayError::Upstream { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Format an error as `(status, OpenAI-shaped JSON body)`.
#[must_use]
pub fn format_error(err: &RelayError) -> (http::StatusCode, serde_json::Value) {
    let body = openai_error_payload(err.category(), &err.client_message());
    (err.status_code(), body)
}

/// Convert a `RelayError` into an axum response.
#[must_use]
pub fn into_axum_response(err: &RelayError) -> axum::response::Response {
    use axum::response::IntoResponse;
    let (status, body) = format_error(err);
    (status, axum::Json(body)).into_response()
}

impl axum::response::IntoResponse for RelayError {
    fn into_response(self) -> axum::response::Response {
        into_axum_response(&self)
    }
}
