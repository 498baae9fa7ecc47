//! Error types for squall-core
//!
//! Every error that escapes a handler is turned into a response at the
//! composition boundary with [`Error::into_response`].

use crate::response::{Response, ResponseBuilder, StatusCode};
use crate::schema::Issue;
use crate::socket::SocketError;
use thiserror::Error;

/// Result type alias for squall operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error types for routing, handlers and the server adapter
#[derive(Debug, Error)]
pub enum Error {
    /// No route set is mounted at the path
    #[error("Route not found: {path}")]
    RouteNotFound { path: String },

    /// A route set matched but holds no content route
    #[error("Not acceptable: {path}")]
    NotAcceptable { path: String },

    /// Content routes exist but none accepts the method
    #[error("Method not allowed: {method} {path}")]
    MethodNotAllowed {
        method: String,
        path: String,
        allow: Vec<String>,
    },

    /// Request method outside the supported set
    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    /// Path params, query, headers or payload failed their schema
    #[error("Decode error: {} issue(s)", .0.len())]
    Decode(Vec<Issue>),

    /// Handler-declared failure with an explicit status
    #[error("{status}: {message}")]
    Status { status: StatusCode, message: String },

    /// Invalid path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// WebSocket operation failed
    #[error(transparent)]
    Socket(#[from] SocketError),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Native server error
    #[error(transparent)]
    Native(#[from] squall_native::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Failure with an explicit status and message
    pub fn http(status: impl Into<StatusCode>, message: impl Into<String>) -> Self {
        Error::Status {
            status: status.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }

    /// Status code this error answers with
    pub fn status(&self) -> StatusCode {
        match self {
            Error::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Error::NotAcceptable { .. } => StatusCode::NOT_ACCEPTABLE,
            Error::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Error::UnsupportedMethod(_) => StatusCode::NOT_IMPLEMENTED,
            Error::Decode(_) => StatusCode::BAD_REQUEST,
            Error::InvalidPath(_) => StatusCode::BAD_REQUEST,
            Error::Status { status, .. } => *status,
            Error::Native(squall_native::Error::BodyTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert to a response
    ///
    /// Server errors answer with a generic body; details stay in the logs.
    pub fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Error::Decode(issues) => {
                let body = serde_json::json!({
                    "error": "DecodeError",
                    "issues": issues,
                });
                ResponseBuilder::new(status)
                    .header("content-type", "application/json")
                    .body(body.to_string())
                    .build()
            }
            Error::MethodNotAllowed { allow, .. } => ResponseBuilder::new(status)
                .header("allow", allow.join(", "))
                .header("content-type", "text/plain; charset=utf-8")
                .body(status.reason_phrase())
                .build(),
            Error::Status { message, .. } if !status.is_server_error() => ResponseBuilder::new(status)
                .header("content-type", "text/plain; charset=utf-8")
                .body(message)
                .build(),
            _ => ResponseBuilder::new(status)
                .header("content-type", "text/plain; charset=utf-8")
                .body(status.reason_phrase())
                .build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::RouteNotFound { path: "/".into() }.status(), StatusCode::NOT_FOUND);
        assert_eq!(Error::NotAcceptable { path: "/".into() }.status(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(Error::Decode(vec![]).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Error::Native(squall_native::Error::BodyTooLarge { limit: 1 }).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(Error::internal("boom").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_decode_error_body() {
        let res = Error::Decode(vec![Issue::new("id", "Expected integer")]).into_response();
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert_eq!(res.content_type(), Some("application/json"));

        let body: serde_json::Value = serde_json::from_str(&res.body_string().unwrap()).unwrap();
        assert_eq!(body["error"], "DecodeError");
        assert_eq!(body["issues"][0]["path"], "id");
    }

    #[test]
    fn test_internal_error_is_generic() {
        let res = Error::internal("database password is hunter2").into_response();
        assert_eq!(res.body_string().as_deref(), Some("Internal Server Error"));
    }

    #[test]
    fn test_method_not_allowed_lists_methods() {
        let res = Error::MethodNotAllowed {
            method: "DELETE".into(),
            path: "/users".into(),
            allow: vec!["GET".into(), "POST".into()],
        }
        .into_response();
        assert_eq!(res.header("allow"), Some("GET, POST"));
    }
}
