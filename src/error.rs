use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Main error type for the relay service
#[derive(Debug)]
pub enum RelayError {
    /// Configuration or CLI argument errors
    Config(String),

    /// Datagram transport errors (connect, send)
    Transport(String),

    /// Downstream push-notification errors
    Notify(String),

    /// API/HTTP related errors
    Api(String),

    /// System I/O errors
    Io(std::io::Error),

    /// JSON serialization/deserialization errors
    Serialization(serde_json::Error),

    /// Background task join failures
    Concurrency(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Config(msg) => write!(f, "Configuration error: {}", msg),
            RelayError::Transport(msg) => write!(f, "Transport error: {}", msg),
            RelayError::Notify(msg) => write!(f, "Notification error: {}", msg),
            RelayError::Api(msg) => write!(f, "API error: {}", msg),
            RelayError::Io(err) => write!(f, "I/O error: {}", err),
            RelayError::Serialization(err) => write!(f, "Serialization error: {}", err),
            RelayError::Concurrency(msg) => write!(f, "Concurrency error: {}", msg),
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RelayError::Io(err) => Some(err),
            RelayError::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let error_response = json!({
            "error": {
                "code": status_code.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
            }
        });

        (status_code, Json(error_response)).into_response()
    }
}

impl RelayError {
    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::Config(_) => StatusCode::BAD_REQUEST,
            RelayError::Api(_) => StatusCode::BAD_REQUEST,
            RelayError::Transport(_) => StatusCode::BAD_GATEWAY,
            RelayError::Notify(_) => StatusCode::BAD_GATEWAY,
            RelayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::Concurrency(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            RelayError::Config(_) => "configuration_error",
            RelayError::Transport(_) => "transport_error",
            RelayError::Notify(_) => "notify_error",
            RelayError::Api(_) => "api_error",
            RelayError::Io(_) => "io_error",
            RelayError::Serialization(_) => "serialization_error",
            RelayError::Concurrency(_) => "concurrency_error",
        }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Io(err)
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Serialization(err)
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::Notify(err.to_string())
    }
}

impl From<std::net::AddrParseError> for RelayError {
    fn from(err: std::net::AddrParseError) -> Self {
        RelayError::Config(format!("Invalid address: {}", err))
    }
}

impl From<tokio::task::JoinError> for RelayError {
    fn from(err: tokio::task::JoinError) -> Self {
        RelayError::Concurrency(format!("Background task failed: {}", err))
    }
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::RelayError::Config($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::RelayError::Config(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! transport_error {
    ($msg:expr) => {
        $crate::error::RelayError::Transport($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::RelayError::Transport(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! api_error {
    ($msg:expr) => {
        $crate::error::RelayError::Api($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::RelayError::Api(format!($fmt, $($arg)*))
    };
}
