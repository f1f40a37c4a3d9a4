use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TerminalError {
    /// Request rejected by the server; `details` lists the offending fields.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        details: Option<Value>,
    },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Not synchronized: {message}")]
    NotSynchronized { message: String },

    /// The remote terminal has not authenticated to its broker yet.
    #[error("Not connected: {message}")]
    NotConnected { message: String },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Timeout: {message}")]
    Timeout { message: String },

    #[error("Connection closed: {message}")]
    ConnectionClosed { message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Trade failed: {string_code} ({numeric_code}): {message}")]
    Trade {
        numeric_code: i64,
        string_code: String,
        message: String,
    },

    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("Config error: {message}")]
    Config { message: String },
}

impl TerminalError {
    /// Maps an error envelope's code onto the taxonomy. Unknown codes become `Internal`.
    pub fn from_wire(code: &str, message: String, details: Option<Value>) -> Self {
        match code {
            "ValidationError" => Self::Validation { message, details },
            "NotFoundError" => Self::NotFound { message },
            "NotSynchronizedError" => Self::NotSynchronized { message },
            "NotAuthenticatedError" => Self::NotConnected { message },
            "UnauthorizedError" => Self::Unauthorized { message },
            _ => Self::Internal { message },
        }
    }

    pub fn connection_closed() -> Self {
        Self::ConnectionClosed {
            message: "connection has been closed".to_string(),
        }
    }

    pub fn request_timeout(request_id: &str, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            message: format!(
                "request {} timed out after {:?} waiting for response",
                request_id, timeout
            ),
        }
    }

    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn decode<S: Into<String>>(message: S) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

impl From<ws::WsError> for TerminalError {
    fn from(e: ws::WsError) -> Self {
        Self::transport(e.to_string())
    }
}

impl From<serde_json::Error> for TerminalError {
    fn from(e: serde_json::Error) -> Self {
        Self::decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TerminalError>;
