//! Error types for the Jetpath runtime.

use crate::router::ValidationError;
use thiserror::Error;

/// Result alias used across the crate.
pub type JetResult<T> = Result<T, JetError>;

/// Errors raised by the runtime, its collaborators and application handlers.
#[derive(Debug, Error)]
pub enum JetError {
    #[error("context has no request bound")]
    NoRequest,

    #[error("request body has already been consumed")]
    BodyConsumed,

    #[error("request body is not valid JSON: {0}")]
    BodyParse(#[source] serde_json::Error),

    #[error("request body exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    #[error("failed to read request body: {0}")]
    Body(String),

    #[error("transport error: {0}")]
    Transport(#[from] hyper::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("no validation schema registered for {method} {path}")]
    MissingSchema { method: String, path: String },

    #[error("unknown extension '{0}'")]
    UnknownExtension(String),

    #[error("plugin '{plugin}' failed: {message}")]
    Plugin { plugin: String, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid bind address: {0}")]
    Address(#[from] std::net::AddrParseError),

    #[error("request was ejected without a deferred responder")]
    Abandoned,

    #[error("{0}")]
    Handler(String),
}

impl From<std::convert::Infallible> for JetError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

impl JetError {
    /// Create an application error with a message.
    pub fn handler(message: impl Into<String>) -> Self {
        JetError::Handler(message.into())
    }

    /// Create a plugin failure.
    pub fn plugin(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        JetError::Plugin {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Status the host falls back to when no error hook produced a response.
    pub fn status(&self) -> u16 {
        match self {
            JetError::Validation(_) | JetError::BodyParse(_) | JetError::BodyConsumed => 400,
            JetError::PayloadTooLarge { .. } => 413,
            _ => 500,
        }
    }

    /// Whether the error is caused by the client's input.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(JetError::BodyParse(parse).status(), 400);
        assert_eq!(JetError::PayloadTooLarge { limit: 1 }.status(), 413);
        assert_eq!(JetError::handler("boohoo").status(), 500);
        assert!(!JetError::Abandoned.is_client_error());
    }

    #[test]
    fn test_display() {
        let err = JetError::MissingSchema {
            method: "POST".into(),
            path: "/pets".into(),
        };
        assert_eq!(err.to_string(), "no validation schema registered for POST /pets");
        assert_eq!(JetError::handler("boohoo").to_string(), "boohoo");
    }
}
