//! Error types for the proxy.

use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProxyError {
    /// The inbound request is unusable; reported to the client as HTTP 400.
    #[error("{message}")]
    Validation { message: String },

    #[error("Backend error: {message}")]
    Backend { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ProxyError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether the error was caused by the client rather than the proxy or backend.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_is_bare() {
        let err = ProxyError::validation("Model is required");
        assert_eq!(err.to_string(), "Model is required");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_backend_error_is_not_client_error() {
        let err = ProxyError::backend("connection refused");
        assert_eq!(err.to_string(), "Backend error: connection refused");
        assert!(!err.is_client_error());
    }
}
