//! Error types for the probe engine
//!
//! `ProbeError` covers everything that stops a probe (or the whole run) before
//! a response can be classified. `TransportError` is kept separate so the
//! runner can tell a network fault apart from a legitimate `Denied` response.

use thiserror::Error;

/// Errors raised while preparing or loading probes
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Invalid credential: {reason}")]
    InvalidCredential { reason: String },

    #[error("No value captured for binding '{binding}'")]
    MissingBinding { binding: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProbeError {
    pub fn invalid_credential(reason: impl Into<String>) -> Self {
        ProbeError::InvalidCredential {
            reason: reason.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        ProbeError::Config(message.into())
    }

    pub fn catalog(message: impl Into<String>) -> Self {
        ProbeError::Catalog(message.into())
    }
}

/// Failures to complete an HTTP exchange with the backend
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Failed to read response body: {0}")]
    Body(String),
}

pub type Result<T> = std::result::Result<T, ProbeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_wraps_into_probe_error() {
        let err: ProbeError = TransportError::Timeout { timeout_ms: 30_000 }.into();
        assert!(matches!(err, ProbeError::Transport(_)));
        assert_eq!(
            err.to_string(),
            "Transport error: Request timed out after 30000ms"
        );
    }

    #[test]
    fn test_invalid_credential_message() {
        let err = ProbeError::invalid_credential("expected 3 segments, found 2");
        assert_eq!(
            err.to_string(),
            "Invalid credential: expected 3 segments, found 2"
        );
    }
}
