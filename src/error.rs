//! Error types for revtunnel

use thiserror::Error;

/// Main error type for revtunnel
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("Forwarder error: {0}")]
    Forwarder(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("SSH key error: {0}")]
    SshKey(#[from] ssh_key::Error),

    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error reports a missing peer, server or site
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Wrap an error that occurred during one step of establishing a connection
    pub(crate) fn connection(step: &str, target: impl std::fmt::Display, err: Error) -> Self {
        Error::Connection(format!("{} to {} failed: {}", step, target, err))
    }
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;
