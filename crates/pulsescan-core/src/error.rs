//! Error types for the PulseScan core library

use std::io;
use std::net::AddrParseError;
use thiserror::Error;

/// Result type alias for PulseScan operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types shared across the discovery engine
#[derive(Error, Debug)]
pub enum Error {
    /// Network-related errors (socket open, packet build, capture)
    #[error("Network error: {0}")]
    Network(String),

    /// I/O errors with automatic conversion
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Parsing errors for IP addresses and preference values
    #[error("Parse error: {0}")]
    Parse(String),

    /// Permission/capability errors
    #[error("Insufficient privileges: {0}")]
    Privilege(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Downstream queue errors
    #[error("Queue error: {0}")]
    Queue(String),

    /// Invalid target specification
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Invalid port range
    #[error("Invalid port range: {0}")]
    InvalidPortRange(String),
}

impl From<AddrParseError> for Error {
    fn from(err: AddrParseError) -> Self {
        Error::Parse(format!("Invalid IP address: {}", err))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(format!("TOML parse error: {}", err))
    }
}
