//! Central error types for the node sync checker
//!
//! Uses `thiserror` for ergonomic, type-safe error handling with
//! automatic `Display` and `Error` trait implementations.
//!
//! Every variant is terminal for a run. [`Error::label`] gives the tag printed
//! to stderr before the process exits with [`Error::exit_code`].

use thiserror::Error;

use crate::protocol::Side;

/// Exit code for every failed run (errors and divergence alike)
pub const EXIT_ERROR: i32 = 2;

/// Central error type for a sync check run
///
/// `Display` carries only the detail; the category is in [`Error::label`].
#[derive(Error, Debug)]
pub enum Error {
    /// Bad flags, missing required values, unknown protocol
    #[error("{0}")]
    ConfigError(String),

    /// HTTP client missing from the execution context and could not be installed
    #[error("{0}")]
    ToolingError(String),

    /// Endpoint unreachable, timed out or answered with an HTTP error
    #[error("{message}")]
    TransportError { side: Side, message: String },

    /// Response could not be decoded or a required field was absent
    #[error("{side} node: {message}")]
    ParseError { side: Side, message: String },

    /// Both nodes have a reference at `position` and they differ
    #[error("{what} at {position} differs: local {local} vs public {public}")]
    Diverged {
        what: String,
        position: u64,
        local: String,
        public: String,
    },

    /// Report serialization error
    #[error("{0}")]
    SerializationError(String),
}

/// Result type alias for checker operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn transport(side: Side, message: impl Into<String>) -> Self {
        Error::TransportError {
            side,
            message: message.into(),
        }
    }

    pub fn parse(side: Side, message: impl Into<String>) -> Self {
        Error::ParseError {
            side,
            message: message.into(),
        }
    }

    /// Diagnostic label printed ahead of the message on stderr
    pub fn label(&self) -> &'static str {
        match self {
            Error::ConfigError(_) => "CONFIG ERROR",
            Error::ToolingError(_) => "TOOLING ERROR",
            Error::TransportError {
                side: Side::Local, ..
            } => "LOCAL RPC ERROR",
            Error::TransportError {
                side: Side::Public, ..
            } => "PUBLIC RPC ERROR",
            Error::ParseError { .. } => "PARSE ERROR",
            Error::Diverged { .. } => "DIVERGED",
            Error::SerializationError(_) => "OUTPUT ERROR",
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        EXIT_ERROR
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::SerializationError(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::SerializationError(e.to_string())
    }
}
