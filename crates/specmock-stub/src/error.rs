//! Error types for contract loading, stub definitions and the server.
//!
//! Request-time mismatches are not errors; they travel as
//! [`specmock_core::MatchResult`] values and end up in HTTP responses.

use specmock_core::PatternError;
use std::path::PathBuf;
use thiserror::Error;

/// A contract file could not be turned into operations.
#[derive(Debug, Error)]
pub enum ContractError {
    #[error("Failed to read contract {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid contract document: {0}")]
    Parse(String),

    #[error("Type {0} is declared more than once")]
    DuplicateType(String),

    #[error("Operation {operation}: {reason}")]
    InvalidOperation { operation: String, reason: String },

    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// A stub definition was rejected.
#[derive(Debug, Error)]
pub enum StubError {
    #[error("Failed to read stub {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid stub JSON: {0}")]
    Parse(String),

    #[error("Invalid stub: {0}")]
    InvalidShape(String),

    #[error("Invalid bodyRegex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Stub does not match the contract:\n{report}")]
    ContractMismatch { report: String },

    #[error("Stub token '{0}' is already registered")]
    DuplicateToken(String),

    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// A stub matched but its response could not be produced.
///
/// Fatal for the one request only; the server keeps serving.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("External command '{command}' failed: {reason}")]
    Command { command: String, reason: String },

    #[error("External command output does not match the contract:\n{report}")]
    ContractViolation { report: String },

    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// Failures of the HTTP server itself.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read local address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

impl StubError {
    /// Short machine code used in admin API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            StubError::Io { .. } => "io error",
            StubError::Parse(_) => "bad data",
            StubError::InvalidShape(_) => "invalid stub",
            StubError::InvalidRegex { .. } => "invalid regex",
            StubError::ContractMismatch { .. } => "contract mismatch",
            StubError::DuplicateToken(_) => "duplicate token",
            StubError::Pattern(_) => "invalid pattern",
        }
    }
}
