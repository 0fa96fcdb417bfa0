// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Error types for graphlink
//!
//! Every fallible operation returns [`Result<T>`]. Server-reported failures keep
//! their classification as a [`GraphError`] so callers can decide whether a
//! retry makes sense; client-side violations (entity binding, finished
//! transactions, cursor misuse) get their own variants.

use crate::transport::TransportError;
use thiserror::Error;

/// Result type alias for graphlink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a server-reported failure
///
/// Derived from the second segment of a status code such as
/// `Neo.ClientError.Statement.SyntaxError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// The request was invalid; retrying it unchanged will fail again
    ClientError,
    /// The server failed to process a valid request
    DatabaseError,
    /// A temporary condition; the same request may succeed later
    TransientError,
}

impl Classification {
    fn parse(segment: &str) -> Option<Self> {
        match segment {
            "ClientError" => Some(Classification::ClientError),
            "DatabaseError" => Some(Classification::DatabaseError),
            "TransientError" => Some(Classification::TransientError),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::ClientError => "ClientError",
            Classification::DatabaseError => "DatabaseError",
            Classification::TransientError => "TransientError",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure reported by (or on behalf of) the remote service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{classification} [{code}]: {message}")]
pub struct GraphError {
    pub classification: Classification,
    pub code: String,
    pub message: String,
}

impl GraphError {
    /// Build an error from a server status code and message.
    ///
    /// Codes have the form `<Namespace>.<Classification>.<Category>.<Title>`.
    /// Codes that do not carry a recognised classification are treated as
    /// database errors.
    pub fn hydrate(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let classification = code
            .split('.')
            .nth(1)
            .and_then(Classification::parse)
            .unwrap_or(Classification::DatabaseError);
        GraphError {
            classification,
            code,
            message: message.into(),
        }
    }

    /// Client-synthesized transient error, e.g. a timeout or broken connection
    pub fn transient(code: &str, message: impl Into<String>) -> Self {
        Self::hydrate(format!("Client.TransientError.{}", code), message)
    }

    /// Third segment of the code (`Statement` in `Neo.ClientError.Statement.SyntaxError`)
    pub fn category(&self) -> Option<&str> {
        self.code.split('.').nth(2)
    }

    /// Fourth segment of the code (`SyntaxError` in `Neo.ClientError.Statement.SyntaxError`)
    pub fn title(&self) -> Option<&str> {
        self.code.split('.').nth(3)
    }

    pub fn is_retryable(&self) -> bool {
        self.classification == Classification::TransientError
    }
}

/// What went wrong while talking to the service outside of a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// The service rejected the credentials
    Authentication,
    /// The graph (and its pool) has been closed
    Closed,
}

/// Main error type for graphlink
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Bind error: {0}")]
    Bind(String),

    #[error("Join error: {0}")]
    Join(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Transaction finished: no further operations are allowed")]
    TransactionFinished,

    #[error("No current record: cursor is not positioned on a record")]
    NoCurrentRecord,

    #[error("Commit outcome unknown: {0}")]
    CommitOutcomeUnknown(String),

    #[error("Connection error ({kind:?}): {message}")]
    Connection {
        kind: ConnectionErrorKind,
        message: String,
    },

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Index {index} out of range for record of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Invalid property value: {0}")]
    InvalidProperty(String),

    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// True only for transient server failures
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Graph(e) if e.is_retryable())
    }

    /// Server classification, if this error came from the service
    pub fn classification(&self) -> Option<Classification> {
        match self {
            Error::Graph(e) => Some(e.classification),
            _ => None,
        }
    }

    pub(crate) fn closed() -> Self {
        Error::Connection {
            kind: ConnectionErrorKind::Closed,
            message: "graph has been closed".to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Serialization(error.to_string())
    }
}

impl From<TransportError> for Error {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Failure { code, message } => {
                Error::Graph(GraphError::hydrate(code, message))
            }
            TransportError::Unavailable(message) => Error::Graph(GraphError::transient(
                "Network.ServiceUnavailable",
                message,
            )),
            TransportError::Broken(message) => {
                Error::Graph(GraphError::transient("Network.ConnectionBroken", message))
            }
            TransportError::TimedOut(elapsed) => Error::Graph(GraphError::transient(
                "Network.Timeout",
                format!("no response within {:?}", elapsed),
            )),
            TransportError::Unauthorized(message) => Error::Connection {
                kind: ConnectionErrorKind::Authentication,
                message,
            },
            TransportError::Protocol(message) => Error::Protocol(message),
        }
    }
}
