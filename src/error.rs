//! Error types for the TSV-RPC client

use std::io;
use thiserror::Error;

/// Coarse classification of a failure, used to decide what happens to the
/// connection that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// The transport can no longer be trusted (connect/read/write failure,
    /// malformed HTTP exchange, timeout).
    Transport,
    /// The server answered, but with a generic error status or a payload this
    /// client cannot decode.
    Protocol,
    /// The server rejected the request on store semantics (status 450).
    LogicalInconsistency,
    /// Failure above the wire protocol, e.g. in a user-value serializer.
    Application,
}

/// Errors that can occur when talking to the server
#[derive(Error, Debug)]
pub enum Error {
    /// Network or HTTP-level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Connect or request timeout
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    /// Host/port pair could not be turned into an HTTP authority
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Malformed TSV-RPC payload, unknown content type or missing result field
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Server answered with a status other than 200 or 450
    #[error("RPC error (status {status}): {message}")]
    Rpc {
        /// HTTP status code
        status: u16,
        /// `ERROR` column of the response, or the reason phrase
        message: String,
    },

    /// Server reported a logical inconsistency (status 450), e.g. a missing
    /// record on `get` or an existing one on `add`
    #[error("Logical inconsistency: {0}")]
    LogicalInconsistency(String),

    /// A user-value serializer could not convert the payload
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Maps the error onto its fault kind.
    pub fn kind(&self) -> FaultKind {
        match self {
            Error::Transport(_) | Error::Io(_) | Error::Timeout(_) | Error::InvalidAddress(_) => {
                FaultKind::Transport
            }
            Error::Protocol(_) | Error::Rpc { .. } => FaultKind::Protocol,
            Error::LogicalInconsistency(_) => FaultKind::LogicalInconsistency,
            Error::Serialization(_) => FaultKind::Application,
        }
    }

    /// Returns true if the error means the underlying connection is unusable.
    #[inline]
    pub fn is_transport_fault(&self) -> bool {
        self.kind() == FaultKind::Transport
    }

    /// Returns true for every server-reported or payload-level error,
    /// logical inconsistencies included.
    #[inline]
    pub fn is_protocol(&self) -> bool {
        matches!(
            self.kind(),
            FaultKind::Protocol | FaultKind::LogicalInconsistency
        )
    }

    /// Returns true if the server rejected the request on store semantics.
    #[inline]
    pub fn is_logical_inconsistency(&self) -> bool {
        matches!(self, Error::LogicalInconsistency(_))
    }
}

impl From<hyper::Error> for Error {
    fn from(err: hyper::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;
