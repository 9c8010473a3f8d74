use crate::value::{DataType, ValueRank};

/// Errors raised by the address space, the dispatcher and configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("'{0}' is already registered")]
    DuplicateName(String),

    #[error("'{0}' is not registered")]
    NotFound(String),

    #[error("access to '{name}' denied: not {required}")]
    AccessDenied { name: String, required: &'static str },

    #[error("type mismatch on '{name}': expected {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("method '{method}' expects {expected} arguments, got {actual}")]
    ArityMismatch {
        method: String,
        expected: usize,
        actual: usize,
    },

    #[error("argument {index} could not be converted to {expected_type}{}: {detail}", rank_suffix(.expected_rank))]
    Conversion {
        index: usize,
        expected_type: DataType,
        expected_rank: ValueRank,
        detail: String,
    },

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("handler fault: {0}")]
    HandlerFault(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to spawn {0}")]
    Spawn(String),

    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),
}

fn rank_suffix(rank: &ValueRank) -> &'static str {
    match rank {
        ValueRank::Scalar => "",
        ValueRank::OneDimension => "[]",
        ValueRank::TwoDimensions => "[][]",
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a transport bridge to accept a snapshot.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    #[error("failed to encode snapshot: {0}")]
    Encode(String),
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::TransportUnavailable(e.to_string())
    }
}
