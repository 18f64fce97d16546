//! Error types for block production subsystem

use shared_types::StateError;
use thiserror::Error;

/// Result type alias for block production operations
pub type Result<T> = std::result::Result<T, BlockProductionError>;

/// Closed error taxonomy surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unexpected failure of a mandatory stage
    Internal,
    /// Transient condition (syncing, optimistic, cancelled); retry-safe
    Unavailable,
    /// Malformed or out-of-window request
    BadRequest,
    /// Missing chain data
    NotFound,
}

impl ErrorKind {
    /// Transport status code for this kind.
    pub fn http_status(self) -> u16 {
        match self {
            Self::Internal => 500,
            Self::Unavailable => 503,
            Self::BadRequest => 400,
            Self::NotFound => 404,
        }
    }
}

/// Errors that can occur during block production
#[derive(Debug, Error)]
pub enum BlockProductionError {
    /// Node is still syncing
    #[error("Syncing to latest head, not ready to respond")]
    Syncing,

    /// Head is not fully validated by the execution engine
    #[error("The node is currently optimistic and cannot serve validators")]
    Optimistic,

    /// Caller cancelled the request
    #[error("Request cancelled during {stage}")]
    Cancelled {
        /// Suspension point that observed the cancellation
        stage: &'static str,
    },

    /// Request failed validation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// More blob sidecars than a block may carry
    #[error("Too many blobs in block: {count} exceeds maximum {max}")]
    TooManyBlobs {
        /// Supplied sidecars
        count: usize,
        /// Protocol maximum
        max: u64,
    },

    /// Signed block could not be decoded
    #[error("Could not decode block: {0}")]
    Decode(String),

    /// Required chain data is missing
    #[error("Could not {stage}: {message} not found")]
    NotFound {
        /// Stage that looked the data up
        stage: &'static str,
        /// Underlying error
        message: String,
    },

    /// A mandatory stage failed
    #[error("Could not {stage}: {message}")]
    Internal {
        /// Failing stage
        stage: &'static str,
        /// Underlying error
        message: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BlockProductionError {
    /// Internal error for `stage`.
    pub fn internal(stage: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Internal {
            stage,
            message: err.to_string(),
        }
    }

    /// Map a collaborator error, keeping `NotFound` distinct.
    pub fn from_port(stage: &'static str, err: PortError) -> Self {
        match err {
            PortError::NotFound(message) => Self::NotFound { stage, message },
            other => Self::internal(stage, other),
        }
    }

    /// Taxonomy bucket of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Syncing | Self::Optimistic | Self::Cancelled { .. } => ErrorKind::Unavailable,
            Self::InvalidRequest(_) | Self::TooManyBlobs { .. } | Self::Decode(_) => {
                ErrorKind::BadRequest
            }
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Internal { .. } | Self::InvalidConfig(_) => ErrorKind::Internal,
        }
    }

    /// Whether retrying next slot is expected to succeed.
    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::Unavailable
    }
}

impl From<StateError> for BlockProductionError {
    fn from(err: StateError) -> Self {
        Self::internal("read state", err)
    }
}

/// Error returned by outbound collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    /// Requested item does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Collaborator is unreachable
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Any other failure
    #[error("{0}")]
    Other(String),
}

/// Error returned by the builder network client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuilderError {
    /// Validator never registered with the builder
    #[error("no builder registration found")]
    RegistrationNotFound,

    /// Validator has no fee recipient configured
    #[error("no fee recipient found")]
    FeeRecipientNotFound,

    /// Builder request failed
    #[error("builder request failed: {0}")]
    Request(String),
}

impl BuilderError {
    /// The two lookup misses that mean "opted out", not "failed".
    pub fn is_not_registered(&self) -> bool {
        matches!(self, Self::RegistrationNotFound | Self::FeeRecipientNotFound)
    }
}
