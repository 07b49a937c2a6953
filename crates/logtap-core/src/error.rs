//! Error types for logtap readers.
//!
//! Every failure a reader can report falls into one of three classes
//! ([`ErrorClass`]): bad user configuration, failed access checks, or transport
//! failures while streaming. Unexpected faults inside a producer are folded
//! into the transport class by [`FeedError::fault`].

use std::path::PathBuf;
use thiserror::Error;

/// Context string carried by faults caught at a producer boundary.
pub const FAULT_CONTEXT: &str = "unexpected fault";

/// The error type shared by all logtap readers.
#[derive(Error, Debug)]
pub enum FeedError {
    /// The `--from` value matched none of the supported forms.
    #[error("invalid time range {input:?}: {reason}")]
    InvalidTimeRange { input: String, reason: String },

    /// The remote access probe was rejected.
    #[error("access check failed: {message}")]
    Access { message: String },

    /// A query, send or receive against a source failed.
    #[error("{context}: {message}")]
    Transport { context: String, message: String },

    /// The watched file could not be opened or read.
    #[error("file {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Coarse classification of a [`FeedError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Configuration,
    Access,
    Transport,
}

/// Standard Result type for logtap reader operations.
pub type Result<T> = std::result::Result<T, FeedError>;

impl FeedError {
    pub fn invalid_time_range(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTimeRange {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn access(message: impl std::fmt::Display) -> Self {
        Self::Access {
            message: message.to_string(),
        }
    }

    /// A transport failure, labelled with the operation that failed.
    pub fn transport(context: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Transport {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// A fault caught at a producer boundary, reported as a transport failure.
    pub fn fault(message: impl std::fmt::Display) -> Self {
        Self::transport(FAULT_CONTEXT, message)
    }

    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            FeedError::InvalidTimeRange { .. } => ErrorClass::Configuration,
            FeedError::Access { .. } => ErrorClass::Access,
            FeedError::Transport { .. } | FeedError::File { .. } => ErrorClass::Transport,
        }
    }

    /// Whether this error came from a caught fault rather than a failed call.
    pub fn is_fault(&self) -> bool {
        matches!(self, FeedError::Transport { context, .. } if context == FAULT_CONTEXT)
    }
}
