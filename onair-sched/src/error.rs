//! Error types for onair-sched
//!
//! Expected scheduling outcomes (a lost commit race, a read before the track
//! started) are ordinary values, not errors. See `CommitOutcome` and
//! `WaitReason`.

use thiserror::Error;

/// Main error type for the scheduler
#[derive(Error, Debug)]
pub enum Error {
    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Errors raised by the shared library
    #[error(transparent)]
    Common(#[from] onair_common::Error),

    /// Configuration or stored setting errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// No track is available for selection
    #[error("Catalog has no tracks to schedule")]
    EmptyCatalog,

    /// Stored anchor row could not be decoded
    #[error("Invalid schedule anchor: {0}")]
    InvalidAnchor(String),

    /// Invalid argument passed to a scheduling function
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the anchor or catalog store could not be reached
    ///
    /// Callers surface these as retryable failures rather than guessing at a
    /// schedule.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Database(_) => true,
            Error::Common(onair_common::Error::Database(_))
            | Error::Common(onair_common::Error::Io(_)) => true,
            _ => false,
        }
    }
}

/// Convenience Result type using the scheduler Error
pub type Result<T> = std::result::Result<T, Error>;
