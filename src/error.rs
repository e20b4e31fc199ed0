//! # Error Handling for journalite
//!
//! The write path has a deliberately narrow failure surface: every way a
//! flush can go wrong — a driver error, a row the database refused to apply,
//! a failed commit — is reported to callers as the single [`Error::Storage`]
//! kind. Completion channels for a failed flush all carry the same outcome;
//! there is no per-request attribution of batch failures.
//!
//! The only other variant, [`Error::InvalidCapacity`], exists for
//! construction-time validation and never surfaces from a flush.

use std::error::Error as StdError;

use thiserror::Error;

/// Boxed source error for wrapping driver and encoding failures.
pub type BoxedError = Box<dyn StdError + Send + Sync>;

/// All errors that can occur in journal operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A persistence step failed.
    ///
    /// Covers driver errors, the "row not applied" sentinel reported when an
    /// insert changes zero rows, and commit failures. Callers whose requests
    /// were drained by the failing flush each receive a failure carrying the
    /// same message.
    #[error("journal storage failure: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<BoxedError>,
    },

    /// Batch capacity must be a positive entry count.
    #[error("invalid batch capacity: {0}")]
    InvalidCapacity(usize),
}

impl Error {
    /// Creates a storage failure with a message only.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a storage failure wrapping an underlying cause.
    ///
    /// The cause's own message is folded into `message` so that completions,
    /// which carry only the message, still name the underlying failure.
    pub fn storage_with(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: format!("{}: {}", message.into(), source),
            source: Some(Box::new(source)),
        }
    }

    /// A fresh failure carrying this error's message.
    ///
    /// `Error` is not `Clone`; a failed flush delivers one of these to every
    /// drained request's completion so all of them observe the same cause.
    pub(crate) fn for_completion(&self) -> Self {
        match self {
            Self::Storage { message, .. } => Self::storage(message.clone()),
            other => Self::storage(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::storage_with("sqlite operation failed", e)
    }
}

/// A `Result` type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
