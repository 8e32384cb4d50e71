//! Error types for the harvesting pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that end a harvesting run or one of its stages.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// The mail session could not be established or authenticated.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The folder does not exist or cannot be opened.
    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    /// The server sent a malformed or unexpected response.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The archive could not be written or finalized.
    #[error("Archive build failed: {0}")]
    ArchiveBuild(String),

    /// The working store could not be read, written or deleted.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The run was cancelled by the caller.
    #[error("Run cancelled")]
    Cancelled,

    /// Another job is already running on this slot.
    #[error("A job is already in progress")]
    JobInFlight,

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Machine-readable error kind carried on failure events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`HarvestError::Connection`].
    Connection,
    /// See [`HarvestError::FolderNotFound`].
    FolderNotFound,
    /// See [`HarvestError::Protocol`].
    Protocol,
    /// See [`HarvestError::ArchiveBuild`].
    ArchiveBuild,
    /// See [`HarvestError::Storage`].
    Storage,
    /// See [`HarvestError::Cancelled`].
    Cancelled,
    /// See [`HarvestError::JobInFlight`].
    JobInFlight,
    /// See [`HarvestError::Config`].
    Config,
}

impl HarvestError {
    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection(_) => ErrorKind::Connection,
            Self::FolderNotFound(_) => ErrorKind::FolderNotFound,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::ArchiveBuild(_) => ErrorKind::ArchiveBuild,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::JobInFlight => ErrorKind::JobInFlight,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Storage(format!("{context}: {err}"))
    }

    pub(crate) fn archive(context: &str, err: impl std::fmt::Display) -> Self {
        Self::ArchiveBuild(format!("{context}: {err}"))
    }
}

impl From<docharvest_imap::Error> for HarvestError {
    fn from(err: docharvest_imap::Error) -> Self {
        use docharvest_imap::Error as ImapError;

        match err {
            ImapError::FolderNotFound(name) => Self::FolderNotFound(name),
            e if e.is_connection() => Self::Connection(e.to_string()),
            e => Self::Protocol(e.to_string()),
        }
    }
}

/// Result type alias using [`HarvestError`].
pub type Result<T> = std::result::Result<T, HarvestError>;
