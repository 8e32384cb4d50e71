//! Error types for the mail session client.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to a mail server.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// The server could not be reached or dropped the connection.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The server rejected the credentials.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The requested folder does not exist or cannot be selected.
    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    /// Malformed or unexpected server response.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Operation timed out.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid state for the requested operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    /// Returns true if the error happened before or while establishing the session.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Tls(_)
                | Self::InvalidDnsName(_)
                | Self::Connection(_)
                | Self::Auth(_)
                | Self::Timeout(_)
        )
    }
}

impl From<async_imap::error::Error> for Error {
    fn from(err: async_imap::error::Error) -> Self {
        use async_imap::error::Error as ImapError;

        match err {
            ImapError::Io(e) => Self::Io(e),
            ImapError::ConnectionLost => Self::Connection("connection lost".to_string()),
            ImapError::No(text) => Self::Protocol(format!("server returned NO: {text}")),
            ImapError::Bad(text) => Self::Protocol(format!("server returned BAD: {text}")),
            other => Self::Protocol(other.to_string()),
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
