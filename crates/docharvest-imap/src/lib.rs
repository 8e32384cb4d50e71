//! # docharvest-imap
//!
//! Mail session client used by docharvest to harvest attachments from an
//! IMAP folder.
//!
//! ## Features
//!
//! - **Two-phase retrieval**: a cheap `BODYSTRUCTURE` scan flags messages
//!   that may carry documents; only those are fetched in full
//! - **Parallel parsing**: full messages in a batch are parsed on the
//!   blocking pool and returned in request order
//! - **TLS via rustls**: implicit TLS on 993, plaintext only on request
//! - **Timeouts everywhere**: connect, login and every command are bounded
//! - **Swappable sessions**: the pipeline talks to [`MailSession`], so tests
//!   can drive it with an in-memory mailbox
//!
//! ## Quick Start
//!
//! ```ignore
//! use docharvest_imap::{Config, Connector, ImapConnector, MailSession};
//!
//! #[tokio::main]
//! async fn main() -> docharvest_imap::Result<()> {
//!     let config = Config::builder("imap.gmail.com")
//!         .credentials("me@gmail.com", "app-password")
//!         .build();
//!     let mut session = ImapConnector::new(config).connect().await?;
//!
//!     session.open_box("INBOX").await?;
//!     let ids = session.search_all().await?;
//!     let scan = session.scan_for_attachments(&ids).await?;
//!     let messages = session.fetch_full(&scan.flagged(&ids)).await?;
//!     println!("{} messages with attachments", messages.len());
//!
//!     session.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: connection settings and builder
//! - [`folders`]: hierarchy flattening for LIST results
//! - [`message`]: full message parsing
//! - [`session`]: the [`MailSession`] and [`Connector`] traits
//! - [`stream`]: plaintext / TLS transport
//! - [`structure`]: MIME structure tree for the attachment scan

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod client;
pub mod config;
mod error;
pub mod folders;
pub mod message;
pub mod session;
pub mod stream;
pub mod structure;

pub use client::{ImapConnector, ImapSession};
pub use config::{Config, ConfigBuilder, Credentials, Security};
pub use error::{Error, Result};
pub use folders::{ListedFolder, flatten_folders};
pub use message::{MessageHeaders, ParsedAttachment, ParsedMessage, parse_message};
pub use session::{
    AttachmentScan, Connector, FolderInfo, MailSession, MailboxInfo, MessageRef, ScanEntry,
    sequence_set,
};
pub use stream::ImapStream;
pub use structure::MimeNode;
