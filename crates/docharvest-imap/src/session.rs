//! The mail session contract used by the extraction pipeline.
//!
//! [`MailSession`] is implemented by [`crate::ImapSession`] for real servers
//! and by in-memory doubles in tests.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;

use crate::Result;
use crate::message::{MessageHeaders, ParsedMessage};

/// Opaque message identifier (an IMAP UID) scoped to one opened folder.
///
/// Only valid within the session that produced it; identifiers must not be
/// reused after a reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageRef(pub u32);

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Joins identifiers into an IMAP sequence set (`1,5,9`).
#[must_use]
pub fn sequence_set(ids: &[MessageRef]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// A folder as offered to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderInfo {
    /// Server-side mailbox path, passed back to [`MailSession::open_box`].
    pub name: String,
    /// Fully-qualified `parent.child` display name.
    pub display_name: String,
}

/// Summary of an opened folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MailboxInfo {
    /// Number of messages in the folder.
    pub exists: u32,
}

/// What the structural scan learned about one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanEntry {
    /// The MIME tree has a part that may be a document.
    pub has_attachment: bool,
    /// Envelope headers, when the server returned them.
    pub headers: Option<MessageHeaders>,
}

/// Result of the structural attachment scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentScan {
    entries: HashMap<MessageRef, ScanEntry>,
}

impl AttachmentScan {
    /// Creates an empty scan result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records whether `id` carries a candidate attachment.
    pub fn insert(&mut self, id: MessageRef, has_attachment: bool) {
        self.record(
            id,
            ScanEntry {
                has_attachment,
                headers: None,
            },
        );
    }

    /// Records a full scan entry for `id`.
    pub fn record(&mut self, id: MessageRef, entry: ScanEntry) {
        self.entries.insert(id, entry);
    }

    /// Merges another scan result into this one.
    pub fn merge(&mut self, other: Self) {
        self.entries.extend(other.entries);
    }

    /// Returns whether `id` was flagged. Unknown ids are `false`.
    #[must_use]
    pub fn has_attachment(&self, id: MessageRef) -> bool {
        self.entries.get(&id).is_some_and(|e| e.has_attachment)
    }

    /// Returns the envelope headers recorded for `id`.
    #[must_use]
    pub fn headers(&self, id: MessageRef) -> Option<&MessageHeaders> {
        self.entries.get(&id).and_then(|e| e.headers.as_ref())
    }

    /// Returns the flagged ids among `ids`, preserving their order.
    #[must_use]
    pub fn flagged(&self, ids: &[MessageRef]) -> Vec<MessageRef> {
        ids.iter()
            .copied()
            .filter(|id| self.has_attachment(*id))
            .collect()
    }

    /// Number of ids recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A stateful, authenticated connection to one mailbox.
#[async_trait]
pub trait MailSession: Send {
    /// Lists every folder, flattened to `parent.child` names.
    async fn list_folders(&mut self) -> Result<Vec<FolderInfo>>;

    /// Selects a folder for the following operations.
    async fn open_box(&mut self, folder: &str) -> Result<MailboxInfo>;

    /// Returns every message identifier in the open folder, in server order.
    async fn search_all(&mut self) -> Result<Vec<MessageRef>>;

    /// Reads only envelope and MIME structure and reports which messages
    /// may carry an attachment. Missing or malformed structures map to
    /// `false`.
    async fn scan_for_attachments(&mut self, ids: &[MessageRef]) -> Result<AttachmentScan>;

    /// Fetches and parses the given messages.
    ///
    /// Messages that fail to parse are logged and left out. The result keeps
    /// the order of `ids`.
    async fn fetch_full(&mut self, ids: &[MessageRef]) -> Result<Vec<ParsedMessage>>;

    /// Releases the connection. Safe to call more than once.
    async fn disconnect(&mut self);

    /// Returns true while the connection is open.
    fn is_connected(&self) -> bool;
}

/// Opens new mail sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Session type produced by this connector.
    type Session: MailSession;

    /// Connects and authenticates.
    async fn connect(&self) -> Result<Self::Session>;

    /// Human-readable server description for progress messages.
    fn describe(&self) -> String;
}
