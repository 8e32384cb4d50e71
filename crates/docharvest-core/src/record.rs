//! Per-message extraction records.

use docharvest_imap::MessageHeaders;
use serde::{Deserialize, Serialize};

use crate::classify::DocumentType;

/// Filename shown for messages without a matching document.
pub const NO_DOCUMENT_FILENAME: &str = "No document found";

/// Label used for a missing document type or storage key.
pub const NOT_AVAILABLE: &str = "N/A";

/// Placeholder for a missing sender or date.
pub const UNKNOWN: &str = "Unknown";

/// Placeholder for a missing subject.
pub const NO_SUBJECT: &str = "No Subject";

/// Longest body kept in a record, in characters. Spreadsheet cells cannot
/// hold more.
pub const MAX_BODY_CHARS: usize = 32_767;

/// Normalized message fields shared by every record of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContext {
    /// Sender display name, or the address when there is none.
    pub sender_name: String,
    /// Sender address, or [`UNKNOWN`].
    pub sender_email: String,
    /// Subject, or [`NO_SUBJECT`].
    pub subject: String,
    /// `YYYY-MM-DD HH:MM:SS` in UTC, or [`UNKNOWN`].
    pub date: String,
    /// Plain-text body, capped at [`MAX_BODY_CHARS`].
    pub body: Option<String>,
}

impl MessageContext {
    /// Normalizes message headers and body.
    #[must_use]
    pub fn new(headers: &MessageHeaders, body: Option<&str>) -> Self {
        let sender_email = headers
            .sender_email
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN)
            .to_string();

        let sender_name = headers
            .sender_name
            .as_deref()
            .map(|name| name.replace(['"', '\''], "").trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| sender_email.clone());

        let subject = headers
            .subject
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(NO_SUBJECT)
            .to_string();

        let date = headers.date.map_or_else(
            || UNKNOWN.to_string(),
            |d| d.format("%Y-%m-%d %H:%M:%S").to_string(),
        );

        Self {
            sender_name,
            sender_email,
            subject,
            date,
            body: body.map(truncate_body),
        }
    }
}

fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_BODY_CHARS) {
        Some((end, _)) => body[..end].to_string(),
        None => body.to_string(),
    }
}

/// One row of the run's summary.
///
/// A message yields one record per matched document, or a single
/// [`NO_DOCUMENT_FILENAME`] record when nothing matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    /// Sender display name.
    pub sender_name: String,
    /// Sender address.
    pub sender_email: String,
    /// Subject line.
    pub subject: String,
    /// Formatted date.
    pub date: String,
    /// Disambiguated filename, or [`NO_DOCUMENT_FILENAME`].
    pub filename: String,
    /// Key of the persisted bytes in the working store. `None` when nothing
    /// was stored, including failed writes.
    pub storage_key: Option<String>,
    /// Matched document type.
    pub document_type: Option<DocumentType>,
    /// Message body, when the run keeps bodies.
    pub body: Option<String>,
}

impl ExtractionRecord {
    /// Creates a record for a matched document.
    #[must_use]
    pub fn document(
        context: &MessageContext,
        filename: impl Into<String>,
        storage_key: Option<String>,
        document_type: DocumentType,
    ) -> Self {
        Self {
            sender_name: context.sender_name.clone(),
            sender_email: context.sender_email.clone(),
            subject: context.subject.clone(),
            date: context.date.clone(),
            filename: filename.into(),
            storage_key,
            document_type: Some(document_type),
            body: context.body.clone(),
        }
    }

    /// Creates the sentinel record for a message without documents.
    #[must_use]
    pub fn no_document(context: &MessageContext) -> Self {
        Self {
            sender_name: context.sender_name.clone(),
            sender_email: context.sender_email.clone(),
            subject: context.subject.clone(),
            date: context.date.clone(),
            filename: NO_DOCUMENT_FILENAME.to_string(),
            storage_key: None,
            document_type: None,
            body: context.body.clone(),
        }
    }

    /// Returns `PDF`, `DOCX` or `N/A`.
    #[must_use]
    pub fn document_label(&self) -> &'static str {
        self.document_type.map_or(NOT_AVAILABLE, DocumentType::label)
    }

    /// Returns the storage key, or `N/A`.
    #[must_use]
    pub fn storage_label(&self) -> &str {
        self.storage_key.as_deref().unwrap_or(NOT_AVAILABLE)
    }

    /// Returns true if the record's document bytes were persisted.
    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        self.storage_key.is_some()
    }
}
