//! Progress events streamed from a run to its caller.
//!
//! Every run ends with exactly one terminal event: [`EventKind::RunComplete`],
//! [`EventKind::RunError`] or [`EventKind::Cancelled`]. Events sent after the
//! terminal one are dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::classify::DocumentType;
use crate::error::ErrorKind;

/// What an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Connection, search, scan or batch progress.
    MessageScanUpdate,
    /// A document attachment was classified.
    AttachmentFound,
    /// The summary document is being built.
    SummaryBuilding,
    /// The archive is being built.
    ArchiveBuilding,
    /// The run finished successfully.
    RunComplete,
    /// The run failed.
    RunError,
    /// The run was cancelled.
    Cancelled,
}

impl EventKind {
    /// Returns true for events that end a run.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::RunComplete | Self::RunError | Self::Cancelled)
    }
}

/// Totals reported on completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    /// Messages in the folder.
    pub total_emails: usize,
    /// PDF attachments persisted.
    pub total_pdfs: usize,
    /// DOCX attachments persisted.
    pub total_docx: usize,
}

/// A base64-encoded shard carried on the completion event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineArchive {
    /// Shard file name.
    pub name: String,
    /// Standard base64 of the shard bytes.
    pub data: String,
}

/// One progress event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Event kind.
    pub kind: EventKind,
    /// Human-readable message.
    pub message: String,
    /// Current position, when the event reports a count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<usize>,
    /// Total the position counts towards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    /// Attachment filename for [`EventKind::AttachmentFound`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Attachment type for [`EventKind::AttachmentFound`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type: Option<DocumentType>,
    /// Run totals for [`EventKind::RunComplete`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totals: Option<RunTotals>,
    /// Error kind for [`EventKind::RunError`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Shard file names for [`EventKind::RunComplete`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub archives: Vec<String>,
    /// Inline shard data for [`EventKind::RunComplete`], when requested.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inline: Vec<InlineArchive>,
}

impl ProgressEvent {
    /// Creates an event with only a kind and message.
    #[must_use]
    pub fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            current: None,
            total: None,
            filename: None,
            document_type: None,
            totals: None,
            error_kind: None,
            archives: Vec::new(),
            inline: Vec::new(),
        }
    }

    /// Shorthand for a [`EventKind::MessageScanUpdate`] event.
    #[must_use]
    pub fn scan(message: impl Into<String>) -> Self {
        Self::new(EventKind::MessageScanUpdate, message)
    }

    /// Sets the current/total counters.
    #[must_use]
    pub const fn with_counts(mut self, current: usize, total: usize) -> Self {
        self.current = Some(current);
        self.total = Some(total);
        self
    }

    /// Marks the event as reporting an attachment.
    #[must_use]
    pub fn with_attachment(mut self, filename: impl Into<String>, kind: DocumentType) -> Self {
        self.filename = Some(filename.into());
        self.document_type = Some(kind);
        self
    }

    /// Sets the run totals.
    #[must_use]
    pub const fn with_totals(mut self, totals: RunTotals) -> Self {
        self.totals = Some(totals);
        self
    }

    /// Sets the error kind.
    #[must_use]
    pub const fn with_error_kind(mut self, kind: ErrorKind) -> Self {
        self.error_kind = Some(kind);
        self
    }
}

/// Creates a connected sender/receiver pair.
#[must_use]
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ProgressSender {
            tx,
            terminated: Arc::new(AtomicBool::new(false)),
        },
        ProgressReceiver { rx },
    )
}

/// Writing half of the progress channel. Never blocks the run.
#[derive(Debug)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    terminated: Arc<AtomicBool>,
}

impl ProgressSender {
    /// Sends an event.
    ///
    /// Returns false if the event was dropped because a terminal event was
    /// already sent. A caller that stopped listening does not affect the run.
    pub fn send(&self, event: ProgressEvent) -> bool {
        if event.kind.is_terminal() {
            if self.terminated.swap(true, Ordering::SeqCst) {
                debug!(kind = ?event.kind, "dropping second terminal event");
                return false;
            }
        } else if self.terminated.load(Ordering::SeqCst) {
            debug!(kind = ?event.kind, "dropping event after terminal event");
            return false;
        }

        if self.tx.send(event).is_err() {
            debug!("progress receiver closed");
        }
        true
    }

    /// Returns true once a terminal event was sent.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

/// Reading half of the progress channel.
#[derive(Debug)]
pub struct ProgressReceiver {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressReceiver {
    /// Waits for the next event. Returns `None` once the sender is gone and
    /// every event was read.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    /// Returns the next event if one is ready.
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.rx.try_recv().ok()
    }

    /// Drains every event currently buffered.
    pub fn drain(&mut self) -> Vec<ProgressEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (tx, mut rx) = channel();
        tx.send(ProgressEvent::scan("one"));
        tx.send(ProgressEvent::scan("two").with_counts(1, 2));
        drop(tx);

        assert_eq!(rx.recv().await.unwrap().message, "one");
        let second = rx.recv().await.unwrap();
        assert_eq!((second.current, second.total), (Some(1), Some(2)));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_only_one_terminal_event() {
        let (tx, mut rx) = channel();
        assert!(tx.send(ProgressEvent::new(EventKind::RunComplete, "done")));
        assert!(!tx.send(ProgressEvent::new(EventKind::RunError, "late")));
        assert!(!tx.send(ProgressEvent::scan("later")));
        assert!(tx.is_terminated());

        let events = rx.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::RunComplete);
    }

    #[test]
    fn test_closed_receiver_does_not_fail_sender() {
        let (tx, rx) = channel();
        drop(rx);
        assert!(tx.send(ProgressEvent::scan("nobody listening")));
    }

    #[test]
    fn test_event_json_shape() {
        let event = ProgressEvent::new(EventKind::AttachmentFound, "Downloaded PDF: cv.pdf")
            .with_attachment("cv.pdf", DocumentType::Pdf)
            .with_counts(3, 10);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["kind"], "attachment_found");
        assert_eq!(json["filename"], "cv.pdf");
        assert_eq!(json["document_type"], "PDF");
        assert_eq!(json["current"], 3);
        assert!(json.get("totals").is_none());
        assert!(json.get("inline").is_none());
    }
}
