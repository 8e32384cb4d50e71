//! End-to-end tests for the extraction pipeline.
//!
//! These tests drive the pipeline against an in-memory mailbox and record
//! every session call, so fetch behaviour can be asserted without a server.

#![allow(clippy::unwrap_used)]

use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use docharvest_core::{
    DocumentType, ErrorKind, EventKind, ExtractionOutcome, FsStore, HarvestConfig, HarvestError,
    JobHandle, JobSlot, JobStatus, MemoryStore, Pipeline, ProgressEvent, SUMMARY_FILENAME,
    WorkingStore,
};
use docharvest_imap::{
    AttachmentScan, Connector, Error as ImapError, FolderInfo, MailSession, MailboxInfo,
    MessageHeaders, MessageRef, ParsedAttachment, ParsedMessage, ScanEntry,
};

const FOLDER: &str = "INBOX";

#[derive(Debug, Clone)]
struct FakeMessage {
    id: MessageRef,
    flagged: bool,
    headers: MessageHeaders,
    body: String,
    attachments: Vec<ParsedAttachment>,
}

fn message(uid: u32, subject: &str, attachments: &[(&str, &str)]) -> FakeMessage {
    FakeMessage {
        id: MessageRef(uid),
        flagged: !attachments.is_empty(),
        headers: MessageHeaders {
            sender_name: Some(format!("Sender {uid}")),
            sender_email: Some(format!("sender{uid}@example.com")),
            subject: Some(subject.to_string()),
            date: None,
        },
        body: format!("Body of message {uid}"),
        attachments: attachments
            .iter()
            .map(|(name, content_type)| ParsedAttachment {
                filename: Some((*name).to_string()),
                content_type: (*content_type).to_string(),
                data: format!("contents of {name} in {uid}").into_bytes(),
            })
            .collect(),
    }
}

#[derive(Debug, Default)]
struct Calls {
    fetch_calls: AtomicUsize,
    fetched: Mutex<Vec<MessageRef>>,
    disconnects: AtomicUsize,
}

impl Calls {
    fn fetched(&self) -> Vec<MessageRef> {
        self.fetched.lock().unwrap().clone()
    }
}

#[derive(Clone, Default)]
struct FakeConnector {
    messages: Arc<Vec<FakeMessage>>,
    calls: Arc<Calls>,
    fail_connect: bool,
    /// 1-based fetch call that fails.
    fail_fetch: Option<usize>,
    /// Cancel the job once this many fetch calls have returned.
    cancel_after_fetch: Option<(usize, JobHandle)>,
    /// Message left out of `fetch_full` results, as if it failed to parse.
    unparseable: Option<MessageRef>,
}

impl FakeConnector {
    fn new(messages: Vec<FakeMessage>) -> Self {
        Self {
            messages: Arc::new(messages),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Session = FakeSession;

    async fn connect(&self) -> docharvest_imap::Result<FakeSession> {
        if self.fail_connect {
            return Err(ImapError::Auth("invalid credentials".to_string()));
        }
        Ok(FakeSession {
            connector: self.clone(),
            selected: None,
            connected: true,
        })
    }

    fn describe(&self) -> String {
        "fake.example.com:993".to_string()
    }
}

struct FakeSession {
    connector: FakeConnector,
    selected: Option<String>,
    connected: bool,
}

#[async_trait]
impl MailSession for FakeSession {
    async fn list_folders(&mut self) -> docharvest_imap::Result<Vec<FolderInfo>> {
        Ok(vec![FolderInfo {
            name: FOLDER.to_string(),
            display_name: FOLDER.to_string(),
        }])
    }

    async fn open_box(&mut self, folder: &str) -> docharvest_imap::Result<MailboxInfo> {
        if folder != FOLDER {
            return Err(ImapError::FolderNotFound(folder.to_string()));
        }
        self.selected = Some(folder.to_string());
        Ok(MailboxInfo {
            exists: u32::try_from(self.connector.messages.len()).unwrap(),
        })
    }

    async fn search_all(&mut self) -> docharvest_imap::Result<Vec<MessageRef>> {
        assert!(self.selected.is_some(), "search before open_box");
        Ok(self.connector.messages.iter().map(|m| m.id).collect())
    }

    async fn scan_for_attachments(
        &mut self,
        ids: &[MessageRef],
    ) -> docharvest_imap::Result<AttachmentScan> {
        let mut scan = AttachmentScan::new();
        for m in self.connector.messages.iter().filter(|m| ids.contains(&m.id)) {
            scan.record(
                m.id,
                ScanEntry {
                    has_attachment: m.flagged,
                    headers: Some(m.headers.clone()),
                },
            );
        }
        Ok(scan)
    }

    async fn fetch_full(
        &mut self,
        ids: &[MessageRef],
    ) -> docharvest_imap::Result<Vec<ParsedMessage>> {
        let calls = &self.connector.calls;
        let call = calls.fetch_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.connector.fail_fetch == Some(call) {
            return Err(ImapError::Protocol("connection reset mid-batch".to_string()));
        }
        calls.fetched.lock().unwrap().extend_from_slice(ids);

        let parsed = ids
            .iter()
            .filter(|id| self.connector.unparseable != Some(**id))
            .filter_map(|id| self.connector.messages.iter().find(|m| m.id == *id))
            .map(|m| ParsedMessage {
                id: m.id,
                headers: m.headers.clone(),
                body_text: Some(m.body.clone()),
                attachments: m.attachments.clone(),
            })
            .collect();

        if let Some((after, handle)) = &self.connector.cancel_after_fetch
            && *after == call
        {
            handle.cancel();
        }
        Ok(parsed)
    }

    async fn disconnect(&mut self) {
        if self.connected {
            self.connected = false;
            self.connector.calls.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

fn config(output: &Path) -> HarvestConfig {
    HarvestConfig {
        output_dir: output.to_path_buf(),
        ..HarvestConfig::default()
    }
}

fn terminal_events(events: &[ProgressEvent]) -> Vec<&ProgressEvent> {
    events.iter().filter(|e| e.kind.is_terminal()).collect()
}

fn zip_entries(path: &Path) -> Vec<String> {
    let file = std::fs::File::open(path).unwrap();
    let archive = zip::ZipArchive::new(file).unwrap();
    archive.file_names().map(str::to_string).collect::<Vec<_>>()
}

fn zip_entry(path: &Path, name: &str) -> Vec<u8> {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut out = Vec::new();
    entry.read_to_end(&mut out).unwrap();
    out
}

async fn run(
    connector: FakeConnector,
    store: Arc<dyn WorkingStore>,
    config: HarvestConfig,
    slot: &JobSlot,
) -> (
    docharvest_core::Result<ExtractionOutcome>,
    Vec<ProgressEvent>,
    JobStatus,
) {
    let (job, mut events) = slot.begin(FOLDER).unwrap();
    let pipeline = Pipeline::new(connector, store, config);
    let result = pipeline.run(FOLDER, &job).await;
    let status = job.tracker().snapshot().status;
    (result, events.drain(), status)
}

#[tokio::test]
async fn test_three_message_folder_end_to_end() {
    let out = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let store = Arc::new(FsStore::new(work.path()));

    let connector = FakeConnector::new(vec![
        message(1, "Application A", &[("a.pdf", "application/pdf")]),
        message(
            2,
            "Application B",
            &[
                (
                    "b.docx",
                    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                ),
                ("photo.png", "image/png"),
            ],
        ),
        message(3, "Lunch?", &[]),
    ]);
    let calls = Arc::clone(&connector.calls);

    let slot = JobSlot::new();
    let (job, mut events) = slot.begin(FOLDER).unwrap();
    let pipeline = Pipeline::new(connector, store.clone(), config(out.path()));
    let outcome = pipeline.run(FOLDER, &job).await.unwrap();

    assert_eq!(outcome.total_emails, 3);
    assert_eq!(outcome.flagged_emails, 2);
    assert_eq!((outcome.total_pdfs, outcome.total_docx), (1, 1));
    assert_eq!(outcome.suggested_filename, "INBOX.zip");
    assert_eq!(outcome.content_type, "application/zip");

    assert_eq!(outcome.records.len(), 3);
    let labels: Vec<_> = outcome.records.iter().map(|r| r.document_label()).collect();
    assert_eq!(labels, ["PDF", "DOCX", "N/A"]);
    assert!(outcome.records.iter().all(|r| r.filename != "photo.png"));
    assert_eq!(outcome.records[2].filename, "No document found");
    assert_eq!(outcome.records[2].subject, "Lunch?");
    assert_eq!(
        outcome.records[0].body.as_deref(),
        Some("Body of message 1")
    );

    assert_eq!(calls.fetched(), vec![MessageRef(1), MessageRef(2)]);
    assert_eq!(calls.disconnects.load(Ordering::SeqCst), 1);

    assert_eq!(outcome.archives.len(), 1);
    let shard = &outcome.archives[0];
    assert_eq!(shard.name, "INBOX.zip");
    assert_eq!(
        zip_entries(&shard.path),
        [SUMMARY_FILENAME, "a.pdf", "b.docx"]
    );
    assert_eq!(zip_entry(&shard.path, "a.pdf"), b"contents of a.pdf in 1");
    let summary = String::from_utf8(zip_entry(&shard.path, SUMMARY_FILENAME)).unwrap();
    assert_eq!(summary.matches("\r\n").count(), 4);
    assert!(summary.contains("Lunch?"));

    assert!(!store.run_dir(job.job_id()).exists());

    let state = job.tracker().snapshot();
    assert_eq!(state.status, JobStatus::Completed);
    assert_eq!(state.total_messages, 3);
    assert_eq!(state.processed_messages, 2);
    assert_eq!((state.total_pdfs, state.total_docx), (1, 1));

    let events = events.drain();
    let terminal = terminal_events(&events);
    assert_eq!(terminal.len(), 1);
    assert_eq!(terminal[0].kind, EventKind::RunComplete);
    let totals = terminal[0].totals.unwrap();
    assert_eq!(
        (totals.total_emails, totals.total_pdfs, totals.total_docx),
        (3, 1, 1)
    );
    assert_eq!(terminal[0].archives, ["INBOX.zip"]);
    assert_eq!(events.last().unwrap().kind, EventKind::RunComplete);

    let found: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::AttachmentFound)
        .filter_map(|e| e.filename.as_deref())
        .collect();
    assert_eq!(found, ["a.pdf", "b.docx"]);
}

#[tokio::test]
async fn test_empty_folder_completes_without_fetching() {
    let out = tempfile::tempdir().unwrap();
    let connector = FakeConnector::new(Vec::new());
    let calls = Arc::clone(&connector.calls);

    let (result, events, status) = run(
        connector,
        Arc::new(MemoryStore::new()),
        config(out.path()),
        &JobSlot::new(),
    )
    .await;

    let outcome = result.unwrap();
    assert_eq!(outcome.total_emails, 0);
    assert!(outcome.records.is_empty());
    assert!(outcome.archives.is_empty());
    assert_eq!(status, JobStatus::Completed);
    assert_eq!(calls.fetch_calls.load(Ordering::SeqCst), 0);
    assert_eq!(calls.disconnects.load(Ordering::SeqCst), 1);

    let terminal = terminal_events(&events);
    assert_eq!(terminal.len(), 1);
    assert_eq!(terminal[0].kind, EventKind::RunComplete);
    assert_eq!(terminal[0].totals.unwrap().total_emails, 0);
}

#[tokio::test]
async fn test_unflagged_messages_are_never_fetched() {
    let out = tempfile::tempdir().unwrap();
    let connector = FakeConnector::new(vec![
        message(10, "plain", &[]),
        message(11, "report", &[("r.pdf", "application/pdf")]),
        message(12, "plain again", &[]),
    ]);
    let calls = Arc::clone(&connector.calls);

    let (result, _events, _status) = run(
        connector,
        Arc::new(MemoryStore::new()),
        config(out.path()),
        &JobSlot::new(),
    )
    .await;

    let outcome = result.unwrap();
    assert_eq!(calls.fetched(), vec![MessageRef(11)]);
    let subjects: Vec<_> = outcome.records.iter().map(|r| r.subject.as_str()).collect();
    assert_eq!(subjects, ["plain", "report", "plain again"]);
    assert!(outcome.records[0].body.is_none());
}

#[tokio::test]
async fn test_all_unflagged_folder_builds_no_archive() {
    let out = tempfile::tempdir().unwrap();
    let connector = FakeConnector::new(vec![message(1, "a", &[]), message(2, "b", &[])]);
    let calls = Arc::clone(&connector.calls);

    let (result, _events, status) = run(
        connector,
        Arc::new(MemoryStore::new()),
        config(out.path()),
        &JobSlot::new(),
    )
    .await;

    let outcome = result.unwrap();
    assert_eq!(outcome.total_emails, 2);
    assert_eq!(outcome.records.len(), 2);
    assert!(outcome.archives.is_empty());
    assert_eq!(status, JobStatus::Completed);
    assert_eq!(calls.fetch_calls.load(Ordering::SeqCst), 0);
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_flagged_message_without_documents_gets_sentinel() {
    let out = tempfile::tempdir().unwrap();
    let connector = FakeConnector::new(vec![message(1, "photo", &[("cat.png", "image/png")])]);

    let (result, _events, _status) = run(
        connector,
        Arc::new(MemoryStore::new()),
        config(out.path()),
        &JobSlot::new(),
    )
    .await;

    let outcome = result.unwrap();
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].document_label(), "N/A");
    assert_eq!(outcome.records[0].storage_label(), "N/A");
    assert_eq!(outcome.archives.len(), 1);
    assert_eq!(zip_entries(&outcome.archives[0].path), [SUMMARY_FILENAME]);
}

#[tokio::test]
async fn test_duplicate_filenames_are_disambiguated() {
    let out = tempfile::tempdir().unwrap();
    let connector = FakeConnector::new(vec![
        message(1, "first", &[("cv.pdf", "application/pdf")]),
        message(2, "second", &[("cv.pdf", "application/pdf")]),
    ]);

    let (result, _events, _status) = run(
        connector,
        Arc::new(MemoryStore::new()),
        config(out.path()),
        &JobSlot::new(),
    )
    .await;

    let outcome = result.unwrap();
    let names: Vec<_> = outcome.records.iter().map(|r| r.filename.as_str()).collect();
    assert_eq!(names, ["cv.pdf", "cv_1.pdf"]);

    let path = &outcome.archives[0].path;
    assert_eq!(zip_entries(path), [SUMMARY_FILENAME, "cv.pdf", "cv_1.pdf"]);
    assert_eq!(zip_entry(path, "cv.pdf"), b"contents of cv.pdf in 1");
    assert_eq!(zip_entry(path, "cv_1.pdf"), b"contents of cv.pdf in 2");
}

fn flagged_messages(count: u32) -> Vec<FakeMessage> {
    (1..=count)
        .map(|uid| message(uid, "application", &[("cv.pdf", "application/pdf")]))
        .collect()
}

#[tokio::test]
async fn test_batches_update_job_state() {
    let out = tempfile::tempdir().unwrap();
    let connector = FakeConnector::new(flagged_messages(25));
    let calls = Arc::clone(&connector.calls);

    let slot = JobSlot::new();
    let (job, _events) = slot.begin(FOLDER).unwrap();
    let pipeline = Pipeline::new(connector, Arc::new(MemoryStore::new()), config(out.path()));
    let outcome = pipeline.run(FOLDER, &job).await.unwrap();

    assert_eq!(calls.fetch_calls.load(Ordering::SeqCst), 3);
    assert_eq!(outcome.total_pdfs, 25);

    let state = job.tracker().snapshot();
    assert_eq!(state.status, JobStatus::Completed);
    assert_eq!(state.batch_count, 3);
    assert_eq!(state.processed_batches, 3);
    assert_eq!(state.processed_messages, 25);
    assert_eq!(state.total_pdfs, 25);
}

#[tokio::test]
async fn test_cancel_after_first_batch() {
    let out = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());

    let slot = JobSlot::new();
    let (job, mut events) = slot.begin(FOLDER).unwrap();

    let mut connector = FakeConnector::new(flagged_messages(25));
    connector.cancel_after_fetch = Some((1, job.handle()));
    let calls = Arc::clone(&connector.calls);

    let pipeline = Pipeline::new(connector, store.clone(), config(out.path()));
    let err = pipeline.run(FOLDER, &job).await.unwrap_err();

    assert!(matches!(err, HarvestError::Cancelled));
    assert_eq!(calls.fetch_calls.load(Ordering::SeqCst), 1);
    assert_eq!(calls.disconnects.load(Ordering::SeqCst), 1);

    let state = job.tracker().snapshot();
    assert_eq!(state.status, JobStatus::Cancelled);
    assert_eq!(state.processed_batches, 1);
    assert_eq!(state.processed_messages, 10);

    let events = events.drain();
    let terminal = terminal_events(&events);
    assert_eq!(terminal.len(), 1);
    assert_eq!(terminal[0].kind, EventKind::Cancelled);

    assert_eq!(store.run_count().await, 0);
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_failed_batch_fails_run_and_cleans_up() {
    let out = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());

    let mut connector = FakeConnector::new(flagged_messages(15));
    connector.fail_fetch = Some(2);
    let calls = Arc::clone(&connector.calls);

    let (result, events, status) =
        run(connector, store.clone(), config(out.path()), &JobSlot::new()).await;

    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_eq!(status, JobStatus::Failed);
    assert_eq!(calls.disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(store.run_count().await, 0);

    let terminal = terminal_events(&events);
    assert_eq!(terminal.len(), 1);
    assert_eq!(terminal[0].kind, EventKind::RunError);
    assert_eq!(terminal[0].error_kind, Some(ErrorKind::Protocol));
}

#[tokio::test]
async fn test_missing_folder_is_folder_not_found() {
    let out = tempfile::tempdir().unwrap();
    let connector = FakeConnector::new(flagged_messages(1));
    let calls = Arc::clone(&connector.calls);

    let slot = JobSlot::new();
    let (job, mut events) = slot.begin("Nope").unwrap();
    let pipeline = Pipeline::new(connector, Arc::new(MemoryStore::new()), config(out.path()));
    let err = pipeline.run("Nope", &job).await.unwrap_err();

    assert!(matches!(err, HarvestError::FolderNotFound(ref name) if name == "Nope"));
    assert_eq!(calls.disconnects.load(Ordering::SeqCst), 1);
    let events = events.drain();
    assert_eq!(
        terminal_events(&events)[0].error_kind,
        Some(ErrorKind::FolderNotFound)
    );
}

#[tokio::test]
async fn test_connect_failure_is_connection_error() {
    let out = tempfile::tempdir().unwrap();
    let mut connector = FakeConnector::new(flagged_messages(1));
    connector.fail_connect = true;

    let (result, events, status) = run(
        connector,
        Arc::new(MemoryStore::new()),
        config(out.path()),
        &JobSlot::new(),
    )
    .await;

    assert_eq!(result.unwrap_err().kind(), ErrorKind::Connection);
    assert_eq!(status, JobStatus::Failed);
    assert_eq!(
        terminal_events(&events)[0].error_kind,
        Some(ErrorKind::Connection)
    );
}

/// Store that refuses writes for one key.
struct RefusingStore {
    inner: MemoryStore,
    refused: &'static str,
}

#[async_trait]
impl WorkingStore for RefusingStore {
    async fn put(
        &self,
        run: docharvest_core::RunId,
        key: &str,
        data: &[u8],
    ) -> docharvest_core::Result<()> {
        if key == self.refused {
            return Err(HarvestError::Storage("disk full".to_string()));
        }
        self.inner.put(run, key, data).await
    }

    async fn get(
        &self,
        run: docharvest_core::RunId,
        key: &str,
    ) -> docharvest_core::Result<Option<Vec<u8>>> {
        self.inner.get(run, key).await
    }

    async fn list(&self, run: docharvest_core::RunId) -> docharvest_core::Result<Vec<String>> {
        self.inner.list(run).await
    }

    async fn delete_run(&self, run: docharvest_core::RunId) -> docharvest_core::Result<()> {
        self.inner.delete_run(run).await
    }
}

#[tokio::test]
async fn test_write_failure_keeps_record_without_file() {
    let out = tempfile::tempdir().unwrap();
    let store = Arc::new(RefusingStore {
        inner: MemoryStore::new(),
        refused: "broken.pdf",
    });
    let connector = FakeConnector::new(vec![message(
        1,
        "two files",
        &[("broken.pdf", "application/pdf"), ("ok.pdf", "application/pdf")],
    )]);

    let (result, events, status) =
        run(connector, store, config(out.path()), &JobSlot::new()).await;

    let outcome = result.unwrap();
    assert_eq!(status, JobStatus::Completed);
    assert_eq!(outcome.records.len(), 2);

    let found: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::AttachmentFound)
        .filter_map(|e| e.filename.as_deref())
        .collect();
    assert_eq!(found, ["ok.pdf"]);
    assert!(events.iter().any(|e| e.message == "Could not store PDF: broken.pdf"));

    let broken = &outcome.records[0];
    assert_eq!(broken.filename, "broken.pdf");
    assert_eq!(broken.document_type, Some(DocumentType::Pdf));
    assert!(broken.storage_key.is_none());
    assert_eq!(broken.storage_label(), "N/A");

    assert_eq!(outcome.total_pdfs, 1);
    assert_eq!(
        zip_entries(&outcome.archives[0].path),
        [SUMMARY_FILENAME, "ok.pdf"]
    );
}

#[tokio::test]
async fn test_unparseable_message_keeps_header_row() {
    let out = tempfile::tempdir().unwrap();
    let connector = FakeConnector {
        unparseable: Some(MessageRef(2)),
        ..FakeConnector::new(vec![
            message(1, "first", &[("a.pdf", "application/pdf")]),
            message(2, "garbled", &[("b.pdf", "application/pdf")]),
            message(3, "third", &[("c.pdf", "application/pdf")]),
        ])
    };
    let calls = Arc::clone(&connector.calls);

    let (result, _events, status) =
        run(connector, Arc::new(MemoryStore::new()), config(out.path()), &JobSlot::new()).await;

    let outcome = result.unwrap();
    assert_eq!(status, JobStatus::Completed);
    assert_eq!(calls.fetched(), vec![MessageRef(1), MessageRef(2), MessageRef(3)]);
    assert_eq!(outcome.records.len(), 3);

    let garbled: Vec<_> = outcome
        .records
        .iter()
        .filter(|r| r.subject == "garbled")
        .collect();
    assert_eq!(garbled.len(), 1);
    assert_eq!(garbled[0].filename, "No document found");
    assert_eq!(garbled[0].sender_email, "sender2@example.com");
    assert_eq!(garbled[0].document_label(), "N/A");
    assert_eq!(outcome.records[1].subject, "garbled");

    assert_eq!(outcome.total_pdfs, 2);
    assert_eq!(
        zip_entries(&outcome.archives[0].path),
        [SUMMARY_FILENAME, "a.pdf", "c.pdf"]
    );
}

#[tokio::test]
async fn test_inline_delivery_matches_shard() {
    let out = tempfile::tempdir().unwrap();
    let connector = FakeConnector::new(flagged_messages(2));
    let config = HarvestConfig {
        inline_base64: true,
        ..config(out.path())
    };

    let (result, events, _status) =
        run(connector, Arc::new(MemoryStore::new()), config, &JobSlot::new()).await;

    let outcome = result.unwrap();
    let terminal = terminal_events(&events);
    assert_eq!(terminal[0].inline.len(), 1);

    let decoded = STANDARD.decode(&terminal[0].inline[0].data).unwrap();
    assert_eq!(decoded, std::fs::read(&outcome.archives[0].path).unwrap());
}

#[tokio::test]
async fn test_shards_split_large_runs() {
    let out = tempfile::tempdir().unwrap();
    let connector = FakeConnector::new(flagged_messages(5));
    let config = HarvestConfig {
        max_per_archive: 2,
        ..config(out.path())
    };

    let (result, _events, _status) =
        run(connector, Arc::new(MemoryStore::new()), config, &JobSlot::new()).await;

    let outcome = result.unwrap();
    let names: Vec<_> = outcome.archives.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        ["INBOX-part-1.zip", "INBOX-part-2.zip", "INBOX-part-3.zip"]
    );
    assert!(zip_entries(&outcome.archives[0].path).contains(&SUMMARY_FILENAME.to_string()));
    assert!(!zip_entries(&outcome.archives[1].path).contains(&SUMMARY_FILENAME.to_string()));
}

#[tokio::test]
async fn test_second_job_is_rejected_while_first_runs() {
    let slot = JobSlot::new();
    let (job, _events) = slot.begin(FOLDER).unwrap();
    assert!(matches!(slot.begin(FOLDER), Err(HarvestError::JobInFlight)));

    drop(job);
    let out = tempfile::tempdir().unwrap();
    let (result, _events, _status) = run(
        FakeConnector::new(flagged_messages(1)),
        Arc::new(MemoryStore::new()),
        config(out.path()),
        &slot,
    )
    .await;
    assert!(result.is_ok());
}
