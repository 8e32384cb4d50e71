//! The extraction run.
//!
//! A run connects, searches the folder, scans message structures, fetches the
//! flagged messages batch by batch and finally builds the summary and archive
//! shards. Batches run one after another; cancellation is honoured at every
//! batch boundary and before finalizing.

use std::collections::HashMap;
use std::sync::Arc;

use docharvest_imap::{AttachmentScan, Connector, MailSession, MessageRef, ParsedMessage};
use tracing::{debug, error, info, warn};

use crate::archive::{ARCHIVE_CONTENT_TYPE, ArchiveBuilder, ArchiveShard};
use crate::classify::{DocumentType, classify};
use crate::config::HarvestConfig;
use crate::error::{HarvestError, Result};
use crate::job::{ActiveJob, RunStage};
use crate::progress::{EventKind, InlineArchive, ProgressEvent, RunTotals};
use crate::record::{ExtractionRecord, MessageContext};
use crate::sanitize::{FilenameAllocator, archive_base_name, suggested_archive_name};
use crate::store::{RunId, RunScope, WorkingStore};
use crate::summary::SummaryDocument;

/// Everything a finished run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionOutcome {
    /// Job identifier.
    pub job_id: RunId,
    /// Folder that was harvested.
    pub folder: String,
    /// Messages in the folder.
    pub total_emails: usize,
    /// Messages flagged by the structural scan.
    pub flagged_emails: usize,
    /// PDF attachments persisted.
    pub total_pdfs: usize,
    /// DOCX attachments persisted.
    pub total_docx: usize,
    /// Summary records in server message order.
    pub records: Vec<ExtractionRecord>,
    /// Archive shards. Empty when no message was flagged.
    pub archives: Vec<ArchiveShard>,
    /// Base64 shard data, when inline delivery is enabled.
    pub inline: Vec<InlineArchive>,
    /// Suggested download name for the archive.
    pub suggested_filename: String,
    /// MIME type of the archive.
    pub content_type: &'static str,
}

impl ExtractionOutcome {
    /// Totals reported on the completion event.
    #[must_use]
    pub const fn totals(&self) -> RunTotals {
        RunTotals {
            total_emails: self.total_emails,
            total_pdfs: self.total_pdfs,
            total_docx: self.total_docx,
        }
    }
}

#[derive(Debug, Default)]
struct Harvest {
    total_emails: usize,
    flagged: usize,
    pdfs: usize,
    docx: usize,
    records: Vec<ExtractionRecord>,
}

/// Runs extractions against the sessions produced by a [`Connector`].
pub struct Pipeline<C> {
    connector: C,
    store: Arc<dyn WorkingStore>,
    config: HarvestConfig,
}

impl<C> std::fmt::Debug for Pipeline<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<C: Connector> Pipeline<C> {
    /// Creates a pipeline.
    #[must_use]
    pub fn new(connector: C, store: Arc<dyn WorkingStore>, config: HarvestConfig) -> Self {
        Self {
            connector,
            store,
            config,
        }
    }

    /// Returns the pipeline's settings.
    #[must_use]
    pub const fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Harvests `folder` for `job`.
    ///
    /// Exactly one terminal progress event is emitted, whatever the outcome,
    /// and the run's working store namespace is deleted before returning.
    ///
    /// # Errors
    ///
    /// Returns `HarvestError::Cancelled` if the job was cancelled, or the
    /// error that ended the run.
    pub async fn run(&self, folder: &str, job: &ActiveJob) -> Result<ExtractionOutcome> {
        info!(job = %job.job_id(), folder, "extraction started");

        let scope = RunScope::with_id(Arc::clone(&self.store), job.job_id());
        let result = self.execute(folder, job, &scope).await;
        scope.release().await;

        finish(job, &result);
        result
    }

    async fn execute(
        &self,
        folder: &str,
        job: &ActiveJob,
        scope: &RunScope,
    ) -> Result<ExtractionOutcome> {
        self.config.validate()?;
        if job.is_cancelled() {
            return Err(HarvestError::Cancelled);
        }

        job.tracker().set_stage(RunStage::Connecting);
        job.emit(ProgressEvent::scan(format!(
            "Connecting to {}...",
            self.connector.describe()
        )));
        let mut session = self
            .connector
            .connect()
            .await
            .map_err(|e| HarvestError::Connection(e.to_string()))?;

        let harvested = self.harvest(&mut session, folder, job, scope).await;
        session.disconnect().await;
        let harvest = harvested?;

        if harvest.flagged == 0 {
            debug!(folder, "nothing flagged, skipping archive");
            return Ok(outcome(job, folder, harvest, Vec::new(), Vec::new()));
        }
        if job.is_cancelled() {
            return Err(HarvestError::Cancelled);
        }
        self.finalize(folder, job, scope, harvest).await
    }

    async fn harvest(
        &self,
        session: &mut C::Session,
        folder: &str,
        job: &ActiveJob,
        scope: &RunScope,
    ) -> Result<Harvest> {
        job.tracker().set_stage(RunStage::Scanning);
        job.emit(ProgressEvent::scan(format!("Opening folder {folder}...")));
        session.open_box(folder).await?;

        let ids = session.search_all().await?;
        let total = ids.len();
        job.emit(ProgressEvent::scan(format!("Found {total} emails in folder")).with_counts(0, total));
        if total == 0 {
            job.tracker().set_totals(0, 0, 0);
            return Ok(Harvest::default());
        }

        job.emit(ProgressEvent::scan("Scanning for emails with attachments..."));
        let scan = session.scan_for_attachments(&ids).await?;
        let flagged = scan.flagged(&ids);
        let batch_size = self.config.fetch_batch_size;
        let batch_count = flagged.len().div_ceil(batch_size);
        job.tracker().set_totals(total, flagged.len(), batch_count);
        job.emit(
            ProgressEvent::scan(format!(
                "Found {} emails with attachments out of {total} total",
                flagged.len()
            ))
            .with_counts(flagged.len(), total),
        );
        info!(total, flagged = flagged.len(), batch_count, "scan complete");

        let position: HashMap<MessageRef, usize> =
            ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let mut slots: Vec<Vec<ExtractionRecord>> = ids
            .iter()
            .map(|id| {
                if scan.has_attachment(*id) {
                    Vec::new()
                } else {
                    vec![ExtractionRecord::no_document(&scanned_context(&scan, *id))]
                }
            })
            .collect();

        let mut harvest = Harvest {
            total_emails: total,
            flagged: flagged.len(),
            ..Harvest::default()
        };
        let mut names = FilenameAllocator::new();
        let mut processed = 0;

        job.tracker().set_stage(RunStage::BatchProcessing);
        for (index, batch) in flagged.chunks(batch_size).enumerate() {
            if job.is_cancelled() {
                info!(batch = index + 1, batch_count, "extraction cancelled");
                return Err(HarvestError::Cancelled);
            }

            let end = processed + batch.len();
            job.tracker().start_batch();
            job.emit(
                ProgressEvent::scan(format!(
                    "Processing batch {}/{batch_count} (emails {}-{end} of {})",
                    index + 1,
                    processed + 1,
                    flagged.len()
                ))
                .with_counts(processed, flagged.len()),
            );

            let messages = session.fetch_full(batch).await?;
            let (mut pdfs, mut docx) = (0, 0);
            for message in &messages {
                let Some(&pos) = position.get(&message.id) else {
                    warn!(uid = %message.id, "fetched message was not requested");
                    continue;
                };
                let records = self
                    .extract(message, &mut names, scope, job, (end, flagged.len()))
                    .await;
                for record in records.iter().filter(|r| r.is_persisted()) {
                    match record.document_type {
                        Some(DocumentType::Pdf) => pdfs += 1,
                        Some(DocumentType::Docx) => docx += 1,
                        None => {}
                    }
                }
                slots[pos] = records;
            }

            for id in batch {
                if let Some(&pos) = position.get(id)
                    && slots[pos].is_empty()
                {
                    warn!(uid = %id, "message could not be fetched, recording headers only");
                    slots[pos].push(ExtractionRecord::no_document(&scanned_context(&scan, *id)));
                }
            }

            processed = end;
            harvest.pdfs += pdfs;
            harvest.docx += docx;
            job.tracker().complete_batch(batch.len(), pdfs, docx);
            job.emit(
                ProgressEvent::scan(format!("Batch {}/{batch_count} complete", index + 1))
                    .with_counts(processed, flagged.len()),
            );
            debug!(batch = index + 1, pdfs, docx, "batch complete");
        }

        harvest.records = slots.into_iter().flatten().collect();
        Ok(harvest)
    }

    /// Classifies and stores one message's attachments.
    async fn extract(
        &self,
        message: &ParsedMessage,
        names: &mut FilenameAllocator,
        scope: &RunScope,
        job: &ActiveJob,
        (current, total): (usize, usize),
    ) -> Vec<ExtractionRecord> {
        let body = if self.config.include_body {
            message.body_text.as_deref()
        } else {
            None
        };
        let context = MessageContext::new(&message.headers, body);

        let mut records = Vec::new();
        for attachment in &message.attachments {
            let declared = attachment.filename.as_deref();
            let Some(kind) = classify(declared.unwrap_or(""), &attachment.content_type) else {
                continue;
            };

            let filename = names.allocate(declared, kind);
            let storage_key = match scope.put(&filename, &attachment.data).await {
                Ok(()) => {
                    job.emit(
                        ProgressEvent::new(
                            EventKind::AttachmentFound,
                            format!("Downloaded {kind}: {filename}"),
                        )
                        .with_attachment(filename.clone(), kind)
                        .with_counts(current, total),
                    );
                    Some(filename.clone())
                }
                Err(e) => {
                    warn!(uid = %message.id, %filename, error = %e, "failed to store attachment");
                    job.emit(
                        ProgressEvent::scan(format!("Could not store {kind}: {filename}"))
                            .with_counts(current, total),
                    );
                    None
                }
            };
            records.push(ExtractionRecord::document(&context, filename, storage_key, kind));
        }

        if records.is_empty() {
            records.push(ExtractionRecord::no_document(&context));
        }
        records
    }

    async fn finalize(
        &self,
        folder: &str,
        job: &ActiveJob,
        scope: &RunScope,
        harvest: Harvest,
    ) -> Result<ExtractionOutcome> {
        job.tracker().set_stage(RunStage::Finalizing);

        job.emit(ProgressEvent::new(EventKind::SummaryBuilding, "Generating summary..."));
        let summary = SummaryDocument::build(&harvest.records, self.config.include_body);
        job.emit(ProgressEvent::new(
            EventKind::SummaryBuilding,
            format!("Summary created with {} rows", summary.rows()),
        ));

        job.emit(ProgressEvent::new(EventKind::ArchiveBuilding, "Creating ZIP archive..."));
        let archives = ArchiveBuilder::new(self.config.output_dir.clone(), archive_base_name(folder))
            .max_per_archive(self.config.max_per_archive)
            .build(scope, &harvest.records, &summary)
            .await?;
        job.emit(ProgressEvent::new(
            EventKind::ArchiveBuilding,
            format!("Created {} archive file(s)", archives.len()),
        ));

        let mut inline = Vec::new();
        if self.config.inline_base64 {
            for shard in &archives {
                inline.push(InlineArchive {
                    name: shard.name.clone(),
                    data: shard.to_base64().await?,
                });
            }
        }

        Ok(outcome(job, folder, harvest, archives, inline))
    }

}

fn outcome(
    job: &ActiveJob,
    folder: &str,
    harvest: Harvest,
    archives: Vec<ArchiveShard>,
    inline: Vec<InlineArchive>,
) -> ExtractionOutcome {
    ExtractionOutcome {
        job_id: job.job_id(),
        folder: folder.to_string(),
        total_emails: harvest.total_emails,
        flagged_emails: harvest.flagged,
        total_pdfs: harvest.pdfs,
        total_docx: harvest.docx,
        records: harvest.records,
        archives,
        inline,
        suggested_filename: suggested_archive_name(folder),
        content_type: ARCHIVE_CONTENT_TYPE,
    }
}

fn scanned_context(scan: &AttachmentScan, id: MessageRef) -> MessageContext {
    let headers = scan.headers(id).cloned().unwrap_or_default();
    MessageContext::new(&headers, None)
}

/// Records the final status and emits the terminal event.
fn finish(job: &ActiveJob, result: &Result<ExtractionOutcome>) {
    match result {
        Ok(outcome) => {
            job.tracker().complete();
            let mut event = ProgressEvent::new(
                EventKind::RunComplete,
                format!(
                    "Extraction complete: {} PDFs and {} DOCX files from {} emails",
                    outcome.total_pdfs, outcome.total_docx, outcome.total_emails
                ),
            )
            .with_totals(outcome.totals());
            event.archives = outcome.archives.iter().map(|s| s.name.clone()).collect();
            event.inline.clone_from(&outcome.inline);
            job.emit(event);
            info!(
                job = %job.job_id(),
                emails = outcome.total_emails,
                pdfs = outcome.total_pdfs,
                docx = outcome.total_docx,
                "extraction complete"
            );
        }
        Err(HarvestError::Cancelled) => {
            job.tracker().cancel();
            job.emit(ProgressEvent::new(EventKind::Cancelled, "Extraction cancelled"));
            info!(job = %job.job_id(), "extraction cancelled");
        }
        Err(e) => {
            job.tracker().fail(e.to_string());
            job.emit(ProgressEvent::new(EventKind::RunError, e.to_string()).with_error_kind(e.kind()));
            error!(job = %job.job_id(), error = %e, "extraction failed");
        }
    }
}
