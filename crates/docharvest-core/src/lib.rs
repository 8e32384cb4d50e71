//! # docharvest-core
//!
//! Harvesting pipeline for docharvest.
//!
//! This crate provides:
//! - Attachment classification (PDF / DOCX)
//! - Per-run working store with guaranteed cleanup
//! - Batched extraction with progress events and cancellation
//! - **Summary document** - one CSV row per record
//! - **Archive shards** - streamed ZIP output, summary in the first shard
//! - **Job bookkeeping** - observable status and counters, one job at a time
//! - Provider presets and persisted settings

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod archive;
pub mod classify;
pub mod config;
mod error;
pub mod job;
pub mod pipeline;
pub mod progress;
pub mod providers;
pub mod record;
pub mod sanitize;
pub mod store;
pub mod summary;

pub use archive::{ARCHIVE_CONTENT_TYPE, ArchiveBuilder, ArchiveShard};
pub use classify::{DocumentType, classify};
pub use config::HarvestConfig;
pub use error::{ErrorKind, HarvestError, Result};
pub use job::{ActiveJob, JobHandle, JobSlot, JobState, JobStatus, JobTracker, RunStage};
pub use pipeline::{ExtractionOutcome, Pipeline};
pub use progress::{
    EventKind, InlineArchive, ProgressEvent, ProgressReceiver, ProgressSender, RunTotals,
};
pub use providers::Provider;
pub use record::{ExtractionRecord, MessageContext};
pub use sanitize::{FilenameAllocator, sanitize_folder_name, suggested_archive_name};
pub use store::{FsStore, MemoryStore, RunId, RunScope, WorkingStore};
pub use summary::{SUMMARY_FILENAME, SummaryDocument};
