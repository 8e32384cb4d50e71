//! Archive shards built from a run's working store.
//!
//! A shard is written by a blocking task that receives one entry at a time
//! over a bounded channel, so at most one attachment is held in memory while
//! the archive is composed.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{HarvestError, Result};
use crate::record::ExtractionRecord;
use crate::store::RunScope;
use crate::summary::SummaryDocument;

/// MIME type of every shard.
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// Default number of attachments per shard.
pub const DEFAULT_MAX_PER_ARCHIVE: usize = 300;

const COMPRESSION_LEVEL: i64 = 9;

/// One finished archive file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveShard {
    /// File name of the shard.
    pub name: String,
    /// Location of the shard on disk.
    pub path: PathBuf,
    /// Attachment entries, in archive order.
    pub entries: Vec<String>,
    /// Whether the summary document is the shard's first entry.
    pub includes_summary: bool,
    /// Size of the shard in bytes.
    pub size: u64,
}

impl ArchiveShard {
    /// Number of attachment entries.
    #[must_use]
    pub fn attachment_count(&self) -> usize {
        self.entries.len()
    }

    /// Reads the shard and encodes it as standard base64, for callers that
    /// cannot reach the output directory.
    ///
    /// # Errors
    ///
    /// Returns `HarvestError::Storage` if the shard cannot be read.
    pub async fn to_base64(&self) -> Result<String> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| HarvestError::storage(&format!("reading {}", self.name), e))?;
        Ok(STANDARD.encode(bytes))
    }
}

/// Builds archive shards into an output directory.
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    output_dir: PathBuf,
    base_name: String,
    max_per_archive: usize,
}

impl ArchiveBuilder {
    /// Creates a builder writing `<base_name>.zip` shards into `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>, base_name: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            base_name: base_name.into(),
            max_per_archive: DEFAULT_MAX_PER_ARCHIVE,
        }
    }

    /// Sets the maximum number of attachments per shard (at least 1).
    #[must_use]
    pub fn max_per_archive(mut self, max: usize) -> Self {
        self.max_per_archive = max.max(1);
        self
    }

    /// Returns the file name of shard `index` (0-based) out of `count`.
    #[must_use]
    pub fn shard_name(&self, index: usize, count: usize) -> String {
        if count <= 1 {
            format!("{}.zip", self.base_name)
        } else {
            format!("{}-part-{}.zip", self.base_name, index + 1)
        }
    }

    /// Writes every persisted attachment referenced by `records`, plus the
    /// summary in the first shard.
    ///
    /// Attachments missing from the store are skipped with a warning. If any
    /// shard fails, every shard written so far is removed.
    ///
    /// # Errors
    ///
    /// Returns `HarvestError::ArchiveBuild` if a shard cannot be written or
    /// finalized.
    pub async fn build(
        &self,
        scope: &RunScope,
        records: &[ExtractionRecord],
        summary: &SummaryDocument,
    ) -> Result<Vec<ArchiveShard>> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| HarvestError::archive("creating output directory", e))?;

        let persisted: Vec<(&str, &str)> = records
            .iter()
            .filter_map(|r| r.storage_key.as_deref().map(|key| (r.filename.as_str(), key)))
            .collect();

        let groups: Vec<&[(&str, &str)]> = if persisted.is_empty() {
            vec![&persisted[..]]
        } else {
            persisted.chunks(self.max_per_archive).collect()
        };

        // Shards are staged under hidden names and only renamed into place once
        // every shard is written, so a failed run leaves earlier archives alone.
        let mut shards = Vec::with_capacity(groups.len());
        for (index, group) in groups.iter().enumerate() {
            let name = self.shard_name(index, groups.len());
            let staging = self
                .output_dir
                .join(format!(".{name}.{}.partial", scope.run_id()));
            let first = (index == 0).then_some(summary);

            match write_shard(staging, name, scope, first, group).await {
                Ok(shard) => shards.push(shard),
                Err(e) => {
                    for shard in &shards {
                        remove_partial(&shard.path).await;
                    }
                    return Err(e);
                }
            }
        }

        let mut placed = Vec::with_capacity(shards.len());
        let mut staged = shards.into_iter();
        while let Some(mut shard) = staged.next() {
            let target = self.output_dir.join(&shard.name);
            if let Err(e) = tokio::fs::rename(&shard.path, &target).await {
                remove_partial(&shard.path).await;
                for rest in staged {
                    remove_partial(&rest.path).await;
                }
                return Err(HarvestError::archive(
                    &format!("moving {} into place", shard.name),
                    e,
                ));
            }
            shard.path = target;
            placed.push(shard);
        }
        let shards = placed;

        info!(
            shards = shards.len(),
            attachments = persisted.len(),
            "archive complete"
        );
        Ok(shards)
    }
}

async fn write_shard(
    path: PathBuf,
    name: String,
    scope: &RunScope,
    summary: Option<&SummaryDocument>,
    group: &[(&str, &str)],
) -> Result<ArchiveShard> {
    let (tx, rx) = mpsc::channel::<(String, Vec<u8>)>(1);

    let writer_path = path.clone();
    let writer = tokio::task::spawn_blocking(move || write_entries(&writer_path, rx));

    let mut entries = Vec::with_capacity(group.len());
    let mut feeding = true;

    if let Some(summary) = summary {
        feeding = tx
            .send((summary.filename().to_string(), summary.as_bytes().to_vec()))
            .await
            .is_ok();
    }

    for (entry, key) in group {
        if !feeding {
            break;
        }
        match scope.get(key).await {
            Ok(Some(data)) => {
                feeding = tx.send(((*entry).to_string(), data)).await.is_ok();
                entries.push((*entry).to_string());
            }
            Ok(None) => warn!(entry, "attachment missing from working store, skipping"),
            Err(e) => warn!(entry, error = %e, "failed to read attachment, skipping"),
        }
    }
    drop(tx);

    let outcome = match writer.await {
        Ok(result) => result,
        Err(e) => Err(HarvestError::archive("archive writer task", e)),
    };

    match outcome {
        Ok(size) => {
            debug!(shard = %name, entries = entries.len(), size, "shard written");
            Ok(ArchiveShard {
                name,
                path,
                entries,
                includes_summary: summary.is_some(),
                size,
            })
        }
        Err(e) => {
            remove_partial(&path).await;
            Err(e)
        }
    }
}

fn write_entries(path: &Path, mut rx: mpsc::Receiver<(String, Vec<u8>)>) -> Result<u64> {
    let file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| HarvestError::archive(&format!("creating {}", path.display()), e))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(COMPRESSION_LEVEL));

    while let Some((name, data)) = rx.blocking_recv() {
        zip.start_file(name.as_str(), options)
            .map_err(|e| HarvestError::archive(&format!("adding {name}"), e))?;
        zip.write_all(&data)
            .map_err(|e| HarvestError::archive(&format!("writing {name}"), e))?;
    }

    let mut buffered = zip
        .finish()
        .map_err(|e| HarvestError::archive("finalizing archive", e))?;
    buffered
        .flush()
        .map_err(|e| HarvestError::archive("flushing archive", e))?;
    let file = buffered
        .into_inner()
        .map_err(|e| HarvestError::archive("flushing archive", e.error()))?;
    file.sync_all()
        .map_err(|e| HarvestError::archive("syncing archive", e))?;

    file.metadata()
        .map(|m| m.len())
        .map_err(|e| HarvestError::archive("reading archive size", e))
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove partial archive");
        }
    }
}
