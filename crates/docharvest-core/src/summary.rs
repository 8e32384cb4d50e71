//! Tabular summary of a run's records.
//!
//! The summary is CSV, UTF-8 with a BOM so spreadsheet tools open it with the
//! right encoding. Rows follow record production order.

use crate::record::ExtractionRecord;

/// Archive entry name of the summary document.
pub const SUMMARY_FILENAME: &str = "email_documents_summary.csv";

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

const COLUMNS: &[&str] = &[
    "Sender Name",
    "Sender Email",
    "Subject",
    "Date",
    "File Type",
    "Filename",
    "File Path",
];

const BODY_COLUMN: &str = "Email Body";

/// A rendered summary document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryDocument {
    bytes: Vec<u8>,
    rows: usize,
}

impl SummaryDocument {
    /// Renders one row per record, with an optional body column.
    #[must_use]
    pub fn build(records: &[ExtractionRecord], include_body: bool) -> Self {
        let mut out = String::new();

        let mut header: Vec<&str> = COLUMNS.to_vec();
        if include_body {
            header.push(BODY_COLUMN);
        }
        push_row(&mut out, header.iter().copied());

        for record in records {
            let mut fields = vec![
                record.sender_name.as_str(),
                record.sender_email.as_str(),
                record.subject.as_str(),
                record.date.as_str(),
                record.document_label(),
                record.filename.as_str(),
                record.storage_label(),
            ];
            if include_body {
                fields.push(record.body.as_deref().unwrap_or(""));
            }
            push_row(&mut out, fields.into_iter());
        }

        let mut bytes = Vec::with_capacity(UTF8_BOM.len() + out.len());
        bytes.extend_from_slice(UTF8_BOM);
        bytes.extend_from_slice(out.as_bytes());

        Self {
            bytes,
            rows: records.len(),
        }
    }

    /// Entry name inside the archive.
    #[must_use]
    pub const fn filename(&self) -> &'static str {
        SUMMARY_FILENAME
    }

    /// Encoded document.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of data rows, excluding the header.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }
}

fn push_row<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&csv_escape(field));
    }
    out.push_str("\r\n");
}

/// Escapes a value for CSV (RFC 4180).
fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
