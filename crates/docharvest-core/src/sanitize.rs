//! Filename and folder-name sanitising.

use std::collections::HashSet;

use crate::classify::DocumentType;
use crate::summary::SUMMARY_FILENAME;

/// Longest sanitised attachment filename, in UTF-8 bytes.
///
/// Leaves room under the usual 255-byte filesystem limit for an appended
/// extension and a `_<n>` suffix.
pub const MAX_FILENAME_BYTES: usize = 240;

/// Archive base name used when a folder name sanitises to nothing.
pub const FALLBACK_ARCHIVE_BASE: &str = "email-documents";

const FORBIDDEN: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Replaces path-hostile and control characters with `_` and caps the
/// length, keeping the extension when the name is shortened.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if FORBIDDEN.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    if cleaned.len() <= MAX_FILENAME_BYTES {
        return cleaned;
    }

    match split_extension(&cleaned) {
        (stem, Some(ext)) if ext.len() + 1 < MAX_FILENAME_BYTES => {
            let stem = truncate_bytes(stem, MAX_FILENAME_BYTES - ext.len() - 1);
            format!("{stem}.{ext}")
        }
        _ => truncate_bytes(&cleaned, MAX_FILENAME_BYTES).to_string(),
    }
}

/// Cuts `s` to at most `max` bytes on a char boundary.
fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}

/// Hands out collision-free attachment filenames for one run.
///
/// Comparison is case-insensitive, so `CV.pdf` and `cv.pdf` never share an
/// archive entry. The summary document's name is reserved up front.
#[derive(Debug, Clone)]
pub struct FilenameAllocator {
    used: HashSet<String>,
    unnamed: usize,
}

impl Default for FilenameAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl FilenameAllocator {
    /// Creates an allocator with the summary filename reserved.
    #[must_use]
    pub fn new() -> Self {
        let mut used = HashSet::new();
        used.insert(SUMMARY_FILENAME.to_lowercase());
        Self { used, unnamed: 0 }
    }

    /// Returns a unique filename for an attachment of `document_type`.
    ///
    /// Missing names become `attachment_<n>.<ext>`; names without a matching
    /// extension get one appended; duplicates get `_1`, `_2`, ... before the
    /// extension.
    pub fn allocate(&mut self, declared: Option<&str>, document_type: DocumentType) -> String {
        let ext = document_type.default_extension();

        let mut name = declared
            .map(sanitize_filename)
            .filter(|n| !n.trim_matches(['.', '_', ' ']).is_empty())
            .unwrap_or_else(|| {
                self.unnamed += 1;
                format!("attachment_{}.{ext}", self.unnamed)
            });

        if !document_type.has_extension(&name) {
            name = format!("{name}.{ext}");
        }

        if self.used.insert(name.to_lowercase()) {
            return name;
        }

        // Every name ends in a document extension here, so a leading-dot name
        // such as `.pdf` is an empty stem plus extension.
        let (stem, ext) = match name.rfind('.') {
            Some(idx) if idx + 1 < name.len() => (&name[..idx], Some(&name[idx + 1..])),
            _ => (name.as_str(), None),
        };
        let mut counter = 1usize;
        loop {
            let candidate = ext.map_or_else(
                || format!("{stem}_{counter}"),
                |ext| format!("{stem}_{counter}.{ext}"),
            );
            if self.used.insert(candidate.to_lowercase()) {
                return candidate;
            }
            counter += 1;
        }
    }

    /// Number of names handed out, excluding the reserved summary name.
    #[must_use]
    pub fn len(&self) -> usize {
        self.used.len() - 1
    }

    /// Returns true if no names were handed out.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Turns a folder name into a filename-safe base.
///
/// Path-hostile characters, whitespace and dots become `_`, runs of `_`
/// collapse to one, and leading/trailing `_` are trimmed.
#[must_use]
pub fn sanitize_folder_name(folder: &str) -> String {
    let mut out = String::with_capacity(folder.len());
    for c in folder.chars() {
        let c = if FORBIDDEN.contains(&c) || c.is_whitespace() || c == '.' || c.is_control() {
            '_'
        } else {
            c
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches('_').to_string()
}

/// Returns the base name (without `.zip`) for a folder's archive.
#[must_use]
pub fn archive_base_name(folder: &str) -> String {
    let base = sanitize_folder_name(folder);
    if base.is_empty() {
        FALLBACK_ARCHIVE_BASE.to_string()
    } else {
        base
    }
}

/// Returns the suggested download filename for a folder's archive.
#[must_use]
pub fn suggested_archive_name(folder: &str) -> String {
    format!("{}.zip", archive_base_name(folder))
}
