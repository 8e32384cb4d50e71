//! Attachment classification by content type and filename.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A document type the harvester keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    /// Portable Document Format.
    #[serde(rename = "PDF")]
    Pdf,
    /// Word document (`.docx` or legacy `.doc`).
    #[serde(rename = "DOCX")]
    Docx,
}

impl DocumentType {
    /// Returns the label used in summaries and progress events.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Docx => "DOCX",
        }
    }

    /// Returns the extension appended to filenames that lack one.
    #[must_use]
    pub const fn default_extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }

    /// Returns true if `filename` already ends with an extension of this type.
    #[must_use]
    pub fn has_extension(self, filename: &str) -> bool {
        let lower = filename.to_lowercase();
        match self {
            Self::Pdf => lower.ends_with(".pdf"),
            Self::Docx => lower.ends_with(".docx") || lower.ends_with(".doc"),
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classifies an attachment.
///
/// Matching is case-insensitive and PDF is checked first:
/// - PDF if the content type contains `pdf` or the filename ends in `.pdf`
/// - DOCX if the content type contains `wordprocessingml` or `msword`, or
///   the filename ends in `.docx` / `.doc`
#[must_use]
pub fn classify(filename: &str, content_type: &str) -> Option<DocumentType> {
    let content_type = content_type.to_lowercase();
    let filename = filename.to_lowercase();

    if content_type.contains("pdf") || filename.ends_with(".pdf") {
        return Some(DocumentType::Pdf);
    }
    if content_type.contains("wordprocessingml")
        || content_type.contains("msword")
        || filename.ends_with(".docx")
        || filename.ends_with(".doc")
    {
        return Some(DocumentType::Docx);
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_classify_examples() {
        assert_eq!(
            classify("resume.pdf", "application/octet-stream"),
            Some(DocumentType::Pdf)
        );
        assert_eq!(
            classify("cv.docx", "application/msword"),
            Some(DocumentType::Docx)
        );
        assert_eq!(classify("notes.txt", "text/plain"), None);
        assert_eq!(classify("Report.PDF", ""), Some(DocumentType::Pdf));
    }

    #[test]
    fn test_pdf_wins_over_docx() {
        assert_eq!(
            classify("letter.docx", "application/pdf"),
            Some(DocumentType::Pdf)
        );
    }

    #[test]
    fn test_content_type_alone() {
        assert_eq!(
            classify(
                "",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            ),
            Some(DocumentType::Docx)
        );
        assert_eq!(classify("", "APPLICATION/PDF"), Some(DocumentType::Pdf));
        assert_eq!(classify("legacy.DOC", ""), Some(DocumentType::Docx));
        assert_eq!(classify("photo.png", "image/png"), None);
    }

    #[test]
    fn test_has_extension() {
        assert!(DocumentType::Pdf.has_extension("A.PDF"));
        assert!(!DocumentType::Pdf.has_extension("a.pdf.txt"));
        assert!(DocumentType::Docx.has_extension("old.doc"));
        assert!(!DocumentType::Docx.has_extension("docx"));
    }

    proptest! {
        #[test]
        fn prop_classify_is_deterministic(name in ".{0,40}", ct in ".{0,40}") {
            prop_assert_eq!(classify(&name, &ct), classify(&name, &ct));
        }

        #[test]
        fn prop_classify_ignores_case(name in "[a-zA-Z0-9_.]{0,20}", ct in "[a-zA-Z/.-]{0,30}") {
            prop_assert_eq!(
                classify(&name, &ct),
                classify(&name.to_uppercase(), &ct.to_uppercase())
            );
        }

        #[test]
        fn prop_pdf_suffix_always_pdf(stem in "[a-zA-Z0-9 _-]{0,20}", ct in "[a-z/]{0,20}") {
            let name = format!("{stem}.pdf");
            prop_assert_eq!(classify(&name, &ct), Some(DocumentType::Pdf));
        }
    }
}
