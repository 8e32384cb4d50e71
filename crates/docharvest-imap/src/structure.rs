//! MIME structure tree used by the cheap attachment scan.
//!
//! The scan only downloads `BODYSTRUCTURE`, converts it into a [`MimeNode`]
//! tree and asks whether any part looks like an attachment. Full bodies are
//! fetched later, and only for messages the scan flags.

use async_imap::imap_proto::types::{BodyParams, BodyStructure, ContentDisposition};

/// A node of a message's MIME tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MimeNode {
    /// A single body part.
    Leaf {
        /// MIME type, lowercased (`application`, `text`, ...).
        media_type: String,
        /// MIME subtype, lowercased (`pdf`, `plain`, ...).
        media_subtype: String,
        /// Content-Disposition type, lowercased (`attachment`, `inline`).
        disposition: Option<String>,
        /// Declared filename from the disposition or `name` parameter.
        filename: Option<String>,
    },
    /// A multipart container.
    Multipart {
        /// Multipart subtype, lowercased (`mixed`, `alternative`, ...).
        media_subtype: String,
        /// Child parts.
        children: Vec<Self>,
    },
}

impl MimeNode {
    /// Creates a leaf node.
    #[must_use]
    pub fn leaf(media_type: &str, media_subtype: &str) -> Self {
        Self::Leaf {
            media_type: media_type.to_ascii_lowercase(),
            media_subtype: media_subtype.to_ascii_lowercase(),
            disposition: None,
            filename: None,
        }
    }

    /// Creates a multipart node.
    #[must_use]
    pub fn multipart(media_subtype: &str, children: Vec<Self>) -> Self {
        Self::Multipart {
            media_subtype: media_subtype.to_ascii_lowercase(),
            children,
        }
    }

    /// Sets the disposition (and optional filename) of a leaf node.
    #[must_use]
    pub fn with_disposition(mut self, kind: &str, name: Option<&str>) -> Self {
        if let Self::Leaf {
            disposition,
            filename,
            ..
        } = &mut self
        {
            *disposition = Some(kind.to_ascii_lowercase());
            *filename = name.map(str::to_string);
        }
        self
    }

    /// Converts an IMAP `BODYSTRUCTURE` into a tree.
    ///
    /// An encapsulated `message/rfc822` part becomes a multipart holding the
    /// message part itself followed by its inner structure.
    #[must_use]
    pub fn from_body_structure(body: &BodyStructure<'_>) -> Self {
        match body {
            BodyStructure::Basic { common, .. } | BodyStructure::Text { common, .. } => leaf_from(
                &common.ty.ty,
                &common.ty.subtype,
                common.disposition.as_ref(),
                &common.ty.params,
            ),
            BodyStructure::Message { common, body, .. } => {
                let part = leaf_from(
                    &common.ty.ty,
                    &common.ty.subtype,
                    common.disposition.as_ref(),
                    &common.ty.params,
                );
                Self::multipart("rfc822", vec![part, Self::from_body_structure(body)])
            }
            BodyStructure::Multipart { common, bodies, .. } => Self::multipart(
                &common.ty.subtype,
                bodies.iter().map(Self::from_body_structure).collect(),
            ),
        }
    }

    /// Returns whether any part is `application/*` or has an `attachment`
    /// disposition.
    ///
    /// A message with no parts maps to `false`. The answer only says a
    /// document *may* be present; classification happens after full fetch.
    #[must_use]
    pub fn has_candidate_attachment(&self) -> bool {
        let mut pending = vec![self];

        while let Some(node) = pending.pop() {
            match node {
                Self::Leaf {
                    media_type,
                    disposition,
                    ..
                } => {
                    if media_type == "application" || disposition.as_deref() == Some("attachment")
                    {
                        return true;
                    }
                }
                Self::Multipart { children, .. } => pending.extend(children.iter()),
            }
        }

        false
    }

    /// Counts the leaf parts of the tree.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Leaf { .. } => 1,
            Self::Multipart { children, .. } => children.iter().map(Self::leaf_count).sum(),
        }
    }
}

fn leaf_from(
    media_type: &str,
    media_subtype: &str,
    disposition: Option<&ContentDisposition<'_>>,
    type_params: &BodyParams<'_>,
) -> MimeNode {
    let filename = disposition
        .and_then(|d| find_param(&d.params, "filename"))
        .or_else(|| find_param(type_params, "name"));

    MimeNode::Leaf {
        media_type: media_type.to_ascii_lowercase(),
        media_subtype: media_subtype.to_ascii_lowercase(),
        disposition: disposition.map(|d| d.ty.to_ascii_lowercase()),
        filename,
    }
}

fn find_param(params: &BodyParams<'_>, key: &str) -> Option<String> {
    params
        .as_ref()?
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.to_string())
}
