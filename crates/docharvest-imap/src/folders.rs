//! Folder hierarchy flattening.

use crate::session::FolderInfo;

/// One LIST entry: the server path and its hierarchy delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedFolder {
    /// Server-side mailbox path.
    pub path: String,
    /// Hierarchy delimiter, if the server reported one.
    pub delimiter: Option<String>,
}

impl ListedFolder {
    /// Creates a listed folder entry.
    #[must_use]
    pub fn new(path: impl Into<String>, delimiter: Option<&str>) -> Self {
        Self {
            path: path.into(),
            delimiter: delimiter.map(str::to_string),
        }
    }

    fn segments(&self) -> Vec<&str> {
        match self.delimiter.as_deref() {
            Some(delim) if !delim.is_empty() => self.path.split(delim).collect(),
            _ => vec![self.path.as_str()],
        }
    }
}

#[derive(Debug)]
struct FolderNode<'a> {
    segment: &'a str,
    path: Option<&'a str>,
    children: Vec<FolderNode<'a>>,
}

impl<'a> FolderNode<'a> {
    const fn new(segment: &'a str) -> Self {
        Self {
            segment,
            path: None,
            children: Vec::new(),
        }
    }

    fn child(&mut self, segment: &'a str) -> &mut Self {
        let idx = if let Some(idx) = self.children.iter().position(|c| c.segment == segment) {
            idx
        } else {
            self.children.push(Self::new(segment));
            self.children.len() - 1
        };
        &mut self.children[idx]
    }

    fn flatten_into(&self, prefix: &str, out: &mut Vec<FolderInfo>) {
        for child in &self.children {
            let display_name = if prefix.is_empty() {
                child.segment.to_string()
            } else {
                format!("{prefix}.{}", child.segment)
            };

            if let Some(path) = child.path {
                out.push(FolderInfo {
                    name: path.to_string(),
                    display_name: display_name.clone(),
                });
            }

            child.flatten_into(&display_name, out);
        }
    }
}

/// Builds the folder tree from LIST entries and flattens it depth-first.
///
/// Parents are emitted before their children; siblings keep server order.
/// Display names always use `.` between levels, whatever the server
/// delimiter is.
#[must_use]
pub fn flatten_folders(listed: &[ListedFolder]) -> Vec<FolderInfo> {
    let mut root = FolderNode::new("");

    for folder in listed {
        let mut node = &mut root;
        for segment in folder.segments() {
            node = node.child(segment);
        }
        node.path = Some(folder.path.as_str());
    }

    let mut out = Vec::with_capacity(listed.len());
    root.flatten_into("", &mut out);
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn names(folders: &[FolderInfo]) -> Vec<(&str, &str)> {
        folders
            .iter()
            .map(|f| (f.name.as_str(), f.display_name.as_str()))
            .collect()
    }

    #[test]
    fn test_flat_list() {
        let listed = [
            ListedFolder::new("INBOX", Some(".")),
            ListedFolder::new("Sent", Some(".")),
        ];
        assert_eq!(
            names(&flatten_folders(&listed)),
            vec![("INBOX", "INBOX"), ("Sent", "Sent")]
        );
    }

    #[test]
    fn test_slash_delimiter_is_flattened_with_dots() {
        let listed = [
            ListedFolder::new("Projects", Some("/")),
            ListedFolder::new("Projects/2025/Hiring", Some("/")),
            ListedFolder::new("Projects/2025", Some("/")),
        ];
        assert_eq!(
            names(&flatten_folders(&listed)),
            vec![
                ("Projects", "Projects"),
                ("Projects/2025", "Projects.2025"),
                ("Projects/2025/Hiring", "Projects.2025.Hiring"),
            ]
        );
    }

    #[test]
    fn test_unlisted_parent_still_prefixes_children() {
        let listed = [ListedFolder::new("[Gmail]/Sent Mail", Some("/"))];
        assert_eq!(
            names(&flatten_folders(&listed)),
            vec![("[Gmail]/Sent Mail", "[Gmail].Sent Mail")]
        );
    }

    #[test]
    fn test_no_delimiter_keeps_name_whole() {
        let listed = [ListedFolder::new("a.b", None)];
        assert_eq!(names(&flatten_folders(&listed)), vec![("a.b", "a.b")]);
    }

    #[test]
    fn test_children_grouped_under_parent() {
        let listed = [
            ListedFolder::new("INBOX", Some(".")),
            ListedFolder::new("Archive", Some(".")),
            ListedFolder::new("INBOX.Resumes", Some(".")),
        ];
        assert_eq!(
            names(&flatten_folders(&listed)),
            vec![
                ("INBOX", "INBOX"),
                ("INBOX.Resumes", "INBOX.Resumes"),
                ("Archive", "Archive"),
            ]
        );
    }
}
