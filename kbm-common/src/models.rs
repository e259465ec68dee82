//! Knowledge base data model
//!
//! Types exchanged with the remote knowledge base service and shared by
//! every KBM crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Opaque identifier of a library entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for FileId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A document stored in the knowledge base
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeFile {
    /// Server-assigned identifier
    pub id: FileId,
    /// Display name (usually the original filename)
    pub name: String,
    /// Size in bytes
    pub size_bytes: u64,
    /// MIME type reported by the server
    pub content_type: String,
    /// Owning category, at most one
    #[serde(default)]
    pub category: Option<String>,
    /// Free-form tags, deduplicated
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeFile {
    /// Lowercased filename extension, if the name has one
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.name)
    }

    /// Document kind derived from content-type, falling back to extension
    pub fn kind(&self) -> FileKind {
        match FileKind::from_content_type(&self.content_type) {
            FileKind::Other => self
                .extension()
                .map(|ext| FileKind::from_extension(&ext))
                .unwrap_or(FileKind::Other),
            kind => kind,
        }
    }

    /// True if the file carries at least one of `tags`
    pub fn has_any_tag(&self, tags: &BTreeSet<String>) -> bool {
        tags.iter().any(|t| self.tags.contains(t))
    }
}

/// Lowercased extension of a filename (text after the last dot)
pub fn extension_of(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Coarse document kind used by the file-type filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Text,
    Markdown,
    Html,
    Word,
    Other,
}

impl FileKind {
    pub fn from_content_type(content_type: &str) -> Self {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "application/pdf" => Self::Pdf,
            "text/plain" => Self::Text,
            "text/markdown" | "text/x-markdown" => Self::Markdown,
            "text/html" | "application/xhtml+xml" => Self::Html,
            "application/msword"
            | "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            | "application/vnd.oasis.opendocument.text"
            | "application/rtf" => Self::Word,
            _ => Self::Other,
        }
    }

    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "txt" | "text" => Self::Text,
            "md" | "markdown" => Self::Markdown,
            "html" | "htm" | "xhtml" => Self::Html,
            "doc" | "docx" | "odt" | "rtf" => Self::Word,
            _ => Self::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Text => "text",
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Word => "word",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "text" | "txt" => Ok(Self::Text),
            "markdown" | "md" => Ok(Self::Markdown),
            "html" | "htm" => Ok(Self::Html),
            "word" | "doc" | "docx" => Ok(Self::Word),
            "other" => Ok(Self::Other),
            other => Err(Error::InvalidInput(format!("unknown file type: {}", other))),
        }
    }
}

/// Category or tag name annotated with the number of files using it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCount {
    pub name: String,
    pub count: u64,
}

impl UsageCount {
    pub fn new(name: impl Into<String>, count: u64) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }
}

/// A category known to the session (unique, case-sensitive name)
pub type Category = UsageCount;

/// A tag known to the session
pub type Tag = UsageCount;

/// Field changes applied by `update_file` / `bulk_update_files`
///
/// `tags` replaces the tag set; `add_tags` is merged into the existing set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub add_tags: BTreeSet<String>,
}

impl FilePatch {
    pub fn set_category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            ..Self::default()
        }
    }

    pub fn add_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            add_tags: tags.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.tags.is_none() && self.add_tags.is_empty()
    }

    /// Apply the patch to a local copy of a file
    pub fn apply_to(&self, file: &mut KnowledgeFile) {
        if let Some(category) = &self.category {
            file.category = Some(category.clone());
        }
        if let Some(tags) = &self.tags {
            file.tags = tags.clone();
        }
        file.tags.extend(self.add_tags.iter().cloned());
    }
}

/// Page request sent to `list_files`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListFilesRequest {
    pub offset: u64,
    pub limit: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<FileKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

/// Response of `list_files`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListFilesResponse {
    pub files: Vec<KnowledgeFile>,
    /// Count of all files in the library, ignoring filters
    pub total: u64,
}

/// Response of `bulk_delete_files`
///
/// `failed` is empty when every id was deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDeleteReport {
    #[serde(default)]
    pub failed: Vec<FileId>,
}

/// Options accompanying a free-text search
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<FileKind>,
    pub include_snippets: bool,
}

/// Raw search hit returned by the remote index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub file: KnowledgeFile,
    #[serde(default)]
    pub score: f32,
    /// Plain-text excerpts around the matches
    #[serde(default)]
    pub snippets: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, content_type: &str) -> KnowledgeFile {
        KnowledgeFile {
            id: FileId::new("f1"),
            name: name.to_string(),
            size_bytes: 10,
            content_type: content_type.to_string(),
            category: None,
            tags: ["a".to_string(), "b".to_string()].into_iter().collect(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("report.PDF"), Some("pdf".to_string()));
        assert_eq!(extension_of("archive.tar.gz"), Some("gz".to_string()));
        assert_eq!(extension_of("README"), None);
        assert_eq!(extension_of(".bashrc"), None);
        assert_eq!(extension_of("trailing."), None);
    }

    #[test]
    fn test_kind_prefers_content_type() {
        assert_eq!(file("notes.txt", "application/pdf").kind(), FileKind::Pdf);
        assert_eq!(file("guide.md", "application/octet-stream").kind(), FileKind::Markdown);
        assert_eq!(file("blob", "application/octet-stream").kind(), FileKind::Other);
        assert_eq!(file("page", "text/html; charset=utf-8").kind(), FileKind::Html);
    }

    #[test]
    fn test_has_any_tag_is_or() {
        let f = file("a.pdf", "application/pdf");
        let bc: BTreeSet<String> = ["b", "c"].iter().map(|s| s.to_string()).collect();
        let cd: BTreeSet<String> = ["c", "d"].iter().map(|s| s.to_string()).collect();
        assert!(f.has_any_tag(&bc));
        assert!(!f.has_any_tag(&cd));
        assert!(!f.has_any_tag(&BTreeSet::new()));
    }

    #[test]
    fn test_patch_apply_merges_added_tags() {
        let mut f = file("a.pdf", "application/pdf");
        let patch = FilePatch {
            category: Some("Manuals".to_string()),
            tags: None,
            add_tags: ["b".to_string(), "z".to_string()].into_iter().collect(),
        };
        patch.apply_to(&mut f);
        assert_eq!(f.category.as_deref(), Some("Manuals"));
        let tags: Vec<&str> = f.tags.iter().map(String::as_str).collect();
        assert_eq!(tags, vec!["a", "b", "z"]);
    }

    #[test]
    fn test_file_kind_from_str() {
        assert_eq!("PDF".parse::<FileKind>().unwrap(), FileKind::Pdf);
        assert_eq!("md".parse::<FileKind>().unwrap(), FileKind::Markdown);
        assert!("spreadsheet".parse::<FileKind>().is_err());
    }

    #[test]
    fn test_file_id_serializes_transparently() {
        let json = serde_json::to_string(&FileId::new("abc")).unwrap();
        assert_eq!(json, "\"abc\"");
    }
}
