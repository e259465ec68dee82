//! Upload candidate validation
//!
//! Classifies a candidate file as supported or unsupported and enforces the
//! size limit before it enters the upload pipeline. Two policies exist
//! because the two call sites tolerate different risk:
//!
//! - `Strict` (single-file upload): oversized or unsupported files are
//!   rejected and never transferred.
//! - `Advisory` (batch upload): the same findings become warnings; the file
//!   is still attempted and may fail server-side.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use kbm_common::config::UploadConfig;
use kbm_common::models::extension_of;
use thiserror::Error;
use tokio::io::AsyncReadExt;

use crate::error::KbResult;

/// Bytes read from the head of an on-disk file for magic-byte sniffing
const SNIFF_LEN: usize = 8192;

const OCTET_STREAM: &str = "application/octet-stream";

/// Where a candidate's content lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateBody {
    Memory(Vec<u8>),
    Disk(PathBuf),
}

/// A file offered for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Filename shown to the user and sent to the server
    pub name: String,
    pub size_bytes: u64,
    /// Declared or sniffed MIME type
    pub content_type: Option<String>,
    pub body: CandidateBody,
}

impl Candidate {
    /// Candidate backed by an in-memory buffer
    pub fn from_bytes(
        name: impl Into<String>,
        bytes: Vec<u8>,
        content_type: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            size_bytes: bytes.len() as u64,
            content_type,
            body: CandidateBody::Memory(bytes),
        }
    }

    /// Candidate backed by a file on disk
    ///
    /// The content type is sniffed from the leading bytes; when that fails
    /// it is left unset and derived from the extension later.
    pub async fn from_path(path: &Path) -> KbResult<Self> {
        let metadata = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut head = vec![0u8; SNIFF_LEN];
        let mut file = tokio::fs::File::open(path).await?;
        let read = file.read(&mut head).await?;
        head.truncate(read);

        let content_type = infer::get(&head).map(|kind| kind.mime_type().to_string());

        Ok(Self {
            name,
            size_bytes: metadata.len(),
            content_type,
            body: CandidateBody::Disk(path.to_path_buf()),
        })
    }

    /// Declared type, else the type implied by the extension, else octet-stream
    pub fn effective_content_type(&self) -> String {
        if let Some(ct) = &self.content_type {
            return ct.clone();
        }
        extension_of(&self.name)
            .and_then(|ext| mime_for_extension(&ext))
            .unwrap_or(OCTET_STREAM)
            .to_string()
    }

    /// Load the full content for transfer
    pub async fn read_body(&self) -> std::io::Result<Vec<u8>> {
        match &self.body {
            CandidateBody::Memory(bytes) => Ok(bytes.clone()),
            CandidateBody::Disk(path) => tokio::fs::read(path).await,
        }
    }
}

/// MIME type conventionally used for a document extension
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext {
        "pdf" => "application/pdf",
        "txt" | "text" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "html" | "htm" => "text/html",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "odt" => "application/vnd.oasis.opendocument.text",
        "rtf" => "application/rtf",
        "csv" => "text/csv",
        "json" => "application/json",
        _ => return None,
    };
    Some(mime)
}

/// Which call site is validating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationPolicy {
    /// Single-file flow: findings block the upload
    Strict,
    /// Batch flow: findings are surfaced and the upload proceeds
    Advisory,
}

/// Why a candidate was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("file is {size} bytes, the limit is {max} bytes")]
    TooLarge { size: u64, max: u64 },

    #[error("file type {content_type} is not supported")]
    UnsupportedType { content_type: String },

    #[error("file has no name")]
    EmptyName,
}

/// Non-blocking finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationWarning {
    ExceedsSizeLimit { size: u64, max: u64 },
    MaybeUnsupported { content_type: String },
    EmptyFile,
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationWarning::ExceedsSizeLimit { size, max } => write!(
                f,
                "file is {} bytes, larger than the recommended {} bytes",
                size, max
            ),
            ValidationWarning::MaybeUnsupported { content_type } => {
                write!(f, "file type {} may be unsupported", content_type)
            }
            ValidationWarning::EmptyFile => write!(f, "file is empty"),
        }
    }
}

/// Result of validating one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Accepted,
    AcceptedWithWarnings(Vec<ValidationWarning>),
    Rejected(RejectReason),
}

impl ValidationOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, ValidationOutcome::Rejected(_))
    }

    pub fn warnings(&self) -> &[ValidationWarning] {
        match self {
            ValidationOutcome::AcceptedWithWarnings(w) => w,
            _ => &[],
        }
    }
}

/// Pure size and type classifier
#[derive(Debug, Clone)]
pub struct FileValidator {
    max_file_size_bytes: u64,
    allowed_extensions: HashSet<String>,
    allowed_content_types: HashSet<String>,
}

impl FileValidator {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            max_file_size_bytes: config.max_file_size_bytes,
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            allowed_content_types: config
                .allowed_content_types
                .iter()
                .map(|c| c.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_bytes
    }

    /// True if the content type or the extension is on the allow-list
    pub fn is_supported(&self, candidate: &Candidate) -> bool {
        let type_ok = candidate
            .content_type
            .as_deref()
            .map(|ct| {
                let mime = ct.split(';').next().unwrap_or_default().trim();
                self.allowed_content_types.contains(&mime.to_ascii_lowercase())
            })
            .unwrap_or(false);

        type_ok
            || extension_of(&candidate.name)
                .map(|ext| self.allowed_extensions.contains(&ext))
                .unwrap_or(false)
    }

    /// Classify a candidate under the given policy
    pub fn validate(&self, candidate: &Candidate, policy: ValidationPolicy) -> ValidationOutcome {
        if candidate.name.trim().is_empty() {
            return ValidationOutcome::Rejected(RejectReason::EmptyName);
        }

        let mut warnings = Vec::new();

        if candidate.size_bytes > self.max_file_size_bytes {
            match policy {
                ValidationPolicy::Strict => {
                    return ValidationOutcome::Rejected(RejectReason::TooLarge {
                        size: candidate.size_bytes,
                        max: self.max_file_size_bytes,
                    })
                }
                ValidationPolicy::Advisory => warnings.push(ValidationWarning::ExceedsSizeLimit {
                    size: candidate.size_bytes,
                    max: self.max_file_size_bytes,
                }),
            }
        }

        if !self.is_supported(candidate) {
            let content_type = candidate.effective_content_type();
            match policy {
                ValidationPolicy::Strict => {
                    return ValidationOutcome::Rejected(RejectReason::UnsupportedType {
                        content_type,
                    })
                }
                ValidationPolicy::Advisory => {
                    warnings.push(ValidationWarning::MaybeUnsupported { content_type })
                }
            }
        }

        if candidate.size_bytes == 0 {
            warnings.push(ValidationWarning::EmptyFile);
        }

        if warnings.is_empty() {
            ValidationOutcome::Accepted
        } else {
            ValidationOutcome::AcceptedWithWarnings(warnings)
        }
    }
}

impl Default for FileValidator {
    fn default() -> Self {
        Self::new(&UploadConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MIB: usize = 1024 * 1024;

    fn candidate(name: &str, size: usize, content_type: Option<&str>) -> Candidate {
        Candidate::from_bytes(name, vec![b'x'; size], content_type.map(str::to_string))
    }

    #[test]
    fn test_supported_pdf_is_accepted() {
        let v = FileValidator::default();
        let c = candidate("manual.pdf", 1024, Some("application/pdf"));
        assert_eq!(v.validate(&c, ValidationPolicy::Strict), ValidationOutcome::Accepted);
        assert_eq!(v.validate(&c, ValidationPolicy::Advisory), ValidationOutcome::Accepted);
    }

    #[test]
    fn test_extension_alone_is_enough() {
        let v = FileValidator::default();
        let c = candidate("notes.MD", 10, None);
        assert!(v.is_supported(&c));
    }

    #[test]
    fn test_content_type_parameters_are_ignored() {
        let v = FileValidator::default();
        let c = candidate("page", 10, Some("text/html; charset=utf-8"));
        assert!(v.is_supported(&c));
    }

    #[test]
    fn test_oversized_strict_rejects() {
        let v = FileValidator::default();
        let c = candidate("big.pdf", 10 * MIB + 1, Some("application/pdf"));
        match v.validate(&c, ValidationPolicy::Strict) {
            ValidationOutcome::Rejected(RejectReason::TooLarge { size, max }) => {
                assert_eq!(size, (10 * MIB + 1) as u64);
                assert_eq!(max, (10 * MIB) as u64);
            }
            other => panic!("expected TooLarge, got {:?}", other),
        }
    }

    #[test]
    fn test_oversized_advisory_warns() {
        let v = FileValidator::default();
        let c = candidate("big.pdf", 10 * MIB + 1, Some("application/pdf"));
        let outcome = v.validate(&c, ValidationPolicy::Advisory);
        assert!(!outcome.is_rejected());
        assert!(matches!(
            outcome.warnings(),
            [ValidationWarning::ExceedsSizeLimit { .. }]
        ));
    }

    #[test]
    fn test_exactly_at_limit_is_accepted() {
        let v = FileValidator::default();
        let c = candidate("edge.pdf", 10 * MIB, Some("application/pdf"));
        assert_eq!(v.validate(&c, ValidationPolicy::Strict), ValidationOutcome::Accepted);
    }

    #[test]
    fn test_unsupported_type_strict_vs_advisory() {
        let v = FileValidator::default();
        let c = candidate("photo.png", 100, Some("image/png"));

        assert_eq!(
            v.validate(&c, ValidationPolicy::Strict),
            ValidationOutcome::Rejected(RejectReason::UnsupportedType {
                content_type: "image/png".to_string()
            })
        );

        let advisory = v.validate(&c, ValidationPolicy::Advisory);
        assert_eq!(
            advisory.warnings(),
            &[ValidationWarning::MaybeUnsupported {
                content_type: "image/png".to_string()
            }]
        );
    }

    #[test]
    fn test_empty_name_rejected_under_both_policies() {
        let v = FileValidator::default();
        let c = candidate("  ", 10, Some("text/plain"));
        assert!(v.validate(&c, ValidationPolicy::Strict).is_rejected());
        assert!(v.validate(&c, ValidationPolicy::Advisory).is_rejected());
    }

    #[test]
    fn test_empty_file_warns() {
        let v = FileValidator::default();
        let c = candidate("blank.txt", 0, None);
        assert_eq!(
            v.validate(&c, ValidationPolicy::Strict).warnings(),
            &[ValidationWarning::EmptyFile]
        );
    }

    #[test]
    fn test_custom_allow_list() {
        let config = UploadConfig {
            max_file_size_bytes: 100,
            allowed_extensions: vec![".CSV".to_string()],
            allowed_content_types: vec![],
        };
        let v = FileValidator::new(&config);
        assert!(v.is_supported(&candidate("data.csv", 1, None)));
        assert!(!v.is_supported(&candidate("doc.pdf", 1, Some("application/pdf"))));
    }

    #[test]
    fn test_effective_content_type_fallbacks() {
        assert_eq!(candidate("a.md", 1, None).effective_content_type(), "text/markdown");
        assert_eq!(
            candidate("a.bin", 1, None).effective_content_type(),
            "application/octet-stream"
        );
        assert_eq!(
            candidate("a.md", 1, Some("text/plain")).effective_content_type(),
            "text/plain"
        );
    }

    #[tokio::test]
    async fn test_from_path_sniffs_pdf_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.bin");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n1 0 obj\n").unwrap();
        drop(file);

        let c = Candidate::from_path(&path).await.unwrap();
        assert_eq!(c.name, "scan.bin");
        assert_eq!(c.content_type.as_deref(), Some("application/pdf"));
        assert!(FileValidator::default().is_supported(&c));
        assert_eq!(c.read_body().await.unwrap().len() as u64, c.size_bytes);
    }
}
