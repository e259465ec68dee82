//! Upload batch bookkeeping
//!
//! An `UploadBatch` lives for the duration of one `submit` call. It records
//! each file's outcome in submission order and derives the overall progress
//! percentage and the aggregated `BatchResult`.

use kbm_common::events::FileOutcomeData;
use kbm_common::KnowledgeFile;
use uuid::Uuid;

/// Reason recorded for files that never started because the batch was cancelled
pub const CANCELLED_REASON: &str = "cancelled";

/// State of one file in a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Pending,
    Succeeded,
    Failed(String),
}

impl FileOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FileOutcome::Pending)
    }

    pub fn to_event_data(&self) -> FileOutcomeData {
        match self {
            FileOutcome::Pending => FileOutcomeData::Pending,
            FileOutcome::Succeeded => FileOutcomeData::Succeeded,
            FileOutcome::Failed(reason) => FileOutcomeData::Failed {
                reason: reason.clone(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub name: String,
    pub outcome: FileOutcome,
    pub warnings: Vec<String>,
    pub uploaded: Option<KnowledgeFile>,
}

/// Ordered (file, outcome) pairs for one submission
#[derive(Debug, Clone)]
pub struct UploadBatch {
    pub id: Uuid,
    entries: Vec<BatchEntry>,
    cancelled: bool,
}

impl UploadBatch {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: Uuid::new_v4(),
            entries: names
                .into_iter()
                .map(|name| BatchEntry {
                    name: name.into(),
                    outcome: FileOutcome::Pending,
                    warnings: Vec::new(),
                    uploaded: None,
                })
                .collect(),
            cancelled: false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn add_warnings(&mut self, index: usize, warnings: Vec<String>) {
        self.entries[index].warnings.extend(warnings);
    }

    pub fn mark_succeeded(&mut self, index: usize, file: KnowledgeFile) {
        let entry = &mut self.entries[index];
        entry.outcome = FileOutcome::Succeeded;
        entry.uploaded = Some(file);
    }

    pub fn mark_failed(&mut self, index: usize, reason: impl Into<String>) {
        self.entries[index].outcome = FileOutcome::Failed(reason.into());
    }

    /// Fail a file that never started because the batch was cancelled
    pub fn mark_cancelled(&mut self, index: usize) {
        self.cancelled = true;
        self.mark_failed(index, CANCELLED_REASON);
    }

    /// Indices of files that have not reached a terminal state
    pub fn pending_indices(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.outcome.is_terminal())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn completed(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_terminal()).count()
    }

    /// True once every file is terminal
    pub fn is_complete(&self) -> bool {
        self.entries.iter().all(|e| e.outcome.is_terminal())
    }

    /// `completed / total * 100`; an empty batch is complete at 100
    pub fn percentage(&self) -> f32 {
        if self.entries.is_empty() {
            return 100.0;
        }
        if self.is_complete() {
            return 100.0;
        }
        self.completed() as f32 / self.entries.len() as f32 * 100.0
    }

    /// Aggregate the terminal outcomes
    pub fn into_result(self) -> BatchResult {
        let mut result = BatchResult {
            batch_id: self.id,
            cancelled: self.cancelled,
            ..Default::default()
        };

        for entry in self.entries {
            if !entry.warnings.is_empty() {
                result.warnings.push((entry.name.clone(), entry.warnings));
            }
            match entry.outcome {
                FileOutcome::Succeeded => {
                    result.success_names.push(entry.name);
                    if let Some(file) = entry.uploaded {
                        result.uploaded.push(file);
                    }
                }
                FileOutcome::Failed(reason) => {
                    result.failures.push((entry.name.clone(), reason));
                    result.failure_names.push(entry.name);
                }
                // into_result is only called on a complete batch
                FileOutcome::Pending => {}
            }
        }
        result
    }
}

/// Aggregated outcome of an upload batch
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub batch_id: Uuid,
    /// Names of files that uploaded, in submission order
    pub success_names: Vec<String>,
    /// Names of files that failed, in submission order
    pub failure_names: Vec<String>,
    /// `(name, reason)` for every failure
    pub failures: Vec<(String, String)>,
    /// Entries created by the server
    pub uploaded: Vec<KnowledgeFile>,
    /// `(name, warnings)` for files that passed with soft validation findings
    pub warnings: Vec<(String, Vec<String>)>,
    pub cancelled: bool,
}

impl BatchResult {
    pub fn has_successes(&self) -> bool {
        !self.success_names.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        !self.failure_names.is_empty()
    }

    /// User-facing summary; `None` for an empty batch
    pub fn summary_message(&self) -> Option<String> {
        let succeeded = match self.success_names.len() {
            1 => "1 file".to_string(),
            n => format!("{} files", n),
        };
        let failed = self.failure_names.join(", ");

        match (self.has_successes(), self.has_failures()) {
            (true, true) => Some(format!(
                "Successfully uploaded {}, but failed to upload: {}",
                succeeded, failed
            )),
            (true, false) => Some(format!("Successfully uploaded {}", succeeded)),
            (false, true) => Some(format!("Failed to upload: {}", failed)),
            (false, false) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kbm_common::FileId;

    fn uploaded(name: &str) -> KnowledgeFile {
        KnowledgeFile {
            id: FileId::new(name),
            name: name.to_string(),
            size_bytes: 1,
            content_type: "application/pdf".to_string(),
            category: None,
            tags: Default::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_percentage_reaches_100_only_when_complete() {
        let mut batch = UploadBatch::new(["a.pdf", "b.pdf", "c.pdf"]);
        assert_eq!(batch.percentage(), 0.0);

        batch.mark_succeeded(0, uploaded("a.pdf"));
        let first = batch.percentage();
        batch.mark_failed(1, "server error");
        let second = batch.percentage();
        assert!(first < second && second < 100.0);
        assert!(!batch.is_complete());

        batch.mark_succeeded(2, uploaded("c.pdf"));
        assert!(batch.is_complete());
        assert_eq!(batch.percentage(), 100.0);
    }

    #[test]
    fn test_cancelling_fails_only_unstarted_files() {
        let mut batch = UploadBatch::new(["a.pdf", "b.pdf", "c.pdf"]);
        batch.mark_succeeded(0, uploaded("a.pdf"));
        let pending = batch.pending_indices();
        assert_eq!(pending, vec![1, 2]);
        for index in pending {
            batch.mark_cancelled(index);
        }
        assert!(batch.is_complete());

        let result = batch.into_result();
        assert!(result.cancelled);
        assert_eq!(result.success_names, vec!["a.pdf"]);
        assert_eq!(result.failures[1], ("c.pdf".to_string(), CANCELLED_REASON.to_string()));
    }

    #[test]
    fn test_summary_messages() {
        let mut mixed = BatchResult::default();
        mixed.success_names = vec!["a.pdf".into(), "b.pdf".into()];
        mixed.failure_names = vec!["c.pdf".into(), "d.pdf".into()];
        assert_eq!(
            mixed.summary_message().unwrap(),
            "Successfully uploaded 2 files, but failed to upload: c.pdf, d.pdf"
        );

        let mut ok = BatchResult::default();
        ok.success_names = vec!["a.pdf".into()];
        assert_eq!(ok.summary_message().unwrap(), "Successfully uploaded 1 file");

        let mut bad = BatchResult::default();
        bad.failure_names = vec!["x.pdf".into()];
        assert_eq!(bad.summary_message().unwrap(), "Failed to upload: x.pdf");

        assert_eq!(BatchResult::default().summary_message(), None);
    }

    #[test]
    fn test_empty_batch_is_complete() {
        let batch = UploadBatch::new(Vec::<String>::new());
        assert!(batch.is_complete());
        assert_eq!(batch.percentage(), 100.0);
    }
}
