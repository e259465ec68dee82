//! Sequential upload pipeline
//!
//! Files are processed strictly in submission order with one transfer in
//! flight, so every outcome is attributable to its file and the progress
//! percentage only moves forward. A failing file is recorded and the batch
//! moves on to the next one.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use kbm_common::events::{EventBus, KbEvent};
use kbm_common::KnowledgeFile;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::batch::{BatchResult, UploadBatch};
use crate::error::{KbError, KbResult};
use crate::remote::{KnowledgeApi, TransferProgress};
use crate::validator::{Candidate, FileValidator, ValidationOutcome, ValidationPolicy};

/// Drives candidates through validation and transfer
pub struct UploadPipeline {
    api: Arc<dyn KnowledgeApi>,
    validator: FileValidator,
    events: EventBus,
}

impl UploadPipeline {
    pub fn new(api: Arc<dyn KnowledgeApi>, validator: FileValidator, events: EventBus) -> Self {
        Self {
            api,
            validator,
            events,
        }
    }

    /// Upload a batch of files with advisory validation
    ///
    /// Never fails as a whole: every problem is recorded against its file.
    /// When `cancel` fires, files that have not started are marked
    /// `failed("cancelled")`; a transfer already in flight is allowed to
    /// finish.
    pub async fn submit(
        &self,
        files: Vec<Candidate>,
        category: Option<&str>,
        tags: &BTreeSet<String>,
        cancel: &CancellationToken,
    ) -> BatchResult {
        let mut batch = UploadBatch::new(files.iter().map(|c| c.name.clone()));
        let batch_id = batch.id;
        let total = batch.len();

        info!(
            batch_id = %batch_id,
            total_files = total,
            category = ?category,
            "Starting upload batch"
        );
        self.events.emit_lossy(KbEvent::UploadBatchStarted {
            batch_id,
            total_files: total,
            timestamp: Utc::now(),
        });

        for (index, candidate) in files.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(batch_id = %batch_id, remaining = total - index, "Upload batch cancelled");
                for pending in batch.pending_indices() {
                    batch.mark_cancelled(pending);
                    self.finish_file(&batch, pending);
                }
                break;
            }

            match self.validator.validate(candidate, ValidationPolicy::Advisory) {
                ValidationOutcome::Rejected(reason) => {
                    warn!(batch_id = %batch_id, file = %candidate.name, %reason, "File rejected");
                    batch.mark_failed(index, reason.to_string());
                }
                outcome => {
                    let warnings: Vec<String> =
                        outcome.warnings().iter().map(ToString::to_string).collect();
                    if !warnings.is_empty() {
                        warn!(
                            batch_id = %batch_id,
                            file = %candidate.name,
                            warnings = ?warnings,
                            "Uploading despite validation warnings"
                        );
                        self.events.emit_lossy(KbEvent::UploadFileWarning {
                            batch_id,
                            file_index: index,
                            file_name: candidate.name.clone(),
                            warnings: warnings.clone(),
                            timestamp: Utc::now(),
                        });
                        batch.add_warnings(index, warnings);
                    }

                    let progress = self.transfer_progress(batch_id, index);
                    match self.api.upload_file(candidate, category, tags, Some(progress)).await {
                        Ok(file) => {
                            debug!(batch_id = %batch_id, file = %candidate.name, id = %file.id, "File uploaded");
                            batch.mark_succeeded(index, file);
                        }
                        Err(e) => {
                            // Non-fatal: the rest of the batch continues
                            warn!(batch_id = %batch_id, file = %candidate.name, error = %e, "Upload failed");
                            batch.mark_failed(index, e.to_string());
                        }
                    }
                }
            }

            self.finish_file(&batch, index);
        }

        let result = batch.into_result();
        info!(
            batch_id = %batch_id,
            succeeded = result.success_names.len(),
            failed = result.failure_names.len(),
            cancelled = result.cancelled,
            "Upload batch completed"
        );
        self.events.emit_lossy(KbEvent::UploadBatchCompleted {
            batch_id,
            succeeded: result.success_names.len(),
            failed: result.failure_names.len(),
            cancelled: result.cancelled,
            timestamp: Utc::now(),
        });
        result
    }

    /// Upload one file with strict validation
    ///
    /// A rejection is returned before any network call.
    pub async fn submit_single(
        &self,
        candidate: &Candidate,
        category: Option<&str>,
        tags: &BTreeSet<String>,
    ) -> KbResult<KnowledgeFile> {
        match self.validator.validate(candidate, ValidationPolicy::Strict) {
            ValidationOutcome::Rejected(reason) => {
                warn!(file = %candidate.name, %reason, "Single upload rejected");
                return Err(KbError::ValidationRejected {
                    name: candidate.name.clone(),
                    reason,
                });
            }
            outcome => {
                for warning in outcome.warnings() {
                    warn!(file = %candidate.name, %warning, "Validation warning");
                }
            }
        }

        let file = self
            .api
            .upload_file(candidate, category, tags, None)
            .await
            .map_err(|e| KbError::TransferFailed {
                name: candidate.name.clone(),
                reason: e.to_string(),
            })?;

        info!(file = %file.name, id = %file.id, "File uploaded");
        Ok(file)
    }

    fn transfer_progress(&self, batch_id: Uuid, file_index: usize) -> TransferProgress {
        let events = self.events.clone();
        TransferProgress::new(move |bytes_sent, bytes_total| {
            events.emit_lossy(KbEvent::UploadTransferProgress {
                batch_id,
                file_index,
                bytes_sent,
                bytes_total,
                timestamp: Utc::now(),
            });
        })
    }

    /// Emit the terminal outcome of one file and the new overall progress
    fn finish_file(&self, batch: &UploadBatch, index: usize) {
        let entry = &batch.entries()[index];
        self.events.emit_lossy(KbEvent::UploadFileCompleted {
            batch_id: batch.id,
            file_index: index,
            file_name: entry.name.clone(),
            outcome: entry.outcome.to_event_data(),
            timestamp: Utc::now(),
        });
        self.events.emit_lossy(KbEvent::UploadProgress {
            batch_id: batch.id,
            completed: batch.completed(),
            total: batch.len(),
            percentage: batch.percentage(),
            current_file: Some(entry.name.clone()),
            timestamp: Utc::now(),
        });
    }
}
