//! Integration tests for the knowledge base controller
//!
//! Tests cover:
//! - Batch uploads with per-file failures and progress events
//! - Optimistic single delete, both failure policies
//! - Bulk delete and bulk update with partial failure
//! - Fetch determinism, stale fetches and transport failures
//! - Filter changes resetting the page index
//!
//! Every test runs the controller against the in-memory backend.

use std::collections::BTreeSet;
use std::sync::Arc;

use kbm_common::config::{DeleteFailurePolicy, KbmConfig};
use kbm_common::events::{EventBus, KbEvent};
use kbm_common::models::{FileKind, UsageCount};
use kbm_common::FileId;
use kbm_core::library::FetchOutcome;
use kbm_core::remote::{KnowledgeApi, RemoteOp};
use kbm_core::validator::Candidate;
use kbm_core::{
    DeleteOutcome, FilterState, KbError, KnowledgeBaseController, MemoryKnowledgeApi,
};
use tokio_util::sync::CancellationToken;

const MIB: usize = 1024 * 1024;

/// Test helper: controller over a fresh in-memory backend
fn setup(config: KbmConfig) -> (Arc<MemoryKnowledgeApi>, KnowledgeBaseController, EventBus) {
    let api = Arc::new(MemoryKnowledgeApi::new());
    let events = EventBus::new(1024);
    let controller = KnowledgeBaseController::new(api.clone(), &config, events.clone());
    (api, controller, events)
}

/// Test helper: seed `count` PDF files named doc0.pdf, doc1.pdf, ...
fn seed_pdfs(api: &MemoryKnowledgeApi, count: usize) -> Vec<FileId> {
    (0..count)
        .map(|i| api.seed(&format!("doc{}.pdf", i), None, &[], "pdf body"))
        .collect()
}

fn pdf(name: &str, size: usize) -> Candidate {
    let mut bytes = b"%PDF-1.4\n".to_vec();
    bytes.resize(size.max(bytes.len()), b'x');
    Candidate::from_bytes(name, bytes, Some("application/pdf".to_string()))
}

fn no_tags() -> BTreeSet<String> {
    BTreeSet::new()
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<KbEvent>) -> Vec<KbEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// =============================================================================
// Uploads
// =============================================================================

#[tokio::test]
async fn test_batch_with_one_failure_reports_exactly_that_file() {
    let (api, mut ctl, _events) = setup(KbmConfig::default());
    api.fail_upload_of("b.pdf");

    let result = ctl
        .upload_files(
            vec![pdf("a.pdf", 100), pdf("b.pdf", 100), pdf("c.pdf", 100)],
            None,
            &no_tags(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(result.success_names.len(), 2);
    assert_eq!(result.failure_names, vec!["b.pdf"]);
    let summary = result.summary_message().unwrap();
    assert!(summary.ends_with("failed to upload: b.pdf"));

    // Partial failure keeps the summary visible as a banner
    assert_eq!(ctl.notifications().banner().unwrap().message, summary);
    // Successful uploads trigger a refresh
    assert_eq!(ctl.page().items.len(), 2);
    assert_eq!(ctl.store().total_count(), 2);
}

#[tokio::test]
async fn test_oversized_file_warns_then_fails_remotely() {
    let (api, mut ctl, events) = setup(KbmConfig::default());
    api.set_max_upload_bytes(10 * MIB as u64);
    let mut rx = events.subscribe();

    let result = ctl
        .upload_files(
            vec![
                pdf("guide.pdf", 2048),
                pdf("huge.pdf", 10 * MIB + 1),
                pdf("faq.pdf", 2048),
            ],
            None,
            &no_tags(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(result.success_names, vec!["guide.pdf", "faq.pdf"]);
    assert_eq!(result.failure_names, vec!["huge.pdf"]);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].0, "huge.pdf");

    let events = drain(&mut rx);
    let progress: Vec<(usize, f32)> = events
        .iter()
        .filter_map(|e| match e {
            KbEvent::UploadProgress {
                completed,
                percentage,
                ..
            } => Some((*completed, *percentage)),
            _ => None,
        })
        .collect();

    assert_eq!(progress.len(), 3);
    assert!(progress.windows(2).all(|w| w[0].1 <= w[1].1));
    for (completed, percentage) in &progress {
        assert_eq!(*percentage == 100.0, *completed == 3);
    }

    assert!(events
        .iter()
        .any(|e| matches!(e, KbEvent::UploadFileWarning { file_name, .. } if file_name == "huge.pdf")));
    assert!(events
        .iter()
        .any(|e| matches!(e, KbEvent::UploadBatchCompleted { succeeded: 2, failed: 1, .. })));
}

#[tokio::test]
async fn test_all_success_shows_toast_not_banner() {
    let (_api, mut ctl, _events) = setup(KbmConfig::default());

    let result = ctl
        .upload_files(
            vec![pdf("a.pdf", 10), pdf("b.pdf", 10)],
            Some("Manuals"),
            &no_tags(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(result.summary_message().unwrap(), "Successfully uploaded 2 files");
    assert!(ctl.notifications().banner().is_none());
    assert_eq!(ctl.notifications().active_toasts(std::time::Instant::now()).len(), 1);
    assert_eq!(ctl.store().categories(), &[UsageCount::new("Manuals", 2)]);
}

#[tokio::test]
async fn test_single_upload_strict_rejection_raises_banner() {
    let (api, mut ctl, _events) = setup(KbmConfig::default());

    let err = ctl
        .upload_single(&pdf("huge.pdf", 10 * MIB + 1), None, &no_tags())
        .await
        .unwrap_err();

    assert!(matches!(err, KbError::ValidationRejected { .. }));
    assert!(ctl.notifications().banner().is_some());
    assert_eq!(api.calls(RemoteOp::Upload), 0);
}

#[tokio::test]
async fn test_empty_batch_completes_without_progress() {
    let (_api, mut ctl, events) = setup(KbmConfig::default());
    let mut rx = events.subscribe();

    let result = ctl
        .upload_files(Vec::new(), None, &no_tags(), &CancellationToken::new())
        .await;

    assert!(result.summary_message().is_none());
    let events = drain(&mut rx);
    assert!(!events.iter().any(|e| matches!(e, KbEvent::UploadProgress { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, KbEvent::UploadBatchCompleted { .. })));
}

// =============================================================================
// Fetching
// =============================================================================

#[tokio::test]
async fn test_identical_fetches_return_equal_pages() {
    let (api, mut ctl, _events) = setup(KbmConfig::default());
    seed_pdfs(&api, 5);

    ctl.refresh().await.unwrap();
    let first = ctl.page().clone();
    ctl.refresh().await.unwrap();

    assert_eq!(&first, ctl.page());
}

#[tokio::test]
async fn test_stale_fetch_response_is_discarded() {
    let (api, mut ctl, _events) = setup(KbmConfig::default());
    seed_pdfs(&api, 3);

    let old = ctl.begin_refresh();
    let old_response = api.list_files(&old.request).await;
    let new = ctl.begin_refresh();
    let new_response = api.list_files(&new.request).await;

    assert_eq!(
        ctl.complete_refresh(&new, new_response).unwrap(),
        FetchOutcome::Applied
    );
    assert_eq!(
        ctl.complete_refresh(&old, old_response).unwrap(),
        FetchOutcome::Stale
    );
    assert_eq!(ctl.page().items.len(), 3);
}

#[tokio::test]
async fn test_transport_error_keeps_previous_page() {
    let (api, mut ctl, _events) = setup(KbmConfig::default());
    seed_pdfs(&api, 2);
    ctl.refresh().await.unwrap();
    let before = ctl.page().clone();

    api.fail(RemoteOp::ListFiles);
    let err = ctl.refresh().await.unwrap_err();

    assert!(matches!(err, KbError::Transport(_)));
    assert_eq!(&before, ctl.page());
    assert!(ctl.notifications().banner().is_some());

    ctl.dismiss_banner();
    assert!(ctl.notifications().banner().is_none());
}

#[tokio::test]
async fn test_filter_change_resets_page_index() {
    let mut config = KbmConfig::default();
    config.page_size = 2;
    let (api, mut ctl, _events) = setup(config);
    seed_pdfs(&api, 7);

    ctl.refresh().await.unwrap();
    ctl.go_to_page(2).await.unwrap();
    assert_eq!(ctl.page_index(), 2);
    assert_eq!(ctl.page().offset, 4);

    ctl.set_filter(FilterState::new().with_file_type(FileKind::Pdf))
        .await
        .unwrap();
    assert_eq!(ctl.page_index(), 0);
    assert_eq!(ctl.page().offset, 0);

    ctl.go_to_page(99).await.unwrap();
    assert_eq!(ctl.page_index(), 3);
    assert_eq!(ctl.pagination().total_pages, 4);
}

#[tokio::test]
async fn test_go_to_page_on_empty_library_stays_on_first_page() {
    let (api, mut ctl, _events) = setup(KbmConfig::default());

    ctl.go_to_page(u64::MAX).await.unwrap();

    assert_eq!(ctl.page_index(), 0);
    assert_eq!(ctl.page().offset, 0);
    assert_eq!(api.calls(RemoteOp::ListFiles), 1);
}

#[tokio::test]
async fn test_page_change_drops_selection() {
    let mut config = KbmConfig::default();
    config.page_size = 2;
    let (api, mut ctl, _events) = setup(config);
    seed_pdfs(&api, 4);
    ctl.refresh().await.unwrap();
    ctl.select_all();
    assert_eq!(ctl.selection().len(), 2);

    ctl.go_to_page(1).await.unwrap();
    assert!(ctl.selection().is_empty());

    let outcome = ctl.bulk_delete_selected().await.unwrap();
    assert!(outcome.deleted.is_empty());
    assert_eq!(api.calls(RemoteOp::BulkDelete), 0);
    assert_eq!(api.file_count(), 4);
}

// =============================================================================
// Deletes
// =============================================================================

#[tokio::test]
async fn test_delete_one_updates_selection_and_total() {
    let (api, mut ctl, _events) = setup(KbmConfig::default());
    let ids = seed_pdfs(&api, 3);
    ctl.refresh().await.unwrap();
    ctl.toggle_selection(&ids[1]);

    let outcome = ctl.delete_one(&ids[1]).await.unwrap();

    assert_eq!(outcome, DeleteOutcome::Deleted);
    assert!(!ctl.selection().is_selected(&ids[1]));
    assert_eq!(ctl.store().total_count(), 2);
    assert!(!ctl.page().contains(&ids[1]));
    assert_eq!(api.file_count(), 2);
}

#[tokio::test]
async fn test_delete_of_missing_file_is_success() {
    let (api, mut ctl, _events) = setup(KbmConfig::default());
    seed_pdfs(&api, 2);
    ctl.refresh().await.unwrap();

    let outcome = ctl.delete_one(&FileId::new("ghost")).await.unwrap();

    assert_eq!(outcome, DeleteOutcome::NotFound);
    assert_eq!(ctl.store().total_count(), 2);
    assert_eq!(api.calls(RemoteOp::Delete), 1);
}

#[tokio::test]
async fn test_failed_delete_keeps_removal_by_default() {
    let (api, mut ctl, _events) = setup(KbmConfig::default());
    let ids = seed_pdfs(&api, 2);
    ctl.refresh().await.unwrap();
    api.fail(RemoteOp::Delete);

    assert!(ctl.delete_one(&ids[0]).await.is_err());
    assert!(!ctl.page().contains(&ids[0]));
    assert_eq!(ctl.store().total_count(), 1);
    assert!(ctl.notifications().banner().is_some());
}

#[tokio::test]
async fn test_failed_delete_rolls_back_when_configured() {
    let mut config = KbmConfig::default();
    config.library.delete_failure_policy = DeleteFailurePolicy::RollBack;
    let (api, mut ctl, _events) = setup(config);
    let ids = seed_pdfs(&api, 3);
    ctl.refresh().await.unwrap();
    let before = ctl.page().clone();
    api.fail(RemoteOp::Delete);

    assert!(ctl.delete_one(&ids[1]).await.is_err());
    assert_eq!(&before, ctl.page());
}

#[tokio::test]
async fn test_bulk_delete_selected() {
    let (api, mut ctl, _events) = setup(KbmConfig::default());
    seed_pdfs(&api, 4);
    ctl.refresh().await.unwrap();
    ctl.select_all();

    let outcome = ctl.bulk_delete_selected().await.unwrap();

    assert_eq!(outcome.deleted.len(), 4);
    assert!(ctl.selection().is_empty());
    assert_eq!(ctl.store().total_count(), 0);
    assert_eq!(api.calls(RemoteOp::BulkDelete), 1);
}

#[tokio::test]
async fn test_bulk_delete_total_failure_changes_nothing() {
    let (api, mut ctl, _events) = setup(KbmConfig::default());
    let ids = seed_pdfs(&api, 3);
    ctl.refresh().await.unwrap();
    let before = ctl.page().clone();
    api.fail(RemoteOp::BulkDelete);

    assert!(ctl.bulk_delete(&ids).await.is_err());
    assert_eq!(&before, ctl.page());
}

#[tokio::test]
async fn test_bulk_delete_partial_failure_removes_only_succeeded() {
    let (api, mut ctl, _events) = setup(KbmConfig::default());
    let ids = seed_pdfs(&api, 3);
    api.protect_from_bulk_delete(&ids[2]);
    ctl.refresh().await.unwrap();
    ctl.select_all();

    let err = ctl.bulk_delete_selected().await.unwrap_err();

    match err {
        KbError::BulkPartialFailure { succeeded, failed } => {
            assert_eq!(succeeded.len(), 2);
            assert_eq!(failed, vec![ids[2].clone()]);
        }
        other => panic!("expected BulkPartialFailure, got {:?}", other),
    }
    assert_eq!(ctl.page().ids(), vec![ids[2].clone()]);
    assert_eq!(ctl.store().total_count(), 1);
    assert_eq!(ctl.selection().ids(), vec![ids[2].clone()]);
}

#[tokio::test]
async fn test_bulk_delete_counts_repeated_id_once() {
    let (api, mut ctl, _events) = setup(KbmConfig::default());
    let ids = seed_pdfs(&api, 3);
    ctl.refresh().await.unwrap();

    let outcome = ctl
        .bulk_delete(&[ids[0].clone(), ids[0].clone()])
        .await
        .unwrap();

    assert_eq!(outcome.deleted, vec![ids[0].clone()]);
    assert_eq!(ctl.page().items.len(), 2);
    assert_eq!(ctl.store().total_count(), 2);
    assert_eq!(api.file_count(), 2);
}

#[tokio::test]
async fn test_bulk_delete_of_unknown_id_keeps_total() {
    let (api, mut ctl, _events) = setup(KbmConfig::default());
    seed_pdfs(&api, 2);
    ctl.refresh().await.unwrap();

    ctl.bulk_delete(&[FileId::new("ghost")]).await.unwrap();

    assert_eq!(ctl.page().items.len(), 2);
    assert_eq!(ctl.store().total_count(), 2);
    assert_eq!(api.file_count(), 2);
}

// =============================================================================
// Bulk updates
// =============================================================================

#[tokio::test]
async fn test_bulk_assign_category_to_five_files() {
    let (api, mut ctl, _events) = setup(KbmConfig::default());
    let ids = seed_pdfs(&api, 8);
    api.seed("old.pdf", Some("Manuals"), &[], "");
    ctl.refresh().await.unwrap();

    let before = ctl.list_categories().await.unwrap();
    assert_eq!(before, vec![UsageCount::new("Manuals", 1)]);

    let targets: Vec<FileId> = ids[..5].to_vec();
    let updated = ctl.bulk_set_category(&targets, "Manuals").await.unwrap();
    assert_eq!(updated.len(), 5);

    for file in &ctl.page().items {
        if targets.contains(&file.id) || file.name == "old.pdf" {
            assert_eq!(file.category.as_deref(), Some("Manuals"));
        } else {
            assert_eq!(file.category, None, "{} should be untouched", file.name);
        }
    }

    let after = ctl.list_categories().await.unwrap();
    assert_eq!(after, vec![UsageCount::new("Manuals", 6)]);
}

#[tokio::test]
async fn test_bulk_add_tags_merges_with_existing() {
    let (api, mut ctl, _events) = setup(KbmConfig::default());
    let a = api.seed("a.pdf", None, &["billing"], "");
    let b = api.seed("b.pdf", None, &[], "");
    ctl.refresh().await.unwrap();

    let tags: BTreeSet<String> = ["urgent".to_string()].into_iter().collect();
    ctl.bulk_add_tags(&[a.clone(), b.clone()], &tags).await.unwrap();

    let a_tags = &ctl.page().get(&a).unwrap().tags;
    assert!(a_tags.contains("billing") && a_tags.contains("urgent"));
    assert!(ctl.page().get(&b).unwrap().tags.contains("urgent"));
    assert_eq!(
        ctl.list_tags().await.unwrap(),
        vec![UsageCount::new("billing", 1), UsageCount::new("urgent", 2)]
    );
}

#[tokio::test]
async fn test_bulk_update_partial_failure_names_missing_ids() {
    let (api, mut ctl, _events) = setup(KbmConfig::default());
    let ids = seed_pdfs(&api, 3);
    api.skip_in_bulk_update(&ids[0]);
    ctl.refresh().await.unwrap();

    let err = ctl.bulk_set_category(&ids, "FAQ").await.unwrap_err();

    match err {
        KbError::BulkPartialFailure { failed, .. } => assert_eq!(failed, vec![ids[0].clone()]),
        other => panic!("expected BulkPartialFailure, got {:?}", other),
    }
    assert_eq!(ctl.page().get(&ids[0]).unwrap().category, None);
    assert_eq!(ctl.page().get(&ids[1]).unwrap().category.as_deref(), Some("FAQ"));
}

// =============================================================================
// Search
// =============================================================================

#[tokio::test]
async fn test_search_with_filters_and_back_to_browse() {
    let (api, mut ctl, events) = setup(KbmConfig::default());
    api.seed("refunds.txt", Some("FAQ"), &["billing"], "Refunds take five days.");
    api.seed("refund-manual.md", Some("Manuals"), &[], "Refund procedure.");
    api.seed("shipping.txt", Some("FAQ"), &[], "Shipping times.");
    let mut rx = events.subscribe();

    ctl.set_filter(FilterState::new().with_category("FAQ")).await.unwrap();
    let hits = ctl.search("refund", &CancellationToken::new()).await.unwrap();

    assert_eq!(hits, 1);
    assert_eq!(ctl.search_hits()[0].file.name, "refunds.txt");
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, KbEvent::SearchCompleted { hit_count: 1, .. })));

    ctl.enter_browse_mode().await.unwrap();
    assert_eq!(ctl.filter().category.as_deref(), Some("FAQ"));
    assert_eq!(ctl.visible_files().len(), 2);
}
