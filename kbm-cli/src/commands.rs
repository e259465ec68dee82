//! Subcommand handlers
//!
//! Each handler drives the controller and prints results to stdout. Errors
//! the controller already turned into a banner are returned as-is; `main`
//! decides how to report them.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Instant;

use clap::Subcommand;
use kbm_common::events::{EventBus, KbEvent};
use kbm_common::models::FileKind;
use kbm_common::{FileId, KnowledgeFile};
use kbm_core::validator::Candidate;
use kbm_core::{DeleteOutcome, FilterState, KbResult, KnowledgeBaseController};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List one page of the library
    List {
        /// Page number, starting at 1
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long)]
        category: Option<String>,
        /// Match files carrying any of these tags (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// pdf, text, markdown, html, word or other
        #[arg(long = "type")]
        file_type: Option<FileKind>,
        /// Case-insensitive match on name or tag
        #[arg(long)]
        query: Option<String>,
    },

    /// Upload files; one failure does not stop the rest
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Reject oversized or unsupported files instead of warning (single file only)
        #[arg(long)]
        strict: bool,
    },

    /// Delete files by id
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Assign a category to files
    Categorize {
        #[arg(long)]
        category: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Add tags to files
    Tag {
        #[arg(long = "tag", required = true)]
        tags: Vec<String>,
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// List categories with usage counts
    Categories,

    /// List tags with usage counts
    Tags,

    /// Free-text search with highlighted snippets
    Search {
        query: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long = "type")]
        file_type: Option<FileKind>,
    },
}

fn filter_from(
    category: Option<String>,
    tags: Vec<String>,
    file_type: Option<FileKind>,
    query: Option<String>,
) -> FilterState {
    FilterState {
        category,
        tags: tags.into_iter().collect(),
        file_type,
        query: query.unwrap_or_default(),
    }
}

fn to_ids(raw: Vec<String>) -> Vec<FileId> {
    raw.into_iter().map(FileId::from).collect()
}

pub async fn run(
    controller: &mut KnowledgeBaseController,
    command: Command,
    events: &EventBus,
) -> KbResult<()> {
    match command {
        Command::List {
            page,
            category,
            tags,
            file_type,
            query,
        } => {
            controller
                .set_filter(filter_from(category, tags, file_type, query))
                .await?;
            if page > 1 {
                controller.go_to_page(page - 1).await?;
            }
            print_page(controller);
        }

        Command::Upload {
            paths,
            category,
            tags,
            strict,
        } => {
            let tags: BTreeSet<String> = tags.into_iter().collect();
            let mut candidates = Vec::with_capacity(paths.len());
            for path in &paths {
                candidates.push(Candidate::from_path(path).await?);
            }

            if strict && candidates.len() == 1 {
                let file = controller
                    .upload_single(&candidates[0], category.as_deref(), &tags)
                    .await?;
                println!("{}  {}", file.id, file.name);
            } else {
                if strict {
                    warn!("--strict only applies to single-file uploads; using batch validation");
                }
                upload_batch(controller, candidates, category.as_deref(), &tags, events).await;
            }
        }

        Command::Delete { ids } => {
            let ids = to_ids(ids);
            if let [id] = ids.as_slice() {
                match controller.delete_one(id).await? {
                    DeleteOutcome::Deleted => debug!(id = %id, "Deleted"),
                    DeleteOutcome::NotFound => println!("{} was already deleted", id),
                }
            } else {
                controller.bulk_delete(&ids).await?;
            }
        }

        Command::Categorize { category, ids } => {
            let updated = controller.bulk_set_category(&to_ids(ids), &category).await?;
            for file in &updated {
                print_file(file);
            }
        }

        Command::Tag { tags, ids } => {
            let tags: BTreeSet<String> = tags.into_iter().collect();
            let updated = controller.bulk_add_tags(&to_ids(ids), &tags).await?;
            for file in &updated {
                print_file(file);
            }
        }

        Command::Categories => {
            for category in controller.list_categories().await? {
                println!("{} ({})", category.name, category.count);
            }
        }

        Command::Tags => {
            for tag in controller.list_tags().await? {
                println!("{} ({})", tag.name, tag.count);
            }
        }

        Command::Search {
            query,
            category,
            tags,
            file_type,
        } => {
            let cancel = CancellationToken::new();
            let watcher = cancel_on_ctrl_c(cancel.clone());
            let result = controller
                .search_with(filter_from(category, tags, file_type, Some(query)), &cancel)
                .await;
            watcher.abort();
            result?;
            print_hits(controller);
        }
    }

    for toast in controller.notifications().active_toasts(Instant::now()) {
        println!("{}", toast.message);
    }
    Ok(())
}

async fn upload_batch(
    controller: &mut KnowledgeBaseController,
    candidates: Vec<Candidate>,
    category: Option<&str>,
    tags: &BTreeSet<String>,
    events: &EventBus,
) {
    let cancel = CancellationToken::new();
    let watcher = cancel_on_ctrl_c(cancel.clone());

    let mut rx = events.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(KbEvent::UploadFileWarning {
                    file_name, warnings, ..
                }) => {
                    for warning in warnings {
                        eprintln!("warning: {}: {}", file_name, warning);
                    }
                }
                Ok(KbEvent::UploadProgress {
                    percentage,
                    current_file,
                    ..
                }) => {
                    eprintln!(
                        "[{:>5.1}%] {}",
                        percentage,
                        current_file.unwrap_or_default()
                    );
                }
                Ok(KbEvent::UploadBatchCompleted { .. }) | Err(RecvError::Closed) => break,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
            }
        }
    });

    let result = controller.upload_files(candidates, category, tags, &cancel).await;
    watcher.abort();
    if let Err(e) = printer.await {
        debug!(error = %e, "Progress printer stopped");
    }

    for (name, reason) in &result.failures {
        eprintln!("failed: {}: {}", name, reason);
    }
}

/// Cancel `token` on Ctrl+C; abort the returned handle when done
fn cancel_on_ctrl_c(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling...");
            token.cancel();
        }
    })
}

fn print_file(file: &KnowledgeFile) {
    let tags: Vec<&str> = file.tags.iter().map(String::as_str).collect();
    println!(
        "{}  {}  {} bytes  [{}]  {}",
        file.id,
        file.name,
        file.size_bytes,
        file.category.as_deref().unwrap_or("-"),
        tags.join(", ")
    );
}

fn print_page(controller: &KnowledgeBaseController) {
    for file in controller.visible_files() {
        print_file(file);
    }
    let pagination = controller.pagination();
    println!(
        "Page {} of {} ({} files in library)",
        pagination.page_index + 1,
        pagination.total_pages.max(1),
        controller.store().total_count()
    );
}

fn print_hits(controller: &KnowledgeBaseController) {
    if controller.search_hits().is_empty() {
        println!("No results");
        return;
    }
    for hit in controller.search_hits() {
        println!("{}  {}", hit.file.id, hit.title.render_marked("*", "*"));
        for snippet in &hit.snippets {
            println!("    ...{}...", snippet.render_marked("**", "**"));
        }
    }
}
