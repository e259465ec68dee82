//! kbm - knowledge base manager command line
//!
//! Uploads, browses, searches and bulk-edits a remote knowledge base.
//! `--offline` runs the same commands against a small in-memory demo
//! library instead of a server.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use kbm_common::config::KbmConfig;
use kbm_common::events::EventBus;
use kbm_core::{HttpKnowledgeApi, KnowledgeApi, KnowledgeBaseController, MemoryKnowledgeApi};
use tracing::{debug, info};

mod commands;
mod logging;

/// Command-line arguments for kbm
#[derive(Parser, Debug)]
#[command(name = "kbm")]
#[command(about = "Knowledge base manager")]
#[command(version)]
struct Args {
    /// Config file (default: $KBM_CONFIG, then the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Knowledge base server URL, overrides the config file
    #[arg(long)]
    server: Option<String>,

    /// Use an in-memory demo library instead of a server
    #[arg(long)]
    offline: bool,

    #[command(subcommand)]
    command: commands::Command,
}

/// In-memory library with a few sample documents
fn demo_library() -> MemoryKnowledgeApi {
    let api = MemoryKnowledgeApi::new();
    api.seed(
        "refund-policy.pdf",
        Some("Policies"),
        &["billing"],
        "Customers may request a refund within 30 days of purchase.",
    );
    api.seed(
        "reset-password.md",
        Some("FAQ"),
        &["account", "login"],
        "To reset your password open Settings and choose Security.",
    );
    api.seed(
        "router-setup.html",
        Some("Manuals"),
        &["setup"],
        "Connect the router to power and wait for the status light.",
    );
    api.seed(
        "shipping-times.txt",
        Some("FAQ"),
        &["shipping"],
        "Standard shipping takes three to five business days.",
    );
    api
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        KbmConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(server) = args.server {
        config.server_url = server;
        config.validate().context("Invalid --server")?;
    }

    logging::init(&config.logging)?;
    info!("Starting kbm v{}", env!("CARGO_PKG_VERSION"));

    let api: Arc<dyn KnowledgeApi> = if args.offline {
        info!("Offline mode: using in-memory demo library");
        Arc::new(demo_library())
    } else {
        debug!(server = %config.server_url, "Connecting to knowledge base");
        Arc::new(
            HttpKnowledgeApi::from_config(&config)
                .context("Failed to create knowledge base client")?,
        )
    };

    let events = EventBus::default();
    let mut controller = KnowledgeBaseController::new(api, &config, events.clone());

    let outcome = commands::run(&mut controller, args.command, &events).await;

    if let Some(banner) = controller.notifications().banner() {
        bail!("{}", banner.message);
    }
    outcome.context("Command failed")?;
    Ok(())
}
