//! chat-attach: drive the attachment pipeline from the command line.
//!
//! Files are uploaded into the configured storage directory and the resulting
//! attachment list is printed as JSON on stdout. Logs go to stderr.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ca_attachments::{
    AttachmentError, AttachmentRecord, AttachmentStore, Composer, LinkInput, LocalDirTransport,
    LocalFile, ManualPicker, OutgoingTurn, RetryController,
};
use ca_core::{AppConfig, LoggingConfig, UploadSettings};
use ca_notifications::{MemoryNotifier, Notice};

#[derive(Parser)]
#[command(name = "chat-attach")]
#[command(author, version, about = "Attach files and links to a chat turn")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Which attachment feature to use
    #[arg(short, long, global = true, value_enum, default_value_t = Feature::Files)]
    feature: Feature,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Feature {
    /// Images for vision-capable models
    Vision,
    /// Generic file attachments
    Files,
}

impl Feature {
    fn settings(self, config: &AppConfig) -> UploadSettings {
        match self {
            Self::Vision => config.vision.clone(),
            Self::Files => config.files.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Upload local files
    Attach {
        /// Files to attach, in order
        #[arg(required = true, num_args = 1..)]
        paths: Vec<PathBuf>,

        /// How many times to retry failed uploads
        #[arg(short, long, default_value_t = 0)]
        retries: u32,
    },

    /// Attach remote links
    Link {
        #[arg(required = true, num_args = 1..)]
        urls: Vec<String>,
    },

    /// Attach files and links, then compose the outgoing turn
    Send {
        /// Message text
        #[arg(short, long)]
        query: String,

        #[arg(long = "file")]
        files: Vec<PathBuf>,

        #[arg(long = "link")]
        links: Vec<String>,
    },
}

#[derive(Serialize)]
struct Report {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<AttachmentRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    turn: Option<OutgoingTurn>,
    notices: Vec<Notice>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    init_tracing(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        feature = ?cli.feature,
        storage_dir = %config.transport.storage_dir,
        "Starting chat-attach"
    );

    let notifier = Arc::new(MemoryNotifier::new());
    let transport = Arc::new(LocalDirTransport::new(
        &config.transport.storage_dir,
        config.transport.chunk_size,
    ));
    let store = AttachmentStore::new(
        Some(cli.feature.settings(&config)),
        transport,
        notifier.clone(),
    );

    let mut report = Report {
        attachments: Vec::new(),
        turn: None,
        notices: Vec::new(),
    };

    match cli.command {
        Commands::Attach { paths, retries } => {
            attach_files(&store, &paths).await;
            store.settle().await;

            let retry = RetryController::new(store.clone());
            for round in 1..=retries {
                let outcomes = retry.retry_failed().await;
                if outcomes.is_empty() {
                    break;
                }
                info!(round, count = outcomes.len(), "Retrying failed uploads");
                store.settle().await;
            }
            report.attachments = store.records();
        }
        Commands::Link { urls } => {
            attach_links(&store, urls);
            report.attachments = store.records();
        }
        Commands::Send {
            query,
            files,
            links,
        } => {
            attach_files(&store, &files).await;
            attach_links(&store, links);
            store.settle().await;

            let composer = Composer::new(notifier.clone()).with_store(store.clone());
            match composer.take_for_send(&query) {
                Ok(turn) => report.turn = Some(turn),
                Err(e) => {
                    warn!(error = %e, "Turn not sent");
                    report.attachments = store.records();
                }
            }
        }
    }

    report.notices = notifier.drain();
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn attach_files(store: &AttachmentStore, paths: &[PathBuf]) {
    let picker = ManualPicker::new(store.clone());
    for path in paths {
        if let Err(e) = attach_file(&picker, path).await {
            warn!(path = %path.display(), error = %e, "File not attached");
        }
    }
}

async fn attach_file(picker: &ManualPicker, path: &Path) -> anyhow::Result<()> {
    let file = LocalFile::from_path(path)
        .await
        .with_context(|| format!("cannot open {}", path.display()))?;
    match picker.on_files_selected(vec![file]).await {
        Ok(_) => Ok(()),
        Err(AttachmentError::Disabled) => {
            anyhow::bail!("attachments are disabled or the limit is reached")
        }
        Err(e) => Err(e.into()),
    }
}

fn attach_links(store: &AttachmentStore, urls: Vec<String>) {
    let mut input = LinkInput::new(store.clone());
    for url in urls {
        input.set_value(url);
        if let Err(e) = input.submit() {
            warn!(url = %input.value(), error = %e, "Link not attached");
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.filter.as_str().into());
    let registry = tracing_subscriber::registry().with(filter);

    if logging.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init();
    }
}
