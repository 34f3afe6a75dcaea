//! Command-line entry point.
//!
//! # Startup sequence
//!
//! 1. Parse arguments.
//! 2. Initialise logging (`RUST_LOG`, default `info`).
//! 3. Load [`AppConfig`] (default on first run, or `--config <file>`).
//! 4. Create the tokio runtime.
//! 5. Open the store, build the pipeline and run the subcommand.
//!
//! Commands that start background work (`create`, `import`, `advance`)
//! wait for it to finish before the process exits.

mod exit_codes;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use exit_codes::ExitCode;
use serde::Serialize;

use misojo::config::AppConfig;
use misojo::pipeline::{
    Components, DocumentProgress, Pipeline, PipelineError, SweepError, SweepOutcome,
};
use misojo::store::{DocumentId, StoreError};

/// misojo - turn documents into per-page audio
#[derive(Parser, Debug)]
#[command(name = "misojo")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output in JSON format for scripting
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload a document and generate audio around its first page
    Create {
        /// PDF or form-feed separated text file
        file: PathBuf,

        /// Owner the document belongs to
        #[arg(long)]
        owner: String,

        /// Language code used for synthesis (e.g. en, es)
        #[arg(long, default_value = "en")]
        lang: String,

        /// Display name (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Import every <dir>/<lang>/*.pdf|*.txt not imported yet
    Import {
        dir: PathBuf,

        #[arg(long)]
        owner: String,
    },
    /// Move the reading position and generate ahead of it
    Advance { document: i64, page: u32 },
    /// Show document status (all documents when no id is given)
    Status { document: Option<i64> },
    /// Generate the oldest pending unit across all documents
    Sweep {
        /// Process up to this many units before exiting
        #[arg(long, default_value_t = 1)]
        max: u32,
    },
    /// Delete a document, its units and their blobs
    Delete { document: i64 },
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            log::error!("failed to load settings: {e:#}");
            std::process::exit(ExitCode::SetupFailed.as_i32());
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("failed to create tokio runtime: {e}");
            std::process::exit(ExitCode::GeneralError.as_i32());
        }
    };

    let exit_code = runtime.block_on(run(cli, config));
    std::process::exit(exit_code.as_i32());
}

async fn run(cli: Cli, config: AppConfig) -> ExitCode {
    let components = match Components::from_config(&config) {
        Ok(components) => components,
        Err(e) => {
            log::error!("failed to open storage: {e}");
            return ExitCode::SetupFailed;
        }
    };
    let pipeline = Pipeline::start(components, &config);
    let json = cli.json;

    let result = match cli.command {
        Commands::Create {
            file,
            owner,
            lang,
            name,
        } => create(&pipeline, &file, &owner, &lang, name, json).await,
        Commands::Import { dir, owner } => import(&pipeline, &dir, &owner, json).await,
        Commands::Advance { document, page } => {
            advance(&pipeline, DocumentId(document), page, json).await
        }
        Commands::Status { document } => status(&pipeline, document.map(DocumentId), json).await,
        Commands::Sweep { max } => return sweep(&pipeline, max, json).await,
        Commands::Delete { document } => delete(&pipeline, DocumentId(document), json).await,
    };

    match result {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            log::error!("{e}");
            exit_code_for(&e)
        }
    }
}

fn exit_code_for(e: &PipelineError) -> ExitCode {
    match e {
        PipelineError::Store(StoreError::DocumentNotFound(_)) => ExitCode::NotFound,
        PipelineError::Store(StoreError::PageOutOfRange { .. }) | PipelineError::Invalid(_) => {
            ExitCode::InvalidArguments
        }
        PipelineError::Io { .. } => ExitCode::InvalidArguments,
        _ => ExitCode::GeneralError,
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn create(
    pipeline: &Pipeline,
    file: &std::path::Path,
    owner: &str,
    lang: &str,
    name: Option<String>,
    json: bool,
) -> Result<(), PipelineError> {
    let bytes = tokio::fs::read(file).await.map_err(|source| PipelineError::Io {
        path: file.to_path_buf(),
        source,
    })?;
    let name = name.unwrap_or_else(|| {
        file.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    let document = pipeline.create_document(owner, &name, bytes, lang).await?;
    pipeline.wait_idle().await;
    print_progress(&[pipeline.progress(document).await?], json);
    Ok(())
}

async fn import(
    pipeline: &Pipeline,
    dir: &std::path::Path,
    owner: &str,
    json: bool,
) -> Result<(), PipelineError> {
    let report = pipeline.import_dir(dir, owner).await?;
    pipeline.wait_idle().await;

    if json {
        print_json(&report);
    } else {
        for id in &report.imported {
            println!("imported  {id}");
        }
        for name in &report.skipped {
            println!("skipped   {name}");
        }
        for (path, reason) in &report.failed {
            println!("failed    {}: {reason}", path.display());
        }
    }
    Ok(())
}

async fn advance(
    pipeline: &Pipeline,
    document: DocumentId,
    page: u32,
    json: bool,
) -> Result<(), PipelineError> {
    pipeline.advance_position(document, page).await?;
    pipeline.wait_idle().await;
    print_progress(&[pipeline.progress(document).await?], json);
    Ok(())
}

async fn status(
    pipeline: &Pipeline,
    document: Option<DocumentId>,
    json: bool,
) -> Result<(), PipelineError> {
    let ids: Vec<DocumentId> = match document {
        Some(id) => vec![id],
        None => pipeline.documents().await?.into_iter().map(|d| d.id).collect(),
    };
    let mut progress = Vec::with_capacity(ids.len());
    for id in ids {
        progress.push(pipeline.progress(id).await?);
    }
    print_progress(&progress, json);
    Ok(())
}

async fn sweep(pipeline: &Pipeline, max: u32, json: bool) -> ExitCode {
    let worker = pipeline.sweep_worker();
    let mut outcomes: Vec<SweepOutcome> = Vec::new();
    let mut code = ExitCode::Success;

    for _ in 0..max.max(1) {
        match worker.sweep_once().await {
            Ok(SweepOutcome::Idle) => {
                outcomes.push(SweepOutcome::Idle);
                break;
            }
            Ok(outcome) => outcomes.push(outcome),
            Err(e @ SweepError::Generate { .. }) => {
                log::error!("sweep: {e}");
                code = ExitCode::GenerationFailed;
                break;
            }
            Err(e) => {
                log::error!("sweep: {e}");
                code = ExitCode::GeneralError;
                break;
            }
        }
    }

    if json {
        print_json(&outcomes);
    } else {
        for outcome in &outcomes {
            match outcome {
                SweepOutcome::Idle => println!("idle"),
                SweepOutcome::LostRace { unit_id } => println!("unit {unit_id}: claimed elsewhere"),
                SweepOutcome::Processed { unit_id, outcome } => {
                    println!("unit {unit_id}: {outcome:?}")
                }
            }
        }
    }
    code
}

async fn delete(pipeline: &Pipeline, document: DocumentId, json: bool) -> Result<(), PipelineError> {
    let removed = pipeline.delete_document(document).await?;
    if json {
        print_json(&serde_json::json!({ "document": document, "blobs_removed": removed }));
    } else {
        println!("deleted document {document} ({removed} blobs removed)");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => log::error!("failed to encode output: {e}"),
    }
}

fn print_progress(progress: &[DocumentProgress], json: bool) {
    if json {
        print_json(progress);
        return;
    }
    for p in progress {
        print!(
            "{:>6}  {:<10}  {}/{} ready  page {}",
            p.document.0,
            p.status.label(),
            p.ready_units,
            p.total_units,
            p.current_page
        );
        if p.in_flight > 0 || p.live_claims > 0 {
            print!("  ({} running here, {} claimed)", p.in_flight, p.live_claims);
        }
        if let Some(err) = &p.split_error {
            print!("  error: {err}");
        }
        println!();
    }
}
