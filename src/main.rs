use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use grantrag::drive::GoogleDriveClient;
use grantrag::ingest::{IngestOptions, Pipeline};
use grantrag::llm::OpenAiGenerator;
use grantrag::registry::{JsonFileRegistry, RegistryCache};
use grantrag::store::PineconeStore;
use grantrag::Config;

/// Ingest grant-portfolio documents from a shared drive into the vector store.
#[derive(Parser, Debug)]
#[command(name = "grantrag", version, about)]
struct Cli {
    /// Run every step except the final writes to the vector store
    #[arg(long)]
    dry_run: bool,

    /// Disable LLM-assisted transcript segmentation
    #[arg(long)]
    no_llm: bool,

    /// Restrict the run to one configured folder id
    #[arg(long, value_name = "FOLDER_ID")]
    folder: Option<String>,

    /// Re-ingest every file, ignoring the unchanged-file skip check
    #[arg(long)]
    force: bool,

    /// Classify and resolve files without extracting or writing anything
    #[arg(long)]
    list_only: bool,

    /// After the run, delete chunks whose source file is gone from the drive
    #[arg(long)]
    purge_missing: bool,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    let drive_token = std::env::var(&config.drive.token_env)
        .with_context(|| format!("{} not set", config.drive.token_env))?;
    let store_key = std::env::var(&config.store.api_key_env)
        .with_context(|| format!("{} not set", config.store.api_key_env))?;

    let drive = Arc::new(GoogleDriveClient::new(drive_token)?);
    let store = Arc::new(PineconeStore::new(
        config.store.index_host.clone(),
        config.store.namespace.clone(),
        store_key,
    )?);
    let registry = RegistryCache::new(Arc::new(JsonFileRegistry::new(
        config.registry.cache_path.clone(),
    )));

    // No credential means deterministic transcript segmentation only
    let llm: Option<Arc<dyn grantrag::llm::TextGenerator>> = match config.llm_api_key() {
        Some(key) => Some(Arc::new(OpenAiGenerator::new(key, config.llm.model.clone())?)),
        None => {
            log::info!(
                "{} not set; transcript segmentation will use the deterministic mode",
                config.llm.api_key_env
            );
            None
        }
    };

    let pipeline = Pipeline::new(
        drive,
        store,
        registry,
        llm,
        config.drive.folders.clone(),
        config.ingest.clone(),
    );

    let opts = IngestOptions {
        dry_run: cli.dry_run,
        use_llm: !cli.no_llm,
        folder_id: cli.folder,
        force: cli.force,
        list_only: cli.list_only,
        purge_missing: cli.purge_missing,
    };

    let report = pipeline.run(&opts).await?;

    println!("Files seen:      {}", report.files_seen);
    println!("Processed:       {}", report.files_processed);
    println!("Skipped:         {}", report.files_skipped);
    println!("Chunks created:  {}", report.chunks_created);
    if report.chunks_purged > 0 {
        println!("Chunks purged:   {}", report.chunks_purged);
    }
    if !report.unmatched.is_empty() {
        println!("Unmatched files ({}):", report.unmatched.len());
        for name in &report.unmatched {
            println!("  {}", name);
        }
    }
    if !report.errors.is_empty() {
        println!("Errors ({}):", report.errors.len());
        for error in &report.errors {
            println!("  {}: {}", error.file, error.error);
        }
    }

    Ok(())
}
