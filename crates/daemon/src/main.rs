//! Mediabatch - batch transcode runner

mod logging;
mod settings;
mod summary;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

// Import workspace crates
use mediabatch_core::application::{cancel_channel, Orchestrator, OrchestratorContext};
use mediabatch_core::port::id_provider::UuidProvider;
use mediabatch_core::port::time_provider::SystemTimeProvider;
use mediabatch_infra_fs::FsObjectStore;
use mediabatch_infra_http::HttpEncodingService;

use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "mediabatch")]
#[command(about = "Batch transcode runner", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (TOML)
    #[arg(short, long, env = "MEDIABATCH_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode every unprocessed media object under the source root
    Run,

    /// Encode one object and wait for it with the per-job deadline
    Encode {
        /// Container holding the object
        container: String,

        /// Object name below the container
        object: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // 1. Initialize logging
    let _log_guard = logging::init_logging()?;
    info!("Mediabatch v{} starting...", mediabatch_core::VERSION);

    // 2. Load configuration
    let settings = Settings::load(cli.config.as_deref())?;
    info!(
        source_root = %settings.source_root.display(),
        encoding_url = %settings.encoding.base_url,
        "Configuration loaded"
    );

    // 3. Setup dependencies (DI wiring)
    let encoding = Arc::new(
        HttpEncodingService::new(settings.encoding_config())
            .context("Failed to create encoding service client")?,
    );
    let store = Arc::new(FsObjectStore::new(&settings.source_root));
    let ctx = OrchestratorContext::new(
        encoding,
        store,
        Arc::new(UuidProvider),
        Arc::new(SystemTimeProvider),
        settings.orchestrator_config(),
    )
    .context("Invalid orchestrator configuration")?;
    let orchestrator = Orchestrator::new(ctx);

    // 4. Ctrl+C stops waiting; remote jobs keep running
    let (cancel_tx, cancel) = cancel_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown signal received, stopping after the current wait");
            cancel_tx.cancel();
        }
    });

    // 5. Run
    match cli.command {
        Commands::Run => {
            let summary = orchestrator.run(&cancel).await.map_err(|e| {
                error!(error = %e, "Run aborted");
                anyhow::Error::from(e)
            })?;
            println!("{}", summary::render_run(&summary));
        }
        Commands::Encode { container, object } => {
            let item = orchestrator
                .locate(&container, &object)
                .await
                .with_context(|| format!("Cannot encode {}/{}", container, object))?;
            let record = orchestrator.process_item(&item, &cancel).await?;
            println!("{}", summary::render_job(&record));
        }
    }

    info!("Done.");
    Ok(())
}
