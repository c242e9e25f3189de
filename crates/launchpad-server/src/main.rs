//! Launchpad server binary.

use std::path::PathBuf;

use clap::Parser;
use launchpad_control::LaunchpadConfig;
use launchpad_server::{logging, LaunchpadService};
use tracing::info;

/// Launchpad deployment server.
#[derive(Parser, Debug)]
#[command(name = "launchpad-server")]
#[command(about = "Submit, monitor and tear down infrastructure scenarios")]
#[command(version)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = LaunchpadConfig::load(cli.config.as_deref());
    let config = loaded.as_ref().cloned().unwrap_or_default();

    // Held until exit so buffered file logs are flushed
    let _log_guard = logging::init(cli.verbose, &config.logging, &config.log_dir())?;

    info!("Launchpad server starting");
    if let Err(e) = &loaded {
        info!(error = %e, "Failed to load config, using defaults");
    }

    info!(
        listen_addr = %config.server.listen_addr,
        base_dir = %config.storage.base_dir.display(),
        provision_script = %config.scripts.provision.path.display(),
        log_file = config.logging.file_enabled,
        "Configuration loaded"
    );

    LaunchpadService::new(config).run().await
}
