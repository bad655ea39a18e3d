//! CLI command implementations

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Subcommand;
use slipstream_core::config::SlipstreamConfig;
use slipstream_core::engine::{ContentDescriptor, SimulatedSwarmConfig, SimulatedSwarmEngine};
use slipstream_core::session::StreamSessionController;
use slipstream_core::tracing_setup::{CliLogLevel, init_tracing};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Stream a magnet link and print the playable endpoint
    ///
    /// No production swarm engine ships in this workspace; the session runs
    /// against the simulated engine, which fabricates a small media payload.
    Stream {
        /// Magnet link identifying the swarm
        magnet: String,
        /// Directory for downloaded artifacts
        #[arg(short, long)]
        download_dir: Option<PathBuf>,
        /// Console log level
        #[arg(long, default_value = "info")]
        log_level: CliLogLevel,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Stream {
            magnet,
            download_dir,
            log_level,
        } => stream(magnet, download_dir, log_level).await,
    }
}

async fn stream(
    magnet: String,
    download_dir: Option<PathBuf>,
    log_level: CliLogLevel,
) -> anyhow::Result<()> {
    init_tracing(log_level.as_tracing_level(), None)
        .map_err(|e| anyhow::anyhow!("tracing setup failed: {e}"))?;

    let descriptor = ContentDescriptor::parse(&magnet).context("invalid magnet link")?;

    let mut config = SlipstreamConfig::from_env();
    if let Some(dir) = download_dir {
        config.storage.download_root = dir;
    }

    let controller = StreamSessionController::new(
        SimulatedSwarmEngine::new(SimulatedSwarmConfig::default()),
        config,
    );

    println!("Joining swarm...");
    let endpoint = match controller.start_streaming(descriptor).await {
        Ok(endpoint) => endpoint,
        Err(e) => {
            let _ = controller.stop_streaming().await;
            anyhow::bail!("streaming did not start: {}", e.user_message());
        }
    };

    println!("Stream ready: {}", endpoint.url());
    println!("Point a player at the URL above. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(Duration::from_secs(2)) => {
                println!("{}", controller.connection_stats());
            }
        }
    }

    println!("Stopping...");
    let _ = controller.stop_streaming().await;
    Ok(())
}
