//! Slipstream CLI - Command-line interface
//!
//! Provides command-line access to Slipstream streaming sessions.

mod commands;

use clap::Parser;

#[derive(Parser)]
#[command(name = "slipstream")]
#[command(about = "Progressive streaming from peer-to-peer swarms")]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    commands::handle_command(cli.command).await
}
