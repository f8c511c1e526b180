//! Toolbox CLI
//!
//! Command-line interface for the operator toolbox console: trigger VM imports
//! and documentation scrapes and follow their progress.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "toolbox")]
#[command(about = "Operator toolbox console CLI", long_about = None)]
struct Cli {
    /// Console server URL
    #[arg(long, env = "TOOLBOX_URL", default_value = "http://localhost:5001")]
    console_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        console_url: cli.console_url,
    };

    handle_command(cli.command, &config).await
}
