//! Connection command handlers

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;

use crate::config::Config;

/// Connection subcommands
#[derive(Subcommand)]
pub enum ConnectionCommands {
    /// Show the cached connectivity probe outcome, probing if it is stale
    Status {
        /// Only show the last outcome; never trigger a probe
        #[arg(long)]
        cached: bool,
    },
    /// Discard the cached outcome so the next status check probes again
    Invalidate,
}

pub async fn handle_connection_command(command: ConnectionCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        ConnectionCommands::Status { cached } => {
            let status = if cached {
                match client.cached_connection_status().await {
                    Err(e) if e.is_not_found() => {
                        println!("{}", "No connection probe has completed yet.".yellow());
                        return Ok(());
                    }
                    result => result.context("Failed to fetch connection status")?,
                }
            } else {
                client
                    .connection_status()
                    .await
                    .context("Failed to fetch connection status")?
            };

            let mark = if status.ok { "✓".green() } else { "✗".red() };
            println!("{} {}", mark, status.message);
            println!(
                "  Remote tool: {}",
                if status.remote_tool_available {
                    "available".green()
                } else {
                    "missing".yellow()
                }
            );
            println!(
                "  Checked:     {}",
                status
                    .checked_at
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
                    .dimmed()
            );
        }
        ConnectionCommands::Invalidate => {
            client
                .invalidate_connection()
                .await
                .context("Failed to invalidate the connection cache")?;
            println!("{}", "Connection cache cleared.".green());
        }
    }

    Ok(())
}
