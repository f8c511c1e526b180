//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod connection;
mod import;
mod progress;
mod reference;
mod scrape;

pub use connection::ConnectionCommands;
pub use import::ImportCommands;
pub use scrape::ScrapeCommands;

use anyhow::Result;
use clap::Subcommand;
use uuid::Uuid;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Documentation scraping
    Scrape {
        #[command(subcommand)]
        command: ScrapeCommands,
    },
    /// VM import from an uploaded archive
    Import {
        #[command(subcommand)]
        command: ImportCommands,
    },
    /// Follow the progress stream of a job
    Progress {
        /// Job ID
        id: Uuid,
    },
    /// Control-plane connection status
    Connection {
        #[command(subcommand)]
        command: ConnectionCommands,
    },
    /// Search the command reference from the last scrape
    Commands {
        /// Text to look for in commands and descriptions
        #[arg(default_value = "")]
        query: String,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Scrape { command } => scrape::handle_scrape_command(command, config).await,
        Commands::Import { command } => import::handle_import_command(command, config).await,
        Commands::Progress { id } => progress::follow(&config.client(), id).await,
        Commands::Connection { command } => {
            connection::handle_connection_command(command, config).await
        }
        Commands::Commands { query } => reference::search(&config.client(), &query).await,
    }
}
