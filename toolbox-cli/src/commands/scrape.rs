//! Scrape command handlers

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use toolbox_core::domain::scrape::ScrapeTask;
use uuid::Uuid;

use super::progress;
use crate::config::Config;

/// Scrape subcommands
#[derive(Subcommand)]
pub enum ScrapeCommands {
    /// Start a scrape; without tasks the server discovers the pages itself
    Start {
        /// Page to scrape, as name=url (repeatable)
        #[arg(long = "task", value_parser = parse_task)]
        tasks: Vec<ScrapeTask>,

        /// Follow the progress stream after starting
        #[arg(short, long)]
        follow: bool,
    },
    /// Request cancellation of a running scrape
    Stop {
        /// Job ID
        id: Uuid,
    },
}

pub async fn handle_scrape_command(command: ScrapeCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        ScrapeCommands::Start { tasks, follow } => {
            let count = tasks.len();
            let started = client
                .start_scrape(tasks)
                .await
                .context("Failed to start scrape")?;

            if count == 0 {
                println!(
                    "{} {}",
                    "✓ Scrape started with page discovery:".green(),
                    started.job_id.to_string().cyan()
                );
            } else {
                println!(
                    "{} {} ({} page(s))",
                    "✓ Scrape started:".green(),
                    started.job_id.to_string().cyan(),
                    count
                );
            }

            if follow {
                progress::follow(&client, started.job_id).await?;
            } else {
                println!(
                    "{}",
                    format!("  Follow with: toolbox progress {}", started.job_id).dimmed()
                );
            }
        }
        ScrapeCommands::Stop { id } => {
            client
                .stop_scrape(id)
                .await
                .with_context(|| format!("Failed to stop scrape {}", id))?;
            println!("{}", format!("Cancellation requested for {}", id).yellow());
        }
    }

    Ok(())
}

/// Parses `name=url` into a scrape task
fn parse_task(value: &str) -> Result<ScrapeTask, String> {
    let (name, url) = value
        .split_once('=')
        .ok_or_else(|| format!("expected name=url, got '{}'", value))?;

    let (name, url) = (name.trim(), url.trim());
    if name.is_empty() || url.is_empty() {
        return Err(format!("expected name=url, got '{}'", value));
    }

    Ok(ScrapeTask::new(name, url))
}
