//! Command reference search

use anyhow::{Context, Result};
use colored::*;
use toolbox_client::ConsoleClient;

pub async fn search(client: &ConsoleClient, query: &str) -> Result<()> {
    let matches = client
        .search_commands(query)
        .await
        .context("Failed to search the command reference")?;

    if matches.is_empty() {
        println!("{}", "No matching commands found.".yellow());
        return Ok(());
    }

    println!("{}", format!("Found {} command(s):", matches.len()).bold());
    println!();
    for found in matches {
        println!(
            "  {} {} {}",
            found.entry.command.cyan(),
            format!("[{}]", found.category).dimmed(),
            found.entry.description
        );
    }

    Ok(())
}
