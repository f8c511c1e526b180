//! Progress stream rendering

use anyhow::{Context, Result, bail};
use colored::*;
use toolbox_client::ConsoleClient;
use toolbox_core::domain::event::{EventStatus, ProgressEvent};
use uuid::Uuid;

/// Follows a job's progress until it ends
///
/// Fails when the job ends with an error, so scripts can check the exit code.
pub async fn follow(client: &ConsoleClient, id: Uuid) -> Result<()> {
    println!("{}", format!("Following job {}", id).bold());
    println!("{}", "─".repeat(80).dimmed());

    let last = client
        .follow_progress(id, print_event)
        .await
        .with_context(|| format!("Failed to follow progress of job {}", id))?;

    println!("{}", "─".repeat(80).dimmed());

    match last.map(|event| event.status) {
        Some(EventStatus::Error) => bail!("Job {} failed", id),
        Some(status) if status.is_terminal() => Ok(()),
        _ => bail!("Progress stream for job {} ended before the job finished", id),
    }
}

fn print_event(event: &ProgressEvent) {
    let time = event.timestamp.format("%H:%M:%S").to_string();
    let counter = event
        .progress
        .map(|p| format!(" [{}/{}]", p.completed, p.total))
        .unwrap_or_default();

    println!(
        "{} {} {}{}",
        time.dimmed(),
        colorize_status(event.status),
        event.message,
        counter.dimmed()
    );
}

fn colorize_status(status: EventStatus) -> ColoredString {
    let label = format!("{:<9}", status.as_str().to_uppercase());
    match status {
        EventStatus::Info => label.cyan(),
        EventStatus::Warning => label.yellow(),
        EventStatus::Error => label.red().bold(),
        EventStatus::Cancelled => label.magenta(),
        EventStatus::Finished => label.green().bold(),
    }
}
