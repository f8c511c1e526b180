//! Import command handlers
//!
//! An import is two steps: upload the archive, then start the job with a
//! plan referencing the upload id.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use toolbox_core::domain::import::ImportPlan;
use uuid::Uuid;

use super::progress;
use crate::config::Config;

/// Import subcommands
#[derive(Subcommand)]
pub enum ImportCommands {
    /// Show nodes, used VM ids and storages
    Inventory {
        /// Node whose storages are listed (defaults to the first node)
        #[arg(long)]
        node: Option<String>,
    },
    /// List active bridges on a node
    Bridges {
        node: String,
    },
    /// Upload a zip archive of disk images
    Upload {
        /// Path to the archive
        archive: PathBuf,
    },
    /// Start an import from an uploaded archive
    Start {
        /// Upload ID returned by `toolbox import upload`
        upload_id: Uuid,

        /// Path to the import plan (JSON)
        plan: PathBuf,

        /// Follow the progress stream after starting
        #[arg(short, long)]
        follow: bool,
    },
}

pub async fn handle_import_command(command: ImportCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        ImportCommands::Inventory { node } => {
            let inventory = client
                .inventory(node.as_deref())
                .await
                .context("Failed to fetch the cluster inventory")?;

            println!("{}", "Cluster Inventory:".bold());
            println!("  Nodes:       {}", inventory.nodes.join(", ").cyan());
            println!("  Storages:    {}", inventory.storages.join(", "));
            let ids: Vec<String> = inventory.used_vm_ids.iter().map(u32::to_string).collect();
            println!("  Used VM IDs: {}", ids.join(", ").dimmed());
        }
        ImportCommands::Bridges { node } => {
            let list = client
                .bridges(&node)
                .await
                .with_context(|| format!("Failed to list bridges on {}", node))?;

            if list.bridges.is_empty() {
                println!("{}", format!("No active bridges on {}.", list.node).yellow());
            } else {
                println!("{}", format!("Bridges on {}:", list.node).bold());
                for bridge in list.bridges {
                    println!("  {} {}", "▸".cyan(), bridge);
                }
            }
        }
        ImportCommands::Upload { archive } => {
            println!("Uploading {}...", archive.display());
            let upload = client
                .upload_archive(&archive)
                .await
                .with_context(|| format!("Failed to upload {}", archive.display()))?;

            println!(
                "{} {}",
                "✓ Upload ready:".green(),
                upload.upload_id.to_string().cyan()
            );
            for file in upload.files {
                println!("  {} {} {}", "▸".cyan(), file.name, format_size(file.size).dimmed());
            }
        }
        ImportCommands::Start {
            upload_id,
            plan,
            follow,
        } => {
            let plan = read_plan(&plan)?;
            let vm = format!("{} ({})", plan.vm_name, plan.vm_id);

            let started = client
                .start_import(upload_id, plan)
                .await
                .context("Failed to start import")?;

            println!(
                "{} {} for VM {}",
                "✓ Import started:".green(),
                started.job_id.to_string().cyan(),
                vm
            );

            if follow {
                progress::follow(&client, started.job_id).await?;
            } else {
                println!(
                    "{}",
                    format!("  Follow with: toolbox progress {}", started.job_id).dimmed()
                );
            }
        }
    }

    Ok(())
}

fn read_plan(path: &Path) -> Result<ImportPlan> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan file {}", path.display()))?;

    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse plan file {}", path.display()))
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
