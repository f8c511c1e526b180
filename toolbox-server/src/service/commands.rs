//! Command reference search over the last persisted scrape

use std::path::Path;
use toolbox_core::dto::scrape::CommandMatch;

use super::sink::{PersistError, load_records};

/// Entries whose command or description contains `query`, ignoring case
///
/// An empty query returns every entry.
pub async fn search(path: &Path, query: &str) -> Result<Vec<CommandMatch>, PersistError> {
    let needle = query.trim().to_lowercase();
    let records = load_records(path).await?;

    let matches = records
        .into_iter()
        .flat_map(|record| {
            let category = record.name;
            record.commands.into_iter().map(move |entry| CommandMatch {
                category: category.clone(),
                entry,
            })
        })
        .filter(|m| {
            needle.is_empty()
                || m.entry.command.to_lowercase().contains(&needle)
                || m.entry.description.to_lowercase().contains(&needle)
        })
        .collect();

    Ok(matches)
}
