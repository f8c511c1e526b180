//! Scrape result persistence

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use toolbox_core::domain::scrape::ScrapeRecord;
use tracing::info;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("could not write '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not encode results: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("writer task failed: {0}")]
    Join(String),
}

impl PersistError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Destination for the records of a finished scrape
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Stores `records` and returns a description of where they went
    async fn persist(&self, records: &[ScrapeRecord]) -> Result<String, PersistError>;
}

/// Writes records as a pretty-printed JSON array
///
/// The file is replaced atomically, so readers see either the previous or the
/// new result set.
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ResultSink for JsonFileSink {
    async fn persist(&self, records: &[ScrapeRecord]) -> Result<String, PersistError> {
        let body = serde_json::to_vec_pretty(records)?;
        let path = self.path.clone();

        let written = tokio::task::spawn_blocking(move || write_atomic(&path, &body).map(|_| path))
            .await
            .map_err(|e| PersistError::Join(e.to_string()))??;

        info!("Saved {} scrape record(s) to {}", records.len(), written.display());
        Ok(written.display().to_string())
    }
}

fn write_atomic(path: &Path, body: &[u8]) -> Result<(), PersistError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| PersistError::io(dir, e))?;

    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|e| PersistError::io(dir, e))?;
    file.write_all(body).map_err(|e| PersistError::io(path, e))?;
    file.persist(path)
        .map_err(|e| PersistError::io(path, e.error))?;
    Ok(())
}

/// Reads a result set written by [`JsonFileSink`]; a missing file is empty
pub async fn load_records(path: &Path) -> Result<Vec<ScrapeRecord>, PersistError> {
    match tokio::fs::read(path).await {
        Ok(body) => Ok(serde_json::from_slice(&body)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(PersistError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolbox_core::domain::scrape::CommandEntry;

    fn record(name: &str) -> ScrapeRecord {
        ScrapeRecord {
            name: name.to_string(),
            summary: format!("{name} commands"),
            url: format!("https://docs.example.com/cli-reference/{name}"),
            commands: vec![CommandEntry {
                command: format!("{name} system status"),
                description: "Show status".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn test_persist_writes_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("results.json");
        let sink = JsonFileSink::new(&path);

        let location = sink.persist(&[record("get"), record("show")]).await.unwrap();
        assert_eq!(location, path.display().to_string());

        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
        assert_eq!(value[0]["name"], "get");
        assert_eq!(value[1]["commands"][0]["command"], "show system status");
    }

    #[tokio::test]
    async fn test_persist_replaces_previous_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let sink = JsonFileSink::new(&path);

        sink.persist(&[record("get"), record("show")]).await.unwrap();
        sink.persist(&[]).await.unwrap();

        assert!(load_records(&path).await.unwrap().is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
    }

    #[tokio::test]
    async fn test_load_records_round_trip_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");

        assert!(load_records(&path).await.unwrap().is_empty());

        JsonFileSink::new(&path).persist(&[record("config")]).await.unwrap();
        assert_eq!(load_records(&path).await.unwrap(), vec![record("config")]);
    }

    #[tokio::test]
    async fn test_unwritable_location_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let sink = JsonFileSink::new(blocker.join("results.json"));
        let err = sink.persist(&[]).await.unwrap_err();
        assert!(matches!(err, PersistError::Io { .. }));
    }
}
