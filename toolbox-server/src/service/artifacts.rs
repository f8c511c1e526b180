//! Local artifact store
//!
//! Uploaded archives are streamed to disk, extracted with the local `unzip`
//! tool and kept until an import claims them. The import deletes both the
//! archive and its extraction directory when it ends.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use toolbox_core::dto::import::DiskFile;
use tracing::{debug, info, warn};
use uuid::Uuid;

const DISK_IMAGE_EXTENSIONS: [&str; 2] = ["qcow2", "qcow"];

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("The 'unzip' command was not found on the local server.")]
    UnzipMissing,

    #[error("Failed to extract archive: {0}")]
    Extract(String),

    #[error("No .qcow2 or .qcow disk images found in the archive")]
    NoDiskImages,

    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    #[error("upload {0} not found")]
    NotFound(Uuid),
}

/// A disk image extracted from an uploaded archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
}

/// An uploaded archive and its extracted disk images
#[derive(Debug, Clone)]
pub struct UploadedArchive {
    pub id: Uuid,
    pub archive_path: PathBuf,
    pub extract_dir: PathBuf,
    pub files: Vec<ExtractedFile>,
}

impl UploadedArchive {
    pub fn find(&self, name: &str) -> Option<&ExtractedFile> {
        self.files.iter().find(|f| f.name == name)
    }

    pub fn disk_files(&self) -> Vec<DiskFile> {
        self.files
            .iter()
            .map(|f| DiskFile {
                name: f.name.clone(),
                size: f.size,
            })
            .collect()
    }

    /// Deletes the archive and the extraction directory
    ///
    /// Both deletions are attempted; the first failure is returned.
    pub async fn discard(&self) -> Result<(), ArtifactError> {
        let archive = remove_if_present(tokio::fs::remove_file(&self.archive_path).await);
        let extracted = remove_if_present(tokio::fs::remove_dir_all(&self.extract_dir).await);

        debug!(
            "Discarded upload {} ({} and {})",
            self.id,
            self.archive_path.display(),
            self.extract_dir.display()
        );

        archive.and(extracted).map_err(ArtifactError::from)
    }
}

fn remove_if_present(result: std::io::Result<()>) -> std::io::Result<()> {
    match result {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// An archive being streamed to disk
pub struct PendingUpload {
    id: Uuid,
    archive_path: PathBuf,
    file: tokio::fs::File,
}

impl PendingUpload {
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), ArtifactError> {
        self.file.write_all(chunk).await?;
        Ok(())
    }

    /// Drops a partially received upload
    pub async fn abort(self) {
        drop(self.file);
        if let Err(e) = remove_if_present(tokio::fs::remove_file(&self.archive_path).await) {
            warn!("Failed to remove partial upload {}: {}", self.archive_path.display(), e);
        }
    }
}

pub struct ArtifactStore {
    root: PathBuf,
    uploads: Mutex<HashMap<Uuid, UploadedArchive>>,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            uploads: Mutex::new(HashMap::new()),
        }
    }

    /// Opens `{root}/{id}_{filename}` for a new upload
    pub async fn begin(&self, filename: &str) -> Result<PendingUpload, ArtifactError> {
        let filename = sanitize_archive_name(filename)?;
        tokio::fs::create_dir_all(&self.root).await?;

        let id = Uuid::new_v4();
        let archive_path = self.root.join(format!("{}_{}", id, filename));
        let file = tokio::fs::File::create(&archive_path).await?;

        info!("Receiving upload {} into {}", id, archive_path.display());

        Ok(PendingUpload {
            id,
            archive_path,
            file,
        })
    }

    /// Extracts a completed upload and registers it for an import
    ///
    /// On failure the archive and any partial extraction are deleted.
    pub async fn finish(&self, pending: PendingUpload) -> Result<UploadedArchive, ArtifactError> {
        let PendingUpload {
            id,
            archive_path,
            mut file,
        } = pending;
        file.flush().await?;
        drop(file);

        let extract_dir = self.root.join(format!("_tmp_import_{}", id));
        let mut archive = UploadedArchive {
            id,
            archive_path,
            extract_dir,
            files: Vec::new(),
        };

        match extract_disks(&archive.archive_path, &archive.extract_dir).await {
            Ok(files) => archive.files = files,
            Err(e) => {
                warn!("Extraction of upload {} failed: {}", id, e);
                if let Err(cleanup) = archive.discard().await {
                    warn!("Failed to clean up upload {}: {}", id, cleanup);
                }
                return Err(e);
            }
        }

        info!(
            "Upload {} extracted with {} disk image(s)",
            id,
            archive.files.len()
        );
        self.register(archive.clone());
        Ok(archive)
    }

    pub fn register(&self, archive: UploadedArchive) {
        self.uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(archive.id, archive);
    }

    /// Claims an upload; each upload can be imported once
    pub fn take(&self, id: Uuid) -> Result<UploadedArchive, ArtifactError> {
        self.uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .ok_or(ArtifactError::NotFound(id))
    }
}

fn sanitize_archive_name(filename: &str) -> Result<String, ArtifactError> {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::trim)
        .unwrap_or_default();

    if name.is_empty() {
        return Err(ArtifactError::InvalidUpload("missing file name".to_string()));
    }

    if !name.to_ascii_lowercase().ends_with(".zip") {
        return Err(ArtifactError::InvalidUpload(format!(
            "'{}' is not a .zip archive",
            name
        )));
    }

    Ok(name.to_string())
}

async fn extract_disks(archive: &Path, dir: &Path) -> Result<Vec<ExtractedFile>, ArtifactError> {
    tokio::fs::create_dir_all(dir).await?;

    let output = Command::new("unzip")
        .arg("-o")
        .arg("-qq")
        .arg(archive)
        .arg("-d")
        .arg(dir)
        .output()
        .await
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => ArtifactError::UnzipMissing,
            _ => ArtifactError::Io(e),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ArtifactError::Extract(stderr.trim().to_string()));
    }

    let files = list_disk_images(dir).await?;
    if files.is_empty() {
        return Err(ArtifactError::NoDiskImages);
    }
    Ok(files)
}

/// Disk images directly inside `dir`, sorted by name
pub async fn list_disk_images(dir: &Path) -> Result<Vec<ExtractedFile>, ArtifactError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }

        let path = entry.path();
        let is_disk = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| DISK_IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));

        if let (true, Some(name)) = (is_disk, entry.file_name().to_str()) {
            files.push(ExtractedFile {
                name: name.to_string(),
                path,
                size: metadata.len(),
            });
        }
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}
