//! Import DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::import::ImportPlan;

/// Request to start an import from a previously uploaded archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartImportRequest {
    pub upload_id: Uuid,
    pub plan: ImportPlan,
}

/// A disk image found in an uploaded archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskFile {
    pub name: String,
    pub size: u64,
}

/// Result of uploading and extracting an archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub upload_id: Uuid,
    pub files: Vec<DiskFile>,
}

/// Placement choices available on the cluster
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    pub nodes: Vec<String>,
    pub used_vm_ids: Vec<u32>,
    pub storages: Vec<String>,
}

/// Active bridges on one node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeList {
    pub node: String,
    pub bridges: Vec<String>,
}
