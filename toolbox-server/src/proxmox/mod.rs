//! Control plane
//!
//! The operations the console needs from the hypervisor cluster API, and the
//! VM creation spec derived from an import plan.

pub mod client;

use async_trait::async_trait;
use thiserror::Error;
use toolbox_core::domain::import::ImportPlan;

pub use client::ProxmoxClient;

/// SCSI controller model for imported VMs
pub const SCSI_CONTROLLER: &str = "virtio-scsi-pci";

/// Errors returned by the control plane
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("configuration incomplete. Missing: {0}")]
    NotConfigured(String),

    #[error("invalid node name '{0}'")]
    InvalidNode(String),
}

impl ControlPlaneError {
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }
}

/// Parameters for creating a VM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmSpec {
    pub vmid: u32,
    pub name: String,
    pub memory_mb: u64,
    pub cores: u32,
    pub os_type: String,
    pub scsi_hw: String,
    /// `(net{slot}, value)` pairs
    pub networks: Vec<(String, String)>,
}

impl VmSpec {
    pub fn from_plan(plan: &ImportPlan) -> Self {
        let networks = plan
            .network_adapters
            .iter()
            .filter_map(|adapter| {
                adapter
                    .config_value()
                    .map(|value| (format!("net{}", adapter.slot), value))
            })
            .collect();

        Self {
            vmid: plan.vm_id,
            name: plan.vm_name.clone(),
            memory_mb: plan.memory_mb,
            cores: plan.cores,
            os_type: plan.os_type.clone(),
            scsi_hw: SCSI_CONTROLLER.to_string(),
            networks,
        }
    }

    /// Form fields for the create call
    pub fn form_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("vmid".to_string(), self.vmid.to_string()),
            ("name".to_string(), self.name.clone()),
            ("memory".to_string(), self.memory_mb.to_string()),
            ("cores".to_string(), self.cores.to_string()),
            ("ostype".to_string(), self.os_type.clone()),
            ("scsihw".to_string(), self.scsi_hw.clone()),
        ];
        fields.extend(self.networks.iter().cloned());
        fields
    }
}

/// Hypervisor cluster API consumed by the import workflow and the console
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// API version string; doubles as the health probe
    async fn version(&self) -> Result<String, ControlPlaneError>;

    async fn list_nodes(&self) -> Result<Vec<String>, ControlPlaneError>;

    /// VM ids already in use anywhere in the cluster
    async fn list_vm_ids(&self) -> Result<Vec<u32>, ControlPlaneError>;

    /// Storages on `node` that accept disk images or container volumes
    async fn list_storage(&self, node: &str) -> Result<Vec<String>, ControlPlaneError>;

    /// Active bridges on `node`
    async fn list_bridges(&self, node: &str) -> Result<Vec<String>, ControlPlaneError>;

    async fn create_vm(&self, node: &str, spec: &VmSpec) -> Result<(), ControlPlaneError>;

    async fn set_boot_order(
        &self,
        node: &str,
        vmid: u32,
        slot: &str,
    ) -> Result<(), ControlPlaneError>;
}
