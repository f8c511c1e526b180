//! Import plan types
//!
//! An [`ImportPlan`] describes the VM to create and the disks and network
//! adapters to attach to it. It is validated before a job is started and is
//! immutable for the lifetime of the import workflow.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Bus prefixes accepted for disk slots (e.g. `scsi0`, `virtio3`)
pub const BUS_PREFIXES: [&str; 4] = ["scsi", "sata", "ide", "virtio"];

/// Lowest VM id the control plane accepts
pub const MIN_VM_ID: u32 = 100;

/// Smallest memory size accepted for a VM, in MiB
pub const MIN_MEMORY_MB: u64 = 16;

/// Everything needed to import uploaded disk images as a new VM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportPlan {
    pub vm_id: u32,
    pub vm_name: String,
    pub node: String,
    pub storage: String,
    pub cores: u32,
    pub memory_mb: u64,
    pub os_type: String,
    #[serde(default)]
    pub uploaded_disks: Vec<UploadedDisk>,
    #[serde(default)]
    pub additional_disks: Vec<AdditionalDisk>,
    #[serde(default)]
    pub network_adapters: Vec<NetworkAdapter>,
}

/// A disk image from the uploaded archive, attached to a bus slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedDisk {
    pub filename: String,
    pub bus_slot: String,
    #[serde(default)]
    pub boot: bool,
}

/// An empty disk allocated on the target storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalDisk {
    pub bus_slot: String,
    pub size_gb: u32,
}

impl AdditionalDisk {
    /// Descriptors without a slot or a size are ignored by the import
    pub fn is_skipped(&self) -> bool {
        self.bus_slot.trim().is_empty() || self.size_gb == 0
    }
}

/// A virtio network adapter bound to a bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAdapter {
    pub slot: u8,
    pub bridge: String,
    #[serde(default)]
    pub vlan: Option<u16>,
}

impl NetworkAdapter {
    /// Control-plane value for the `net{slot}` option, or `None` when no bridge is set
    pub fn config_value(&self) -> Option<String> {
        let bridge = self.bridge.trim();
        if bridge.is_empty() {
            return None;
        }

        Some(match self.vlan {
            Some(tag) => format!("virtio,bridge={},tag={}", bridge, tag),
            None => format!("virtio,bridge={}", bridge),
        })
    }
}

/// Reasons an import plan is rejected before any work starts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("VM id must be {MIN_VM_ID} or greater (got {0})")]
    VmIdOutOfRange(u32),

    #[error("{0} cannot be empty")]
    EmptyField(&'static str),

    #[error("cores must be at least 1")]
    NoCores,

    #[error("memory must be at least {MIN_MEMORY_MB} MiB (got {0})")]
    MemoryTooSmall(u64),

    #[error("at least one uploaded disk is required")]
    NoDisks,

    #[error("invalid bus slot '{0}'")]
    InvalidBusSlot(String),

    #[error("bus slot '{0}' is used more than once")]
    DuplicateBusSlot(String),

    #[error("invalid disk filename '{0}'")]
    InvalidFilename(String),

    #[error("network slot net{0} is used more than once")]
    DuplicateNetworkSlot(u8),
}

impl ImportPlan {
    /// Checks the plan for values the workflow cannot act on
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.vm_id < MIN_VM_ID {
            return Err(PlanError::VmIdOutOfRange(self.vm_id));
        }

        for (field, value) in [
            ("vm_name", &self.vm_name),
            ("node", &self.node),
            ("storage", &self.storage),
            ("os_type", &self.os_type),
        ] {
            if value.trim().is_empty() {
                return Err(PlanError::EmptyField(field));
            }
        }

        if self.cores == 0 {
            return Err(PlanError::NoCores);
        }

        if self.memory_mb < MIN_MEMORY_MB {
            return Err(PlanError::MemoryTooSmall(self.memory_mb));
        }

        if self.uploaded_disks.is_empty() {
            return Err(PlanError::NoDisks);
        }

        let mut slots = HashSet::new();

        for disk in &self.uploaded_disks {
            if !is_valid_filename(&disk.filename) {
                return Err(PlanError::InvalidFilename(disk.filename.clone()));
            }
            check_slot(&disk.bus_slot, &mut slots)?;
        }

        for disk in self.additional_disks.iter().filter(|d| !d.is_skipped()) {
            check_slot(&disk.bus_slot, &mut slots)?;
        }

        let mut net_slots = HashSet::new();
        for adapter in &self.network_adapters {
            if adapter.config_value().is_some() && !net_slots.insert(adapter.slot) {
                return Err(PlanError::DuplicateNetworkSlot(adapter.slot));
            }
        }

        Ok(())
    }

    /// Slot of the last uploaded disk flagged as boot disk
    pub fn boot_slot(&self) -> Option<&str> {
        self.uploaded_disks
            .iter()
            .rev()
            .find(|d| d.boot)
            .map(|d| d.bus_slot.as_str())
    }
}

/// Returns true for slots like `scsi0`, `sata1`, `ide2` or `virtio15`
pub fn is_valid_bus_slot(slot: &str) -> bool {
    BUS_PREFIXES.iter().any(|prefix| {
        slot.strip_prefix(prefix).is_some_and(|index| {
            (1..=2).contains(&index.len()) && index.bytes().all(|b| b.is_ascii_digit())
        })
    })
}

fn is_valid_filename(name: &str) -> bool {
    !name.trim().is_empty() && !name.contains(['/', '\\']) && name != "." && !name.contains("..")
}

fn check_slot<'a>(slot: &'a str, seen: &mut HashSet<&'a str>) -> Result<(), PlanError> {
    if !is_valid_bus_slot(slot) {
        return Err(PlanError::InvalidBusSlot(slot.to_string()));
    }
    if !seen.insert(slot) {
        return Err(PlanError::DuplicateBusSlot(slot.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> ImportPlan {
        ImportPlan {
            vm_id: 120,
            vm_name: "fw-lab".to_string(),
            node: "pve1".to_string(),
            storage: "local-lvm".to_string(),
            cores: 2,
            memory_mb: 2048,
            os_type: "l26".to_string(),
            uploaded_disks: vec![UploadedDisk {
                filename: "boot.qcow2".to_string(),
                bus_slot: "scsi0".to_string(),
                boot: true,
            }],
            additional_disks: vec![AdditionalDisk {
                bus_slot: "scsi1".to_string(),
                size_gb: 20,
            }],
            network_adapters: Vec::new(),
        }
    }

    #[test]
    fn test_valid_plan() {
        assert_eq!(plan().validate(), Ok(()));
    }

    #[test]
    fn test_vm_id_below_minimum() {
        let mut plan = plan();
        plan.vm_id = 99;
        assert_eq!(plan.validate(), Err(PlanError::VmIdOutOfRange(99)));
    }

    #[test]
    fn test_empty_fields_rejected() {
        let mut plan = plan();
        plan.storage = "  ".to_string();
        assert_eq!(plan.validate(), Err(PlanError::EmptyField("storage")));
    }

    #[test]
    fn test_requires_uploaded_disk() {
        let mut plan = plan();
        plan.uploaded_disks.clear();
        assert_eq!(plan.validate(), Err(PlanError::NoDisks));
    }

    #[test]
    fn test_duplicate_slot_rejected() {
        let mut plan = plan();
        plan.additional_disks[0].bus_slot = "scsi0".to_string();
        assert_eq!(
            plan.validate(),
            Err(PlanError::DuplicateBusSlot("scsi0".to_string()))
        );
    }

    #[test]
    fn test_duplicate_network_slot_rejected() {
        let mut plan = plan();
        plan.network_adapters = vec![
            NetworkAdapter {
                slot: 0,
                bridge: "vmbr0".to_string(),
                vlan: None,
            },
            NetworkAdapter {
                slot: 0,
                bridge: "vmbr1".to_string(),
                vlan: Some(10),
            },
        ];
        assert_eq!(plan.validate(), Err(PlanError::DuplicateNetworkSlot(0)));

        plan.network_adapters[1].slot = 1;
        assert_eq!(plan.validate(), Ok(()));

        plan.network_adapters[1].slot = 0;
        plan.network_adapters[1].bridge = String::new();
        assert_eq!(plan.validate(), Ok(()));
    }

    #[test]
    fn test_skipped_additional_disks_are_not_validated() {
        let mut plan = plan();
        plan.additional_disks.push(AdditionalDisk {
            bus_slot: String::new(),
            size_gb: 10,
        });
        plan.additional_disks.push(AdditionalDisk {
            bus_slot: "bogus".to_string(),
            size_gb: 0,
        });
        assert_eq!(plan.validate(), Ok(()));
    }

    #[test]
    fn test_path_traversal_filename_rejected() {
        let mut plan = plan();
        plan.uploaded_disks[0].filename = "../etc/passwd".to_string();
        assert!(matches!(
            plan.validate(),
            Err(PlanError::InvalidFilename(_))
        ));
    }

    #[test]
    fn test_bus_slot_format() {
        assert!(is_valid_bus_slot("scsi0"));
        assert!(is_valid_bus_slot("virtio15"));
        assert!(is_valid_bus_slot("ide2"));
        assert!(!is_valid_bus_slot("scsi"));
        assert!(!is_valid_bus_slot("scsi100"));
        assert!(!is_valid_bus_slot("nvme0"));
        assert!(!is_valid_bus_slot("sata-1"));
    }

    #[test]
    fn test_boot_slot_last_flag_wins() {
        let mut plan = plan();
        plan.uploaded_disks.push(UploadedDisk {
            filename: "data.qcow2".to_string(),
            bus_slot: "scsi2".to_string(),
            boot: true,
        });
        assert_eq!(plan.boot_slot(), Some("scsi2"));

        plan.uploaded_disks.iter_mut().for_each(|d| d.boot = false);
        assert_eq!(plan.boot_slot(), None);
    }

    #[test]
    fn test_network_adapter_config_value() {
        let tagged = NetworkAdapter {
            slot: 0,
            bridge: "vmbr0".to_string(),
            vlan: Some(42),
        };
        assert_eq!(
            tagged.config_value().as_deref(),
            Some("virtio,bridge=vmbr0,tag=42")
        );

        let untagged = NetworkAdapter {
            slot: 1,
            bridge: "vmbr1".to_string(),
            vlan: None,
        };
        assert_eq!(untagged.config_value().as_deref(), Some("virtio,bridge=vmbr1"));

        let unbound = NetworkAdapter {
            slot: 2,
            bridge: " ".to_string(),
            vlan: Some(5),
        };
        assert_eq!(unbound.config_value(), None);
    }
}
