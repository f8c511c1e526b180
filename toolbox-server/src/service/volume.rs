//! Imported volume id parsing
//!
//! `qm importdisk` prints a line of the form
//! `Successfully imported disk 'local-lvm:vm-120-disk-0'` once the image has
//! been converted. The quoted value is the volume id to attach.

use regex_lite::Regex;
use std::sync::LazyLock;
use thiserror::Error;

static IMPORTED_DISK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)successfully imported disk '([^']+)'").expect("static pattern compiles")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no imported volume id found in command output")]
pub struct VolumeIdNotFound;

/// Extracts the volume id from `qm importdisk` output
pub fn parse_imported_volume(output: &str) -> Result<String, VolumeIdNotFound> {
    IMPORTED_DISK
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or(VolumeIdNotFound)
}
