//! Import workflow
//!
//! Turns uploaded disk images into a new VM in seven fixed steps:
//! 1. Validate & probe: connection cache healthy, `qm` available, disks present
//! 2. Connect: open the SSH session
//! 3. Provision: create the VM through the control plane
//! 4. Transfer: upload each disk into a per-job remote directory
//! 5. Import & attach: `qm importdisk`, then `qm set` the volume onto its slot
//! 6. Additional disks: allocate empty disks with `qm set`
//! 7. Finalize: set the boot order
//!
//! Cleanup runs after every outcome, including panics inside a step. The
//! terminal event is published once cleanup is done.

use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use toolbox_core::domain::import::ImportPlan;
use tracing::{debug, error, info};

use super::artifacts::UploadedArchive;
use super::connection::ConnectionCache;
use super::executor::run_command;
use super::reporter::ProgressReporter;
use super::transfer::TransferProgress;
use super::volume::parse_imported_volume;
use crate::error::JobError;
use crate::proxmox::{ControlPlane, VmSpec};
use crate::remote::{RemoteSession, SessionConnector, sh_escape};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Validate,
    Connect,
    Provision,
    Transfer,
    ImportDisks,
    AdditionalDisks,
    Finalize,
}

impl Step {
    const ALL: [Step; 7] = [
        Step::Validate,
        Step::Connect,
        Step::Provision,
        Step::Transfer,
        Step::ImportDisks,
        Step::AdditionalDisks,
        Step::Finalize,
    ];

    fn title(self) -> &'static str {
        match self {
            Step::Validate => "Validating environment",
            Step::Connect => "Connecting to the hypervisor host",
            Step::Provision => "Creating the virtual machine",
            Step::Transfer => "Uploading disk images",
            Step::ImportDisks => "Importing and attaching disks",
            Step::AdditionalDisks => "Creating additional disks",
            Step::Finalize => "Setting boot order",
        }
    }
}

/// Executes import plans against the control plane and the hypervisor host
pub struct ImportWorkflow {
    control_plane: Arc<dyn ControlPlane>,
    connector: Arc<dyn SessionConnector>,
    cache: Arc<ConnectionCache>,
    remote_temp_base: String,
}

impl ImportWorkflow {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        connector: Arc<dyn SessionConnector>,
        cache: Arc<ConnectionCache>,
        remote_temp_base: impl Into<String>,
    ) -> Self {
        Self {
            control_plane,
            connector,
            cache,
            remote_temp_base: remote_temp_base.into(),
        }
    }

    /// Runs the import to completion and publishes exactly one terminal event
    pub async fn run(&self, plan: ImportPlan, archive: UploadedArchive, reporter: ProgressReporter) {
        let remote_dir = format!(
            "{}/toolbox_{}",
            self.remote_temp_base.trim_end_matches('/'),
            reporter.job_id()
        );

        info!(
            "Import job {} started for VM {} on node {}",
            reporter.job_id(),
            plan.vm_id,
            plan.node
        );

        let mut run = ImportRun {
            workflow: self,
            plan: &plan,
            archive: &archive,
            reporter: &reporter,
            remote_dir,
            session: None,
            boot_slot: None,
        };

        let outcome = AssertUnwindSafe(run.execute_steps()).catch_unwind().await;

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => {
                error!("Import job {} failed: {}", reporter.job_id(), e);
                Some(e.user_message())
            }
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                error!("Import job {} panicked: {}", reporter.job_id(), detail);
                Some(format!("A critical unexpected error occurred: {}", detail))
            }
        };

        run.cleanup().await;

        match failure {
            None => reporter.finish("Import completed successfully!"),
            Some(message) => reporter.fail(message),
        };
    }
}

/// State of one import while its steps execute
struct ImportRun<'a> {
    workflow: &'a ImportWorkflow,
    plan: &'a ImportPlan,
    archive: &'a UploadedArchive,
    reporter: &'a ProgressReporter,
    remote_dir: String,
    session: Option<Box<dyn RemoteSession>>,
    boot_slot: Option<String>,
}

impl ImportRun<'_> {
    async fn execute_steps(&mut self) -> Result<(), JobError> {
        for (index, step) in Step::ALL.into_iter().enumerate() {
            self.reporter.info(format!(
                "Step {}/{}: {}",
                index + 1,
                Step::ALL.len(),
                step.title()
            ));

            match step {
                Step::Validate => self.validate().await?,
                Step::Connect => self.connect().await?,
                Step::Provision => self.provision().await?,
                Step::Transfer => self.transfer().await?,
                Step::ImportDisks => self.import_disks().await?,
                Step::AdditionalDisks => self.additional_disks().await?,
                Step::Finalize => self.finalize().await?,
            }
        }
        Ok(())
    }

    fn session(&self) -> Result<&dyn RemoteSession, JobError> {
        self.session
            .as_deref()
            .ok_or_else(|| JobError::Environment("remote session is not open".to_string()))
    }

    fn remote_path(&self, filename: &str) -> String {
        format!("{}/{}", self.remote_dir, filename)
    }

    async fn validate(&mut self) -> Result<(), JobError> {
        let outcome = self.workflow.cache.probe().await;
        if !outcome.is_ready() {
            return Err(JobError::Environment(outcome.message));
        }
        self.reporter.info(format!("Connection check passed: {}", outcome.message));

        for disk in &self.plan.uploaded_disks {
            let file = self.archive.find(&disk.filename).ok_or_else(|| {
                JobError::Artifact(format!(
                    "Uploaded disk '{}' was not found in the archive",
                    disk.filename
                ))
            })?;

            tokio::fs::metadata(&file.path).await.map_err(|e| {
                JobError::Artifact(format!(
                    "Uploaded disk '{}' is not readable: {}",
                    disk.filename, e
                ))
            })?;
        }

        self.reporter.info(format!(
            "{} uploaded disk(s) ready for import",
            self.plan.uploaded_disks.len()
        ));
        Ok(())
    }

    async fn connect(&mut self) -> Result<(), JobError> {
        let session = self
            .workflow
            .connector
            .connect()
            .await
            .map_err(JobError::Connection)?;
        self.session = Some(session);
        self.reporter.info("Remote session established");
        Ok(())
    }

    async fn provision(&mut self) -> Result<(), JobError> {
        let spec = VmSpec::from_plan(self.plan);

        self.workflow
            .control_plane
            .create_vm(&self.plan.node, &spec)
            .await
            .map_err(JobError::Provision)?;

        self.reporter.info(format!(
            "VM {} '{}' created on node {}",
            spec.vmid, spec.name, self.plan.node
        ));
        Ok(())
    }

    async fn transfer(&mut self) -> Result<(), JobError> {
        let session = self.session()?;
        let reporter = self.reporter;

        session
            .create_dir(&self.remote_dir)
            .await
            .map_err(|source| JobError::Transfer {
                file: self.remote_dir.clone(),
                source,
            })?;
        reporter.info(format!("Remote directory {} ready", self.remote_dir));

        for disk in &self.plan.uploaded_disks {
            let file = self.archive.find(&disk.filename).ok_or_else(|| {
                JobError::Artifact(format!("Uploaded disk '{}' disappeared", disk.filename))
            })?;
            let remote_path = self.remote_path(&file.name);

            reporter.info(format!("Uploading '{}' ({} bytes)", file.name, file.size));

            let mut tracker = TransferProgress::new();
            let name = file.name.as_str();
            let mut on_progress = |sent: u64, total: u64| {
                if let Some(percent) = tracker.update(sent, total) {
                    reporter.info(format!("Uploading '{}': {}%", name, percent));
                }
            };

            session
                .upload(&file.path, &remote_path, &mut on_progress)
                .await
                .map_err(|source| JobError::Transfer {
                    file: file.name.clone(),
                    source,
                })?;

            if let Some(percent) = tracker.complete() {
                reporter.info(format!("Uploading '{}': {}%", name, percent));
            }
            reporter.info(format!("Upload of '{}' complete", file.name));
        }
        Ok(())
    }

    async fn import_disks(&mut self) -> Result<(), JobError> {
        let session = self.session()?;
        let vmid = self.plan.vm_id;

        for disk in &self.plan.uploaded_disks {
            let label = format!("[{}]", disk.filename);
            let remote_path = self.remote_path(&disk.filename);

            let command = format!(
                "qm importdisk {} {} {}",
                vmid,
                sh_escape(&remote_path),
                sh_escape(&self.plan.storage)
            );
            let output = run_command(session, self.reporter, &command, &label, false).await?;

            let volume = parse_imported_volume(&output).map_err(|_| JobError::Import {
                file: disk.filename.clone(),
                output: output.clone(),
            })?;
            self.reporter
                .info(format!("Imported '{}' as {}", disk.filename, volume));

            let attach = format!(
                "qm set {} --{} {}",
                vmid,
                disk.bus_slot,
                sh_escape(&volume)
            );
            run_command(session, self.reporter, &attach, &label, false).await?;
            self.reporter
                .info(format!("Attached {} to {}", volume, disk.bus_slot));
        }

        self.boot_slot = self.plan.boot_slot().map(str::to_string);
        Ok(())
    }

    async fn additional_disks(&mut self) -> Result<(), JobError> {
        let session = self.session()?;

        for disk in &self.plan.additional_disks {
            if disk.is_skipped() {
                debug!("Skipping additional disk without slot or size: {:?}", disk);
                continue;
            }

            let command = format!(
                "qm set {} --{} {}:{}",
                self.plan.vm_id,
                disk.bus_slot,
                sh_escape(&self.plan.storage),
                disk.size_gb
            );
            let label = format!("[{}]", disk.bus_slot);
            run_command(session, self.reporter, &command, &label, false).await?;

            self.reporter.info(format!(
                "Created {} GB disk on {}",
                disk.size_gb, disk.bus_slot
            ));
        }
        Ok(())
    }

    async fn finalize(&mut self) -> Result<(), JobError> {
        let Some(slot) = self.boot_slot.as_deref() else {
            self.reporter
                .warn("No boot disk was selected; the boot order was not set");
            return Ok(());
        };

        self.workflow
            .control_plane
            .set_boot_order(&self.plan.node, self.plan.vm_id, slot)
            .await
            .map_err(JobError::Provision)?;

        self.reporter.info(format!("Boot order set to {}", slot));
        Ok(())
    }

    /// Best-effort teardown; problems are reported as warnings
    async fn cleanup(&mut self) {
        self.reporter.info("Cleaning up...");

        if let Some(session) = self.session.take() {
            let command = format!("rm -rf {}", sh_escape(&self.remote_dir));
            match run_command(session.as_ref(), self.reporter, &command, "[cleanup]", true).await {
                Ok(_) => self
                    .reporter
                    .info(format!("Removed remote directory {}", self.remote_dir)),
                Err(e) => self.reporter.warn(format!(
                    "Failed to remove remote directory {}: {}",
                    self.remote_dir, e
                )),
            }

            match session.close().await {
                Ok(()) => self.reporter.info("Remote session closed"),
                Err(e) => self
                    .reporter
                    .warn(format!("Failed to close remote session: {}", e)),
            }
        }

        match self.archive.discard().await {
            Ok(()) => self.reporter.info("Local upload files removed"),
            Err(e) => self
                .reporter
                .warn(format!("Failed to remove local upload files: {}", e)),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
