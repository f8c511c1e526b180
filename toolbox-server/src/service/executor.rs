//! Remote command executor
//!
//! Runs one command on an open session, publishing each stdout and stderr
//! line as it arrives while accumulating the full output for the caller.

use toolbox_core::domain::job::JobId;
use tracing::debug;

use super::reporter::ProgressReporter;
use crate::error::JobError;
use crate::remote::{CommandOutput, RemoteSession};

/// Splits a byte stream into trimmed, non-empty lines
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(data);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(line) = clean_line(&raw) {
                lines.push(line);
            }
        }
        lines
    }

    /// Residual partial line after the stream ended
    fn flush(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.pending);
        clean_line(&raw)
    }
}

fn clean_line(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

struct OutputCollector<'a> {
    reporter: &'a ProgressReporter,
    label: &'a str,
    captured: Vec<String>,
}

impl OutputCollector<'_> {
    fn stdout(&mut self, line: String) {
        self.reporter.info(format!("{} > {}", self.label, line));
        self.captured.push(line);
    }

    fn stderr(&mut self, line: String) {
        self.reporter.info(format!("{} [STDERR] > {}", self.label, line));
        self.captured.push(line);
    }
}

/// Executes `command` and returns its newline-joined output
///
/// Fails with [`JobError::RemoteCommandFailed`] on a non-zero or missing exit
/// status unless `allow_failure` is set.
pub async fn run_command(
    session: &dyn RemoteSession,
    reporter: &ProgressReporter,
    command: &str,
    label: &str,
    allow_failure: bool,
) -> Result<String, JobError> {
    reporter.info(format!("{} Executing command: {}", label, command));

    let mut channel = session
        .open_command(command)
        .await
        .map_err(JobError::Connection)?;

    let mut stdout = LineBuffer::default();
    let mut stderr = LineBuffer::default();
    let mut collector = OutputCollector {
        reporter,
        label,
        captured: Vec::new(),
    };
    let mut exit_status = None;

    while let Some(output) = channel.next_output().await.map_err(JobError::Connection)? {
        match output {
            CommandOutput::Stdout(data) => {
                for line in stdout.push(&data) {
                    collector.stdout(line);
                }
            }
            CommandOutput::Stderr(data) => {
                for line in stderr.push(&data) {
                    collector.stderr(line);
                }
            }
            CommandOutput::Exit(code) => exit_status = Some(code),
        }
    }

    if let Some(line) = stdout.flush() {
        collector.stdout(line);
    }
    if let Some(line) = stderr.flush() {
        collector.stderr(line);
    }

    let output = collector.captured.join("\n");
    log_exit(reporter.job_id(), command, exit_status);

    match exit_status {
        Some(0) => Ok(output),
        _ if allow_failure => Ok(output),
        exit_status => Err(JobError::RemoteCommandFailed {
            command: command.to_string(),
            exit_status,
            output,
        }),
    }
}

fn log_exit(job_id: JobId, command: &str, exit_status: Option<u32>) {
    debug!(
        "[job {}] command '{}' exited with {:?}",
        job_id, command, exit_status
    );
}
