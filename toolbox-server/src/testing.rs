//! In-memory fakes for the external seams used by the job engine tests

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use toolbox_core::domain::event::ProgressEvent;
use toolbox_core::domain::scrape::ScrapeRecord;

use crate::proxmox::{ControlPlane, ControlPlaneError, VmSpec};
use crate::remote::{CommandChannel, CommandOutput, RemoteSession, SessionConnector, SessionError};
use crate::service::connection::{ProbeOutcome, Prober};
use crate::service::fetch::{FetchError, PageFetcher};
use crate::service::registry::ProgressDrain;
use crate::service::sink::{PersistError, ResultSink};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reads a drained job's events until its stream ends
pub async fn collect_events(mut drain: ProgressDrain) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Some(event) = drain.next().await {
        events.push(event);
    }
    events
}

// =============================================================================
// Remote session
// =============================================================================

/// Output a fake command produces, in order
#[derive(Debug, Clone)]
pub struct ScriptedCommand {
    outputs: Vec<CommandOutput>,
}

impl ScriptedCommand {
    pub fn new(outputs: Vec<CommandOutput>) -> Self {
        Self { outputs }
    }

    pub fn exit(code: u32) -> Self {
        Self::new(vec![CommandOutput::Exit(code)])
    }
}

#[derive(Default)]
struct RemoteState {
    scripts: HashMap<String, ScriptedCommand>,
    executed: Vec<String>,
    created_dirs: Vec<String>,
    uploads: Vec<(String, String)>,
    connects: usize,
    closes: usize,
    fail_connect: bool,
    fail_upload: bool,
    fail_close: bool,
}

/// Scriptable remote host; commands without a script exit with 0
#[derive(Clone, Default)]
pub struct FakeRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts every command starting with `prefix`; the longest prefix wins
    pub fn script(&self, prefix: &str, command: ScriptedCommand) {
        lock(&self.state).scripts.insert(prefix.to_string(), command);
    }

    pub fn session(&self) -> FakeSession {
        FakeSession {
            state: Arc::clone(&self.state),
        }
    }

    pub fn connector(&self) -> FakeConnector {
        FakeConnector {
            state: Arc::clone(&self.state),
        }
    }

    pub fn fail_connect(&self) {
        lock(&self.state).fail_connect = true;
    }

    pub fn fail_upload(&self) {
        lock(&self.state).fail_upload = true;
    }

    pub fn fail_close(&self) {
        lock(&self.state).fail_close = true;
    }

    pub fn connects(&self) -> usize {
        lock(&self.state).connects
    }

    pub fn closes(&self) -> usize {
        lock(&self.state).closes
    }

    pub fn executed(&self) -> Vec<String> {
        lock(&self.state).executed.clone()
    }

    pub fn created_dirs(&self) -> Vec<String> {
        lock(&self.state).created_dirs.clone()
    }

    /// `(local file name, remote path)` of every finished upload
    pub fn uploads(&self) -> Vec<(String, String)> {
        lock(&self.state).uploads.clone()
    }
}

pub struct FakeConnector {
    state: Arc<Mutex<RemoteState>>,
}

#[async_trait]
impl SessionConnector for FakeConnector {
    async fn connect(&self) -> Result<Box<dyn RemoteSession>, SessionError> {
        let mut state = lock(&self.state);
        if state.fail_connect {
            return Err(SessionError::Connect {
                host: "pve.lab".to_string(),
                port: 22,
                reason: "connection refused".to_string(),
            });
        }
        state.connects += 1;

        Ok(Box::new(FakeSession {
            state: Arc::clone(&self.state),
        }))
    }
}

pub struct FakeSession {
    state: Arc<Mutex<RemoteState>>,
}

struct FakeChannel {
    outputs: VecDeque<CommandOutput>,
}

#[async_trait]
impl CommandChannel for FakeChannel {
    async fn next_output(&mut self) -> Result<Option<CommandOutput>, SessionError> {
        tokio::task::yield_now().await;
        Ok(self.outputs.pop_front())
    }
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn open_command(&self, command: &str) -> Result<Box<dyn CommandChannel>, SessionError> {
        let mut state = lock(&self.state);
        state.executed.push(command.to_string());

        let script = state
            .scripts
            .iter()
            .filter(|(prefix, _)| command.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, script)| script.clone())
            .unwrap_or_else(|| ScriptedCommand::exit(0));

        Ok(Box::new(FakeChannel {
            outputs: script.outputs.into(),
        }))
    }

    async fn create_dir(&self, path: &str) -> Result<(), SessionError> {
        lock(&self.state).created_dirs.push(path.to_string());
        Ok(())
    }

    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        on_progress: &mut (dyn FnMut(u64, u64) + Send),
    ) -> Result<(), SessionError> {
        let total = tokio::fs::metadata(local).await?.len();
        on_progress(0, total);

        if lock(&self.state).fail_upload {
            return Err(SessionError::Sftp("connection reset by peer".to_string()));
        }

        for step in 1..=100u64 {
            on_progress(total * step / 100, total);
        }

        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        lock(&self.state).uploads.push((name, remote.to_string()));
        Ok(())
    }

    async fn close(&self) -> Result<(), SessionError> {
        let mut state = lock(&self.state);
        state.closes += 1;
        if state.fail_close {
            return Err(SessionError::Channel("disconnect failed".to_string()));
        }
        Ok(())
    }
}

// =============================================================================
// Control plane
// =============================================================================

#[derive(Default)]
pub struct FakeControlPlane {
    calls: Mutex<Vec<String>>,
    fail_version: AtomicBool,
    fail_create: AtomicBool,
    panic_on_create: AtomicBool,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded create and update calls
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn fail_version(&self) {
        self.fail_version.store(true, Ordering::SeqCst);
    }

    pub fn fail_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn panic_on_create(&self) {
        self.panic_on_create.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn version(&self) -> Result<String, ControlPlaneError> {
        if self.fail_version.load(Ordering::SeqCst) {
            return Err(ControlPlaneError::api_error(401, "authentication failure"));
        }
        Ok("8.2.4".to_string())
    }

    async fn list_nodes(&self) -> Result<Vec<String>, ControlPlaneError> {
        Ok(vec!["pve1".to_string(), "pve2".to_string()])
    }

    async fn list_vm_ids(&self) -> Result<Vec<u32>, ControlPlaneError> {
        Ok(vec![100, 101, 105])
    }

    async fn list_storage(&self, _node: &str) -> Result<Vec<String>, ControlPlaneError> {
        Ok(vec!["local-lvm".to_string(), "nfs-images".to_string()])
    }

    async fn list_bridges(&self, node: &str) -> Result<Vec<String>, ControlPlaneError> {
        if node == "pve1" {
            Ok(vec!["vmbr0".to_string(), "vmbr1".to_string()])
        } else {
            Ok(vec!["vmbr0".to_string()])
        }
    }

    async fn create_vm(&self, node: &str, spec: &VmSpec) -> Result<(), ControlPlaneError> {
        if self.panic_on_create.load(Ordering::SeqCst) {
            panic!("control plane client crashed");
        }
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ControlPlaneError::api_error(
                500,
                format!("VM {} already exists on node '{}'", spec.vmid, node),
            ));
        }
        lock(&self.calls).push(format!("create_vm {} {}", node, spec.vmid));
        Ok(())
    }

    async fn set_boot_order(
        &self,
        node: &str,
        vmid: u32,
        slot: &str,
    ) -> Result<(), ControlPlaneError> {
        lock(&self.calls).push(format!("set_boot_order {} {} {}", node, vmid, slot));
        Ok(())
    }
}

// =============================================================================
// Prober
// =============================================================================

pub struct FakeProber {
    outcome: Mutex<ProbeOutcome>,
    calls: AtomicUsize,
}

impl FakeProber {
    pub fn new(outcome: ProbeOutcome) -> Self {
        Self {
            outcome: Mutex::new(outcome),
            calls: AtomicUsize::new(0),
        }
    }

    /// Outcome returned by subsequent live probes
    pub fn set(&self, outcome: ProbeOutcome) {
        *lock(&self.outcome) = outcome;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.outcome).clone()
    }
}

// =============================================================================
// Page fetcher
// =============================================================================

type FetchHook = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone)]
enum CannedPage {
    Html(String),
    Status(u16),
    Timeout,
}

#[derive(Default)]
struct FetcherState {
    pages: HashMap<String, CannedPage>,
    requested: Vec<String>,
    hook: Option<FetchHook>,
    delay: Option<Duration>,
}

/// Serves canned pages; unknown URLs answer 404
#[derive(Clone, Default)]
pub struct FakeFetcher {
    state: Arc<Mutex<FetcherState>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, html: &str) -> Self {
        lock(&self.state)
            .pages
            .insert(url.to_string(), CannedPage::Html(html.to_string()));
        self
    }

    pub fn failing(self, url: &str, status: u16) -> Self {
        lock(&self.state)
            .pages
            .insert(url.to_string(), CannedPage::Status(status));
        self
    }

    /// Answers `url` with a request timeout
    pub fn timing_out(self, url: &str) -> Self {
        lock(&self.state)
            .pages
            .insert(url.to_string(), CannedPage::Timeout);
        self
    }

    /// Runs `hook` with the URL at the start of every fetch
    pub fn on_fetch(self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        lock(&self.state).hook = Some(Arc::new(hook));
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        lock(&self.state).delay = Some(delay);
        self
    }

    pub fn requested(&self) -> Vec<String> {
        lock(&self.state).requested.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let (hook, delay, page) = {
            let mut state = lock(&self.state);
            state.requested.push(url.to_string());
            (state.hook.clone(), state.delay, state.pages.get(url).cloned())
        };

        if let Some(hook) = hook {
            hook(url);
        }

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match page {
            Some(CannedPage::Html(html)) => Ok(html),
            Some(CannedPage::Status(status)) => Err(FetchError::Status(status)),
            Some(CannedPage::Timeout) => Err(FetchError::Timeout),
            None => Err(FetchError::Status(404)),
        }
    }
}

// =============================================================================
// Result sink
// =============================================================================

#[derive(Default)]
pub struct MemorySink {
    saved: Mutex<Vec<Vec<ScrapeRecord>>>,
    calls: AtomicUsize,
    fail: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Every successfully persisted result set, in call order
    pub fn saved(&self) -> Vec<Vec<ScrapeRecord>> {
        lock(&self.saved).clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn persist(&self, records: &[ScrapeRecord]) -> Result<String, PersistError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PersistError::Io {
                path: "memory://results".to_string(),
                source: std::io::Error::other("disk full"),
            });
        }
        lock(&self.saved).push(records.to_vec());
        Ok("memory://results".to_string())
    }
}
