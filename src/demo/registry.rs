//! In-memory table of demos.
//!
//! A demo is registered by `/start`, mutated by the setup workers and removed
//! by cleanup. The lock is only held for short, non-async sections.
//!
//! Every registration gets a fresh `DemoId`. Mutations take the id, so work
//! started for a demo that has since been stopped (and maybe registered again
//! under the same name) cannot leak into the new one.

use crate::command::ProcessHandle;
use crate::demo::request::{ElasticMode, StartRejection, StartRequest};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Background processes a demo can own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProcessKind {
    Backend,
    Frontend,
    FrontendBuild,
    Reindex,
    ReindexGrammars,
    UpdateSynonyms,
}

impl ProcessKind {
    /// Key in the status JSON.
    pub fn key(&self) -> &'static str {
        match self {
            ProcessKind::Backend => "backend_process",
            ProcessKind::Frontend => "frontend_process",
            ProcessKind::FrontendBuild => "frontend_build",
            ProcessKind::Reindex => "backend_reindex",
            ProcessKind::ReindexGrammars => "backend_reindex_grammars",
            ProcessKind::UpdateSynonyms => "backend_update_synonyms",
        }
    }

    pub fn log_file(&self) -> &'static str {
        match self {
            ProcessKind::Backend => "server.log",
            ProcessKind::Frontend => "frontend.log",
            ProcessKind::FrontendBuild => "build.log",
            ProcessKind::Reindex => "index.log",
            ProcessKind::ReindexGrammars => "grammar_index.log",
            ProcessKind::UpdateSynonyms => "update_synonyms.log",
        }
    }

    /// Human readable state for the status page.
    pub fn describe(&self, exit_code: Option<i32>) -> String {
        match (self, exit_code) {
            (ProcessKind::Backend, None) => "Backend Running".to_string(),
            (ProcessKind::Frontend, None) => "Frontend Running".to_string(),
            (ProcessKind::FrontendBuild, None) => "Building frontend, please wait...".to_string(),
            (ProcessKind::Reindex, None) => "Reindexing, please wait...".to_string(),
            (ProcessKind::ReindexGrammars, None) => "Reindexing grammars, please wait...".to_string(),
            (ProcessKind::UpdateSynonyms, None) => "Updating synonyms, please wait...".to_string(),
            (ProcessKind::Backend, Some(code)) => {
                format!("Return code: {} (any value means backend is down!)", code)
            }
            (ProcessKind::Frontend, Some(code)) => {
                format!("Return code: {} (any value means frontend is down!)", code)
            }
            (_, Some(code)) => format!("Return code: {} (0 is done and ok)", code),
        }
    }
}

/// Which port pool to draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Backend,
    Frontend,
}

/// Hands out the lowest free port at or above `start`.
#[derive(Debug, Clone)]
pub struct PortPool {
    start: u16,
    in_use: BTreeSet<u16>,
}

impl PortPool {
    pub fn new(start: u16) -> Self {
        Self {
            start,
            in_use: BTreeSet::new(),
        }
    }

    pub fn allocate(&mut self) -> Option<u16> {
        let port = (self.start..=u16::MAX).find(|port| !self.in_use.contains(port))?;
        self.in_use.insert(port);
        Some(port)
    }

    pub fn release(&mut self, port: u16) {
        self.in_use.remove(&port);
    }

    pub fn in_use(&self) -> usize {
        self.in_use.len()
    }
}

/// One registration of a demo name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DemoId {
    name: String,
    generation: u64,
}

impl DemoId {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for DemoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Held by whoever is setting up or reloading a demo; stopping waits for it.
pub type SetupLock = Arc<tokio::sync::Mutex<()>>;

#[derive(Debug)]
pub struct Demo {
    pub name: String,
    pub comment: String,
    pub backend_branch: String,
    pub frontend_branch: String,
    pub elastic: ElasticMode,
    pub status: Vec<String>,
    pub backend_port: Option<u16>,
    pub frontend_port: Option<u16>,
    pub created_at: DateTime<Utc>,
    generation: u64,
    stopping: bool,
    setup_lock: SetupLock,
    processes: BTreeMap<ProcessKind, ProcessHandle>,
}

impl Demo {
    fn new(request: StartRequest, generation: u64) -> Self {
        let elastic = request.elastic_mode();
        Self {
            name: request.name,
            comment: request.comment,
            backend_branch: request.backend_branch,
            frontend_branch: request.frontend_branch,
            elastic,
            status: Vec::new(),
            backend_port: None,
            frontend_port: None,
            created_at: Utc::now(),
            generation,
            stopping: false,
            setup_lock: Arc::new(tokio::sync::Mutex::new(())),
            processes: BTreeMap::new(),
        }
    }

    fn id(&self) -> DemoId {
        DemoId {
            name: self.name.clone(),
            generation: self.generation,
        }
    }

    fn to_status(&self) -> DemoStatus {
        DemoStatus {
            name: self.name.clone(),
            comment: self.comment.clone(),
            backend_branch: self.backend_branch.clone(),
            frontend_branch: self.frontend_branch.clone(),
            elastic: self.elastic.as_str().to_string(),
            status: self.status.clone(),
            backend_port: self.backend_port,
            frontend_port: self.frontend_port,
            created_at: self.created_at,
            processes: self
                .processes
                .iter()
                .map(|(kind, handle)| (kind.key().to_string(), kind.describe(handle.exit_code())))
                .collect(),
        }
    }
}

/// What setup steps need to know about a demo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoInfo {
    pub backend_branch: String,
    pub frontend_branch: String,
    pub elastic: ElasticMode,
    pub backend_port: Option<u16>,
    pub frontend_port: Option<u16>,
}

/// Snapshot served by `/status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemoStatus {
    pub name: String,
    pub comment: String,
    pub backend_branch: String,
    pub frontend_branch: String,
    pub elastic: String,
    pub status: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frontend_port: Option<u16>,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub processes: BTreeMap<String, String>,
}

#[derive(Debug)]
struct RegistryState {
    demos: BTreeMap<String, Demo>,
    backend_ports: PortPool,
    frontend_ports: PortPool,
    next_generation: u64,
}

impl RegistryState {
    /// The demo `id` refers to, if that registration still exists.
    fn demo(&mut self, id: &DemoId) -> Option<&mut Demo> {
        self.demos
            .get_mut(&id.name)
            .filter(|demo| demo.generation == id.generation)
    }

    /// Like `demo`, but not while the demo is being stopped.
    fn active(&mut self, id: &DemoId) -> Option<&mut Demo> {
        self.demo(id).filter(|demo| !demo.stopping)
    }

    fn pool(&mut self, side: Side) -> &mut PortPool {
        match side {
            Side::Backend => &mut self.backend_ports,
            Side::Frontend => &mut self.frontend_ports,
        }
    }
}

#[derive(Debug)]
pub struct DemoRegistry {
    state: Mutex<RegistryState>,
}

impl DemoRegistry {
    pub fn new(backend_ports_start: u16, frontend_ports_start: u16) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                demos: BTreeMap::new(),
                backend_ports: PortPool::new(backend_ports_start),
                frontend_ports: PortPool::new(frontend_ports_start),
                next_generation: 0,
            }),
        }
    }

    // A panic while holding the lock leaves the table consistent (every
    // mutation is a single insert/remove), so poisoning is ignored.
    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a validated request.
    pub fn register(&self, request: StartRequest) -> Result<DemoId, StartRejection> {
        let mut state = self.state();
        if state.demos.contains_key(&request.name) {
            return Err(StartRejection::AlreadyExists(request.name));
        }
        state.next_generation += 1;
        let demo = Demo::new(request, state.next_generation);
        let id = demo.id();
        state.demos.insert(id.name.clone(), demo);
        Ok(id)
    }

    /// Whether a demo with this name is listed (including one being stopped).
    pub fn contains(&self, name: &str) -> bool {
        self.state().demos.contains_key(name)
    }

    /// Current registration of `name`, unless it is being stopped.
    pub fn current(&self, name: &str) -> Option<DemoId> {
        self.state()
            .demos
            .get(name)
            .filter(|demo| !demo.stopping)
            .map(Demo::id)
    }

    /// False once the demo was stopped or removed.
    pub fn is_active(&self, id: &DemoId) -> bool {
        self.state().active(id).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.state().demos.keys().cloned().collect()
    }

    pub fn info(&self, id: &DemoId) -> Option<DemoInfo> {
        self.state().demo(id).map(|demo| DemoInfo {
            backend_branch: demo.backend_branch.clone(),
            frontend_branch: demo.frontend_branch.clone(),
            elastic: demo.elastic.clone(),
            backend_port: demo.backend_port,
            frontend_port: demo.frontend_port,
        })
    }

    pub fn setup_lock(&self, id: &DemoId) -> Option<SetupLock> {
        self.state().demo(id).map(|demo| Arc::clone(&demo.setup_lock))
    }

    /// Append a line to the demo's status log. Stale ids are ignored: the
    /// demo may have been cleaned up while a worker was still busy.
    pub fn push_status(&self, id: &DemoId, message: impl Into<String>) {
        if let Some(demo) = self.state().demo(id) {
            demo.status.push(message.into());
        }
    }

    /// Port for `side`, allocating one on first use.
    pub fn allocate_port(&self, id: &DemoId, side: Side) -> Option<u16> {
        let mut state = self.state();
        let demo = state.active(id)?;
        let existing = match side {
            Side::Backend => demo.backend_port,
            Side::Frontend => demo.frontend_port,
        };
        if existing.is_some() {
            return existing;
        }

        let port = state.pool(side).allocate()?;
        if let Some(demo) = state.demo(id) {
            match side {
                Side::Backend => demo.backend_port = Some(port),
                Side::Frontend => demo.frontend_port = Some(port),
            }
        }
        Some(port)
    }

    /// Track `handle` as the demo's `kind` process.
    ///
    /// Returns the handle it replaces, if any. If the demo is gone or being
    /// stopped the handle is handed back.
    pub fn track(
        &self,
        id: &DemoId,
        kind: ProcessKind,
        handle: ProcessHandle,
    ) -> Result<Option<ProcessHandle>, ProcessHandle> {
        match self.state().active(id) {
            Some(demo) => Ok(demo.processes.insert(kind, handle)),
            None => Err(handle),
        }
    }

    pub fn take_process(&self, id: &DemoId, kind: ProcessKind) -> Option<ProcessHandle> {
        self.state()
            .demo(id)
            .and_then(|demo| demo.processes.remove(&kind))
    }

    pub fn take_processes(&self, id: &DemoId) -> Vec<(ProcessKind, ProcessHandle)> {
        self.state()
            .demo(id)
            .map(|demo| std::mem::take(&mut demo.processes).into_iter().collect())
            .unwrap_or_default()
    }

    /// Future resolving to the exit code of the demo's `kind` process.
    pub fn process_exit(
        &self,
        id: &DemoId,
        kind: ProcessKind,
    ) -> Option<impl Future<Output = i32> + Send + 'static> {
        self.state()
            .demo(id)
            .and_then(|demo| demo.processes.get(&kind))
            .map(ProcessHandle::wait)
    }

    /// Mark the demo as stopping: no new ports or processes are handed to it
    /// and `current` no longer finds it. `None` if it does not exist or is
    /// already stopping.
    pub fn begin_stop(&self, name: &str) -> Option<(DemoId, SetupLock)> {
        let mut state = self.state();
        let demo = state.demos.get_mut(name).filter(|demo| !demo.stopping)?;
        demo.stopping = true;
        demo.status.push("Stopping and cleaning...".to_string());
        Some((demo.id(), Arc::clone(&demo.setup_lock)))
    }

    /// Undo `begin_stop` after a failed cleanup, so it can be retried.
    pub fn abort_stop(&self, id: &DemoId) {
        if let Some(demo) = self.state().demo(id) {
            demo.stopping = false;
        }
    }

    /// Remove the demo and release its ports. Processes still tracked are
    /// returned with it (dropping them kills them).
    pub fn remove(&self, id: &DemoId) -> Option<Demo> {
        let mut state = self.state();
        state.demo(id)?;
        let demo = state.demos.remove(&id.name)?;
        if let Some(port) = demo.backend_port {
            state.backend_ports.release(port);
        }
        if let Some(port) = demo.frontend_port {
            state.frontend_ports.release(port);
        }
        Some(demo)
    }

    pub fn snapshot(&self) -> BTreeMap<String, DemoStatus> {
        self.state()
            .demos
            .iter()
            .map(|(name, demo)| (name.clone(), demo.to_status()))
            .collect()
    }

    pub fn ports_in_use(&self, side: Side) -> usize {
        self.state().pool(side).in_use()
    }
}
