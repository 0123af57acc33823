//! Demo setup, reload and teardown.
//!
//! Every step is an external command or a file edit; the first failure stops
//! the routine and its message is appended to the demo's status log.
//!
//! Setup and reload hold the demo's setup lock. Stopping marks the demo first,
//! kills its processes and then waits for that lock, so a running setup gives
//! up at its next step instead of racing the cleanup.

use crate::command::{CommandError, CommandSpec, ProcessHandle};
use crate::config::DemoConfig;
use crate::demo::registry::{DemoId, DemoInfo, DemoRegistry, ProcessKind, Side};
use crate::demo::workspace::{parse_current_branch, rewrite_file, Workspace};
use futures::future::join_all;
use std::ffi::OsString;
use std::future::Future;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Directories copied from the shared backend checkout into every demo.
const SHARED_BACKEND_DATA: &[(&str, &str)] = &[
    ("search/variables", "search"),
    ("search/grammars", "search"),
    ("search/data", "search"),
    ("es/synonyms", "es"),
];

const BIND_ADDRESS_PATTERN: &str = r#"bind-address\s*=\s*":[0-9]+""#;
const INDEX_DATE_PATTERN: &str = r"#index-date.*";
const GRAMMAR_INDEX_DATE_PATTERN: &str = r"#grammar-index-date.*";

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Cannot use [{name}], already used.")]
    AlreadyUsed { name: String },

    #[error("Demo [{0}] does not exist.")]
    UnknownDemo(String),

    #[error("Demo [{0}] is being stopped.")]
    Stopping(String),

    #[error("Demo [{0}] is still being set up or reloaded, try again later.")]
    Busy(String),

    /// The demo was stopped while work for it was in progress.
    #[error("Demo [{0}] was stopped.")]
    Cancelled(String),

    #[error("Failed extracting git current branch.")]
    UnknownBranch,

    #[error("No free {0} port.")]
    NoFreePort(&'static str),

    #[error("{what} failed with return code {code}, see {log}.")]
    ProcessFailed {
        what: &'static str,
        code: i32,
        log: &'static str,
    },

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn io_error(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> SetupError {
    let context = context.into();
    move |source| SetupError::Io { context, source }
}

/// Outcome of `update_reload`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Reloaded,
    /// Demos on existing indexes have no synonyms of their own to reload.
    NotApplicable,
}

pub struct Orchestrator {
    config: DemoConfig,
    workspace: Workspace,
    registry: Arc<DemoRegistry>,
    // Backend builds and reloads switch branches in the shared checkout.
    backend_lock: Mutex<()>,
    command_env: Vec<(OsString, OsString)>,
}

impl Orchestrator {
    pub fn new(config: DemoConfig, workspace: Workspace, registry: Arc<DemoRegistry>) -> Self {
        Self {
            config,
            workspace,
            registry,
            backend_lock: Mutex::new(()),
            command_env: Vec::new(),
        }
    }

    /// Set an environment variable for every command this orchestrator runs.
    pub fn with_command_env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.command_env.push((key.into(), value.into()));
        self
    }

    pub fn registry(&self) -> &Arc<DemoRegistry> {
        &self.registry
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    fn info(&self, id: &DemoId) -> Result<DemoInfo, SetupError> {
        self.registry
            .info(id)
            .ok_or_else(|| SetupError::Cancelled(id.name().to_string()))
    }

    /// Fails once `id` was stopped, so the caller bails out before its next step.
    fn ensure_active(&self, id: &DemoId) -> Result<(), SetupError> {
        if self.registry.is_active(id) {
            Ok(())
        } else {
            Err(SetupError::Cancelled(id.name().to_string()))
        }
    }

    fn allocate_port(&self, id: &DemoId, side: Side) -> Result<u16, SetupError> {
        self.ensure_active(id)?;
        self.registry.allocate_port(id, side).ok_or(match side {
            Side::Backend => SetupError::NoFreePort("backend"),
            Side::Frontend => SetupError::NoFreePort("frontend"),
        })
    }

    fn command(&self, program: impl Into<OsString>) -> CommandSpec {
        self.command_env
            .iter()
            .fold(CommandSpec::new(program), |spec, (key, value)| {
                spec.env(key.clone(), value.clone())
            })
    }

    fn git(&self) -> CommandSpec {
        self.command("git").current_dir(self.workspace.backend_repo())
    }

    /// The demo's copy of the backend binary, run inside its directory.
    fn backend_command(&self, name: &str) -> CommandSpec {
        let dir = self.workspace.backend_dir(name);
        self.command(dir.join(self.workspace.backend_binary()))
            .current_dir(dir)
    }

    // ==================== Setup ====================

    /// Full setup for a queued demo. Progress and the first error, if any,
    /// go to the demo's status log.
    pub async fn set_up_demo(&self, id: &DemoId) {
        let Some(lock) = self.registry.setup_lock(id) else {
            info!("Demo {} is gone, skipping setup", id);
            return;
        };
        let _setup = lock.lock().await;

        info!("Setting up demo: {}", id);
        match self.run_setup(id).await {
            Ok(()) => {
                self.registry.push_status(id, "Done!");
                info!("Demo {} is up", id);
            }
            Err(SetupError::Cancelled(_)) => info!("Setup of {} stopped", id),
            Err(e) => {
                error!("Setting up demo {} failed: {}", id, e);
                self.registry.push_status(id, e.to_string());
            }
        }
    }

    async fn run_setup(&self, id: &DemoId) -> Result<(), SetupError> {
        self.ensure_active(id)?;
        self.registry.push_status(id, "Setting up backend");
        self.set_up_backend(id).await?;
        self.registry.push_status(id, "Backend set up.");

        self.ensure_active(id)?;
        self.registry.push_status(id, "Setting up frontend...");
        self.set_up_frontend(id).await?;

        if self.info(id)?.elastic.is_reindex() {
            self.reindex(id).await?;
        }
        Ok(())
    }

    async fn set_up_backend(&self, id: &DemoId) -> Result<(), SetupError> {
        let _guard = self.backend_lock.lock().await;
        let info = self.info(id)?;

        let dir = self.workspace.backend_dir(id.name());
        if path_exists(&dir).await {
            return Err(SetupError::AlreadyUsed {
                name: id.name().to_string(),
            });
        }

        let branch = format!("origin/{}", info.backend_branch);
        self.on_backend_branch(&branch, || self.build_backend(id, &info))
            .await?;

        self.start_backend(id).await
    }

    /// Runs with the shared checkout on `branch`: build, then assemble the
    /// demo directory.
    async fn build_backend(&self, id: &DemoId, info: &DemoInfo) -> Result<(), SetupError> {
        let name = id.name();
        let repo = self.workspace.backend_repo();
        self.command("make")
            .arg("build")
            .current_dir(repo)
            .run()
            .await?;
        self.ensure_active(id)?;
        self.registry.push_status(id, "Backend binary built");

        let dir = self.workspace.backend_dir(name);
        create_dir(&dir).await?;
        copy_file(&repo.join(self.workspace.backend_binary()), &dir).await?;
        copy_file(&repo.join("config.toml"), &dir).await?;
        create_dir(&dir.join("search")).await?;
        create_dir(&dir.join("es")).await?;
        copy_file(&repo.join("search/eval.html"), &dir.join("search")).await?;

        let port = self.allocate_port(id, Side::Backend)?;
        let config_path = dir.join("config.toml");
        rewrite_file(
            &config_path,
            BIND_ADDRESS_PATTERN,
            &format!("bind-address=\":{}\"", port),
        )
        .await?;

        self.copy_shared_backend_data(&dir).await?;

        if info.elastic.is_reindex() {
            rewrite_file(
                &config_path,
                INDEX_DATE_PATTERN,
                &format!("index-date = \"{}\"", name),
            )
            .await?;
            rewrite_file(
                &config_path,
                GRAMMAR_INDEX_DATE_PATTERN,
                &format!("grammar-index-date = \"{}\"", name),
            )
            .await?;
        }
        Ok(())
    }

    async fn copy_shared_backend_data(&self, dir: &Path) -> Result<(), SetupError> {
        let repo = self.workspace.backend_repo();
        for (source, target) in SHARED_BACKEND_DATA {
            self.command("cp")
                .arg("-rf")
                .arg(repo.join(source))
                .arg(dir.join(target))
                .run()
                .await?;
        }
        Ok(())
    }

    /// Check out `branch` in the shared backend checkout, run `work`, and
    /// restore the previous branch whether or not `work` succeeded.
    async fn on_backend_branch<F, Fut>(&self, branch: &str, work: F) -> Result<(), SetupError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), SetupError>>,
    {
        let status = self.git().arg("status").env("LC_ALL", "C").run().await?;
        let original = parse_current_branch(&status.stdout).ok_or(SetupError::UnknownBranch)?;

        self.git().arg("fetch").run().await?;
        if original == branch {
            return work().await;
        }

        self.git().args(["checkout", branch]).run().await?;
        let result = work().await;
        let restored = self.git().args(["checkout", original.as_str()]).run().await;

        match (result, restored) {
            (Ok(()), Ok(_)) => Ok(()),
            (Ok(()), Err(e)) => Err(e.into()),
            (Err(e), Ok(_)) => Err(e),
            (Err(e), Err(restore)) => {
                warn!("Failed restoring backend branch {}: {}", original, restore);
                Err(e)
            }
        }
    }

    async fn start_backend(&self, id: &DemoId) -> Result<(), SetupError> {
        self.ensure_active(id)?;
        let kind = ProcessKind::Backend;
        let handle = self
            .backend_command(id.name())
            .arg("server")
            .spawn_logged(&self.workspace.backend_dir(id.name()).join(kind.log_file()))?;
        self.track(id, kind, handle).await
    }

    async fn set_up_frontend(&self, id: &DemoId) -> Result<(), SetupError> {
        let info = self.info(id)?;
        let dir = self.workspace.frontend_dir(id.name());
        if path_exists(&dir).await {
            return Err(SetupError::AlreadyUsed {
                name: id.name().to_string(),
            });
        }

        self.command("git")
            .arg("clone")
            .arg(&self.config.frontend_repo_url)
            .arg(&dir)
            .run()
            .await?;
        self.command("git")
            .args(["checkout", info.frontend_branch.as_str()])
            .current_dir(&dir)
            .run()
            .await?;

        let env_file = dir.join(".env.demo");
        tokio::fs::copy(self.workspace.frontend_env_file(), &env_file)
            .await
            .map_err(io_error(format!(
                "Failed copying {}",
                self.workspace.frontend_env_file().display()
            )))?;

        let port = self.allocate_port(id, Side::Frontend)?;
        let backend_port = self.allocate_port(id, Side::Backend)?;
        let host = &self.config.public_host;

        rewrite_file(
            &env_file,
            "REACT_APP_BASE_URL=.*",
            &format!("REACT_APP_BASE_URL=http://{}:{}/", host, port),
        )
        .await?;
        rewrite_file(
            &env_file,
            "REACT_APP_API_BACKEND=.*",
            &format!("REACT_APP_API_BACKEND=http://{}:{}/", host, backend_port),
        )
        .await?;
        rewrite_file(
            &dir.join("server/app-prod.js"),
            r"'default-src': \[",
            &format!("'default-src': [ '{}:{}',", host, backend_port),
        )
        .await?;

        self.ensure_active(id)?;
        self.command("yarn")
            .arg("install")
            .current_dir(&dir)
            .run()
            .await?;

        let build = ProcessKind::FrontendBuild;
        self.run_job(
            id,
            build,
            self.command("yarn")
                .arg("build")
                .env("REACT_APP_ENV", "demo")
                .current_dir(&dir),
            &dir.join(build.log_file()),
        )
        .await?;

        self.start_frontend(id, port).await
    }

    async fn start_frontend(&self, id: &DemoId, port: u16) -> Result<(), SetupError> {
        self.ensure_active(id)?;
        let kind = ProcessKind::Frontend;
        let dir = self.workspace.frontend_dir(id.name());
        let handle = self
            .command("node")
            .arg("server/index.js")
            .env("SERVER_PORT", port.to_string())
            .env("NODE_ENV", "production")
            .current_dir(&dir)
            .spawn_logged(&dir.join(kind.log_file()))?;
        self.track(id, kind, handle).await
    }

    // ==================== Indexes ====================

    async fn reindex(&self, id: &DemoId) -> Result<(), SetupError> {
        let name = id.name();
        self.registry
            .push_status(id, format!("Cleaning existing indexes for [{}]", name));
        if let Err(e) = self.delete_indexes(name).await {
            warn!("Failed cleaning existing indexes for {}: {}", name, e);
            self.registry
                .push_status(id, format!("Failed cleaning existing indexes: {}", e));
        }

        self.registry
            .push_status(id, "Reindexing ... will take ~20 minutes.");
        let index_date = format!("--index_date={}", name);

        self.run_backend_job(
            id,
            ProcessKind::ReindexGrammars,
            &["index_grammars", &index_date, "--update_alias=false"],
        )
        .await?;
        self.registry.push_status(id, "Grammars indexed successfully.");

        self.run_backend_job(
            id,
            ProcessKind::Reindex,
            &["index", &index_date, "--update_alias=false"],
        )
        .await?;
        self.registry
            .push_status(id, "Indexed everything successfully.");

        self.update_synonyms(id).await?;
        self.registry.push_status(id, "Synonyms updated successfully.");
        Ok(())
    }

    async fn update_synonyms(&self, id: &DemoId) -> Result<(), SetupError> {
        let index_date = format!("--index_date={}", id.name());
        self.run_backend_job(
            id,
            ProcessKind::UpdateSynonyms,
            &["update_synonyms", &index_date],
        )
        .await
    }

    /// Delete the demo's dated indexes and grammar indexes.
    pub async fn delete_indexes(&self, name: &str) -> Result<(), SetupError> {
        let index_date = format!("--index_date={}", name);
        self.backend_command(name)
            .args(["delete_index", index_date.as_str()])
            .run()
            .await?;
        info!("Deleted index {}", name);
        self.backend_command(name)
            .args(["delete_grammar_index", index_date.as_str()])
            .run()
            .await?;
        info!("Deleted grammar index {}", name);
        Ok(())
    }

    async fn run_backend_job(&self, id: &DemoId, kind: ProcessKind, args: &[&str]) -> Result<(), SetupError> {
        let spec = self.backend_command(id.name()).args(args.iter().copied());
        let log = self.workspace.backend_dir(id.name()).join(kind.log_file());
        self.run_job(id, kind, spec, &log).await
    }

    /// Run a tracked job to completion. The job stays visible in the status
    /// snapshot with its exit code.
    async fn run_job(
        &self,
        id: &DemoId,
        kind: ProcessKind,
        spec: CommandSpec,
        log: &Path,
    ) -> Result<(), SetupError> {
        self.ensure_active(id)?;
        let handle = spec.spawn_logged(log)?;
        let exit = handle.wait();
        self.track(id, kind, handle).await?;

        let code = exit.await;
        // Killed by a stop: not a failure of the job itself.
        self.ensure_active(id)?;
        if code != 0 {
            return Err(SetupError::ProcessFailed {
                what: kind.key(),
                code,
                log: kind.log_file(),
            });
        }
        Ok(())
    }

    async fn track(&self, id: &DemoId, kind: ProcessKind, handle: ProcessHandle) -> Result<(), SetupError> {
        match self.registry.track(id, kind, handle) {
            Ok(Some(previous)) => {
                let code = previous.kill().await;
                info!("Replaced {} of {} (old one exited with {})", kind.key(), id, code);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(orphan) => {
                orphan.kill().await;
                Err(SetupError::Cancelled(id.name().to_string()))
            }
        }
    }

    // ==================== Reload ====================

    /// Refresh variables, grammars and synonyms from the backend branch and
    /// restart the backend. Refused while the demo is still being set up.
    pub async fn update_reload(&self, name: &str) -> Result<ReloadOutcome, SetupError> {
        let id = self
            .registry
            .current(name)
            .ok_or_else(|| SetupError::UnknownDemo(name.to_string()))?;
        let info = self.info(&id)?;
        if !info.elastic.is_reindex() {
            return Ok(ReloadOutcome::NotApplicable);
        }

        let lock = self
            .registry
            .setup_lock(&id)
            .ok_or_else(|| SetupError::UnknownDemo(name.to_string()))?;
        let _setup = lock
            .try_lock_owned()
            .map_err(|_| SetupError::Busy(name.to_string()))?;

        match self.reload(&id, &info).await {
            Ok(()) => {
                self.registry.push_status(
                    &id,
                    "Updated variables, grammars and synonyms. Reloaded backend.",
                );
                Ok(ReloadOutcome::Reloaded)
            }
            Err(e) => {
                if !matches!(e, SetupError::Cancelled(_)) {
                    self.registry.push_status(&id, e.to_string());
                }
                Err(e)
            }
        }
    }

    async fn reload(&self, id: &DemoId, info: &DemoInfo) -> Result<(), SetupError> {
        let _guard = self.backend_lock.lock().await;
        let branch = format!("origin/{}", info.backend_branch);
        let dir = self.workspace.backend_dir(id.name());

        self.on_backend_branch(&branch, || async {
            self.ensure_active(id)?;
            self.copy_shared_backend_data(&dir).await?;

            if let Some(backend) = self.registry.take_process(id, ProcessKind::Backend) {
                let code = backend.kill().await;
                info!("Killed backend of {}: {}", id, code);
            }
            self.start_backend(id).await?;

            // The backend is already restarted; a synonyms failure is only
            // reported.
            if let Err(e) = self.update_synonyms(id).await {
                self.registry.push_status(id, e.to_string());
            }
            Ok(())
        })
        .await
    }

    // ==================== Teardown ====================

    /// Stop all processes, delete dedicated indexes and directories, and
    /// forget the demo.
    ///
    /// A setup in progress for the demo is stopped first. If the directories
    /// cannot be removed the demo stays listed, so the call can be retried.
    pub async fn stop_and_clean(&self, name: &str) -> Result<(), SetupError> {
        let Some((id, lock)) = self.registry.begin_stop(name) else {
            return Err(if self.registry.contains(name) {
                SetupError::Stopping(name.to_string())
            } else {
                SetupError::UnknownDemo(name.to_string())
            });
        };
        info!("Stopping demo {}", name);

        for (kind, handle) in self.registry.take_processes(&id) {
            let code = handle.kill().await;
            info!("Killed {} of {}: {}", kind.key(), name, code);
        }

        // Setup notices the stop at its next step and lets go.
        let _setup = lock.lock().await;

        let info = self.info(&id)?;
        if info.elastic.is_reindex() {
            if let Err(e) = self.delete_indexes(name).await {
                warn!("Failed deleting indexes of {}: {}", name, e);
            }
        }

        for dir in [
            self.workspace.backend_dir(name),
            self.workspace.frontend_dir(name),
        ] {
            if let Err(e) = remove_dir(&dir).await {
                self.registry.abort_stop(&id);
                return Err(e);
            }
        }

        self.registry.remove(&id);
        info!("Stopped and cleaned demo {}", name);
        Ok(())
    }

    /// Stop and clean every demo concurrently; used on shutdown.
    pub async fn cleanup_all(&self) {
        let names = self.registry.names();
        let results = join_all(names.iter().map(|name| self.stop_and_clean(name))).await;
        for (name, result) in names.iter().zip(results) {
            if let Err(e) = result {
                error!("Failed cleaning demo {}: {}", name, e);
            }
        }
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

async fn create_dir(path: &Path) -> Result<(), SetupError> {
    tokio::fs::create_dir(path)
        .await
        .map_err(io_error(format!("Failed creating {}", path.display())))
}

/// Copy `source` into directory `target_dir`, keeping its file name.
async fn copy_file(source: &Path, target_dir: &Path) -> Result<(), SetupError> {
    let file_name = source.file_name().ok_or_else(|| SetupError::Io {
        context: format!("No file name in {}", source.display()),
        source: std::io::Error::from(ErrorKind::InvalidInput),
    })?;
    tokio::fs::copy(source, target_dir.join(file_name))
        .await
        .map_err(io_error(format!("Failed copying {}", source.display())))?;
    Ok(())
}

async fn remove_dir(path: &Path) -> Result<(), SetupError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_error(format!("Failed removing {}", path.display()))(e)),
    }
}
