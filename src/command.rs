//! External commands: typed builders, captured output, tracked processes.
//!
//! Every short-lived command either succeeds or fails with a `CommandError`
//! carrying its output. Long-running processes (servers, reindex jobs) are
//! spawned with output redirected to a log file and tracked through a
//! `ProcessHandle`.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

/// Reported exit code when a process was terminated by a signal.
pub const SIGNALLED_EXIT_CODE: i32 = -1;

/// How long a stopped process gets to exit after SIGTERM.
const TERMINATE_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start [{command}]: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("stderr: {stderr}, stdout: {stdout}")]
    Failed {
        command: String,
        code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Captured output of a successful command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Builder for one external command.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    envs: Vec<(OsString, OsString)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    fn std_command(&self) -> std::process::Command {
        let mut command = std::process::Command::new(&self.program);
        command.args(&self.args).envs(self.envs.iter().map(|(k, v)| (k, v)));
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        command
    }

    fn command(&self) -> Command {
        Command::from(self.std_command())
    }

    /// Run to completion, capturing output. Non-zero exit is an error.
    pub async fn run(&self) -> Result<CommandOutput, CommandError> {
        debug!("running command: [{}]", self);
        let output = self
            .command()
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| CommandError::Spawn {
                command: self.to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            let code = output.status.code().unwrap_or(SIGNALLED_EXIT_CODE);
            warn!("command [{}] exited with {}", self, code);
            return Err(CommandError::Failed {
                command: self.to_string(),
                code,
                stdout,
                stderr,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }

    /// Start the process with stdout and stderr appended to `log_path`.
    pub fn spawn_logged(&self, log_path: &Path) -> Result<ProcessHandle, CommandError> {
        let log_error = |source| CommandError::LogFile {
            path: log_path.to_path_buf(),
            source,
        };
        let log = std::fs::File::create(log_path).map_err(log_error)?;
        let log_err = log.try_clone().map_err(log_error)?;

        let mut command = self.std_command();
        // Own process group, so stopping also reaches whatever it spawned.
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut command, 0);

        let mut child = Command::from(command)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                command: self.to_string(),
                source,
            })?;

        let pid = child.id();
        info!("started [{}], pid: {:?}", self, pid);

        let (exit_tx, exit_rx) = watch::channel(None);
        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let label = self.to_string();

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => terminate(&mut child, pid, &label).await,
            };
            let code = match status {
                Ok(status) => status.code().unwrap_or(SIGNALLED_EXIT_CODE),
                Err(e) => {
                    warn!("failed waiting for [{}]: {}", label, e);
                    SIGNALLED_EXIT_CODE
                }
            };
            debug!("[{}] exited with {}", label, code);
            let _ = exit_tx.send(Some(code));
        });

        Ok(ProcessHandle {
            pid,
            exit: exit_rx,
            kill: Some(kill_tx),
        })
    }
}

/// SIGTERM the process group, then SIGKILL the process if it is still
/// running after `TERMINATE_GRACE`.
async fn terminate(child: &mut Child, pid: Option<u32>, label: &str) -> std::io::Result<ExitStatus> {
    if let Some(pid) = pid {
        signal_group("TERM", pid).await;
        match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
            Ok(status) => return status,
            Err(_) => {
                warn!("[{}] ignored SIGTERM, killing it", label);
                signal_group("KILL", pid).await;
            }
        }
    }
    if let Err(e) = child.start_kill() {
        warn!("failed stopping [{}]: {}", label, e);
    }
    child.wait().await
}

#[cfg(unix)]
async fn signal_group(signal: &str, pgid: u32) {
    let result = CommandSpec::new("sh")
        .args(["-c", r#"kill -s "$0" -- "-$1""#])
        .arg(signal)
        .arg(pgid.to_string())
        .run()
        .await;
    if let Err(e) = result {
        debug!("signalling process group {} failed: {}", pgid, e);
    }
}

#[cfg(not(unix))]
async fn signal_group(_signal: &str, _pgid: u32) {}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.envs {
            write!(f, "{}={} ", key.to_string_lossy(), value.to_string_lossy())?;
        }
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// A running (or finished) background process.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Option<u32>,
    exit: watch::Receiver<Option<i32>>,
    kill: Option<oneshot::Sender<()>>,
}

impl ProcessHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit code, or `None` while the process is still running.
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit.borrow()
    }

    /// A future resolving to the exit code; does not borrow the handle, so
    /// it can be awaited while the handle stays in a shared table.
    pub fn wait(&self) -> impl std::future::Future<Output = i32> + Send + 'static {
        let mut exit = self.exit.clone();
        async move {
            match exit.wait_for(Option::is_some).await {
                Ok(code) => code.unwrap_or(SIGNALLED_EXIT_CODE),
                // Monitor task gone without reporting: treat as killed.
                Err(_) => SIGNALLED_EXIT_CODE,
            }
        }
    }

    /// Terminate the process and wait for it to exit.
    pub async fn kill(mut self) -> i32 {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
        self.wait().await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    // ==================== run Tests ====================

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let output = CommandSpec::new("sh")
            .args(["-c", "echo hello"])
            .run()
            .await
            .expect("Should succeed");
        assert_eq!(output.stdout, "hello\n");
        assert!(output.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_run_nonzero_exit_is_error() {
        let err = CommandSpec::new("sh")
            .args(["-c", "echo out; echo err >&2; exit 3"])
            .run()
            .await
            .unwrap_err();

        match &err {
            CommandError::Failed { code, .. } => assert_eq!(*code, 3),
            other => panic!("expected Failed, got {:?}", other),
        }
        assert_eq!(err.to_string(), "stderr: err\n, stdout: out\n");
    }

    #[tokio::test]
    async fn test_run_missing_program_is_spawn_error() {
        let err = CommandSpec::new("definitely-not-a-real-program-4711")
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_run_uses_cwd_and_env() {
        let temp_dir = TempDir::new().unwrap();
        let output = CommandSpec::new("sh")
            .args(["-c", "pwd; echo $DEMO_VALUE"])
            .current_dir(temp_dir.path())
            .env("DEMO_VALUE", "42")
            .run()
            .await
            .unwrap();

        let lines: Vec<_> = output.stdout.lines().collect();
        let expected = temp_dir.path().canonicalize().unwrap();
        assert_eq!(Path::new(lines[0]).canonicalize().unwrap(), expected);
        assert_eq!(lines[1], "42");
    }

    #[test]
    fn test_display_includes_env_and_args() {
        let spec = CommandSpec::new("node")
            .arg("server/index.js")
            .env("SERVER_PORT", "4500");
        assert_eq!(spec.to_string(), "SERVER_PORT=4500 node server/index.js");
    }

    // ==================== spawn_logged Tests ====================

    #[tokio::test]
    async fn test_spawn_logged_writes_log_and_reports_exit() {
        let temp_dir = TempDir::new().unwrap();
        let log = temp_dir.path().join("job.log");

        let handle = CommandSpec::new("sh")
            .args(["-c", "echo to-out; echo to-err >&2; exit 2"])
            .spawn_logged(&log)
            .expect("Should spawn");

        assert_eq!(handle.wait().await, 2);
        assert_eq!(handle.exit_code(), Some(2));

        let contents = std::fs::read_to_string(&log).unwrap();
        assert!(contents.contains("to-out"));
        assert!(contents.contains("to-err"));
    }

    #[tokio::test]
    async fn test_running_process_has_no_exit_code() {
        let temp_dir = TempDir::new().unwrap();
        let handle = CommandSpec::new("sleep")
            .arg("30")
            .spawn_logged(&temp_dir.path().join("sleep.log"))
            .unwrap();

        assert!(handle.pid().is_some());
        assert_eq!(handle.exit_code(), None);

        let code = tokio::time::timeout(Duration::from_secs(10), handle.kill())
            .await
            .expect("kill should not hang");
        assert_eq!(code, SIGNALLED_EXIT_CODE);
    }

    #[cfg(target_os = "linux")]
    fn is_running(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .map(|rest| !rest.trim_start().starts_with('Z'))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_kill_stops_grandchildren() {
        let temp_dir = TempDir::new().unwrap();
        let pid_file = temp_dir.path().join("grandchild.pid");
        let handle = CommandSpec::new("sh")
            .args(["-c", r#"sleep 30 & echo $! > "$0"; wait"#])
            .arg(&pid_file)
            .spawn_logged(&temp_dir.path().join("group.log"))
            .unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        let grandchild = loop {
            if let Ok(pid) = std::fs::read_to_string(&pid_file) {
                if pid.ends_with('\n') {
                    break pid.trim().to_string();
                }
            }
            assert!(tokio::time::Instant::now() < deadline, "grandchild never started");
            tokio::time::sleep(Duration::from_millis(20)).await;
        };

        assert_eq!(handle.kill().await, SIGNALLED_EXIT_CODE);

        // Zombies count as gone: nothing may be reaping orphans here.
        while is_running(&grandchild) {
            assert!(tokio::time::Instant::now() < deadline, "grandchild survived");
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    #[tokio::test]
    async fn test_kill_after_exit_returns_exit_code() {
        let temp_dir = TempDir::new().unwrap();
        let handle = CommandSpec::new("true")
            .spawn_logged(&temp_dir.path().join("true.log"))
            .unwrap();

        handle.wait().await;
        assert_eq!(handle.kill().await, 0);
    }

    #[tokio::test]
    async fn test_spawn_logged_missing_log_dir() {
        let err = CommandSpec::new("true")
            .spawn_logged(Path::new("/nonexistent-dir-4711/x.log"))
            .unwrap_err();
        assert!(matches!(err, CommandError::LogFile { .. }));
    }
}
