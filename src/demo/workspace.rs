//! Where demo checkouts live, and the file edits made to them.

use crate::config::DemoConfig;
use anyhow::{Context, Result};
use regex::{NoExpand, Regex};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Logs written into the frontend checkout; every other log lives in the
/// backend directory.
const FRONTEND_LOGS: &[&str] = &["frontend.log", "build.log"];

static LOG_FILE_REGEX: OnceLock<Regex> = OnceLock::new();
static BRANCH_REGEX: OnceLock<Regex> = OnceLock::new();

/// Absolute paths for the shared backend checkout and per-demo directories.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    backend_repo: PathBuf,
    backend_binary: String,
    frontend_env_file: PathBuf,
}

impl Workspace {
    /// Relative paths in `config` are anchored at the current directory, so
    /// commands run with a different working directory still find them.
    pub fn from_config(config: &DemoConfig) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        Ok(Self {
            root: cwd.join(&config.workspace_dir),
            backend_repo: cwd.join(&config.backend_repo),
            backend_binary: config.backend_binary.clone(),
            frontend_env_file: cwd.join(&config.frontend_env_file),
        })
    }

    pub fn backend_repo(&self) -> &Path {
        &self.backend_repo
    }

    pub fn backend_binary(&self) -> &str {
        &self.backend_binary
    }

    pub fn frontend_env_file(&self) -> &Path {
        &self.frontend_env_file
    }

    pub fn backend_dir(&self, name: &str) -> PathBuf {
        self.root.join(format!("archive-backend-{}", name))
    }

    pub fn frontend_dir(&self, name: &str) -> PathBuf {
        self.root.join(format!("kmedia-mdb-{}", name))
    }

    /// Path of a demo log file, or `None` if `file` is not a plain `*.log`
    /// name.
    pub fn log_path(&self, name: &str, file: &str) -> Option<PathBuf> {
        if !is_log_file_name(file) {
            return None;
        }
        let dir = if FRONTEND_LOGS.contains(&file) {
            self.frontend_dir(name)
        } else {
            self.backend_dir(name)
        };
        Some(dir.join(file))
    }
}

pub fn is_log_file_name(file: &str) -> bool {
    LOG_FILE_REGEX
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+\.log$").expect("valid log file regex"))
        .is_match(file)
}

/// Current branch from `git status` output, old (`# On branch`) or new
/// format, or the ref a detached HEAD points at.
pub fn parse_current_branch(git_status: &str) -> Option<String> {
    BRANCH_REGEX
        .get_or_init(|| {
            Regex::new(r"(?m)^(?:#\s*)?(?:On branch|HEAD detached at) (\S+)\s*$")
                .expect("valid branch regex")
        })
        .captures(git_status)
        .map(|captures| captures[1].to_string())
}

/// Replace every match of `pattern` in the file, returning how many
/// replacements were made. `replacement` is inserted literally.
pub async fn rewrite_file(path: &Path, pattern: &str, replacement: &str) -> Result<usize> {
    let regex = Regex::new(pattern).with_context(|| format!("Invalid pattern {}", pattern))?;
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let count = regex.find_iter(&contents).count();
    if count > 0 {
        let rewritten = regex.replace_all(&contents, NoExpand(replacement));
        tokio::fs::write(path, rewritten.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(count)
}
