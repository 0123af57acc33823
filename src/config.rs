use anyhow::Result;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct DemoConfig {
    // HTTP
    pub port: u16,

    // Worker pool
    pub workers: usize,
    pub queue_capacity: usize,

    // Port pools
    pub backend_ports_start: u16,
    pub frontend_ports_start: u16,

    // Backend: the checkout demos are built from
    pub backend_repo: PathBuf,
    pub backend_binary: String,

    // Directory demo checkouts are created in
    pub workspace_dir: PathBuf,

    // Frontend
    pub frontend_repo_url: String,
    pub frontend_env_file: PathBuf,

    // Host name demos are reachable under
    pub public_host: String,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl DemoConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            port: env_or("PORT", 8000),

            workers: env_or("DEMO_WORKERS", 4),
            queue_capacity: env_or("DEMO_QUEUE_CAPACITY", 64),

            backend_ports_start: env_or("DEMO_BACKEND_PORTS_START", 9700),
            frontend_ports_start: env_or("DEMO_FRONTEND_PORTS_START", 4500),

            backend_repo: PathBuf::from(env_string("DEMO_BACKEND_REPO", ".")),
            backend_binary: env_string("DEMO_BACKEND_BINARY", "archive-backend"),

            workspace_dir: PathBuf::from(env_string("DEMO_WORKSPACE_DIR", "..")),

            frontend_repo_url: env_string(
                "DEMO_FRONTEND_REPO_URL",
                "https://github.com/Bnei-Baruch/kmedia-mdb.git",
            ),
            frontend_env_file: PathBuf::from(env_string(
                "DEMO_FRONTEND_ENV_FILE",
                "../kmedia-mdb/.env",
            )),

            public_host: env_string("DEMO_PUBLIC_HOST", "bbdev6.kbb1.com"),
        };

        if config.workers == 0 {
            anyhow::bail!("DEMO_WORKERS must be at least 1");
        }
        if config.queue_capacity == 0 {
            anyhow::bail!("DEMO_QUEUE_CAPACITY must be at least 1");
        }

        Ok(config)
    }
}
