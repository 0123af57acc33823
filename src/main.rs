use anyhow::Result;
use search_devtools::config::DemoConfig;
use search_devtools::server;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("search_devtools=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!("Starting demo server");

    let config = DemoConfig::from_env()?;
    info!(
        "Workers: {}, backend ports from {}, frontend ports from {}",
        config.workers, config.backend_ports_start, config.frontend_ports_start
    );

    server::run(config).await
}
