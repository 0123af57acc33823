//! HTTP control surface for demo environments.

use crate::config::DemoConfig;
use crate::demo::request::is_valid_name;
use crate::demo::{
    DemoRegistry, DemoStatus, EnqueueError, Orchestrator, ReloadOutcome, SetupError, SetupQueue,
    StartRequest, Workspace,
};
use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const INDEX_HTML: &str = include_str!("../static/demo.html");

#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    queue: SetupQueue,
}

impl AppState {
    pub fn registry(&self) -> &Arc<DemoRegistry> {
        self.orchestrator.registry()
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    fn workspace(&self) -> &Workspace {
        self.orchestrator.workspace()
    }
}

/// Wire registry, orchestrator and worker pool. Must run inside a tokio
/// runtime, since the workers are spawned here.
pub fn build_state(config: &DemoConfig) -> Result<AppState> {
    let workspace = Workspace::from_config(config)?;
    let registry = Arc::new(DemoRegistry::new(
        config.backend_ports_start,
        config.frontend_ports_start,
    ));
    let orchestrator = Arc::new(Orchestrator::new(config.clone(), workspace, registry));
    let queue = SetupQueue::start(
        Arc::clone(&orchestrator),
        config.workers,
        config.queue_capacity,
    );
    Ok(AppState {
        orchestrator,
        queue,
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/status", get(status))
        .route("/logs/:name/:file", get(logs))
        .route("/stop_and_clean/:name", get(stop_and_clean))
        .route("/update_reload/:name", get(update_reload))
        .route("/start", post(start))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until ctrl-c, then stop and clean every remaining demo.
pub async fn run(config: DemoConfig) -> Result<()> {
    let state = build_state(&config)?;
    let orchestrator = Arc::clone(state.orchestrator());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Serving demo control on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down, cleaning up demos");
    orchestrator.cleanup_all().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}

fn unknown_demo(name: &str) -> Response {
    (StatusCode::NOT_FOUND, format!("Demo [{}] does not exist.", name)).into_response()
}

fn setup_error(e: SetupError) -> Response {
    let status = match e {
        SetupError::UnknownDemo(_) => StatusCode::NOT_FOUND,
        SetupError::Stopping(_) | SetupError::Busy(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string()).into_response()
}

// ==================== Handlers ====================

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn status(State(state): State<AppState>) -> Json<BTreeMap<String, DemoStatus>> {
    Json(state.registry().snapshot())
}

async fn logs(State(state): State<AppState>, Path((name, file)): Path<(String, String)>) -> Response {
    if !is_valid_name(&name) || !state.registry().contains(&name) {
        return unknown_demo(&name);
    }
    let Some(path) = state.workspace().log_path(&name, &file) else {
        return (StatusCode::NOT_FOUND, "Not a log file.").into_response();
    };

    // Logs are whatever the processes wrote, not necessarily UTF-8.
    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "text/plain")], bytes).into_response(),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            (StatusCode::NOT_FOUND, format!("No log [{}] yet.", file)).into_response()
        }
        Err(e) => {
            warn!("Failed reading {}: {}", path.display(), e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Unable to read file").into_response()
        }
    }
}

async fn stop_and_clean(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.orchestrator().stop_and_clean(&name).await {
        Ok(()) => format!("Stopped and cleaned [{}].", name).into_response(),
        Err(e) => {
            error!("Stop and clean of {} failed: {}", name, e);
            setup_error(e)
        }
    }
}

async fn update_reload(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.orchestrator().update_reload(&name).await {
        Ok(ReloadOutcome::Reloaded) => {
            "Updated variables, grammars and synonyms. Reloaded backend.".into_response()
        }
        Ok(ReloadOutcome::NotApplicable) => (
            StatusCode::BAD_REQUEST,
            "Update and reload is only available for reindex demos.",
        )
            .into_response(),
        Err(e) => {
            error!("Update reload of {} failed: {}", name, e);
            setup_error(e)
        }
    }
}

async fn start(State(state): State<AppState>, Json(request): Json<StartRequest>) -> Response {
    if let Err(rejection) = request.validate() {
        return (StatusCode::BAD_REQUEST, rejection.to_string()).into_response();
    }

    let id = match state.registry().register(request) {
        Ok(id) => id,
        Err(rejection) => return (StatusCode::BAD_REQUEST, rejection.to_string()).into_response(),
    };

    match state.queue.enqueue(id.clone()) {
        Ok(()) => {
            info!("Queued demo {}", id);
            StatusCode::OK.into_response()
        }
        Err(e) => {
            state.registry().remove(&id);
            warn!("Could not queue demo {}: {:?}", id, e);
            let message = match e {
                EnqueueError::Full => "Too many demos waiting for setup, try again later.",
                EnqueueError::Closed => "Setup workers are not running.",
            };
            (StatusCode::SERVICE_UNAVAILABLE, message).into_response()
        }
    }
}
