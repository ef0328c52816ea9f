use std::sync::Arc;

use anyhow::Context;
use axum::{extract::DefaultBodyLimit, Router};
use squeeze_engine::JobController;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::config::ServerConfig;

/// Shared by every request. Holds no per-job state.
#[derive(Clone)]
pub(crate) struct AppState {
    pub config: Arc<ServerConfig>,
    pub controller: JobController,
    /// Archive deliveries that outlive their handler.
    pub tasks: TaskTracker,
    /// Fires on server shutdown; running jobs stop at the next outcome.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: ServerConfig, shutdown: CancellationToken) -> Self {
        Self {
            controller: JobController::new(config.concurrency()),
            config: Arc::new(config),
            tasks: TaskTracker::new(),
            shutdown,
        }
    }
}

pub(crate) fn app_router(state: AppState) -> Router {
    Router::new()
        .nest("/api", crate::handler::optimize::optimize_router())
        // uploads are size checked per file while streaming
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}

pub(crate) fn start_api_server(
    config: ServerConfig,
    cancel: CancellationToken,
) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move {
        let addr = config.addr();
        log::info!(
            "scratch root {}, concurrency {}, upload limit {} bytes",
            config.scratch_root().display(),
            config.concurrency(),
            config.max_upload_bytes()
        );
        let state = AppState::new(config, cancel.clone());
        let tasks = state.tasks.clone();
        let app = app_router(state);

        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                cancel.cancel();
                return Err(e).with_context(|| format!("bind {}", addr));
            }
        };
        log::info!("API server started on {}", addr);
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(cancel.clone()))
            .await;
        cancel.cancel();

        tasks.close();
        if !tasks.is_empty() {
            log::info!("waiting for {} job deliveries to stop", tasks.len());
        }
        tasks.wait().await;
        served.context("serve")
    })
}

async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {
            log::info!("Shutting down API server...");
        }
    }
}
