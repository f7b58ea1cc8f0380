//! `WorkflowServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use relay_core::errors::FrameError;
use relay_core::protocol::FrameCodec;
use relay_settings::RelaySettings;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::metrics::WS_CONNECTIONS_REJECTED_TOTAL;
use crate::session::RequestTimeouts;
use crate::websocket::heartbeat::run_liveness_monitor;
use crate::websocket::lifecycle::{ConnectionContext, run_connection};
use crate::websocket::registry::SessionRegistry;
use crate::workflow::WorkflowRegistry;

/// Failures starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or inspecting the listener failed.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The configured namespace cannot be used in frame tags.
    #[error("invalid protocol namespace: {0}")]
    Frame(#[from] FrameError),
}

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
struct AppState {
    workflows: Arc<WorkflowRegistry>,
    connections: ConnectionContext,
    strict_paths: bool,
    max_message_size: usize,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

/// Routes device connections to registered workflows.
pub struct WorkflowServer {
    config: ServerConfig,
    state: AppState,
    shutdown: CancellationToken,
}

impl WorkflowServer {
    /// Create a server for `workflows`. The registry is read-only from here
    /// on.
    pub fn new(config: ServerConfig, workflows: WorkflowRegistry) -> Result<Self, ServerError> {
        let codec = FrameCodec::new(&config.namespace)?;
        let state = AppState {
            workflows: Arc::new(workflows),
            connections: ConnectionContext {
                sessions: Arc::new(SessionRegistry::new()),
                codec: Arc::new(codec),
                timeouts: RequestTimeouts {
                    request: config.request_timeout(),
                    refresh: config.refresh_timeout(),
                },
                send_queue_capacity: config.send_queue_capacity,
            },
            strict_paths: config.strict_paths,
            max_message_size: config.max_message_size,
            metrics: None,
            start_time: Instant::now(),
        };
        Ok(Self {
            config,
            state,
            shutdown: CancellationToken::new(),
        })
    }

    /// Create a server from loaded settings.
    pub fn from_settings(
        settings: &RelaySettings,
        workflows: WorkflowRegistry,
    ) -> Result<Self, ServerError> {
        Self::new(ServerConfig::from(&settings.server), workflows)
    }

    /// Serve `handle` on `/metrics`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/", get(ws_handler))
            .route("/{*path}", get(ws_handler))
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until [`shutdown`](Self::shutdown).
    ///
    /// Also runs the liveness monitor. Returns the bound address and the
    /// server task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let listener = TcpListener::bind(self.config.bind_address()).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let cancel = self.shutdown.clone();

        let interval = self.config.heartbeat_interval();
        let monitor = if interval.is_zero() {
            warn!("heartbeat interval is zero, liveness monitor disabled");
            None
        } else {
            Some(tokio::spawn(run_liveness_monitor(
                self.state.connections.sessions.clone(),
                interval,
                cancel.clone(),
            )))
        };

        let handle = tokio::spawn(async move {
            let stop = cancel.clone();
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await;
            if let Err(err) = served {
                error!(error = %err, "server error");
            }
            cancel.cancel();
            if let Some(monitor) = monitor {
                let _ = monitor.await;
            }
            info!("workflow server stopped");
        });

        info!(%addr, workflows = self.state.workflows.len(), "workflow server listening");
        Ok((addr, handle))
    }

    /// Stop accepting connections, stop the liveness monitor, and close every
    /// live session.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let closed = self.state.connections.sessions.close_all();
        info!(closed, "workflow server shutting down");
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Live sessions.
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.state.connections.sessions
    }

    /// Registered workflows.
    pub fn workflows(&self) -> &Arc<WorkflowRegistry> {
        &self.state.workflows
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.connections.sessions.count(),
        state.workflows.len(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Any other path: resolve the owning workflow, then upgrade.
///
/// The path is checked before the upgrade so unmatched requests never reach
/// the handshake.
async fn ws_handler(
    State(state): State<AppState>,
    uri: Uri,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let path = uri.path().to_owned();
    let Some(resolved) = state.workflows.resolve(&path, state.strict_paths) else {
        debug!(path, strict = state.strict_paths, "no workflow for path, rejecting");
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        return StatusCode::NOT_FOUND.into_response();
    };
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    let context = state.connections.clone();
    upgrade
        .max_message_size(state.max_message_size)
        .on_failed_upgrade(|err| warn!(error = %err, "websocket upgrade failed"))
        .on_upgrade(move |socket| run_connection(socket, resolved, path, context))
}
