//! `ChatServer`: Axum router, shared state and listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use chatwire_core::{EventSink, StatusChannel};
use chatwire_runtime::AgentRuntime;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::broadcaster::StatusBroadcaster;
use crate::config::ServerConfig;
use crate::errors::{Result, ServerError};
use crate::event_log::spawn_event_logger;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::simulate::SimulatedWork;
use crate::websocket::registry::SessionRegistry;
use crate::websocket::session::{ConnectionSession, SessionDeps};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session → connection map.
    pub registry: Arc<SessionRegistry>,
    /// Process-wide status queue.
    pub status: StatusChannel,
    /// Agent backend.
    pub runtime: Arc<dyn AgentRuntime>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Simulated background job.
    pub work: Arc<SimulatedWork>,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// When the server started.
    pub start_time: Instant,
}

impl AppState {
    fn session_deps(&self) -> SessionDeps {
        SessionDeps {
            registry: Arc::clone(&self.registry),
            runtime: Arc::clone(&self.runtime),
            config: Arc::clone(&self.config),
        }
    }
}

/// The chat relay server.
pub struct ChatServer {
    state: AppState,
}

impl ChatServer {
    /// Create a server relaying to `runtime` and routing status from `status`.
    pub fn new(config: ServerConfig, runtime: Arc<dyn AgentRuntime>, status: StatusChannel) -> Self {
        let work = SimulatedWork::new(status.clone(), config.simulate_step_delay);
        Self {
            state: AppState {
                registry: Arc::new(SessionRegistry::new()),
                status,
                runtime,
                config: Arc::new(config),
                shutdown: Arc::new(ShutdownCoordinator::new()),
                work: Arc::new(work),
                metrics: None,
                start_time: Instant::now(),
            },
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let static_files = ServeDir::new(&self.state.config.static_dir);
        Router::new()
            .route("/", get(index_handler))
            .route("/ws/{session_id}", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/status", get(status_handler))
            .route("/simulate_work/{session_id}", post(simulate_work_handler))
            .nest_service("/static", static_files)
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Start the status broadcaster and the tool-event logger.
    pub fn start_background(&self, events: &EventSink) {
        let token = self.state.shutdown.token();
        let broadcaster = StatusBroadcaster::new(self.state.status.clone(), Arc::clone(&self.state.registry));
        self.state.shutdown.track(broadcaster.spawn(token.clone()));
        self.state.shutdown.track(spawn_event_logger(events, token));
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address; the serve task is tracked by the
    /// [`ShutdownCoordinator`].
    pub async fn listen(&self) -> Result<SocketAddr> {
        let addr = self.state.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr: addr.clone(), source })?;
        let local_addr = listener.local_addr()?;
        let router = self.router();
        let token = self.state.shutdown.token();

        let task = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(error) = served {
                error!(%error, "server stopped with error");
            }
        });
        self.state.shutdown.track(task);
        info!(addr = %local_addr, "chatwire server listening");
        Ok(local_addr)
    }

    /// Session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.state.registry
    }

    /// Status channel.
    pub fn status(&self) -> &StatusChannel {
        &self.state.status
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }
}

/// GET /
async fn index_handler(State(state): State<AppState>) -> Response {
    let path = state.config.static_dir.join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(body) => Html(body).into_response(),
        Err(error) => {
            warn!(path = %path.display(), %error, "index.html not found");
            (StatusCode::NOT_FOUND, Json(json!({ "error": "index.html not found" }))).into_response()
        }
    }
}

/// GET /ws/{session_id}
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let deps = state.session_deps();
    ws.on_upgrade(move |socket| async move {
        let summary = ConnectionSession::new(session_id.into(), deps).serve(socket).await;
        debug!(states = ?summary.states, exit = ?summary.first_exit, "session finished");
    })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.connected_count(),
        state.registry.len(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    session_id: Option<String>,
}

/// GET /status
async fn status_handler(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Json<Vec<String>> {
    let texts = state
        .status
        .recent(query.session_id.as_deref())
        .into_iter()
        .map(|message| message.text)
        .collect();
    Json(texts)
}

/// POST /simulate_work/{session_id}
async fn simulate_work_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    if let Some(job) = state.work.try_start(session_id.into(), state.shutdown.token()) {
        state.shutdown.track(job);
        (
            StatusCode::ACCEPTED,
            Json(json!({ "message": "Simulated work started in background." })),
        )
            .into_response()
    } else {
        (StatusCode::CONFLICT, Json(json!({ "error": "Work is already in progress." }))).into_response()
    }
}
