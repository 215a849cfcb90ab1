use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use camrelay_telemetry::MetricsRecorder;
use camrelay_transport::MessagingContext;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::acceptor::Acceptor;
use crate::config::ServerConfig;
use crate::health::{health_check, HealthResponse};
use crate::registry::{SessionInfo, SessionRegistry};
use crate::session::coordinator::Coordinator;
use crate::shutdown::ShutdownCoordinator;

/// Shared application state passed to Axum handlers.
pub struct AppState<C> {
    pub acceptor: Arc<Acceptor<C>>,
    pub shutdown: ShutdownCoordinator,
    pub started_at: Instant,
    pub max_frame_bytes: usize,
}

impl<C> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            acceptor: Arc::clone(&self.acceptor),
            shutdown: self.shutdown.clone(),
            started_at: self.started_at,
            max_frame_bytes: self.max_frame_bytes,
        }
    }
}

impl<C: MessagingContext> AppState<C> {
    fn health(&self) -> HealthResponse {
        let context = self.acceptor.context();
        health_check(
            self.started_at,
            self.acceptor.coordinator().registry().len(),
            context.open_channels(),
            !context.is_terminated() && !self.shutdown.is_shutting_down(),
        )
    }
}

/// Build the Axum router with all routes.
pub fn build_router<C: MessagingContext>(state: AppState<C>, static_dir: Option<&str>) -> Router {
    let router = Router::new()
        .route("/ws", get(ws_handler::<C>))
        .route("/health", get(health_handler::<C>))
        .route("/metrics", get(metrics_handler::<C>))
        .route("/sessions", get(sessions_handler::<C>))
        .with_state(state);

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind the listener and start serving. Returns a handle to shut it down.
pub async fn start<C: MessagingContext>(
    config: ServerConfig,
    context: Arc<C>,
    metrics: Arc<MetricsRecorder>,
) -> Result<ServerHandle<C>, std::io::Error> {
    let shutdown = ShutdownCoordinator::new();
    let coordinator = Coordinator::new(
        config.session_options(),
        Arc::new(SessionRegistry::new()),
        metrics,
    );
    let acceptor = Arc::new(Acceptor::new(Arc::clone(&context), coordinator, shutdown.token()));

    let state = AppState {
        acceptor,
        shutdown: shutdown.clone(),
        started_at: Instant::now(),
        max_frame_bytes: config.max_frame_bytes,
    };
    let router = build_router(state, config.static_dir.as_deref());

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    let local_addr = listener.local_addr()?;
    info!(%local_addr, static_dir = ?config.static_dir, "camrelay server started");

    let stop = shutdown.token();
    let serve = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(stop.cancelled_owned())
            .await
        {
            warn!(error = %e, "http server stopped with error");
        }
    });

    Ok(ServerHandle {
        local_addr,
        context,
        shutdown,
        serve,
    })
}

/// Handle returned by `start()`.
pub struct ServerHandle<C> {
    local_addr: SocketAddr,
    context: Arc<C>,
    shutdown: ShutdownCoordinator,
    serve: JoinHandle<()>,
}

impl<C: MessagingContext> ServerHandle<C> {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn context(&self) -> &Arc<C> {
        &self.context
    }

    /// Stop accepting, cancel every session and wait up to `grace` for them
    /// to tear down. Returns whether all sessions drained in time.
    pub async fn shutdown(mut self, grace: Duration) -> bool {
        self.context.terminate();
        let drained = self.shutdown.graceful_shutdown(Some(grace)).await;
        if tokio::time::timeout(grace, &mut self.serve).await.is_err() {
            self.serve.abort();
        }
        info!(drained, open_channels = self.context.open_channels(), "camrelay server stopped");
        drained
    }
}

/// WebSocket upgrade handler. Each upgraded socket becomes one session,
/// tracked so shutdown can wait for it.
async fn ws_handler<C: MessagingContext>(
    ws: WebSocketUpgrade,
    State(state): State<AppState<C>>,
) -> Response {
    let acceptor = Arc::clone(&state.acceptor);
    let tracker = state.shutdown.tracker();
    ws.max_message_size(state.max_frame_bytes)
        .on_failed_upgrade(|e| warn!(error = %e, "websocket upgrade failed"))
        .on_upgrade(move |socket| async move {
            let _ = tracker.track_future(acceptor.accept_socket(socket)).await;
        })
}

/// Health check HTTP endpoint.
async fn health_handler<C: MessagingContext>(State(state): State<AppState<C>>) -> impl IntoResponse {
    let health = state.health();
    let status = if health.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}

/// Prometheus exposition text.
async fn metrics_handler<C: MessagingContext>(State(state): State<AppState<C>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.acceptor.coordinator().metrics().render(),
    )
}

async fn sessions_handler<C: MessagingContext>(
    State(state): State<AppState<C>>,
) -> Json<Vec<SessionInfo>> {
    Json(state.acceptor.coordinator().registry().list())
}
