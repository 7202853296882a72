//! ---
//! sim_section: "05-control-live-surfaces"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "REST control surface and WebSocket live view."
//! sim_version: "v0.1.0"
//! sim_owner: "tbd"
//! ---
//! Control surface for the simulator: REST operations for start/stop/status
//! and configuration updates, plus a WebSocket live view that pushes the
//! state snapshot on attach and every reading as it is produced.

use std::fmt;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use iotsim_engine::{EngineError, LiveEvent, SimulationState, SimulatorEngine};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Shared API state exposed to handlers.
pub struct ApiState {
    engine: Arc<SimulatorEngine>,
}

impl ApiState {
    pub fn new(engine: Arc<SimulatorEngine>) -> Self {
        Self { engine }
    }
}

impl fmt::Debug for ApiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiState").finish_non_exhaustive()
    }
}

/// Handle to the running API server.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ApiServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

/// Spawn the control API and live view server.
pub fn spawn_api_server(state: Arc<ApiState>, addr: SocketAddr) -> Result<ApiServer> {
    let router = Router::new()
        .route("/api/status", get(get_status))
        .route("/api/start", post(post_start))
        .route("/api/stop", post(post_stop))
        .route("/api/update_sensor", post(post_update_sensor))
        .route("/api/update_interval", post(post_update_interval))
        .route("/api/session/new", post(post_new_session))
        .route("/ws", get(upgrade_live_view))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind API listener {addr}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to configure API listener as non-blocking")?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve API listener address")?;
    let tcp_listener =
        TcpListener::from_std(listener).context("failed to create tokio listener")?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %local_addr, "api server listening");
        if let Err(err) = axum::serve(tcp_listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            error!(address = %local_addr, error = %err, "api server exited with error");
            return Err(err.into());
        }
        Ok(())
    });

    Ok(ApiServer {
        addr: local_addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

#[derive(Debug, Serialize)]
struct Ack {
    status: &'static str,
    message: String,
}

impl Ack {
    fn success(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            status: "success",
            message: message.into(),
        })
    }
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    status: &'static str,
    session_id: Uuid,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: &'static str,
    message: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match err {
            EngineError::AlreadyRunning | EngineError::NotRunning => StatusCode::CONFLICT,
            EngineError::InvalidInterval(_)
            | EngineError::UnknownSensor(_)
            | EngineError::InvalidSensorParams(_) => StatusCode::BAD_REQUEST,
            EngineError::Connection(_) => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            status: "error",
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

async fn get_status(State(state): State<Arc<ApiState>>) -> Json<SimulationState> {
    Json(state.engine.status())
}

async fn post_start(State(state): State<Arc<ApiState>>) -> Result<Json<Ack>, ApiError> {
    state.engine.start().await?;
    Ok(Ack::success("simulation started"))
}

async fn post_stop(State(state): State<Arc<ApiState>>) -> Result<Json<Ack>, ApiError> {
    state.engine.stop().await?;
    Ok(Ack::success("simulation stopped"))
}

#[derive(Debug, Deserialize)]
struct UpdateSensorRequest {
    sensor: String,
    params: serde_json::Value,
}

async fn post_update_sensor(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<UpdateSensorRequest>,
) -> Result<Json<Ack>, ApiError> {
    state.engine.update_sensor(&request.sensor, request.params)?;
    Ok(Ack::success(format!("sensor {} updated", request.sensor)))
}

#[derive(Debug, Deserialize)]
struct UpdateIntervalRequest {
    interval: f64,
}

async fn post_update_interval(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<UpdateIntervalRequest>,
) -> Result<Json<Ack>, ApiError> {
    state.engine.update_interval(request.interval)?;
    Ok(Ack::success(format!(
        "interval set to {}s",
        request.interval
    )))
}

async fn post_new_session(State(state): State<Arc<ApiState>>) -> Json<SessionResponse> {
    let session_id = state.engine.new_session();
    Json(SessionResponse {
        status: "success",
        session_id,
    })
}

async fn upgrade_live_view(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ApiState>>,
) -> Response {
    ws.on_upgrade(|socket| live_view_loop(socket, state))
}

/// Push channel for live subscribers: the current state snapshot first, then
/// every subsequent reading tagged with its sensor kind.
async fn live_view_loop(mut socket: WebSocket, state: Arc<ApiState>) {
    let mut events = state.engine.subscribe();

    let snapshot = LiveEvent::Status {
        state: state.engine.status(),
    };
    match serde_json::to_string(&snapshot) {
        Ok(text) => {
            if socket.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
        Err(err) => {
            warn!(error = %err, "failed to serialise state snapshot");
            return;
        }
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "live view client lagged behind; dropping events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                let Ok(text) = serde_json::to_string(&event) else {
                    warn!("failed to serialise live event");
                    continue;
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            message = socket.recv() => {
                let Some(Ok(message)) = message else {
                    break;
                };
                match message {
                    Message::Ping(payload) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    // The live view is one-way; other client frames are ignored.
                    Message::Text(_) | Message::Binary(_) | Message::Pong(_) => {}
                }
            }
        }
    }
}
