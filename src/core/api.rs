//! HTTP + WebSocket API for emostab
//!
//! Each session owns a processing loop fed through a channel source.
//!
//! Endpoints:
//! - POST /session/new - Create session and start its loop
//! - GET /session/{id} - Latest loop snapshot
//! - POST /session/{id}/sample - Queue a classification
//! - POST /session/{id}/reset - Manual full reset
//! - PUT /session/{id}/config - Apply config overrides
//! - DELETE /session/{id} - Stop the loop, return its stats
//! - WS /ws/{id} - Live emissions
//! - GET /health - Health check

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch, RwLock};
use tokio::task::JoinHandle;

use crate::core::engine::EmotionEngine;
use crate::core::processing::{Control, LoopSnapshot, LoopStats, ProcessingLoop};
use crate::core::source::ChannelSource;
use crate::types::{
    ConfigOverrides, DeviceClass, Emission, EngineConfig, Modality, SampleInput,
};

/// Session state
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub modality: Modality,
    pub control: mpsc::Sender<Control>,
    pub samples: mpsc::UnboundedSender<SampleInput>,
    pub snapshot: watch::Receiver<LoopSnapshot>,
    pub emissions: broadcast::Sender<Emission>,
    pub task: JoinHandle<LoopStats>,
}

/// App state
pub struct AppState {
    pub sessions: RwLock<HashMap<String, Session>>,
    pub device: DeviceClass,
}

/// Create new session request
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NewSessionRequest {
    pub modality: Option<Modality>,
    pub mobile: Option<bool>,
    pub config: Option<ConfigOverrides>,
}

/// Create new session response
#[derive(Debug, Serialize, Deserialize)]
pub struct NewSessionResponse {
    pub session_id: String,
    pub websocket_url: String,
    pub config: EngineConfig,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub sessions_active: usize,
}

/// Error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Handler failure mapped onto a status code
#[derive(Debug)]
pub enum ApiError {
    NotFound,
    BadRequest(String),
    /// The session's loop is gone
    Gone,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "session not found".to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Gone => (StatusCode::GONE, "session loop has stopped".to_string()),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

/// Create the API router
pub fn create_router(device: DeviceClass) -> Router {
    let state = Arc::new(AppState {
        sessions: RwLock::new(HashMap::new()),
        device,
    });

    Router::new()
        .route("/health", get(health))
        .route("/session/new", post(create_session))
        .route("/session/:id", get(get_session).delete(delete_session))
        .route("/session/:id/sample", post(add_sample))
        .route("/session/:id/reset", post(reset_session))
        .route("/session/:id/config", axum::routing::put(configure_session))
        .route("/ws/:id", get(websocket_handler))
        .with_state(state)
}

/// Health check endpoint
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let sessions = state.sessions.read().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        sessions_active: sessions.len(),
    })
}

/// Create new session and start its loop
async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewSessionRequest>,
) -> Result<Json<NewSessionResponse>, ApiError> {
    let device = match req.mobile {
        Some(true) => DeviceClass::Mobile,
        Some(false) => DeviceClass::Desktop,
        None => state.device,
    };
    let modality = req.modality.unwrap_or(Modality::Video);
    let base = EngineConfig::for_modality(modality, device);
    let config = match &req.config {
        Some(overrides) => overrides
            .apply(&base)
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => base,
    };

    let session_id = generate_session_id();
    let (control, control_rx) = mpsc::channel(32);
    let (samples, source) = ChannelSource::channel();
    let (emissions, _) = broadcast::channel(100);

    let processing = ProcessingLoop::new(EmotionEngine::new(config.clone()), Box::new(emissions.clone()));
    let (snapshot_tx, snapshot) = watch::channel(processing.snapshot());
    let processing = processing.with_snapshots(snapshot_tx);

    control
        .try_send(Control::Start(Some(session_id.clone())))
        .map_err(|_| ApiError::Gone)?;
    let task = tokio::spawn(processing.run(Arc::new(source), control_rx));

    tracing::info!(session = %session_id, %modality, "session created");

    let session = Session {
        id: session_id.clone(),
        modality,
        control,
        samples,
        snapshot,
        emissions,
        task,
    };

    let mut sessions = state.sessions.write().await;
    sessions.insert(session_id.clone(), session);

    Ok(Json(NewSessionResponse {
        session_id: session_id.clone(),
        websocket_url: format!("/ws/{}", session_id),
        config,
    }))
}

/// Latest loop snapshot
async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<LoopSnapshot>, ApiError> {
    let sessions = state.sessions.read().await;
    let session = sessions.get(&id).ok_or(ApiError::NotFound)?;
    let snapshot = session.snapshot.borrow().clone();
    Ok(Json(snapshot))
}

/// Queue a classification for the session's loop
async fn add_sample(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SampleInput>,
) -> Result<StatusCode, ApiError> {
    if !req.confidence.is_finite() {
        return Err(ApiError::BadRequest("confidence must be a finite number".to_string()));
    }
    let sessions = state.sessions.read().await;
    let session = sessions.get(&id).ok_or(ApiError::NotFound)?;
    session.samples.send(req).map_err(|_| ApiError::Gone)?;
    Ok(StatusCode::ACCEPTED)
}

/// Manual full reset
async fn reset_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let control = {
        let sessions = state.sessions.read().await;
        sessions.get(&id).ok_or(ApiError::NotFound)?.control.clone()
    };
    control.send(Control::Reset).await.map_err(|_| ApiError::Gone)?;
    Ok(StatusCode::ACCEPTED)
}

/// Apply config overrides to a running session
async fn configure_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(overrides): Json<ConfigOverrides>,
) -> Result<StatusCode, ApiError> {
    let control = {
        let sessions = state.sessions.read().await;
        sessions.get(&id).ok_or(ApiError::NotFound)?.control.clone()
    };

    let (reply_tx, reply_rx) = oneshot::channel();
    control
        .send(Control::Configure(overrides, Some(reply_tx)))
        .await
        .map_err(|_| ApiError::Gone)?;
    match reply_rx.await {
        Ok(Ok(())) => Ok(StatusCode::NO_CONTENT),
        Ok(Err(e)) => Err(ApiError::BadRequest(e.to_string())),
        Err(_) => Err(ApiError::Gone),
    }
}

/// Stop the loop and return its final counters
async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<LoopStats>, ApiError> {
    let session = {
        let mut sessions = state.sessions.write().await;
        sessions.remove(&id).ok_or(ApiError::NotFound)?
    };

    // a closed channel means the loop already finished
    let _ = session.control.send(Control::Shutdown).await;
    let stats = session.task.await.map_err(|_| ApiError::Gone)?;
    tracing::info!(session = %session.id, modality = %session.modality, "session closed");
    Ok(Json(stats))
}

/// WebSocket handler for live emissions
async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let sessions = state.sessions.read().await;
    let session = sessions.get(&id).ok_or(ApiError::NotFound)?;
    let rx = session.emissions.subscribe();
    drop(sessions);

    Ok(ws.on_upgrade(move |socket| async move {
        handle_websocket(socket, rx).await;
    }))
}

/// Forward emissions until the client or the session goes away
async fn handle_websocket(mut socket: WebSocket, mut rx: broadcast::Receiver<Emission>) {
    loop {
        let emission = match rx.recv().await {
            Ok(emission) => emission,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "websocket client lagging");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let json = match serde_json::to_string(&emission) {
            Ok(json) => json,
            Err(_) => continue,
        };
        if socket.send(Message::Text(json)).await.is_err() {
            break;
        }
    }
}

/// Generate session ID
fn generate_session_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("session_{:x}_{}", nanos, seq)
}

/// Run the API server
pub async fn run_server(addr: &str, device: DeviceClass) -> Result<(), Box<dyn std::error::Error>> {
    let router = create_router(device);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, ?device, "api listening");
    println!("emostab API running on {}", addr);
    println!("  POST   /session/new         - Create session");
    println!("  GET    /session/:id         - Get status");
    println!("  POST   /session/:id/sample  - Queue sample");
    println!("  POST   /session/:id/reset   - Reset session");
    println!("  PUT    /session/:id/config  - Apply overrides");
    println!("  DELETE /session/:id         - Close session");
    println!("  WS     /ws/:id              - Live emissions");
    println!("  GET    /health              - Health check");
    axum::serve(listener, router).await?;
    Ok(())
}
