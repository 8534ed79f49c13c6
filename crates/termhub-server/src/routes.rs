use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use chrono::Utc;
use termhub_pty::SessionError;

use crate::error::ApiError;
use crate::protocol::{
    CreateSessionRequest, CreateSessionResponse, CursorQuery, HealthResponse, InputRequest,
    OutputResponse, PingResponse, ResizeRequest, ResizeResponse, SessionListResponse,
    SessionStatusResponse, StatusResponse,
};
use crate::state::AppState;
use crate::{sse, ws};

/// Header carrying the opaque caller identity used for per-caller limits.
pub const CALLER_HEADER: &str = "x-caller-id";

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/terminal/sessions", get(list_sessions).post(create_session))
        .route("/terminal/sessions/:id", delete(close_session))
        .route("/terminal/sessions/:id/output", get(get_output))
        .route("/terminal/sessions/:id/input", post(send_input))
        .route("/terminal/sessions/:id/resize", post(resize_session))
        .route("/terminal/sessions/:id/status", get(session_status))
        .route("/terminal/sessions/:id/stream", get(sse::stream_output))
        .route("/terminal/sessions/:id/ws", get(ws::session_socket))
        .route("/health", get(health))
        .route("/ping", get(ping))
        .with_state(state)
}

fn caller_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CALLER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|caller| !caller.is_empty())
        .map(str::to_string)
}

/// POST /terminal/sessions
pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    let caller = caller_id(&headers);
    let session = state
        .registry
        .create(request.rows, request.cols, request.cwd, request.shell, caller)
        .await?;

    Ok(Json(CreateSessionResponse {
        session_id: session.id().to_string(),
        status: "running",
    }))
}

/// GET /terminal/sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<SessionListResponse> {
    let caller = caller_id(&headers);
    let sessions = state.registry.list(caller.as_deref()).await;
    Json(SessionListResponse {
        count: sessions.len(),
        sessions,
    })
}

/// GET /terminal/sessions/:id/output?seq=N
pub async fn get_output(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<CursorQuery>,
) -> Result<Json<OutputResponse>, ApiError> {
    let session = state.registry.get(&id).await?;
    // Same ordering as the streaming transports: exit code first.
    let exit_code = session.exit_code();
    let (output, seq) = session.read_since(query.seq);

    Ok(Json(OutputResponse {
        output,
        seq,
        exit_code,
    }))
}

/// POST /terminal/sessions/:id/input
pub async fn send_input(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<InputRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let session = state.registry.get(&id).await?;
    session.write_input(&request.data).await?;
    Ok(Json(StatusResponse { status: "ok" }))
}

/// POST /terminal/sessions/:id/resize
pub async fn resize_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ResizeRequest>,
) -> Result<Json<ResizeResponse>, ApiError> {
    let session = state.registry.get(&id).await?;
    session.resize(request.rows, request.cols).await?;
    Ok(Json(ResizeResponse {
        status: "ok",
        rows: request.rows,
        cols: request.cols,
    }))
}

/// GET /terminal/sessions/:id/status
pub async fn session_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionStatusResponse>, ApiError> {
    let session = state.registry.get(&id).await?;
    Ok(Json(SessionStatusResponse::from_session(&session)))
}

/// DELETE /terminal/sessions/:id
pub async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    if state.registry.close(&id).await {
        Ok(Json(StatusResponse { status: "closed" }))
    } else {
        Err(SessionError::NotFound(id).into())
    }
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        active_sessions: state.registry.session_count().await,
        timestamp: Utc::now(),
    })
}

/// GET /ping
pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        status: "Healthy",
        time_of_last_update: Utc::now().timestamp(),
    })
}
