//! Request, response and streaming frame types of the HTTP API.
//!
//! REST bodies are plain structs. WebSocket frames are externally tagged
//! (`{"input": {...}}`), SSE events are flat `{output, seq, exit_code}`
//! objects whose last instance carries the exit code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use termhub_pty::{OutputEvent, PtySession, SessionSummary};

fn default_rows() -> u16 {
    24
}

fn default_cols() -> u16 {
    80
}

fn default_shell() -> String {
    "bash".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default = "default_rows")]
    pub rows: u16,
    #[serde(default = "default_cols")]
    pub cols: u16,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default = "default_shell")]
    pub shell: String,
}

impl Default for CreateSessionRequest {
    fn default() -> Self {
        Self {
            rows: default_rows(),
            cols: default_cols(),
            cwd: None,
            shell: default_shell(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub status: &'static str,
}

/// `?seq=N`, the reader's cursor. Absent means 0.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct CursorQuery {
    #[serde(default)]
    pub seq: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputResponse {
    pub output: String,
    pub seq: u64,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputRequest {
    pub data: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ResizeRequest {
    pub rows: u16,
    pub cols: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResizeResponse {
    pub status: &'static str,
    pub rows: u16,
    pub cols: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatusResponse {
    pub session_id: String,
    pub is_alive: bool,
    pub exit_code: Option<i32>,
    pub rows: u16,
    pub cols: u16,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl SessionStatusResponse {
    pub fn from_session(session: &PtySession) -> Self {
        let summary = session.summary();
        Self {
            session_id: summary.session_id,
            is_alive: summary.is_alive,
            exit_code: summary.exit_code,
            rows: summary.rows,
            cols: summary.cols,
            created_at: summary.created_at,
            last_activity: summary.last_activity,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_sessions: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PingResponse {
    pub status: &'static str,
    /// Unix seconds.
    pub time_of_last_update: i64,
}

/// One server-sent event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamEvent {
    pub output: String,
    pub seq: u64,
    pub exit_code: Option<i32>,
}

impl StreamEvent {
    /// `cursor` is used for the exit event, which carries no text of its own.
    pub fn from_output(event: OutputEvent, cursor: u64) -> Self {
        match event {
            OutputEvent::Output { data, seq } => Self {
                output: data,
                seq,
                exit_code: None,
            },
            OutputEvent::Exit { exit_code } => Self {
                output: String::new(),
                seq: cursor,
                exit_code: Some(exit_code),
            },
        }
    }
}

/// Frames a WebSocket client sends.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientFrame {
    Input { data: String },
    Resize { rows: u16, cols: u16 },
}

/// Frames the server sends over a WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerFrame {
    Output { data: String, seq: u64 },
    Error { message: String },
    Exit { exit_code: i32 },
}

impl From<OutputEvent> for ServerFrame {
    fn from(event: OutputEvent) -> Self {
        match event {
            OutputEvent::Output { data, seq } => ServerFrame::Output { data, seq },
            OutputEvent::Exit { exit_code } => ServerFrame::Exit { exit_code },
        }
    }
}
