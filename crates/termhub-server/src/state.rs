//! State shared by every request handler.

use std::sync::Arc;
use std::time::Duration;

use termhub_pty::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    /// Cadence of the SSE and WebSocket output loops.
    pub stream_interval: Duration,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>, stream_interval: Duration) -> Self {
        Self {
            registry,
            stream_interval,
        }
    }
}
