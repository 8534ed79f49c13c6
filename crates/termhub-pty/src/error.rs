use crate::pty::PtyError;
use crate::session::SessionId;

/// Errors reported to callers of the session and registry APIs.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The PTY or the child process could not be created.
    #[error("failed to spawn terminal: {0}")]
    Spawn(#[source] PtyError),

    #[error("session {0} not found")]
    NotFound(SessionId),

    /// Input or resize against a session that is no longer running.
    #[error("session {0} is not alive")]
    NotAlive(SessionId),

    #[error("caller {caller} already owns {limit} sessions")]
    ResourceLimitExceeded { caller: String, limit: usize },

    #[error("invalid terminal size {rows}x{cols}")]
    InvalidDimensions { rows: u16, cols: u16 },

    /// The OS call behind a write or resize failed.
    #[error("session {id}: {source}")]
    Pty {
        id: SessionId,
        #[source]
        source: PtyError,
    },
}
