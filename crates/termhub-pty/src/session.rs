use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use uuid::Uuid;

use crate::buffer::{OutputBuffer, DEFAULT_MAX_OUTPUT_CHUNKS};
use crate::error::SessionError;
use crate::pty::{PtyError, PtyHandle, PtyInput, PtyOutput, ReadOutcome};

/// Unique identifier for a terminal session.
pub type SessionId = String;

/// Exit code recorded when the real status could not be obtained.
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// Default timeout of a single pump-loop read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Liveness checks after the hang-up signal before escalating to a kill.
const GRACEFUL_POLLS: u32 = 10;
const GRACEFUL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long to wait for the exit status once the terminal reported EOF.
const EXIT_STATUS_POLLS: u32 = 40;
const EXIT_STATUS_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Lower bound on a pump-loop read.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Upper bound on waiting for the pump task to acknowledge a stop.
const PUMP_STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle of a session. Both non-running states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    /// The process ended on its own.
    Exited(i32),
    /// The session was closed while running; the code is best effort.
    Terminated(i32),
}

impl SessionState {
    pub fn is_running(&self) -> bool {
        matches!(self, SessionState::Running)
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            SessionState::Running => None,
            SessionState::Exited(code) | SessionState::Terminated(code) => Some(*code),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Running => "running",
            SessionState::Exited(_) => "exited",
            SessionState::Terminated(_) => "terminated",
        }
    }
}

/// Parameters for spawning a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub rows: u16,
    pub cols: u16,
    /// Working directory; the server's current directory when `None`.
    pub cwd: Option<String>,
    pub shell: String,
    /// Opaque identity of the creator, used for per-caller accounting.
    pub caller: Option<String>,
    pub max_output_chunks: usize,
    pub read_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            rows: 24,
            cols: 80,
            cwd: None,
            shell: "bash".to_string(),
            caller: None,
            max_output_chunks: DEFAULT_MAX_OUTPUT_CHUNKS,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Point-in-time description of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub caller: Option<String>,
    pub rows: u16,
    pub cols: u16,
    pub cwd: String,
    pub shell: String,
    pub status: &'static str,
    pub is_alive: bool,
    pub exit_code: Option<i32>,
    pub output_seq: u64,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// State shared between the session and its pump loop.
struct SessionCore {
    buffer: OutputBuffer,
    rows: u16,
    cols: u16,
    last_activity: DateTime<Utc>,
    state: SessionState,
}

impl SessionCore {
    /// Move out of `Running`. Returns `false` if the state was already final,
    /// which keeps the exit code write-once.
    fn finish(&mut self, state: SessionState) -> bool {
        if !self.state.is_running() {
            return false;
        }
        self.state = state;
        true
    }
}

struct Pump {
    stop_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

/// A shell running on a PTY, with its output pumped into a bounded buffer.
///
/// The pump task is the only writer of the buffer and sequence counter.
/// Readers go through [`PtySession::read_since`] with their own cursor.
///
/// Input goes through its own writer thread. The PTY handle lock is only
/// taken for short calls (status, resize, signals).
pub struct PtySession {
    id: SessionId,
    caller: Option<String>,
    shell: String,
    cwd: String,
    created_at: DateTime<Utc>,
    core: Arc<Mutex<SessionCore>>,
    pty: Arc<Mutex<PtyHandle>>,
    input: PtyInput,
    /// Flipped to `true` once the session stops accepting input.
    ended: Arc<watch::Sender<bool>>,
    pump: Mutex<Option<Pump>>,
    closed: AtomicBool,
}

impl PtySession {
    /// Spawn the shell and start the pump loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(options: SessionOptions) -> Result<Arc<Self>, SessionError> {
        let SessionOptions {
            rows,
            cols,
            cwd,
            shell,
            caller,
            max_output_chunks,
            read_timeout,
        } = options;

        if rows == 0 || cols == 0 {
            return Err(SessionError::InvalidDimensions { rows, cols });
        }

        let cwd = match cwd {
            Some(dir) => PathBuf::from(dir),
            None => std::env::current_dir().map_err(|e| SessionError::Spawn(PtyError::Io(e)))?,
        };

        let mut pty = PtyHandle::spawn(&shell, rows, cols, &cwd).map_err(SessionError::Spawn)?;
        let output = pty.take_output().map_err(SessionError::Spawn)?;
        let input = pty.take_input().map_err(SessionError::Spawn)?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let core = Arc::new(Mutex::new(SessionCore {
            buffer: OutputBuffer::new(max_output_chunks),
            rows,
            cols,
            last_activity: now,
            state: SessionState::Running,
        }));
        let pty = Arc::new(Mutex::new(pty));
        let ended = Arc::new(watch::Sender::new(false));

        let (stop_tx, stop_rx) = mpsc::channel(1);
        let task = tokio::spawn(pump_loop(
            id.clone(),
            output,
            Arc::clone(&core),
            Arc::clone(&pty),
            Arc::clone(&ended),
            stop_rx,
            read_timeout.max(MIN_READ_TIMEOUT),
        ));

        log::info!(
            "session {id}: spawned {shell:?} ({rows}x{cols}) in {}",
            cwd.display()
        );

        Ok(Arc::new(Self {
            id,
            caller,
            shell,
            cwd: cwd.display().to_string(),
            created_at: now,
            core,
            pty,
            input,
            ended,
            pump: Mutex::new(Some(Pump { stop_tx, task })),
            closed: AtomicBool::new(false),
        }))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn caller(&self) -> Option<&str> {
        self.caller.as_deref()
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        lock(&self.core).last_activity
    }

    /// Current `(rows, cols)`.
    pub fn dimensions(&self) -> (u16, u16) {
        let core = lock(&self.core);
        (core.rows, core.cols)
    }

    pub fn state(&self) -> SessionState {
        lock(&self.core).state
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.state().exit_code()
    }

    pub fn output_seq(&self) -> u64 {
        lock(&self.core).buffer.seq()
    }

    /// Whether the session still accepts input and resizes.
    pub fn is_alive(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.state().is_running()
    }

    /// Whether the child process itself is still running.
    pub fn process_alive(&self) -> bool {
        lock(&self.pty).is_alive()
    }

    /// Everything appended since `cursor`, plus the cursor to use next time.
    ///
    /// A cursor older than the oldest retained chunk is clamped forward.
    pub fn read_since(&self, cursor: u64) -> (String, u64) {
        lock(&self.core).buffer.read_since(cursor)
    }

    /// Forward input to the shell.
    ///
    /// Waits until the terminal accepted all of `data`. A write still pending
    /// when the session closes or the process exits fails with `NotAlive`.
    pub async fn write_input(&self, data: &str) -> Result<(), SessionError> {
        let mut ended = self.ended.subscribe();
        self.ensure_running()?;

        tokio::select! {
            result = self.input.write(data.as_bytes().to_vec()) => {
                result.map_err(|source| SessionError::Pty {
                    id: self.id.clone(),
                    source,
                })?;
            }
            _ = ended.wait_for(|ended| *ended) => {
                log::debug!("session {}: dropped pending input on close", self.id);
                return Err(SessionError::NotAlive(self.id.clone()));
            }
        }

        lock(&self.core).last_activity = Utc::now();
        Ok(())
    }

    /// Resize the terminal window.
    pub async fn resize(&self, rows: u16, cols: u16) -> Result<(), SessionError> {
        if rows == 0 || cols == 0 {
            return Err(SessionError::InvalidDimensions { rows, cols });
        }
        self.ensure_running()?;

        let pty = Arc::clone(&self.pty);
        let result = tokio::task::spawn_blocking(move || lock(&pty).resize(rows, cols)).await;
        self.blocking_result(result)?;

        let mut core = lock(&self.core);
        core.rows = rows;
        core.cols = cols;
        core.last_activity = Utc::now();
        Ok(())
    }

    /// Stop the pump, terminate the process (hang-up first, kill after about
    /// a second), and return the final exit code.
    ///
    /// Idempotent: later calls return immediately with whatever code has
    /// been recorded.
    pub async fn close(&self) -> i32 {
        if self.closed.swap(true, Ordering::AcqRel) {
            return self.exit_code().unwrap_or(UNKNOWN_EXIT_CODE);
        }
        self.ended.send_replace(true);

        let pump = lock(&self.pump).take();
        if let Some(Pump { stop_tx, mut task }) = pump {
            let _ = stop_tx.try_send(());
            match tokio::time::timeout(PUMP_STOP_TIMEOUT, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("session {}: pump task failed: {e}", self.id),
                Err(_) => {
                    log::warn!("session {}: pump did not stop in time, aborting", self.id);
                    task.abort();
                }
            }
        }

        let code = self.terminate_process().await;

        let mut core = lock(&self.core);
        if core.finish(SessionState::Terminated(code)) {
            log::info!("session {}: terminated (exit code {code})", self.id);
        }
        core.state.exit_code().unwrap_or(code)
    }

    pub fn summary(&self) -> SessionSummary {
        let core = lock(&self.core);
        SessionSummary {
            session_id: self.id.clone(),
            caller: self.caller.clone(),
            rows: core.rows,
            cols: core.cols,
            cwd: self.cwd.clone(),
            shell: self.shell.clone(),
            status: core.state.as_str(),
            is_alive: core.state.is_running() && !self.closed.load(Ordering::Acquire),
            exit_code: core.state.exit_code(),
            output_seq: core.buffer.seq(),
            created_at: self.created_at,
            last_activity: core.last_activity,
        }
    }

    fn ensure_running(&self) -> Result<(), SessionError> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(SessionError::NotAlive(self.id.clone()))
        }
    }

    fn blocking_result(
        &self,
        result: Result<Result<(), PtyError>, JoinError>,
    ) -> Result<(), SessionError> {
        result
            .map_err(|e| PtyError::Io(std::io::Error::other(e)))
            .and_then(|inner| inner)
            .map_err(|source| SessionError::Pty {
                id: self.id.clone(),
                source,
            })
    }

    async fn terminate_process(&self) -> i32 {
        if let Err(e) = lock(&self.pty).terminate(false) {
            log::warn!("session {}: hang-up failed: {e}", self.id);
        }

        for _ in 0..GRACEFUL_POLLS {
            let alive = lock(&self.pty).is_alive();
            if !alive {
                break;
            }
            tokio::time::sleep(GRACEFUL_POLL_INTERVAL).await;
        }

        let still_alive = lock(&self.pty).is_alive();
        if still_alive {
            log::warn!("session {}: process ignored hang-up, killing", self.id);
            if let Err(e) = lock(&self.pty).terminate(true) {
                log::warn!("session {}: kill failed: {e}", self.id);
            }
        }

        wait_for_exit(&self.pty).await
    }
}

impl Drop for PtySession {
    /// A session dropped without `close` still takes its process down: the
    /// aborted pump releases its handle reference and the handle kills on drop.
    fn drop(&mut self) {
        if let Some(Pump { task, .. }) = lock(&self.pump).take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for PtySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtySession")
            .field("id", &self.id)
            .field("shell", &self.shell)
            .field("state", &self.state())
            .finish()
    }
}

/// Move terminal output into the session buffer until the process ends or
/// a stop is requested.
async fn pump_loop(
    id: SessionId,
    mut output: PtyOutput,
    core: Arc<Mutex<SessionCore>>,
    pty: Arc<Mutex<PtyHandle>>,
    ended: Arc<watch::Sender<bool>>,
    mut stop_rx: mpsc::Receiver<()>,
    read_timeout: Duration,
) {
    log::debug!("session {id}: pump started");

    loop {
        let outcome = tokio::select! {
            outcome = output.read_timeout(read_timeout) => outcome,
            _ = stop_rx.recv() => {
                log::debug!("session {id}: pump stopped");
                return;
            }
        };

        match outcome {
            ReadOutcome::Data(text) => append(&id, &core, text),
            ReadOutcome::Timeout => {
                // A background job can keep the terminal open after the
                // shell itself is gone.
                let exited = lock(&pty).try_wait().is_some();
                if exited {
                    drain(&id, &mut output, &core, read_timeout).await;
                    break;
                }
            }
            ReadOutcome::Eof => break,
        }
    }

    let code = wait_for_exit(&pty).await;
    if lock(&core).finish(SessionState::Exited(code)) {
        log::info!("session {id}: process exited with code {code}");
    }
    ended.send_replace(true);
}

fn append(id: &str, core: &Mutex<SessionCore>, text: String) {
    let len = text.len();
    let mut core = lock(core);
    let seq = core.buffer.push(text);
    core.last_activity = Utc::now();
    log::trace!("session {id}: appended {len} bytes as seq {seq}");
}

async fn drain(id: &str, output: &mut PtyOutput, core: &Mutex<SessionCore>, timeout: Duration) {
    while let ReadOutcome::Data(text) = output.read_timeout(timeout).await {
        append(id, core, text);
    }
}

async fn wait_for_exit(pty: &Mutex<PtyHandle>) -> i32 {
    for _ in 0..EXIT_STATUS_POLLS {
        let status = lock(pty).try_wait();
        if let Some(code) = status {
            return code;
        }
        tokio::time::sleep(EXIT_STATUS_POLL_INTERVAL).await;
    }
    UNKNOWN_EXIT_CODE
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh_options() -> SessionOptions {
        SessionOptions {
            shell: "/bin/sh".to_string(),
            cwd: Some(std::env::temp_dir().display().to_string()),
            ..SessionOptions::default()
        }
    }

    async fn wait_for_output(session: &PtySession, needle: &str) -> String {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let (text, _) = session.read_since(0);
            if text.contains(needle) || Instant::now() > deadline {
                return text;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    async fn wait_for_exit_code(session: &PtySession) -> Option<i32> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(code) = session.exit_code() {
                return Some(code);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        None
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_session() {
        let session = PtySession::spawn(sh_options());
        assert!(session.is_ok(), "Failed to create session: {:?}", session.err());
        let session = session.unwrap();

        assert!(!session.id().is_empty());
        assert!(session.is_alive());
        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.exit_code(), None);
        assert_eq!(session.dimensions(), (24, 80));

        session.close().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_session_ids_are_unique() {
        let a = PtySession::spawn(sh_options()).unwrap();
        let b = PtySession::spawn(sh_options()).unwrap();
        assert_ne!(a.id(), b.id());
        a.close().await;
        b.close().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rejects_zero_dimensions() {
        let result = PtySession::spawn(SessionOptions {
            rows: 0,
            ..sh_options()
        });
        assert!(matches!(
            result,
            Err(SessionError::InvalidDimensions { rows: 0, cols: 80 })
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_spawn_failure_is_reported() {
        let result = PtySession::spawn(SessionOptions {
            shell: "definitely-not-a-real-shell-xyz".to_string(),
            ..sh_options()
        });
        assert!(matches!(result, Err(SessionError::Spawn(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_session_write_and_read() {
        let session = PtySession::spawn(sh_options()).unwrap();

        session.write_input("echo SESS_TEST\n").await.unwrap();
        let text = wait_for_output(&session, "SESS_TEST\r\n").await;
        assert!(text.contains("SESS_TEST"), "got: {text}");

        let seq = session.output_seq();
        assert!(seq > 0);

        session.close().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_read_since_is_idempotent_and_advances() {
        let session = PtySession::spawn(sh_options()).unwrap();
        session.write_input("echo ONE\n").await.unwrap();
        wait_for_output(&session, "ONE\r\n").await;

        // Let the prompt settle so no new chunk lands between the reads.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let first = session.read_since(0);
        let second = session.read_since(0);
        assert_eq!(first, second);

        let (rest, seq) = session.read_since(first.1);
        assert!(rest.is_empty());
        assert_eq!(seq, first.1);

        session.close().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stale_cursor_is_clamped_after_eviction() {
        let session = PtySession::spawn(SessionOptions {
            max_output_chunks: 2,
            ..sh_options()
        })
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut i = 0;
        while session.output_seq() <= 2 && Instant::now() < deadline {
            session.write_input(&format!("echo LINE{i}\n")).await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            i += 1;
        }
        tokio::time::sleep(Duration::from_millis(300)).await;

        let seq = session.output_seq();
        assert!(seq > 2, "expected evictions, seq = {seq}");

        // Chunks before seq - 2 are gone; reading from 0 starts at the oldest kept.
        let from_zero = session.read_since(0);
        let from_earliest = session.read_since(seq - 2);
        assert_eq!(from_zero, from_earliest);
        assert_eq!(from_zero.1, seq);

        session.close().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_session_resize() {
        let session = PtySession::spawn(sh_options()).unwrap();

        let result = session.resize(40, 120).await;
        assert!(result.is_ok(), "Resize failed: {:?}", result.err());
        assert_eq!(session.dimensions(), (40, 120));

        assert!(matches!(
            session.resize(0, 10).await,
            Err(SessionError::InvalidDimensions { .. })
        ));

        session.close().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_activity_is_tracked() {
        let session = PtySession::spawn(sh_options()).unwrap();
        let before = session.last_activity();
        tokio::time::sleep(Duration::from_millis(20)).await;
        session.resize(30, 100).await.unwrap();
        assert!(session.last_activity() > before);
        session.close().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_session_exit() {
        let session = PtySession::spawn(sh_options()).unwrap();

        session.write_input("exit 7\n").await.unwrap();

        assert_eq!(wait_for_exit_code(&session).await, Some(7));
        assert_eq!(session.state(), SessionState::Exited(7));
        assert!(!session.is_alive());

        // Exit code is write-once: closing afterwards keeps it.
        assert_eq!(session.close().await, 7);
        assert_eq!(session.state(), SessionState::Exited(7));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_input_after_exit_is_not_alive() {
        let session = PtySession::spawn(sh_options()).unwrap();
        session.write_input("exit 0\n").await.unwrap();
        wait_for_exit_code(&session).await;

        assert!(matches!(
            session.write_input("echo nope\n").await,
            Err(SessionError::NotAlive(_))
        ));
        assert!(matches!(
            session.resize(30, 90).await,
            Err(SessionError::NotAlive(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_close_terminates_and_is_idempotent() {
        let session = PtySession::spawn(sh_options()).unwrap();

        let code = session.close().await;
        assert!(matches!(session.state(), SessionState::Terminated(_)));
        assert_eq!(session.exit_code(), Some(code));
        assert!(!session.is_alive());
        assert!(!session.process_alive());

        assert_eq!(session.close().await, code);
        assert!(matches!(
            session.write_input("x").await,
            Err(SessionError::NotAlive(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_close_kills_process_ignoring_hangup() {
        let session = PtySession::spawn(SessionOptions {
            shell: "sh -c 'trap \"\" HUP; while true; do sleep 1; done'".to_string(),
            ..sh_options()
        })
        .unwrap();

        let started = Instant::now();
        session.close().await;
        assert!(!session.process_alive());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_close_during_blocked_write() {
        // `sleep` never reads its terminal, so a large write can never finish.
        let session = PtySession::spawn(SessionOptions {
            shell: "sleep 60".to_string(),
            ..sh_options()
        })
        .unwrap();

        let writer = Arc::clone(&session);
        let pending =
            tokio::spawn(async move { writer.write_input(&"a\n".repeat(512 * 1024)).await });
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!pending.is_finished());

        // Status, resize and summary don't wait behind the write.
        assert!(session.process_alive());
        session.resize(30, 100).await.unwrap();
        assert_eq!(session.summary().status, "running");

        let code = tokio::time::timeout(Duration::from_secs(5), session.close())
            .await
            .expect("close blocked behind a pending write");
        assert_eq!(session.state(), SessionState::Terminated(code));
        assert!(!session.process_alive());

        let result = tokio::time::timeout(Duration::from_secs(5), pending)
            .await
            .expect("pending write never returned")
            .unwrap();
        assert!(result.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dropped_session_releases_process() {
        let session = PtySession::spawn(SessionOptions {
            shell: "sleep 60".to_string(),
            ..sh_options()
        })
        .unwrap();
        let pty = Arc::clone(&session.pty);
        assert!(lock(&pty).is_alive());

        drop(session);

        // Once the pump lets go, dropping the last reference kills the child.
        let deadline = Instant::now() + Duration::from_secs(5);
        while Arc::strong_count(&pty) > 1 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(Arc::strong_count(&pty), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_zero_read_timeout_is_clamped() {
        let session = PtySession::spawn(SessionOptions {
            read_timeout: Duration::ZERO,
            ..sh_options()
        })
        .unwrap();

        session.write_input("echo CLAMP''ED\n").await.unwrap();
        let text = wait_for_output(&session, "CLAMPED\r\n").await;
        assert!(text.contains("CLAMPED\r\n"), "got: {text}");

        session.close().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_summary_fields() {
        let session = PtySession::spawn(SessionOptions {
            caller: Some("alice".to_string()),
            rows: 30,
            cols: 100,
            ..sh_options()
        })
        .unwrap();

        let summary = session.summary();
        assert_eq!(summary.session_id, session.id());
        assert_eq!(summary.caller.as_deref(), Some("alice"));
        assert_eq!((summary.rows, summary.cols), (30, 100));
        assert_eq!(summary.shell, "/bin/sh");
        assert_eq!(summary.status, "running");
        assert!(summary.is_alive);
        assert_eq!(summary.exit_code, None);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["status"], "running");
        assert!(json["created_at"].is_string());

        session.close().await;
    }
}
