use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use tokio::sync::{mpsc, oneshot};

/// Maximum number of bytes pulled from the PTY master per read.
pub const READ_CHUNK_BYTES: usize = 4096;

/// Errors from PTY operations.
#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    #[error("PTY spawn failed: {0}")]
    SpawnFailed(String),
    #[error("PTY I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PTY resize failed: {0}")]
    ResizeFailed(String),
    #[error("PTY signal failed: {0}")]
    SignalFailed(String),
}

/// Result of a bounded wait on PTY output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Decoded text read from the terminal.
    Data(String),
    /// Nothing arrived within the timeout. Expected and frequent.
    Timeout,
    /// The terminal was closed: the child exited or the read failed.
    Eof,
}

/// Owns a portable-pty child process and the master side.
///
/// The blocking reader and writer are handed off with
/// [`PtyHandle::take_output`] and [`PtyHandle::take_input`], which move them
/// onto dedicated OS threads. Neither ever blocks while holding the handle.
pub struct PtyHandle {
    master: Box<dyn MasterPty + Send>,
    reader: Option<Box<dyn Read + Send>>,
    writer: Option<Box<dyn Write + Send>>,
    child: Box<dyn Child + Send + Sync>,
    pid: Option<u32>,
    exit_code: Option<i32>,
}

impl PtyHandle {
    /// Spawn `shell` on a fresh PTY with the given dimensions and working directory.
    ///
    /// `bash` and `zsh` start without user rc files; anything else is parsed as
    /// a command line. A blank `shell` falls back to `$SHELL` (or `/bin/sh`).
    pub fn spawn(shell: &str, rows: u16, cols: u16, cwd: &Path) -> Result<Self, PtyError> {
        if !cwd.is_dir() {
            return Err(PtyError::SpawnFailed(format!(
                "working directory {} does not exist",
                cwd.display()
            )));
        }

        let argv = shell_command(shell)?;
        let mut cmd = CommandBuilder::from_argv(argv.into_iter().map(OsString::from).collect());
        cmd.cwd(cwd);
        cmd.env("TERM", "xterm-256color");

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::SpawnFailed(format!("failed to open PTY: {e}")))?;

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::SpawnFailed(format!("failed to spawn {shell:?}: {e}")))?;
        // The master only reports EOF once every slave descriptor is closed.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::SpawnFailed(format!("failed to clone reader: {e}")))?;

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::SpawnFailed(format!("failed to take writer: {e}")))?;

        let pid = child.process_id();

        Ok(Self {
            master: pair.master,
            reader: Some(reader),
            writer: Some(writer),
            child,
            pid,
            exit_code: None,
        })
    }

    /// OS process id of the child, when the platform exposes one.
    pub fn process_id(&self) -> Option<u32> {
        self.pid
    }

    /// Move the blocking reader onto its own thread and return the receiving end.
    ///
    /// Can only be called once per handle.
    pub fn take_output(&mut self) -> Result<PtyOutput, PtyError> {
        let reader = self
            .reader
            .take()
            .ok_or_else(|| PtyError::SpawnFailed("PTY reader already taken".to_string()))?;
        let (tx, rx) = mpsc::unbounded_channel();
        let name = match self.pid {
            Some(pid) => format!("pty-reader-{pid}"),
            None => "pty-reader".to_string(),
        };
        std::thread::Builder::new()
            .name(name)
            .spawn(move || read_loop(reader, tx))?;
        Ok(PtyOutput { rx })
    }

    /// Move the blocking writer onto its own thread and return the sending end.
    ///
    /// A write into a full terminal input queue blocks that thread only.
    /// Can only be called once per handle.
    pub fn take_input(&mut self) -> Result<PtyInput, PtyError> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| PtyError::SpawnFailed("PTY writer already taken".to_string()))?;
        let (tx, rx) = mpsc::unbounded_channel();
        let name = match self.pid {
            Some(pid) => format!("pty-writer-{pid}"),
            None => "pty-writer".to_string(),
        };
        std::thread::Builder::new()
            .name(name)
            .spawn(move || write_loop(writer, rx))?;
        Ok(PtyInput { tx })
    }

    /// Resize the PTY to new dimensions. The kernel delivers `SIGWINCH` to the child.
    pub fn resize(&self, rows: u16, cols: u16) -> Result<(), PtyError> {
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::ResizeFailed(format!("{e}")))
    }

    /// Check if the child process is still alive.
    pub fn is_alive(&mut self) -> bool {
        self.try_wait().is_none()
    }

    /// Get the child process exit status if it has exited.
    ///
    /// Returns `None` if the process is still running. Once observed, the
    /// status is cached.
    pub fn try_wait(&mut self) -> Option<i32> {
        if self.exit_code.is_none() {
            if let Ok(Some(status)) = self.child.try_wait() {
                self.exit_code = Some(status.exit_code() as i32);
            }
        }
        self.exit_code
    }

    /// Ask the child to terminate.
    ///
    /// `force = false` hangs up the terminal (`SIGHUP` to the child's process
    /// group); `force = true` sends `SIGKILL`. A child that already exited is
    /// not signalled.
    pub fn terminate(&mut self, force: bool) -> Result<(), PtyError> {
        if !self.is_alive() {
            return Ok(());
        }

        #[cfg(unix)]
        if let Some(pid) = self.pid {
            let signal = if force { libc::SIGKILL } else { libc::SIGHUP };
            return signal_process_group(pid, signal);
        }

        self.child.kill().map_err(PtyError::Io)
    }
}

impl Drop for PtyHandle {
    fn drop(&mut self) {
        if let Err(e) = self.terminate(true) {
            log::debug!("failed to kill PTY child on drop: {e}");
        }
    }
}

/// Receiving end of a PTY reader thread.
pub struct PtyOutput {
    rx: mpsc::UnboundedReceiver<String>,
}

impl PtyOutput {
    /// Wait up to `timeout` for the next chunk of terminal output.
    pub async fn read_timeout(&mut self, timeout: Duration) -> ReadOutcome {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(text)) => ReadOutcome::Data(text),
            Ok(None) => ReadOutcome::Eof,
            Err(_) => ReadOutcome::Timeout,
        }
    }
}

struct WriteRequest {
    data: Vec<u8>,
    done: oneshot::Sender<Result<(), PtyError>>,
}

/// Sending end of a PTY writer thread. Writes are applied in call order.
#[derive(Clone)]
pub struct PtyInput {
    tx: mpsc::UnboundedSender<WriteRequest>,
}

impl PtyInput {
    /// Write bytes to the PTY master (user input -> shell) and wait until
    /// the kernel accepted all of them.
    ///
    /// Dropping the future does not cancel a write already handed to the
    /// writer thread.
    pub async fn write(&self, data: Vec<u8>) -> Result<(), PtyError> {
        let (done, result) = oneshot::channel();
        self.tx
            .send(WriteRequest { data, done })
            .map_err(|_| writer_gone())?;
        result.await.map_err(|_| writer_gone())?
    }
}

fn writer_gone() -> PtyError {
    PtyError::Io(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        "PTY writer thread has exited",
    ))
}

/// Resolve the argv used to launch `shell`.
pub fn shell_command(shell: &str) -> Result<Vec<String>, PtyError> {
    let argv = match shell.trim() {
        "" => vec![default_shell()],
        "bash" => vec!["bash".into(), "--norc".into(), "--noprofile".into()],
        "zsh" => vec!["zsh".into(), "--no-rcs".into()],
        other => shell_words::split(other)
            .map_err(|e| PtyError::SpawnFailed(format!("invalid shell command {other:?}: {e}")))?,
    };
    if argv.is_empty() {
        return Err(PtyError::SpawnFailed("empty shell command".to_string()));
    }
    Ok(argv)
}

/// Returns the user's default shell, falling back to `/bin/sh`.
fn default_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
}

fn read_loop(mut reader: Box<dyn Read + Send>, tx: mpsc::UnboundedSender<String>) {
    let mut buf = [0u8; READ_CHUNK_BYTES];
    let mut decoder = Utf8Decoder::default();

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            // EIO once the child side is gone.
            Err(_) => break,
        };

        let text = decoder.decode(&buf[..n]);
        if text.is_empty() {
            continue;
        }
        if tx.send(text).is_err() {
            return;
        }
    }

    let tail = decoder.finish();
    if !tail.is_empty() {
        let _ = tx.send(tail);
    }
}

fn write_loop(mut writer: Box<dyn Write + Send>, mut rx: mpsc::UnboundedReceiver<WriteRequest>) {
    while let Some(WriteRequest { data, done }) = rx.blocking_recv() {
        let result = writer
            .write_all(&data)
            .and_then(|()| writer.flush())
            .map_err(PtyError::Io);
        let failed = result.is_err();
        let _ = done.send(result);
        if failed {
            return;
        }
    }
}

#[cfg(unix)]
fn signal_process_group(pid: u32, signal: libc::c_int) -> Result<(), PtyError> {
    let pgid: libc::pid_t = pid
        .try_into()
        .map_err(|_| PtyError::SignalFailed(format!("pid {pid} out of range")))?;

    // SAFETY: portable-pty calls setsid() for the child, so -pgid addresses
    // exactly the session it leads.
    let rc = unsafe { libc::kill(-pgid, signal) };
    if rc == 0 {
        return Ok(());
    }

    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(PtyError::SignalFailed(format!("kill({pid}, {signal}): {err}")))
}

/// Incremental UTF-8 decoder that keeps an incomplete trailing sequence
/// until the next read completes it.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut out = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(err) => {
                    let (valid, tail) = rest.split_at(err.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &tail[len..];
                        }
                        None => {
                            rest = tail;
                            break;
                        }
                    }
                }
            }
        }

        let consumed = self.pending.len() - rest.len();
        self.pending.drain(..consumed);
        out
    }

    fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}
