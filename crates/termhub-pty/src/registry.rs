use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::buffer::DEFAULT_MAX_OUTPUT_CHUNKS;
use crate::error::SessionError;
use crate::session::{
    lock, PtySession, SessionId, SessionOptions, SessionSummary, DEFAULT_READ_TIMEOUT,
};

/// Shortest reaper period accepted; `tokio::time::interval` rejects zero.
const MIN_REAP_INTERVAL: Duration = Duration::from_millis(10);

/// Limits and timings applied to every session of a registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Inactivity after which a session is reaped.
    pub session_timeout: Duration,
    pub max_sessions_per_caller: usize,
    pub max_output_chunks: usize,
    /// Timeout of a single pump-loop read.
    pub read_timeout: Duration,
    /// How often the idle reaper runs.
    pub reap_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(30 * 60),
            max_sessions_per_caller: 20,
            max_output_chunks: DEFAULT_MAX_OUTPUT_CHUNKS,
            read_timeout: DEFAULT_READ_TIMEOUT,
            reap_interval: Duration::from_secs(60),
        }
    }
}

/// Session map plus the caller -> sessions index. Both change together
/// under one lock.
#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<SessionId, Arc<PtySession>>,
    callers: HashMap<String, HashSet<SessionId>>,
}

impl RegistryInner {
    fn caller_count(&self, caller: &str) -> usize {
        self.callers.get(caller).map_or(0, HashSet::len)
    }

    fn insert(&mut self, session: Arc<PtySession>) {
        let id = session.id().to_string();
        if let Some(caller) = session.caller() {
            self.callers
                .entry(caller.to_string())
                .or_default()
                .insert(id.clone());
        }
        self.sessions.insert(id, session);
    }

    fn remove(&mut self, id: &str) -> Option<Arc<PtySession>> {
        let session = self.sessions.remove(id)?;
        if let Some(caller) = session.caller() {
            if let Some(owned) = self.callers.get_mut(caller) {
                owned.remove(id);
                if owned.is_empty() {
                    self.callers.remove(caller);
                }
            }
        }
        Some(session)
    }

    fn drain(&mut self) -> Vec<Arc<PtySession>> {
        self.callers.clear();
        self.sessions.drain().map(|(_, session)| session).collect()
    }
}

/// A caller's claim on one session slot while its shell is being spawned.
/// Released on drop.
struct SlotReservation<'a> {
    pending: &'a Mutex<HashMap<String, usize>>,
    caller: String,
}

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        let mut pending = lock(self.pending);
        if let Some(count) = pending.get_mut(&self.caller) {
            *count -= 1;
            if *count == 0 {
                pending.remove(&self.caller);
            }
        }
    }
}

struct Reaper {
    stop_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

/// Owns every live [`PtySession`], enforces per-caller limits and reaps idle
/// sessions in the background.
///
/// Construct one per process and share it behind an `Arc`.
pub struct SessionRegistry {
    config: RegistryConfig,
    inner: RwLock<RegistryInner>,
    /// Slots claimed by creates whose spawn is still in progress.
    pending: Mutex<HashMap<String, usize>>,
    reaper: Mutex<Option<Reaper>>,
}

impl SessionRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(RegistryInner::default()),
            pending: Mutex::new(HashMap::new()),
            reaper: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Spawn a new session and index it.
    ///
    /// When `caller` already owns `max_sessions_per_caller` sessions nothing
    /// is spawned and `ResourceLimitExceeded` is returned. Spawns in flight
    /// count against the limit, but the shell is started without holding the
    /// registry lock.
    pub async fn create(
        &self,
        rows: u16,
        cols: u16,
        cwd: Option<String>,
        shell: impl Into<String>,
        caller: Option<String>,
    ) -> Result<Arc<PtySession>, SessionError> {
        let reservation = match caller.as_deref() {
            Some(caller) => Some(self.reserve_slot(caller).await?),
            None => None,
        };

        let session = PtySession::spawn(SessionOptions {
            rows,
            cols,
            cwd,
            shell: shell.into(),
            caller,
            max_output_chunks: self.config.max_output_chunks,
            read_timeout: self.config.read_timeout,
        })?;

        let mut inner = self.inner.write().await;
        inner.insert(Arc::clone(&session));
        drop(reservation);

        Ok(session)
    }

    async fn reserve_slot(&self, caller: &str) -> Result<SlotReservation<'_>, SessionError> {
        let inner = self.inner.read().await;
        let mut pending = lock(&self.pending);

        let limit = self.config.max_sessions_per_caller;
        let in_flight = pending.get(caller).copied().unwrap_or(0);
        if inner.caller_count(caller) + in_flight >= limit {
            log::warn!("caller {caller} hit the session limit ({limit})");
            return Err(SessionError::ResourceLimitExceeded {
                caller: caller.to_string(),
                limit,
            });
        }

        *pending.entry(caller.to_string()).or_default() += 1;
        Ok(SlotReservation {
            pending: &self.pending,
            caller: caller.to_string(),
        })
    }

    pub async fn get(&self, id: &str) -> Result<Arc<PtySession>, SessionError> {
        self.inner
            .read()
            .await
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Remove a session and tear it down.
    ///
    /// Returns `false` if the id is unknown, e.g. because the reaper got there
    /// first.
    pub async fn close(&self, id: &str) -> bool {
        let session = self.inner.write().await.remove(id);
        match session {
            Some(session) => {
                let code = session.close().await;
                log::info!("session {id}: closed (exit code {code})");
                true
            }
            None => false,
        }
    }

    /// Summaries of all sessions, or only those owned by `caller`, oldest first.
    pub async fn list(&self, caller: Option<&str>) -> Vec<SessionSummary> {
        let inner = self.inner.read().await;
        let mut summaries: Vec<SessionSummary> = match caller {
            Some(caller) => inner
                .callers
                .get(caller)
                .into_iter()
                .flatten()
                .filter_map(|id| inner.sessions.get(id))
                .map(|session| session.summary())
                .collect(),
            None => inner.sessions.values().map(|s| s.summary()).collect(),
        };
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        summaries
    }

    pub async fn session_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    /// Close every session that has been idle longer than the timeout or
    /// whose process is gone. Returns how many were reaped.
    ///
    /// Teardowns run concurrently; one failing does not stop the others.
    pub async fn reap_idle(&self) -> usize {
        let now = Utc::now();
        let timeout = self.config.session_timeout;

        let expired: Vec<Arc<PtySession>> = {
            let mut inner = self.inner.write().await;
            let ids: Vec<SessionId> = inner
                .sessions
                .values()
                .filter(|session| {
                    let idle = now
                        .signed_duration_since(session.last_activity())
                        .to_std()
                        .unwrap_or_default();
                    idle >= timeout || !session.is_alive()
                })
                .map(|session| session.id().to_string())
                .collect();
            ids.iter().filter_map(|id| inner.remove(id)).collect()
        };

        if expired.is_empty() {
            return 0;
        }

        let mut teardowns = JoinSet::new();
        for session in expired {
            teardowns.spawn(async move {
                let code = session.close().await;
                (session.id().to_string(), code)
            });
        }

        let mut reaped = 0;
        while let Some(result) = teardowns.join_next().await {
            match result {
                Ok((id, code)) => {
                    reaped += 1;
                    log::info!("session {id}: reaped (exit code {code})");
                }
                Err(e) => log::warn!("session teardown failed during reaping: {e}"),
            }
        }
        reaped
    }

    /// Start the background idle reaper. Calling it twice has no effect.
    pub fn start(self: &Arc<Self>) {
        let mut reaper = lock(&self.reaper);
        if reaper.is_some() {
            return;
        }

        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
        let registry = Arc::downgrade(self);
        let period = self.config.reap_interval.max(MIN_REAP_INTERVAL);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = stop_rx.recv() => return,
                }

                let Some(registry) = registry.upgrade() else {
                    return;
                };
                registry.reap_idle().await;
            }
        });

        log::info!("idle reaper started (every {period:?})");
        *reaper = Some(Reaper { stop_tx, task });
    }

    /// Stop the reaper and close every remaining session.
    pub async fn stop(&self) {
        let reaper = lock(&self.reaper).take();
        if let Some(Reaper { stop_tx, task }) = reaper {
            let _ = stop_tx.send(()).await;
            if let Err(e) = task.await {
                log::warn!("idle reaper ended abnormally: {e}");
            }
        }

        let sessions = self.inner.write().await.drain();
        let count = sessions.len();

        let mut teardowns = JoinSet::new();
        for session in sessions {
            teardowns.spawn(async move { session.close().await });
        }
        while let Some(result) = teardowns.join_next().await {
            if let Err(e) = result {
                log::warn!("session teardown failed during shutdown: {e}");
            }
        }

        log::info!("registry stopped, closed {count} session(s)");
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}
