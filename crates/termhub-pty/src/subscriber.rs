//! Cursor-following reader shared by the streaming transports.
//!
//! An [`OutputSubscriber`] turns a session's buffer into an ordered stream of
//! [`OutputEvent`]s: output chunks in sequence order, then exactly one exit
//! event. Transports only decide how an event is put on the wire.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{Interval, MissedTickBehavior};

use crate::session::PtySession;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputEvent {
    /// Text appended since the previous event; `seq` is the cursor after it.
    Output { data: String, seq: u64 },
    /// The process is gone and all of its output has been delivered.
    Exit { exit_code: i32 },
}

pub struct OutputSubscriber {
    session: Arc<PtySession>,
    cursor: u64,
    interval: Interval,
    finished: bool,
}

impl OutputSubscriber {
    /// Follow `session` starting at `cursor`, checking for new output every
    /// `interval`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(session: Arc<PtySession>, cursor: u64, interval: Duration) -> Self {
        let mut interval = tokio::time::interval(interval.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            session,
            cursor,
            interval,
            finished: false,
        }
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Wait for the next event. Returns `None` once the exit event has been
    /// handed out.
    ///
    /// Cancel-safe: the cursor only moves when an event is returned.
    pub async fn next(&mut self) -> Option<OutputEvent> {
        if self.finished {
            return None;
        }

        loop {
            self.interval.tick().await;

            // Snapshot before reading: output appended before the exit was
            // recorded is always picked up by this read or an earlier one.
            let exit_code = self.session.exit_code();
            let (data, seq) = self.session.read_since(self.cursor);
            self.cursor = seq;

            if !data.is_empty() {
                return Some(OutputEvent::Output { data, seq });
            }
            if let Some(exit_code) = exit_code {
                self.finished = true;
                return Some(OutputEvent::Exit { exit_code });
            }
        }
    }
}
