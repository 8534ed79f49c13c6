//! termhub-pty: remote-multiplexed terminal sessions.
//!
//! This crate owns shell processes running on pseudo-terminals, keeps their
//! output in bounded per-session buffers, and hands it to any number of
//! readers through sequence-number cursors. It knows nothing about HTTP;
//! transports live in `termhub-server`.
//!
//! # Architecture
//!
//! - [`PtyHandle`]: low-level PTY process management (spawn, reader and writer threads, resize, signal).
//! - [`OutputBuffer`]: bounded, sequence-numbered chunk store.
//! - [`PtySession`]: a `PtyHandle` plus its pump loop and output buffer.
//! - [`SessionRegistry`]: owns all sessions, enforces per-caller limits, reaps idle ones.
//! - [`OutputSubscriber`]: ordered output/exit event stream for streaming transports.

pub mod buffer;
pub mod error;
pub mod pty;
pub mod registry;
pub mod session;
pub mod subscriber;

pub use buffer::OutputBuffer;
pub use error::SessionError;
pub use pty::{PtyError, PtyHandle, PtyInput};
pub use registry::{RegistryConfig, SessionRegistry};
pub use session::{PtySession, SessionId, SessionOptions, SessionState, SessionSummary};
pub use subscriber::{OutputEvent, OutputSubscriber};
