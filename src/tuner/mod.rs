//! Demand-driven tuner
//!
//! The tuner runs the pipeline only while someone is listening. The first
//! attach launches it, the last detach tears it down, and every listener in
//! between reads the same chunks from one shared ring buffer.
//!
//! # Architecture
//!
//! ```text
//!                              Tuner (Arc<Shared>)
//!                     ┌──────────────────────────────────┐
//!                     │ listeners: AtomicUsize           │
//!                     │ lifecycle: Mutex<Option<Epoch>>  │
//!                     │ buffer: SharedBuffer             │
//!                     └────────┬─────────────────────────┘
//!                              │
//!      [ChunkSource] ──► Broadcaster epoch ──► buffer.append()
//!                                                  │ notify_waiters()
//!                   ┌──────────────────────────────┼──────────────┐
//!                   ▼                              ▼              ▼
//!            [ListenerSession]              [ListenerSession]    ...
//!            cursor.advance()               cursor.advance()
//! ```
//!
//! # Zero-Copy Design
//!
//! Chunks are `bytes::Bytes`. Every listener reading the same sequence number
//! shares one allocation.

mod broadcaster;
pub mod config;
pub mod lifecycle;
pub mod session;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{TunerConfig, DEFAULT_BITRATE};
pub use lifecycle::Tuner;
pub use session::ListenerSession;
pub use state::{TunerState, TunerStats};
