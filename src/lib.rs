//! Live FM radio relay
//!
//! Tunes a software-defined radio on demand, encodes the demodulated audio
//! into an MPEG transport stream, and fans the stream out to any number of
//! HTTP listeners.
//!
//! # Example
//!
//! ```no_run
//! use fm_relay::{Frequency, PipelineConfig, RadioServer, ServerConfig, Tuner, TunerConfig};
//!
//! #[tokio::main]
//! async fn main() -> fm_relay::Result<()> {
//!     let frequency: Frequency = "99000".parse()?;
//!     let tuner = Tuner::with_pipeline(TunerConfig::new(frequency), PipelineConfig::default())?;
//!     let server = RadioServer::new(ServerConfig::default(), tuner);
//!     server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await
//! }
//! ```
//!
//! Nothing runs until the first listener connects. When the last one leaves,
//! the radio pipeline is stopped.

pub mod buffer;
pub mod error;
pub mod pipeline;
pub mod server;
pub mod stats;
pub mod tuner;

pub use buffer::{Chunk, RingBuffer, SharedBuffer, UnderrunPolicy};
pub use error::{Error, Result};
pub use pipeline::{Frequency, PipelineConfig, PipelineLauncher, ProcessLauncher};
pub use server::{RadioServer, ServerConfig};
pub use tuner::{ListenerSession, Tuner, TunerConfig, TunerState, TunerStats};
