//! Launcher traits
//!
//! The tuner talks to the producer through these two traits so the lifecycle
//! logic does not depend on real processes.

use std::future::Future;

use bytes::Bytes;

use crate::error::Result;

use super::config::TuneParams;

/// A running producer that yields encoded chunks
pub trait ChunkSource: Send + 'static {
    /// Read the next chunk
    ///
    /// `Ok(None)` means the producer closed its output cleanly. An `Err` is a
    /// pipeline failure.
    fn read_chunk(&mut self) -> impl Future<Output = Result<Option<Bytes>>> + Send;

    /// Stop the producer and wait for it to exit
    ///
    /// Calling this on an already stopped producer is a no-op.
    fn terminate(&mut self) -> impl Future<Output = ()> + Send;
}

/// Starts producers
pub trait PipelineLauncher: Send + Sync + 'static {
    /// Producer type created by this launcher
    type Source: ChunkSource;

    /// Start a producer tuned with `params`
    ///
    /// Fails with [`Error::Launch`](crate::error::Error::Launch) when a stage
    /// cannot be started.
    fn launch(&self, params: &TuneParams) -> impl Future<Output = Result<Self::Source>> + Send;
}
