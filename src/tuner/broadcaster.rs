//! Broadcaster epoch
//!
//! A single task per running pipeline. It moves chunks from the producer into
//! the shared buffer and restarts the producer while listeners remain.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::pipeline::{ChunkSource, PipelineLauncher};

use super::lifecycle::Shared;

/// Handle to a running broadcaster task
pub(super) struct Epoch {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl Epoch {
    /// Cancel the task and wait until the producer has been terminated
    pub(super) async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Broadcaster task failed");
        }
    }
}

/// How a producer run ended
enum Outcome {
    Shutdown,
    Ended,
    Failed(Error),
}

/// Spawn the broadcaster for an already launched producer
pub(super) fn spawn<L: PipelineLauncher>(shared: Arc<Shared<L>>, source: L::Source) -> Epoch {
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(run(shared, source, shutdown.clone()));
    Epoch { shutdown, task }
}

async fn run<L: PipelineLauncher>(
    shared: Arc<Shared<L>>,
    mut source: L::Source,
    shutdown: CancellationToken,
) {
    loop {
        let outcome = pump(&shared, &mut source, &shutdown).await;
        source.terminate().await;

        match outcome {
            Outcome::Shutdown => {
                tracing::debug!("Broadcaster stopped");
                return;
            }
            Outcome::Ended => {
                tracing::warn!(
                    listeners = shared.listener_count(),
                    "Pipeline output ended"
                );
            }
            Outcome::Failed(e) => {
                shared.failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    error = %e,
                    listeners = shared.listener_count(),
                    "Pipeline failed"
                );
            }
        }

        source = match restart(&shared, &shutdown).await {
            Some(source) => source,
            None => return,
        };
    }
}

/// Copy chunks into the buffer until the producer ends or we are cancelled
async fn pump<S: ChunkSource, L: PipelineLauncher>(
    shared: &Shared<L>,
    source: &mut S,
    shutdown: &CancellationToken,
) -> Outcome {
    loop {
        let read = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Outcome::Shutdown,
            read = source.read_chunk() => read,
        };

        match read {
            Ok(Some(data)) => {
                let len = data.len();
                let seq = shared.publish(data);
                tracing::trace!(seq = seq, len = len, "Chunk appended");
            }
            Ok(None) => return Outcome::Ended,
            Err(e) => return Outcome::Failed(e),
        }
    }
}

/// Relaunch after a pause, retrying until it works or nobody is listening
async fn restart<L: PipelineLauncher>(
    shared: &Shared<L>,
    shutdown: &CancellationToken,
) -> Option<L::Source> {
    loop {
        if shutdown.is_cancelled() || shared.listener_count() == 0 {
            return None;
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return None,
            _ = tokio::time::sleep(shared.config.restart_delay) => {}
        }

        match shared.launch().await {
            Ok(source) => return Some(source),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    retry_in_ms = shared.config.restart_delay.as_millis() as u64,
                    "Pipeline restart failed"
                );
            }
        }
    }
}
