//! Listener session
//!
//! One per attached client. Reads chunks from the shared buffer through its
//! own cursor and releases its refcount exactly once, on `close` or on drop.

use std::time::Instant;

use bytes::Bytes;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::buffer::{BufferRead, Chunk, CursorRead, ListenerCursor};
use crate::pipeline::{PipelineLauncher, ProcessLauncher};
use crate::stats::ListenerStats;

use super::lifecycle::Tuner;

/// An attached listener
pub struct ListenerSession<L: PipelineLauncher = ProcessLauncher> {
    id: u64,
    tuner: Tuner<L>,
    cursor: ListenerCursor,
    cancel: CancellationToken,
    stats: ListenerStats,
    attached_at: Instant,
    finished: bool,
    detached: bool,
}

impl<L: PipelineLauncher> ListenerSession<L> {
    pub(super) fn new(tuner: Tuner<L>, id: u64, cursor: ListenerCursor) -> Self {
        Self {
            id,
            tuner,
            cursor,
            cancel: CancellationToken::new(),
            stats: ListenerStats::new(),
            attached_at: Instant::now(),
            finished: false,
            detached: false,
        }
    }

    /// Listener id, unique per tuner
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Sequence number of the next chunk to be delivered
    pub fn next_seq(&self) -> u64 {
        self.cursor.next_seq()
    }

    /// Delivery statistics so far
    pub fn stats(&self) -> &ListenerStats {
        &self.stats
    }

    /// Token that ends this session's stream when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the next chunk
    ///
    /// Returns `None` once the session is over: closed, cancelled, the tuner
    /// shut down, or the listener fell out of the buffer under
    /// [`UnderrunPolicy::Disconnect`](crate::buffer::UnderrunPolicy::Disconnect).
    pub async fn next(&mut self) -> Option<Chunk> {
        if self.finished {
            return None;
        }

        let policy = self.tuner.config().underrun_policy;
        let buffer = &self.tuner.shared().buffer;
        let read = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => BufferRead::Closed,
            read = buffer.read(&mut self.cursor, policy) => read,
        };

        match read {
            BufferRead::Cursor(CursorRead::Chunk { chunk, skipped }) => {
                if skipped > 0 {
                    tracing::debug!(
                        listener_id = self.id,
                        skipped = skipped,
                        seq = chunk.seq,
                        "Listener fell behind, skipping ahead"
                    );
                }
                self.stats.record_chunk(chunk.len(), skipped);
                self.stats.resyncs = self.cursor.resyncs();
                Some(chunk)
            }
            BufferRead::Cursor(CursorRead::Underrun { skipped }) => {
                self.stats.underruns += 1;
                self.stats.skipped += skipped;
                tracing::warn!(
                    listener_id = self.id,
                    skipped = skipped,
                    "Listener fell out of the buffer, disconnecting"
                );
                self.finished = true;
                None
            }
            BufferRead::Cursor(CursorRead::Pending) | BufferRead::Closed => {
                self.finished = true;
                None
            }
        }
    }

    /// End the session and release the listener
    ///
    /// Safe to call more than once. The detach runs on its own task, so it
    /// completes even if this future is dropped.
    pub async fn close(&mut self) {
        if self.detached {
            return;
        }
        self.detached = true;
        self.finished = true;
        self.cancel.cancel();
        self.log_summary();

        let tuner = self.tuner.clone();
        let id = self.id;
        if let Err(e) = tokio::spawn(async move { tuner.detach(id).await }).await {
            tracing::error!(listener_id = id, error = %e, "Detach task failed");
        }
    }

    /// Turn the session into a stream of chunk payloads
    pub fn into_stream(self) -> impl Stream<Item = Bytes> + Send {
        futures::stream::unfold(self, |mut session| async move {
            let chunk = session.next().await?;
            Some((chunk.data, session))
        })
    }

    fn log_summary(&mut self) {
        self.stats.duration = self.attached_at.elapsed();
        self.stats.calculate_bitrate();
        tracing::debug!(
            listener_id = self.id,
            chunks = self.stats.chunks,
            bytes = self.stats.bytes,
            skipped = self.stats.skipped,
            resyncs = self.stats.resyncs,
            bitrate = self.stats.bitrate,
            "Listener session ended"
        );
    }
}

impl<L: PipelineLauncher> Drop for ListenerSession<L> {
    fn drop(&mut self) {
        if self.detached {
            return;
        }
        self.detached = true;
        self.cancel.cancel();
        self.log_summary();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let tuner = self.tuner.clone();
                let id = self.id;
                handle.spawn(async move { tuner.detach(id).await });
            }
            Err(_) => {
                tracing::warn!(
                    listener_id = self.id,
                    "Listener dropped outside a runtime, not detached"
                );
            }
        }
    }
}
