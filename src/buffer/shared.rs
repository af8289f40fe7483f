//! Ring buffer shared between the broadcaster and every listener
//!
//! One writer (the broadcaster) and many readers. Every append, reset or
//! close wakes all waiting readers through a single `Notify`; readers register
//! interest before checking the buffer so a wakeup between the check and the
//! wait is never lost.

use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::Notify;

use super::cursor::{CursorRead, ListenerCursor, UnderrunPolicy};
use super::ring::RingBuffer;

/// Outcome of a blocking read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferRead {
    /// A chunk (or an underrun, depending on policy)
    Cursor(CursorRead),
    /// The buffer was closed, no more chunks will arrive
    Closed,
}

/// Point-in-time view of the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSnapshot {
    /// Current epoch
    pub epoch: u64,
    /// Lowest retained sequence number
    pub min_seq: u64,
    /// Highest retained sequence number
    pub max_seq: Option<u64>,
    /// Retained chunks
    pub chunks: usize,
    /// Retained bytes
    pub bytes: usize,
    /// Capacity in chunks
    pub capacity: usize,
}

struct State {
    ring: RingBuffer,
    closed: bool,
}

/// Ring buffer behind a mutex, with broadcast wakeups
pub struct SharedBuffer {
    state: Mutex<State>,
    notify: Notify,
}

impl SharedBuffer {
    /// Create a shared buffer with room for `capacity` chunks
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                ring: RingBuffer::new(capacity),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // Nothing in the critical sections can leave the ring half-updated
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a chunk and wake all readers
    pub fn append(&self, data: Bytes) -> u64 {
        let seq = self.lock().ring.append(data);
        self.notify.notify_waiters();
        seq
    }

    /// Start a new epoch: drop all chunks and restart numbering
    ///
    /// Returns the new epoch number.
    pub fn reset(&self) -> u64 {
        let epoch = {
            let mut state = self.lock();
            state.ring.reset();
            state.ring.epoch()
        };
        self.notify.notify_waiters();
        epoch
    }

    /// Mark the buffer closed; pending and future reads return `Closed`
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    /// Whether the buffer has been closed
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Cursor at the current live edge
    pub fn live_cursor(&self) -> ListenerCursor {
        ListenerCursor::at_live_edge(&self.lock().ring)
    }

    /// Non-blocking read
    pub fn try_read(&self, cursor: &mut ListenerCursor, policy: UnderrunPolicy) -> BufferRead {
        let state = self.lock();
        if state.closed {
            return BufferRead::Closed;
        }
        BufferRead::Cursor(cursor.advance(&state.ring, policy))
    }

    /// Wait until the cursor can make progress
    ///
    /// Never returns `CursorRead::Pending`.
    pub async fn read(&self, cursor: &mut ListenerCursor, policy: UnderrunPolicy) -> BufferRead {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_read(cursor, policy) {
                BufferRead::Cursor(CursorRead::Pending) => notified.await,
                other => return other,
            }
        }
    }

    /// Current bounds and fill level
    pub fn snapshot(&self) -> BufferSnapshot {
        let state = self.lock();
        BufferSnapshot {
            epoch: state.ring.epoch(),
            min_seq: state.ring.min_seq(),
            max_seq: state.ring.max_seq(),
            chunks: state.ring.len(),
            bytes: state.ring.size(),
            capacity: state.ring.capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_test::{assert_pending, assert_ready_eq, task};

    use super::*;

    #[test]
    fn test_read_waits_for_append() {
        let buffer = SharedBuffer::new(4);
        let mut cursor = buffer.live_cursor();

        let mut read = task::spawn(buffer.read(&mut cursor, UnderrunPolicy::Clamp));
        assert_pending!(read.poll());

        buffer.append(Bytes::from_static(b"abc"));
        assert!(read.is_woken());

        match read.poll() {
            std::task::Poll::Ready(BufferRead::Cursor(CursorRead::Chunk { chunk, .. })) => {
                assert_eq!(chunk.seq, 0);
                assert_eq!(chunk.data, Bytes::from_static(b"abc"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_close_wakes_readers() {
        let buffer = SharedBuffer::new(4);
        let mut cursor = buffer.live_cursor();

        let mut read = task::spawn(buffer.read(&mut cursor, UnderrunPolicy::Clamp));
        assert_pending!(read.poll());

        assert!(!buffer.is_closed());
        buffer.close();
        assert!(buffer.is_closed());
        assert!(read.is_woken());
        assert_ready_eq!(read.poll(), BufferRead::Closed);
    }

    #[tokio::test]
    async fn test_all_readers_woken() {
        let buffer = Arc::new(SharedBuffer::new(8));
        let mut handles = Vec::new();

        for _ in 0..4 {
            let buffer = Arc::clone(&buffer);
            let mut cursor = buffer.live_cursor();
            handles.push(tokio::spawn(async move {
                buffer.read(&mut cursor, UnderrunPolicy::Clamp).await
            }));
        }

        tokio::task::yield_now().await;
        buffer.append(Bytes::from_static(b"x"));

        for handle in handles {
            let read = handle.await.unwrap();
            assert!(matches!(
                read,
                BufferRead::Cursor(CursorRead::Chunk { ref chunk, .. }) if chunk.seq == 0
            ));
        }
    }

    #[test]
    fn test_reset_bumps_epoch() {
        let buffer = SharedBuffer::new(4);
        buffer.append(Bytes::from_static(b"a"));

        assert_eq!(buffer.reset(), 1);

        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.epoch, 1);
        assert_eq!(snapshot.chunks, 0);
        assert_eq!(snapshot.max_seq, None);
    }
}
