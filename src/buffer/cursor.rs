//! Per-listener read position
//!
//! A cursor joins at the live edge: when the newest chunk is 9, the first
//! chunk handed out is 10, never 9 or earlier. With an empty buffer the first
//! chunk is 0.

use super::chunk::Chunk;
use super::ring::RingBuffer;

/// What to do when a listener's next chunk has already been evicted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnderrunPolicy {
    /// Jump forward to the oldest retained chunk and accept the gap
    #[default]
    Clamp,
    /// End the listener's stream
    Disconnect,
}

/// Result of advancing a cursor against the buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorRead {
    /// Next chunk, with the number of chunks skipped to reach it
    Chunk {
        /// The chunk
        chunk: Chunk,
        /// Chunks lost to eviction before this one (0 if none)
        skipped: u64,
    },
    /// Nothing new yet
    Pending,
    /// Cursor fell out of the window and the policy is `Disconnect`
    Underrun {
        /// Chunks lost to eviction
        skipped: u64,
    },
}

/// Read position of one listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerCursor {
    /// Sequence number of the next chunk to deliver
    next_seq: u64,
    /// Epoch the sequence number belongs to
    epoch: u64,
    /// Number of times the cursor followed a buffer reset
    resyncs: u64,
}

impl ListenerCursor {
    /// Cursor positioned just after the newest chunk in `ring`
    pub fn at_live_edge(ring: &RingBuffer) -> Self {
        Self {
            next_seq: ring.next_seq(),
            epoch: ring.epoch(),
            resyncs: 0,
        }
    }

    /// Sequence number of the next chunk this cursor will deliver
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Epoch the cursor is reading from
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Number of pipeline restarts this cursor followed
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    /// Try to take the next chunk from `ring`
    pub fn advance(&mut self, ring: &RingBuffer, policy: UnderrunPolicy) -> CursorRead {
        if ring.epoch() != self.epoch {
            // Numbering restarted underneath us; follow the new epoch from its start
            self.epoch = ring.epoch();
            self.next_seq = ring.min_seq();
            self.resyncs += 1;
        }

        let mut skipped = 0;
        if self.next_seq < ring.min_seq() {
            skipped = ring.min_seq() - self.next_seq;
            match policy {
                UnderrunPolicy::Clamp => self.next_seq = ring.min_seq(),
                UnderrunPolicy::Disconnect => return CursorRead::Underrun { skipped },
            }
        }

        match ring.get(self.next_seq) {
            Some(chunk) => {
                self.next_seq += 1;
                CursorRead::Chunk { chunk, skipped }
            }
            None => CursorRead::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn filled(capacity: usize, count: u64) -> RingBuffer {
        let mut ring = RingBuffer::new(capacity);
        for n in 0..count {
            ring.append(Bytes::from(n.to_be_bytes().to_vec()));
        }
        ring
    }

    fn expect_chunk(read: CursorRead) -> (Chunk, u64) {
        match read {
            CursorRead::Chunk { chunk, skipped } => (chunk, skipped),
            other => panic!("expected chunk, got {:?}", other),
        }
    }

    #[test]
    fn test_joins_at_live_edge() {
        let mut ring = filled(32, 10); // max_seq = 9
        let mut cursor = ListenerCursor::at_live_edge(&ring);

        assert_eq!(cursor.next_seq(), 10);
        assert_eq!(cursor.advance(&ring, UnderrunPolicy::Clamp), CursorRead::Pending);

        ring.append(Bytes::from_static(b"ten"));
        let (chunk, skipped) = expect_chunk(cursor.advance(&ring, UnderrunPolicy::Clamp));
        assert_eq!(chunk.seq, 10);
        assert_eq!(skipped, 0);
    }

    #[test]
    fn test_empty_buffer_starts_at_zero() {
        let mut ring = RingBuffer::new(4);
        let mut cursor = ListenerCursor::at_live_edge(&ring);

        ring.append(Bytes::from_static(b"zero"));

        let (chunk, _) = expect_chunk(cursor.advance(&ring, UnderrunPolicy::Clamp));
        assert_eq!(chunk.seq, 0);
    }

    #[test]
    fn test_strictly_increasing() {
        let mut ring = RingBuffer::new(8);
        let mut cursor = ListenerCursor::at_live_edge(&ring);
        let mut last = None;

        for n in 0..5u8 {
            ring.append(Bytes::from(vec![n]));
        }
        while let CursorRead::Chunk { chunk, .. } = cursor.advance(&ring, UnderrunPolicy::Clamp) {
            if let Some(prev) = last {
                assert_eq!(chunk.seq, prev + 1);
            }
            last = Some(chunk.seq);
        }
        assert_eq!(last, Some(4));
    }

    #[test]
    fn test_underrun_clamps_to_min_seq() {
        let mut ring = RingBuffer::new(4);
        let mut cursor = ListenerCursor::at_live_edge(&ring);

        // Listener idles while 10 chunks go by; window is now 6..=9
        for n in 0..10u8 {
            ring.append(Bytes::from(vec![n]));
        }

        let (chunk, skipped) = expect_chunk(cursor.advance(&ring, UnderrunPolicy::Clamp));
        assert_eq!(chunk.seq, 6);
        assert_eq!(chunk.data, Bytes::from(vec![6u8]));
        assert_eq!(skipped, 6);
        assert_eq!(cursor.next_seq(), 7);
    }

    #[test]
    fn test_underrun_disconnect_policy() {
        let mut ring = RingBuffer::new(2);
        let mut cursor = ListenerCursor::at_live_edge(&ring);

        for n in 0..5u8 {
            ring.append(Bytes::from(vec![n]));
        }

        assert_eq!(
            cursor.advance(&ring, UnderrunPolicy::Disconnect),
            CursorRead::Underrun { skipped: 3 }
        );
    }

    #[test]
    fn test_follows_reset_into_new_epoch() {
        let mut ring = filled(8, 6);
        let mut cursor = ListenerCursor::at_live_edge(&ring);
        assert_eq!(cursor.next_seq(), 6);

        ring.reset();
        ring.append(Bytes::from_static(b"fresh"));

        let (chunk, skipped) = expect_chunk(cursor.advance(&ring, UnderrunPolicy::Clamp));
        assert_eq!(chunk.seq, 0);
        assert_eq!(chunk.epoch, 1);
        assert_eq!(skipped, 0);
        assert_eq!(cursor.epoch(), 1);
        assert_eq!(cursor.resyncs(), 1);
    }
}
