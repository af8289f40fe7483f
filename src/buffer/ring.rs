//! Time-bounded ring buffer of encoded chunks
//!
//! Keeps the most recent `retention` worth of pipeline output so that
//! listeners consuming at slightly different rates can all read from the same
//! store. Capacity is expressed in chunks and derived from the block duration:
//! `ceil(retention / block_duration)`.
//!
//! Sequence numbers grow monotonically within an epoch. Appending past
//! capacity evicts from the front, so `max_seq - min_seq + 1 <= capacity`
//! always holds.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;

use super::chunk::Chunk;

/// Bounded FIFO keyed by sequence number
#[derive(Debug)]
pub struct RingBuffer {
    /// Maximum number of retained chunks
    capacity: usize,
    /// Retained chunks, front is `min_seq`
    chunks: VecDeque<Bytes>,
    /// Sequence number of the front chunk (or of the next append when empty)
    min_seq: u64,
    /// Incremented on every reset
    epoch: u64,
    /// Total bytes retained
    size: usize,
}

impl RingBuffer {
    /// Create a ring buffer holding at most `capacity` chunks
    ///
    /// A zero capacity is bumped to one so the newest chunk is always readable.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            chunks: VecDeque::with_capacity(capacity),
            min_seq: 0,
            epoch: 0,
            size: 0,
        }
    }

    /// Create a ring buffer sized to hold `retention` of audio split into
    /// blocks of `block_duration`
    pub fn with_retention(retention: Duration, block_duration: Duration) -> Self {
        Self::new(capacity_for(retention, block_duration))
    }

    /// Append a chunk and return its sequence number
    ///
    /// Evicts the oldest chunks while over capacity.
    pub fn append(&mut self, data: Bytes) -> u64 {
        let seq = self.next_seq();
        self.size += data.len();
        self.chunks.push_back(data);

        while self.chunks.len() > self.capacity {
            if let Some(old) = self.chunks.pop_front() {
                self.size -= old.len();
                self.min_seq += 1;
            }
        }

        seq
    }

    /// Get the chunk stored under `seq`
    ///
    /// Returns `None` if the chunk was evicted (`seq < min_seq`) or not produced
    /// yet (`seq > max_seq`).
    pub fn get(&self, seq: u64) -> Option<Chunk> {
        let offset = seq.checked_sub(self.min_seq)?;
        let data = self.chunks.get(usize::try_from(offset).ok()?)?;
        Some(Chunk::new(seq, self.epoch, data.clone()))
    }

    /// Drop every chunk and restart numbering at 0 in a new epoch
    pub fn reset(&mut self) {
        self.chunks.clear();
        self.min_seq = 0;
        self.size = 0;
        self.epoch += 1;
    }

    /// Lowest retained sequence number
    pub fn min_seq(&self) -> u64 {
        self.min_seq
    }

    /// Highest retained sequence number, `None` when empty
    pub fn max_seq(&self) -> Option<u64> {
        if self.is_empty() {
            None
        } else {
            Some(self.next_seq() - 1)
        }
    }

    /// Sequence number the next append will get
    pub fn next_seq(&self) -> u64 {
        self.min_seq + self.chunks.len() as u64
    }

    /// Current epoch
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Number of retained chunks
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the buffer holds no chunks
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Maximum number of retained chunks
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Retained bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Fill level as a percentage of capacity
    pub fn utilization(&self) -> f32 {
        (self.chunks.len() as f32 / self.capacity as f32) * 100.0
    }
}

/// Number of chunks needed to cover `retention` with blocks of `block_duration`
pub fn capacity_for(retention: Duration, block_duration: Duration) -> usize {
    if block_duration.is_zero() {
        return 1;
    }
    let blocks = retention.as_nanos().div_ceil(block_duration.as_nanos());
    usize::try_from(blocks).unwrap_or(usize::MAX).max(1)
}
