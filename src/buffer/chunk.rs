//! Sequence-numbered chunks of encoded stream data

use bytes::Bytes;

/// One block of encoder output as stored in the ring buffer
///
/// This is designed to be cheap to clone due to `Bytes` reference counting,
/// so every listener shares the same allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Sequence number within the epoch (starts at 0 on every pipeline start)
    pub seq: u64,
    /// Buffer epoch this chunk was produced in
    pub epoch: u64,
    /// Encoded bytes
    pub data: Bytes,
}

impl Chunk {
    /// Create a chunk
    pub fn new(seq: u64, epoch: u64, data: Bytes) -> Self {
        Self { seq, epoch, data }
    }

    /// Size of the payload in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
