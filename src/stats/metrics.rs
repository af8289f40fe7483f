//! Statistics for broadcast epochs and listeners

use std::time::{Duration, Instant};

/// Production statistics for one pipeline epoch
#[derive(Debug, Clone)]
pub struct EpochStats {
    /// Buffer epoch number
    pub epoch: u64,
    /// When the pipeline started
    pub started_at: Instant,
    /// Chunks appended to the buffer
    pub chunks: u64,
    /// Bytes appended to the buffer
    pub bytes: u64,
}

impl EpochStats {
    pub fn new(epoch: u64) -> Self {
        Self {
            epoch,
            started_at: Instant::now(),
            chunks: 0,
            bytes: 0,
        }
    }

    /// Account for one appended chunk
    pub fn record(&mut self, len: usize) {
        self.chunks += 1;
        self.bytes += len as u64;
    }

    /// Time since the epoch started
    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Produced bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration().as_secs();
        if secs > 0 {
            (self.bytes * 8) / secs
        } else {
            0
        }
    }
}

/// Delivery statistics for one listener
#[derive(Debug, Clone, Default)]
pub struct ListenerStats {
    /// Chunks delivered
    pub chunks: u64,
    /// Bytes delivered
    pub bytes: u64,
    /// Chunks lost to eviction
    pub skipped: u64,
    /// Number of times the listener fell out of the window
    pub underruns: u64,
    /// Pipeline restarts the listener followed
    pub resyncs: u64,
    /// Time attached
    pub duration: Duration,
    /// Delivered bitrate estimate (bits/sec)
    pub bitrate: u64,
}

impl ListenerStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one delivered chunk and any chunks skipped to reach it
    pub fn record_chunk(&mut self, len: usize, skipped: u64) {
        self.chunks += 1;
        self.bytes += len as u64;
        if skipped > 0 {
            self.skipped += skipped;
            self.underruns += 1;
        }
    }

    /// Calculate bitrate from bytes and duration
    pub fn calculate_bitrate(&mut self) {
        let secs = self.duration.as_secs();
        if secs > 0 {
            self.bitrate = (self.bytes * 8) / secs;
        }
    }
}
