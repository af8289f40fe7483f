//! Tuner configuration

use std::time::Duration;

use crate::buffer::{capacity_for, UnderrunPolicy};
use crate::error::{Error, Result};
use crate::pipeline::{Frequency, TuneParams};

/// Default encoder bitrate in bits/sec
pub const DEFAULT_BITRATE: u32 = 24_000;

/// Tuner configuration options
#[derive(Debug, Clone)]
pub struct TunerConfig {
    /// Station frequency
    pub frequency: Frequency,

    /// Encoder bitrate in bits/sec
    pub bitrate: u32,

    /// Nominal duration of one chunk
    pub block_duration: Duration,

    /// How much audio the ring buffer keeps
    pub retention: Duration,

    /// What happens to listeners that fall out of the retention window
    pub underrun_policy: UnderrunPolicy,

    /// Pause before restarting a pipeline that ended while listeners remain
    pub restart_delay: Duration,
}

impl TunerConfig {
    /// Create a config for `frequency` with default settings
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            bitrate: DEFAULT_BITRATE,
            block_duration: Duration::from_millis(50),
            retention: Duration::from_secs(10),
            underrun_policy: UnderrunPolicy::Clamp,
            restart_delay: Duration::from_millis(500),
        }
    }

    /// Set the bitrate
    pub fn bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }

    /// Set the block duration
    pub fn block_duration(mut self, duration: Duration) -> Self {
        self.block_duration = duration;
        self
    }

    /// Set the retention window
    pub fn retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Set the underrun policy
    pub fn underrun_policy(mut self, policy: UnderrunPolicy) -> Self {
        self.underrun_policy = policy;
        self
    }

    /// Set the restart delay
    pub fn restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    /// Bytes per chunk: `ceil(bitrate / 8 * block_duration)`
    pub fn block_size(&self) -> usize {
        let bits = u128::from(self.bitrate) * self.block_duration.as_nanos();
        let bytes = bits.div_ceil(8 * 1_000_000_000);
        usize::try_from(bytes).unwrap_or(usize::MAX).max(1)
    }

    /// Ring buffer capacity in chunks
    pub fn capacity(&self) -> usize {
        capacity_for(self.retention, self.block_duration)
    }

    /// Launch parameters handed to the pipeline
    pub fn tune_params(&self) -> TuneParams {
        TuneParams {
            frequency: self.frequency,
            bitrate: self.bitrate,
            block_size: self.block_size(),
        }
    }

    /// Reject settings the tuner cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.bitrate == 0 {
            return Err(Error::InvalidConfig("bitrate must be positive".into()));
        }
        if self.block_duration.is_zero() {
            return Err(Error::InvalidConfig("block duration must be positive".into()));
        }
        if self.retention < self.block_duration {
            return Err(Error::InvalidConfig(format!(
                "retention ({:?}) is shorter than one block ({:?})",
                self.retention, self.block_duration
            )));
        }
        Ok(())
    }
}
