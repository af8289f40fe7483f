//! Tuner state and statistics types

use crate::buffer::BufferSnapshot;
use crate::stats::EpochStats;

/// Lifecycle state of a tuner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunerState {
    /// No listeners, no pipeline
    Idle,
    /// Listeners attached, one broadcaster epoch running
    Tuning,
    /// Last listener left, pipeline is being torn down
    Stopping,
    /// Shut down for good
    Closed,
}

impl TunerState {
    /// Whether a pipeline may be running in this state
    pub fn is_live(&self) -> bool {
        matches!(self, TunerState::Tuning | TunerState::Stopping)
    }
}

/// Statistics for a tuner
#[derive(Debug, Clone)]
pub struct TunerStats {
    /// Current state
    pub state: TunerState,
    /// Attached listeners
    pub listeners: usize,
    /// Pipeline start attempts
    pub launches: u64,
    /// Epochs that ended with a pipeline failure
    pub failures: u64,
    /// Ring buffer bounds and fill level
    pub buffer: BufferSnapshot,
    /// Current or last epoch
    pub epoch: Option<EpochStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_live() {
        assert!(!TunerState::Idle.is_live());
        assert!(TunerState::Tuning.is_live());
        assert!(TunerState::Stopping.is_live());
        assert!(!TunerState::Closed.is_live());
    }
}
