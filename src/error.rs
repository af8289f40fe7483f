//! Error types
//!
//! A single error type covers the tuner, the pipeline and the HTTP front end.
//! Listeners never see pipeline errors: those stay inside the broadcaster.

use std::process::ExitStatus;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while relaying the stream
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A pipeline stage could not be started, or exited right after starting
    #[error("failed to launch {stage}: {reason}")]
    Launch {
        /// Stage name ("demod" or "encoder")
        stage: &'static str,
        /// What went wrong
        reason: String,
    },

    /// The running pipeline crashed or closed unexpectedly
    #[error("pipeline {stage} failed: {reason}")]
    PipelineFailure {
        /// Stage name ("demod" or "encoder")
        stage: &'static str,
        /// What went wrong
        reason: String,
    },

    /// Frequency could not be parsed or is out of range
    #[error("bad frequency: {0}")]
    InvalidFrequency(String),

    /// Configuration value rejected by validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The tuner has been shut down
    #[error("tuner is shut down")]
    Closed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Launch error for a stage that could not be spawned
    pub fn launch(stage: &'static str, reason: impl Into<String>) -> Self {
        Self::Launch {
            stage,
            reason: reason.into(),
        }
    }

    /// Pipeline failure caused by an unclean exit
    pub fn exited(stage: &'static str, status: ExitStatus) -> Self {
        Self::PipelineFailure {
            stage,
            reason: format!("exited with {}", status),
        }
    }

    /// Whether this error happened while starting the pipeline
    pub fn is_launch(&self) -> bool {
        matches!(self, Error::Launch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_display() {
        let err = Error::launch("demod", "softfm: not found");
        assert_eq!(err.to_string(), "failed to launch demod: softfm: not found");
        assert!(err.is_launch());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_launch());
    }
}
