//! Tuner orchestration
//!
//! Owns the shared buffer and the listener refcount, and starts or stops the
//! broadcaster as listeners come and go.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use crate::buffer::SharedBuffer;
use crate::error::{Error, Result};
use crate::pipeline::{PipelineConfig, PipelineLauncher, ProcessLauncher};
use crate::stats::EpochStats;

use super::broadcaster::{self, Epoch};
use super::config::TunerConfig;
use super::session::ListenerSession;
use super::state::{TunerState, TunerStats};

/// Lifecycle bookkeeping, guarded by an async mutex so starts and stops are
/// serialized
struct Lifecycle {
    epoch: Option<Epoch>,
    closed: bool,
}

/// State shared between the tuner handle, its sessions and the broadcaster
pub(super) struct Shared<L: PipelineLauncher> {
    pub(super) config: TunerConfig,
    launcher: L,
    pub(super) buffer: SharedBuffer,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
    state: Mutex<TunerState>,
    listeners: AtomicUsize,
    next_listener_id: AtomicU64,
    launches: AtomicU64,
    pub(super) failures: AtomicU64,
    epoch_stats: Mutex<Option<EpochStats>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<L: PipelineLauncher> Shared<L> {
    pub(super) fn listener_count(&self) -> usize {
        self.listeners.load(Ordering::Acquire)
    }

    fn set_state(&self, state: TunerState) {
        *lock(&self.state) = state;
    }

    /// Start a producer for a fresh buffer epoch
    pub(super) async fn launch(&self) -> Result<L::Source> {
        let epoch = self.buffer.reset();
        self.launches.fetch_add(1, Ordering::Relaxed);

        let params = self.config.tune_params();
        let source = self.launcher.launch(&params).await?;

        *lock(&self.epoch_stats) = Some(EpochStats::new(epoch));
        tracing::info!(
            frequency = %params.frequency,
            epoch = epoch,
            listeners = self.listener_count(),
            "Broadcast epoch started"
        );
        Ok(source)
    }

    /// Publish one chunk to all listeners
    pub(super) fn publish(&self, data: Bytes) -> u64 {
        let len = data.len();
        let seq = self.buffer.append(data);
        if let Some(stats) = lock(&self.epoch_stats).as_mut() {
            stats.record(len);
        }
        seq
    }
}

/// Demand-driven relay for one station
///
/// The pipeline runs only while at least one listener is attached. Cloning
/// the tuner yields another handle to the same instance.
pub struct Tuner<L: PipelineLauncher = ProcessLauncher> {
    shared: Arc<Shared<L>>,
}

impl<L: PipelineLauncher> Clone for Tuner<L> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Tuner<ProcessLauncher> {
    /// Create a tuner backed by the real demodulator/encoder process chain
    pub fn with_pipeline(config: TunerConfig, pipeline: PipelineConfig) -> Result<Self> {
        Self::new(config, ProcessLauncher::new(pipeline))
    }
}

impl<L: PipelineLauncher> Tuner<L> {
    /// Create an idle tuner
    pub fn new(config: TunerConfig, launcher: L) -> Result<Self> {
        config.validate()?;

        let buffer = SharedBuffer::new(config.capacity());
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                launcher,
                buffer,
                lifecycle: tokio::sync::Mutex::new(Lifecycle {
                    epoch: None,
                    closed: false,
                }),
                state: Mutex::new(TunerState::Idle),
                listeners: AtomicUsize::new(0),
                next_listener_id: AtomicU64::new(1),
                launches: AtomicU64::new(0),
                failures: AtomicU64::new(0),
                epoch_stats: Mutex::new(None),
            }),
        })
    }

    /// Get the tuner configuration
    pub fn config(&self) -> &TunerConfig {
        &self.shared.config
    }

    pub(super) fn shared(&self) -> &Shared<L> {
        &self.shared
    }

    /// Attach a listener
    ///
    /// The first listener starts the pipeline; concurrent first attaches
    /// share a single start. On launch failure the refcount is rolled back
    /// and the error is returned.
    pub async fn attach(&self) -> Result<ListenerSession<L>> {
        let mut lifecycle = self.shared.lifecycle.lock().await;
        if lifecycle.closed {
            return Err(Error::Closed);
        }

        let listeners = self.shared.listeners.fetch_add(1, Ordering::AcqRel) + 1;

        if lifecycle.epoch.is_none() {
            match self.shared.launch().await {
                Ok(source) => {
                    lifecycle.epoch = Some(broadcaster::spawn(Arc::clone(&self.shared), source));
                    self.shared.set_state(TunerState::Tuning);
                }
                Err(e) => {
                    self.shared.listeners.fetch_sub(1, Ordering::AcqRel);
                    self.shared.buffer.reset();
                    tracing::error!(
                        frequency = %self.shared.config.frequency,
                        error = %e,
                        "Failed to start pipeline"
                    );
                    return Err(e);
                }
            }
        }

        let id = self.shared.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let cursor = self.shared.buffer.live_cursor();
        drop(lifecycle);

        tracing::info!(
            listener_id = id,
            listeners = listeners,
            start_seq = cursor.next_seq(),
            "Listener attached"
        );

        Ok(ListenerSession::new(self.clone(), id, cursor))
    }

    /// Release one listener
    ///
    /// When the count reaches zero the broadcaster is stopped and joined
    /// before the tuner reports `Idle`.
    pub(super) async fn detach(&self, listener_id: u64) {
        let mut lifecycle = self.shared.lifecycle.lock().await;

        let previous = self
            .shared
            .listeners
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or(0);
        let remaining = previous.saturating_sub(1);

        tracing::info!(
            listener_id = listener_id,
            listeners = remaining,
            "Listener detached"
        );

        if remaining > 0 {
            return;
        }

        if let Some(epoch) = lifecycle.epoch.take() {
            self.shared.set_state(TunerState::Stopping);
            tracing::info!("Last listener left, stopping pipeline");

            epoch.stop().await;
            self.shared.buffer.reset();

            if !lifecycle.closed {
                self.shared.set_state(TunerState::Idle);
            }
            tracing::info!("Tuner idle");
        }
    }

    /// Stop the pipeline and refuse further listeners
    ///
    /// Attached sessions observe end of stream.
    pub async fn shutdown(&self) {
        let mut lifecycle = self.shared.lifecycle.lock().await;
        if lifecycle.closed {
            return;
        }
        lifecycle.closed = true;
        self.shared.buffer.close();

        if let Some(epoch) = lifecycle.epoch.take() {
            epoch.stop().await;
        }
        self.shared.set_state(TunerState::Closed);

        tracing::info!(
            listeners = self.shared.listener_count(),
            "Tuner shut down"
        );
    }

    /// Attached listeners
    pub fn listener_count(&self) -> usize {
        self.shared.listener_count()
    }

    /// Current lifecycle state
    pub fn state(&self) -> TunerState {
        *lock(&self.shared.state)
    }

    /// Get tuner statistics
    pub fn stats(&self) -> TunerStats {
        TunerStats {
            state: self.state(),
            listeners: self.listener_count(),
            launches: self.shared.launches.load(Ordering::Relaxed),
            failures: self.shared.failures.load(Ordering::Relaxed),
            buffer: self.shared.buffer.snapshot(),
            epoch: lock(&self.shared.epoch_stats).clone(),
        }
    }
}
