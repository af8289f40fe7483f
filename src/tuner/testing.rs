//! Scripted producer for tuner tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::pipeline::{ChunkSource, PipelineLauncher, TuneParams};

/// What the current producer emits next
pub(crate) enum Feed {
    Chunk(Bytes),
    End,
    Fail,
}

#[derive(Default)]
struct Script {
    launches: AtomicUsize,
    successful: AtomicUsize,
    terminates: AtomicUsize,
    fail_launch: AtomicBool,
    launch_delay: Mutex<Duration>,
    current: Mutex<Option<mpsc::UnboundedSender<Feed>>>,
}

/// Launcher whose producers are driven by the test through [`Feed`]
#[derive(Clone, Default)]
pub(crate) struct ScriptedLauncher {
    script: Arc<Script>,
}

impl ScriptedLauncher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_launch_delay(self, delay: Duration) -> Self {
        *self.script.launch_delay.lock().unwrap() = delay;
        self
    }

    pub(crate) fn set_fail_launch(&self, fail: bool) {
        self.script.fail_launch.store(fail, Ordering::SeqCst);
    }

    /// Launch attempts, failed ones included
    pub(crate) fn launches(&self) -> usize {
        self.script.launches.load(Ordering::SeqCst)
    }

    pub(crate) fn successful_launches(&self) -> usize {
        self.script.successful.load(Ordering::SeqCst)
    }

    pub(crate) fn terminates(&self) -> usize {
        self.script.terminates.load(Ordering::SeqCst)
    }

    /// Send to the most recent producer; false if it is gone
    pub(crate) fn feed(&self, feed: Feed) -> bool {
        match self.script.current.lock().unwrap().as_ref() {
            Some(tx) => tx.send(feed).is_ok(),
            None => false,
        }
    }
}

pub(crate) struct ScriptedSource {
    rx: mpsc::UnboundedReceiver<Feed>,
    script: Arc<Script>,
    terminated: bool,
}

impl ChunkSource for ScriptedSource {
    async fn read_chunk(&mut self) -> Result<Option<Bytes>> {
        match self.rx.recv().await {
            Some(Feed::Chunk(data)) => Ok(Some(data)),
            Some(Feed::End) | None => Ok(None),
            Some(Feed::Fail) => Err(Error::PipelineFailure {
                stage: "encoder",
                reason: "scripted failure".into(),
            }),
        }
    }

    async fn terminate(&mut self) {
        if !self.terminated {
            self.terminated = true;
            self.script.terminates.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl PipelineLauncher for ScriptedLauncher {
    type Source = ScriptedSource;

    async fn launch(&self, _params: &TuneParams) -> Result<ScriptedSource> {
        let delay = *self.script.launch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.script.fail_launch.load(Ordering::SeqCst) {
            self.script.launches.fetch_add(1, Ordering::SeqCst);
            return Err(Error::launch("demod", "scripted launch failure"));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.script.current.lock().unwrap() = Some(tx);
        self.script.successful.fetch_add(1, Ordering::SeqCst);
        self.script.launches.fetch_add(1, Ordering::SeqCst);

        Ok(ScriptedSource {
            rx,
            script: Arc::clone(&self.script),
            terminated: false,
        })
    }
}

/// Poll `condition` until it holds, panicking after two seconds
pub(crate) async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
