//! External demodulator + encoder process chain
//!
//! ```text
//!   demod (stage A) --stdout/stdin--> encoder (stage B) --stdout--> read_chunk()
//!        |                                   |
//!        +-- stderr --> tracing              +-- stderr --> tracing
//! ```
//!
//! Both stages share one process group, led by the demodulator. Termination
//! signals the whole group because the demodulator may start helpers of its
//! own.

#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

use super::config::{expand_command, PipelineConfig, TuneParams};
use super::launcher::{ChunkSource, PipelineLauncher};

const DEMOD: &str = "demod";
const ENCODER: &str = "encoder";

/// Launcher that spawns real processes
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher {
    config: PipelineConfig,
}

impl ProcessLauncher {
    /// Create a launcher with the given commands
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }
}

impl PipelineLauncher for ProcessLauncher {
    type Source = ProcessPipeline;

    async fn launch(&self, params: &TuneParams) -> Result<ProcessPipeline> {
        ProcessPipeline::spawn(&self.config, params).await
    }
}

/// One running demodulator/encoder chain
pub struct ProcessPipeline {
    demod: Child,
    encoder: Child,
    output: ChildStdout,
    /// Process group shared by both stages
    pgid: Option<u32>,
    block_size: usize,
    grace: Duration,
    terminated: bool,
    diagnostics: Vec<JoinHandle<()>>,
}

impl ProcessPipeline {
    /// Spawn both stages and verify they survive the launch probe
    pub async fn spawn(config: &PipelineConfig, params: &TuneParams) -> Result<Self> {
        let demod_argv = expand_command(&config.demod_command, params);
        let encoder_argv = expand_command(&config.encoder_command, params);

        let mut demod_cmd = stage_command(DEMOD, &demod_argv)?;
        demod_cmd.stdin(Stdio::null()).stdout(Stdio::piped());
        #[cfg(unix)]
        demod_cmd.process_group(0);

        let mut demod = Command::from(demod_cmd)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::launch(DEMOD, format!("{}: {}", demod_argv[0], e)))?;
        let pgid = demod.id();

        let pipe = match demod.stdout.take().map(|out| -> std::io::Result<Stdio> { out.try_into() }) {
            Some(Ok(pipe)) => pipe,
            Some(Err(e)) => {
                abandon(&mut demod, pgid).await;
                return Err(Error::launch(DEMOD, format!("cannot pipe output: {}", e)));
            }
            None => {
                abandon(&mut demod, pgid).await;
                return Err(Error::launch(DEMOD, "stdout not captured"));
            }
        };

        let mut encoder_cmd = match stage_command(ENCODER, &encoder_argv) {
            Ok(cmd) => cmd,
            Err(e) => {
                abandon(&mut demod, pgid).await;
                return Err(e);
            }
        };
        encoder_cmd.stdin(pipe).stdout(Stdio::piped());
        #[cfg(unix)]
        {
            if let Some(pgid) = pgid.and_then(|id| i32::try_from(id).ok()) {
                encoder_cmd.process_group(pgid);
            }
        }

        let mut encoder = match Command::from(encoder_cmd).kill_on_drop(true).spawn() {
            Ok(child) => child,
            Err(e) => {
                abandon(&mut demod, pgid).await;
                return Err(Error::launch(
                    ENCODER,
                    format!("{}: {}", encoder_argv[0], e),
                ));
            }
        };

        let Some(output) = encoder.stdout.take() else {
            abandon(&mut encoder, pgid).await;
            abandon(&mut demod, pgid).await;
            return Err(Error::launch(ENCODER, "stdout not captured"));
        };

        let mut diagnostics = Vec::with_capacity(2);
        if let Some(stderr) = demod.stderr.take() {
            diagnostics.push(drain_diagnostics(DEMOD, stderr));
        }
        if let Some(stderr) = encoder.stderr.take() {
            diagnostics.push(drain_diagnostics(ENCODER, stderr));
        }

        let mut pipeline = Self {
            demod,
            encoder,
            output,
            pgid,
            block_size: params.block_size.max(1),
            grace: config.terminate_grace,
            terminated: false,
            diagnostics,
        };

        if let Err(e) = pipeline.probe(config.launch_probe).await {
            pipeline.terminate().await;
            return Err(e);
        }

        tracing::info!(
            frequency = %params.frequency,
            bitrate = params.bitrate,
            pgid = ?pipeline.pgid,
            "Pipeline started"
        );

        Ok(pipeline)
    }

    /// Process group of the chain, if still known
    pub fn pgid(&self) -> Option<u32> {
        self.pgid
    }

    /// Fail if either stage exits unsuccessfully within `probe`
    async fn probe(&mut self, probe: Duration) -> Result<()> {
        if probe.is_zero() {
            return Ok(());
        }
        tokio::time::sleep(probe).await;

        for (stage, child) in [(DEMOD, &mut self.demod), (ENCODER, &mut self.encoder)] {
            probe_verdict(stage, child.try_wait())?;
        }
        Ok(())
    }

    /// Read the next block of encoder output
    ///
    /// Blocks are `block_size` bytes except the last one before end of stream.
    pub async fn read_chunk(&mut self) -> Result<Option<Bytes>> {
        let mut block = BytesMut::with_capacity(self.block_size);

        while block.len() < self.block_size {
            let n = self
                .output
                .read_buf(&mut block)
                .await
                .map_err(|e| Error::PipelineFailure {
                    stage: ENCODER,
                    reason: format!("read failed: {}", e),
                })?;
            if n == 0 {
                break;
            }
        }

        if !block.is_empty() {
            return Ok(Some(block.freeze()));
        }

        self.end_of_stream().await
    }

    /// Work out whether a closed output was a clean exit or a failure
    async fn end_of_stream(&mut self) -> Result<Option<Bytes>> {
        let encoder = tokio::time::timeout(self.grace, self.encoder.wait()).await;
        match encoder {
            Ok(Ok(status)) if !status.success() => return Err(Error::exited(ENCODER, status)),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(Error::PipelineFailure {
                    stage: ENCODER,
                    reason: "output closed but process still running".into(),
                })
            }
            Ok(Ok(_)) => {}
        }

        let demod = self.demod.try_wait().map_err(|e| Error::PipelineFailure {
            stage: DEMOD,
            reason: format!("cannot query status: {}", e),
        })?;
        if let Some(status) = demod {
            if !status.success() {
                return Err(Error::exited(DEMOD, status));
            }
        }

        tracing::debug!("Pipeline output closed");
        Ok(None)
    }

    /// Terminate the whole process group and wait for both stages
    ///
    /// Sends SIGTERM, then SIGKILL once the grace period runs out. Safe to call
    /// more than once.
    pub async fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;

        // Stage helpers may outlive both stages, so the group is always signalled
        signal_group(self.pgid, Signal::Term);
        #[cfg(not(unix))]
        {
            let _ = self.demod.start_kill();
            let _ = self.encoder.start_kill();
        }

        if tokio::time::timeout(self.grace, self.wait_group()).await.is_err() {
            tracing::warn!(
                pgid = ?self.pgid,
                grace_ms = self.grace.as_millis() as u64,
                "Pipeline ignored SIGTERM, killing"
            );
            signal_group(self.pgid, Signal::Kill);
            let _ = tokio::time::timeout(self.grace, self.wait_group()).await;
        }

        let (demod, encoder) = self.wait_all().await;
        tracing::info!(
            pgid = ?self.pgid,
            demod = %describe(&demod),
            encoder = %describe(&encoder),
            "Pipeline terminated"
        );

        for task in self.diagnostics.drain(..) {
            task.abort();
        }
    }

    async fn wait_all(&mut self) -> (std::io::Result<ExitStatus>, std::io::Result<ExitStatus>) {
        let demod = self.demod.wait().await;
        let encoder = self.encoder.wait().await;
        (demod, encoder)
    }

    /// Reap both stages, then wait until no member of the group is left
    async fn wait_group(&mut self) {
        let _ = self.wait_all().await;
        while group_alive(self.pgid) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl ChunkSource for ProcessPipeline {
    async fn read_chunk(&mut self) -> Result<Option<Bytes>> {
        ProcessPipeline::read_chunk(self).await
    }

    async fn terminate(&mut self) {
        ProcessPipeline::terminate(self).await
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Term,
    Kill,
}

/// Build a stage command; process-group placement needs the std builder
fn stage_command(stage: &'static str, argv: &[String]) -> Result<std::process::Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| Error::launch(stage, "empty command"))?;

    let mut cmd = std::process::Command::new(program);
    cmd.args(args).stderr(Stdio::piped());
    Ok(cmd)
}

/// Kill a stage that will not become part of a pipeline, with anything it
/// started in the group, and reap it
async fn abandon(child: &mut Child, pgid: Option<u32>) {
    signal_group(pgid, Signal::Kill);
    let _ = child.start_kill();
    let _ = child.wait().await;
}

/// Launch-probe verdict for one stage
fn probe_verdict(stage: &'static str, status: std::io::Result<Option<ExitStatus>>) -> Result<()> {
    match status {
        Ok(Some(status)) if !status.success() => Err(Error::launch(
            stage,
            format!("exited immediately with {}", status),
        )),
        Ok(_) => Ok(()),
        Err(e) => Err(Error::launch(stage, format!("cannot query status: {}", e))),
    }
}

#[cfg(unix)]
fn signal_group(pgid: Option<u32>, signal: Signal) {
    let Some(pgid) = pgid.and_then(|id| libc::pid_t::try_from(id).ok()) else {
        return;
    };
    let sig = match signal {
        Signal::Term => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    // SAFETY: killpg has no memory-safety preconditions
    let rc = unsafe { libc::killpg(pgid, sig) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::warn!(pgid = pgid, error = %err, "Failed to signal pipeline group");
        }
    }
}

#[cfg(not(unix))]
fn signal_group(_pgid: Option<u32>, _signal: Signal) {}

#[cfg(unix)]
fn group_alive(pgid: Option<u32>) -> bool {
    let Some(pgid) = pgid.and_then(|id| libc::pid_t::try_from(id).ok()) else {
        return false;
    };
    // SAFETY: signal 0 only checks for existence
    unsafe { libc::killpg(pgid, 0) == 0 }
}

#[cfg(not(unix))]
fn group_alive(_pgid: Option<u32>) -> bool {
    false
}

/// Forward a stage's stderr to the log, one record per line
///
/// Lines are decoded lossily so a stray non-UTF-8 byte never stops the drain
/// (a stalled stderr pipe would block the stage).
fn drain_diagnostics<R>(stage: &'static str, stderr: R) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&line);
                    let text = text.trim_end();
                    if !text.is_empty() {
                        tracing::info!(stage = stage, "{}", text);
                    }
                }
                Err(e) => {
                    tracing::debug!(stage = stage, error = %e, "Diagnostic stream failed");
                    break;
                }
            }
        }
    })
}

fn describe(status: &std::io::Result<ExitStatus>) -> String {
    match status {
        Ok(status) => status.to_string(),
        Err(e) => format!("unknown ({})", e),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::pipeline::config::Frequency;

    fn params(block_size: usize) -> TuneParams {
        TuneParams {
            frequency: Frequency::from_khz(99_000).unwrap(),
            bitrate: 24_000,
            block_size,
        }
    }

    fn config(demod: &[&str], encoder: &[&str]) -> PipelineConfig {
        PipelineConfig::default()
            .demod_command(demod.iter().copied())
            .encoder_command(encoder.iter().copied())
            .launch_probe(Duration::from_millis(300))
            .terminate_grace(Duration::from_secs(2))
    }

    fn group_alive(pgid: u32) -> bool {
        super::group_alive(Some(pgid))
    }

    #[tokio::test]
    async fn test_reads_fixed_size_blocks() {
        let config = config(&["yes", "fm"], &["cat"]);
        let mut pipeline = ProcessPipeline::spawn(&config, &params(64)).await.unwrap();

        for _ in 0..3 {
            let block = pipeline.read_chunk().await.unwrap().unwrap();
            assert_eq!(block.len(), 64);
            assert!(block.starts_with(b"fm\n") || block.starts_with(b"m\n") || block.starts_with(b"\n"));
        }

        pipeline.terminate().await;
    }

    #[tokio::test]
    async fn test_terminate_kills_group() {
        let config = config(&["yes"], &["cat"]);
        let mut pipeline = ProcessPipeline::spawn(&config, &params(16)).await.unwrap();
        let pgid = pipeline.pgid().unwrap();

        assert!(group_alive(pgid));
        pipeline.terminate().await;
        assert!(!group_alive(pgid));

        // Second call is a no-op
        pipeline.terminate().await;
    }

    #[tokio::test]
    async fn test_terminate_kills_helpers_after_stages_exit() {
        let config = config(&["sh", "-c", "sleep 30 >/dev/null 2>&1 & printf abc"], &["cat"]);
        let mut pipeline = ProcessPipeline::spawn(&config, &params(16)).await.unwrap();
        let pgid = pipeline.pgid().unwrap();

        let mut collected = Vec::new();
        while let Some(block) = pipeline.read_chunk().await.unwrap() {
            collected.extend_from_slice(&block);
        }
        assert_eq!(collected, b"abc");

        // Both stages are gone but the backgrounded sleep still holds the group
        assert!(group_alive(pgid));
        pipeline.terminate().await;
        assert!(!group_alive(pgid));
    }

    #[test]
    fn test_probe_verdict() {
        use std::os::unix::process::ExitStatusExt;

        assert!(probe_verdict(DEMOD, Ok(None)).is_ok());
        assert!(probe_verdict(DEMOD, Ok(Some(ExitStatus::from_raw(0)))).is_ok());

        // exit code 1
        let err = probe_verdict(ENCODER, Ok(Some(ExitStatus::from_raw(1 << 8)))).unwrap_err();
        assert!(matches!(err, Error::Launch { stage: "encoder", .. }));

        let err = probe_verdict(DEMOD, Err(std::io::Error::other("no child"))).unwrap_err();
        assert!(err.is_launch());
        assert!(matches!(err, Error::Launch { stage: "demod", .. }));
    }

    #[tokio::test]
    async fn test_missing_executable_is_launch_error() {
        let config = config(&["fm-relay-no-such-demodulator"], &["cat"]);
        let err = ProcessPipeline::spawn(&config, &params(16)).await.err().unwrap();

        assert!(matches!(err, Error::Launch { stage: "demod", .. }));
    }

    #[tokio::test]
    async fn test_missing_encoder_is_launch_error() {
        let config = config(&["yes"], &["fm-relay-no-such-encoder"]);
        let err = ProcessPipeline::spawn(&config, &params(16)).await.err().unwrap();

        assert!(matches!(err, Error::Launch { stage: "encoder", .. }));
    }

    #[tokio::test]
    async fn test_immediate_exit_is_launch_error() {
        let config = config(&["false"], &["cat"]);
        let err = ProcessPipeline::spawn(&config, &params(16)).await.err().unwrap();

        assert!(err.is_launch());
    }

    #[tokio::test]
    async fn test_short_stream_then_eof() {
        let config = config(&["printf", "abcdefghij"], &["cat"]);
        let mut pipeline = ProcessPipeline::spawn(&config, &params(4)).await.unwrap();

        let mut collected = Vec::new();
        while let Some(block) = pipeline.read_chunk().await.unwrap() {
            assert!(block.len() <= 4);
            collected.extend_from_slice(&block);
        }

        assert_eq!(collected, b"abcdefghij");
        pipeline.terminate().await;
    }

    #[tokio::test]
    async fn test_encoder_failure_surfaces() {
        let config = config(&["yes"], &["sh", "-c", "head -c 8; sleep 1; exit 3"]);
        let mut pipeline = ProcessPipeline::spawn(&config, &params(8)).await.unwrap();

        let first = pipeline.read_chunk().await.unwrap().unwrap();
        assert_eq!(first.len(), 8);

        let err = pipeline.read_chunk().await.err().unwrap();
        assert!(matches!(err, Error::PipelineFailure { stage: "encoder", .. }));
        pipeline.terminate().await;
    }
}
