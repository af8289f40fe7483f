//! Pipeline configuration

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::Error;

/// Tuner frequency in kHz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Frequency(u32);

impl Frequency {
    /// Create a frequency from kHz; zero is rejected
    pub fn from_khz(khz: u32) -> Result<Self, Error> {
        if khz == 0 {
            return Err(Error::InvalidFrequency("frequency must be positive".into()));
        }
        Ok(Self(khz))
    }

    /// Frequency in kHz
    pub fn khz(&self) -> u32 {
        self.0
    }

    /// Frequency in Hz
    pub fn hz(&self) -> u64 {
        u64::from(self.0) * 1000
    }
}

impl FromStr for Frequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidFrequency("frequency not set".into()));
        }
        let khz = s
            .parse::<u32>()
            .map_err(|_| Error::InvalidFrequency(format!("'{}' is not an integer kHz value", s)))?;
        Self::from_khz(khz)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} kHz", self.0)
    }
}

/// Parameters for one pipeline start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuneParams {
    /// Station frequency
    pub frequency: Frequency,
    /// Encoder bitrate in bits/sec
    pub bitrate: u32,
    /// Nominal size of one chunk read from the encoder
    pub block_size: usize,
}

/// How to launch the external demodulator and encoder
///
/// Commands are argument vectors (program first). Each argument may contain
/// the placeholders `{freq_hz}`, `{freq_khz}`, `{bitrate}` and
/// `{bitrate_kbps}`, which are substituted at launch.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Stage A: radio input to raw PCM on stdout
    pub demod_command: Vec<String>,

    /// Stage B: raw PCM on stdin to a container stream on stdout
    pub encoder_command: Vec<String>,

    /// How long both stages must survive after spawning to count as started
    pub launch_probe: Duration,

    /// How long to wait after SIGTERM before sending SIGKILL
    pub terminate_grace: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            demod_command: to_args(&["softfm", "-t", "rtlsdr", "-c", "freq={freq_hz}", "-R", "-"]),
            encoder_command: to_args(&[
                "ffmpeg",
                "-hide_banner",
                "-loglevel",
                "warning",
                "-f",
                "s16le",
                "-ac",
                "2",
                "-ar",
                "48000",
                "-i",
                "-",
                "-acodec",
                "aac",
                "-b:a",
                "{bitrate}",
                "-f",
                "mpegts",
                "-",
            ]),
            launch_probe: Duration::from_millis(200),
            terminate_grace: Duration::from_secs(3),
        }
    }
}

impl PipelineConfig {
    /// Set the demodulator command
    pub fn demod_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.demod_command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Set the encoder command
    pub fn encoder_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.encoder_command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Set the launch probe duration
    pub fn launch_probe(mut self, probe: Duration) -> Self {
        self.launch_probe = probe;
        self
    }

    /// Set the SIGTERM grace period
    pub fn terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }
}

fn to_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

/// Substitute launch parameters into a command template
pub fn expand_command(template: &[String], params: &TuneParams) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            arg.replace("{freq_hz}", &params.frequency.hz().to_string())
                .replace("{freq_khz}", &params.frequency.khz().to_string())
                .replace("{bitrate_kbps}", &(params.bitrate / 1000).to_string())
                .replace("{bitrate}", &params.bitrate.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> TuneParams {
        TuneParams {
            frequency: Frequency::from_khz(99_000).unwrap(),
            bitrate: 24_000,
            block_size: 150,
        }
    }

    #[test]
    fn test_frequency_parse() {
        let freq: Frequency = " 99500 ".parse().unwrap();
        assert_eq!(freq.khz(), 99_500);
        assert_eq!(freq.hz(), 99_500_000);
        assert_eq!(freq.to_string(), "99500 kHz");
    }

    #[test]
    fn test_frequency_rejects_garbage() {
        assert!(matches!(
            "99.5".parse::<Frequency>(),
            Err(Error::InvalidFrequency(_))
        ));
        assert!(matches!("".parse::<Frequency>(), Err(Error::InvalidFrequency(_))));
        assert!(matches!("0".parse::<Frequency>(), Err(Error::InvalidFrequency(_))));
        assert!(matches!("-1".parse::<Frequency>(), Err(Error::InvalidFrequency(_))));
    }

    #[test]
    fn test_default_commands_expand() {
        let config = PipelineConfig::default();

        let demod = expand_command(&config.demod_command, &params());
        assert_eq!(demod[0], "softfm");
        assert!(demod.contains(&"freq=99000000".to_string()));

        let encoder = expand_command(&config.encoder_command, &params());
        assert_eq!(encoder[0], "ffmpeg");
        assert!(encoder.contains(&"24000".to_string()));
        assert_eq!(encoder.last().map(String::as_str), Some("-"));
    }

    #[test]
    fn test_placeholders() {
        let template = to_args(&["{freq_khz}", "{bitrate_kbps}k", "x{bitrate}x"]);
        assert_eq!(
            expand_command(&template, &params()),
            vec!["99000", "24k", "x24000x"]
        );
    }

    #[test]
    fn test_builder_chaining() {
        let config = PipelineConfig::default()
            .demod_command(["yes"])
            .encoder_command(vec!["cat".to_string()])
            .launch_probe(Duration::from_millis(10))
            .terminate_grace(Duration::from_secs(1));

        assert_eq!(config.demod_command, vec!["yes"]);
        assert_eq!(config.encoder_command, vec!["cat"]);
        assert_eq!(config.launch_probe, Duration::from_millis(10));
        assert_eq!(config.terminate_grace, Duration::from_secs(1));
    }
}
