//! FM relay server
//!
//! Run with: fm-relay [OPTIONS] [FREQ_KHZ]
//!
//! Examples:
//!   fm-relay                          # 99.0 MHz (or $FM_KHZ), 0.0.0.0:8080
//!   fm-relay 101100                   # 101.1 MHz
//!   fm-relay --bind localhost:9000 --bitrate 48000 94700
//!
//! ## Listening
//!
//!   vlc http://localhost:8080/radio.ts
//!   ffplay http://localhost:8080/radio.ts
//!
//! The tuner starts when the first listener connects and stops when the last
//! one disconnects.

use std::fs::File;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use fm_relay::{Frequency, PipelineConfig, RadioServer, ServerConfig, Tuner, TunerConfig};

const DEFAULT_KHZ: &str = "99000";
const DEFAULT_PORT: u16 = 8080;

/// Command line options
#[derive(Debug)]
struct Options {
    frequency: Frequency,
    bitrate: u32,
    bind_addr: SocketAddr,
    retention: Option<Duration>,
    block: Option<Duration>,
    max_listeners: usize,
    path: Option<String>,
    logfile: Option<PathBuf>,
}

/// Parse bind address from command line argument.
///
/// Accepts formats:
/// - "localhost" -> 127.0.0.1:8080
/// - "localhost:9000" -> 127.0.0.1:9000
/// - "127.0.0.1" -> 127.0.0.1:8080
/// - "0.0.0.0:8081" -> 0.0.0.0:8081
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn parse_seconds(flag: &str, value: &str) -> Result<Duration, String> {
    value
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .filter(|d| !d.is_zero())
        .ok_or_else(|| format!("{} expects a positive number of seconds, got '{}'", flag, value))
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("{} expects a number, got '{}'", flag, value))
}

/// Parse arguments; `None` means help was requested
fn parse_args(
    args: &[String],
    env: impl Fn(&str) -> Option<String>,
) -> Result<Option<Options>, String> {
    let mut frequency = None;
    let mut bitrate = None;
    let mut bind_addr = SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT));
    let mut retention = None;
    let mut block = None;
    let mut max_listeners = 0;
    let mut path = None;
    let mut logfile = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = || {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("{} requires a value", arg))
        };

        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            "--bind" => bind_addr = parse_bind_addr(&value()?)?,
            "--bitrate" => bitrate = Some(value()?),
            "--retention" => retention = Some(parse_seconds(arg, &value()?)?),
            "--block" => block = Some(parse_seconds(arg, &value()?)?),
            "--max-listeners" => max_listeners = parse_number(arg, &value()?)?,
            "--path" => path = Some(value()?),
            "--logfile" => logfile = Some(PathBuf::from(value()?)),
            flag if flag.starts_with("--") => return Err(format!("Unknown option: {}", flag)),
            khz => {
                if frequency.replace(khz.to_string()).is_some() {
                    return Err(format!("Unexpected argument: {}", khz));
                }
            }
        }
    }

    let frequency = frequency
        .or_else(|| env("FM_KHZ"))
        .unwrap_or_else(|| DEFAULT_KHZ.to_string());
    let frequency: Frequency = frequency.parse().map_err(|e| format!("{}", e))?;

    let bitrate = match bitrate.or_else(|| env("FM_BITRATE")) {
        Some(b) => parse_number("--bitrate", &b)?,
        None => fm_relay::tuner::DEFAULT_BITRATE,
    };

    Ok(Some(Options {
        frequency,
        bitrate,
        bind_addr,
        retention,
        block,
        max_listeners,
        path,
        logfile,
    }))
}

fn print_usage() {
    eprintln!("Usage: fm-relay [OPTIONS] [FREQ_KHZ]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  FREQ_KHZ              Station frequency in kHz (default: $FM_KHZ or 99000)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --bind ADDR           Address to bind to (default: 0.0.0.0:8080)");
    eprintln!("  --bitrate BPS         Encoder bitrate (default: $FM_BITRATE or 24000)");
    eprintln!("  --retention SECS      Audio kept for slow listeners (default: 10)");
    eprintln!("  --block SECS          Chunk duration (default: 0.05)");
    eprintln!("  --max-listeners N     Concurrent listener limit (default: 0, unlimited)");
    eprintln!("  --path PATH           Stream path (default: /radio.ts)");
    eprintln!("  --logfile FILE        Write logs to FILE instead of stderr");
    eprintln!("  -h, --help            Show this help");
}

fn init_logging(logfile: Option<&PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("fm_relay=info"));

    match logfile {
        Some(path) => {
            let file = File::create(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let options = match parse_args(&args, |key| std::env::var(key).ok()) {
        Ok(Some(options)) => options,
        Ok(None) => {
            print_usage();
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    init_logging(options.logfile.as_ref())?;

    let mut tuner_config = TunerConfig::new(options.frequency).bitrate(options.bitrate);
    if let Some(retention) = options.retention {
        tuner_config = tuner_config.retention(retention);
    }
    if let Some(block) = options.block {
        tuner_config = tuner_config.block_duration(block);
    }

    let mut server_config = ServerConfig::with_addr(options.bind_addr)
        .max_listeners(options.max_listeners);
    if let Some(path) = options.path {
        server_config = server_config.stream_path(path);
    }

    let stream_path = server_config.stream_path.clone();
    let tuner = Tuner::with_pipeline(tuner_config, PipelineConfig::default())?;

    tracing::info!(
        frequency = %options.frequency,
        bitrate = options.bitrate,
        capacity = tuner.config().capacity(),
        block_size = tuner.config().block_size(),
        "Tuner ready"
    );

    let server = RadioServer::new(server_config, tuner);
    tracing::info!(
        url = %format!("http://{}{}", server.bind_addr(), stream_path),
        "Serving radio stream"
    );
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}
