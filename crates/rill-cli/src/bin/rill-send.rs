//! Command-line sender: reads a file and transfers it over UDP.
//!
//! Both endpoints dial the same rendezvous port on loopback (typically a
//! lossy-network relay), so the sender connects rather than binds.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use bytes::Bytes;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use rill_transport::channel::UdpChannel;
use rill_transport::sender::{send, SenderConfig};

/// Reliable file sender over an unreliable UDP channel.
#[derive(Parser, Debug)]
#[command(name = "rill-send", about = "Send a file over a lossy UDP channel")]
struct Cli {
    /// Rendezvous port on loopback.
    #[arg(short, long, default_value_t = 9999)]
    port: u16,

    /// File to send.
    #[arg(short, long)]
    file: PathBuf,

    /// Maximum unacknowledged segments in flight.
    #[arg(short, long, default_value_t = 2)]
    window: u32,

    /// Initial RTT estimate in milliseconds, seeding the adaptive timeout.
    #[arg(long, default_value_t = 100)]
    initial_rtt_ms: u64,

    /// Print a JSON stats summary on completion.
    #[arg(long, default_value_t = false)]
    stats: bool,

    /// Verbose logging (overridden by RUST_LOG).
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let data = std::fs::read(&cli.file)
        .with_context(|| format!("reading {}", cli.file.display()))?;
    let total = data.len();
    tracing::info!(
        file = %cli.file.display(),
        bytes = total,
        port = cli.port,
        "rill-send starting"
    );

    let mut channel = UdpChannel::connect(cli.port)
        .with_context(|| format!("connecting to 127.0.0.1:{}", cli.port))?;

    let config = SenderConfig {
        window_size: cli.window.max(1),
        initial_rtt: Duration::from_millis(cli.initial_rtt_ms),
        ..SenderConfig::default()
    };

    let started = Instant::now();
    let stats = send(&mut channel, Bytes::from(data), config);
    let elapsed = started.elapsed();

    if stats.bytes_acked != total as u64 {
        anyhow::bail!(
            "transfer incomplete: {} of {total} bytes acknowledged",
            stats.bytes_acked
        );
    }

    tracing::info!(
        bytes = stats.bytes_acked,
        elapsed_ms = elapsed.as_millis() as u64,
        retransmissions = stats.retransmissions,
        "transfer complete"
    );
    if cli.stats {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }
    Ok(())
}
