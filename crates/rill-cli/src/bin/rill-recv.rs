//! Command-line receiver: reassembles a transfer from UDP into a file
//! (or stdout).

use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use rill_transport::channel::UdpChannel;
use rill_transport::receiver::{recv, ReceiverConfig};

/// Reliable file receiver over an unreliable UDP channel.
#[derive(Parser, Debug)]
#[command(name = "rill-recv", about = "Receive a file over a lossy UDP channel")]
struct Cli {
    /// Rendezvous port on loopback.
    #[arg(short, long, default_value_t = 9999)]
    port: u16,

    /// Output file; stdout if omitted.
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Print a JSON stats summary on completion (to stderr when writing
    /// the payload to stdout).
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
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut channel = UdpChannel::connect(cli.port)
        .with_context(|| format!("connecting to 127.0.0.1:{}", cli.port))?;
    tracing::info!(port = cli.port, "rill-recv listening");

    let stats = match &cli.file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            let mut sink = BufWriter::new(file);
            recv(&mut channel, &mut sink, ReceiverConfig::default())?
        }
        None => {
            let stdout = std::io::stdout();
            let mut sink = stdout.lock();
            recv(&mut channel, &mut sink, ReceiverConfig::default())?
        }
    };

    tracing::info!(
        bytes = stats.bytes_delivered,
        duplicates = stats.duplicates,
        checksum_failures = stats.checksum_failures,
        "transfer complete"
    );
    if cli.stats {
        let json = serde_json::to_string_pretty(&stats)?;
        if cli.file.is_some() {
            println!("{json}");
        } else {
            let mut stderr = std::io::stderr().lock();
            writeln!(stderr, "{json}")?;
        }
    }
    Ok(())
}
