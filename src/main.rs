//! pktstream - live packet protocol classifier.
//!
//! Captures on one interface and streams a protocol label per packet to
//! the `network-traffic` topic.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{bounded, RecvTimeoutError};
use tracing_subscriber::EnvFilter;

use pktstream::capture::{DeviceSelector, PnetBackend, PnetDeviceSelector};
use pktstream::publisher::{self, LogSink, RestProxySink, StreamSink};
use pktstream::{CaptureLoop, Config, LoopError};

/// How often the supervisor checks whether the capture thread ended on its own.
const SUPERVISOR_POLL: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "pktstream")]
#[command(about = "Classify live network traffic by protocol and stream it to a broker")]
struct Cli {
    /// Config file path (defaults to $PKTSTREAM_CONFIG or /etc/pktstream.conf)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Interface to capture on (default: first available)
    #[arg(short, long)]
    interface: Option<String>,

    /// Kafka REST proxy base URL (default: log records only)
    #[arg(short, long)]
    broker_url: Option<String>,

    /// List capturable interfaces and exit
    #[arg(short, long)]
    list_interfaces: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;

    if cli.interface.is_some() {
        config.interface = cli.interface.clone();
    }
    if cli.broker_url.is_some() {
        config.broker_url = cli.broker_url.clone();
    }
    if cli.verbose {
        config.log_level = "debug".to_string();
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.tracing_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let selector = PnetDeviceSelector::new(config.interface.clone());

    if cli.list_interfaces {
        for device in selector.list_devices()? {
            println!("{}", device);
        }
        return Ok(());
    }

    run(config, selector)
}

fn run(config: Config, selector: PnetDeviceSelector) -> Result<()> {
    let sink: Box<dyn StreamSink> = match &config.broker_url {
        Some(url) => {
            tracing::info!("Publishing to Kafka REST proxy at {}", url);
            Box::new(
                RestProxySink::new(url, publisher::DEFAULT_REQUEST_TIMEOUT)
                    .context("failed to build broker client")?,
            )
        }
        None => {
            tracing::info!("No broker configured, logging records only");
            Box::new(LogSink::new())
        }
    };

    let (publisher, worker) = publisher::spawn(sink, config.publisher_config())
        .context("failed to start publisher")?;

    let mut capture = CaptureLoop::new(Box::new(selector), Box::new(PnetBackend::new()), publisher)
        .with_options(config.capture_options());

    if let Err(e) = capture.start() {
        worker.shutdown(config.drain_timeout());
        return Err(e).context("failed to start packet capture");
    }

    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .context("failed to install signal handler")?;

    loop {
        match shutdown_rx.recv_timeout(SUPERVISOR_POLL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                tracing::info!("Received shutdown signal");
                break;
            }
            Err(RecvTimeoutError::Timeout) if !capture.is_running() => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    let outcome = capture.stop();
    let loop_stats = capture.stats();
    let publish_stats = worker.shutdown(config.drain_timeout());

    tracing::info!(
        packets = loop_stats.packets,
        skipped = loop_stats.skipped,
        delivered = publish_stats.delivered,
        dropped = publish_stats.dropped,
        failed = publish_stats.failed,
        discarded = publish_stats.discarded,
        "Shut down"
    );

    match outcome {
        Ok(()) => Ok(()),
        Err(e @ LoopError::Terminated(_)) => Err(e).context("packet capture ended with an error"),
        Err(e) => Err(e.into()),
    }
}
