//! easybus Logger Binary
//!
//! Connects to one instrument, prepares it, samples at a fixed interval and
//! appends every row to a CSV file as it arrives. Ctrl+C ends the run
//! cleanly: the close sequence still runs.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use clap::Parser;
use easybus::data::CsvSink;
use easybus::devices::Gmh3710;
use easybus::lookup::LookupTable;
use easybus::transport::SerialTransport;
use easybus::{BusError, Config, DeviceSession, SampleOutcome};
use tracing_subscriber::{fmt, EnvFilter};

/// easybus Logger
#[derive(Parser, Debug)]
#[command(name = "easybus-logger")]
#[command(about = "Sample an EASYBus instrument and export the readings")]
#[command(version)]
struct Args {
    /// Serial port of the bus converter
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Instrument address
    #[arg(short, long, default_value = "1")]
    address: u8,

    /// Baud rate
    #[arg(short, long, default_value = "4800")]
    baud: u32,

    /// Reply timeout in milliseconds
    #[arg(short, long, default_value = "500")]
    timeout_ms: u64,

    /// JSON file with error/status/unit tables
    #[arg(short, long)]
    lookup: Option<PathBuf>,

    /// Number of samples (runs until Ctrl+C if omitted)
    #[arg(short, long)]
    count: Option<u64>,

    /// Interval between samples in milliseconds
    #[arg(short, long, default_value = "1000")]
    interval_ms: u64,

    /// CSV file for the readings
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verify reply check bytes
    #[arg(long)]
    verify: bool,
}

impl Args {
    fn into_config(self) -> Config {
        let mut builder = Config::builder()
            .port(self.port)
            .address(self.address)
            .baud_rate(self.baud)
            .timeout_ms(self.timeout_ms)
            .sample_interval_ms(self.interval_ms)
            .verify_checksums(self.verify);

        if let Some(path) = self.lookup {
            builder = builder.lookup_path(path);
        }
        if let Some(count) = self.count {
            builder = builder.sample_count(count);
        }
        if let Some(path) = self.output {
            builder = builder.export_path(path);
        }
        builder.build()
    }
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,easybus=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let config = Args::parse().into_config();

    tracing::info!("easybus logger v{}", easybus::VERSION);
    tracing::info!("Port: {} @ {} baud, address {}", config.port, config.baud_rate, config.address);

    if let Err(e) = run(&config) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(config: &Config) -> easybus::Result<()> {
    config.validate()?;

    // Set up Ctrl+C handler; the loop below notices it between samples
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, stopping acquisition...");
        running_clone.store(false, Ordering::Relaxed);
    })
    .map_err(|e| BusError::Config(format!("cannot install Ctrl+C handler: {}", e)))?;

    let lookup = match &config.lookup_path {
        Some(path) => LookupTable::load(path)?,
        None => LookupTable::empty(),
    };

    let mut transport = SerialTransport::open(config)?;
    let mut session = DeviceSession::from_config(config, Gmh3710::new(), &mut transport, &lookup);

    session.init_commands()?;
    session.prepare()?;

    // Created after prepare so the header carries the display unit
    let mut sink = match &config.export_path {
        Some(path) => Some(CsvSink::create(path, session.data())?),
        None => None,
    };

    let mut taken = 0u64;
    let mut missed = 0u64;
    while running.load(Ordering::Relaxed) && config.sample_count.map_or(true, |count| taken < count) {
        match session.sample() {
            Ok(SampleOutcome::Reading(_)) => {}
            Ok(SampleOutcome::Missed { .. }) => missed += 1,
            Err(e) => {
                tracing::error!("Sampling stopped: {}", e);
                break;
            }
        }
        taken += 1;

        for row in session.drain_rows() {
            if let Some(sink) = sink.as_mut() {
                sink.write_row(&row)?;
            }
        }

        thread::sleep(config.sample_interval());
    }

    tracing::info!("{} samples, {} missed", taken, missed);

    if let Err(e) = session.close() {
        tracing::warn!("{}", e);
    }

    if let Some(sink) = sink {
        tracing::info!(rows = sink.rows(), "Export finished");
    }

    Ok(())
}
