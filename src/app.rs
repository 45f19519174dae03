//! Core application runner (business logic) for `sensorbug-listener`.
//!
//! This module is intentionally decoupled from CLI parsing and process exit codes
//! so it can be tested deterministically.

use crate::decoder::decode;
use crate::duration::parse_interval;
use crate::metrics::{DEFAULT_METRICS_PORT, MetricsSink};
use crate::output::OutputFormatter;
use crate::output::summary::SummaryFormatter;
use crate::scanner::{Discovery, ScanError};
use crate::state::{Observation, StateStore};
use clap::Parser;
use log::{debug, info, warn};
use std::future::Future;
use std::io;
use std::io::Write;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Configuration for the core run loop.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// How often changed readings are printed.
    /// Accepts duration with suffix: 30s, 5m, 500ms, 1h.
    /// Without suffix, value is interpreted as seconds.
    #[arg(long, default_value = "5m", value_parser = parse_interval)]
    pub flush_interval: Duration,

    /// Port for the Prometheus metrics endpoint
    #[arg(long, default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Do not export metrics
    #[arg(long)]
    pub no_metrics: bool,

    /// Verbose output, print decode errors for malformed advertisements
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Errors returned by the core run loop and its setup.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
    #[cfg(feature = "metrics")]
    #[error("Metrics server error: {0}")]
    MetricsServer(#[from] hyper::Error),
}

/// Scanner abstraction to enable deterministic unit tests without Bluetooth hardware.
pub trait Scanner: Send + Sync {
    fn start_scan(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<mpsc::Receiver<Discovery>, ScanError>> + Send + '_>>;
}

/// Real scanner implementation that delegates to the compiled-in backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealScanner;

impl Scanner for RealScanner {
    fn start_scan(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<mpsc::Receiver<Discovery>, ScanError>> + Send + '_>>
    {
        Box::pin(crate::scanner::start_scan())
    }
}

/// Turns discoveries into gauges, new-device lines and pending changes.
///
/// Owns the [`StateStore`]; only the run loop drives it.
pub struct Reporter<'a> {
    store: StateStore,
    formatter: SummaryFormatter,
    metrics: &'a dyn MetricsSink,
    verbose: bool,
}

impl<'a> Reporter<'a> {
    pub fn new(metrics: &'a dyn MetricsSink, verbose: bool) -> Self {
        Self {
            store: StateStore::new(),
            formatter: SummaryFormatter::new(),
            metrics,
            verbose,
        }
    }

    /// Handle one advertisement.
    ///
    /// Foreign advertisements produce nothing. Decode failures are written to
    /// `err` only when verbose and never touch the store. A failing `err`
    /// writer is logged and otherwise ignored.
    pub fn on_discovery(
        &mut self,
        discovery: &Discovery,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> io::Result<()> {
        let device_id = discovery.device_id.as_str();
        let reading = match decode(&discovery.manufacturer_data) {
            Ok(Some(reading)) => reading,
            Ok(None) => return Ok(()),
            Err(e) => {
                debug!("{device_id}: {e}");
                if self.verbose
                    && let Err(write_err) = writeln!(err, "{device_id}: {e}")
                {
                    warn!("Failed to report decode error: {write_err}");
                }
                return Ok(());
            }
        };

        self.metrics.set_battery(device_id, reading.battery);
        if let Some(celsius) = reading.temperature() {
            self.metrics.set_temperature(device_id, celsius);
        }

        let summary = self.formatter.format(&reading);
        if self.store.apply(device_id, &summary) == Observation::New {
            writeln!(out, "{device_id}: new: {summary}")?;
        }
        Ok(())
    }

    /// Print every changed device and clear its flag.
    pub fn flush(&mut self, out: &mut dyn Write) -> io::Result<()> {
        for (device_id, summary) in self.store.drain_changed() {
            writeln!(out, "{device_id}: {summary}")?;
        }
        out.flush()
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }
}

/// Run the core processing loop until `shutdown` completes or the scanner stops.
///
/// - Each discovery is decoded inline and applied to the state store.
/// - Every `options.flush_interval`, changed devices are written to `out`.
/// - Decode errors are written to `err` only when `options.verbose` is true.
pub async fn run_with_io(
    options: Options,
    scanner: &dyn Scanner,
    metrics: &dyn MetricsSink,
    shutdown: impl Future<Output = ()>,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<(), RunError> {
    let mut discoveries = scanner.start_scan().await?;
    let mut reporter = Reporter::new(metrics, options.verbose);

    let period = options.flush_interval;
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tokio::pin!(shutdown);
    info!("Running");

    loop {
        tokio::select! {
            discovery = discoveries.recv() => match discovery {
                Some(discovery) => reporter.on_discovery(&discovery, out, err)?,
                None => {
                    info!("Scanner stopped");
                    break;
                }
            },
            _ = ticker.tick() => reporter.flush(out)?,
            () = &mut shutdown => {
                info!("Exit on interrupt");
                break;
            }
        }
    }

    Ok(())
}

/// Completes on SIGINT or SIGTERM.
#[cfg(unix)]
pub fn shutdown_signal() -> io::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    })
}

/// Completes on Ctrl-C.
#[cfg(not(unix))]
pub fn shutdown_signal() -> io::Result<impl Future<Output = ()>> {
    Ok(async {
        let _ = tokio::signal::ctrl_c().await;
    })
}
