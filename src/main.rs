use clap::Parser;
use log::{LevelFilter, info};
use sensorbug_listener::app::{Options, RealScanner, RunError, run_with_io, shutdown_signal};
use sensorbug_listener::metrics::{MetricsSink, NoopMetrics, PrometheusMetrics};
use std::io;
use std::panic::{self, PanicHookInfo};

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;

/// Set up the metrics sink and start the exporter unless disabled.
///
/// The returned handle keeps the exporter alive.
#[cfg(feature = "metrics")]
async fn start_metrics(
    options: &Options,
) -> Result<(PrometheusMetrics, Option<sensorbug_listener::metrics::MetricsServerHandle>), RunError>
{
    use std::net::SocketAddr;

    let metrics = PrometheusMetrics::new()?;
    if options.no_metrics {
        return Ok((metrics, None));
    }
    let addr = SocketAddr::from(([0, 0, 0, 0], options.metrics_port));
    let handle = sensorbug_listener::metrics::serve_metrics(addr, metrics.clone()).await?;
    Ok((metrics, Some(handle)))
}

#[cfg(not(feature = "metrics"))]
async fn start_metrics(options: &Options) -> Result<(PrometheusMetrics, Option<()>), RunError> {
    if !options.no_metrics {
        log::warn!("Built without the metrics feature; gauges are not exported");
    }
    Ok((PrometheusMetrics::new()?, None))
}

/// Main application entry point.
///
/// Starts the metrics exporter, then runs the reporter loop with stdout as the
/// report stream until SIGINT/SIGTERM or until the scanner stops.
async fn run(options: Options) -> Result<(), RunError> {
    let (prometheus, _server) = start_metrics(&options).await?;
    let metrics: &dyn MetricsSink = if options.no_metrics {
        &NoopMetrics
    } else {
        &prometheus
    };

    let shutdown = shutdown_signal()?;
    info!("Scanning for SensorBug advertisements");

    let mut out = io::stdout();
    let mut err = io::stderr();
    run_with_io(options, &RealScanner, metrics, shutdown, &mut out, &mut err).await
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set up panic hook to ensure clean exit codes for process managers
    // (e.g., systemd) that monitor exit status
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    pretty_env_logger::formatted_builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let options = Options::parse();

    match run(options).await {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(why) => {
            eprintln!("error: {}", why);
            std::process::exit(EXIT_ERROR);
        }
    }
}
