//! Per-device gauges for SensorBug readings.
//!
//! Every successful decode overwrites the device's battery and temperature
//! gauges, independently of change detection.
//!
//! # Metrics Exposed
//! - `btl_sensorbug_battery_percent{unit="<device id>"}`
//! - `btl_sensorbug_temperature_c{unit="<device id>"}`
//!
//! With the `metrics` feature, [`serve_metrics`] exposes them at `/metrics`.

use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

const NAMESPACE: &str = "btl";
const SUBSYSTEM: &str = "sensorbug";
const DEVICE_LABEL: &str = "unit";

/// Port used by the exporter unless configured otherwise.
pub const DEFAULT_METRICS_PORT: u16 = 9298;

/// Destination for last-value gauges.
pub trait MetricsSink: Send + Sync {
    fn set_battery(&self, device_id: &str, percent: u8);
    fn set_temperature(&self, device_id: &str, celsius: f64);
}

/// Sink that discards everything, used when the exporter is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn set_battery(&self, _device_id: &str, _percent: u8) {}
    fn set_temperature(&self, _device_id: &str, _celsius: f64) {}
}

/// Prometheus-backed gauges.
///
/// Cloning shares the underlying registry and gauges.
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    battery: GaugeVec,
    temperature: GaugeVec,
}

fn gauge_vec(name: &str, help: &str) -> Result<GaugeVec, prometheus::Error> {
    GaugeVec::new(
        Opts::new(name, help)
            .namespace(NAMESPACE)
            .subsystem(SUBSYSTEM),
        &[DEVICE_LABEL],
    )
}

impl PrometheusMetrics {
    /// Create gauges registered with a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let battery = gauge_vec("battery_percent", "Battery level reported by the beacon")?;
        let temperature = gauge_vec("temperature_c", "Air temperature in degrees Celsius")?;

        registry.register(Box::new(battery.clone()))?;
        registry.register(Box::new(temperature.clone()))?;

        Ok(Self {
            registry,
            battery,
            temperature,
        })
    }

    /// Render all gauges in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

impl MetricsSink for PrometheusMetrics {
    fn set_battery(&self, device_id: &str, percent: u8) {
        self.battery
            .with_label_values(&[device_id])
            .set(f64::from(percent));
    }

    fn set_temperature(&self, device_id: &str, celsius: f64) {
        self.temperature
            .with_label_values(&[device_id])
            .set(celsius);
    }
}

#[cfg(feature = "metrics")]
pub use server::{MetricsServerHandle, serve_metrics};

#[cfg(feature = "metrics")]
mod server {
    use super::PrometheusMetrics;
    use hyper::header::{CONTENT_TYPE, HeaderValue};
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Method, Request, Response, Server, StatusCode};
    use log::{error, info};
    use std::convert::Infallible;
    use std::net::SocketAddr;

    /// Keeps the exporter running; dropping it stops the server.
    pub struct MetricsServerHandle {
        local_addr: SocketAddr,
        _shutdown_tx: tokio::sync::oneshot::Sender<()>,
    }

    impl MetricsServerHandle {
        pub fn local_addr(&self) -> SocketAddr {
            self.local_addr
        }
    }

    /// Bind the exporter and serve it in the background.
    ///
    /// Binding happens before this returns, so an unusable port is reported
    /// to the caller as a startup failure.
    pub async fn serve_metrics(
        addr: SocketAddr,
        metrics: PrometheusMetrics,
    ) -> Result<MetricsServerHandle, hyper::Error> {
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let make_service = make_service_fn(move |_conn| {
            let metrics = metrics.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    handle_request(req, metrics.clone())
                }))
            }
        });

        let server = Server::try_bind(&addr)?.serve(make_service);
        let local_addr = server.local_addr();
        let server = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        info!("Serving metrics at http://{local_addr}/metrics");

        tokio::spawn(async move {
            if let Err(e) = server.await {
                error!("Metrics server error: {e}");
            }
        });

        Ok(MetricsServerHandle {
            local_addr,
            _shutdown_tx: shutdown_tx,
        })
    }

    fn response(status: StatusCode, body: impl Into<Body>) -> Response<Body> {
        let mut response = Response::new(body.into());
        *response.status_mut() = status;
        response
    }

    pub(super) async fn handle_request(
        req: Request<Body>,
        metrics: PrometheusMetrics,
    ) -> Result<Response<Body>, Infallible> {
        let response = match (req.method(), req.uri().path()) {
            (&Method::GET, "/metrics") => match metrics.encode() {
                Ok(buffer) => {
                    let mut response = response(StatusCode::OK, buffer);
                    response.headers_mut().insert(
                        CONTENT_TYPE,
                        HeaderValue::from_static(prometheus::TEXT_FORMAT),
                    );
                    response
                }
                Err(e) => {
                    error!("Failed to encode metrics: {e}");
                    response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        format!("Failed to encode metrics: {e}"),
                    )
                }
            },
            (&Method::GET, "/health") => response(StatusCode::OK, "OK"),
            _ => response(StatusCode::NOT_FOUND, "Not Found"),
        };
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(metrics: &PrometheusMetrics) -> String {
        String::from_utf8(metrics.encode().unwrap()).unwrap()
    }

    #[test]
    fn test_gauges_are_labelled_by_device() {
        let metrics = PrometheusMetrics::new().unwrap();
        metrics.set_battery("AA:BB:CC:DD:EE:FF", 50);
        metrics.set_temperature("AA:BB:CC:DD:EE:FF", 25.0);
        metrics.set_battery("11:22:33:44:55:66", 90);

        let text = encoded(&metrics);
        assert!(text.contains("btl_sensorbug_battery_percent{unit=\"AA:BB:CC:DD:EE:FF\"} 50"));
        assert!(text.contains("btl_sensorbug_battery_percent{unit=\"11:22:33:44:55:66\"} 90"));
        assert!(text.contains("btl_sensorbug_temperature_c{unit=\"AA:BB:CC:DD:EE:FF\"} 25"));
    }

    #[test]
    fn test_gauges_keep_last_value() {
        let metrics = PrometheusMetrics::new().unwrap();
        metrics.set_temperature("dev", 25.0);
        metrics.set_temperature("dev", -1.5);

        let value = metrics
            .temperature
            .with_label_values(&["dev"])
            .get();
        assert_eq!(value, -1.5);
    }

    #[test]
    fn test_registering_twice_fails() {
        let registry = Registry::new();
        assert!(PrometheusMetrics::with_registry(registry.clone()).is_ok());
        assert!(PrometheusMetrics::with_registry(registry).is_err());
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_metrics_endpoint() {
        use hyper::{Body, Request, StatusCode};

        let metrics = PrometheusMetrics::new().unwrap();
        metrics.set_battery("dev", 77);

        let req = Request::get("/metrics").body(Body::empty()).unwrap();
        let response = tokio_test::block_on(server::handle_request(req, metrics.clone())).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = tokio_test::block_on(hyper::body::to_bytes(response.into_body())).unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("btl_sensorbug_battery_percent{unit=\"dev\"} 77"));

        let req = Request::get("/nope").body(Body::empty()).unwrap();
        let response = tokio_test::block_on(server::handle_request(req, metrics)).unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
