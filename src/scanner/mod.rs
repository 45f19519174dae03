//! BLE discovery boundary.
//!
//! Backends discover peripherals and push raw [`Discovery`] events into a
//! bounded channel. Decoding happens on the consumer side, in the reporter.

#[cfg(feature = "bluer")]
pub mod bluer;

use thiserror::Error;
use tokio::sync::mpsc;

/// Depth of the discovery queue.
///
/// Producers wait for space when the queue is full, which throttles bursts of
/// advertisements instead of dropping them.
pub const DISCOVERY_QUEUE_DEPTH: usize = 16;

/// One observed advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    /// Peripheral identifier, stable for the scan session
    pub device_id: String,
    /// Manufacturer data including the leading company id bytes
    pub manufacturer_data: Vec<u8>,
    /// Received signal strength in dBm (not used for decoding)
    pub rssi: Option<i16>,
}

/// Error type for scanner operations.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    /// Backend not available (not compiled in)
    #[allow(dead_code)]
    #[error("Backend '{0}' not available (not compiled in)")]
    BackendNotAvailable(String),
}

/// Create the bounded queue between a scanner backend and the reporter.
pub fn discovery_channel() -> (mpsc::Sender<Discovery>, mpsc::Receiver<Discovery>) {
    mpsc::channel(DISCOVERY_QUEUE_DEPTH)
}

/// Rebuild raw manufacturer data from a company id and its payload.
///
/// BLE stacks usually strip the little-endian company id off the manufacturer
/// data; the SensorBug header starts with it.
pub fn manufacturer_bytes(company_id: u16, payload: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(2 + payload.len());
    data.extend_from_slice(&company_id.to_le_bytes());
    data.extend_from_slice(payload);
    data
}

/// Start scanning with the compiled-in backend.
pub async fn start_scan() -> Result<mpsc::Receiver<Discovery>, ScanError> {
    #[cfg(feature = "bluer")]
    return bluer::start_scan().await;
    #[cfg(not(feature = "bluer"))]
    return Err(ScanError::BackendNotAvailable("bluer".to_string()));
}
