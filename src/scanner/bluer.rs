//! BlueZ D-Bus backend for SensorBug scanning.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.

use super::{Discovery, ScanError, discovery_channel, manufacturer_bytes};
use crate::decoder::{SENSORBUG_COMPANY_ID, SENSORBUG_PREFIX};
use bluer::monitor::{Monitor, MonitorEvent, Pattern};
use bluer::{Address, Device, DeviceEvent, DeviceProperty, Session};
use futures::StreamExt;
use log::debug;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Bluetooth manufacturer-specific data type (AD type 0xFF)
const MANUFACTURER_DATA_TYPE: u8 = 0xff;

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Start scanning for SensorBug devices using the BlueZ D-Bus backend.
///
/// Powers the default adapter and registers a passive advertisement monitor
/// matching the SensorBug prefix. Each found device reports its current data
/// and then every manufacturer data update until it is lost.
pub async fn start_scan() -> Result<mpsc::Receiver<Discovery>, ScanError> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;

    let (tx, rx) = discovery_channel();

    let pattern = Pattern {
        data_type: MANUFACTURER_DATA_TYPE,
        start_position: 0,
        content: SENSORBUG_PREFIX.to_vec(),
    };

    let monitor_manager = adapter.monitor().await?;
    let mut monitor_handle = monitor_manager
        .register(Monitor {
            patterns: Some(vec![pattern]),
            ..Default::default()
        })
        .await?;

    // Spawn a task that owns all Bluetooth state and runs the event loop
    tokio::spawn(async move {
        // Keep all Bluetooth state alive by moving it into this task
        let _session = session;
        let _monitor_manager = monitor_manager;
        let mut watchers: HashMap<Address, JoinHandle<()>> = HashMap::new();

        while let Some(event) = monitor_handle.next().await {
            if let MonitorEvent::DeviceFound(id) = event {
                let device = match adapter.device(id.device) {
                    Ok(device) => device,
                    Err(e) => {
                        debug!("{}: {e}", id.device);
                        continue;
                    }
                };
                if let Err(e) = report_current(&device, &tx).await {
                    debug!("{}: {e}", id.device);
                }
                watchers
                    .entry(id.device)
                    .or_insert_with(|| tokio::spawn(watch_device(device, tx.clone())));
            } else if let MonitorEvent::DeviceLost(id) = event
                && let Some(watcher) = watchers.remove(&id.device)
            {
                watcher.abort();
            }

            if tx.is_closed() {
                break;
            }
        }

        for watcher in watchers.into_values() {
            watcher.abort();
        }
    });

    Ok(rx)
}

/// Build a discovery from the SensorBug entry of a manufacturer data map.
fn discovery(
    address: Address,
    data: &HashMap<u16, Vec<u8>>,
    rssi: Option<i16>,
) -> Option<Discovery> {
    let payload = data.get(&SENSORBUG_COMPANY_ID)?;
    Some(Discovery {
        device_id: address.to_string(),
        manufacturer_data: manufacturer_bytes(SENSORBUG_COMPANY_ID, payload),
        rssi,
    })
}

/// Send the manufacturer data the device currently advertises, if any.
async fn report_current(device: &Device, tx: &mpsc::Sender<Discovery>) -> Result<(), ScanError> {
    let Some(data) = device.manufacturer_data().await? else {
        return Ok(());
    };
    let rssi = device.rssi().await?;

    if let Some(discovery) = discovery(device.address(), &data, rssi) {
        // Waits while the queue is full
        let _ = tx.send(discovery).await;
    }
    Ok(())
}

/// Forward manufacturer data updates of one device until its events end.
async fn watch_device(device: Device, tx: mpsc::Sender<Discovery>) {
    let events = match device.events().await {
        Ok(events) => events,
        Err(e) => {
            debug!("{}: {e}", device.address());
            return;
        }
    };
    let mut events = std::pin::pin!(events);

    while let Some(event) = events.next().await {
        if let DeviceEvent::PropertyChanged(DeviceProperty::ManufacturerData(data)) = event {
            let rssi = device.rssi().await.ok().flatten();
            if let Some(discovery) = discovery(device.address(), &data, rssi)
                && tx.send(discovery).await.is_err()
            {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::test_utils::TEST_DEVICE;

    const ADDRESS: Address = Address([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

    #[test]
    fn test_discovery_from_sensorbug_entry() {
        let mut data = HashMap::new();
        data.insert(0x0059, vec![0x01, 0x02]);
        data.insert(SENSORBUG_COMPANY_ID, vec![0x02, 0x00, 0x3c, 0x32, 0x00, 0x43, 0x90, 0x01]);

        let discovery = discovery(ADDRESS, &data, Some(-70)).unwrap();
        assert_eq!(discovery.device_id, TEST_DEVICE);
        assert!(discovery.manufacturer_data.starts_with(&SENSORBUG_PREFIX));
        assert_eq!(discovery.manufacturer_data.len(), 10);
        assert_eq!(discovery.rssi, Some(-70));
    }

    #[test]
    fn test_discovery_without_sensorbug_entry() {
        let mut data = HashMap::new();
        data.insert(0x0059, vec![0x02, 0x00, 0x3c, 0x32, 0x00]);

        assert_eq!(discovery(ADDRESS, &data, None), None);
        assert_eq!(discovery(ADDRESS, &HashMap::new(), None), None);
    }
}
