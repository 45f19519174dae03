use crate::decoder::SENSORBUG_PREFIX;

/// A stable device identifier for unit tests.
pub const TEST_DEVICE: &str = "AA:BB:CC:DD:EE:FF";

/// Build SensorBug manufacturer data with the given battery level and records.
pub fn payload(battery: u8, records: &[u8]) -> Vec<u8> {
    let mut data = SENSORBUG_PREFIX.to_vec();
    data.push(battery);
    data.push(0x00);
    data.extend_from_slice(records);
    data
}
