//! Shared test helpers
//!
//! Mock device construction used by unit tests here and by the host crate's
//! integration tests (the host is a binary-only crate, so its tests lean on
//! this crate's public surface).

use crate::types::{DeviceId, DeviceInfo, DeviceSpeed};
use std::time::Duration;

/// Default timeout for async test operations
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Build a mock `DeviceInfo` with the given id and VID/PID
pub fn mock_device_info(id: u32, vendor_id: u16, product_id: u16) -> DeviceInfo {
    DeviceInfo {
        id: DeviceId(id),
        vendor_id,
        product_id,
        bus_number: 1,
        device_address: id as u8,
        manufacturer: None,
        product: None,
        serial_number: None,
        class: 0,
        speed: DeviceSpeed::High,
    }
}

/// Build a list of `n` mock devices with sequential ids
pub fn mock_device_list(n: u32) -> Vec<DeviceInfo> {
    (1..=n)
        .map(|i| mock_device_info(i, 0x1000 + i as u16, 0x0001))
        .collect()
}
