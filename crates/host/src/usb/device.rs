//! USB device abstraction
//!
//! Wraps `rusb::Device` with a descriptor snapshot taken at registration
//! time, plus the open/claim/close lifecycle used by the sync transfer.

use crate::usb::transfers;
use common::{DeviceId, DeviceInfo, DeviceSpeed, Error, Result};
use rusb::{Context, Device, DeviceDescriptor, DeviceHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// USB device wrapper with cached information
pub struct UsbDevice {
    /// Underlying rusb device
    device: Device<Context>,
    /// Descriptor snapshot taken at registration
    info: DeviceInfo,
    /// Device handle (if opened)
    handle: Option<DeviceHandle<Context>>,
    /// Interface claimed for the current open window
    claimed_interface: Option<u8>,
}

impl UsbDevice {
    /// Create a new USB device wrapper
    ///
    /// Reads the device descriptor and string descriptors once; string
    /// reads need a temporary open and are best-effort.
    pub fn new(device: Device<Context>, id: DeviceId) -> std::result::Result<Self, rusb::Error> {
        let descriptor = device.device_descriptor()?;

        let (manufacturer, product, serial_number) = device
            .open()
            .ok()
            .map(|handle| read_string_descriptors(&descriptor, &handle))
            .unwrap_or((None, None, None));

        let info = DeviceInfo {
            id,
            vendor_id: descriptor.vendor_id(),
            product_id: descriptor.product_id(),
            bus_number: device.bus_number(),
            device_address: device.address(),
            manufacturer,
            product,
            serial_number,
            class: descriptor.class_code(),
            speed: map_device_speed(device.speed()),
        };

        Ok(Self {
            device,
            info,
            handle: None,
            claimed_interface: None,
        })
    }

    /// Get the device ID
    pub fn id(&self) -> DeviceId {
        self.info.id
    }

    /// Get the cached descriptor snapshot
    pub fn device_info(&self) -> DeviceInfo {
        self.info.clone()
    }

    /// Open the device and claim interface 0
    ///
    /// The first interface of the active configuration is claimed
    /// unconditionally; any kernel driver bound to it is detached first.
    /// Failures surface on the transfer-failure path.
    pub fn open(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }

        let handle = self.device.open().map_err(|e| {
            warn!("Failed to open {}: {}", self.info.device_node(), e);
            Error::Transfer(format!("failed to open device: {}", e))
        })?;

        let config = self.device.active_config_descriptor().map_err(|e| {
            warn!(
                "No active configuration on {}: {}",
                self.info.device_node(),
                e
            );
            Error::Transfer(format!("no active configuration: {}", e))
        })?;

        if let Some(interface) = config.interfaces().next() {
            let number = interface.number();

            match handle.kernel_driver_active(number) {
                Ok(true) => {
                    debug!(
                        "Detaching kernel driver from interface {} on {}",
                        number,
                        self.info.device_node()
                    );
                    if let Err(e) = handle.detach_kernel_driver(number) {
                        warn!(
                            "Failed to detach kernel driver from interface {}: {}",
                            number, e
                        );
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    debug!(
                        "Could not check kernel driver status for interface {}: {}",
                        number, e
                    );
                }
            }

            handle.claim_interface(number).map_err(|e| {
                warn!("Failed to claim interface {}: {}", number, e);
                Error::Transfer(format!("failed to claim interface {}: {}", number, e))
            })?;

            debug!(
                "Claimed interface {} on {}",
                number,
                self.info.device_node()
            );
            self.claimed_interface = Some(number);
        }

        self.handle = Some(handle);
        Ok(())
    }

    /// Close the device
    ///
    /// Releases the claimed interface and reattaches the kernel driver so
    /// the device returns to normal kernel control.
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Some(interface) = self.claimed_interface.take() {
                if let Err(e) = handle.release_interface(interface) {
                    warn!("Failed to release interface {}: {}", interface, e);
                }

                if let Err(e) = handle.attach_kernel_driver(interface) {
                    debug!(
                        "Could not reattach kernel driver to interface {} (may not have been detached): {}",
                        interface, e
                    );
                }
            }

            debug!("Closed {}", self.info.device_node());
        }
    }

    /// Run the one-shot sync transfer
    ///
    /// Uses endpoint index 0 of interface index 0 unconditionally; the
    /// endpoint's own direction bit decides read vs. write. The device
    /// must be open.
    pub fn transfer_once(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>> {
        let endpoint = self.first_endpoint_address()?;
        let handle = self
            .handle
            .as_mut()
            .ok_or_else(|| Error::Transfer("device not open".to_string()))?;

        transfers::bulk_once(handle, endpoint, len, timeout)
    }

    /// Address of endpoint index 0 of interface index 0
    fn first_endpoint_address(&self) -> Result<u8> {
        let config = self
            .device
            .active_config_descriptor()
            .map_err(|e| Error::Transfer(format!("no active configuration: {}", e)))?;

        let interface = config
            .interfaces()
            .next()
            .ok_or_else(|| Error::Transfer("device has no interfaces".to_string()))?;

        let descriptor = interface
            .descriptors()
            .next()
            .ok_or_else(|| Error::Transfer("interface 0 has no descriptor".to_string()))?;

        let endpoint = descriptor
            .endpoint_descriptors()
            .next()
            .ok_or_else(|| Error::Transfer("interface 0 has no endpoints".to_string()))?;

        Ok(endpoint.address())
    }
}

/// Read string descriptors from an open handle (best-effort)
fn read_string_descriptors(
    descriptor: &DeviceDescriptor,
    handle: &DeviceHandle<Context>,
) -> (Option<String>, Option<String>, Option<String>) {
    let manufacturer = descriptor
        .manufacturer_string_index()
        .and_then(|idx| handle.read_string_descriptor_ascii(idx).ok());

    let product = descriptor
        .product_string_index()
        .and_then(|idx| handle.read_string_descriptor_ascii(idx).ok());

    let serial_number = descriptor
        .serial_number_string_index()
        .and_then(|idx| handle.read_string_descriptor_ascii(idx).ok());

    (manufacturer, product, serial_number)
}

/// Map rusb device speed to the shared DeviceSpeed
fn map_device_speed(speed: rusb::Speed) -> DeviceSpeed {
    match speed {
        rusb::Speed::Low => DeviceSpeed::Low,
        rusb::Speed::Full => DeviceSpeed::Full,
        rusb::Speed::High => DeviceSpeed::High,
        rusb::Speed::Super => DeviceSpeed::Super,
        rusb::Speed::SuperPlus => DeviceSpeed::SuperPlus,
        _ => DeviceSpeed::Full,
    }
}
