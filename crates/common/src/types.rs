//! Device and detection types
//!
//! Types shared between the USB worker thread and the front ends: device
//! descriptor snapshots, the detection outcome, and the sync result.

/// Unique device identifier (worker-assigned)
///
/// Stable for as long as the device stays connected; a re-attached device
/// gets a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(pub u32);

/// USB device speed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSpeed {
    /// Low speed - 1.5 Mbps (USB 1.0)
    Low,
    /// Full speed - 12 Mbps (USB 1.1)
    Full,
    /// High speed - 480 Mbps (USB 2.0)
    High,
    /// SuperSpeed - 5 Gbps (USB 3.0)
    Super,
    /// SuperSpeed+ - 10 Gbps (USB 3.1)
    SuperPlus,
}

impl std::fmt::Display for DeviceSpeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "1.5 Mbps",
            Self::Full => "12 Mbps",
            Self::High => "480 Mbps",
            Self::Super => "5 Gbps",
            Self::SuperPlus => "10 Gbps",
        };
        f.write_str(s)
    }
}

/// Device descriptor snapshot
///
/// Cached when the device is registered so that detection passes and the UI
/// never have to touch the device again just to label it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Worker-assigned device identifier
    pub id: DeviceId,
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// Bus number
    pub bus_number: u8,
    /// Device address on the bus
    pub device_address: u8,
    /// Manufacturer string (if available)
    pub manufacturer: Option<String>,
    /// Product string (if available)
    pub product: Option<String>,
    /// Serial number string (if available)
    pub serial_number: Option<String>,
    /// USB device class
    pub class: u8,
    /// Device speed
    pub speed: DeviceSpeed,
}

impl DeviceInfo {
    /// The usbfs node path for this device
    ///
    /// Used as the human-readable device name in status messages.
    pub fn device_node(&self) -> String {
        format!(
            "/dev/bus/usb/{:03}/{:03}",
            self.bus_number, self.device_address
        )
    }

    /// Short display label: product string if known, else VID:PID
    pub fn label(&self) -> String {
        match &self.product {
            Some(p) => p.clone(),
            None => format!("{:04x}:{:04x}", self.vendor_id, self.product_id),
        }
    }
}

/// Outcome of a detection pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// A device is present and already permitted
    Detected(DeviceInfo),
    /// A device is present but needs an access grant first
    PermissionRequired(DeviceInfo),
    /// The device list is empty
    NoDevice,
}

impl Detection {
    /// Classify a device-list snapshot
    ///
    /// Takes the first device in enumeration order (single-slot tracking is
    /// a deliberate limitation, not an oversight) and splits on the
    /// permission predicate. The list order is whatever the platform
    /// enumerated, which is not guaranteed stable across calls.
    pub fn classify<F>(devices: &[DeviceInfo], permitted: F) -> Detection
    where
        F: Fn(&DeviceInfo) -> bool,
    {
        match devices.first() {
            None => Detection::NoDevice,
            Some(first) if permitted(first) => Detection::Detected(first.clone()),
            Some(first) => Detection::PermissionRequired(first.clone()),
        }
    }
}

/// Result of a successful sync transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Device the transfer ran against
    pub device: DeviceId,
    /// Transferred bytes decoded as text (lossy UTF-8)
    pub text: String,
    /// Number of bytes actually transferred
    pub len: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mock_device_info;

    #[test]
    fn test_device_node_format() {
        let mut info = mock_device_info(1, 0x1234, 0x5678);
        info.bus_number = 1;
        info.device_address = 2;
        assert_eq!(info.device_node(), "/dev/bus/usb/001/002");
    }

    #[test]
    fn test_label_prefers_product_string() {
        let mut info = mock_device_info(1, 0x04f9, 0x1234);
        info.product = Some("Example Printer".to_string());
        assert_eq!(info.label(), "Example Printer");

        info.product = None;
        assert_eq!(info.label(), "04f9:1234");
    }

    #[test]
    fn test_classify_empty_list() {
        assert_eq!(Detection::classify(&[], |_| true), Detection::NoDevice);
        assert_eq!(Detection::classify(&[], |_| false), Detection::NoDevice);
    }

    #[test]
    fn test_classify_first_device_permitted() {
        let devices = vec![
            mock_device_info(1, 0x1111, 0x0001),
            mock_device_info(2, 0x2222, 0x0002),
        ];
        match Detection::classify(&devices, |_| true) {
            Detection::Detected(d) => assert_eq!(d.id, DeviceId(1)),
            other => panic!("expected Detected, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_first_device_unpermitted() {
        // Only the first device is ever considered, even if a later one
        // would pass the permission check.
        let devices = vec![
            mock_device_info(1, 0x1111, 0x0001),
            mock_device_info(2, 0x2222, 0x0002),
        ];
        match Detection::classify(&devices, |d| d.id == DeviceId(2)) {
            Detection::PermissionRequired(d) => assert_eq!(d.id, DeviceId(1)),
            other => panic!("expected PermissionRequired, got {:?}", other),
        }
    }

    #[test]
    fn test_device_speed_display() {
        assert_eq!(DeviceSpeed::High.to_string(), "480 Mbps");
        assert_eq!(DeviceSpeed::SuperPlus.to_string(), "10 Gbps");
    }
}
