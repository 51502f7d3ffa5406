//! Device watcher state machine
//!
//! Reacts to attach/detach notifications, detection outcomes, and
//! permission results, maintaining the user-visible status, the single
//! held device slot, and the visibility of the sync action.
//!
//! Tracking is deliberately single-slot: only the first enumerated device
//! is ever considered. There are no retries and no debouncing; a denied
//! permission stays denied until the next attach/detect cycle re-prompts.

use common::{Detection, DeviceInfo};

/// User-visible connection status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// No device present
    NoDevice,
    /// Device present and permitted; carries the device node path
    Connected(String),
    /// Device present, waiting for an access grant
    PermissionRequired,
    /// Access grant arrived
    PermissionGranted,
    /// Access grant refused
    PermissionDenied,
    /// Device was unplugged
    Disconnected,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoDevice => write!(f, "No USB Device Connected"),
            Self::Connected(node) => write!(f, "USB Device Connected: {}", node),
            Self::PermissionRequired => write!(f, "USB Permission Required"),
            Self::PermissionGranted => write!(f, "USB Permission Granted"),
            Self::PermissionDenied => write!(f, "USB Permission Denied"),
            Self::Disconnected => write!(f, "USB Device Disconnected"),
        }
    }
}

/// Follow-up the caller must perform after a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherAction {
    /// Issue a permission request for the device
    RequestPermission(DeviceInfo),
}

/// Device watcher
///
/// Pure state; all I/O (issuing detection, sending permission requests)
/// stays with the caller so the transitions can be tested without a bus.
pub struct DeviceWatcher {
    status: Status,
    device: Option<DeviceInfo>,
    sync_visible: bool,
}

impl Default for DeviceWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceWatcher {
    pub fn new() -> Self {
        Self {
            status: Status::NoDevice,
            device: None,
            sync_visible: false,
        }
    }

    /// Current status
    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Currently held device, if connected
    pub fn device(&self) -> Option<&DeviceInfo> {
        self.device.as_ref()
    }

    /// Whether the sync action should be offered
    pub fn sync_visible(&self) -> bool {
        self.sync_visible
    }

    /// Apply a detection outcome
    ///
    /// Returns the follow-up action the caller must issue, if any. An
    /// unpermitted device does not land in the held slot; it is only held
    /// once the grant arrives.
    pub fn on_detection(&mut self, detection: Detection) -> Option<WatcherAction> {
        match detection {
            Detection::Detected(device) => {
                self.status = Status::Connected(device.device_node());
                self.device = Some(device);
                self.sync_visible = true;
                None
            }
            Detection::PermissionRequired(device) => {
                self.status = Status::PermissionRequired;
                self.device = None;
                self.sync_visible = false;
                Some(WatcherAction::RequestPermission(device))
            }
            Detection::NoDevice => {
                self.status = Status::NoDevice;
                self.device = None;
                self.sync_visible = false;
                None
            }
        }
    }

    /// Apply a detach notification
    ///
    /// Clears the held device and hides the sync action regardless of the
    /// prior state.
    pub fn on_detached(&mut self) {
        self.status = Status::Disconnected;
        self.device = None;
        self.sync_visible = false;
    }

    /// Apply a permission result
    ///
    /// A grant without a device (the request outlived the device) counts
    /// as a denial.
    pub fn on_permission_result(&mut self, granted: bool, device: Option<DeviceInfo>) {
        match device {
            Some(device) if granted => {
                self.status = Status::PermissionGranted;
                self.device = Some(device);
                self.sync_visible = true;
            }
            _ => {
                self.status = Status::PermissionDenied;
                self.device = None;
                self.sync_visible = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::mock_device_info;

    #[test]
    fn test_initial_state() {
        let watcher = DeviceWatcher::new();
        assert_eq!(*watcher.status(), Status::NoDevice);
        assert!(watcher.device().is_none());
        assert!(!watcher.sync_visible());
    }

    #[test]
    fn test_detection_no_device() {
        let mut watcher = DeviceWatcher::new();
        let action = watcher.on_detection(Detection::NoDevice);

        assert!(action.is_none());
        assert_eq!(*watcher.status(), Status::NoDevice);
        assert!(watcher.device().is_none());
        assert!(!watcher.sync_visible());
    }

    #[test]
    fn test_detection_permitted_device() {
        let mut watcher = DeviceWatcher::new();
        let device = mock_device_info(1, 0x1234, 0x5678);

        let action = watcher.on_detection(Detection::Detected(device.clone()));

        assert!(action.is_none());
        assert_eq!(
            *watcher.status(),
            Status::Connected(device.device_node())
        );
        assert_eq!(watcher.device(), Some(&device));
        assert!(watcher.sync_visible());
    }

    #[test]
    fn test_detection_unpermitted_device_requests_permission() {
        let mut watcher = DeviceWatcher::new();
        let device = mock_device_info(1, 0x1234, 0x5678);

        let action = watcher.on_detection(Detection::PermissionRequired(device.clone()));

        // The same device must flow into the permission request
        assert_eq!(action, Some(WatcherAction::RequestPermission(device)));
        assert_eq!(*watcher.status(), Status::PermissionRequired);
        assert!(watcher.device().is_none());
        assert!(!watcher.sync_visible());
    }

    #[test]
    fn test_grant_with_device_connects() {
        let mut watcher = DeviceWatcher::new();
        let device = mock_device_info(1, 0x1234, 0x5678);
        watcher.on_detection(Detection::PermissionRequired(device.clone()));

        watcher.on_permission_result(true, Some(device.clone()));

        assert_eq!(*watcher.status(), Status::PermissionGranted);
        assert_eq!(watcher.device(), Some(&device));
        assert!(watcher.sync_visible());
    }

    #[test]
    fn test_deny_leaves_no_device_held() {
        let mut watcher = DeviceWatcher::new();
        let device = mock_device_info(1, 0x1234, 0x5678);
        watcher.on_detection(Detection::PermissionRequired(device.clone()));

        watcher.on_permission_result(false, Some(device));

        assert_eq!(*watcher.status(), Status::PermissionDenied);
        assert!(watcher.device().is_none());
        assert!(!watcher.sync_visible());
    }

    #[test]
    fn test_grant_without_device_counts_as_denial() {
        let mut watcher = DeviceWatcher::new();
        watcher.on_permission_result(true, None);

        assert_eq!(*watcher.status(), Status::PermissionDenied);
        assert!(watcher.device().is_none());
        assert!(!watcher.sync_visible());
    }

    #[test]
    fn test_detach_clears_from_connected() {
        let mut watcher = DeviceWatcher::new();
        let device = mock_device_info(1, 0x1234, 0x5678);
        watcher.on_detection(Detection::Detected(device));
        assert!(watcher.sync_visible());

        watcher.on_detached();

        assert_eq!(*watcher.status(), Status::Disconnected);
        assert!(watcher.device().is_none());
        assert!(!watcher.sync_visible());
    }

    #[test]
    fn test_detach_clears_from_any_state() {
        // Detach must clear regardless of prior state
        let device = mock_device_info(1, 0x1234, 0x5678);

        for prime in [
            None,
            Some(Detection::NoDevice),
            Some(Detection::Detected(device.clone())),
            Some(Detection::PermissionRequired(device.clone())),
        ] {
            let mut watcher = DeviceWatcher::new();
            if let Some(detection) = prime {
                watcher.on_detection(detection);
            }

            watcher.on_detached();

            assert_eq!(*watcher.status(), Status::Disconnected);
            assert!(watcher.device().is_none());
            assert!(!watcher.sync_visible());
        }
    }

    #[test]
    fn test_denied_until_next_detection_cycle() {
        let mut watcher = DeviceWatcher::new();
        let device = mock_device_info(1, 0x1234, 0x5678);

        watcher.on_detection(Detection::PermissionRequired(device.clone()));
        watcher.on_permission_result(false, Some(device.clone()));
        assert_eq!(*watcher.status(), Status::PermissionDenied);

        // A fresh detection pass re-prompts
        let action = watcher.on_detection(Detection::PermissionRequired(device.clone()));
        assert_eq!(action, Some(WatcherAction::RequestPermission(device)));
        assert_eq!(*watcher.status(), Status::PermissionRequired);
    }

    #[test]
    fn test_status_display_strings() {
        assert_eq!(Status::NoDevice.to_string(), "No USB Device Connected");
        assert_eq!(
            Status::Connected("/dev/bus/usb/001/002".to_string()).to_string(),
            "USB Device Connected: /dev/bus/usb/001/002"
        );
        assert_eq!(
            Status::PermissionRequired.to_string(),
            "USB Permission Required"
        );
        assert_eq!(
            Status::PermissionGranted.to_string(),
            "USB Permission Granted"
        );
        assert_eq!(Status::PermissionDenied.to_string(), "USB Permission Denied");
        assert_eq!(Status::Disconnected.to_string(), "USB Device Disconnected");
    }

    #[test]
    fn test_full_grant_scenario() {
        // Attach of an unpermitted device, then a grant: ends connected
        // with the sync action offered.
        let mut watcher = DeviceWatcher::new();
        let device = mock_device_info(1, 0x1234, 0x5678);

        let action = watcher.on_detection(Detection::PermissionRequired(device.clone()));
        assert_eq!(
            action,
            Some(WatcherAction::RequestPermission(device.clone()))
        );

        watcher.on_permission_result(true, Some(device.clone()));
        assert_eq!(watcher.status().to_string(), "USB Permission Granted");
        assert_eq!(watcher.device(), Some(&device));
        assert!(watcher.sync_visible());
    }
}
