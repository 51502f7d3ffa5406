//! Device access grants
//!
//! The broker is the host-side stand-in for a platform permission service:
//! it owns the per-device grant state, queried on every detection pass.
//! Grants live for the process lifetime and are forgotten when the device
//! detaches (bus addresses get reused). Denials are not recorded, so a
//! fresh detection pass prompts again.

use crate::config;
use common::{DeviceId, DeviceInfo};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Permission broker
pub struct PermissionBroker {
    /// Devices granted this session
    granted: HashSet<DeviceId>,
    /// Outstanding requests waiting for an answer
    pending: HashMap<DeviceId, DeviceInfo>,
    /// Devices permitted without prompting (VID:PID patterns from config)
    pre_approved: Vec<String>,
}

impl PermissionBroker {
    pub fn new(pre_approved: Vec<String>) -> Self {
        Self {
            granted: HashSet::new(),
            pending: HashMap::new(),
            pre_approved,
        }
    }

    /// Whether the device may be opened right now
    pub fn has_permission(&self, info: &DeviceInfo) -> bool {
        self.granted.contains(&info.id)
            || config::matches_any(&self.pre_approved, info.vendor_id, info.product_id)
    }

    /// Record an outstanding request
    ///
    /// A repeated request for the same device just refreshes the pending
    /// entry; there is no debouncing.
    pub fn begin_request(&mut self, device: DeviceInfo) {
        debug!("Permission requested for {}", device.device_node());
        self.pending.insert(device.id, device);
    }

    /// Answer an outstanding request
    ///
    /// Returns the device the request was for, or `None` if nothing was
    /// pending under that id (the device may have detached meanwhile).
    /// Only pending requests can be granted.
    pub fn resolve(&mut self, id: DeviceId, granted: bool) -> Option<DeviceInfo> {
        let device = self.pending.remove(&id)?;
        if granted {
            info!("Access granted for {}", device.device_node());
            self.granted.insert(id);
        } else {
            info!("Access denied for {}", device.device_node());
        }
        Some(device)
    }

    /// Drop all state for a detached device
    pub fn forget(&mut self, id: DeviceId) {
        self.granted.remove(&id);
        self.pending.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::mock_device_info;

    #[test]
    fn test_unknown_device_has_no_permission() {
        let broker = PermissionBroker::new(vec![]);
        let device = mock_device_info(1, 0x1234, 0x5678);
        assert!(!broker.has_permission(&device));
    }

    #[test]
    fn test_grant_flow() {
        let mut broker = PermissionBroker::new(vec![]);
        let device = mock_device_info(1, 0x1234, 0x5678);

        broker.begin_request(device.clone());
        let resolved = broker.resolve(device.id, true);

        assert_eq!(resolved, Some(device.clone()));
        assert!(broker.has_permission(&device));

        // Grant persists for the session
        assert!(broker.has_permission(&device));
    }

    #[test]
    fn test_denial_is_not_recorded() {
        let mut broker = PermissionBroker::new(vec![]);
        let device = mock_device_info(1, 0x1234, 0x5678);

        broker.begin_request(device.clone());
        assert_eq!(broker.resolve(device.id, false), Some(device.clone()));
        assert!(!broker.has_permission(&device));

        // The next request prompts again and can be granted
        broker.begin_request(device.clone());
        assert_eq!(broker.resolve(device.id, true), Some(device.clone()));
        assert!(broker.has_permission(&device));
    }

    #[test]
    fn test_resolve_without_pending_request() {
        let mut broker = PermissionBroker::new(vec![]);
        let device = mock_device_info(1, 0x1234, 0x5678);

        // Granting something that was never requested does nothing
        assert_eq!(broker.resolve(device.id, true), None);
        assert!(!broker.has_permission(&device));
    }

    #[test]
    fn test_pre_approved_patterns() {
        let broker = PermissionBroker::new(vec!["0x04f9:*".to_string()]);

        let printer = mock_device_info(1, 0x04f9, 0x2042);
        assert!(broker.has_permission(&printer));

        let other = mock_device_info(2, 0x1234, 0x5678);
        assert!(!broker.has_permission(&other));
    }

    #[test]
    fn test_forget_revokes_grant() {
        let mut broker = PermissionBroker::new(vec![]);
        let device = mock_device_info(1, 0x1234, 0x5678);

        broker.begin_request(device.clone());
        broker.resolve(device.id, true);
        assert!(broker.has_permission(&device));

        broker.forget(device.id);
        assert!(!broker.has_permission(&device));
    }

    #[test]
    fn test_forget_drops_pending_request() {
        let mut broker = PermissionBroker::new(vec![]);
        let device = mock_device_info(1, 0x1234, 0x5678);

        broker.begin_request(device.clone());
        broker.forget(device.id);

        // The request died with the device
        assert_eq!(broker.resolve(device.id, true), None);
    }
}
