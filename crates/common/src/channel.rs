//! Async channel bridge between Tokio runtime and USB thread

use crate::types::{Detection, DeviceId, DeviceInfo, SyncReport};
use async_channel::{Receiver, Sender, bounded};

/// Commands from Tokio runtime to USB thread
#[derive(Debug)]
pub enum UsbCommand {
    /// List all registered USB devices
    ListDevices {
        /// Channel to send response back
        response: tokio::sync::oneshot::Sender<Vec<DeviceInfo>>,
    },

    /// Run a detection pass over the live device list
    Detect {
        /// Channel to send response back
        response: tokio::sync::oneshot::Sender<Detection>,
    },

    /// Request an access grant for a device (fire-and-forget)
    ///
    /// The grant decision arrives later as a `PermissionResult` event.
    RequestPermission {
        /// Device to request access to
        device: DeviceInfo,
    },

    /// Answer a pending permission request (fire-and-forget)
    ResolvePermission {
        /// Device the answer applies to
        device: DeviceId,
        /// Whether access was granted
        granted: bool,
    },

    /// Run the one-shot sync transfer against a device
    SyncData {
        /// Device to sync with
        device: DeviceId,
        /// Channel to send response back
        response: tokio::sync::oneshot::Sender<crate::Result<SyncReport>>,
    },

    /// Shutdown the USB thread gracefully
    Shutdown,
}

/// USB events from the worker thread
#[derive(Debug, Clone)]
pub enum UsbEvent {
    /// Device hot-plugged (connected)
    DeviceAttached {
        /// Full device information
        device: DeviceInfo,
    },

    /// Device removed
    DeviceDetached {
        /// ID of the removed device
        device: DeviceId,
    },

    /// A permission request is waiting for an answer
    PermissionPrompt {
        /// Device access is being requested for
        device: DeviceInfo,
    },

    /// A permission request was answered
    PermissionResult {
        /// Whether access was granted
        granted: bool,
        /// The device the answer applies to, if it was still known
        device: Option<DeviceInfo>,
    },
}

/// Handle for Tokio runtime (async)
#[derive(Clone)]
pub struct UsbBridge {
    cmd_tx: Sender<UsbCommand>,
    event_rx: Receiver<UsbEvent>,
}

impl UsbBridge {
    /// Send a command to the USB thread
    pub async fn send_command(&self, cmd: UsbCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Receive an event from the USB thread
    pub async fn recv_event(&self) -> crate::Result<UsbEvent> {
        self.event_rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Handle for USB thread (blocking)
pub struct UsbWorker {
    pub(crate) cmd_rx: Receiver<UsbCommand>,
    /// Event sender (public for USB worker thread to access)
    pub event_tx: Sender<UsbEvent>,
}

impl UsbWorker {
    /// Receive a command from Tokio runtime (blocking)
    pub fn recv_command(&self) -> crate::Result<UsbCommand> {
        self.cmd_rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Try to receive a command without blocking
    pub fn try_recv_command(&self) -> Option<UsbCommand> {
        self.cmd_rx.try_recv().ok()
    }

    /// Send an event to Tokio runtime (blocking)
    pub fn send_event(&self, event: UsbEvent) -> crate::Result<()> {
        self.event_tx
            .send_blocking(event)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Create the channel bridge between Tokio and USB thread
///
/// Returns (UsbBridge for Tokio, UsbWorker for USB thread). Both channels
/// are bounded; event delivery preserves arrival order, which is what the
/// watcher's state machine depends on.
pub fn create_usb_bridge() -> (UsbBridge, UsbWorker) {
    let (cmd_tx, cmd_rx) = bounded(64);
    let (event_tx, event_rx) = bounded(64);

    (
        UsbBridge { cmd_tx, event_rx },
        UsbWorker { cmd_rx, event_tx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_bridge() {
        let (bridge, worker) = create_usb_bridge();

        // Spawn a thread to simulate the USB worker
        let handle = std::thread::spawn(move || {
            let cmd = worker.recv_command().unwrap();
            matches!(cmd, UsbCommand::Detect { .. })
        });

        let (tx, _rx) = tokio::sync::oneshot::channel();
        bridge
            .send_command(UsbCommand::Detect { response: tx })
            .await
            .unwrap();

        assert!(handle.join().unwrap());
    }

    #[tokio::test]
    async fn test_event_delivery_order() {
        let (bridge, worker) = create_usb_bridge();

        let first = crate::test_utils::mock_device_info(1, 0x1111, 0x0001);
        worker
            .send_event(UsbEvent::DeviceAttached {
                device: first.clone(),
            })
            .unwrap();
        worker
            .send_event(UsbEvent::DeviceDetached {
                device: DeviceId(1),
            })
            .unwrap();

        match bridge.recv_event().await.unwrap() {
            UsbEvent::DeviceAttached { device } => assert_eq!(device, first),
            other => panic!("expected DeviceAttached, got {:?}", other),
        }
        match bridge.recv_event().await.unwrap() {
            UsbEvent::DeviceDetached { device } => assert_eq!(device, DeviceId(1)),
            other => panic!("expected DeviceDetached, got {:?}", other),
        }
    }
}
