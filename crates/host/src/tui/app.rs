//! TUI application state
//!
//! Holds the watcher, the pending permission prompt, and the last sync
//! result, and coordinates user actions with the USB subsystem.

use crate::watcher::{DeviceWatcher, WatcherAction};
use anyhow::{Context, Result};
use common::{DeviceInfo, SyncReport, UsbBridge, UsbCommand, UsbEvent};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::events::Action;

/// Outcome of the most recent sync attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LastSync {
    /// No sync attempted yet
    Idle,
    /// Last sync succeeded
    Transferred {
        /// Transferred bytes decoded as text
        text: String,
        /// Number of bytes transferred
        len: usize,
    },
    /// Last sync failed
    Failed,
}

/// Application state
pub struct App {
    /// Connection state machine
    watcher: DeviceWatcher,
    /// Permission prompt currently shown, if any
    prompt: Option<DeviceInfo>,
    /// Result of the most recent sync
    last_sync: LastSync,
    /// A sync is running on the worker thread
    sync_in_flight: bool,
    /// Whether the app should quit
    should_quit: bool,
    /// App start time (for uptime display)
    start_time: Instant,
    /// USB bridge for communication with the USB subsystem
    usb_bridge: UsbBridge,
    /// Where spawned sync waiters deliver their result
    sync_tx: mpsc::UnboundedSender<common::Result<SyncReport>>,
}

impl App {
    /// Create a new application instance
    pub fn new(
        usb_bridge: UsbBridge,
        sync_tx: mpsc::UnboundedSender<common::Result<SyncReport>>,
    ) -> Self {
        Self {
            watcher: DeviceWatcher::new(),
            prompt: None,
            last_sync: LastSync::Idle,
            sync_in_flight: false,
            should_quit: false,
            start_time: Instant::now(),
            usb_bridge,
            sync_tx,
        }
    }

    /// Connection state machine
    pub fn watcher(&self) -> &DeviceWatcher {
        &self.watcher
    }

    /// Permission prompt currently shown, if any
    pub fn prompt(&self) -> Option<&DeviceInfo> {
        self.prompt.as_ref()
    }

    /// Result of the most recent sync
    pub fn last_sync(&self) -> &LastSync {
        &self.last_sync
    }

    /// Whether a sync is running
    pub fn sync_in_flight(&self) -> bool {
        self.sync_in_flight
    }

    /// App uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Check if app should quit
    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Handle a user action
    pub async fn handle_action(&mut self, action: Action) -> Result<()> {
        match action {
            Action::Quit => {
                self.should_quit = true;
            }
            Action::CloseDialog => {
                // Dismissing leaves the request unanswered; the next
                // detection pass prompts again.
                if self.prompt.take().is_some() {
                    debug!("Permission prompt dismissed");
                }
            }
            Action::Detect => {
                self.run_detection().await?;
            }
            Action::Sync => {
                self.start_sync().await?;
            }
            Action::Grant => {
                self.answer_prompt(true).await?;
            }
            Action::Deny => {
                self.answer_prompt(false).await?;
            }
            Action::None => {}
        }

        Ok(())
    }

    /// Process a USB event
    pub async fn handle_usb_event(&mut self, event: UsbEvent) -> Result<()> {
        match event {
            UsbEvent::DeviceAttached { device } => {
                info!("Device attached: {}", device.device_node());
                // An attach notification triggers a fresh detection pass
                self.run_detection().await?;
            }
            UsbEvent::DeviceDetached { device } => {
                info!("Device detached: {:?}", device);
                if self.prompt.as_ref().map(|p| p.id) == Some(device) {
                    self.prompt = None;
                }
                self.watcher.on_detached();
            }
            UsbEvent::PermissionPrompt { device } => {
                self.prompt = Some(device);
            }
            UsbEvent::PermissionResult { granted, device } => {
                self.prompt = None;
                self.watcher.on_permission_result(granted, device);
            }
        }

        Ok(())
    }

    /// Record a finished sync
    pub fn apply_sync_result(&mut self, result: common::Result<SyncReport>) {
        self.sync_in_flight = false;
        match result {
            Ok(report) => {
                info!("Data transferred: {} bytes", report.len);
                self.last_sync = LastSync::Transferred {
                    text: report.text,
                    len: report.len,
                };
            }
            Err(e) => {
                warn!("Sync failed: {}", e);
                self.last_sync = LastSync::Failed;
            }
        }
    }

    /// Run a detection pass and apply the outcome
    async fn run_detection(&mut self) -> Result<()> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.usb_bridge
            .send_command(UsbCommand::Detect { response: tx })
            .await
            .context("Failed to send Detect command")?;

        let detection = rx.await.context("Failed to receive detection result")?;

        if let Some(WatcherAction::RequestPermission(device)) =
            self.watcher.on_detection(detection)
        {
            self.usb_bridge
                .send_command(UsbCommand::RequestPermission { device })
                .await
                .context("Failed to send RequestPermission command")?;
        }

        Ok(())
    }

    /// Kick off a sync against the held device
    ///
    /// The transfer blocks the worker thread, not us: a spawned task waits
    /// for the response and feeds it back through the sync channel.
    async fn start_sync(&mut self) -> Result<()> {
        if !self.watcher.sync_visible() || self.sync_in_flight {
            return Ok(());
        }
        let Some(device) = self.watcher.device() else {
            return Ok(());
        };
        let id = device.id;

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.usb_bridge
            .send_command(UsbCommand::SyncData {
                device: id,
                response: tx,
            })
            .await
            .context("Failed to send SyncData command")?;

        self.sync_in_flight = true;

        let sync_tx = self.sync_tx.clone();
        tokio::spawn(async move {
            let result = match rx.await {
                Ok(result) => result,
                Err(_) => Err(common::Error::Channel(
                    "sync response channel closed".to_string(),
                )),
            };
            let _ = sync_tx.send(result);
        });

        Ok(())
    }

    /// Answer the open permission prompt
    async fn answer_prompt(&mut self, granted: bool) -> Result<()> {
        let Some(device) = self.prompt.take() else {
            return Ok(());
        };

        self.usb_bridge
            .send_command(UsbCommand::ResolvePermission {
                device: device.id,
                granted,
            })
            .await
            .context("Failed to send ResolvePermission command")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::Status;
    use common::test_utils::mock_device_info;
    use common::{DeviceId, create_usb_bridge};

    fn make_app() -> (App, common::UsbWorker) {
        let (bridge, worker) = create_usb_bridge();
        let (sync_tx, _sync_rx) = mpsc::unbounded_channel();
        (App::new(bridge, sync_tx), worker)
    }

    #[tokio::test]
    async fn test_prompt_lifecycle() {
        let (mut app, _worker) = make_app();
        let device = mock_device_info(1, 0x1234, 0x5678);

        app.handle_usb_event(UsbEvent::PermissionPrompt {
            device: device.clone(),
        })
        .await
        .unwrap();
        assert_eq!(app.prompt(), Some(&device));

        // Esc dismisses without answering
        app.handle_action(Action::CloseDialog).await.unwrap();
        assert!(app.prompt().is_none());
    }

    #[tokio::test]
    async fn test_detach_clears_prompt_for_that_device() {
        let (mut app, _worker) = make_app();
        let device = mock_device_info(1, 0x1234, 0x5678);

        app.handle_usb_event(UsbEvent::PermissionPrompt {
            device: device.clone(),
        })
        .await
        .unwrap();

        app.handle_usb_event(UsbEvent::DeviceDetached {
            device: DeviceId(1),
        })
        .await
        .unwrap();

        assert!(app.prompt().is_none());
        assert_eq!(*app.watcher().status(), Status::Disconnected);
    }

    #[tokio::test]
    async fn test_permission_result_updates_watcher() {
        let (mut app, _worker) = make_app();
        let device = mock_device_info(1, 0x1234, 0x5678);

        app.handle_usb_event(UsbEvent::PermissionResult {
            granted: true,
            device: Some(device.clone()),
        })
        .await
        .unwrap();

        assert_eq!(*app.watcher().status(), Status::PermissionGranted);
        assert_eq!(app.watcher().device(), Some(&device));
        assert!(app.watcher().sync_visible());
    }

    #[tokio::test]
    async fn test_apply_sync_result() {
        let (mut app, _worker) = make_app();

        app.apply_sync_result(Ok(SyncReport {
            device: DeviceId(1),
            text: "hello".to_string(),
            len: 5,
        }));
        assert_eq!(
            *app.last_sync(),
            LastSync::Transferred {
                text: "hello".to_string(),
                len: 5
            }
        );
        assert!(!app.sync_in_flight());

        app.apply_sync_result(Err(common::Error::Transfer("timed out".to_string())));
        assert_eq!(*app.last_sync(), LastSync::Failed);
    }

    #[tokio::test]
    async fn test_sync_not_started_without_device() {
        let (mut app, _worker) = make_app();

        // No device held: the action is a no-op
        app.handle_action(Action::Sync).await.unwrap();
        assert!(!app.sync_in_flight());
    }

    #[tokio::test]
    async fn test_quit_action() {
        let (mut app, _worker) = make_app();
        assert!(!app.should_quit());

        app.handle_action(Action::Quit).await.unwrap();
        assert!(app.should_quit());
    }
}
