//! Common utilities for usb-sync
//!
//! This crate provides the functionality shared between the USB worker
//! thread and the front ends (TUI and headless service): device and
//! detection types, error handling, logging setup, and the async channel
//! bridge for USB thread communication.

pub mod channel;
pub mod error;
pub mod logging;
pub mod test_utils;
pub mod types;

pub use channel::{UsbBridge, UsbCommand, UsbEvent, UsbWorker, create_usb_bridge};
pub use error::{Error, Result};
pub use logging::setup_logging;
pub use types::{Detection, DeviceId, DeviceInfo, DeviceSpeed, SyncReport};
