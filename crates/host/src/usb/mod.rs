//! USB subsystem
//!
//! Manages device enumeration, hot-plug detection, the permission broker,
//! and the one-shot sync transfer.
//!
//! Everything libusb runs in a dedicated worker thread so the blocking
//! transfer can never stall the UI or the event loop; the Tokio side talks
//! to it through the channel bridge in `common`.

pub mod device;
pub mod manager;
pub mod transfers;
pub mod worker;

pub use manager::DeviceManager;
pub use worker::spawn_usb_worker;
