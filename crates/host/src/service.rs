//! Systemd service integration
//!
//! Minimal sd-notify support for headless mode: readiness, shutdown, and
//! status notifications. Every function is a no-op when not running under
//! systemd with `Type=notify`.

use anyhow::{Context, Result};
use std::env;
use std::os::unix::net::UnixDatagram;
use tracing::debug;

/// Send a raw sd-notify message to the socket systemd handed us
fn sd_notify(message: &str) -> Result<()> {
    let Ok(socket_path) = env::var("NOTIFY_SOCKET") else {
        debug!("NOTIFY_SOCKET not set, skipping systemd notification");
        return Ok(());
    };

    let socket = UnixDatagram::unbound().context("Failed to create Unix socket")?;
    socket
        .send_to(message.as_bytes(), &socket_path)
        .with_context(|| format!("Failed to send '{}' notification to systemd", message))?;

    Ok(())
}

/// Notify systemd that the service finished initialization
pub fn notify_ready() -> Result<()> {
    sd_notify("READY=1")
}

/// Notify systemd that the service is beginning shutdown
pub fn notify_stopping() -> Result<()> {
    sd_notify("STOPPING=1")
}

/// Publish a status line, visible in `systemctl status` output
pub fn notify_status(status: &str) -> Result<()> {
    sd_notify(&format!("STATUS={}", status))
}

/// Check if running under systemd
pub fn is_systemd() -> bool {
    env::var("NOTIFY_SOCKET").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_systemd_without_socket() {
        unsafe {
            env::remove_var("NOTIFY_SOCKET");
        }
        assert!(!is_systemd());
    }

    #[test]
    fn test_notify_functions_without_socket() {
        // Without NOTIFY_SOCKET the notifications succeed but do nothing
        unsafe {
            env::remove_var("NOTIFY_SOCKET");
        }

        assert!(notify_ready().is_ok());
        assert!(notify_stopping().is_ok());
        assert!(notify_status("USB Device Connected").is_ok());
    }
}
