//! Sync transfer execution
//!
//! The sync operation is a single bounded bulk transfer with a fixed
//! timeout. There is no chunking, no partial-transfer accumulation, and no
//! retry; every libusb error collapses into the one coarse transfer error
//! the UI shows, with the underlying cause preserved in the log.

use common::{Error, Result};
use rusb::{Context, DeviceHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Execute a single bounded bulk transfer
///
/// The endpoint's direction bit decides read vs. write; rusb's typed API
/// forces that dispatch even though the transfer is otherwise blind to the
/// endpoint's capabilities. Returns the transferred bytes (for a write,
/// the transferred prefix of the zero-filled buffer).
pub fn bulk_once(
    handle: &mut DeviceHandle<Context>,
    endpoint: u8,
    len: usize,
    timeout: Duration,
) -> Result<Vec<u8>> {
    let is_in = (endpoint & 0x80) != 0;

    debug!(
        "Bulk transfer: endpoint={:#04x}, len={}, timeout={}ms, is_in={}",
        endpoint,
        len,
        timeout.as_millis(),
        is_in
    );

    let result = if is_in {
        let mut buffer = vec![0u8; len];
        handle.read_bulk(endpoint, &mut buffer, timeout).map(|n| {
            buffer.truncate(n);
            buffer
        })
    } else {
        let buffer = vec![0u8; len];
        handle
            .write_bulk(endpoint, &buffer, timeout)
            .map(|n| buffer[..n.min(len)].to_vec())
    };

    match result {
        Ok(data) => {
            debug!("Bulk transfer succeeded: {} bytes", data.len());
            Ok(data)
        }
        Err(e) => {
            warn!("Bulk transfer failed on endpoint {:#04x}: {}", endpoint, e);
            Err(Error::Transfer(e.to_string()))
        }
    }
}

/// Decode transferred bytes as text
///
/// Lossy UTF-8: invalid sequences become replacement characters rather
/// than failing the sync.
pub fn decode_payload(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_payload_utf8() {
        assert_eq!(decode_payload(b"hello"), "hello");
        assert_eq!(decode_payload(b""), "");
    }

    #[test]
    fn test_decode_payload_lossy() {
        // Invalid UTF-8 is replaced, never an error
        let decoded = decode_payload(&[0x68, 0x69, 0xFF]);
        assert!(decoded.starts_with("hi"));
        assert!(decoded.contains('\u{FFFD}'));
    }

    #[test]
    fn test_endpoint_direction_bit() {
        // Bit 7 = 1 means IN endpoint
        let endpoint_in = 0x81;
        assert!((endpoint_in & 0x80) != 0);

        // Bit 7 = 0 means OUT endpoint
        let endpoint_out = 0x01;
        assert!((endpoint_out & 0x80) == 0);
    }
}
