//! # Serial Communication Module
//!
//! Opens the serial port the radio modem hangs off of.
//!
//! This module handles:
//! - Opening the modem port with 8N1 framing at the configured baud rate
//! - The write-side trait abstraction used by the radio link

pub mod port_trait;

pub use port_trait::{SerialPortIO, TokioSerialPort};

use crate::error::{Result, TelemetryError};
use tokio_serial::SerialPortBuilderExt;
use tracing::info;

/// Open the radio modem serial port
///
/// # Arguments
///
/// * `path` - Device path (e.g., "/dev/ttyAMA0")
/// * `baud_rate` - Interface data rate the modem is configured for
///
/// # Errors
///
/// Returns error if the port cannot be opened.
pub fn open(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
    let port = tokio_serial::new(path, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| TelemetryError::Serial(format!("Failed to open {}: {}", path, e)))?;

    info!("Opened radio serial port {} at {} baud", path, baud_rate);
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_with_invalid_path_returns_error() {
        let result = open("/dev/nonexistent_serial_device_12345", 9600);
        assert!(result.is_err());

        match result.unwrap_err() {
            TelemetryError::Serial(msg) => {
                assert!(msg.contains("/dev/nonexistent_serial_device_12345"));
                assert!(msg.contains("Failed to open"));
            }
            other => panic!("Expected Serial error, got: {:?}", other),
        }
    }
}
