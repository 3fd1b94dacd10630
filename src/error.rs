//! # Error Types
//!
//! Custom error types for the telemetry bridge using `thiserror`.

use thiserror::Error;

/// Main error type for the telemetry bridge
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Socket or serial I/O failures; recoverable, loops log and continue
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Malformed frame, bad checksum, unknown message id; message is dropped
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Decode ran out of bytes before the selected fields were read
    #[error("truncated buffer: needed {needed} bytes, {remaining} remaining")]
    TruncatedBuffer { needed: usize, remaining: usize },

    /// Operation invalid for the current radio link state
    #[error("invalid link state: {0}")]
    InvalidLinkState(String),

    /// Scheduler frequency must be positive and finite
    #[error("invalid frequency: {0} Hz")]
    InvalidFrequency(f64),

    /// Setup-time configuration errors; abort startup
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file parse errors
    #[error("configuration file error: {0}")]
    ConfigFile(#[from] toml::de::Error),

    /// Serial port open/configure failures
    #[error("serial error: {0}")]
    Serial(String),
}

/// Result type alias for the telemetry bridge
pub type Result<T> = std::result::Result<T, TelemetryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: TelemetryError = io.into();
        assert!(matches!(err, TelemetryError::Transport(_)));
        assert!(err.to_string().contains("transport error"));
    }

    #[test]
    fn test_truncated_buffer_message() {
        let err = TelemetryError::TruncatedBuffer {
            needed: 8,
            remaining: 3,
        };
        assert_eq!(
            err.to_string(),
            "truncated buffer: needed 8 bytes, 3 remaining"
        );
    }

    #[test]
    fn test_invalid_frequency_message() {
        let err = TelemetryError::InvalidFrequency(0.0);
        assert_eq!(err.to_string(), "invalid frequency: 0 Hz");
    }
}
