//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{Result, TelemetryError};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub radio: RadioConfig,

    #[serde(default)]
    pub devices: DevicesConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// UDP console protocol configuration
#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    /// Address the vehicle-side responder binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Rate at which a console client polls for sensor data
    #[serde(default = "default_request_rate_hz")]
    pub request_rate_hz: f64,
}

/// Serial radio link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RadioConfig {
    #[serde(default = "default_radio_port")]
    pub port: String,

    #[serde(default = "default_radio_baud")]
    pub baud_rate: u32,

    /// Snapshot transmission rate over the radio link
    #[serde(default = "default_transmit_rate_hz")]
    pub transmit_rate_hz: f64,

    /// Watchdog countdown; the transmitter is resumed when no packet is
    /// received for this long
    #[serde(default = "default_watchdog_timeout_s")]
    pub watchdog_timeout_s: u64,
}

/// Acquisition device configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DevicesConfig {
    /// Target analog sampling rate each ADC loop converges to
    #[serde(default = "default_analog_target_hz")]
    pub analog_target_hz: u64,

    /// CPU temperature pseudo-file sampled by the status monitor
    #[serde(default = "default_thermal_zone")]
    pub thermal_zone: String,
}

/// Channel log configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Every log stream is duplicated into each of these directories
    #[serde(default = "default_log_dirs")]
    pub log_dirs: Vec<String>,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:4444".to_string()
}
fn default_request_rate_hz() -> f64 {
    10.0
}

fn default_radio_port() -> String {
    "/dev/ttyAMA0".to_string()
}
fn default_radio_baud() -> u32 {
    9600
}
fn default_transmit_rate_hz() -> f64 {
    5.0
}
fn default_watchdog_timeout_s() -> u64 {
    30
}

fn default_analog_target_hz() -> u64 {
    100
}
fn default_thermal_zone() -> String {
    "/sys/class/thermal/thermal_zone0/temp".to_string()
}

fn default_log_dirs() -> Vec<String> {
    vec!["./logs".to_string()]
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            request_rate_hz: default_request_rate_hz(),
        }
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            port: default_radio_port(),
            baud_rate: default_radio_baud(),
            transmit_rate_hz: default_transmit_rate_hz(),
            watchdog_timeout_s: default_watchdog_timeout_s(),
        }
    }
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            analog_target_hz: default_analog_target_hz(),
            thermal_zone: default_thermal_zone(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dirs: default_log_dirs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            radio: RadioConfig::default(),
            devices: DevicesConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, TOML parsing fails or
    /// validation fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// Setup-time configuration errors abort startup; nothing here is
    /// recoverable at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.network.request_rate_hz <= 0.0 || !self.network.request_rate_hz.is_finite() {
            return Err(TelemetryError::Config(format!(
                "network.request_rate_hz must be positive, got {}",
                self.network.request_rate_hz
            )));
        }

        if self.radio.transmit_rate_hz <= 0.0 || !self.radio.transmit_rate_hz.is_finite() {
            return Err(TelemetryError::Config(format!(
                "radio.transmit_rate_hz must be positive, got {}",
                self.radio.transmit_rate_hz
            )));
        }

        if self.radio.watchdog_timeout_s == 0 {
            return Err(TelemetryError::Config(
                "radio.watchdog_timeout_s must be non-zero".to_string(),
            ));
        }

        if self.devices.analog_target_hz == 0 {
            return Err(TelemetryError::Config(
                "devices.analog_target_hz must be non-zero".to_string(),
            ));
        }

        if self.logging.log_dirs.is_empty() {
            return Err(TelemetryError::Config(
                "logging.log_dirs must list at least one directory".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.network.bind_addr, "0.0.0.0:4444");
        assert_eq!(config.radio.watchdog_timeout_s, 30);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [network]
            bind_addr = "127.0.0.1:5555"

            [radio]
            port = "/dev/ttyUSB1"
            baud_rate = 115200
            "#,
        )
        .unwrap();

        assert_eq!(config.network.bind_addr, "127.0.0.1:5555");
        // Unspecified fields fall back to defaults
        assert_eq!(config.network.request_rate_hz, 10.0);
        assert_eq!(config.radio.port, "/dev/ttyUSB1");
        assert_eq!(config.radio.baud_rate, 115200);
    }

    #[test]
    fn test_zero_request_rate_rejected() {
        let mut config = Config::default();
        config.network.request_rate_hz = 0.0;
        assert!(matches!(
            config.validate(),
            Err(TelemetryError::Config(msg)) if msg.contains("request_rate_hz")
        ));
    }

    #[test]
    fn test_zero_watchdog_timeout_rejected() {
        let mut config = Config::default();
        config.radio.watchdog_timeout_s = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_log_dirs_rejected() {
        let mut config = Config::default();
        config.logging.log_dirs.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml_is_config_file_error() {
        let result: std::result::Result<Config, _> = toml::from_str("network = 7");
        assert!(result.is_err());
    }
}
