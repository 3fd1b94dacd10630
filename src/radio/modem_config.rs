//! # Modem Configuration
//!
//! Builder for the AT command batch written to the radio modem while it
//! is in command mode.

/// How the modem frames serial traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiMode {
    /// Raw bytes pass straight through to the listener
    #[default]
    Disabled,
    /// Delimited, length-prefixed, checksummed API frames
    Framed,
    /// API frames with escaped control characters; not supported, the
    /// escaping rule is unspecified upstream and must not be guessed
    FramedEscaped,
}

impl ApiMode {
    /// AT `AP` parameter value
    pub fn code(self) -> u8 {
        match self {
            ApiMode::Disabled => 0,
            ApiMode::Framed => 1,
            ApiMode::FramedEscaped => 2,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ApiMode::Disabled,
            1 => ApiMode::Framed,
            _ => ApiMode::FramedEscaped,
        }
    }
}

/// AT `BD` parameter: serial interface data rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterfaceDataRate {
    Baud1200 = 0,
    Baud2400 = 1,
    Baud4800 = 2,
    #[default]
    Baud9600 = 3,
    Baud19200 = 4,
    Baud38400 = 5,
    Baud57600 = 6,
    Baud115200 = 7,
}

/// AT `BR` parameter: over-the-air data rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RfDataRate {
    #[default]
    Baud9600 = 0,
    Baud115200 = 1,
}

/// AT `PL` parameter: transmit power
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxPowerLevel {
    Milliwatt1 = 0,
    Milliwatt10 = 1,
    Milliwatt100 = 2,
    Milliwatt500 = 3,
    #[default]
    Milliwatt1000 = 4,
}

/// Modem settings written as one command-mode batch
///
/// # Examples
///
/// ```
/// use telemetry_bridge::radio::modem_config::{ApiMode, ModemConfig, RfDataRate, TxPowerLevel};
///
/// let config = ModemConfig::new()
///     .rf_data_rate(RfDataRate::Baud115200)
///     .tx_power_level(TxPowerLevel::Milliwatt1000)
///     .transmit_only(true)
///     .api_mode(ApiMode::Framed);
/// assert_eq!(config.render_batch(), "ATBD3,BR1,PL4,RR0,TX1,AP1,CN");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ModemConfig {
    interface_data_rate: InterfaceDataRate,
    rf_data_rate: RfDataRate,
    tx_power_level: TxPowerLevel,
    retries: u8,
    transmit_only: bool,
    api_mode: ApiMode,
}

impl ModemConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interface_data_rate(mut self, rate: InterfaceDataRate) -> Self {
        self.interface_data_rate = rate;
        self
    }

    pub fn rf_data_rate(mut self, rate: RfDataRate) -> Self {
        self.rf_data_rate = rate;
        self
    }

    pub fn tx_power_level(mut self, level: TxPowerLevel) -> Self {
        self.tx_power_level = level;
        self
    }

    pub fn retries(mut self, retries: u8) -> Self {
        self.retries = retries;
        self
    }

    pub fn transmit_only(mut self, transmit_only: bool) -> Self {
        self.transmit_only = transmit_only;
        self
    }

    pub fn api_mode(mut self, api_mode: ApiMode) -> Self {
        self.api_mode = api_mode;
        self
    }

    pub fn configured_api_mode(&self) -> ApiMode {
        self.api_mode
    }

    /// Render the AT batch, ending with the exit-command-mode command
    ///
    /// The trailing `CN` drops the modem back into data mode once the
    /// settings are applied.
    pub fn render_batch(&self) -> String {
        format!(
            "ATBD{},BR{},PL{},RR{},TX{},AP{},CN",
            self.interface_data_rate as u8,
            self.rf_data_rate as u8,
            self.tx_power_level as u8,
            self.retries,
            if self.transmit_only { 1 } else { 0 },
            self.api_mode.code(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_batch() {
        assert_eq!(ModemConfig::new().render_batch(), "ATBD3,BR0,PL4,RR0,TX0,AP0,CN");
    }

    #[test]
    fn test_full_batch() {
        let config = ModemConfig::new()
            .interface_data_rate(InterfaceDataRate::Baud9600)
            .rf_data_rate(RfDataRate::Baud115200)
            .tx_power_level(TxPowerLevel::Milliwatt1000)
            .retries(0)
            .transmit_only(true)
            .api_mode(ApiMode::Framed);
        assert_eq!(config.render_batch(), "ATBD3,BR1,PL4,RR0,TX1,AP1,CN");
    }

    #[test]
    fn test_api_mode_codes_round_trip() {
        for mode in [ApiMode::Disabled, ApiMode::Framed, ApiMode::FramedEscaped] {
            assert_eq!(ApiMode::from_code(mode.code()), mode);
        }
    }
}
