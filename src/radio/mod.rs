//! # Radio Frame Protocol Module
//!
//! Framing, checksum verification, streaming receive parsing and the
//! command-mode state machine for the long-range half-duplex radio link.
//!
//! This module handles:
//! - Building delimited, length-prefixed, checksummed API frames
//! - Streaming receive-side parsing with checksum verification
//! - The modem power / data / command-mode state machine
//! - Configuration command batches written in command mode

pub mod decoder;
pub mod frame;
pub mod link;
pub mod modem_config;

pub use decoder::{FrameDecoder, ModemStatus, RadioFrame, RxPacket, TxStatus};
pub use frame::ApiFrame;
pub use link::{
    spawn_receiver, ApiModeCell, CommandModeTiming, LinkMode, ModemLinkState, PowerState,
    RadioEvent, RadioLink,
};
pub use modem_config::{ApiMode, ModemConfig, RfDataRate, TxPowerLevel};
