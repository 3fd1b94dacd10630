//! # Radio API Frames
//!
//! Framing for the half-duplex serial radio link:
//! `[start delimiter][u16 length][frame data][u8 checksum]`.
//!
//! Frames are always rebuilt on send and re-verified on receive; a frame
//! whose checksum fails never reaches a handler.

use bytes::{BufMut, BytesMut};

use crate::error::{Result, TelemetryError};

/// Start delimiter of every API frame
pub const START_DELIMITER: u8 = 0x7E;

/// Maximum frame data length the link accepts
pub const MAX_FRAME_DATA_LEN: usize = 2048;

/// Bytes added around the frame data: delimiter + length + checksum
pub const FRAME_OVERHEAD: usize = 4;

/// Frame type ids, the first byte of the frame data
pub const FRAME_TYPE_TX_REQUEST: u8 = 0x01;
pub const FRAME_TYPE_RX_PACKET: u8 = 0x81;
pub const FRAME_TYPE_TX_STATUS: u8 = 0x89;
pub const FRAME_TYPE_MODEM_STATUS: u8 = 0x8A;

/// TX request constants
pub const FRAME_ID_DISABLE: u8 = 0x00;
pub const BROADCAST_ADDRESS: u16 = 0xFFFF;
pub const OPTIONS_DISABLE_ACK: u8 = 0x01;

/// TX request overhead: type + frame id + u16 destination + options
pub const TX_REQUEST_OVERHEAD: usize = 5;

/// Checksum over the frame data: `0xFF - (sum(frame data) & 0xFF)`
pub fn checksum(frame_data: &[u8]) -> u8 {
    let sum: u8 = frame_data
        .iter()
        .fold(0u8, |acc, &byte| acc.wrapping_add(byte));
    0xFF - sum
}

/// Verify a received checksum against the frame data it covers
pub fn verify_checksum(frame_data: &[u8], received: u8) -> bool {
    checksum(frame_data) == received
}

/// An outbound API frame wrapping opaque frame data
#[derive(Debug, Clone)]
pub struct ApiFrame {
    frame_data: Vec<u8>,
}

impl ApiFrame {
    /// Wrap frame data, rejecting anything over the link maximum
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Protocol`] if the frame data exceeds
    /// [`MAX_FRAME_DATA_LEN`].
    pub fn new(frame_data: Vec<u8>) -> Result<Self> {
        if frame_data.len() > MAX_FRAME_DATA_LEN {
            return Err(TelemetryError::Protocol(format!(
                "frame data length {} exceeds maximum {}",
                frame_data.len(),
                MAX_FRAME_DATA_LEN
            )));
        }
        Ok(Self { frame_data })
    }

    pub fn frame_data(&self) -> &[u8] {
        &self.frame_data
    }

    /// Checksum of this frame's data
    pub fn checksum(&self) -> u8 {
        checksum(&self.frame_data)
    }

    /// Write the complete frame to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(FRAME_OVERHEAD + self.frame_data.len());
        buf.put_u8(START_DELIMITER);
        buf.put_u16(self.frame_data.len() as u16);
        buf.put_slice(&self.frame_data);
        buf.put_u8(self.checksum());
    }
}

/// Build the frame data of a broadcast TX request carrying `payload`
///
/// The request solicits no status (frame id 0) and disables
/// acknowledgements; delivery is best-effort by design.
///
/// # Errors
///
/// Returns [`TelemetryError::Protocol`] if the payload would push the
/// frame data over the link maximum.
pub fn tx_request(payload: &[u8]) -> Result<ApiFrame> {
    if payload.len() > MAX_FRAME_DATA_LEN - TX_REQUEST_OVERHEAD {
        return Err(TelemetryError::Protocol(format!(
            "TX payload length {} exceeds maximum {}",
            payload.len(),
            MAX_FRAME_DATA_LEN - TX_REQUEST_OVERHEAD
        )));
    }

    let mut frame_data = Vec::with_capacity(TX_REQUEST_OVERHEAD + payload.len());
    frame_data.push(FRAME_TYPE_TX_REQUEST);
    frame_data.push(FRAME_ID_DISABLE);
    frame_data.extend_from_slice(&BROADCAST_ADDRESS.to_be_bytes());
    frame_data.push(OPTIONS_DISABLE_ACK);
    frame_data.extend_from_slice(payload);
    ApiFrame::new(frame_data)
}
