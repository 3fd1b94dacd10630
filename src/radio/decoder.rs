//! # Radio Frame Decoder
//!
//! Streaming receive-side parser for the serial radio link. Bytes
//! accumulate until a full delimiter + length + frame data + checksum
//! unit is available; the checksum is verified and the frame dispatched
//! on its type byte. Anything that fails verification is discarded before
//! reaching a handler, and the parser resynchronizes on the next
//! delimiter.

use bytes::{Buf, BytesMut};
use tracing::debug;

use crate::radio::frame::{
    verify_checksum, FRAME_TYPE_MODEM_STATUS, FRAME_TYPE_RX_PACKET, FRAME_TYPE_TX_STATUS,
    MAX_FRAME_DATA_LEN, START_DELIMITER,
};

/// A received data packet with sender metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxPacket {
    pub source_address: u16,
    /// Signal strength magnitude in -dBm
    pub signal_strength: u8,
    pub options: u8,
    pub payload: Vec<u8>,
}

/// Transmission acknowledgement/status report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxStatus {
    pub frame_id: u8,
    pub status: u8,
}

impl TxStatus {
    pub fn is_success(&self) -> bool {
        self.status == 0
    }

    pub fn is_no_ack(&self) -> bool {
        self.status == 1
    }
}

/// Modem status event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModemStatus {
    pub status: u8,
}

impl ModemStatus {
    pub fn is_hardware_reset(&self) -> bool {
        self.status & 0b0000_0001 != 0
    }

    pub fn is_watchdog_reset(&self) -> bool {
        self.status & 0b0000_0010 != 0
    }
}

/// A verified, dispatched frame from the radio link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioFrame {
    Rx(RxPacket),
    TxStatus(TxStatus),
    ModemStatus(ModemStatus),
}

/// Length prefix + delimiter ahead of the frame data
const HEADER_LEN: usize = 3;

/// Streaming frame parser
///
/// Feed received bytes in whatever chunks the serial port delivers;
/// complete frames come back out in order.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes to the parse buffer
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Extract the next verified frame, if a complete one is buffered
    ///
    /// Corrupt frames (bad checksum, impossible length, unknown type)
    /// are skipped; parsing resynchronizes on the next delimiter.
    pub fn next_frame(&mut self) -> Option<RadioFrame> {
        loop {
            // Seek the start delimiter, discarding line noise
            while !self.buf.is_empty() && self.buf[0] != START_DELIMITER {
                self.buf.advance(1);
            }

            if self.buf.len() < HEADER_LEN {
                return None;
            }

            let length = u16::from_be_bytes([self.buf[1], self.buf[2]]) as usize;
            if length > MAX_FRAME_DATA_LEN {
                debug!("Discarding frame with impossible length {}", length);
                self.buf.advance(1);
                continue;
            }

            let total = HEADER_LEN + length + 1;
            if self.buf.len() < total {
                return None;
            }

            let frame_data = &self.buf[HEADER_LEN..HEADER_LEN + length];
            let received = self.buf[HEADER_LEN + length];
            if !verify_checksum(frame_data, received) {
                debug!(
                    "Discarding frame with bad checksum (expected 0x{:02X}, got 0x{:02X})",
                    crate::radio::frame::checksum(frame_data),
                    received
                );
                self.buf.advance(1);
                continue;
            }

            let frame = parse_frame_data(frame_data);
            self.buf.advance(total);
            match frame {
                Some(frame) => return Some(frame),
                None => continue,
            }
        }
    }
}

/// Dispatch verified frame data on its type byte
fn parse_frame_data(frame_data: &[u8]) -> Option<RadioFrame> {
    let (&frame_type, rest) = frame_data.split_first()?;
    match frame_type {
        FRAME_TYPE_RX_PACKET => {
            if rest.len() < 4 {
                debug!("Discarding short RX packet ({} bytes)", rest.len());
                return None;
            }
            Some(RadioFrame::Rx(RxPacket {
                source_address: u16::from_be_bytes([rest[0], rest[1]]),
                signal_strength: rest[2],
                options: rest[3],
                payload: rest[4..].to_vec(),
            }))
        }
        FRAME_TYPE_TX_STATUS => {
            if rest.len() < 2 {
                debug!("Discarding short TX status ({} bytes)", rest.len());
                return None;
            }
            Some(RadioFrame::TxStatus(TxStatus {
                frame_id: rest[0],
                status: rest[1],
            }))
        }
        FRAME_TYPE_MODEM_STATUS => {
            if rest.is_empty() {
                debug!("Discarding empty modem status");
                return None;
            }
            Some(RadioFrame::ModemStatus(ModemStatus { status: rest[0] }))
        }
        unknown => {
            debug!("Discarding frame with unknown type 0x{:02X}", unknown);
            None
        }
    }
}
