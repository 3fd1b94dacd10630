//! # Datagram Wire Format
//!
//! Console protocol messages, big-endian:
//! `[u32 number][u8 id][payload]`.
//!
//! PING payload is the sender's monotonic clock in nanoseconds; SENSOR
//! request payload is the category mask; SENSOR response payload is the
//! mask followed by the snapshot encoded under that mask.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, TelemetryError};
use crate::sensors::TelemetryState;

/// Round-trip time probe
pub const MESSAGE_PING: u8 = 0x00;

/// Masked snapshot request/response
pub const MESSAGE_SENSOR: u8 = 0x01;

/// Datagram buffer size, shared by both sides of the protocol
pub const MAX_DATAGRAM_SIZE: usize = 1024;

/// Message header length: number (4) + id (1)
pub const HEADER_LEN: usize = 5;

/// A decoded console protocol message
#[derive(Debug, Clone)]
pub struct DatagramMessage {
    /// Request/response sequence number; 0 means unnumbered
    pub number: u32,
    pub id: u8,
    pub data: Bytes,
}

impl DatagramMessage {
    /// Decode a message from one received datagram
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::TruncatedBuffer`] if the datagram is
    /// shorter than the message header.
    pub fn decode(mut buf: Bytes) -> Result<Self> {
        if buf.remaining() < HEADER_LEN {
            return Err(TelemetryError::TruncatedBuffer {
                needed: HEADER_LEN,
                remaining: buf.remaining(),
            });
        }
        let number = buf.get_u32();
        let id = buf.get_u8();
        Ok(Self {
            number,
            id,
            data: buf,
        })
    }
}

/// Encode a PING request carrying the sender's clock
pub fn write_ping(buf: &mut BytesMut, number: u32, clock_nanos: i64) {
    buf.put_u32(number);
    buf.put_u8(MESSAGE_PING);
    buf.put_i64(clock_nanos);
}

/// Encode a SENSOR request for the categories selected by `mask`
pub fn write_sensor_request(buf: &mut BytesMut, number: u32, mask: u8) {
    buf.put_u32(number);
    buf.put_u8(MESSAGE_SENSOR);
    buf.put_u8(mask);
}

/// Encode a SENSOR response: the mask followed by the masked snapshot
pub fn write_sensor_response(buf: &mut BytesMut, number: u32, mask: u8, state: &TelemetryState) {
    buf.put_u32(number);
    buf.put_u8(MESSAGE_SENSOR);
    buf.put_u8(mask);
    state.encode(buf, mask);
}

/// Encode a PING response echoing the request payload untouched
pub fn write_ping_response(buf: &mut BytesMut, number: u32, payload: &[u8]) {
    buf.put_u32(number);
    buf.put_u8(MESSAGE_PING);
    buf.put_slice(payload);
}
