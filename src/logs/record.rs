//! # Timestamped Log Records
//!
//! Binary channel log format: a repeating `[i64 timestamp_nanos][payload]`
//! stream, optionally preceded by one fixed-size configuration header.
//! One generic writer serves every channel; the payload encoding is the
//! channel's own.

use std::io::{ErrorKind, Read, Write};
use std::time::Instant;

use bytes::{BufMut, BytesMut};

use crate::error::{Result, TelemetryError};

/// Writes timestamped records for one channel
///
/// Timestamps are nanoseconds since the writer was created.
pub struct RecordWriter<W: Write> {
    out: W,
    epoch: Instant,
    scratch: BytesMut,
    wrote_record: bool,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            epoch: Instant::now(),
            scratch: BytesMut::new(),
            wrote_record: false,
        }
    }

    /// Write the fixed-size configuration header
    ///
    /// Must precede every record; logs without one are read with the
    /// header skipped on the reader side.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Protocol`] if a record was already
    /// written, or the underlying I/O error.
    pub fn write_config(&mut self, header: &[u8]) -> Result<()> {
        if self.wrote_record {
            return Err(TelemetryError::Protocol(
                "config header must precede all records".to_string(),
            ));
        }
        self.out.write_all(header)?;
        Ok(())
    }

    /// Append one record with the given payload
    ///
    /// Returns the timestamp written.
    pub fn write_record(&mut self, payload: &[u8]) -> Result<i64> {
        let timestamp = self.epoch.elapsed().as_nanos() as i64;
        self.out.write_all(&timestamp.to_be_bytes())?;
        self.out.write_all(payload)?;
        self.wrote_record = true;
        Ok(timestamp)
    }

    /// Append one record with a payload produced by `encode`
    pub fn write_record_with<F>(&mut self, encode: F) -> Result<i64>
    where
        F: FnOnce(&mut BytesMut),
    {
        self.scratch.clear();
        encode(&mut self.scratch);
        let payload = self.scratch.split();
        self.write_record(&payload)
    }

    /// Record a device-reported fault code
    ///
    /// Faults are in-band data, not errors; they ride the same record
    /// stream as samples.
    pub fn write_fault(&mut self, code: u32) -> Result<i64> {
        let timestamp = self.epoch.elapsed().as_nanos() as i64;
        self.out.write_all(&timestamp.to_be_bytes())?;
        self.out.write_all(&code.to_be_bytes())?;
        self.wrote_record = true;
        Ok(timestamp)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    /// Consume the writer, returning the underlying stream
    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Reads timestamped records written by [`RecordWriter`]
pub struct RecordReader<R: Read> {
    input: R,
}

impl<R: Read> RecordReader<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }

    /// Read the fixed-size configuration header
    pub fn read_config(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut header = vec![0u8; len];
        self.input.read_exact(&mut header)?;
        Ok(header)
    }

    /// Skip the configuration header for logs that carry one
    pub fn skip_config(&mut self, len: usize) -> Result<()> {
        self.read_config(len)?;
        Ok(())
    }

    /// Read the next record with a fixed payload length
    ///
    /// Returns `None` at a clean end of stream (a record boundary).
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::TruncatedBuffer`] if the stream ends in
    /// the middle of a record.
    pub fn read_record(&mut self, payload_len: usize) -> Result<Option<(i64, Vec<u8>)>> {
        let mut timestamp_bytes = [0u8; 8];
        match read_exact_or_eof(&mut self.input, &mut timestamp_bytes)? {
            ReadOutcome::Eof => return Ok(None),
            ReadOutcome::Partial(read) => {
                return Err(TelemetryError::TruncatedBuffer {
                    needed: 8,
                    remaining: read,
                })
            }
            ReadOutcome::Full => {}
        }
        let timestamp = i64::from_be_bytes(timestamp_bytes);

        let mut payload = vec![0u8; payload_len];
        match read_exact_or_eof(&mut self.input, &mut payload)? {
            ReadOutcome::Full => Ok(Some((timestamp, payload))),
            ReadOutcome::Eof | ReadOutcome::Partial(_) => Err(TelemetryError::TruncatedBuffer {
                needed: payload_len,
                remaining: 0,
            }),
        }
    }
}

enum ReadOutcome {
    Full,
    Eof,
    Partial(usize),
}

fn read_exact_or_eof<R: Read>(input: &mut R, buf: &mut [u8]) -> Result<ReadOutcome> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(ReadOutcome::Eof),
            Ok(0) => return Ok(ReadOutcome::Partial(filled)),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(ReadOutcome::Full)
}

/// Encode one analog sample payload
pub fn encode_analog_sample(buf: &mut BytesMut, millivolts: f32) {
    buf.put_f32(millivolts);
}

/// Encode one three-axis sample payload
pub fn encode_axes_sample(buf: &mut BytesMut, x: f32, y: f32, z: f32) {
    buf.put_f32(x);
    buf.put_f32(y);
    buf.put_f32(z);
}

/// Encode one system status payload
pub fn encode_status_sample(buf: &mut BytesMut, raw_temperature: i32) {
    buf.put_i32(raw_temperature);
}

/// Analog sample payload length
pub const ANALOG_PAYLOAD_LEN: usize = 4;

/// Three-axis sample payload length
pub const AXES_PAYLOAD_LEN: usize = 12;

/// System status payload length
pub const STATUS_PAYLOAD_LEN: usize = 4;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_record_round_trip() {
        let mut out = Vec::new();
        let mut writer = RecordWriter::new(&mut out);
        writer
            .write_record_with(|buf| encode_analog_sample(buf, 1250.5))
            .unwrap();
        writer
            .write_record_with(|buf| encode_analog_sample(buf, -3.25))
            .unwrap();

        let mut reader = RecordReader::new(Cursor::new(out));
        let (t1, p1) = reader.read_record(ANALOG_PAYLOAD_LEN).unwrap().unwrap();
        let (t2, p2) = reader.read_record(ANALOG_PAYLOAD_LEN).unwrap().unwrap();
        assert!(reader.read_record(ANALOG_PAYLOAD_LEN).unwrap().is_none());

        assert!(t2 >= t1);
        assert_eq!(f32::from_be_bytes(p1.try_into().unwrap()), 1250.5);
        assert_eq!(f32::from_be_bytes(p2.try_into().unwrap()), -3.25);
    }

    #[test]
    fn test_config_header_round_trip_and_skip() {
        let mut out = Vec::new();
        let mut writer = RecordWriter::new(&mut out);
        writer.write_config(&[0xC0, 0xFF, 0xEE, 0x00]).unwrap();
        writer
            .write_record_with(|buf| encode_status_sample(buf, 47_000))
            .unwrap();

        // Read the header explicitly
        let mut reader = RecordReader::new(Cursor::new(out.clone()));
        assert_eq!(reader.read_config(4).unwrap(), vec![0xC0, 0xFF, 0xEE, 0x00]);
        let (_, payload) = reader.read_record(STATUS_PAYLOAD_LEN).unwrap().unwrap();
        assert_eq!(i32::from_be_bytes(payload.try_into().unwrap()), 47_000);

        // Or skip it
        let mut reader = RecordReader::new(Cursor::new(out));
        reader.skip_config(4).unwrap();
        assert!(reader.read_record(STATUS_PAYLOAD_LEN).unwrap().is_some());
    }

    #[test]
    fn test_config_header_after_records_rejected() {
        let mut out = Vec::new();
        let mut writer = RecordWriter::new(&mut out);
        writer.write_record(&[0u8; 4]).unwrap();
        let result = writer.write_config(&[1, 2]);
        assert!(matches!(result, Err(TelemetryError::Protocol(_))));
    }

    #[test]
    fn test_truncated_record_is_an_error() {
        let mut out = Vec::new();
        let mut writer = RecordWriter::new(&mut out);
        writer
            .write_record_with(|buf| encode_axes_sample(buf, 1.0, 2.0, 3.0))
            .unwrap();
        out.truncate(out.len() - 5);

        let mut reader = RecordReader::new(Cursor::new(out));
        let result = reader.read_record(AXES_PAYLOAD_LEN);
        assert!(matches!(
            result,
            Err(TelemetryError::TruncatedBuffer { .. })
        ));
    }

    #[test]
    fn test_fault_records_share_the_stream() {
        let mut out = Vec::new();
        let mut writer = RecordWriter::new(&mut out);
        writer
            .write_record_with(|buf| encode_analog_sample(buf, 10.0))
            .unwrap();
        writer.write_fault(3).unwrap();

        let mut reader = RecordReader::new(Cursor::new(out));
        reader.read_record(ANALOG_PAYLOAD_LEN).unwrap().unwrap();
        let (_, fault) = reader.read_record(ANALOG_PAYLOAD_LEN).unwrap().unwrap();
        assert_eq!(u32::from_be_bytes(fault.try_into().unwrap()), 3);
    }

    #[test]
    fn test_empty_stream_reads_none() {
        let mut reader = RecordReader::new(Cursor::new(Vec::new()));
        assert!(reader.read_record(4).unwrap().is_none());
    }

    #[test]
    fn test_snapshot_codec_rides_in_log_records() {
        use crate::sensors::{TelemetryState, GPS_MASK};

        let state = TelemetryState::new();
        state.gps.position.set(12, 32.7157, -117.1611, 980.0);
        state.gps.set_fix_status(3);
        state.gps.set_satellites(11);

        let mut out = Vec::new();
        let mut writer = RecordWriter::new(&mut out);
        let payload_len = TelemetryState::encoded_len(GPS_MASK);
        writer
            .write_record_with(|buf| state.encode(buf, GPS_MASK))
            .unwrap();

        let mut reader = RecordReader::new(Cursor::new(out));
        let (_, payload) = reader.read_record(payload_len).unwrap().unwrap();

        let restored = TelemetryState::new();
        restored
            .decode(&mut bytes::Bytes::from(payload), GPS_MASK)
            .unwrap();
        assert_eq!(restored.gps.position.get(), state.gps.position.get());
        assert_eq!(restored.gps.satellites(), 11);
    }
}
