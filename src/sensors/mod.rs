//! # Telemetry State
//!
//! The shared in-memory mirror of all telemetry channel values and its
//! mask-selective binary codec.
//!
//! This module handles:
//! - Per-channel atomic storage (no lock spans the whole snapshot)
//! - Category mask selection for encode/decode/log operations
//! - The canonical big-endian wire layout reused by the UDP protocol,
//!   the radio link and the on-disk channel logs
//!
//! Consistency is per channel only: concurrent readers may observe
//! different channels as of different instants. This is deliberate — a
//! high-rate producer never contends with a lower-rate protocol consumer.

pub mod cell;

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, TelemetryError};
use cell::{GeoPosition, TimedF32, TimedVector3};

use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};

/// Analog channel count
pub const ANALOG_CHANNELS: usize = 6;

/// Category mask bits; buffer order is fixed and matches bit order
pub const ANALOG_MASK: u8 = 0b0000_0001;
pub const GYROSCOPE_MASK: u8 = 0b0000_0010;
pub const ACCELEROMETER_MASK: u8 = 0b0000_0100;
pub const INCLINOMETER_MASK: u8 = 0b0000_1000;
pub const GPS_MASK: u8 = 0b0001_0000;
pub const RADIO_MASK: u8 = 0b0010_0000;
pub const SYSTEM_MASK: u8 = 0b0100_0000;
pub const ALL_MASK: u8 = 0xFF;

const ANALOG_LEN: usize = ANALOG_CHANNELS * 8;
const AXES_LEN: usize = 4 + 3 * 4;
const GPS_LEN: usize = 4 + 3 * 8 + 1 + 1;
const RADIO_LEN: usize = 1;
const SYSTEM_LEN: usize = 4;

/// A mask of zero selects all categories
fn effective_mask(mask: u8) -> u8 {
    if mask == 0 {
        ALL_MASK
    } else {
        mask
    }
}

/// GPS fix channel: position pair plus independent fix/satellite fields
#[derive(Debug, Default)]
pub struct GpsFix {
    pub position: GeoPosition,
    /// 0 = unknown, 1 = no fix, 2 = 2D fix, 3 = 3D fix
    fix_status: AtomicU8,
    satellites: AtomicU8,
}

impl GpsFix {
    pub fn set_fix_status(&self, fix: u8) {
        self.fix_status.store(fix, Ordering::Relaxed);
    }

    pub fn fix_status(&self) -> u8 {
        self.fix_status.load(Ordering::Relaxed)
    }

    pub fn set_satellites(&self, count: u8) {
        self.satellites.store(count, Ordering::Relaxed);
    }

    pub fn satellites(&self) -> u8 {
        self.satellites.load(Ordering::Relaxed)
    }
}

/// Radio link health as reported by received packets
#[derive(Debug, Default)]
pub struct RadioStatus {
    /// Signal strength magnitude in -dBm
    signal_strength: AtomicU8,
}

impl RadioStatus {
    pub fn set_signal_strength(&self, neg_dbm: u8) {
        self.signal_strength.store(neg_dbm, Ordering::Relaxed);
    }

    pub fn signal_strength(&self) -> u8 {
        self.signal_strength.load(Ordering::Relaxed)
    }
}

/// On-board computer health
#[derive(Debug, Default)]
pub struct SystemStatus {
    /// Raw CPU temperature in milli-degrees Celsius
    raw_temperature: AtomicI32,
}

impl SystemStatus {
    pub fn set_raw_temperature(&self, raw: i32) {
        self.raw_temperature.store(raw, Ordering::Relaxed);
    }

    pub fn raw_temperature(&self) -> i32 {
        self.raw_temperature.load(Ordering::Relaxed)
    }

    /// Temperature in degrees Celsius
    pub fn temperature_c(&self) -> f32 {
        self.raw_temperature() as f32 / 1000.0
    }
}

/// The shared sensor snapshot
///
/// Allocated once at startup and shared (behind `Arc`) between device
/// loops, the UDP server and the radio transmitter for the life of the
/// process.
#[derive(Debug, Default)]
pub struct TelemetryState {
    /// Analog inputs in millivolts
    pub analog: [TimedF32; ANALOG_CHANNELS],
    pub gyroscope: TimedVector3,
    pub accelerometer: TimedVector3,
    pub inclinometer: TimedVector3,
    pub gps: GpsFix,
    pub radio: RadioStatus,
    pub system: SystemStatus,
}

impl TelemetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes `encode` produces for `mask`
    pub fn encoded_len(mask: u8) -> usize {
        let mask = effective_mask(mask);
        let mut len = 0;
        if mask & ANALOG_MASK != 0 {
            len += ANALOG_LEN;
        }
        if mask & GYROSCOPE_MASK != 0 {
            len += AXES_LEN;
        }
        if mask & ACCELEROMETER_MASK != 0 {
            len += AXES_LEN;
        }
        if mask & INCLINOMETER_MASK != 0 {
            len += AXES_LEN;
        }
        if mask & GPS_MASK != 0 {
            len += GPS_LEN;
        }
        if mask & RADIO_MASK != 0 {
            len += RADIO_LEN;
        }
        if mask & SYSTEM_MASK != 0 {
            len += SYSTEM_LEN;
        }
        len
    }

    /// Write the selected categories to `buf` in fixed category order
    ///
    /// A mask of zero selects all categories. Each channel is read with
    /// its single-channel atomic operation; the snapshot as a whole is
    /// not frozen.
    pub fn encode(&self, buf: &mut BytesMut, mask: u8) {
        let mask = effective_mask(mask);
        buf.reserve(Self::encoded_len(mask));

        if mask & ANALOG_MASK != 0 {
            for channel in &self.analog {
                buf.put_u64(channel.raw());
            }
        }

        if mask & GYROSCOPE_MASK != 0 {
            put_axes(buf, &self.gyroscope);
        }
        if mask & ACCELEROMETER_MASK != 0 {
            put_axes(buf, &self.accelerometer);
        }
        if mask & INCLINOMETER_MASK != 0 {
            put_axes(buf, &self.inclinometer);
        }

        if mask & GPS_MASK != 0 {
            let position = self.gps.position.get();
            buf.put_u32(position.timestamp);
            buf.put_f64(position.latitude);
            buf.put_f64(position.longitude);
            buf.put_f64(position.altitude);
            buf.put_u8(self.gps.fix_status());
            buf.put_u8(self.gps.satellites());
        }

        if mask & RADIO_MASK != 0 {
            buf.put_u8(self.radio.signal_strength());
        }

        if mask & SYSTEM_MASK != 0 {
            buf.put_i32(self.system.raw_temperature());
        }
    }

    /// Apply the selected categories from `buf`, the inverse of `encode`
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::TruncatedBuffer`] if a selected category
    /// has fewer bytes remaining than its fixed layout requires.
    /// Categories decoded before the failure point stay applied.
    pub fn decode<B: Buf>(&self, buf: &mut B, mask: u8) -> Result<()> {
        let mask = effective_mask(mask);

        if mask & ANALOG_MASK != 0 {
            ensure(buf, ANALOG_LEN)?;
            for channel in &self.analog {
                channel.set_raw(buf.get_u64());
            }
        }

        if mask & GYROSCOPE_MASK != 0 {
            get_axes(buf, &self.gyroscope)?;
        }
        if mask & ACCELEROMETER_MASK != 0 {
            get_axes(buf, &self.accelerometer)?;
        }
        if mask & INCLINOMETER_MASK != 0 {
            get_axes(buf, &self.inclinometer)?;
        }

        if mask & GPS_MASK != 0 {
            ensure(buf, GPS_LEN)?;
            let timestamp = buf.get_u32();
            let latitude = buf.get_f64();
            let longitude = buf.get_f64();
            let altitude = buf.get_f64();
            self.gps
                .position
                .set(timestamp, latitude, longitude, altitude);
            self.gps.set_fix_status(buf.get_u8());
            self.gps.set_satellites(buf.get_u8());
        }

        if mask & RADIO_MASK != 0 {
            ensure(buf, RADIO_LEN)?;
            self.radio.set_signal_strength(buf.get_u8());
        }

        if mask & SYSTEM_MASK != 0 {
            ensure(buf, SYSTEM_LEN)?;
            self.system.set_raw_temperature(buf.get_i32());
        }

        Ok(())
    }
}

fn put_axes(buf: &mut BytesMut, cell: &TimedVector3) {
    let data = cell.get();
    buf.put_u32(data.timestamp);
    buf.put_f32(data.x);
    buf.put_f32(data.y);
    buf.put_f32(data.z);
}

fn get_axes<B: Buf>(buf: &mut B, cell: &TimedVector3) -> Result<()> {
    ensure(buf, AXES_LEN)?;
    let timestamp = buf.get_u32();
    let x = buf.get_f32();
    let y = buf.get_f32();
    let z = buf.get_f32();
    cell.set(timestamp, x, y, z);
    Ok(())
}

fn ensure<B: Buf>(buf: &B, needed: usize) -> Result<()> {
    let remaining = buf.remaining();
    if remaining < needed {
        return Err(TelemetryError::TruncatedBuffer { needed, remaining });
    }
    Ok(())
}
