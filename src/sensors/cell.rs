//! # Channel Cells
//!
//! Storage units for individual telemetry channels. Each cell pairs a
//! timestamp tag with its sample value so the two are always read and
//! written together; nothing synchronizes across cells.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// A timestamp tag and `f32` sample updated as one atomic word
///
/// The tag occupies the high 32 bits and the value's IEEE-754 bit pattern
/// the low 32 bits, so a single 64-bit atomic load or store moves the pair.
#[derive(Debug, Default)]
pub struct TimedF32 {
    raw: AtomicU64,
}

impl TimedF32 {
    pub fn new(tag: u32, value: f32) -> Self {
        Self {
            raw: AtomicU64::new(Self::pack(tag, value)),
        }
    }

    /// Pack a tag/value pair into one word
    pub fn pack(tag: u32, value: f32) -> u64 {
        (u64::from(tag) << 32) | u64::from(value.to_bits())
    }

    /// Split a packed word back into its tag/value pair
    pub fn unpack(raw: u64) -> (u32, f32) {
        ((raw >> 32) as u32, f32::from_bits(raw as u32))
    }

    /// Store a tag/value pair in one atomic operation
    pub fn set(&self, tag: u32, value: f32) {
        self.raw.store(Self::pack(tag, value), Ordering::Relaxed);
    }

    /// Load the tag/value pair in one atomic operation
    pub fn get(&self) -> (u32, f32) {
        Self::unpack(self.raw.load(Ordering::Relaxed))
    }

    /// Load the packed word
    pub fn raw(&self) -> u64 {
        self.raw.load(Ordering::Relaxed)
    }

    /// Store the packed word
    pub fn set_raw(&self, raw: u64) {
        self.raw.store(raw, Ordering::Relaxed);
    }
}

/// A timestamped three-axis sample behind a narrow lock
///
/// Four words do not fit one atomic; the lock spans exactly this channel
/// so the timestamp and axes stay consistent with each other.
#[derive(Debug, Default)]
pub struct TimedVector3 {
    inner: Mutex<TimedVector3Data>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct TimedVector3Data {
    pub timestamp: u32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl TimedVector3 {
    pub fn set(&self, timestamp: u32, x: f32, y: f32, z: f32) {
        *lock(&self.inner) = TimedVector3Data { timestamp, x, y, z };
    }

    pub fn get(&self) -> TimedVector3Data {
        *lock(&self.inner)
    }
}

/// A timestamped geodetic position behind a narrow lock
#[derive(Debug, Default)]
pub struct GeoPosition {
    inner: Mutex<GeoPositionData>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct GeoPositionData {
    pub timestamp: u32,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl GeoPosition {
    pub fn set(&self, timestamp: u32, latitude: f64, longitude: f64, altitude: f64) {
        *lock(&self.inner) = GeoPositionData {
            timestamp,
            latitude,
            longitude,
            altitude,
        };
    }

    pub fn get(&self) -> GeoPositionData {
        *lock(&self.inner)
    }
}

/// Lock a channel mutex, recovering the data if a writer panicked
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack_round_trip() {
        let raw = TimedF32::pack(1234, -56.78);
        let (tag, value) = TimedF32::unpack(raw);
        assert_eq!(tag, 1234);
        assert_eq!(value, -56.78);
    }

    #[test]
    fn test_pack_preserves_negative_zero_and_extremes() {
        for value in [-0.0f32, f32::MAX, f32::MIN_POSITIVE, -1e-30] {
            let (_, out) = TimedF32::unpack(TimedF32::pack(u32::MAX, value));
            assert_eq!(out.to_bits(), value.to_bits());
        }
    }

    #[test]
    fn test_timed_f32_set_get() {
        let cell = TimedF32::default();
        cell.set(42, 3.25);
        assert_eq!(cell.get(), (42, 3.25));
    }

    #[test]
    fn test_timed_f32_raw_round_trip() {
        let cell = TimedF32::new(7, 1.5);
        let raw = cell.raw();
        let other = TimedF32::default();
        other.set_raw(raw);
        assert_eq!(other.get(), (7, 1.5));
    }

    #[test]
    fn test_timed_vector3_pair_consistency() {
        let cell = TimedVector3::default();
        cell.set(99, 1.0, -2.0, 3.0);
        let data = cell.get();
        assert_eq!(data.timestamp, 99);
        assert_eq!((data.x, data.y, data.z), (1.0, -2.0, 3.0));
    }

    #[test]
    fn test_geo_position_pair_consistency() {
        let cell = GeoPosition::default();
        cell.set(5, 32.7157, -117.1611, 123.4);
        let data = cell.get();
        assert_eq!(data.timestamp, 5);
        assert_eq!(data.latitude, 32.7157);
        assert_eq!(data.longitude, -117.1611);
        assert_eq!(data.altitude, 123.4);
    }
}
