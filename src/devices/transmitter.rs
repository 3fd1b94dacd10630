//! # Snapshot Transmitter
//!
//! Periodic device that relays the full telemetry snapshot over the
//! radio link. Runs paused until the link is powered and transmission is
//! wanted; the watchdog resumes it when the far side goes quiet.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::sync::Mutex;

use crate::devices::manager::Device;
use crate::error::Result;
use crate::radio::RadioLink;
use crate::sensors::{TelemetryState, ALL_MASK};
use crate::serial::SerialPortIO;

/// Encodes and sends one full snapshot per iteration
pub struct SnapshotTransmitter<P: SerialPortIO> {
    state: Arc<TelemetryState>,
    link: Arc<Mutex<RadioLink<P>>>,
    buf: BytesMut,
}

impl<P: SerialPortIO> SnapshotTransmitter<P> {
    pub fn new(state: Arc<TelemetryState>, link: Arc<Mutex<RadioLink<P>>>) -> Self {
        Self {
            state,
            link,
            buf: BytesMut::with_capacity(TelemetryState::encoded_len(ALL_MASK)),
        }
    }
}

#[async_trait]
impl<P: SerialPortIO> Device for SnapshotTransmitter<P> {
    fn name(&self) -> &str {
        "radio-transmitter"
    }

    async fn poll(&mut self) -> Result<()> {
        self.buf.clear();
        self.state.encode(&mut self.buf, ALL_MASK);
        self.link.lock().await.send(&self.buf).await
    }
}
