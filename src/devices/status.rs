//! # System Status Monitor
//!
//! Samples the on-board computer's CPU temperature pseudo-file into the
//! system status channel, with an optional channel log.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::devices::manager::Device;
use crate::error::{Result, TelemetryError};
use crate::logs::record::{encode_status_sample, RecordWriter};
use crate::sensors::TelemetryState;

/// Periodic CPU temperature sampler
pub struct SystemStatusMonitor<W: Write + Send> {
    state: Arc<TelemetryState>,
    thermal_zone: PathBuf,
    log: Option<RecordWriter<W>>,
}

impl<W: Write + Send> SystemStatusMonitor<W> {
    pub fn new(state: Arc<TelemetryState>, thermal_zone: impl Into<PathBuf>) -> Self {
        Self {
            state,
            thermal_zone: thermal_zone.into(),
            log: None,
        }
    }

    /// Also append every sample to a channel log
    pub fn with_log(mut self, log: RecordWriter<W>) -> Self {
        self.log = Some(log);
        self
    }
}

#[async_trait]
impl<W: Write + Send> Device for SystemStatusMonitor<W> {
    fn name(&self) -> &str {
        "system-status"
    }

    async fn poll(&mut self) -> Result<()> {
        let contents = std::fs::read_to_string(&self.thermal_zone)?;
        let raw: i32 = contents.trim().parse().map_err(|_| {
            TelemetryError::Protocol(format!(
                "unparseable thermal zone reading: {:?}",
                contents.trim()
            ))
        })?;

        self.state.system.set_raw_temperature(raw);
        debug!("CPU temperature {:.1} C", raw as f32 / 1000.0);

        if let Some(log) = self.log.as_mut() {
            log.write_record_with(|buf| encode_status_sample(buf, raw))?;
        }
        Ok(())
    }
}
