//! # Analog Sampler
//!
//! Periodic device wrapping one analog input channel. The ADC itself is
//! an external collaborator handing back a millivolt reading; this loop
//! tags it, stores it in the snapshot and appends it to the channel log.

use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::devices::manager::Device;
use crate::error::Result;
use crate::logs::record::{encode_analog_sample, RecordWriter};
use crate::sensors::TelemetryState;

/// Reads one millivolt sample per iteration from a driver callback
pub struct AnalogSampler<F, W>
where
    F: FnMut() -> Result<f32> + Send,
    W: Write + Send,
{
    name: String,
    index: usize,
    sample: F,
    state: Arc<TelemetryState>,
    epoch: Instant,
    log: Option<RecordWriter<W>>,
}

impl<F, W> AnalogSampler<F, W>
where
    F: FnMut() -> Result<f32> + Send,
    W: Write + Send,
{
    pub fn new(index: usize, state: Arc<TelemetryState>, sample: F) -> Self {
        Self {
            name: format!("analog-a{}", index),
            index,
            sample,
            state,
            epoch: Instant::now(),
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
impl<F, W> Device for AnalogSampler<F, W>
where
    F: FnMut() -> Result<f32> + Send,
    W: Write + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&mut self) -> Result<()> {
        let millivolts = (self.sample)()?;
        let tag = self.epoch.elapsed().as_millis() as u32;
        self.state.analog[self.index].set(tag, millivolts);

        if let Some(log) = self.log.as_mut() {
            log.write_record_with(|buf| encode_analog_sample(buf, millivolts))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TelemetryError;
    use crate::logs::record::{RecordReader, ANALOG_PAYLOAD_LEN};
    use std::io::Cursor;

    #[tokio::test]
    async fn test_poll_stores_tagged_sample() {
        let state = Arc::new(TelemetryState::new());
        let mut readings = [500.0f32, 750.0].into_iter();
        let mut sampler: AnalogSampler<_, Vec<u8>> =
            AnalogSampler::new(3, Arc::clone(&state), move || {
                Ok(readings.next().unwrap())
            });
        assert_eq!(sampler.name(), "analog-a3");

        sampler.poll().await.unwrap();
        let (_, value) = state.analog[3].get();
        assert_eq!(value, 500.0);

        sampler.poll().await.unwrap();
        let (_, value) = state.analog[3].get();
        assert_eq!(value, 750.0);
    }

    #[tokio::test]
    async fn test_poll_appends_to_channel_log() {
        let state = Arc::new(TelemetryState::new());
        let log = RecordWriter::new(Vec::new());
        let mut sampler = AnalogSampler::new(0, state, || Ok(1250.25)).with_log(log);

        sampler.poll().await.unwrap();

        let out = sampler.log.take().unwrap().into_inner();
        let mut reader = RecordReader::new(Cursor::new(out));
        let (_, payload) = reader.read_record(ANALOG_PAYLOAD_LEN).unwrap().unwrap();
        assert_eq!(f32::from_be_bytes(payload.try_into().unwrap()), 1250.25);
    }

    #[tokio::test]
    async fn test_driver_errors_propagate_to_the_loop_boundary() {
        let state = Arc::new(TelemetryState::new());
        let mut sampler: AnalogSampler<_, Vec<u8>> = AnalogSampler::new(0, state, || {
            Err(TelemetryError::Transport(std::io::Error::new(
                std::io::ErrorKind::Other,
                "i2c bus fault",
            )))
        });

        let result = sampler.poll().await;
        assert!(matches!(result, Err(TelemetryError::Transport(_))));
    }
}
