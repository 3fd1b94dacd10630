//! # Device Manager
//!
//! Runs every acquisition and transmission loop on its own task under a
//! [`Scheduler`], and converges each throttled loop onto its target rate
//! with a proportional feedback correction.
//!
//! Per-iteration work cost varies with I/O, so open-loop timing drifts;
//! once per one-second measurement window the manager recomputes the
//! inter-iteration sleep as `target period - observed work time`,
//! clamped at zero.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::scheduler::Scheduler;

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// One unit of periodic work: read one sample, send one frame, append one
/// log record. Internals are the device's own business.
#[async_trait]
pub trait Device: Send {
    fn name(&self) -> &str;

    /// Execute one loop iteration
    ///
    /// Errors are logged at the loop boundary and never stop the loop.
    async fn poll(&mut self) -> Result<()>;
}

/// Control handle for one managed loop
#[derive(Clone)]
pub struct DeviceHandle {
    name: Arc<str>,
    scheduler: Scheduler,
    shared: Arc<HandleShared>,
}

struct HandleShared {
    /// Target loops per second; 0 disables the feedback correction
    throttle_hz: AtomicU64,
    /// Loops completed in the last full measurement window
    realized_hz: AtomicU64,
}

impl DeviceHandle {
    pub(crate) fn new(name: &str, scheduler: Scheduler) -> Self {
        Self {
            name: Arc::from(name),
            scheduler,
            shared: Arc::new(HandleShared {
                throttle_hz: AtomicU64::new(0),
                realized_hz: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pause(&self) {
        self.scheduler.pause();
    }

    pub fn resume(&self) {
        self.scheduler.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.scheduler.is_paused()
    }

    /// Fix the loop frequency directly, bypassing the throttle feedback
    pub fn set_frequency(&self, hz: f64) -> Result<()> {
        self.scheduler.set_frequency(hz)
    }

    /// Fix the inter-iteration sleep directly
    pub fn set_sleep(&self, sleep: Duration) {
        self.scheduler.set_sleep(sleep);
    }

    /// Set the target rate the feedback correction converges to
    pub fn set_throttle(&self, hz: u64) {
        self.shared.throttle_hz.store(hz, Ordering::Relaxed);
    }

    /// Loops per second realized over the last measurement window
    pub fn realized_hz(&self) -> u64 {
        self.shared.realized_hz.load(Ordering::Relaxed)
    }

    fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}

/// Owns one scheduled loop per registered device
///
/// Dropping the manager does not stop the loops; call
/// [`DeviceManager::clear`] to interrupt and join them deterministically.
#[derive(Default)]
pub struct DeviceManager {
    entries: Vec<ManagedDevice>,
}

struct ManagedDevice {
    handle: DeviceHandle,
    task: JoinHandle<()>,
}

impl DeviceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device and start its loop immediately
    pub fn add<D: Device + 'static>(&mut self, device: D) -> DeviceHandle {
        self.add_paused(device, false)
    }

    /// Register a device, optionally leaving its loop paused
    pub fn add_paused<D: Device + 'static>(&mut self, device: D, start_paused: bool) -> DeviceHandle {
        let scheduler = Scheduler::new();
        if start_paused {
            scheduler.pause();
        }

        let handle = DeviceHandle::new(device.name(), scheduler);
        info!("Starting {} loop", handle.name());

        let task = tokio::spawn(run_device(device, handle.clone()));
        self.entries.push(ManagedDevice {
            handle: handle.clone(),
            task,
        });
        handle
    }

    /// Interrupt every managed loop and wait for each to exit
    ///
    /// Relies on loop bodies reaching their pacing point promptly; a poll
    /// that never returns holds `clear` up with it.
    pub async fn clear(&mut self) {
        for entry in &self.entries {
            info!("Stopping {} loop", entry.handle.name());
            entry.handle.scheduler().shutdown();
        }
        for entry in self.entries.drain(..) {
            let _ = entry.task.await;
        }
    }

    /// Render `name: N Hz` for every managed loop
    pub fn frequency_report(&self) -> String {
        let loops: Vec<String> = self
            .entries
            .iter()
            .map(|entry| format!("{}: {} Hz", entry.handle.name(), entry.handle.realized_hz()))
            .collect();
        format!("DeviceManager: [{}]", loops.join("; "))
    }
}

async fn run_device<D: Device>(mut device: D, handle: DeviceHandle) {
    let scheduler = handle.scheduler().clone();
    let mut window_start = Instant::now();
    let mut loops: u64 = 0;

    loop {
        if let Err(e) = device.poll().await {
            warn!("{} poll failed: {}", handle.name(), e);
        }

        loops += 1;
        let now = Instant::now();
        let elapsed = now - window_start;
        if elapsed > Duration::from_secs(1) {
            let throttle = handle.shared.throttle_hz.load(Ordering::Relaxed);
            if throttle != 0 {
                let elapsed_nanos = elapsed.as_nanos() as u64;
                let sleep_nanos = scheduler.sleep_duration().as_nanos() as u64;
                // Observed work time per loop, beyond the commanded sleep
                let work_nanos = (elapsed_nanos / loops).saturating_sub(sleep_nanos);
                let target_period = NANOS_PER_SECOND / throttle;
                let correction = target_period.saturating_sub(work_nanos);
                scheduler.set_sleep(Duration::from_nanos(correction));
            }

            handle.shared.realized_hz.store(loops, Ordering::Relaxed);
            loops = 0;
            window_start = now;
        }

        if !scheduler.pace().await {
            break;
        }
    }
    debug!("{} loop exited", handle.name());
}
