//! # Periodic Task Scheduler
//!
//! Self-pacing loop primitive used by every acquisition and transmission
//! loop in the bridge.
//!
//! This module handles:
//! - Dynamic loop frequency with nanosecond-precision pacing
//! - Thread-safe pause/resume of a running loop
//! - Cooperative shutdown checked once per iteration
//!
//! Pacing sleeps the whole-millisecond portion of the loop budget through
//! the runtime timer and busy-waits the sub-millisecond remainder, trading
//! CPU for precision the OS timer cannot reliably deliver.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{Result, TelemetryError};

/// Above this frequency the loop period is kept in integer nanoseconds;
/// at or below it the period is rounded to whole milliseconds.
///
/// Rounding 1000/hz to milliseconds is harmless at low rates but loses up
/// to half a millisecond per iteration at high rates, which compounds into
/// a measurable frequency error.
const NANOS_DOMINANT_THRESHOLD_HZ: f64 = 60.0;

const NANOS_PER_MILLISECOND: u64 = 1_000_000;

/// Self-pacing periodic loop scheduler
///
/// A `Scheduler` is a cloneable handle; one clone drives the loop through
/// [`Scheduler::pace`] while other clones adjust frequency or pause/resume
/// it from outside.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

struct Shared {
    /// Inter-iteration sleep budget in nanoseconds
    sleep_nanos: AtomicU64,
    paused: watch::Sender<bool>,
    shutdown: watch::Sender<bool>,
}

impl Scheduler {
    /// Create a scheduler with no inter-iteration sleep
    pub fn new() -> Self {
        Self::with_sleep(Duration::ZERO)
    }

    /// Create a scheduler with a fixed inter-iteration sleep
    pub fn with_sleep(sleep: Duration) -> Self {
        let (paused, _) = watch::channel(false);
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                sleep_nanos: AtomicU64::new(sleep.as_nanos() as u64),
                paused,
                shutdown,
            }),
        }
    }

    /// Set the loop frequency
    ///
    /// Recomputes the inter-iteration sleep immediately. Frequencies above
    /// 60 Hz keep the period in integer nanoseconds to avoid
    /// millisecond-rounding error at high rates.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidFrequency`] if `hz` is zero,
    /// negative or not finite.
    pub fn set_frequency(&self, hz: f64) -> Result<()> {
        if hz <= 0.0 || !hz.is_finite() {
            return Err(TelemetryError::InvalidFrequency(hz));
        }

        let nanos = if hz > NANOS_DOMINANT_THRESHOLD_HZ {
            (1_000_000_000.0 / hz).round() as u64
        } else {
            let millis = (1000.0 / hz).round() as u64;
            millis * NANOS_PER_MILLISECOND
        };
        self.shared.sleep_nanos.store(nanos, Ordering::Relaxed);
        Ok(())
    }

    /// Set the inter-iteration sleep directly
    pub fn set_sleep(&self, sleep: Duration) {
        self.shared
            .sleep_nanos
            .store(sleep.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Current inter-iteration sleep budget
    pub fn sleep_duration(&self) -> Duration {
        Duration::from_nanos(self.shared.sleep_nanos.load(Ordering::Relaxed))
    }

    /// Pause the loop
    ///
    /// The loop blocks at its next pacing point until [`Scheduler::resume`]
    /// is called.
    pub fn pause(&self) {
        self.shared.paused.send_replace(true);
    }

    /// Resume a paused loop, waking it if it is blocked
    pub fn resume(&self) {
        self.shared.paused.send_replace(false);
    }

    /// Whether the loop is currently paused
    pub fn is_paused(&self) -> bool {
        *self.shared.paused.borrow()
    }

    /// Request cooperative shutdown
    ///
    /// The loop observes the request at its next pacing point and exits
    /// orderly; work in flight is never cut short.
    pub fn shutdown(&self) {
        self.shared.shutdown.send_replace(true);
    }

    /// Whether shutdown has been requested
    pub fn is_shutdown(&self) -> bool {
        *self.shared.shutdown.borrow()
    }

    /// Pace one loop iteration
    ///
    /// Sleeps the whole-millisecond portion of the remaining budget through
    /// the runtime timer, busy-waits the sub-millisecond remainder, then
    /// blocks while paused. Returns `false` once shutdown has been
    /// requested; the loop should exit.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use telemetry_bridge::scheduler::Scheduler;
    ///
    /// # async fn run() -> telemetry_bridge::error::Result<()> {
    /// let scheduler = Scheduler::new();
    /// scheduler.set_frequency(100.0)?;
    /// loop {
    ///     // one unit of work
    ///     if !scheduler.pace().await {
    ///         break;
    ///     }
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn pace(&self) -> bool {
        let sleep_nanos = self.shared.sleep_nanos.load(Ordering::Relaxed);

        if sleep_nanos != 0 {
            let deadline = Instant::now() + Duration::from_nanos(sleep_nanos);

            // The runtime timer may fire late; leave the final millisecond
            // of the budget to the spin so the deadline is never overshot.
            let coarse_millis = (sleep_nanos / NANOS_PER_MILLISECOND).saturating_sub(1);
            if coarse_millis != 0 {
                tokio::time::sleep(Duration::from_millis(coarse_millis)).await;
            }

            // Sub-millisecond remainder: the OS timer cannot reliably hit
            // sub-millisecond targets, so spin out the rest.
            while Instant::now() < deadline {
                std::hint::spin_loop();
            }
        }

        let mut paused_rx = self.shared.paused.subscribe();
        let mut shutdown_rx = self.shared.shutdown.subscribe();
        loop {
            if *shutdown_rx.borrow_and_update() {
                return false;
            }
            if !*paused_rx.borrow_and_update() {
                return true;
            }

            tokio::select! {
                _ = paused_rx.changed() => {}
                _ = shutdown_rx.changed() => {}
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_zero_frequency_rejected() {
        let scheduler = Scheduler::new();
        let result = scheduler.set_frequency(0.0);
        assert!(matches!(
            result,
            Err(TelemetryError::InvalidFrequency(hz)) if hz == 0.0
        ));
    }

    #[test]
    fn test_negative_and_nan_frequency_rejected() {
        let scheduler = Scheduler::new();
        assert!(scheduler.set_frequency(-5.0).is_err());
        assert!(scheduler.set_frequency(f64::NAN).is_err());
        assert!(scheduler.set_frequency(f64::INFINITY).is_err());
    }

    #[test]
    fn test_low_frequency_rounds_to_milliseconds() {
        let scheduler = Scheduler::new();
        scheduler.set_frequency(50.0).unwrap();
        assert_eq!(scheduler.sleep_duration(), Duration::from_millis(20));

        // 30 Hz is 33.33 ms; low-rate mode rounds to whole milliseconds
        scheduler.set_frequency(30.0).unwrap();
        assert_eq!(scheduler.sleep_duration(), Duration::from_millis(33));
    }

    #[test]
    fn test_high_frequency_keeps_nanoseconds() {
        let scheduler = Scheduler::new();

        scheduler.set_frequency(250.0).unwrap();
        assert_eq!(scheduler.sleep_duration(), Duration::from_nanos(4_000_000));

        // 144 Hz is not a whole number of milliseconds
        scheduler.set_frequency(144.0).unwrap();
        assert_eq!(scheduler.sleep_duration(), Duration::from_nanos(6_944_444));
    }

    #[test]
    fn test_set_frequency_recomputes_sleep_immediately() {
        let scheduler = Scheduler::with_sleep(Duration::from_millis(100));
        scheduler.set_frequency(10.0).unwrap();
        assert_eq!(scheduler.sleep_duration(), Duration::from_millis(100));
        scheduler.set_frequency(20.0).unwrap();
        assert_eq!(scheduler.sleep_duration(), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_pace_with_zero_sleep_returns_immediately() {
        let scheduler = Scheduler::new();
        assert!(scheduler.pace().await);
    }

    #[tokio::test]
    async fn test_shutdown_exits_pace() {
        let scheduler = Scheduler::new();
        scheduler.shutdown();
        assert!(!scheduler.pace().await);
    }

    #[tokio::test]
    async fn test_resume_wakes_paused_loop() {
        let scheduler = Scheduler::new();
        scheduler.pause();

        let pacer = scheduler.clone();
        let handle = tokio::spawn(async move { pacer.pace().await });

        // Give the loop time to block on the pause gate
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        scheduler.resume();
        let resumed = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("pace did not wake after resume")
            .unwrap();
        assert!(resumed);
    }

    #[tokio::test]
    async fn test_shutdown_wakes_paused_loop() {
        let scheduler = Scheduler::new();
        scheduler.pause();

        let pacer = scheduler.clone();
        let handle = tokio::spawn(async move { pacer.pace().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.shutdown();

        let resumed = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("pace did not observe shutdown")
            .unwrap();
        assert!(!resumed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pacing_accuracy_at_100hz() {
        let scheduler = Scheduler::new();
        scheduler.set_frequency(100.0).unwrap();

        let start = std::time::Instant::now();
        for _ in 0..100 {
            assert!(scheduler.pace().await);
        }
        let elapsed = start.elapsed().as_secs_f64();

        // 100 iterations at 100 Hz should take 1.0 s within 5%
        assert!(
            (0.95..=1.05).contains(&elapsed),
            "100 iterations at 100 Hz took {:.3} s",
            elapsed
        );
    }

    // Wall-clock-heavy variant of the accuracy property.
    #[tokio::test(flavor = "multi_thread")]
    #[ignore] // Run with: cargo test -- --ignored
    async fn test_pacing_accuracy_at_10hz() {
        let scheduler = Scheduler::new();
        scheduler.set_frequency(10.0).unwrap();

        let start = std::time::Instant::now();
        for _ in 0..100 {
            assert!(scheduler.pace().await);
        }
        let elapsed = start.elapsed().as_secs_f64();

        assert!(
            (9.5..=10.5).contains(&elapsed),
            "100 iterations at 10 Hz took {:.3} s",
            elapsed
        );
    }
}
