//! # Radio Watchdog
//!
//! One-shot armed countdown watching the radio link for liveness. When no
//! qualifying event (a received data packet) arrives before the countdown
//! elapses, the watchdog resumes a paused transmission loop and disarms
//! itself until explicitly restarted.
//!
//! Arming is gated on [`Watchdog::enable`]/[`Watchdog::disable`], which
//! track the radio's power state: a powered-off link cannot prove
//! liveness, so it is not watched.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::devices::manager::DeviceHandle;
use crate::radio::RadioEvent;

/// One-shot radio liveness watchdog
pub struct Watchdog {
    inner: Arc<Inner>,
    task: Option<JoinHandle<()>>,
}

struct Inner {
    timeout_nanos: AtomicU64,
    enabled: AtomicBool,
    armed: AtomicBool,
    stopped: AtomicBool,
    /// Wakes the countdown on feed, control changes and stop
    notify: Notify,
    trigger_count: AtomicU32,
    transmitter: DeviceHandle,
}

impl Watchdog {
    /// Create a watchdog that resumes `transmitter` when it triggers
    ///
    /// Starts disabled and armed; call [`Watchdog::start`] to spawn the
    /// countdown and [`Watchdog::enable`] once the radio is powered.
    pub fn new(timeout: Duration, transmitter: DeviceHandle) -> Self {
        Self {
            inner: Arc::new(Inner {
                timeout_nanos: AtomicU64::new(timeout.as_nanos() as u64),
                enabled: AtomicBool::new(false),
                armed: AtomicBool::new(true),
                stopped: AtomicBool::new(false),
                notify: Notify::new(),
                trigger_count: AtomicU32::new(0),
                transmitter,
            }),
            task: None,
        }
    }

    /// Spawn the countdown task
    pub fn start(&mut self) {
        if self.task.is_some() {
            return;
        }
        self.task = Some(tokio::spawn(Arc::clone(&self.inner).run()));
    }

    /// Record a qualifying liveness event, restarting the countdown
    pub fn feed(&self) {
        self.inner.notify.notify_one();
    }

    /// Allow the countdown to arm
    pub fn enable(&self) {
        self.inner.enabled.store(true, Ordering::Relaxed);
        self.inner.notify.notify_one();
    }

    /// Inhibit the countdown; an inhibited watchdog never triggers
    pub fn disable(&self) {
        self.inner.enabled.store(false, Ordering::Relaxed);
        self.inner.notify.notify_one();
    }

    /// Re-arm with a fresh countdown
    pub fn start_countdown(&self, timeout: Duration) {
        self.inner
            .timeout_nanos
            .store(timeout.as_nanos() as u64, Ordering::Relaxed);
        self.inner.armed.store(true, Ordering::Relaxed);
        self.inner.notify.notify_one();
    }

    /// Times the watchdog has fired since creation
    pub fn trigger_count(&self) -> u32 {
        self.inner.trigger_count.load(Ordering::Relaxed)
    }

    /// Track radio link events: packets feed the countdown, power
    /// transitions gate arming
    pub fn observe(&self, event: &RadioEvent) {
        self.inner.observe(event);
    }

    /// Cloneable handle for feeding this watchdog from an event loop
    pub fn observer(&self) -> WatchdogObserver {
        WatchdogObserver {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Stop the countdown task and wait for it to exit
    pub async fn stop(&mut self) {
        self.inner.stopped.store(true, Ordering::Relaxed);
        self.inner.notify.notify_one();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// Cloneable view of a [`Watchdog`] that can observe radio events
#[derive(Clone)]
pub struct WatchdogObserver {
    inner: Arc<Inner>,
}

impl WatchdogObserver {
    pub fn observe(&self, event: &RadioEvent) {
        self.inner.observe(event);
    }
}

impl Inner {
    fn observe(&self, event: &RadioEvent) {
        match event {
            RadioEvent::Received(_) => {
                self.notify.notify_one();
            }
            RadioEvent::PoweredOn => {
                self.enabled.store(true, Ordering::Relaxed);
                self.notify.notify_one();
            }
            RadioEvent::PoweredOff => {
                self.enabled.store(false, Ordering::Relaxed);
                self.notify.notify_one();
            }
            _ => {}
        }
    }

    async fn run(self: Arc<Self>) {
        loop {
            if self.stopped.load(Ordering::Relaxed) {
                debug!("Watchdog stopped");
                return;
            }

            if !self.enabled.load(Ordering::Relaxed) || !self.armed.load(Ordering::Relaxed) {
                self.notify.notified().await;
                continue;
            }

            let timeout = Duration::from_nanos(self.timeout_nanos.load(Ordering::Relaxed));
            tokio::select! {
                // Feed or control change: re-evaluate with a fresh countdown
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(timeout) => {
                    self.trigger();
                }
            }
        }
    }

    /// Fire exactly once, then disarm
    fn trigger(&self) {
        if !self.enabled.load(Ordering::Relaxed) {
            return;
        }
        if !self.armed.swap(false, Ordering::Relaxed) {
            return;
        }

        info!("Watchdog triggered, resuming radio transmitter");
        self.trigger_count.fetch_add(1, Ordering::Relaxed);
        if self.transmitter.is_paused() {
            self.transmitter.resume();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;

    fn paused_transmitter() -> DeviceHandle {
        let scheduler = Scheduler::new();
        scheduler.pause();
        DeviceHandle::new("radio-transmitter", scheduler)
    }

    #[tokio::test]
    async fn test_triggers_once_and_resumes_transmitter() {
        let transmitter = paused_transmitter();
        let mut watchdog = Watchdog::new(Duration::from_millis(200), transmitter.clone());
        watchdog.start();
        watchdog.enable();

        let start = std::time::Instant::now();
        while watchdog.trigger_count() == 0 {
            assert!(
                start.elapsed() < Duration::from_secs(2),
                "watchdog never triggered"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed <= Duration::from_millis(600));
        assert!(!transmitter.is_paused());

        // One-shot: no further trigger without an explicit restart
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(watchdog.trigger_count(), 1);

        watchdog.stop().await;
    }

    #[tokio::test]
    async fn test_feeding_defers_trigger() {
        let transmitter = paused_transmitter();
        let mut watchdog = Watchdog::new(Duration::from_millis(200), transmitter.clone());
        watchdog.start();
        watchdog.enable();

        for _ in 0..8 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            watchdog.feed();
        }
        assert_eq!(watchdog.trigger_count(), 0);
        assert!(transmitter.is_paused());

        watchdog.stop().await;
    }

    #[tokio::test]
    async fn test_disabled_watchdog_never_triggers() {
        let transmitter = paused_transmitter();
        let mut watchdog = Watchdog::new(Duration::from_millis(100), transmitter.clone());
        watchdog.start();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(watchdog.trigger_count(), 0);
        assert!(transmitter.is_paused());

        watchdog.stop().await;
    }

    #[tokio::test]
    async fn test_start_countdown_rearms() {
        let transmitter = paused_transmitter();
        let mut watchdog = Watchdog::new(Duration::from_millis(100), transmitter.clone());
        watchdog.start();
        watchdog.enable();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(watchdog.trigger_count(), 1);

        transmitter.pause();
        watchdog.start_countdown(Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(watchdog.trigger_count(), 2);
        assert!(!transmitter.is_paused());

        watchdog.stop().await;
    }

    #[tokio::test]
    async fn test_observe_maps_radio_events() {
        let transmitter = paused_transmitter();
        let mut watchdog = Watchdog::new(Duration::from_millis(150), transmitter.clone());
        watchdog.start();

        watchdog.observe(&RadioEvent::PoweredOn);
        // Packets keep it quiet
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            watchdog.observe(&RadioEvent::Received(crate::radio::RxPacket {
                source_address: 1,
                signal_strength: 90,
                options: 0,
                payload: vec![],
            }));
        }
        assert_eq!(watchdog.trigger_count(), 0);

        // Power off gates arming again
        watchdog.observe(&RadioEvent::PoweredOff);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(watchdog.trigger_count(), 0);

        watchdog.stop().await;
    }
}
