//! # Console Client
//!
//! Ground-console side of the datagram protocol: paces SENSOR requests,
//! probes round-trip latency with PINGs and applies accepted responses to
//! a shared [`TelemetryState`].
//!
//! Every outbound message draws from one shared sequence counter, and a
//! response is accepted only if its number lies in the window
//! `(last accepted, highest sent]` — anything else is dropped as stale or
//! as an echo of a request that was never made.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::net::message::{
    self, DatagramMessage, MAX_DATAGRAM_SIZE, MESSAGE_PING, MESSAGE_SENSOR,
};
use crate::scheduler::Scheduler;
use crate::sensors::TelemetryState;

/// Events delivered to the client's consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A SENSOR response was accepted; only the masked categories changed
    SensorsUpdated { mask: u8 },

    /// A PING response arrived
    PingResponse { latency: Duration },
}

/// Sentinel for "no ping response received yet"
const NO_LATENCY: u64 = u64::MAX;

/// Capacity of the event channel; events overflow silently when the
/// consumer lags, matching no-op-if-absent listener semantics
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Ground-console telemetry client
pub struct TelemetryClient {
    inner: Arc<ClientInner>,
    scheduler: Scheduler,
    recv_task: Option<JoinHandle<()>>,
    poll_task: Option<JoinHandle<()>>,
}

struct ClientInner {
    socket: UdpSocket,
    state: Arc<TelemetryState>,
    /// Monotonic clock base embedded in PING payloads
    epoch: Instant,
    /// Highest request number sent, shared by all outbound message types
    request_number: AtomicU32,
    /// Highest response number accepted
    response_number: AtomicU32,
    latency_nanos: AtomicU64,
    /// One in-flight encode at a time
    send_buf: Mutex<BytesMut>,
    events: mpsc::Sender<ClientEvent>,
}

impl TelemetryClient {
    /// Connect to a telemetry server and start the receive task
    ///
    /// Returns the client and the event stream carrying decoded
    /// responses.
    ///
    /// # Errors
    ///
    /// Returns error if the local socket cannot be bound or connected.
    pub async fn connect(
        server: SocketAddr,
        state: Arc<TelemetryState>,
    ) -> Result<(Self, mpsc::Receiver<ClientEvent>)> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(server).await?;
        info!("Telemetry client connected to {}", server);

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let inner = Arc::new(ClientInner {
            socket,
            state,
            epoch: Instant::now(),
            request_number: AtomicU32::new(0),
            response_number: AtomicU32::new(0),
            latency_nanos: AtomicU64::new(NO_LATENCY),
            send_buf: Mutex::new(BytesMut::with_capacity(MAX_DATAGRAM_SIZE)),
            events: events_tx,
        });

        let recv_task = tokio::spawn(Arc::clone(&inner).receive_loop());

        let client = Self {
            inner,
            scheduler: Scheduler::new(),
            recv_task: Some(recv_task),
            poll_task: None,
        };
        Ok((client, events_rx))
    }

    /// Start the paced SENSOR polling loop for the given mask
    ///
    /// Each scheduled cycle sends one request; send failures are logged
    /// and the next cycle is the retry.
    pub fn start_polling(&mut self, mask: u8) {
        if self.poll_task.is_some() {
            return;
        }

        let inner = Arc::clone(&self.inner);
        let scheduler = self.scheduler.clone();
        self.poll_task = Some(tokio::spawn(async move {
            loop {
                if let Err(e) = inner.send_sensor_request(mask).await {
                    warn!("Sensor request failed: {}", e);
                }
                if !scheduler.pace().await {
                    break;
                }
            }
            debug!("Sensor polling loop exited");
        }));
    }

    /// Set the polling frequency; zero pauses the polling loop
    pub fn set_frequency(&self, hz: f64) -> Result<()> {
        if hz == 0.0 {
            self.scheduler.pause();
            return Ok(());
        }
        self.scheduler.set_frequency(hz)?;
        self.scheduler.resume();
        Ok(())
    }

    /// Send one PING probe
    pub async fn send_ping(&self) -> Result<()> {
        self.inner.send_ping().await
    }

    /// Send one SENSOR request outside the polling loop
    pub async fn send_sensor_request(&self, mask: u8) -> Result<()> {
        self.inner.send_sensor_request(mask).await
    }

    /// Round-trip latency of the last accepted PING response
    pub fn latency(&self) -> Option<Duration> {
        match self.inner.latency_nanos.load(Ordering::Relaxed) {
            NO_LATENCY => None,
            nanos => Some(Duration::from_nanos(nanos)),
        }
    }

    /// Stop the polling and receive tasks and wait for them to exit
    pub async fn stop(&mut self) {
        self.scheduler.shutdown();
        if let Some(task) = self.poll_task.take() {
            let _ = task.await;
        }
        if let Some(task) = self.recv_task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl ClientInner {
    async fn receive_loop(self: Arc<Self>) {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        loop {
            match self.socket.recv(&mut buf).await {
                Ok(len) => {
                    let datagram = Bytes::copy_from_slice(&buf[..len]);
                    self.handle_datagram(datagram);
                }
                Err(e) => {
                    warn!("Client receive failed: {}", e);
                }
            }
        }
    }

    /// A malformed datagram is logged and dropped; it never stops the
    /// receive loop.
    fn handle_datagram(&self, datagram: Bytes) {
        let message = match DatagramMessage::decode(datagram) {
            Ok(message) => message,
            Err(e) => {
                debug!("Dropping malformed datagram: {}", e);
                return;
            }
        };

        match message.id {
            MESSAGE_PING => self.on_ping_response(message),
            MESSAGE_SENSOR => self.on_sensor_data(message),
            id => debug!("Dropping message with unknown id 0x{:02X}", id),
        }
    }

    fn on_ping_response(&self, mut message: DatagramMessage) {
        if message.data.remaining() < 8 {
            debug!("Dropping short ping response");
            return;
        }
        let sent_nanos = message.data.get_i64();
        let now_nanos = self.clock_nanos();
        let latency = now_nanos.saturating_sub(sent_nanos).max(0) as u64;

        self.latency_nanos.store(latency, Ordering::Relaxed);
        let _ = self.events.try_send(ClientEvent::PingResponse {
            latency: Duration::from_nanos(latency),
        });
    }

    fn on_sensor_data(&self, mut message: DatagramMessage) {
        if message.number != 0 {
            let last = self.response_number.load(Ordering::Relaxed);
            let sent = self.request_number.load(Ordering::Relaxed);
            if !accepts(message.number, last, sent) {
                debug!(
                    "Dropping stale sensor response {} (accepted {}, sent {})",
                    message.number, last, sent
                );
                return;
            }
            self.response_number.store(message.number, Ordering::Relaxed);
        }

        if message.data.remaining() < 1 {
            debug!("Dropping sensor response without mask");
            return;
        }
        let mask = message.data.get_u8();
        if let Err(e) = self.state.decode(&mut message.data, mask) {
            debug!("Dropping undecodable sensor response: {}", e);
            return;
        }

        let _ = self.events.try_send(ClientEvent::SensorsUpdated { mask });
    }

    async fn send_ping(&self) -> Result<()> {
        let number = self.next_request_number();
        let clock = self.clock_nanos();

        let mut buf = self.send_buf.lock().await;
        buf.clear();
        message::write_ping(&mut buf, number, clock);
        self.socket.send(&buf).await?;
        Ok(())
    }

    async fn send_sensor_request(&self, mask: u8) -> Result<()> {
        let number = self.next_request_number();

        let mut buf = self.send_buf.lock().await;
        buf.clear();
        message::write_sensor_request(&mut buf, number, mask);
        self.socket.send(&buf).await?;
        Ok(())
    }

    fn next_request_number(&self) -> u32 {
        self.request_number.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn clock_nanos(&self) -> i64 {
        self.epoch.elapsed().as_nanos() as i64
    }
}

/// Response acceptance window: `(last accepted, highest sent]`
///
/// Anything at or below `last` is a stale duplicate; anything above
/// `sent` answers a request that was never made.
fn accepts(number: u32, last_accepted: u32, highest_sent: u32) -> bool {
    number > last_accepted && number <= highest_sent
}
