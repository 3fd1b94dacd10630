//! # Telemetry Server
//!
//! Vehicle-side responder of the datagram protocol. Answers SENSOR
//! requests with the masked snapshot and echoes PING probes so clients
//! can measure round-trip latency.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::net::message::{
    self, DatagramMessage, MAX_DATAGRAM_SIZE, MESSAGE_PING, MESSAGE_SENSOR,
};
use crate::sensors::TelemetryState;

/// Vehicle-side telemetry responder
pub struct TelemetryServer {
    local_addr: SocketAddr,
    task: Option<JoinHandle<()>>,
}

impl TelemetryServer {
    /// Bind the server socket and start answering requests
    ///
    /// # Errors
    ///
    /// Returns error if the socket cannot be bound.
    pub async fn bind(addr: &str, state: Arc<TelemetryState>) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        let local_addr = socket.local_addr()?;
        info!("Telemetry server listening on {}", local_addr);

        let task = tokio::spawn(serve(socket, state));
        Ok(Self {
            local_addr,
            task: Some(task),
        })
    }

    /// Address the server actually bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the server task
    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

async fn serve(socket: UdpSocket, state: Arc<TelemetryState>) {
    let mut recv_buf = [0u8; MAX_DATAGRAM_SIZE];
    let mut send_buf = BytesMut::with_capacity(MAX_DATAGRAM_SIZE);

    loop {
        let (len, peer) = match socket.recv_from(&mut recv_buf).await {
            Ok(received) => received,
            Err(e) => {
                warn!("Server receive failed: {}", e);
                continue;
            }
        };

        let datagram = Bytes::copy_from_slice(&recv_buf[..len]);
        let mut request = match DatagramMessage::decode(datagram) {
            Ok(request) => request,
            Err(e) => {
                debug!("Dropping malformed request from {}: {}", peer, e);
                continue;
            }
        };

        send_buf.clear();
        match request.id {
            MESSAGE_PING => {
                message::write_ping_response(&mut send_buf, request.number, &request.data);
            }
            MESSAGE_SENSOR => {
                if request.data.remaining() < 1 {
                    debug!("Dropping sensor request without mask from {}", peer);
                    continue;
                }
                let mask = request.data.get_u8();
                message::write_sensor_response(&mut send_buf, request.number, mask, &state);
            }
            id => {
                debug!("Dropping request with unknown id 0x{:02X} from {}", id, peer);
                continue;
            }
        }

        if let Err(e) = socket.send_to(&send_buf, peer).await {
            warn!("Server send to {} failed: {}", peer, e);
        }
    }
}
