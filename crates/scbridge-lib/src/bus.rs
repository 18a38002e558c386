//! The message bus between the registry and the engine.
//!
//! Outbound requests are fire-and-forget: no acknowledgment is awaited and
//! nothing is retried. A dropped request simply resolves at the next
//! confirmation, or not at all. The inbound side is a UDP listener task that
//! feeds parsed confirmation events to [`VoiceRegistry::handle_event`].
//!
//! [`VoiceRegistry::handle_event`]: crate::registry::VoiceRegistry::handle_event

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Mutex;

use tracing::{debug, warn};

use scbridge_core::protocol::{InboundEvent, OutboundMessage};

use crate::registry::VoiceRegistry;

/// Outbound transport. Implementations must not block on delivery.
pub trait MessageBus: Send + Sync {
    /// Emit one request toward the engine. Best-effort; errors are logged by
    /// the implementation, never surfaced.
    fn send(&self, msg: &OutboundMessage);
}

// ─── UDP transport ─────────────────────────────────────────────────────────

/// Datagram transport carrying the space-joined token line per message.
///
/// The target port is reconfigurable at runtime (the engine's language side
/// announces which port it listens on after boot).
pub struct UdpBus {
    socket: UdpSocket,
    target: Mutex<SocketAddr>,
}

impl UdpBus {
    pub fn new(target: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self {
            socket,
            target: Mutex::new(target),
        })
    }

    /// Redirect outbound traffic to a different engine-side port.
    pub fn set_port(&self, port: u16) {
        let mut target = self.target.lock().unwrap();
        target.set_port(port);
    }

    pub fn port(&self) -> u16 {
        self.target.lock().unwrap().port()
    }
}

impl MessageBus for UdpBus {
    fn send(&self, msg: &OutboundMessage) {
        let target = *self.target.lock().unwrap();
        let payload = msg.encode();
        if let Err(e) = self.socket.send_to(payload.as_bytes(), target) {
            warn!("failed to send {} message to {target}: {e}", msg.action.as_str());
        }
    }
}

// ─── Test transport ────────────────────────────────────────────────────────

/// In-memory bus recording every message, for tests and dry runs.
#[derive(Debug, Default)]
pub struct RecordingBus {
    sent: Mutex<Vec<OutboundMessage>>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far, oldest first.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Drain the recorded messages.
    pub fn take(&self) -> Vec<OutboundMessage> {
        std::mem::take(&mut self.sent.lock().unwrap())
    }
}

impl MessageBus for RecordingBus {
    fn send(&self, msg: &OutboundMessage) {
        self.sent.lock().unwrap().push(msg.clone());
    }
}

// ─── Inbound listener ──────────────────────────────────────────────────────

/// Drain confirmation datagrams into the registry until the socket fails.
///
/// Malformed events are dropped per-datagram-line; the channel offers no
/// delivery guarantees, so a bad event is a race to log, not an error.
pub async fn run_listener(socket: tokio::net::UdpSocket, registry: VoiceRegistry) {
    let mut buf = [0u8; 2048];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((n, _peer)) => {
                let text = String::from_utf8_lossy(&buf[..n]);
                for line in text.lines() {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match InboundEvent::parse_line(line) {
                        Ok(event) => registry.handle_event(event),
                        Err(e) => debug!("dropping malformed engine event {line:?}: {e}"),
                    }
                }
            }
            Err(e) => {
                warn!("feedback socket closed: {e}");
                break;
            }
        }
    }
}
