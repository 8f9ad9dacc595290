//! Command channel: UDP listener feeding the engine queue, plus the
//! acknowledgement sender.
//!
//! The listener never touches engine state. It decodes each datagram and
//! deposits the command on the engine's unbounded queue, so a slow tick can
//! never stall receipt. Malformed datagrams are counted and dropped.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::engine::EngineCommand;
use crate::events::EngineEvent;

/// One datagram is one command; anything longer is truncated and fails to parse.
pub const MAX_DATAGRAM: usize = 4096;

#[derive(Debug, Default)]
pub struct ChannelStats {
    received: AtomicU64,
    dropped: AtomicU64,
}

impl ChannelStats {
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Datagrams discarded as malformed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub struct CommandChannel {
    socket: UdpSocket,
    stats: Arc<ChannelStats>,
}

impl CommandChannel {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("Failed to bind command socket on {}", addr))?;
        Ok(Self {
            socket,
            stats: Arc::new(ChannelStats::default()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().context("Command socket has no local address")
    }

    pub fn stats(&self) -> Arc<ChannelStats> {
        Arc::clone(&self.stats)
    }

    /// Receive until the engine queue closes.
    pub async fn run(self, commands: mpsc::UnboundedSender<EngineCommand>) {
        match self.socket.local_addr() {
            Ok(addr) => info!("Listening for commands on {}", addr),
            Err(_) => info!("Listening for commands"),
        }

        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (len, peer) = match self.socket.recv_from(&mut buf).await {
                Ok(r) => r,
                Err(e) => {
                    // ICMP port-unreachable and friends surface here; keep going.
                    warn!("Command socket receive failed: {}", e);
                    continue;
                }
            };

            let Some(command) = handle_datagram(&buf[..len], &self.stats, peer) else {
                continue;
            };

            if commands.send(EngineCommand::Wire(command)).is_err() {
                debug!("Engine queue closed, listener exiting");
                break;
            }
        }
    }
}

/// Decode one datagram, counting it either way.
pub fn handle_datagram(bytes: &[u8], stats: &ChannelStats, peer: SocketAddr) -> Option<Command> {
    stats.received.fetch_add(1, Ordering::Relaxed);
    match Command::decode(bytes) {
        Ok(command) => Some(command),
        Err(e) => {
            stats.dropped.fetch_add(1, Ordering::Relaxed);
            debug!("Dropped datagram from {}: {}", peer, e);
            None
        }
    }
}

/// Forward every [`EngineEvent::Ack`] to `target` as a JSON datagram.
/// Delivery is best-effort: send failures are logged and never retried.
pub async fn run_acks(mut events: broadcast::Receiver<EngineEvent>, target: SocketAddr) {
    let local: SocketAddr = if target.is_ipv4() {
        ([127, 0, 0, 1], 0).into()
    } else {
        (std::net::Ipv6Addr::LOCALHOST, 0).into()
    };
    let socket = match UdpSocket::bind(local).await {
        Ok(s) => s,
        Err(e) => {
            warn!("Acknowledgements disabled, cannot bind sender: {}", e);
            return;
        }
    };
    info!("Sending acknowledgements to {}", target);

    loop {
        match events.recv().await {
            Ok(EngineEvent::Ack(ack)) => {
                let payload = match serde_json::to_vec(&ack) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!("Failed to serialize ack: {}", e);
                        continue;
                    }
                };
                if let Err(e) = socket.send_to(&payload, target).await {
                    warn!("Failed to send ack to {}: {}", target, e);
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Ack sender lagged {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Ack;
    use std::time::Duration;

    fn loopback() -> SocketAddr {
        ([127, 0, 0, 1], 0).into()
    }

    #[tokio::test]
    async fn test_listener_forwards_well_formed_and_counts_drops() {
        let channel = CommandChannel::bind(loopback()).await.unwrap();
        let addr = channel.local_addr().unwrap();
        let stats = channel.stats();
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(channel.run(tx));

        let sender = UdpSocket::bind(loopback()).await.unwrap();
        sender.send_to(b"garbage", addr).await.unwrap();
        sender.send_to(br#"{"foo": 1}"#, addr).await.unwrap();
        sender.send_to(br#"{"state": "happy"}"#, addr).await.unwrap();

        let cmd = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match cmd {
            EngineCommand::Wire(c) => assert_eq!(c.expression.as_deref(), Some("happy")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(stats.received(), 3);
        assert_eq!(stats.dropped(), 2);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_handle_datagram_counts() {
        let stats = ChannelStats::default();
        let peer = loopback();
        assert!(handle_datagram(b"[]", &stats, peer).is_none());
        assert!(handle_datagram(br#"{"particle": "star"}"#, &stats, peer).is_some());
        assert_eq!(stats.received(), 2);
        assert_eq!(stats.dropped(), 1);
    }

    #[tokio::test]
    async fn test_acks_forwarded_as_json() {
        let receiver = UdpSocket::bind(loopback()).await.unwrap();
        let target = receiver.local_addr().unwrap();
        let (event_tx, event_rx) = broadcast::channel(16);
        tokio::spawn(run_acks(event_rx, target));
        // Give the sender a moment to bind before events flow.
        tokio::time::sleep(Duration::from_millis(50)).await;

        event_tx
            .send(EngineEvent::Rate(crate::types::RateData { fps: 30 }))
            .unwrap();
        event_tx
            .send(EngineEvent::Ack(Ack::new("thinking", Some("thinking"))))
            .unwrap();

        let mut buf = [0u8; 1024];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), receiver.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let ack: Ack = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(ack.state, "thinking");
        assert_eq!(ack.status, "ok");
    }

    #[tokio::test]
    async fn test_ack_to_closed_port_is_not_fatal() {
        let closed = {
            let s = UdpSocket::bind(loopback()).await.unwrap();
            s.local_addr().unwrap()
        };
        let (event_tx, event_rx) = broadcast::channel(16);
        let handle = tokio::spawn(run_acks(event_rx, closed));
        tokio::time::sleep(Duration::from_millis(50)).await;
        for _ in 0..3 {
            event_tx.send(EngineEvent::Ack(Ack::new("idle", None))).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        drop(event_tx);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
