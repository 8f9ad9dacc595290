//! Client side of the command protocol, for integrations that drive the face
//! from another process. Call it explicitly before doing your own work.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tracing::debug;

use crate::command::Command;
use crate::config::Config;
use crate::expression::{IDLE, SLEEPING};
use crate::types::Ack;

pub struct FaceClient {
    socket: UdpSocket,
    target: SocketAddr,
}

impl FaceClient {
    pub async fn connect(target: SocketAddr) -> Result<Self> {
        let local: SocketAddr = if target.is_ipv4() {
            ([127, 0, 0, 1], 0).into()
        } else {
            (std::net::Ipv6Addr::LOCALHOST, 0).into()
        };
        let socket = UdpSocket::bind(local)
            .await
            .context("Failed to bind client socket")?;
        Ok(Self { socket, target })
    }

    pub async fn from_config(config: &Config) -> Result<Self> {
        Self::connect(config.command_addr()).await
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Fire-and-forget; no acknowledgement is awaited.
    pub async fn send(&self, command: &Command) -> Result<()> {
        let payload = command.encode();
        self.socket
            .send_to(&payload, self.target)
            .await
            .with_context(|| format!("Failed to send command to {}", self.target))?;
        debug!("Sent {} bytes to {}", payload.len(), self.target);
        Ok(())
    }

    pub async fn idle(&self) -> Result<()> {
        self.send(&Command::expression(IDLE)).await
    }

    pub async fn sleeping(&self) -> Result<()> {
        self.send(&Command::expression(SLEEPING)).await
    }

    pub async fn thinking(&self, duration: Option<f64>) -> Result<()> {
        self.send(&timed("thinking", duration)).await
    }

    pub async fn speaking(&self, amplitude: f32, duration: Option<f64>) -> Result<()> {
        self.send(&timed("speaking", duration).with_amplitude(amplitude))
            .await
    }

    pub async fn working(&self, duration: Option<f64>) -> Result<()> {
        self.send(&timed("working", duration)).await
    }

    /// Happy with a few hearts.
    pub async fn happy(&self, duration: Option<f64>) -> Result<()> {
        self.send(&timed("happy", duration).with_particle("heart", Some(5)))
            .await
    }

    pub async fn error(&self, duration: Option<f64>) -> Result<()> {
        self.send(&timed("error", duration)).await
    }

    pub async fn particle(&self, kind: &str, count: Option<u32>) -> Result<()> {
        self.send(&Command::default().with_particle(kind, count)).await
    }
}

fn timed(name: &str, duration: Option<f64>) -> Command {
    let cmd = Command::expression(name);
    match duration {
        Some(d) => cmd.with_duration(d),
        None => cmd,
    }
}

/// Binds the acknowledgement port and yields decoded acks.
pub struct AckListener {
    socket: UdpSocket,
}

impl AckListener {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("Failed to bind ack socket on {}", addr))?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().context("Ack socket has no local address")
    }

    /// Next ack, or `None` on timeout. Undecodable datagrams are skipped.
    pub async fn recv(&self, timeout: Duration) -> Result<Option<Ack>> {
        let mut buf = [0u8; 1024];
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let received = tokio::time::timeout_at(deadline, self.socket.recv_from(&mut buf)).await;
            let (len, peer) = match received {
                Ok(r) => r.context("Ack socket receive failed")?,
                Err(_) => return Ok(None),
            };
            match serde_json::from_slice::<Ack>(&buf[..len]) {
                Ok(ack) => return Ok(Some(ack)),
                Err(e) => debug!("Skipping undecodable ack from {}: {}", peer, e),
            }
        }
    }
}
