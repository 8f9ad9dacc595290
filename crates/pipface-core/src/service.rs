//! Wires an engine to its sockets and spawns the three tasks: the tick loop,
//! the command listener and the acknowledgement sender.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

use crate::channel::{self, ChannelStats, CommandChannel};
use crate::clock::{Clock, TokioClock};
use crate::config::Config;
use crate::engine::{Engine, EngineCommand};
use crate::events::EngineEvent;
use crate::expression::ExpressionTable;
use crate::types::FaceSnapshot;

pub struct Service {
    commands: mpsc::UnboundedSender<EngineCommand>,
    events: broadcast::Receiver<EngineEvent>,
    snapshots: watch::Receiver<FaceSnapshot>,
    stats: Arc<ChannelStats>,
    command_addr: SocketAddr,
    engine: JoinHandle<()>,
    listener: JoinHandle<()>,
    acks: JoinHandle<()>,
}

impl Service {
    /// Start with the builtin expressions and tokio's clock.
    pub async fn start(config: Config) -> Result<Self> {
        Self::start_with(config, ExpressionTable::builtin(), Arc::new(TokioClock)).await
    }

    pub async fn start_with(
        config: Config,
        table: ExpressionTable,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let channel = CommandChannel::bind(config.command_addr()).await?;
        let command_addr = channel.local_addr()?;
        let stats = channel.stats();
        let ack_addr = config.ack_addr();

        let engine = Engine::new(config, table, clock).context("Failed to build engine")?;
        let commands = engine.command_sender();
        let events = engine.subscribe();
        let snapshots = engine.snapshots();
        let ack_events = engine.subscribe();

        let listener = tokio::spawn(channel.run(commands.clone()));
        let acks = tokio::spawn(channel::run_acks(ack_events, ack_addr));
        let engine = tokio::spawn(engine.run());

        info!("Face service up: commands on {}, acks to {}", command_addr, ack_addr);

        Ok(Self {
            commands,
            events,
            snapshots,
            stats,
            command_addr,
            engine,
            listener,
            acks,
        })
    }

    pub fn command_sender(&self) -> mpsc::UnboundedSender<EngineCommand> {
        self.commands.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.resubscribe()
    }

    pub fn snapshots(&self) -> watch::Receiver<FaceSnapshot> {
        self.snapshots.clone()
    }

    pub fn stats(&self) -> Arc<ChannelStats> {
        Arc::clone(&self.stats)
    }

    /// Where the listener actually bound (useful with port 0).
    pub fn command_addr(&self) -> SocketAddr {
        self.command_addr
    }

    /// Stop the engine and wait for its loop to finish.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.commands.send(EngineCommand::Stop);
        self.engine.await.context("Engine task failed")?;
        self.listener.abort();
        self.acks.abort();
        info!("Face service stopped");
        Ok(())
    }
}
