//! Node lifecycle FSM: Start -> Sync -> Running -> Kill -> Join.
//!
//! A Node is a thin driver around a [`Role`] (Producer, Consumer, or
//! Pipeline). The driver owns the two sockets every Node needs regardless
//! of role -- the kill subscription and the sync barrier connection -- and
//! leaves all data-path sockets to the role itself. Kill is idempotent:
//! once the driver has left `Running`, further kill signals are ignored
//! rather than re-entering `Kill`.

pub mod consumer;
pub mod pipeline;
pub mod producer;

use crate::config::NodeConfig;
use crate::error::{AppResult, NodecastAppError};
use crate::zmq::sync::SyncSocket;
use crate::zmq::SubSocket;
use bytes::Bytes;
use futures::FutureExt;
use nodecast_core::control::ControlWord;
use std::net::SocketAddr;
use tracing::{debug, info, warn};

pub use consumer::{ConsumerRole, ConsumerSink};
pub use pipeline::PipelineRole;
pub use producer::{DelayEstimator, ProducerDevice, ProducerRole};

/// A Node's position in its own lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Start,
    Sync,
    Running,
    Kill,
    Join,
}

/// The behavior a [`Node`] drives. Implemented by `ProducerRole`,
/// `ConsumerRole`, and `PipelineRole`.
#[async_trait::async_trait]
pub trait Role: Send {
    /// Bring up data-path sockets and any device connection. Returning an
    /// error here is fatal: the Node moves straight to `Kill`.
    async fn on_start(&mut self) -> AppResult<()>;

    /// Perform one unit of data-path work (read one sample and publish it,
    /// or receive one packet and hand it to a sink). Should not block
    /// forever; an idle role should await on its own socket so the Node's
    /// kill-detection select can still fire.
    async fn poll_once(&mut self) -> AppResult<()>;

    /// Ask the role to wind down: stop producing, send `END`, flush
    /// pending output. Called once, at Kill entry.
    fn trigger_stop(&mut self);

    /// `true` once the role has finished draining and the Node may exit
    /// `Join`.
    fn is_done(&self) -> bool;

    /// Final handshake on the sync channel before the Node exits `Join`.
    /// Called exactly once, after `is_done()` first returns `true`. Most
    /// roles have nothing further to do here; a Producer overrides this
    /// to await the Broker's `BYE` reply before disconnecting, so its
    /// backend socket isn't torn down while the Broker may still be
    /// forwarding its last frames.
    async fn await_drain_ack(&mut self, _sync: &mut SyncSocket) -> AppResult<()> {
        Ok(())
    }
}

/// Drives one [`Role`] through the Node lifecycle against a Broker.
pub struct Node<R: Role> {
    tag: String,
    state: NodeState,
    kill_sub: SubSocket,
    sync: SyncSocket,
    role: R,
}

impl<R: Role> Node<R> {
    /// Connect the kill and sync sockets and construct a Node in `Start`.
    /// The role's own data sockets are brought up later, in
    /// [`Node::run`]'s `Start` step.
    pub async fn connect(config: NodeConfig, role: R) -> AppResult<Self> {
        let kill_addr = SocketAddr::new(config.broker_addr, config.ports.kill);
        let mut kill_sub = SubSocket::connect(&kill_addr.to_string()).await?;
        kill_sub.subscribe(b"");

        let sync_addr = SocketAddr::new(config.broker_addr, config.ports.sync);
        let sync = SyncSocket::connect(sync_addr, Bytes::from(config.tag.clone())).await?;

        Ok(Self {
            tag: config.tag,
            state: NodeState::Start,
            kill_sub,
            sync,
            role,
        })
    }

    #[must_use]
    pub const fn state(&self) -> NodeState {
        self.state
    }

    /// Run the Node to completion: through `Start`, the sync barrier,
    /// `Running` until a kill is observed or the role finishes on its own,
    /// then `Kill`/`Join` drain.
    pub async fn run(mut self) -> AppResult<()> {
        loop {
            match self.state {
                NodeState::Start => {
                    self.role.on_start().await?;
                    self.state = NodeState::Sync;
                }
                NodeState::Sync => {
                    self.do_sync().await?;
                    info!(tag = %self.tag, "sync barrier released, entering Running");
                    self.state = NodeState::Running;
                }
                NodeState::Running => {
                    self.do_running().await?;
                    if self.role.is_done() {
                        // The role finished on its own (e.g. a Producer
                        // exhausted its device) without an external kill.
                        self.state = NodeState::Kill;
                    }
                }
                NodeState::Kill => {
                    self.role.trigger_stop();
                    self.state = NodeState::Join;
                }
                NodeState::Join => {
                    if self.role.is_done() {
                        self.role.await_drain_ack(&mut self.sync).await?;
                        break;
                    }
                    self.role.poll_once().await?;
                }
            }
        }
        self.cleanup().await
    }

    async fn do_sync(&mut self) -> AppResult<()> {
        self.sync.send(Bytes::from(self.tag.clone())).await?;
        match self.sync.recv().await? {
            Some(reply) if ControlWord::parse(&reply) == Some(ControlWord::Go) => Ok(()),
            other => Err(NodecastAppError::SyncFailed(format!(
                "expected GO from broker, got {other:?}"
            ))),
        }
    }

    /// One step of `Running`: race the kill subscription against the
    /// role's own unit of work. Kill detection is only active in
    /// `Running` -- once the Node has entered `Kill`/`Join`, further
    /// kill frames are simply never polled again, which is what makes a
    /// second kill signal a no-op.
    async fn do_running(&mut self) -> AppResult<()> {
        futures::select! {
            msg = self.kill_sub.recv().fuse() => {
                match msg {
                    Ok(Some(_)) => {
                        debug!(tag = %self.tag, "kill signal received");
                        self.state = NodeState::Kill;
                    }
                    Ok(None) => {
                        warn!(tag = %self.tag, "kill socket closed, treating as kill");
                        self.state = NodeState::Kill;
                    }
                    Err(e) => return Err(e.into()),
                }
                Ok(())
            }
            res = self.role.poll_once().fuse() => res,
        }
    }

    async fn cleanup(self) -> AppResult<()> {
        debug!(tag = %self.tag, "node cleanup complete");
        Ok(())
    }
}
