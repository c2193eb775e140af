//! Consumer role: subscribes to one or more topics and feeds incoming
//! records to a sink.

use crate::config::NodeConfig;
use crate::error::AppResult;
use crate::node::Role;
use crate::zmq::SubSocket;
use compio::net::TcpStream;
use hashbrown::HashSet;
use nodecast_core::envelope::{Packet, Payload};
use std::net::SocketAddr;
use tracing::{debug, warn};

/// What a Consumer does with an incoming record. A disk logger, a live
/// plot, and a downstream re-publish are all sinks.
#[async_trait::async_trait]
pub trait ConsumerSink: Send {
    async fn on_record(&mut self, topic: &str, record: nodecast_core::envelope::Record) -> AppResult<()>;
}

/// Subscribes to a fixed set of topic prefixes on the broker's frontend
/// and dispatches every record to a [`ConsumerSink`].
///
/// Finishes once every subscribed topic it has actually seen traffic from
/// has reported `END` -- this is the "still-live tags" bookkeeping: a
/// topic only counts against completion once a producer has announced it,
/// so a Consumer subscribed to a prefix no one ever publishes under does
/// not block forever.
pub struct ConsumerRole<S: ConsumerSink> {
    prefixes: Vec<String>,
    broker_addr: SocketAddr,
    data: Option<SubSocket>,
    sink: S,
    /// Topics seen at least one data frame from, not yet `END`-ed.
    live: HashSet<String>,
    /// `true` once any record has ever arrived, so a Consumer subscribed
    /// to a prefix nobody publishes under doesn't report done at startup.
    seen_any: bool,
    /// `true` once the frontend socket itself has closed -- the only
    /// thing that legitimately stops a Consumer from reading further,
    /// since completion is otherwise driven purely by per-topic `END`.
    socket_closed: bool,
}

impl<S: ConsumerSink> ConsumerRole<S> {
    #[must_use]
    pub fn new(config: &NodeConfig, prefixes: Vec<String>, sink: S) -> Self {
        Self {
            prefixes,
            broker_addr: SocketAddr::new(config.broker_addr, config.ports.frontend),
            data: None,
            sink,
            live: HashSet::new(),
            seen_any: false,
            socket_closed: false,
        }
    }
}

#[async_trait::async_trait]
impl<S: ConsumerSink> Role for ConsumerRole<S> {
    async fn on_start(&mut self) -> AppResult<()> {
        let stream = TcpStream::connect(self.broker_addr).await?;
        let mut sub = SubSocket::from_tcp(stream).await?;
        for prefix in &self.prefixes {
            sub.subscribe(prefix.as_bytes());
        }
        self.data = Some(sub);
        Ok(())
    }

    async fn poll_once(&mut self) -> AppResult<()> {
        if self.socket_closed {
            return Ok(());
        }
        let sock = self.data.as_mut().expect("poll_once called before on_start");
        let Some(frames) = sock.recv().await? else {
            warn!("consumer data socket closed by broker");
            self.socket_closed = true;
            return Ok(());
        };

        let topic = String::from_utf8_lossy(&frames[0]).into_owned();
        let packet = match Packet::from_frames(frames) {
            Ok(p) => p,
            Err(e) => {
                debug!(%topic, error = %e, "dropping malformed packet");
                return Ok(());
            }
        };

        match packet.payload {
            Payload::Record(record) => {
                self.live.insert(topic.clone());
                self.seen_any = true;
                self.sink.on_record(&topic, record).await?;
            }
            Payload::Control(nodecast_core::control::ControlWord::End) => {
                self.live.remove(&topic);
            }
            Payload::Control(_) => {}
        }
        Ok(())
    }

    /// A downstream `KILL` does not stop a Consumer from reading: it must
    /// keep receiving until `END` on every topic it has seen, per the
    /// "still-live tags" bookkeeping. No-op.
    fn trigger_stop(&mut self) {}

    fn is_done(&self) -> bool {
        self.socket_closed || (self.seen_any && self.live.is_empty())
    }
}
