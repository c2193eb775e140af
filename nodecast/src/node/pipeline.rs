//! Pipeline role: transforms records arriving on one or more input topics
//! into records published on an output topic.

use crate::config::NodeConfig;
use crate::error::AppResult;
use crate::node::Role;
use crate::zmq::{PubSocket, SubSocket};
use compio::net::TcpStream;
use hashbrown::HashSet;
use nodecast_core::control::ControlWord;
use nodecast_core::envelope::{Packet, Payload, Record};
use std::net::SocketAddr;
use tracing::debug;

/// A stream transform driven by a [`PipelineRole`]. `flush` is called once,
/// at stop, to let a windowing/batching transform emit whatever partial
/// output it was holding rather than silently dropping it.
#[async_trait::async_trait]
pub trait PipelineTransform: Send {
    async fn transform(&mut self, topic: &str, record: Record) -> AppResult<Vec<Record>>;

    async fn flush(&mut self) -> AppResult<Vec<Record>> {
        Ok(Vec::new())
    }

    fn output_topic(&self) -> String;
}

/// Subscribes to input topic prefixes, runs every arriving record through
/// a [`PipelineTransform`], and publishes its output on the transform's
/// own topic. Finishes once every input topic has reported `END` and the
/// transform's final flush has been published and `END`-ed in turn.
pub struct PipelineRole<T: PipelineTransform> {
    input_prefixes: Vec<String>,
    broker_addr_in: SocketAddr,
    broker_addr_out: SocketAddr,
    input: Option<SubSocket>,
    output: Option<PubSocket>,
    transform: T,
    live: HashSet<String>,
    seen_any: bool,
    /// `true` once every upstream topic seen has reported `END`, or the
    /// input socket itself closed -- the only conditions that legitimately
    /// start the flush+`END` sequence. A downstream `KILL` does not set
    /// this; a Pipeline keeps transforming until its inputs are actually
    /// exhausted.
    draining: bool,
    flushed: bool,
    sent_end: bool,
}

impl<T: PipelineTransform> PipelineRole<T> {
    #[must_use]
    pub fn new(config: &NodeConfig, input_prefixes: Vec<String>, transform: T) -> Self {
        Self {
            input_prefixes,
            broker_addr_in: SocketAddr::new(config.broker_addr, config.ports.frontend),
            broker_addr_out: SocketAddr::new(config.broker_addr, config.ports.backend),
            input: None,
            output: None,
            transform,
            live: HashSet::new(),
            seen_any: false,
            draining: false,
            flushed: false,
            sent_end: false,
        }
    }

    async fn publish_all(&mut self, records: Vec<Record>) -> AppResult<()> {
        let topic = self.transform.output_topic();
        let out = self.output.as_mut().expect("on_start not called");
        for record in records {
            let packet = Packet::data(topic.clone(), record);
            out.send(packet.into_frames()?).await?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl<T: PipelineTransform> Role for PipelineRole<T> {
    async fn on_start(&mut self) -> AppResult<()> {
        let in_stream = TcpStream::connect(self.broker_addr_in).await?;
        let mut input = SubSocket::from_tcp(in_stream).await?;
        for prefix in &self.input_prefixes {
            input.subscribe(prefix.as_bytes());
        }
        self.input = Some(input);

        let out_stream = TcpStream::connect(self.broker_addr_out).await?;
        self.output = Some(PubSocket::from_tcp(out_stream).await?);
        Ok(())
    }

    async fn poll_once(&mut self) -> AppResult<()> {
        if self.draining {
            if !self.flushed {
                let pending = self.transform.flush().await?;
                self.publish_all(pending).await?;
                self.flushed = true;
            }
            if !self.sent_end {
                let topic = self.transform.output_topic();
                let packet = Packet::control(topic, ControlWord::End);
                self.output
                    .as_mut()
                    .expect("on_start not called")
                    .send(packet.into_frames()?)
                    .await?;
                self.sent_end = true;
                debug!("pipeline sent END after flush");
            }
            return Ok(());
        }

        let sock = self.input.as_mut().expect("on_start not called");
        let Some(frames) = sock.recv().await? else {
            self.draining = true;
            return Ok(());
        };

        let topic = String::from_utf8_lossy(&frames[0]).into_owned();
        let packet = match Packet::from_frames(frames) {
            Ok(p) => p,
            Err(e) => {
                debug!(%topic, error = %e, "pipeline dropping malformed packet");
                return Ok(());
            }
        };

        match packet.payload {
            Payload::Record(record) => {
                self.live.insert(topic.clone());
                self.seen_any = true;
                let out = self.transform.transform(&topic, record).await?;
                self.publish_all(out).await?;
            }
            Payload::Control(ControlWord::End) => {
                self.live.remove(&topic);
                if self.seen_any && self.live.is_empty() {
                    self.draining = true;
                }
            }
            Payload::Control(_) => {}
        }
        Ok(())
    }

    /// A downstream `KILL` does not stop a Pipeline from transforming: it
    /// must keep going until every upstream topic it has seen reports
    /// `END`, then flush. No-op.
    fn trigger_stop(&mut self) {}

    fn is_done(&self) -> bool {
        self.sent_end
    }
}
