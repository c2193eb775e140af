//! Producer role: reads samples from a device and publishes them.

use crate::config::NodeConfig;
use crate::error::AppResult;
use crate::node::Role;
use crate::zmq::sync::SyncSocket;
use crate::zmq::PubSocket;
use compio::net::TcpStream;
use nodecast_core::control::ControlWord;
use nodecast_core::envelope::{Packet, Record};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A data source a [`ProducerRole`] drives. `read_sample` returning `None`
/// means the device is exhausted (end of a recorded file, a disconnect);
/// the role treats that the same as an external stop.
#[async_trait::async_trait]
pub trait ProducerDevice: Send {
    async fn connect(&mut self) -> AppResult<()>;

    async fn read_sample(&mut self) -> AppResult<Option<Record>>;

    /// Dotted topic this device's records publish under. Must equal the
    /// node's sync tag (see [`crate::config::NodeConfig::tag`]) or start
    /// with `"<tag>."`, e.g. a node tagged `"imu.left_foot"` publishing
    /// on `"imu.left_foot.data"`.
    fn topic(&self) -> String;

    /// Optional round-trip delay probe, in seconds. Devices with no
    /// meaningful notion of transmission delay (a synthetic generator, a
    /// file replay) can leave the default.
    async fn probe_delay_s(&mut self) -> AppResult<Option<f64>> {
        Ok(None)
    }
}

/// Tracks when the next delay probe is due. A Producer emits its delay
/// estimate on `"<topic>.delay"` at a fixed cadence rather than per
/// sample, since the probe itself may be comparatively expensive.
pub struct DelayEstimator {
    interval: Duration,
    last_emit: Option<Instant>,
}

impl DelayEstimator {
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
        }
    }

    fn due(&self, now: Instant) -> bool {
        match self.last_emit {
            None => true,
            Some(last) => now.duration_since(last) >= self.interval,
        }
    }

    fn mark(&mut self, now: Instant) {
        self.last_emit = Some(now);
    }
}

/// Drives one [`ProducerDevice`], publishing its samples to the broker's
/// backend socket until the device is exhausted or the Node requests stop.
pub struct ProducerRole<D: ProducerDevice> {
    device: D,
    tag: String,
    broker_addr: SocketAddr,
    data: Option<PubSocket>,
    delay: Option<DelayEstimator>,
    counter: u64,
    stop_requested: bool,
    sent_end: bool,
}

impl<D: ProducerDevice> ProducerRole<D> {
    #[must_use]
    pub fn new(config: &NodeConfig, device: D) -> Self {
        Self {
            device,
            tag: config.tag.clone(),
            broker_addr: SocketAddr::new(config.broker_addr, config.ports.backend),
            data: None,
            delay: None,
            counter: 0,
            stop_requested: false,
            sent_end: false,
        }
    }

    /// Enable a periodic delay probe published on `"<tag>.delay"`.
    #[must_use]
    pub const fn with_delay_probe(mut self, interval: Duration) -> Self {
        self.delay = Some(DelayEstimator::new(interval));
        self
    }

    fn socket(&mut self) -> &mut PubSocket {
        self.data.as_mut().expect("poll_once called before on_start")
    }

    async fn maybe_probe_delay(&mut self) -> AppResult<()> {
        let now = Instant::now();
        let due = matches!(&self.delay, Some(d) if d.due(now));
        if !due {
            return Ok(());
        }
        if let Some(delay_s) = self.device.probe_delay_s().await? {
            let topic = format!("{}.delay", self.tag);
            let record = Record::new(delay_s).with_field("delay_s", delay_s);
            let packet = Packet::data(topic, record);
            self.socket().send(packet.into_frames()?).await?;
        }
        if let Some(d) = &mut self.delay {
            d.mark(now);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl<D: ProducerDevice> Role for ProducerRole<D> {
    async fn on_start(&mut self) -> AppResult<()> {
        self.device.connect().await?;
        let stream = TcpStream::connect(self.broker_addr).await?;
        self.data = Some(PubSocket::from_tcp(stream).await?);
        info!(tag = %self.tag, "producer device online");
        Ok(())
    }

    async fn poll_once(&mut self) -> AppResult<()> {
        if self.stop_requested {
            if !self.sent_end {
                let packet = Packet::control(self.device.topic(), ControlWord::End);
                self.socket().send(packet.into_frames()?).await?;
                self.sent_end = true;
                debug!(tag = %self.tag, "producer sent END");
            }
            return Ok(());
        }

        self.maybe_probe_delay().await?;

        match self.device.read_sample().await? {
            Some(record) => {
                let topic = self.device.topic();
                let packet = Packet::data(topic, record);
                self.socket().send(packet.into_frames()?).await?;
                self.counter += 1;
                Ok(())
            }
            None => {
                self.stop_requested = true;
                Ok(())
            }
        }
    }

    fn trigger_stop(&mut self) {
        self.stop_requested = true;
    }

    fn is_done(&self) -> bool {
        self.sent_end
    }

    /// Wait for the Broker's `BYE` on the sync channel before the Node
    /// disconnects, so the backend socket isn't closed while the Broker
    /// may still be forwarding this Producer's last frames.
    async fn await_drain_ack(&mut self, sync: &mut SyncSocket) -> AppResult<()> {
        match sync.recv().await? {
            Some(reply) if ControlWord::parse(&reply) == Some(ControlWord::Bye) => {
                debug!(tag = %self.tag, "producer received BYE, disconnecting");
                Ok(())
            }
            other => {
                debug!(tag = %self.tag, ?other, "producer join ack was not BYE");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_estimator_fires_immediately_then_respects_interval() {
        let est = DelayEstimator::new(Duration::from_secs(1));
        let now = Instant::now();
        assert!(est.due(now));
    }
}
