//! End-to-end test: a Broker, one Producer Node and one Consumer Node,
//! wired through the real sync barrier and data fan-out.

use nodecast::broker::Broker;
use nodecast::config::{BrokerConfig, NodeConfig};
use nodecast::error::AppResult;
use nodecast::node::{ConsumerRole, ConsumerSink, Node, ProducerDevice, ProducerRole};
use nodecast_core::control::Ports;
use nodecast_core::envelope::Record;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct CountingDevice {
    topic: String,
    remaining: u32,
}

#[async_trait::async_trait]
impl ProducerDevice for CountingDevice {
    async fn connect(&mut self) -> AppResult<()> {
        Ok(())
    }

    async fn read_sample(&mut self) -> AppResult<Option<Record>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        Ok(Some(Record::new(f64::from(self.remaining)).with_field("n", i64::from(self.remaining))))
    }

    fn topic(&self) -> String {
        self.topic.clone()
    }
}

struct CollectingSink {
    seen: Arc<Mutex<Vec<f64>>>,
}

#[async_trait::async_trait]
impl ConsumerSink for CollectingSink {
    async fn on_record(&mut self, _topic: &str, record: Record) -> AppResult<()> {
        self.seen.lock().unwrap().push(record.time_s().unwrap());
        Ok(())
    }
}

#[compio::test]
async fn producer_reaches_consumer_through_broker_fanout() {
    let ports = Ports {
        backend: portpicker::pick_unused_port().expect("free port"),
        frontend: portpicker::pick_unused_port().expect("free port"),
        sync: portpicker::pick_unused_port().expect("free port"),
        kill: portpicker::pick_unused_port().expect("free port"),
    };
    let bind_addr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    let broker_config = BrokerConfig {
        bind_addr,
        ports,
        expected_nodes: 2,
        upstream: None,
        deadline: None,
    };
    let broker = Broker::bind(broker_config).await.expect("broker binds");
    compio::runtime::spawn(async move {
        let _ = broker.run().await;
    })
    .detach();

    let seen = Arc::new(Mutex::new(Vec::new()));

    let producer_config = NodeConfig {
        broker_addr: bind_addr,
        ports,
        tag: "imu".to_string(),
    };
    let producer_role = ProducerRole::new(
        &producer_config,
        CountingDevice {
            topic: "imu".to_string(),
            remaining: 5,
        },
    );

    let consumer_config = NodeConfig {
        broker_addr: bind_addr,
        ports,
        tag: "logger".to_string(),
    };
    let consumer_role = ConsumerRole::new(
        &consumer_config,
        vec!["imu".to_string()],
        CollectingSink { seen: seen.clone() },
    );

    let producer_node = Node::connect(producer_config, producer_role)
        .await
        .expect("producer connects");
    let consumer_node = Node::connect(consumer_config, consumer_role)
        .await
        .expect("consumer connects");

    let run = async {
        futures::join!(producer_node.run(), consumer_node.run())
    };

    let (producer_result, consumer_result) = compio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("nodes finished before timeout");
    producer_result.expect("producer ran cleanly");
    consumer_result.expect("consumer ran cleanly");

    let collected = seen.lock().unwrap();
    assert_eq!(collected.len(), 5);
}
