//! Broker: the hub of the star topology. Accepts Producer connections on
//! its backend, Consumer connections on its frontend, runs the Node sync
//! barrier, and relays a downstream `KILL` to every locally connected
//! Node.
//!
//! Data fan-out is unconditional: every frame that arrives on any backend
//! connection is broadcast, unchanged, to every current frontend
//! connection. There is no per-subscriber topic filtering at the
//! Broker -- that happens locally in each Consumer's `SubSocket`. This is
//! the plain PUB/SUB-with-explicit-fanout stand-in for the XSUB/XPUB pair
//! the original broker used to also propagate subscription frames
//! upstream; this Broker doesn't chain that subscription-forwarding path,
//! only the simpler optional upstream data chain via `BrokerConfig::upstream`.

use crate::config::BrokerConfig;
use crate::error::{AppResult, NodecastAppError};
use crate::zmq::{PubSocket, RouterSocket, SubSocket};
use bytes::Bytes;
use compio::net::{TcpListener, TcpStream};
use flume::{Receiver, Sender};
use hashbrown::HashMap;
use nodecast_core::control::ControlWord;
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BrokerState {
    Start,
    Sync,
    Running,
    Kill,
    Join,
}

/// Background acceptor handles, so new connections keep arriving while
/// the Broker is busy in `Running`.
struct Acceptors {
    backend_rx: Receiver<SubSocket>,
    frontend_rx: Receiver<PubSocket>,
    kill_rx: Receiver<PubSocket>,
}

async fn accept_backend_loop(listener: TcpListener, tx: Sender<SubSocket>) {
    loop {
        let Ok((stream, addr)) = listener.accept().await else {
            return;
        };
        match SubSocket::from_tcp(stream).await {
            Ok(mut sock) => {
                sock.subscribe(b"");
                if tx.send_async(sock).await.is_err() {
                    return;
                }
            }
            Err(e) => warn!(%addr, error = %e, "backend handshake failed"),
        }
    }
}

async fn accept_frontend_loop(listener: TcpListener, tx: Sender<PubSocket>) {
    loop {
        let Ok((stream, addr)) = listener.accept().await else {
            return;
        };
        match PubSocket::from_tcp(stream).await {
            Ok(sock) => {
                if tx.send_async(sock).await.is_err() {
                    return;
                }
            }
            Err(e) => warn!(%addr, error = %e, "frontend handshake failed"),
        }
    }
}

async fn accept_kill_loop(listener: TcpListener, tx: Sender<PubSocket>) {
    loop {
        let Ok((stream, addr)) = listener.accept().await else {
            return;
        };
        match PubSocket::from_tcp(stream).await {
            Ok(sock) => {
                if tx.send_async(sock).await.is_err() {
                    return;
                }
            }
            Err(e) => warn!(%addr, error = %e, "kill listener handshake failed"),
        }
    }
}

/// The central PUB/SUB hub of a star topology deployment.
pub struct Broker {
    config: BrokerConfig,
    state: BrokerState,
    sync_listener: Option<TcpListener>,
    acceptors: Option<Acceptors>,
    backends: Vec<SubSocket>,
    frontends: Vec<PubSocket>,
    kill_conns: Vec<PubSocket>,
    /// Tag -> sync connection, kept alive through Running so Join can
    /// reply `BYE` to the right peer.
    sync_conns: HashMap<String, RouterSocket>,
    start_time: Instant,
    upstream: Option<PubSocket>,
    num_left_to_join: usize,
}

impl Broker {
    /// Bind all four sockets. Does not yet accept any connections.
    pub async fn bind(config: BrokerConfig) -> AppResult<Self> {
        let backend_addr = SocketAddr::new(config.bind_addr, config.ports.backend);
        let frontend_addr = SocketAddr::new(config.bind_addr, config.ports.frontend);
        let sync_addr = SocketAddr::new(config.bind_addr, config.ports.sync);
        let kill_addr = SocketAddr::new(config.bind_addr, config.ports.kill);

        let backend_listener = TcpListener::bind(backend_addr).await?;
        let frontend_listener = TcpListener::bind(frontend_addr).await?;
        let sync_listener = TcpListener::bind(sync_addr).await?;
        let kill_listener = TcpListener::bind(kill_addr).await?;

        let (backend_tx, backend_rx) = flume::unbounded();
        let (frontend_tx, frontend_rx) = flume::unbounded();
        let (kill_tx, kill_rx) = flume::unbounded();

        compio::runtime::spawn(accept_backend_loop(backend_listener, backend_tx)).detach();
        compio::runtime::spawn(accept_frontend_loop(frontend_listener, frontend_tx)).detach();
        compio::runtime::spawn(accept_kill_loop(kill_listener, kill_tx)).detach();

        let upstream = match config.upstream {
            Some(addr) => Some(PubSocket::from_tcp(TcpStream::connect(addr).await?).await?),
            None => None,
        };

        info!(?backend_addr, ?frontend_addr, ?sync_addr, ?kill_addr, "broker bound");

        Ok(Self {
            num_left_to_join: config.expected_nodes,
            config,
            state: BrokerState::Start,
            sync_listener: Some(sync_listener),
            acceptors: Some(Acceptors {
                backend_rx,
                frontend_rx,
                kill_rx,
            }),
            backends: Vec::new(),
            frontends: Vec::new(),
            kill_conns: Vec::new(),
            sync_conns: HashMap::new(),
            start_time: Instant::now(),
            upstream,
        })
    }

    /// Run the Broker to completion: the sync barrier, then Running until
    /// a deadline or downstream `KILL` arrives, then Join drains every
    /// Producer's `END`.
    pub async fn run(mut self) -> AppResult<()> {
        loop {
            match self.state {
                BrokerState::Start => {
                    self.state = BrokerState::Sync;
                }
                BrokerState::Sync => {
                    self.do_sync().await?;
                    self.start_time = Instant::now();
                    info!("sync barrier released, entering Running");
                    self.state = BrokerState::Running;
                }
                BrokerState::Running => {
                    self.drain_acceptors();
                    if self.deadline_expired() {
                        info!("deadline expired, publishing KILL");
                        self.state = BrokerState::Kill;
                        continue;
                    }
                    self.do_running().await?;
                }
                BrokerState::Kill => {
                    self.publish_kill().await?;
                    self.state = BrokerState::Join;
                }
                BrokerState::Join => {
                    if self.num_left_to_join == 0 {
                        break;
                    }
                    self.drain_acceptors();
                    self.do_join_step().await?;
                }
            }
        }
        info!("broker shut down cleanly");
        Ok(())
    }

    fn deadline_expired(&self) -> bool {
        match self.config.deadline {
            Some(d) => self.start_time.elapsed() >= d,
            None => false,
        }
    }

    async fn do_sync(&mut self) -> AppResult<()> {
        let listener = self
            .sync_listener
            .take()
            .expect("sync already consumed");

        for _ in 0..self.config.expected_nodes {
            let (stream, addr) = listener.accept().await?;
            let mut router = RouterSocket::from_tcp(stream).await?;
            let frames = router.recv().await.ok_or_else(|| {
                NodecastAppError::SyncFailed(format!("node at {addr} closed before announcing"))
            })?;
            let tag = String::from_utf8_lossy(
                frames.last().ok_or_else(|| NodecastAppError::SyncFailed("empty sync frame".into()))?,
            )
            .into_owned();
            debug!(%tag, %addr, "node connected to broker");
            self.sync_conns.insert(tag, router);
        }

        for router in self.sync_conns.values_mut() {
            router.send(vec![ControlWord::Go.as_bytes()]).await?;
        }
        Ok(())
    }

    fn drain_acceptors(&mut self) {
        let Some(acceptors) = &self.acceptors else { return };
        while let Ok(sock) = acceptors.backend_rx.try_recv() {
            self.backends.push(sock);
        }
        while let Ok(sock) = acceptors.frontend_rx.try_recv() {
            self.frontends.push(sock);
        }
        while let Ok(sock) = acceptors.kill_rx.try_recv() {
            self.kill_conns.push(sock);
        }
    }

    /// One step of Running: wait for the next backend connection to
    /// produce a frame and broadcast it verbatim to every frontend (and
    /// the upstream chain, if configured).
    async fn do_running(&mut self) -> AppResult<()> {
        if self.backends.is_empty() {
            // Nothing to poll yet; yield so the acceptor tasks get a turn.
            compio::time::sleep(std::time::Duration::from_millis(5)).await;
            return Ok(());
        }

        let futures = self
            .backends
            .iter_mut()
            .enumerate()
            .map(|(i, sock)| Box::pin(async move { (i, sock.recv().await) }));
        let ((idx, result), _, _) = futures::future::select_all(futures).await;

        match result? {
            Some(frames) => self.forward(frames).await,
            None => {
                self.backends.remove(idx);
                Ok(())
            }
        }
    }

    async fn forward(&mut self, frames: Vec<Bytes>) -> AppResult<()> {
        for frontend in &mut self.frontends {
            frontend.send(frames.clone()).await?;
        }
        if let Some(up) = &mut self.upstream {
            up.send(frames).await?;
        }
        Ok(())
    }

    async fn publish_kill(&mut self) -> AppResult<()> {
        for conn in &mut self.kill_conns {
            conn.send(vec![ControlWord::Kill.as_bytes()]).await?;
        }
        Ok(())
    }

    /// One step of Join: keep brokering so straggling Producers can still
    /// send their last samples, watching for `END` to reply `BYE` and
    /// count that Node as joined.
    async fn do_join_step(&mut self) -> AppResult<()> {
        if self.backends.is_empty() {
            compio::time::sleep(std::time::Duration::from_millis(5)).await;
            return Ok(());
        }

        let futures = self
            .backends
            .iter_mut()
            .enumerate()
            .map(|(i, sock)| Box::pin(async move { (i, sock.recv().await) }));
        let ((idx, result), _, _) = futures::future::select_all(futures).await;

        match result? {
            Some(frames) => {
                let topic = String::from_utf8_lossy(&frames[0]).into_owned();
                let is_end = frames
                    .last()
                    .map(|f| ControlWord::parse(f) == Some(ControlWord::End))
                    .unwrap_or(false);
                self.forward(frames).await?;
                if is_end {
                    match self.matching_sync_tag(&topic) {
                        Some(tag) => {
                            if let Some(mut router) = self.sync_conns.remove(&tag) {
                                router.send(vec![ControlWord::Bye.as_bytes()]).await?;
                                self.num_left_to_join = self.num_left_to_join.saturating_sub(1);
                            }
                        }
                        None => {
                            warn!(%topic, "END from a topic with no matching registered tag, no BYE sent");
                        }
                    }
                }
                Ok(())
            }
            None => {
                self.backends.remove(idx);
                Ok(())
            }
        }
    }

    /// A data topic is always the registering tag itself, or the tag
    /// followed by `.` and a subchannel (`source_tag[.subchannel].data`,
    /// per the envelope format) -- never an unrelated string. Find the
    /// sync-registered tag that `topic` was published under.
    fn matching_sync_tag(&self, topic: &str) -> Option<String> {
        self.sync_conns
            .keys()
            .find(|tag| topic == tag.as_str() || topic.starts_with(&format!("{tag}.")))
            .cloned()
    }
}
