//! Sync-barrier client socket implementation.
//!
//! Used by a Node to register with a Broker's sync endpoint: send one
//! identity/tag frame, await one reply (`GO` at startup, `BYE` at drain).

use bytes::Bytes;
use compio::net::TcpStream;
use nodecast_wire::sync::SyncSocket as InternalSync;
use std::io;

/// A single-roundtrip client connection to a Broker's sync endpoint.
pub struct SyncSocket {
    inner: InternalSync,
}

impl SyncSocket {
    /// Connect to the broker's sync endpoint, reporting `identity` (the
    /// node's tag) during the handshake.
    pub async fn connect(addr: std::net::SocketAddr, identity: Bytes) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            inner: InternalSync::connect_tcp(stream, identity).await?,
        })
    }

    /// Send the barrier request frame.
    pub async fn send(&mut self, frame: Bytes) -> io::Result<()> {
        self.inner.send(frame).await
    }

    /// Await the broker's reply frame.
    pub async fn recv(&mut self) -> io::Result<Option<Bytes>> {
        self.inner.recv().await
    }
}
