//! PUB socket implementation.

use bytes::Bytes;
use compio::net::TcpStream;
use nodecast_core::monitor::{create_monitor, SocketEvent, SocketEventSender, SocketMonitor};
use nodecast_wire::publisher::PubSocket as InternalPub;
use nodecast_wire::SocketType;
use std::io;

/// A PUB socket for broadcasting messages to a single connected peer.
///
/// The broker fans data out to many subscribers by holding one `PubSocket`
/// per accepted connection (see the broker's frontend accept loop); this
/// type itself is a thin per-connection wrapper around the wire-level PUB
/// stream.
///
/// ## Example
///
/// ```rust,no_run
/// use nodecast::zmq::PubSocket;
/// use compio::net::TcpStream;
/// use bytes::Bytes;
///
/// # async fn example(stream: TcpStream) -> Result<(), Box<dyn std::error::Error>> {
/// let mut socket = PubSocket::from_tcp(stream).await?;
/// socket.send(vec![Bytes::from("topic"), Bytes::from("data")]).await?;
/// # Ok(())
/// # }
/// ```
pub struct PubSocket {
    inner: InternalPub,
    monitor: Option<SocketEventSender>,
}

impl PubSocket {
    /// Wrap an already-accepted TCP stream as a PUB socket, performing the
    /// ZMTP handshake.
    pub async fn from_tcp(stream: TcpStream) -> io::Result<Self> {
        Ok(Self {
            inner: InternalPub::new(stream).await?,
            monitor: None,
        })
    }

    /// Broadcast a multipart message to the connected peer.
    pub async fn send(&mut self, msg: Vec<Bytes>) -> io::Result<()> {
        self.inner.send(msg).await
    }

    /// Get the socket type.
    ///
    /// # ZeroMQ Compatibility
    ///
    /// Corresponds to `ZMQ_TYPE` (16) option.
    #[inline]
    pub fn socket_type() -> SocketType {
        SocketType::Pub
    }

    /// Enable monitoring for this socket.
    pub fn monitor(&mut self) -> SocketMonitor {
        let (sender, receiver) = create_monitor();
        self.monitor = Some(sender);
        receiver
    }

    #[allow(dead_code)]
    fn emit_event(&self, event: SocketEvent) {
        if let Some(monitor) = &self.monitor {
            let _ = monitor.send(event);
        }
    }
}
