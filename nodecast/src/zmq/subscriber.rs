//! SUB socket implementation.

use bytes::Bytes;
use compio::net::TcpStream;
use nodecast_core::monitor::{create_monitor, SocketEvent, SocketEventSender, SocketMonitor};
use nodecast_wire::subscriber::SubSocket as InternalSub;
use nodecast_wire::SocketType;
use std::io;

/// A SUB socket for receiving filtered messages.
///
/// SUB sockets connect to a PUB peer and filter messages by topic prefix.
///
/// ## Example
///
/// ```rust,no_run
/// use nodecast::zmq::SubSocket;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut socket = SubSocket::connect("127.0.0.1:5555").await?;
///
/// socket.subscribe(b"imu.");
///
/// loop {
///     match socket.recv().await? {
///         Some(msg) => println!("Received: {:?}", msg),
///         None => break, // Connection closed
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct SubSocket {
    inner: InternalSub,
    monitor: Option<SocketEventSender>,
}

impl SubSocket {
    /// Connect to a PUB peer and create a SUB socket.
    ///
    /// Accepts either `"tcp://host:port"` or a raw `"host:port"` address.
    pub async fn connect(endpoint: &str) -> io::Result<Self> {
        let addr = if let Ok(nodecast_core::endpoint::Endpoint::Tcp(a)) =
            nodecast_core::endpoint::Endpoint::parse(endpoint)
        {
            a
        } else {
            endpoint
                .parse::<std::net::SocketAddr>()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?
        };

        let stream = TcpStream::connect(addr).await?;
        let sock = Self::from_tcp(stream).await?;
        sock.emit_event(SocketEvent::Connected(
            nodecast_core::endpoint::Endpoint::Tcp(addr),
        ));
        Ok(sock)
    }

    /// Wrap an already-connected TCP stream as a SUB socket, performing the
    /// ZMTP handshake.
    pub async fn from_tcp(stream: TcpStream) -> io::Result<Self> {
        Ok(Self {
            inner: InternalSub::new(stream).await?,
            monitor: None,
        })
    }

    /// Subscribe to messages whose topic frame starts with `prefix`.
    ///
    /// An empty prefix subscribes to everything.
    pub fn subscribe(&mut self, prefix: &[u8]) {
        self.inner.subscribe(Bytes::copy_from_slice(prefix));
    }

    /// Remove a previously added subscription prefix.
    pub fn unsubscribe(&mut self, prefix: &[u8]) {
        self.inner.unsubscribe(&Bytes::copy_from_slice(prefix));
    }

    /// Receive the next message matching an active subscription.
    ///
    /// Returns `None` if the peer closed the connection.
    pub async fn recv(&mut self) -> io::Result<Option<Vec<Bytes>>> {
        self.inner.recv().await
    }

    /// Get the socket type.
    ///
    /// # ZeroMQ Compatibility
    ///
    /// Corresponds to `ZMQ_TYPE` (16) option.
    #[inline]
    pub fn socket_type() -> SocketType {
        SocketType::Sub
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
