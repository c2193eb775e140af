//! Direct-stream barrier socket used by a Node to talk to a Broker's sync
//! endpoint.
//!
//! This is a DEALER-shaped connection (connects to a ROUTER) but the
//! fabric's sync protocol is strictly one outstanding request at a time:
//! send one frame, await one reply. There is no pipelining and no
//! multi-peer routing table to maintain, so this is built directly against
//! the stream rather than by fixing up a general-purpose DEALER socket.

use bytes::Bytes;
use compio::io::{AsyncRead, AsyncWrite};
use compio::net::TcpStream;
use nodecast_core::options::SocketOptions;
use smallvec::SmallVec;
use std::io;
use tracing::{debug, trace};

use crate::base::SocketBase;
use crate::codec::encode_multipart;
use crate::{handshake::perform_handshake_with_timeout, session::SocketType};

/// Direct-stream sync-barrier client socket.
pub struct SyncSocket<S = TcpStream>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    base: SocketBase<S>,
    frames: SmallVec<[Bytes; 4]>,
}

impl<S> SyncSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Connect the handshake with a self-reported identity (the node's tag).
    pub async fn with_identity(mut stream: S, identity: Bytes) -> io::Result<Self> {
        debug!("[SYNC] Performing ZMTP handshake as DEALER...");
        let options = SocketOptions::default();
        perform_handshake_with_timeout(
            &mut stream,
            SocketType::Dealer,
            Some(&identity),
            Some(options.handshake_timeout),
        )
        .await
        .map_err(|e| io::Error::other(format!("Handshake failed: {}", e)))?;

        debug!("[SYNC] Handshake complete");

        Ok(Self {
            base: SocketBase::new(stream, SocketType::Dealer, options),
            frames: SmallVec::new(),
        })
    }

    /// Send a single-frame request (the barrier message).
    pub async fn send(&mut self, frame: Bytes) -> io::Result<()> {
        trace!("[SYNC] Sending request frame ({} bytes)", frame.len());
        self.base.write_buf.clear();
        encode_multipart(&[frame], &mut self.base.write_buf);
        self.base.write_from_buf().await
    }

    /// Await the broker's reply frame (`GO` or `BYE`).
    pub async fn recv(&mut self) -> io::Result<Option<Bytes>> {
        loop {
            loop {
                match self.base.decoder.decode(&mut self.base.recv)? {
                    Some(frame) => {
                        let more = frame.more();
                        self.frames.push(frame.payload);
                        if !more {
                            let mut msg: SmallVec<[Bytes; 4]> = self.frames.drain(..).collect();
                            trace!("[SYNC] Received {} frames", msg.len());
                            return Ok(msg.pop());
                        }
                    }
                    None => break,
                }
            }

            let n = self.base.read_raw().await?;
            if n == 0 {
                trace!("[SYNC] Connection closed");
                return Ok(None);
            }
        }
    }
}

impl SyncSocket<TcpStream> {
    /// Connect to a broker's sync endpoint, reporting `identity` during the
    /// handshake.
    pub async fn connect_tcp(stream: TcpStream, identity: Bytes) -> io::Result<Self> {
        nodecast_core::tcp::enable_tcp_nodelay(&stream)?;
        Self::with_identity(stream, identity).await
    }
}
