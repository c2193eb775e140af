//! ZeroMQ-compatible socket wrappers used to build the broker/node fabric.
//!
//! # Socket Types
//!
//! - [`RouterSocket`] - Identity-based routing, used for the broker's sync barrier
//! - [`PubSocket`] - Publisher (broadcast to subscribers)
//! - [`SubSocket`] - Subscriber (receive filtered messages)
//!
//! # Quick Start
//!
//! ## ROUTER (sync barrier server)
//!
//! ```rust,no_run
//! use nodecast::zmq::RouterSocket;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (listener, mut socket) = RouterSocket::bind("127.0.0.1:5555").await?;
//!
//! while let Some(msg) = socket.recv().await {
//!     socket.send(msg).await?; // Echo back
//! }
//! # Ok(())
//! # }
//! ```

mod common;
mod publisher;
mod router;
mod subscriber;
pub mod sync;

// Re-export socket types
pub use publisher::PubSocket;
pub use router::RouterSocket;
pub use subscriber::SubSocket;
pub use sync::SyncSocket;

/// Convenient imports for ZeroMQ protocol.
///
/// # Example
///
/// ```rust
/// use nodecast::zmq::prelude::*;
///
/// // Now you have:
/// // - RouterSocket, PubSocket, SubSocket
/// // - Bytes for zero-copy messages
/// ```
pub mod prelude {
    pub use super::{PubSocket, RouterSocket, SubSocket};
    pub use bytes::Bytes;
}
