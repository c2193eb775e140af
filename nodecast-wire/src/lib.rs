//! Nodecast Wire
//!
//! **Internal protocol implementation crate for Nodecast.**
//!
//! This crate provides the ZMTP 3.1 protocol implementation with direct
//! stream I/O. For application development, use `nodecast::zmq::*`, which
//! wraps these sockets with the broker/node domain logic.
//!
//! ## Socket Types (Internal API)
//!
//! - **ROUTER**: Sync-barrier endpoint, identity-based addressing
//! - **PUB**: Publisher for broadcasting data/kill packets
//! - **SUB**: Subscriber with topic-based filtering
//!
//! ## Features
//!
//! - **Zero-copy**: Messages use `Bytes` for efficient sharing
//! - **`io_uring`**: High-performance async I/O via `compio`
//! - **Sans-IO protocol**: Testable, runtime-agnostic design
//! - **Type-safe**: No unsafe code in protocol layer

// Allow some pedantic lints
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::needless_pass_by_ref_mut)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::unused_async)]
#![allow(clippy::let_underscore_future)]
#![allow(clippy::future_not_send)] // Runtime-agnostic design
#![allow(clippy::uninlined_format_args)] // Style preference
#![allow(clippy::missing_errors_doc)] // Will add gradually
#![allow(clippy::doc_markdown)] // Too many false positives
#![allow(clippy::while_let_loop)] // Sometimes clearer as explicit loop
#![allow(clippy::option_if_let_else)] // Sometimes clearer as if/else
#![allow(clippy::never_loop)] // State machines use loop with early returns

// Internal modules (not part of public API)
mod codec;
mod greeting;
mod handshake;
mod utils;

// Public protocol types
pub mod session;

pub mod base;
pub mod config;

// Socket implementations
pub mod publisher;
pub mod router;
pub mod subscriber;
pub mod sync;

// Re-export socket types for clean API
pub use config::BufferConfig;
pub use publisher::PubSocket;
pub use router::RouterSocket;
pub use subscriber::SubSocket;
pub use sync::SyncSocket;

// Re-export commonly used types
pub use session::{SocketType, ZmtpSession};

/// Prelude module for convenient imports
///
/// ```rust
/// use nodecast_wire::prelude::*;
/// ```
pub mod prelude {
    pub use super::session::SocketType;
    pub use super::{PubSocket, RouterSocket, SubSocket};
    pub use bytes::Bytes;
}
