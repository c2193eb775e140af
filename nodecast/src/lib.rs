//! # nodecast
//!
//! Distributed biomechanics sensor streaming: a star-topology fabric of
//! Producer/Consumer/Pipeline Nodes fanning through a central Broker, built
//! on `io_uring` via `compio`.
//!
//! ## Layering
//!
//! - **`nodecast-core`**: envelope/record format, control words, ports,
//!   allocator and pub/sub primitives
//! - **`nodecast-wire`**: ZMTP 3.1 wire protocol, one socket type per file
//! - **`nodecast`** (this crate): app-level socket wrappers, the Node FSM,
//!   the Broker, the snapshot ring buffer, and the frame decode cache
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "zmq")]
//! use nodecast::zmq::prelude::*;
//!
//! # #[cfg(feature = "zmq")]
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Bind and accept the first connection on a sync-barrier ROUTER.
//! let (listener, mut socket) = RouterSocket::bind("127.0.0.1:5555").await?;
//!
//! while let Some(msg) = socket.recv().await {
//!     socket.send(msg).await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Safety
//!
//! - `unsafe` code is isolated to `nodecast-core/src/alloc/` (slab allocator)
//! - All node/broker/cache logic in this crate is 100% safe Rust

#![warn(missing_docs)]
#![warn(clippy::all)]
// Allow some pedantic patterns
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::future_not_send)] // Runtime-agnostic design
#![allow(clippy::missing_errors_doc)] // Will add gradually
#![allow(clippy::doc_markdown)] // Too many false positives

// Re-export core types
pub use bytes::Bytes;
pub use nodecast_core::options::SocketOptions;
pub use nodecast_core::reconnect::{ReconnectError, ReconnectState};
pub use nodecast_core::socket_type::SocketType;

// Protocol modules (opt-in via features)
#[cfg(feature = "zmq")]
pub mod zmq;

#[cfg(feature = "zmq")]
pub mod broker;
pub mod config;
pub mod error;
pub mod frame_cache;
#[cfg(feature = "zmq")]
pub mod node;
pub mod snapshot;
pub mod stream;

/// Development helpers (benches/tests)
pub mod dev_tracing;
