//! Error taxonomy for the broker/node fabric.
//!
//! Mirrors the layering `nodecast_core::error::NodecastError` already uses
//! over `std::io::Error`: each boundary gets an `#[from]` conversion, and
//! nothing in this crate panics on a reachable error path.

use nodecast_core::envelope::EnvelopeError;
use std::io;
use thiserror::Error;

/// Errors surfaced by node lifecycle, broker routing, the snapshot buffer,
/// and the frame cache.
#[derive(Debug, Error)]
pub enum NodecastAppError {
    /// Socket I/O failure at any layer.
    #[error("socket I/O error: {0}")]
    Io(#[from] io::Error),

    /// Envelope encode/decode failure.
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    /// A Producer's device failed to come online during `Start`. Fatal for
    /// that Node: it transitions directly to `Kill`.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A malformed payload was dropped; the Node continues running.
    #[error("decode error, packet dropped: {0}")]
    DecodeDropped(String),

    /// The sync barrier did not complete (missing `GO`/unexpected reply).
    #[error("sync barrier failed: {0}")]
    SyncFailed(String),

    /// A node record violated a uniqueness or lifecycle invariant.
    #[error("node record error: {0}")]
    NodeRecord(String),
}

/// Result type alias used throughout the node/broker fabric.
pub type AppResult<T> = std::result::Result<T, NodecastAppError>;
