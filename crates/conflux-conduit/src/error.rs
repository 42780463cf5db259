//! Error type surfaced by [`crate::Conduit`] implementations.

use thiserror::Error;

/// A transport-level failure. The engine treats any `Conduit` error as
/// "peer down until the next `on_peer_up`" (§7 `TransportError`) — it never
/// retries a send itself.
#[derive(Debug, Error)]
pub enum ConduitError {
    /// No handler is registered for this node/document pair.
    #[error("no handler registered")]
    NotRegistered,
    /// `send` targeted a peer id not present in the routing view.
    #[error("unknown peer: {0}")]
    UnknownPeer(String),
    /// A transport-specific failure (connection reset, timeout, ...).
    #[error("transport error: {0}")]
    Transport(String),
}
