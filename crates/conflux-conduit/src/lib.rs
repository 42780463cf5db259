// SPDX-License-Identifier: Apache-2.0
//! Peer membership and message routing, abstracted over transport (§4.3).
//!
//! `conflux-sync`'s `SyncEngine` is the only intended implementor of
//! [`ConduitHandler`]; this crate only knows about opaque byte payloads and
//! node ids, never about `Value`/`Delta`.

mod error;
mod memory;
mod registry;
mod routing;

pub use error::ConduitError;
pub use memory::InMemoryConduit;
pub use routing::RoutingView;

use std::sync::Arc;

/// Callbacks a [`Conduit`] implementation drives into the engine it was
/// [`Conduit::register`]ed with.
pub trait ConduitHandler: Send + Sync {
    /// A peer sharing this document has been discovered (including, per
    /// §4.3, every peer already present at registration time).
    fn on_peer_up(&self, peer_id: &str);

    /// A peer has left (disconnected, or this conduit is shutting down).
    fn on_peer_down(&self, peer_id: &str);

    /// A message addressed to this node has arrived from `source_id`.
    fn receive(&self, source_id: &str, message: &[u8]);
}

/// Abstract peer membership and message routing (§4.3). Implementations
/// may be in-memory (for tests), a WebSocket hub, a pub/sub service, or
/// local peer-to-peer discovery — only the in-memory reference
/// implementation ([`InMemoryConduit`]) ships here; the rest are external
/// collaborators per the specification's Non-goals.
pub trait Conduit: Send + Sync {
    /// Bind one handler, perform any transport setup, and announce this
    /// node's presence for its document id.
    ///
    /// # Errors
    /// Returns [`ConduitError`] if transport setup fails.
    fn register(&self, handler: Arc<dyn ConduitHandler>) -> Result<(), ConduitError>;

    /// Ensure every other replica sharing this document id eventually
    /// learns this node's id. Implementations call this from `register`;
    /// it is exposed separately so callers can re-announce after a
    /// transient disconnect.
    ///
    /// # Errors
    /// Returns [`ConduitError`] if transport setup fails.
    fn announce(&self) -> Result<(), ConduitError>;

    /// Deliver `message` to `peer_id`.
    ///
    /// # Errors
    /// Returns [`ConduitError::UnknownPeer`] if `peer_id` is not currently
    /// routable, or [`ConduitError::Transport`] on transport failure.
    fn send(&self, peer_id: &str, message: &[u8]) -> Result<(), ConduitError>;

    /// The current up/down routing view for this node.
    fn routing(&self) -> RoutingView;

    /// Cause remote `on_peer_down` at every peer sharing this document id
    /// and release transport resources. Idempotent.
    ///
    /// # Errors
    /// Returns [`ConduitError`] if transport teardown fails.
    fn shutdown(&self) -> Result<(), ConduitError>;
}
