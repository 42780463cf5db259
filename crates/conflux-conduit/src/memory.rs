//! In-memory reference [`Conduit`], grounded in `tinysync`'s
//! `MemoryConduit` (`examples/original_source/tinysync/conduit/conduit.py`):
//! node-to-node "sends" are direct calls into the target's handler, routed
//! through a process-wide registry keyed by document id.

use crate::registry::registry_for;
use crate::{Conduit, ConduitError, ConduitHandler, RoutingView};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Conduit for single-process tests and demos. Peers are other
/// [`InMemoryConduit`]s sharing the same `doc_id`, registered in a
/// process-wide table; `send` is a synchronous in-process call into the
/// target's registered handler.
pub struct InMemoryConduit {
    node_id: String,
    doc_id: String,
    handler: Mutex<Option<Arc<dyn ConduitHandler>>>,
}

impl InMemoryConduit {
    /// Create a conduit for `node_id` on `doc_id`. Does not announce
    /// presence until [`Conduit::register`] is called.
    #[must_use]
    pub fn new(node_id: impl Into<String>, doc_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            doc_id: doc_id.into(),
            handler: Mutex::new(None),
        }
    }

    /// This node's id.
    #[must_use]
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    fn own_handler(&self) -> Option<Arc<dyn ConduitHandler>> {
        self.handler.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }
}

impl Conduit for InMemoryConduit {
    fn register(&self, handler: Arc<dyn ConduitHandler>) -> Result<(), ConduitError> {
        {
            let mut slot = self.handler.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            *slot = Some(handler.clone());
        }
        {
            let reg = registry_for(&self.doc_id);
            let mut g = reg.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            g.members.insert(self.node_id.clone(), handler);
        }
        self.announce()
    }

    fn announce(&self) -> Result<(), ConduitError> {
        let reg = registry_for(&self.doc_id);
        let peers: Vec<(String, Arc<dyn ConduitHandler>)> = {
            let g = reg.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            g.members
                .iter()
                .filter(|(id, _)| **id != self.node_id)
                .map(|(id, h)| (id.clone(), h.clone()))
                .collect()
        };

        // Tell every pre-existing peer about us...
        for (peer_id, peer_handler) in &peers {
            debug!(self_id = %self.node_id, %peer_id, "announcing to peer");
            peer_handler.on_peer_up(&self.node_id);
        }
        // ...and tell us about every pre-existing peer (§4.3 MUST).
        if let Some(me) = self.own_handler() {
            for (peer_id, _) in &peers {
                me.on_peer_up(peer_id);
            }
        }
        Ok(())
    }

    fn send(&self, peer_id: &str, message: &[u8]) -> Result<(), ConduitError> {
        let handler = {
            let reg = registry_for(&self.doc_id);
            let g = reg.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            g.members.get(peer_id).cloned()
        };
        let handler = handler.ok_or_else(|| ConduitError::UnknownPeer(peer_id.to_owned()))?;
        handler.receive(&self.node_id, message);
        Ok(())
    }

    fn routing(&self) -> RoutingView {
        let reg = registry_for(&self.doc_id);
        let ids: BTreeSet<String> = {
            let g = reg.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            g.members.keys().cloned().collect()
        };
        RoutingView::compute(&self.node_id, &ids)
    }

    fn shutdown(&self) -> Result<(), ConduitError> {
        let reg = registry_for(&self.doc_id);
        let removed = {
            let mut g = reg.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            g.members.remove(&self.node_id)
        };
        if removed.is_some() {
            let remaining: Vec<Arc<dyn ConduitHandler>> = {
                let g = reg.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                g.members.values().cloned().collect()
            };
            for h in remaining {
                h.on_peer_down(&self.node_id);
            }
        }
        *self.handler.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler {
        ups: AtomicUsize,
        downs: AtomicUsize,
        received: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl CountingHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                ups: AtomicUsize::new(0),
                downs: AtomicUsize::new(0),
                received: Mutex::new(Vec::new()),
            })
        }
    }

    impl ConduitHandler for CountingHandler {
        fn on_peer_up(&self, _peer_id: &str) {
            self.ups.fetch_add(1, Ordering::SeqCst);
        }
        fn on_peer_down(&self, _peer_id: &str) {
            self.downs.fetch_add(1, Ordering::SeqCst);
        }
        fn receive(&self, source_id: &str, message: &[u8]) {
            self.received
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push((source_id.to_owned(), message.to_vec()));
        }
    }

    #[test]
    fn late_joiner_learns_about_existing_peers() {
        let doc = "doc-late-join";
        let a = InMemoryConduit::new("a", doc);
        let ha = CountingHandler::new();
        a.register(ha.clone()).unwrap();

        let b = InMemoryConduit::new("b", doc);
        let hb = CountingHandler::new();
        b.register(hb.clone()).unwrap();

        // b's registration must have told a about b, and told b about a.
        assert!(ha.ups.load(Ordering::SeqCst) >= 1);
        assert!(hb.ups.load(Ordering::SeqCst) >= 1);

        a.shutdown().unwrap();
        b.shutdown().unwrap();
    }

    #[test]
    fn send_delivers_to_target_only() {
        let doc = "doc-send-only";
        let a = InMemoryConduit::new("a", doc);
        let ha = CountingHandler::new();
        a.register(ha.clone()).unwrap();

        let b = InMemoryConduit::new("b", doc);
        let hb = CountingHandler::new();
        b.register(hb.clone()).unwrap();

        a.send("b", b"hello").unwrap();
        let received = hb.received.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, "a");
        assert_eq!(received[0].1, b"hello");

        a.shutdown().unwrap();
        b.shutdown().unwrap();
    }

    #[test]
    fn shutdown_notifies_remaining_peers() {
        let doc = "doc-shutdown";
        let a = InMemoryConduit::new("a", doc);
        let ha = CountingHandler::new();
        a.register(ha.clone()).unwrap();

        let b = InMemoryConduit::new("b", doc);
        let hb = CountingHandler::new();
        b.register(hb.clone()).unwrap();

        b.shutdown().unwrap();
        assert!(ha.downs.load(Ordering::SeqCst) >= 1);

        a.shutdown().unwrap();
    }
}
