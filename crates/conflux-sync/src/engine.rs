//! `SyncEngine` (§4.5): drives the differential-sync protocol over
//! `EdgeState`s using a `Conduit`.

use crate::document::SyncDocument;
use crate::edge::EditEntry;
use crate::merge::{merge, Direction};
use crate::message::Message;
use crate::persistence::PersistenceBackend;
use crate::tracker::{ChangeEvent, ChangeObserver, InProcessTracker, Tracker};
use crate::SyncError;
use conflux_conduit::{Conduit, ConduitHandler, RoutingView};
use conflux_value::patch_in_place;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Notified once per net content change (§6 `change_callback`): after a
/// local mutation propagates, or after an inbound message changes
/// `content`.
pub trait ChangeCallback: Send + Sync {
    /// `root` is the content after the change; `changes` is the delta that
    /// produced it.
    fn on_change(&self, root: &conflux_value::Value, changes: &conflux_value::Delta);
}

/// Drives the protocol described in §4.5: local mutations fan out to every
/// neighbour; inbound messages reconcile against local edits and, if
/// content actually changed, fan back out.
pub struct SyncEngine {
    document: Arc<SyncDocument>,
    tracker: Arc<InProcessTracker>,
    conduit: Arc<dyn Conduit>,
    change_callback: Option<Arc<dyn ChangeCallback>>,
    persistence: Option<PersistenceBackend>,
    stopped: AtomicBool,
}

impl SyncEngine {
    /// Wire a tracker and conduit together over `document`. Call
    /// [`SyncEngine::start`] once the returned `Arc` exists, to register
    /// with the conduit and the tracker's change observer (both require a
    /// `Weak` handle back to this engine, per §9 design note 3).
    ///
    /// `persistence`, if given, is dumped to on every committed change
    /// while [`Tracker::save_changes`] is set (§4.7, §6 `persist`).
    #[must_use]
    pub fn new(
        document: Arc<SyncDocument>,
        tracker: Arc<InProcessTracker>,
        conduit: Arc<dyn Conduit>,
        change_callback: Option<Arc<dyn ChangeCallback>>,
        persistence: Option<PersistenceBackend>,
    ) -> Arc<Self> {
        Arc::new(Self {
            document,
            tracker,
            conduit,
            change_callback,
            persistence,
            stopped: AtomicBool::new(false),
        })
    }

    /// Register this engine as the tracker's change observer and the
    /// conduit's handler, and announce presence. Must be called with an
    /// `Arc` this engine is already held by (it hands out a `Weak`/`Arc<dyn
    /// ConduitHandler>` to itself).
    ///
    /// # Errors
    /// Returns [`SyncError::Transport`] if conduit registration fails.
    pub fn start(self: &Arc<Self>) -> Result<(), SyncError> {
        self.tracker.set_observer(Arc::downgrade(self) as Weak<dyn ChangeObserver>);
        self.conduit.register(self.clone() as Arc<dyn ConduitHandler>)?;
        Ok(())
    }

    fn routing(&self) -> RoutingView {
        self.conduit.routing()
    }

    /// Called by the `Tracker` after any mutation; triggers outbound
    /// propagation to every neighbour in `up ∪ down` (§4.5).
    pub fn on_local_change(&self) {
        if self.stopped.load(Ordering::SeqCst) || !self.tracker.sync_on() {
            return;
        }
        let routing = self.routing();
        for peer in routing.neighbours() {
            if let Err(err) = self.send_update(peer, self.direction_to(peer, &routing)) {
                warn!(%peer, error = %err, "send_update failed, treating peer as down until on_peer_up");
            }
        }
    }

    fn direction_to(&self, peer_id: &str, routing: &RoutingView) -> Direction {
        if routing.up.as_deref() == Some(peer_id) {
            Direction::Up
        } else {
            Direction::Down
        }
    }

    /// §4.5.1: compute and send the outbound update for one neighbour.
    ///
    /// # Errors
    /// Returns [`SyncError::Transport`] if the conduit send fails.
    pub fn send_update(&self, receiver_id: &str, direction: Direction) -> Result<(), SyncError> {
        let content = self.document.content();
        let message = self.document.with_edge(receiver_id, |edge| {
            edge.append_local(&content)?;
            Ok::<_, SyncError>(Message::new(direction.upwards_flag(), edge.edits.clone()))
        })?;
        debug!(peer = receiver_id, entries = message.edits.len(), "sending update");
        self.conduit.send(receiver_id, &encode(&message)?)?;
        Ok(())
    }

    /// §4.5.2: handle an inbound message from `source_id`.
    ///
    /// # Errors
    /// Returns [`SyncError::AnchorMissing`] if no checksum is shared
    /// between the chains, or [`SyncError::Patch`]/[`SyncError::Transport`]
    /// on failures while reconciling or re-propagating.
    pub fn receive(&self, source_id: &str, message: &Message) -> Result<(), SyncError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Ok(());
        }
        let direction = if message.upwards { Direction::Down } else { Direction::Up };
        debug!(peer = source_id, anchor = ?message.anchor_checksum(), entries = message.edits.len(), "reconciling inbound message");

        let content_before = self.document.content();
        let outcome = self.document.with_edge(source_id, |edge| {
            let anchor = find_anchor(&edge.edits, &message.edits)
                .ok_or_else(|| SyncError::AnchorMissing { peer: source_id.to_owned() })?;
            let (j, i) = anchor;

            edge.advance_baseline_to(j)?;
            let diff_local: conflux_value::Delta = edge.edits[1..].iter().flat_map(|e| e.delta.clone()).collect();
            let diff_remote: conflux_value::Delta =
                message.edits[i + 1..].iter().flat_map(|e| e.delta.clone()).collect();

            let net = merge(&edge.baseline, &diff_local, &diff_remote, direction);
            let remote_pending = message.edits.len() > i + 1;
            Ok::<_, SyncError>((net, edge.has_pending(), remote_pending))
        });

        let (net, local_pending, remote_pending) = match outcome {
            Ok(v) => v,
            Err(SyncError::AnchorMissing { peer }) => {
                warn!(%peer, "no common anchor, resetting edge to full-value delta");
                self.reset_edge(&peer);
                self.send_update(&peer, direction.opposite())?;
                return Ok(());
            }
            Err(other) => return Err(other),
        };

        if !net.is_empty() {
            self.tracker.set_sync_on(false);
            let mut content = content_before.clone();
            patch_in_place(&net, &mut content).map_err(SyncError::Patch)?;
            self.tracker.replace(content.clone());
            self.tracker.set_sync_on(true);
        }

        let content_after = self.document.content();
        if content_after != content_before {
            self.on_local_change();
            if let Some(cb) = &self.change_callback {
                cb.on_change(&content_after, &net);
            }
        } else if local_pending || remote_pending {
            self.send_update(source_id, direction.opposite())?;
        }
        Ok(())
    }

    fn reset_edge(&self, peer_id: &str) {
        let initial = self.document.with_state(|s| s.initial.clone());
        self.document.with_state(|s| {
            s.peers.insert(peer_id.to_owned(), crate::edge::EdgeState::new(initial));
        });
    }

    /// Call `Conduit::shutdown`. Idempotent; after it returns, no further
    /// `on_change`/`receive` callback may mutate state (§5).
    ///
    /// # Errors
    /// Returns [`SyncError::Transport`] if conduit teardown fails.
    pub fn stop(&self) -> Result<(), SyncError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.conduit.shutdown()?;
        Ok(())
    }
}

/// Find the latest common anchor: the greatest pair `(j, i)` such that
/// `local[j].checksum == remote[i].checksum`, scanning from the tail of
/// both chains (§4.5.2 step 2).
fn find_anchor(local: &[EditEntry], remote: &[EditEntry]) -> Option<(usize, usize)> {
    for (j, local_entry) in local.iter().enumerate().rev() {
        for (i, remote_entry) in remote.iter().enumerate().rev() {
            if local_entry.checksum == remote_entry.checksum {
                return Some((j, i));
            }
        }
    }
    None
}

fn encode(message: &Message) -> Result<Vec<u8>, SyncError> {
    Ok(serde_json::to_vec(message)?)
}

fn decode(bytes: &[u8]) -> Result<Message, serde_json::Error> {
    serde_json::from_slice(bytes)
}

impl ChangeObserver for SyncEngine {
    fn on_change(&self, event: &ChangeEvent) {
        if self.tracker.save_changes() {
            if let Some(backend) = &self.persistence {
                if let Err(err) = backend.on_change(event) {
                    warn!(error = %err, "failed to persist change");
                }
            }
        }
        self.on_local_change();
    }
}

impl ConduitHandler for SyncEngine {
    fn on_peer_up(&self, peer_id: &str) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        debug!(peer = peer_id, "peer up");
        let routing = self.routing();
        let direction = self.direction_to(peer_id, &routing);
        if let Err(err) = self.send_update(peer_id, direction) {
            warn!(peer = peer_id, error = %err, "initial send_update to new peer failed");
        }
    }

    fn on_peer_down(&self, peer_id: &str) {
        debug!(peer = peer_id, "peer down");
        self.document.remove_edge(peer_id);
    }

    fn receive(&self, source_id: &str, message: &[u8]) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        match decode(message) {
            Ok(msg) => {
                if let Err(err) = SyncEngine::receive(self, source_id, &msg) {
                    warn!(peer = source_id, error = %err, "failed to reconcile inbound message");
                }
            }
            Err(err) => warn!(peer = source_id, error = %err, "received malformed message"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conflux_conduit::InMemoryConduit;
    use conflux_value::{PathSegment, Value};

    fn node(id: &str, doc_id: &str) -> (Arc<SyncEngine>, Arc<InProcessTracker>) {
        let document = Arc::new(SyncDocument::new(id, doc_id, Value::map()));
        let tracker = InProcessTracker::new(document.clone(), crate::tracker::HistoryConfig::Off);
        let conduit: Arc<dyn Conduit> = Arc::new(InMemoryConduit::new(id, doc_id));
        let engine = SyncEngine::new(document, tracker.clone(), conduit, None, None);
        engine.start().unwrap();
        (engine, tracker)
    }

    #[test]
    fn two_nodes_converge_on_independent_inserts() {
        let doc = "s1";
        let (n1, t1) = node("n1", doc);
        let (n2, t2) = node("n2", doc);

        t1.set(&[PathSegment::Key("x".into())], Value::Int(1)).unwrap();
        t2.set(&[PathSegment::Key("y".into())], Value::Int(2)).unwrap();

        // Drive a couple of rounds so both propagations settle.
        n1.on_local_change();
        n2.on_local_change();

        assert_eq!(t1.content(), t2.content());
        let expected = {
            let mut m = indexmap::IndexMap::new();
            m.insert("x".to_owned(), Value::Int(1));
            m.insert("y".to_owned(), Value::Int(2));
            Value::Map(m)
        };
        assert_eq!(t1.content(), expected);

        n1.stop().unwrap();
        n2.stop().unwrap();
    }

    #[test]
    fn conflicting_sets_converge_on_larger_id() {
        let doc = "s2";
        let (a, ta) = node("a", doc);
        let (b, tb) = node("b", doc);

        ta.set(&[PathSegment::Key("k".into())], Value::String("A".into())).unwrap();
        tb.set(&[PathSegment::Key("k".into())], Value::String("B".into())).unwrap();

        a.on_local_change();
        b.on_local_change();
        a.on_local_change();
        b.on_local_change();

        let mut expected = indexmap::IndexMap::new();
        expected.insert("k".to_owned(), Value::String("B".into()));
        assert_eq!(ta.content(), Value::Map(expected.clone()));
        assert_eq!(tb.content(), Value::Map(expected));

        a.stop().unwrap();
        b.stop().unwrap();
    }
}
