//! Deterministic up/down election over a node-id set (§3 "Routing view",
//! §4.3).

use std::collections::BTreeSet;

/// The view of the peer group a [`crate::Conduit`] maintains for one
/// document: every known node id, and the elected up/down neighbours used
/// for routing and conflict tie-breaking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingView {
    /// Every node id known to be interested in this document, including
    /// this node's own id.
    pub node_ids: BTreeSet<String>,
    /// The smallest id strictly greater than this node's id, if any.
    pub up: Option<String>,
    /// The singleton list containing the largest id strictly less than
    /// this node's id, empty if none (kept as a `Vec` for forward
    /// compatibility per §4.3).
    pub down: Vec<String>,
}

impl RoutingView {
    /// Recompute the view for `self_id` given the known membership
    /// `node_ids` (which need not already contain `self_id`).
    #[must_use]
    pub fn compute(self_id: &str, node_ids: &BTreeSet<String>) -> Self {
        let mut node_ids = node_ids.clone();
        node_ids.insert(self_id.to_owned());

        let up = node_ids.iter().find(|id| id.as_str() > self_id).cloned();
        let down = node_ids
            .iter()
            .rev()
            .find(|id| id.as_str() < self_id)
            .cloned()
            .into_iter()
            .collect();

        Self { node_ids, up, down }
    }

    /// Iterate the neighbours a local change should be propagated to:
    /// `up ∪ down` (§4.5).
    pub fn neighbours(&self) -> impl Iterator<Item = &str> {
        self.up.iter().map(String::as_str).chain(self.down.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn middle_node_has_both_neighbours() {
        let ids: BTreeSet<String> = ["a", "b", "c"].iter().map(|s| (*s).to_owned()).collect();
        let view = RoutingView::compute("b", &ids);
        assert_eq!(view.up.as_deref(), Some("c"));
        assert_eq!(view.down, vec!["a".to_owned()]);
    }

    #[test]
    fn edge_nodes_have_one_neighbour() {
        let ids: BTreeSet<String> = ["a", "b", "c"].iter().map(|s| (*s).to_owned()).collect();
        let lo = RoutingView::compute("a", &ids);
        assert_eq!(lo.up.as_deref(), Some("b"));
        assert!(lo.down.is_empty());

        let hi = RoutingView::compute("c", &ids);
        assert!(hi.up.is_none());
        assert_eq!(hi.down, vec!["b".to_owned()]);
    }

    #[test]
    fn solo_node_has_no_neighbours() {
        let view = RoutingView::compute("a", &BTreeSet::new());
        assert!(view.up.is_none());
        assert!(view.down.is_empty());
    }
}
