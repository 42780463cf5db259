//! Three-way merge over structural deltas (§4.5.3).

use conflux_value::{diff, patch, Delta, Value};

/// Which side of an edge a message came from, relative to the id-ordered
/// chain. `Down` means the message came from a smaller-id peer (we are
/// "higher"); `Up` means it came from a larger-id peer (we are "lower").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Message originated from a peer with a smaller node id.
    Down,
    /// Message originated from a peer with a larger node id.
    Up,
}

impl Direction {
    /// The flag carried on the wire for a message travelling in this
    /// direction (§6: `upwards: bool`).
    #[must_use]
    pub fn upwards_flag(self) -> bool {
        matches!(self, Direction::Up)
    }

    /// The direction opposite this one, used when bouncing a targeted
    /// flush back to the sender (§4.5.2 step 7).
    #[must_use]
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Down => Direction::Up,
            Direction::Up => Direction::Down,
        }
    }
}

/// Compute the net delta to apply to the *current* content — which
/// already reflects `local` applied to `baseline` — so it also reconciles
/// `remote` (§4.5.3).
///
/// Commuting edits apply cleanly in either order; the net change is then
/// simply `remote`. Non-commuting edits are a conflict, broken
/// deterministically by `direction`: the higher-id side of the pair
/// (`Direction::Down`, meaning the message arrived from a lower-id peer)
/// keeps its local value; the lower-id side (`Direction::Up`) adopts
/// remote. Given ids `A < B`, this converges both replicas on `B`'s value
/// (§8 invariant 6).
#[must_use]
pub fn merge(baseline: &Value, local: &Delta, remote: &Delta, direction: Direction) -> Delta {
    let commutes = match (
        patch(remote, baseline).and_then(|v| patch(local, &v)),
        patch(local, baseline).and_then(|v| patch(remote, &v)),
    ) {
        (Ok(x), Ok(y)) => x == y,
        _ => false,
    };

    if commutes {
        return remote.clone();
    }

    match direction {
        Direction::Down => Delta::new(),
        Direction::Up => {
            let Ok(current) = patch(local, baseline) else {
                return Delta::new();
            };
            let Ok(target) = patch(remote, baseline) else {
                return Delta::new();
            };
            diff(&current, &target)
        }
    }
}
