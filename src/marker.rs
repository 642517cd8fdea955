//! Transient node-keyed markers passing state between rules and passes.
//!
//! Markers are an explicit tagged variant keyed by node id in a side map,
//! not identity-based sidecar metadata. At most one marker of each kind may
//! sit on a node; attaching a second marker of the same kind overwrites the
//! first (last-writer-wins) and hands the displaced marker back to the
//! caller, which reports it instead of dropping it silently.
//!
//! A marker survives node replacement by being transferred from the dead
//! node to its replacement. Markers not consumed by the end of a run are
//! drained and reported as orphans.

use crate::arena::NodeId;
use crate::tree::QualifiedName;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Kind tag for a marker. One marker of each kind per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerKind {
    /// A payload expression elided from its original call site, waiting to
    /// surface as the argument of the terminal call of the same chain.
    DeferredPayload,
    /// A static type change recorded by a terminal rewrite, consumed by the
    /// unit-wide declaration sweep.
    TypeCorrection,
}

impl fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerKind::DeferredPayload => write!(f, "deferred payload"),
            MarkerKind::TypeCorrection => write!(f, "type correction"),
        }
    }
}

/// A marker value: kind tag plus payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Marker {
    /// Carries the unevaluated payload expression of an elided call.
    DeferredPayload { payload: NodeId },
    /// Records `from` → `to` for the declaration-retyping sweep.
    TypeCorrection {
        from: QualifiedName,
        to: QualifiedName,
    },
}

impl Marker {
    /// Returns the kind tag of this marker.
    pub fn kind(&self) -> MarkerKind {
        match self {
            Marker::DeferredPayload { .. } => MarkerKind::DeferredPayload,
            Marker::TypeCorrection { .. } => MarkerKind::TypeCorrection,
        }
    }
}

/// Side map holding markers for one in-flight run on one compilation unit.
#[derive(Debug, Default)]
pub struct MarkerStore {
    entries: HashMap<NodeId, Vec<Marker>>,
}

impl MarkerStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `marker` to `node`. If the node already carries a marker of
    /// the same kind, the old marker is overwritten (last-writer-wins) and
    /// returned so the caller can report it.
    pub fn attach(&mut self, node: NodeId, marker: Marker) -> Option<Marker> {
        let slot = self.entries.entry(node).or_default();
        let kind = marker.kind();
        if let Some(pos) = slot.iter().position(|m| m.kind() == kind) {
            let displaced = slot[pos].clone();
            slot[pos] = marker;
            Some(displaced)
        } else {
            slot.push(marker);
            None
        }
    }

    /// Returns the marker of `kind` on `node`, if any, without consuming it.
    pub fn get(&self, node: NodeId, kind: MarkerKind) -> Option<&Marker> {
        self.entries
            .get(&node)
            .and_then(|slot| slot.iter().find(|m| m.kind() == kind))
    }

    /// Removes and returns the marker of `kind` on `node`, if any.
    pub fn take(&mut self, node: NodeId, kind: MarkerKind) -> Option<Marker> {
        let slot = self.entries.get_mut(&node)?;
        let pos = slot.iter().position(|m| m.kind() == kind)?;
        let marker = slot.remove(pos);
        if slot.is_empty() {
            self.entries.remove(&node);
        }
        Some(marker)
    }

    /// Moves every marker from `old` to `new` (used when a marked node is
    /// replaced). Collisions at the destination follow last-writer-wins:
    /// the transferred marker wins, and the displaced destination markers
    /// are returned for reporting.
    pub fn transfer(&mut self, old: NodeId, new: NodeId) -> Vec<Marker> {
        if old == new {
            return Vec::new();
        }
        let Some(moved) = self.entries.remove(&old) else {
            return Vec::new();
        };
        let mut displaced = Vec::new();
        for marker in moved {
            if let Some(d) = self.attach(new, marker) {
                displaced.push(d);
            }
        }
        displaced
    }

    /// Removes and returns every remaining marker, in ascending node order.
    pub fn drain(&mut self) -> Vec<(NodeId, Marker)> {
        let mut out: Vec<(NodeId, Marker)> = self
            .entries
            .drain()
            .flat_map(|(node, slot)| slot.into_iter().map(move |m| (node, m)))
            .collect();
        out.sort_by_key(|(node, marker)| (*node, marker.kind() as u8));
        out
    }

    /// Removes and returns every marker of the given kind, in ascending node
    /// order.
    pub fn take_all_of_kind(&mut self, kind: MarkerKind) -> Vec<(NodeId, Marker)> {
        let mut out = Vec::new();
        let nodes: Vec<NodeId> = self.entries.keys().copied().collect();
        for node in nodes {
            if let Some(marker) = self.take(node, kind) {
                out.push((node, marker));
            }
        }
        out.sort_by_key(|(node, _)| *node);
        out
    }

    /// Returns `true` if the store holds no markers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(n: u32) -> Marker {
        Marker::DeferredPayload {
            payload: NodeId::new(n),
        }
    }

    #[test]
    fn attach_take_roundtrip() {
        let mut store = MarkerStore::new();
        let node = NodeId::new(1);
        assert!(store.attach(node, payload(10)).is_none());
        assert!(store.get(node, MarkerKind::DeferredPayload).is_some());
        assert_eq!(store.take(node, MarkerKind::DeferredPayload), Some(payload(10)));
        assert!(store.is_empty());
    }

    #[test]
    fn last_writer_wins_returns_displaced() {
        let mut store = MarkerStore::new();
        let node = NodeId::new(1);
        assert!(store.attach(node, payload(10)).is_none());
        let displaced = store.attach(node, payload(11));
        assert_eq!(displaced, Some(payload(10)));
        assert_eq!(store.take(node, MarkerKind::DeferredPayload), Some(payload(11)));
    }

    #[test]
    fn kinds_do_not_collide() {
        let mut store = MarkerStore::new();
        let node = NodeId::new(1);
        store.attach(node, payload(10));
        let correction = Marker::TypeCorrection {
            from: "a.B".to_owned(),
            to: "c.D".to_owned(),
        };
        assert!(store.attach(node, correction.clone()).is_none());
        assert_eq!(store.get(node, MarkerKind::DeferredPayload), Some(&payload(10)));
        assert_eq!(store.get(node, MarkerKind::TypeCorrection), Some(&correction));
    }

    #[test]
    fn transfer_moves_markers_to_replacement() {
        let mut store = MarkerStore::new();
        let old = NodeId::new(1);
        let new = NodeId::new(2);
        store.attach(old, payload(10));
        let displaced = store.transfer(old, new);
        assert!(displaced.is_empty());
        assert!(store.get(old, MarkerKind::DeferredPayload).is_none());
        assert_eq!(store.get(new, MarkerKind::DeferredPayload), Some(&payload(10)));

        // Transferring onto a node that already carries the kind displaces.
        store.attach(old, payload(11));
        let displaced = store.transfer(old, new);
        assert_eq!(displaced, vec![payload(10)]);
        assert_eq!(store.get(new, MarkerKind::DeferredPayload), Some(&payload(11)));
    }

    #[test]
    fn drain_reports_orphans_in_node_order() {
        let mut store = MarkerStore::new();
        store.attach(NodeId::new(5), payload(50));
        store.attach(NodeId::new(2), payload(20));
        let drained = store.drain();
        assert_eq!(
            drained,
            vec![(NodeId::new(2), payload(20)), (NodeId::new(5), payload(50))]
        );
        assert!(store.is_empty());
    }
}
