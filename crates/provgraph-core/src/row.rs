//! Intermediate result rows.
//!
//! A row is a fixed-width vector of binding slots. Slots hold shared
//! pointers into the store snapshot, so joins and traversals never clone
//! entities or evidence lists.

use crate::types::{EdgeId, Entity, EntityId, Edge, RelationType};
use std::sync::Arc;

/// Node, edge and relation sequence of one matched path.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PathSummary {
    pub(crate) node_ids: Vec<EntityId>,
    pub(crate) edge_ids: Vec<EdgeId>,
    pub(crate) relation_types: Vec<RelationType>,
}

impl PathSummary {
    pub(crate) fn length(&self) -> usize {
        self.edge_ids.len()
    }
}

/// Value bound to a query variable.
#[derive(Debug, Clone)]
pub(crate) enum Bound {
    Node(Arc<Entity>),
    Edge(Arc<Edge>),
    Path(Arc<PathSummary>),
}

impl Bound {
    fn identity(&self, out: &mut Vec<String>) {
        match self {
            Self::Node(e) => out.push(e.id.to_string()),
            Self::Edge(e) => out.push(e.id.to_string()),
            Self::Path(p) => {
                out.extend(p.node_ids.iter().map(ToString::to_string));
                out.extend(p.edge_ids.iter().map(ToString::to_string));
            }
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Row {
    slots: Vec<Option<Bound>>,
}

impl Row {
    pub(crate) fn new(width: usize) -> Self {
        Self {
            slots: vec![None; width],
        }
    }

    pub(crate) fn set(&mut self, slot: usize, value: Bound) {
        if let Some(entry) = self.slots.get_mut(slot) {
            *entry = Some(value);
        }
    }

    pub(crate) fn get(&self, slot: usize) -> Option<&Bound> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Ids of every bound slot in slot order; the final ordering tie-break.
    pub(crate) fn identity(&self) -> Vec<String> {
        let mut out = Vec::new();
        for bound in self.slots.iter().flatten() {
            bound.identity(&mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityType;

    #[test]
    fn unbound_slots_read_as_none() {
        let mut row = Row::new(3);
        row.set(1, Bound::Node(Arc::new(Entity::new("d1", EntityType::Drug, "Aspirin"))));
        row.set(7, Bound::Node(Arc::new(Entity::new("x", EntityType::Drug, "x"))));
        assert!(row.get(0).is_none());
        assert!(row.get(1).is_some());
        assert!(row.get(7).is_none());
        assert_eq!(row.identity(), vec!["d1".to_string()]);
    }

    #[test]
    fn path_identity_lists_nodes_then_edges() {
        let summary = PathSummary {
            node_ids: vec![EntityId::new("a"), EntityId::new("b")],
            edge_ids: vec![EdgeId::new("e1")],
            relation_types: vec![RelationType::Treats],
        };
        assert_eq!(summary.length(), 1);
        let mut row = Row::new(1);
        row.set(0, Bound::Path(Arc::new(summary)));
        assert_eq!(row.identity(), vec!["a", "b", "e1"]);
    }
}
