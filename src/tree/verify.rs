//! Structural checks over the node graph.

use std::collections::HashSet;

use super::{NodeId, TriggerTree};
use crate::relationship::RelationshipType;

impl<A> TriggerTree<A> {
    /// Checks the ordering invariants of the whole tree.
    ///
    /// Every child must be strictly more specific than its parent, siblings
    /// must be incomparable, and no node may be its own ancestor. Returns the
    /// first node where a check fails: the parent for an ordering violation,
    /// the revisited node for a cycle.
    #[must_use]
    pub fn verify_tree(&self) -> Option<NodeId> {
        let mut on_path = HashSet::new();
        let mut done = HashSet::new();
        self.verify_node(self.root, &mut on_path, &mut done)
    }

    fn verify_node(&self, id: NodeId, on_path: &mut HashSet<NodeId>, done: &mut HashSet<NodeId>) -> Option<NodeId> {
        if done.contains(&id) {
            return None;
        }
        if !on_path.insert(id) {
            return Some(id);
        }

        let children = &self.nodes[id.0].specializations;
        for (i, child) in children.iter().enumerate() {
            if self.relationship(id, *child) != RelationshipType::Generalizes {
                return Some(id);
            }
            for sibling in &children[i + 1..] {
                if self.relationship(*child, *sibling) != RelationshipType::Incomparable {
                    return Some(id);
                }
            }
            if let Some(bad) = self.verify_node(*child, on_path, done) {
                return Some(bad);
            }
        }

        on_path.remove(&id);
        done.insert(id);
        None
    }
}

#[cfg(test)]
mod tests {
    use crate::TriggerTree;

    #[test]
    fn test_empty_tree_is_consistent() {
        let tree: TriggerTree<i32> = TriggerTree::new();
        assert_eq!(tree.verify_tree(), None);
    }

    #[test]
    fn test_detects_wrong_order() {
        let mut tree = TriggerTree::new();
        tree.add_trigger("exists(a)", 1, vec![]).unwrap();
        tree.add_trigger("exists(a) && exists(b)", 2, vec![]).unwrap();
        assert_eq!(tree.verify_tree(), None);

        // hang the general node below the specific one
        let root = tree.root();
        let a = tree.nodes[root.0].specializations[0];
        let ab = tree.nodes[a.0].specializations[0];
        tree.nodes[a.0].specializations.clear();
        tree.nodes[root.0].specializations = vec![ab];
        tree.nodes[ab.0].specializations.push(a);
        assert_eq!(tree.verify_tree(), Some(ab));
    }

    #[test]
    fn test_detects_related_siblings() {
        let mut tree = TriggerTree::new();
        tree.add_trigger("exists(a)", 1, vec![]).unwrap();
        tree.add_trigger("exists(a) && exists(b)", 2, vec![]).unwrap();

        let root = tree.root();
        let a = tree.nodes[root.0].specializations[0];
        let ab = tree.nodes[a.0].specializations[0];
        tree.nodes[root.0].specializations.push(ab);
        assert_eq!(tree.verify_tree(), Some(root));
    }

    #[test]
    fn test_detects_back_edge() {
        let mut tree = TriggerTree::new();
        tree.add_trigger("x < 5", 1, vec![]).unwrap();
        tree.add_trigger("x < 5 && exists(b)", 2, vec![]).unwrap();

        let root = tree.root();
        let a = tree.nodes[root.0].specializations[0];
        let ab = tree.nodes[a.0].specializations[0];
        // point the child back at its parent
        tree.nodes[ab.0].specializations.push(a);
        assert!(tree.verify_tree().is_some());
    }
}
