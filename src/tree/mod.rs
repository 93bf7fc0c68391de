//! The trigger tree.
//!
//! Every trigger clause is placed in a directed acyclic graph ordered by
//! generality: the root holds the empty (always true) clause and each child
//! is strictly more specific than its parents. Matching walks the graph from
//! the root and reports the most specific triggers whose clauses hold.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. Slots of
//! nodes detached by a removal are recycled.

mod matching;
mod node;
mod render;
mod verify;

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::{debug, error, trace, warn};

use crate::clause::Clause;
use crate::comparer::ComparerRegistry;
use crate::config::TriggerTreeConfig;
use crate::error::TriggerTreeResult;
use crate::expression::Expression;
use crate::optimizer::ClauseOptimizer;
use crate::relationship::RelationshipType;
use crate::trigger::{ExpansionContext, Quantifier, Trigger, TriggerId};

pub use matching::TriggerMatch;
pub use node::{NodeId, NodeView};

use node::Node;

/// Outcome of offering a clause to one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    /// Not related to this node or anything below it.
    None,
    /// An identical trigger is already here.
    Found,
    /// Placed at or below this node.
    Added,
    /// The new clause generalizes this node and adopted it as a child.
    Inserted,
}

/// State of one clause placement walk.
#[derive(Debug, Default)]
struct Placement {
    ops: HashMap<NodeId, Operation>,
    linked: bool,
    merged: bool,
}

/// Index of triggers that returns the most specific matches for a memory.
///
/// # Examples
///
/// ```
/// use trigger_tree::TriggerTree;
///
/// let mut tree = TriggerTree::new();
/// tree.add_trigger("exists(blah)", "general", vec![]).unwrap();
/// tree.add_trigger("exists(blah) && woof == 3", "specific", vec![]).unwrap();
///
/// let memory = serde_json::json!({"blah": 1, "woof": 3});
/// let actions: Vec<_> = tree.matches(&memory).iter().map(|m| *m.action()).collect();
/// assert_eq!(actions, vec!["specific"]);
/// ```
pub struct TriggerTree<A> {
    nodes: Vec<Node>,
    live: Vec<bool>,
    free: Vec<usize>,
    root: NodeId,
    triggers: HashMap<TriggerId, Trigger<A>>,
    comparers: ComparerRegistry,
    optimizers: Vec<Box<dyn ClauseOptimizer>>,
    config: TriggerTreeConfig,
    total_triggers: usize,
}

impl<A> TriggerTree<A> {
    /// An empty tree with the default numeric comparers.
    #[must_use]
    pub fn new() -> Self {
        Self::with_comparers(ComparerRegistry::default())
    }

    /// An empty tree using `comparers` to relate predicates.
    #[must_use]
    pub fn with_comparers(comparers: ComparerRegistry) -> Self {
        Self::build(TriggerTreeConfig::default(), comparers)
    }

    /// An empty tree with explicit settings.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `config` is out of range.
    pub fn with_config(config: TriggerTreeConfig, comparers: ComparerRegistry) -> TriggerTreeResult<Self> {
        config.validate()?;
        Ok(Self::build(config, comparers))
    }

    fn build(config: TriggerTreeConfig, comparers: ComparerRegistry) -> Self {
        Self {
            nodes: vec![Node::new(Clause::default())],
            live: vec![true],
            free: Vec::new(),
            root: NodeId(0),
            triggers: HashMap::new(),
            comparers,
            optimizers: Vec::new(),
            config,
            total_triggers: 0,
        }
    }

    /// Registers an optimizer applied to the clauses of triggers added from
    /// now on.
    pub fn add_optimizer(&mut self, optimizer: impl ClauseOptimizer + 'static) {
        self.optimizers.push(Box::new(optimizer));
    }

    /// Settings the tree was built with.
    pub fn config(&self) -> &TriggerTreeConfig {
        &self.config
    }

    /// Comparers used to relate predicates.
    pub fn comparers(&self) -> &ComparerRegistry {
        &self.comparers
    }

    /// Number of triggers that placed at least one clause.
    pub fn total_triggers(&self) -> usize {
        self.total_triggers
    }

    /// The always-true root node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// A stored trigger by id.
    pub fn trigger(&self, id: TriggerId) -> Option<&Trigger<A>> {
        self.triggers.get(&id)
    }

    /// Stored triggers, in no particular order.
    pub fn triggers(&self) -> impl Iterator<Item = &Trigger<A>> {
        self.triggers.values()
    }

    /// View of a live node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<NodeView<'_>> {
        if !self.is_live(id) {
            return None;
        }
        Some(NodeView::new(id, &self.nodes[id.0], self.generalizations(id)))
    }

    fn is_live(&self, id: NodeId) -> bool {
        self.live.get(id.0).copied().unwrap_or(false)
    }

    /// Direct parents of `id`, sorted by id.
    ///
    /// Every ancestor generalizes `id`, so the walk only enters children
    /// that do.
    fn generalizations(&self, id: NodeId) -> Vec<NodeId> {
        let mut parents = Vec::new();
        let mut seen = HashSet::from([self.root]);
        let mut stack = vec![self.root];
        while let Some(current) = stack.pop() {
            for child in &self.nodes[current.0].specializations {
                if *child == id {
                    parents.push(current);
                } else if self.relationship(*child, id) == RelationshipType::Generalizes && seen.insert(*child) {
                    stack.push(*child);
                }
            }
        }
        parents.sort_unstable();
        parents
    }

    /// Parses `text` and adds it as a trigger.
    ///
    /// # Errors
    ///
    /// Returns an expression error if `text` does not parse, or
    /// [`crate::TriggerTreeError::ExpansionLimitExceeded`] if the trigger
    /// expands into too many clauses. The tree is unchanged on error.
    pub fn add_trigger(&mut self, text: &str, action: A, quantifiers: Vec<Quantifier>) -> TriggerTreeResult<TriggerId>
    where
        A: PartialEq,
    {
        let expression = Expression::parse(text)?;
        self.add_expression(expression, action, quantifiers)
    }

    /// Adds an already parsed trigger expression.
    ///
    /// A trigger that normalizes to no clauses (for example `false`) is
    /// accepted but never stored, counted or matched. Adding a trigger equal
    /// to one already present with the same action has no effect.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TriggerTreeError::ExpansionLimitExceeded`] if the
    /// trigger expands into more than `max_expansion` clauses.
    pub fn add_expression(
        &mut self,
        expression: Expression,
        action: A,
        quantifiers: Vec<Quantifier>,
    ) -> TriggerTreeResult<TriggerId>
    where
        A: PartialEq,
    {
        let ctx = ExpansionContext {
            comparers: &self.comparers,
            optimizers: &self.optimizers,
            max_expansion: self.config.max_expansion,
        };
        let trigger = match Trigger::new(expression, action, quantifiers, &ctx) {
            Ok(trigger) => trigger,
            Err(e) => {
                if e.is_expansion_limit() {
                    warn!(error = %e, "trigger rejected");
                }
                return Err(e);
            }
        };

        let id = trigger.id();
        if trigger.clauses().is_empty() {
            debug!(trigger = %id, "trigger has no clauses, nothing to place");
            return Ok(id);
        }

        let clauses: Vec<Clause> = trigger.clauses().iter().map(Clause::without_ignored).collect();
        self.triggers.insert(id, trigger);

        let mut placed = false;
        for clause in clauses {
            let new = self.allocate(Node::with_trigger(clause, id));
            let mut placement = Placement::default();
            self.add_node(self.root, new, id, &mut placement);
            if !placement.linked {
                self.release(new);
            }
            placed |= placement.linked || placement.merged;
        }

        if placed {
            self.total_triggers += 1;
            debug!(trigger = %id, nodes = self.node_count(), "added trigger");
        } else {
            self.triggers.remove(&id);
            debug!(trigger = %id, "trigger already present");
        }
        self.check_consistency("add");
        Ok(id)
    }

    /// Removes a trigger from every node that holds it.
    ///
    /// Returns false if the trigger is not in the tree.
    pub fn remove_trigger(&mut self, id: TriggerId) -> bool {
        if !self.triggers.contains_key(&id) {
            return false;
        }
        let mut visited = HashSet::new();
        let mut detached = Vec::new();
        let removed = self.remove_from(self.root, id, &mut visited, &mut detached);
        self.triggers.remove(&id);
        if removed {
            self.total_triggers = self.total_triggers.saturating_sub(1);
        }
        for node in detached {
            if self.is_live(node) {
                self.release(node);
            }
        }
        debug!(trigger = %id, removed, nodes = self.node_count(), "removed trigger");
        self.check_consistency("remove");
        removed
    }

    fn add_node(&mut self, current: NodeId, new: NodeId, trigger: TriggerId, placement: &mut Placement) -> Operation
    where
        A: PartialEq,
    {
        if let Some(op) = placement.ops.get(&current) {
            return *op;
        }

        let relationship = self.relationship(current, new);
        trace!(node = %current, %relationship, "placing clause");
        let op = match relationship {
            RelationshipType::Equal => self.merge_trigger(current, trigger, placement),
            RelationshipType::Incomparable => {
                for child in self.nodes[current.0].specializations.clone() {
                    self.add_node(child, new, trigger, placement);
                }
                Operation::None
            }
            RelationshipType::Specializes => {
                self.add_specialization(new, current);
                Operation::Inserted
            }
            RelationshipType::Generalizes => {
                let mut op = Operation::None;
                let mut found_one = false;
                let mut removals = Vec::new();
                for child in self.nodes[current.0].specializations.clone() {
                    let child_op = self.add_node(child, new, trigger, placement);
                    if child_op == Operation::None {
                        continue;
                    }
                    found_one = true;
                    if child_op == Operation::Inserted {
                        removals.push(child);
                        op = Operation::Added;
                    } else {
                        op = child_op;
                    }
                }

                let node = &mut self.nodes[current.0];
                if !removals.is_empty() {
                    node.specializations.retain(|child| !removals.contains(child));
                }
                if (!removals.is_empty() || !found_one) && !node.specializations.contains(&new) {
                    node.specializations.push(new);
                    placement.linked = true;
                }
                if !found_one {
                    op = Operation::Added;
                }
                op
            }
        };
        placement.ops.insert(current, op);
        op
    }

    /// Adds `trigger` to a node whose clause equals the trigger's clause.
    fn merge_trigger(&mut self, current: NodeId, trigger: TriggerId, placement: &mut Placement) -> Operation
    where
        A: PartialEq,
    {
        let node = &self.nodes[current.0];
        if node.all_triggers.iter().any(|existing| self.is_duplicate(*existing, trigger)) {
            trace!(node = %current, trigger = %trigger, "duplicate trigger");
            return Operation::Found;
        }

        // Keep only the most specific triggers in the match list.
        let mut kept = Vec::with_capacity(node.triggers.len() + 1);
        let mut add = true;
        for (i, existing) in node.triggers.iter().enumerate() {
            match self.trigger_relationship(trigger, *existing) {
                RelationshipType::Generalizes => {
                    add = false;
                    kept.extend_from_slice(&node.triggers[i..]);
                    break;
                }
                RelationshipType::Specializes => {}
                RelationshipType::Equal | RelationshipType::Incomparable => kept.push(*existing),
            }
        }
        if add {
            kept.push(trigger);
        }

        let node = &mut self.nodes[current.0];
        node.all_triggers.push(trigger);
        node.triggers = kept;
        placement.merged = true;
        Operation::Added
    }

    /// Makes `specialization` a child of `parent`, moving any children of
    /// `parent` it generalizes underneath it.
    fn add_specialization(&mut self, parent: NodeId, specialization: NodeId) {
        let mut removals = Vec::new();
        for child in self.nodes[parent.0].specializations.clone() {
            match self.relationship(specialization, child) {
                RelationshipType::Equal | RelationshipType::Specializes => return,
                RelationshipType::Generalizes => removals.push(child),
                RelationshipType::Incomparable => {}
            }
        }
        for removal in removals {
            self.nodes[parent.0].specializations.retain(|child| *child != removal);
            self.add_specialization(specialization, removal);
        }
        self.nodes[parent.0].specializations.push(specialization);
    }

    /// Removes `trigger` below `current` and detaches nodes left without
    /// triggers, collecting them in `detached`.
    ///
    /// Every parent of an emptied node detaches it, since the walk reaches
    /// every live node.
    fn remove_from(
        &mut self,
        current: NodeId,
        trigger: TriggerId,
        visited: &mut HashSet<NodeId>,
        detached: &mut Vec<NodeId>,
    ) -> bool {
        if !visited.insert(current) {
            return false;
        }

        let mut removed = false;
        let node = &mut self.nodes[current.0];
        if let Some(pos) = node.all_triggers.iter().position(|t| *t == trigger) {
            node.all_triggers.remove(pos);
            removed = true;
            if let Some(pos) = node.triggers.iter().position(|t| *t == trigger) {
                node.triggers.remove(pos);
                self.promote_candidates(current);
            }
        }

        let mut emptied = Vec::new();
        for child in self.nodes[current.0].specializations.clone() {
            removed |= self.remove_from(child, trigger, visited, detached);
            if self.nodes[child.0].triggers.is_empty() {
                emptied.push(child);
            }
        }

        if !emptied.is_empty() {
            self.nodes[current.0]
                .specializations
                .retain(|child| !emptied.contains(child));
            let mut orphans: Vec<NodeId> = Vec::new();
            for child in &emptied {
                trace!(node = %child, parent = %current, "detaching empty node");
                for specialization in &self.nodes[child.0].specializations {
                    if !orphans.contains(specialization) {
                        orphans.push(*specialization);
                    }
                }
            }
            // Only orphans no remaining child or other orphan generalizes
            // become children; the rest stay reachable below those.
            let siblings = &self.nodes[current.0].specializations;
            let adopted: Vec<NodeId> = orphans
                .iter()
                .copied()
                .filter(|orphan| {
                    !siblings.contains(orphan)
                        && !siblings.iter().chain(&orphans).any(|other| {
                            other != orphan && self.relationship(*other, *orphan) == RelationshipType::Generalizes
                        })
                })
                .collect();
            self.nodes[current.0].specializations.extend(adopted);
            detached.extend(emptied);
        }
        removed
    }

    /// Refills a node's match list after a trigger was removed: every
    /// trigger placed there that generalizes no other one placed there.
    fn promote_candidates(&mut self, current: NodeId) {
        let all = &self.nodes[current.0].all_triggers;
        let triggers = all
            .iter()
            .copied()
            .filter(|candidate| {
                !all.iter().any(|other| {
                    other != candidate && self.trigger_relationship(*candidate, *other) == RelationshipType::Generalizes
                })
            })
            .collect();
        self.nodes[current.0].triggers = triggers;
    }

    fn relationship(&self, node: NodeId, other: NodeId) -> RelationshipType {
        self.nodes[node.0]
            .clause
            .relationship(&self.nodes[other.0].clause, &self.comparers)
    }

    fn trigger_relationship(&self, trigger: TriggerId, other: TriggerId) -> RelationshipType {
        match (self.triggers.get(&trigger), self.triggers.get(&other)) {
            (Some(trigger), Some(other)) => trigger.relationship(other, &self.comparers),
            _ => RelationshipType::Incomparable,
        }
    }

    /// Same action and an equal expansion.
    fn is_duplicate(&self, existing: TriggerId, trigger: TriggerId) -> bool
    where
        A: PartialEq,
    {
        if existing == trigger {
            return true;
        }
        match (self.triggers.get(&existing), self.triggers.get(&trigger)) {
            (Some(existing), Some(trigger)) => {
                existing.action() == trigger.action()
                    && existing.relationship(trigger, &self.comparers) == RelationshipType::Equal
            }
            _ => false,
        }
    }

    fn allocate(&mut self, node: Node) -> NodeId {
        if let Some(index) = self.free.pop() {
            self.nodes[index] = node;
            self.live[index] = true;
            NodeId(index)
        } else {
            self.nodes.push(node);
            self.live.push(true);
            NodeId(self.nodes.len() - 1)
        }
    }

    fn release(&mut self, id: NodeId) {
        self.nodes[id.0] = Node::default();
        self.live[id.0] = false;
        self.free.push(id.0);
    }

    fn reachable(&self) -> HashSet<NodeId> {
        let mut seen = HashSet::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if seen.insert(id) {
                stack.extend(self.nodes[id.0].specializations.iter().copied());
            }
        }
        seen
    }

    fn check_consistency(&self, operation: &'static str) {
        if !self.config.verify_on_mutation {
            return;
        }
        if let Some(bad) = self.verify_tree() {
            error!(
                operation,
                node = %bad,
                clause = %self.nodes[bad.0].clause,
                "trigger tree is inconsistent"
            );
        }
    }
}

impl<A> Default for TriggerTree<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: fmt::Debug> fmt::Debug for TriggerTree<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerTree")
            .field("nodes", &self.node_count())
            .field("total_triggers", &self.total_triggers)
            .field("triggers", &self.triggers)
            .field("optimizers", &self.optimizers.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<A> fmt::Display for TriggerTree<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TriggerTree with {} triggers", self.total_triggers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_EXPANSION_LIMIT;
    use crate::error::TriggerTreeError;

    fn actions(tree: &TriggerTree<i32>, memory: &serde_json::Value) -> Vec<i32> {
        tree.matches(memory).iter().map(|m| *m.action()).collect()
    }

    #[test]
    fn test_new_tree_has_only_root() {
        let tree: TriggerTree<i32> = TriggerTree::new();
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.total_triggers(), 0);
        let root = tree.node(tree.root()).unwrap();
        assert!(root.clause().is_empty());
        assert!(root.specializations().is_empty());
        assert!(root.generalizations().is_empty());
        assert_eq!(tree.to_string(), "TriggerTree with 0 triggers");
    }

    #[test]
    fn test_with_config_validates() {
        let config = TriggerTreeConfig {
            max_expansion: MAX_EXPANSION_LIMIT + 1,
            ..TriggerTreeConfig::default()
        };
        let err = TriggerTree::<i32>::with_config(config, ComparerRegistry::default()).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_more_specific_goes_below() {
        let mut tree = TriggerTree::new();
        tree.add_trigger("exists(a)", 1, vec![]).unwrap();
        tree.add_trigger("exists(a) && exists(b)", 2, vec![]).unwrap();
        assert_eq!(tree.node_count(), 3);

        let root = tree.node(tree.root()).unwrap();
        assert_eq!(root.specializations().len(), 1);
        let a = tree.node(root.specializations()[0]).unwrap();
        assert_eq!(a.specializations().len(), 1);
        let ab = tree.node(a.specializations()[0]).unwrap();
        assert_eq!(ab.clause().len(), 2);
        assert_eq!(ab.generalizations(), [a.id()]);
        assert_eq!(tree.verify_tree(), None);
    }

    #[test]
    fn test_general_inserted_above_existing() {
        let mut tree = TriggerTree::new();
        tree.add_trigger("exists(a) && exists(b)", 2, vec![]).unwrap();
        tree.add_trigger("exists(a) && exists(c)", 3, vec![]).unwrap();
        tree.add_trigger("exists(a)", 1, vec![]).unwrap();

        let root = tree.node(tree.root()).unwrap();
        assert_eq!(root.specializations().len(), 1);
        let a = tree.node(root.specializations()[0]).unwrap();
        assert_eq!(a.clause().len(), 1);
        assert_eq!(a.specializations().len(), 2);
        assert_eq!(tree.verify_tree(), None);

        let memory = serde_json::json!({"a": 1, "b": 1});
        assert_eq!(actions(&tree, &memory), vec![2]);
        let memory = serde_json::json!({"a": 1});
        assert_eq!(actions(&tree, &memory), vec![1]);
    }

    #[test]
    fn test_shared_specialization_has_two_parents() {
        let mut tree = TriggerTree::new();
        tree.add_trigger("exists(a)", 1, vec![]).unwrap();
        tree.add_trigger("exists(b)", 2, vec![]).unwrap();
        tree.add_trigger("exists(a) && exists(b)", 3, vec![]).unwrap();

        let root = tree.node(tree.root()).unwrap();
        assert_eq!(root.specializations().len(), 2);
        let a = tree.node(root.specializations()[0]).unwrap();
        let b = tree.node(root.specializations()[1]).unwrap();
        assert_eq!(a.specializations(), b.specializations());
        let ab = tree.node(a.specializations()[0]).unwrap();
        assert_eq!(ab.generalizations().len(), 2);
        assert_eq!(tree.verify_tree(), None);

        let memory = serde_json::json!({"a": 1, "b": 1});
        assert_eq!(actions(&tree, &memory), vec![3]);
    }

    #[test]
    fn test_equal_clause_shares_node() {
        let mut tree = TriggerTree::new();
        tree.add_trigger("exists(a)", 1, vec![]).unwrap();
        tree.add_trigger("exists(a)", 2, vec![]).unwrap();
        assert_eq!(tree.node_count(), 2);
        assert_eq!(tree.total_triggers(), 2);

        let memory = serde_json::json!({"a": 1});
        assert_eq!(actions(&tree, &memory), vec![1, 2]);
    }

    #[test]
    fn test_duplicate_trigger_not_counted() {
        let mut tree = TriggerTree::new();
        let first = tree.add_trigger("exists(a)", 1, vec![]).unwrap();
        let second = tree.add_trigger("exists(a)", 1, vec![]).unwrap();
        assert_eq!(tree.total_triggers(), 1);
        assert!(tree.trigger(first).is_some());
        assert!(tree.trigger(second).is_none());
        assert_eq!(tree.node_count(), 2);
    }

    #[test]
    fn test_node_keeps_most_specific_trigger() {
        let mut tree = TriggerTree::new();
        let either = tree.add_trigger("exists(woof) || exists(blah)", 1, vec![]).unwrap();
        let blah = tree.add_trigger("exists(blah)", 2, vec![]).unwrap();

        let root = tree.node(tree.root()).unwrap();
        let blah_node = root
            .specializations()
            .iter()
            .filter_map(|id| tree.node(*id))
            .find(|n| n.all_triggers().len() == 2)
            .unwrap();
        assert_eq!(blah_node.triggers(), [blah]);
        assert_eq!(blah_node.all_triggers(), [either, blah]);

        // removing the specific trigger promotes the general one
        assert!(tree.remove_trigger(blah));
        let memory = serde_json::json!({"blah": 1});
        assert_eq!(actions(&tree, &memory), vec![1]);
    }

    #[test]
    fn test_removal_promotes_equal_triggers_together() {
        let mut tree = TriggerTree::new();
        tree.add_trigger("exists(a) || exists(b)", 1, vec![]).unwrap();
        tree.add_trigger("exists(a) || exists(b)", 2, vec![]).unwrap();
        let specific = tree.add_trigger("exists(a)", 3, vec![]).unwrap();

        let memory = serde_json::json!({"a": 1});
        assert_eq!(actions(&tree, &memory), vec![3]);
        assert!(tree.remove_trigger(specific));
        assert_eq!(actions(&tree, &memory), vec![1, 2]);
    }

    #[test]
    fn test_false_is_not_stored() {
        let mut tree = TriggerTree::new();
        let id = tree.add_trigger("false", 5, vec![]).unwrap();
        assert_eq!(tree.total_triggers(), 0);
        assert!(tree.trigger(id).is_none());
        assert!(!tree.remove_trigger(id));
    }

    #[test]
    fn test_parse_error_leaves_tree_untouched() {
        let mut tree = TriggerTree::new();
        tree.add_trigger("exists(a)", 1, vec![]).unwrap();
        let err = tree.add_trigger("exists(a) &&", 2, vec![]).unwrap_err();
        assert!(err.is_expression());
        assert_eq!(tree.total_triggers(), 1);
        assert_eq!(tree.node_count(), 2);
    }

    #[test]
    fn test_expansion_limit_leaves_tree_untouched() {
        let config = TriggerTreeConfig {
            max_expansion: 2,
            ..TriggerTreeConfig::default()
        };
        let mut tree = TriggerTree::with_config(config, ComparerRegistry::default()).unwrap();
        let err = tree
            .add_trigger("exists(a) || exists(b) || exists(c)", 1, vec![])
            .unwrap_err();
        assert!(matches!(err, TriggerTreeError::ExpansionLimitExceeded { limit: 2, .. }));
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.total_triggers(), 0);
    }

    #[test]
    fn test_remove_reparents_children() {
        let mut tree = TriggerTree::new();
        let a = tree.add_trigger("exists(a)", 1, vec![]).unwrap();
        tree.add_trigger("exists(a) && exists(b)", 2, vec![]).unwrap();

        assert!(tree.remove_trigger(a));
        assert_eq!(tree.total_triggers(), 1);
        assert_eq!(tree.node_count(), 2);
        let root = tree.node(tree.root()).unwrap();
        assert_eq!(root.specializations().len(), 1);
        let ab = tree.node(root.specializations()[0]).unwrap();
        assert_eq!(ab.clause().len(), 2);
        assert_eq!(tree.verify_tree(), None);
    }

    #[test]
    fn test_redundant_ranges_place_consistently() {
        let texts = [
            "exists(y)",
            "x >= 0 && exists(y) && exists(z)",
            "x >= 0 && x >= 1 && exists(z)",
        ];
        let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
        for order in orders {
            let mut tree = TriggerTree::new();
            for i in order {
                tree.add_trigger(texts[i], i, vec![]).unwrap();
            }
            assert_eq!(tree.verify_tree(), None, "order {order:?}\n{}", tree.tree_to_string(0));
            assert_eq!(tree.total_triggers(), 3);

            let memory = serde_json::json!({"x": 2, "y": 1, "z": 1});
            let mut found: Vec<usize> = tree.matches(&memory).iter().map(|m| *m.action()).collect();
            found.sort_unstable();
            assert_eq!(found, vec![1, 2], "order {order:?}");
        }
    }

    #[test]
    fn test_remove_adopts_only_most_general_orphans() {
        let mut tree = TriggerTree::new();
        let either = tree.add_trigger("exists(b) || exists(a)", 1, vec![]).unwrap();
        tree.add_trigger("exists(a) && exists(c)", 2, vec![]).unwrap();
        tree.add_trigger("exists(a) && exists(b) && exists(c)", 3, vec![]).unwrap();
        assert_eq!(tree.verify_tree(), None);

        assert!(tree.remove_trigger(either));
        assert_eq!(tree.verify_tree(), None, "{}", tree.tree_to_string(0));
        assert_eq!(tree.node_count(), 3);
        let root = tree.node(tree.root()).unwrap();
        assert_eq!(root.specializations().len(), 1);
        let ac = tree.node(root.specializations()[0]).unwrap();
        assert_eq!(ac.clause().len(), 2);
        assert_eq!(ac.generalizations(), [tree.root()]);

        let memory = serde_json::json!({"a": 1, "b": 1, "c": 1});
        assert_eq!(actions(&tree, &memory), vec![3]);
    }

    #[test]
    fn test_released_slots_are_not_live() {
        let mut tree = TriggerTree::new();
        let a = tree.add_trigger("exists(a)", 1, vec![]).unwrap();
        let a_node = tree.node(tree.root()).unwrap().specializations()[0];
        assert!(tree.remove_trigger(a));
        assert!(tree.node(a_node).is_none());
        assert_eq!(tree.free, vec![a_node.index()]);
    }

    #[test]
    fn test_remove_unknown_trigger() {
        let mut tree: TriggerTree<i32> = TriggerTree::new();
        assert!(!tree.remove_trigger(TriggerId::new()));
    }

    #[test]
    fn test_slots_are_reused() {
        let mut tree = TriggerTree::new();
        let a = tree.add_trigger("exists(a)", 1, vec![]).unwrap();
        assert!(tree.remove_trigger(a));
        assert_eq!(tree.node_count(), 1);
        tree.add_trigger("exists(b)", 2, vec![]).unwrap();
        assert_eq!(tree.node_count(), 2);
        assert_eq!(tree.nodes.len(), 2);
    }

    #[test]
    fn test_optimizer_applies_to_new_triggers() {
        let mut tree = TriggerTree::new();
        tree.add_optimizer(|clause: &mut Clause| {
            clause.predicates_mut().retain(|p| !p.refers_to("noise"));
        });
        tree.add_trigger("exists(a) && exists(noise)", 1, vec![]).unwrap();
        let memory = serde_json::json!({"a": 1});
        assert_eq!(actions(&tree, &memory), vec![1]);
    }

    #[test]
    fn test_verify_on_mutation_does_not_panic() {
        let config = TriggerTreeConfig {
            verify_on_mutation: true,
            ..TriggerTreeConfig::default()
        };
        let mut tree = TriggerTree::with_config(config, ComparerRegistry::default()).unwrap();
        let id = tree.add_trigger("x < 3 && exists(y)", 1, vec![]).unwrap();
        tree.add_trigger("x < 5", 2, vec![]).unwrap();
        assert!(tree.remove_trigger(id));
        assert_eq!(tree.verify_tree(), None);
    }
}
