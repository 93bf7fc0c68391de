//! Arena nodes and read-only views over them.

use std::fmt;

use crate::clause::Clause;
use crate::trigger::TriggerId;

/// Handle to a node in a [`crate::TriggerTree`].
///
/// Handles index the tree's node arena; a handle is only meaningful for the
/// tree that produced it, and slots are reused once their node is detached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(super) usize);

impl NodeId {
    /// Position in the node arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A clause shared by one or more triggers, and the more specific nodes
/// below it.
#[derive(Debug, Clone, Default)]
pub(super) struct Node {
    pub(super) clause: Clause,
    /// Every trigger placed here.
    pub(super) all_triggers: Vec<TriggerId>,
    /// Most specific triggers, the ones reported on a match.
    pub(super) triggers: Vec<TriggerId>,
    pub(super) specializations: Vec<NodeId>,
}

impl Node {
    pub(super) fn new(clause: Clause) -> Self {
        Self {
            clause,
            ..Self::default()
        }
    }

    pub(super) fn with_trigger(clause: Clause, trigger: TriggerId) -> Self {
        Self {
            clause,
            all_triggers: vec![trigger],
            triggers: vec![trigger],
            specializations: Vec::new(),
        }
    }
}

/// Read-only view of a live node.
#[derive(Debug, Clone)]
pub struct NodeView<'a> {
    id: NodeId,
    node: &'a Node,
    generalizations: Vec<NodeId>,
}

impl<'a> NodeView<'a> {
    pub(super) fn new(id: NodeId, node: &'a Node, generalizations: Vec<NodeId>) -> Self {
        Self {
            id,
            node,
            generalizations,
        }
    }

    /// Arena id of the node.
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// The clause every trigger at this node shares, without ignored
    /// predicates.
    pub fn clause(&self) -> &'a Clause {
        &self.node.clause
    }

    /// Triggers reported when this node matches.
    pub fn triggers(&self) -> &'a [TriggerId] {
        &self.node.triggers
    }

    /// All triggers placed at this node, including less specific ones.
    pub fn all_triggers(&self) -> &'a [TriggerId] {
        &self.node.all_triggers
    }

    /// Direct children, each more specific than this node.
    pub fn specializations(&self) -> &'a [NodeId] {
        &self.node.specializations
    }

    /// Direct parents.
    pub fn generalizations(&self) -> &[NodeId] {
        &self.generalizations
    }
}
