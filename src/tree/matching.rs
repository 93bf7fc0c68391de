//! Matching a memory against the tree.

use std::collections::{BTreeMap, HashMap};

use super::{NodeId, TriggerTree};
use crate::clause::Clause;
use crate::memory::Memory;
use crate::relationship::RelationshipType;
use crate::trigger::{Trigger, TriggerId};

/// A trigger that matched, with the clauses that matched it.
#[derive(Debug)]
pub struct TriggerMatch<'a, A> {
    trigger: &'a Trigger<A>,
    clauses: Vec<&'a Clause>,
}

impl<'a, A> TriggerMatch<'a, A> {
    /// Id of the matched trigger.
    pub fn id(&self) -> TriggerId {
        self.trigger.id()
    }

    /// The matched trigger.
    pub fn trigger(&self) -> &'a Trigger<A> {
        self.trigger
    }

    /// Action of the matched trigger.
    pub fn action(&self) -> &'a A {
        self.trigger.action()
    }

    /// Matched clauses, in the order they were found.
    pub fn clauses(&self) -> &[&'a Clause] {
        &self.clauses
    }

    /// Any-quantifier bindings of every matched clause.
    #[must_use]
    pub fn bindings(&self) -> BTreeMap<&'a str, &'a str> {
        self.clauses
            .iter()
            .flat_map(|clause| clause.any_bindings())
            .map(|(variable, binding)| (variable.as_str(), binding.as_str()))
            .collect()
    }
}

impl<A> TriggerTree<A> {
    /// Most specific triggers that hold in `memory`.
    ///
    /// One record per trigger, ordered by a depth-first walk with children in
    /// insertion order. Predicates that fail to evaluate count as false.
    #[must_use]
    pub fn matches(&self, memory: &dyn Memory) -> Vec<TriggerMatch<'_, A>> {
        let mut found = Vec::new();
        let mut matched = HashMap::new();
        self.match_node(self.root, memory, &mut found, &mut matched);
        found
    }

    fn match_node<'a>(
        &'a self,
        current: NodeId,
        memory: &dyn Memory,
        found: &mut Vec<TriggerMatch<'a, A>>,
        matched: &mut HashMap<NodeId, bool>,
    ) -> bool {
        if let Some(result) = matched.get(&current) {
            return *result;
        }

        let node = &self.nodes[current.0];
        let mut any = false;
        for child in &node.specializations {
            if self.match_node(*child, memory, found, matched) {
                any = true;
            }
        }

        // A node only reports its own triggers when nothing more specific did.
        if !any && node.clause.evaluate(memory) {
            for (trigger, clause) in self.node_hits(current, memory) {
                any = true;
                record(found, trigger, clause);
            }
        }

        matched.insert(current, any);
        any
    }
}

impl<A> TriggerTree<A> {
    /// Triggers at `current` whose clause matches and that no other matching
    /// trigger there specializes.
    ///
    /// The most specific triggers are tried first. Only when one of them is
    /// rejected by its ignored predicate are the more general ones consulted.
    fn node_hits<'a>(&'a self, current: NodeId, memory: &dyn Memory) -> Vec<(&'a Trigger<A>, &'a Clause)> {
        let node = &self.nodes[current.0];
        let hit = |id: &TriggerId| {
            let trigger = self.triggers.get(id)?;
            trigger
                .matching_clause(&node.clause, memory)
                .map(|clause| (trigger, clause))
        };

        let hits: Vec<_> = node.triggers.iter().filter_map(hit).collect();
        if hits.len() == node.triggers.len() {
            return hits;
        }

        let hits: Vec<_> = node.all_triggers.iter().filter_map(hit).collect();
        hits.iter()
            .filter(|(trigger, _)| {
                !hits.iter().any(|(other, _)| {
                    other.id() != trigger.id()
                        && other.relationship(trigger, &self.comparers) == RelationshipType::Specializes
                })
            })
            .copied()
            .collect()
    }
}

fn record<'a, A>(found: &mut Vec<TriggerMatch<'a, A>>, trigger: &'a Trigger<A>, clause: &'a Clause) {
    match found.iter_mut().find(|m| m.id() == trigger.id()) {
        Some(existing) => {
            if !existing.clauses.iter().any(|c| std::ptr::eq(*c, clause)) {
                existing.clauses.push(clause);
            }
        }
        None => found.push(TriggerMatch {
            trigger,
            clauses: vec![clause],
        }),
    }
}
