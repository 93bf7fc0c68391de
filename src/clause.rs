//! Clauses: conjunctions of predicates in a trigger's normal form.

use std::collections::BTreeMap;
use std::fmt;

use crate::comparer::ComparerRegistry;
use crate::expression::{Expression, Operator};
use crate::memory::Memory;
use crate::relationship::RelationshipType;

/// A conjunction of predicates.
///
/// Predicates wrapped in `ignore(...)` are split out into [`Clause::ignored`]:
/// they are checked when matching but take no part in placing the clause in
/// the tree. Any-quantifier expansion records which binding produced the
/// clause in [`Clause::any_bindings`].
#[derive(Debug, Clone, Default)]
pub struct Clause {
    predicates: Vec<Expression>,
    ignored: Option<Expression>,
    any_bindings: BTreeMap<String, String>,
    subsumed: bool,
}

impl Clause {
    /// A clause over the given predicates.
    #[must_use]
    pub fn new(predicates: Vec<Expression>) -> Self {
        Self {
            predicates,
            ..Self::default()
        }
    }

    /// Predicates that place the clause in the tree.
    pub fn predicates(&self) -> &[Expression] {
        &self.predicates
    }

    /// Mutable access for clause optimizers.
    pub fn predicates_mut(&mut self) -> &mut Vec<Expression> {
        &mut self.predicates
    }

    /// Conjunction of the `ignore(...)` predicates, if any.
    pub fn ignored(&self) -> Option<&Expression> {
        self.ignored.as_ref()
    }

    /// Variable to path bindings from any-quantifier expansion.
    pub fn any_bindings(&self) -> &BTreeMap<String, String> {
        &self.any_bindings
    }

    pub(crate) fn bind(&mut self, variable: impl Into<String>, binding: impl Into<String>) {
        self.any_bindings.insert(variable.into(), binding.into());
    }

    /// True when another clause of the same trigger is more general.
    pub fn is_subsumed(&self) -> bool {
        self.subsumed
    }

    pub(crate) fn set_subsumed(&mut self, subsumed: bool) {
        self.subsumed = subsumed;
    }

    /// Number of predicates, ignored ones excluded.
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// An empty clause is always true.
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// The same predicates and bindings without the ignored part.
    #[must_use]
    pub fn without_ignored(&self) -> Self {
        Self {
            predicates: self.predicates.clone(),
            ignored: None,
            any_bindings: self.any_bindings.clone(),
            subsumed: false,
        }
    }

    /// The conjunction as a single expression.
    #[must_use]
    pub fn to_expression(&self) -> Expression {
        match self.predicates.as_slice() {
            [] => Expression::constant(true),
            [single] => single.clone(),
            _ => Expression::and(self.predicates.clone()),
        }
    }

    /// Order-independent predicate equality.
    #[must_use]
    pub fn deep_equals(&self, other: &Self) -> bool {
        self.predicates.len() == other.predicates.len()
            && self
                .predicates
                .iter()
                .all(|p| other.predicates.iter().any(|q| p.deep_equals(q)))
            && other
                .predicates
                .iter()
                .all(|q| self.predicates.iter().any(|p| p.deep_equals(q)))
    }

    /// True if every predicate holds; predicates that fail to evaluate do not.
    #[must_use]
    pub fn evaluate(&self, memory: &dyn Memory) -> bool {
        self.predicates.iter().all(|p| p.holds(memory))
    }

    /// Whether this trigger clause matches a tree node's clause.
    ///
    /// The predicates must be deep-equal and the ignored predicate, if any,
    /// must hold in `memory`.
    #[must_use]
    pub fn matches(&self, node_clause: &Self, memory: &dyn Memory) -> bool {
        node_clause.deep_equals(self) && self.ignored.as_ref().map_or(true, |ignored| ignored.holds(memory))
    }

    /// Moves top-level `ignore(x)` predicates into the ignored part.
    pub fn split_ignores(&mut self) {
        let (ignores, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.predicates)
            .into_iter()
            .partition(|p| p.operator() == Some(Operator::Ignore));
        self.predicates = kept;
        let mut ignored: Vec<Expression> = ignores
            .into_iter()
            .filter_map(|p| match p {
                Expression::Call { mut args, .. } if args.len() == 1 => args.pop(),
                _ => None,
            })
            .collect();
        self.ignored = match ignored.len() {
            0 => None,
            1 => ignored.pop(),
            _ => Some(Expression::and(ignored)),
        };
    }

    /// Reduces the conjunction to its most specific predicates.
    ///
    /// A predicate is dropped when another predicate of the clause is equal
    /// to it or specializes it, so `x >= 0 && x >= 1` keeps only `x >= 1`.
    pub(crate) fn dedup_predicates(&mut self, comparers: &ComparerRegistry) {
        let mut kept: Vec<Expression> = Vec::with_capacity(self.predicates.len());
        for predicate in std::mem::take(&mut self.predicates) {
            let covered = kept.iter().any(|k| {
                k.deep_equals(&predicate)
                    || matches!(
                        comparers.relationship(k, &predicate),
                        RelationshipType::Equal | RelationshipType::Specializes
                    )
            });
            if covered {
                continue;
            }
            kept.retain(|k| comparers.relationship(k, &predicate) != RelationshipType::Generalizes);
            kept.push(predicate);
        }
        self.predicates = kept;
    }

    /// Relationship of this clause to `other`.
    ///
    /// This clause generalizes `other` when each of its predicates equals or
    /// generalizes some predicate of `other`, so that `other` implies it.
    /// Both directions are checked. When each implies the other the
    /// any-bindings decide: a clause bound on fewer variables specializes one
    /// whose bindings extend its own.
    #[must_use]
    pub fn relationship(&self, other: &Self, comparers: &ComparerRegistry) -> RelationshipType {
        let generalizes = Self::covers(self, other, comparers);
        let specializes = Self::covers(other, self, comparers);
        match (generalizes, specializes) {
            (true, true) => Self::bindings_relationship(self, other),
            (true, false) => RelationshipType::Generalizes,
            (false, true) => RelationshipType::Specializes,
            (false, false) => RelationshipType::Incomparable,
        }
    }

    /// True when every predicate of `general` equals or generalizes some
    /// predicate of `specific`.
    fn covers(general: &Self, specific: &Self, comparers: &ComparerRegistry) -> bool {
        general.predicates.iter().all(|g| {
            specific.predicates.iter().any(|s| {
                matches!(
                    comparers.relationship(g, s),
                    RelationshipType::Equal | RelationshipType::Generalizes
                )
            })
        })
    }

    fn bindings_relationship(clause: &Self, other: &Self) -> RelationshipType {
        let (fewer, more, swapped) = if clause.any_bindings.len() > other.any_bindings.len() {
            (&other.any_bindings, &clause.any_bindings, true)
        } else {
            (&clause.any_bindings, &other.any_bindings, false)
        };
        let consistent = fewer
            .iter()
            .all(|(variable, binding)| more.get(variable) == Some(binding));
        let rel = if !consistent {
            RelationshipType::Incomparable
        } else if fewer.len() < more.len() {
            RelationshipType::Specializes
        } else {
            RelationshipType::Equal
        };
        rel.swap_if(swapped)
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.subsumed {
            f.write_str("*")?;
        }
        f.write_str("(")?;
        for (i, predicate) in self.predicates.iter().enumerate() {
            if i > 0 {
                f.write_str(" && ")?;
            }
            write!(f, "{predicate}")?;
        }
        f.write_str(")")?;
        if let Some(ignored) = &self.ignored {
            write!(f, " ignored({ignored})")?;
        }
        for (variable, binding) in &self.any_bindings {
            write!(f, " {variable}->{binding}")?;
        }
        Ok(())
    }
}
