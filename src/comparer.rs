//! Predicate comparers.
//!
//! A comparer decides how two atomic predicates sharing an operator relate.
//! Without a comparer two predicates are either deep-equal or incomparable.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::expression::{Expression, Operator};
use crate::relationship::RelationshipType;
use crate::value::Value;

/// Compares two predicates that share the operator the comparer is
/// registered under.
pub trait PredicateComparer: Send + Sync + fmt::Debug {
    /// Operator this comparer handles.
    fn operator(&self) -> Operator;

    /// Relationship of `predicate` to `other`.
    fn relationship(&self, predicate: &Expression, other: &Expression) -> RelationshipType;
}

/// Comparers keyed by operator.
///
/// Built once and shared read-only by the tree.
#[derive(Debug, Clone)]
pub struct ComparerRegistry {
    comparers: HashMap<Operator, Arc<dyn PredicateComparer>>,
}

impl ComparerRegistry {
    /// A registry with no comparers; only deep equality relates predicates.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            comparers: HashMap::new(),
        }
    }

    /// Registers a comparer, replacing any previous one for its operator.
    pub fn register(&mut self, comparer: Arc<dyn PredicateComparer>) {
        self.comparers.insert(comparer.operator(), comparer);
    }

    /// Builder form of [`ComparerRegistry::register`].
    #[must_use]
    pub fn with(mut self, comparer: Arc<dyn PredicateComparer>) -> Self {
        self.register(comparer);
        self
    }

    /// Comparer registered for `op`.
    #[must_use]
    pub fn get(&self, op: Operator) -> Option<&Arc<dyn PredicateComparer>> {
        self.comparers.get(&op)
    }

    /// Number of registered operators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.comparers.len()
    }

    /// True when no comparer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.comparers.is_empty()
    }

    /// Relationship between two predicates.
    ///
    /// When both are negations the comparer for the inner operator is used
    /// and its answer swapped, since `!a` is narrower exactly when `a` is
    /// wider.
    #[must_use]
    pub fn relationship(&self, predicate: &Expression, other: &Expression) -> RelationshipType {
        let (root, root_other, negated) = match (predicate, other) {
            (
                Expression::Call { op: Operator::Not, args: a },
                Expression::Call { op: Operator::Not, args: b },
            ) if a.len() == 1 && b.len() == 1 => (&a[0], &b[0], true),
            _ => (predicate, other, false),
        };

        let comparer = match (root.operator(), root_other.operator()) {
            (Some(a), Some(b)) if a == b => self.get(a),
            _ => None,
        };

        match comparer {
            Some(comparer) => comparer.relationship(root, root_other).swap_if(negated),
            None if predicate.deep_equals(other) => RelationshipType::Equal,
            None => RelationshipType::Incomparable,
        }
    }
}

impl Default for ComparerRegistry {
    /// Numeric-range comparers for the six comparison operators.
    fn default() -> Self {
        [
            Operator::LessThan,
            Operator::LessThanOrEqual,
            Operator::GreaterThan,
            Operator::GreaterThanOrEqual,
            Operator::Equal,
            Operator::NotEqual,
        ]
        .into_iter()
        .fold(Self::empty(), |registry, op| {
            registry.with(Arc::new(NumericRangeComparer::new(op)))
        })
    }
}

/// Set of numbers a comparison against a constant admits.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Range {
    Below { bound: f64, inclusive: bool },
    Above { bound: f64, inclusive: bool },
    Point(f64),
    Except(f64),
}

impl Range {
    fn from_comparison(op: Operator, bound: f64) -> Option<Self> {
        Some(match op {
            Operator::LessThan => Self::Below { bound, inclusive: false },
            Operator::LessThanOrEqual => Self::Below { bound, inclusive: true },
            Operator::GreaterThan => Self::Above { bound, inclusive: false },
            Operator::GreaterThanOrEqual => Self::Above { bound, inclusive: true },
            Operator::Equal => Self::Point(bound),
            Operator::NotEqual => Self::Except(bound),
            _ => return None,
        })
    }

    fn contains(self, x: f64) -> bool {
        match self {
            Self::Below { bound, inclusive } => x < bound || (inclusive && x == bound),
            Self::Above { bound, inclusive } => x > bound || (inclusive && x == bound),
            Self::Point(p) => x == p,
            Self::Except(p) => x != p,
        }
    }

    fn is_subset_of(self, other: Self) -> bool {
        match (self, other) {
            (Self::Point(p), other) => other.contains(p),
            (Self::Below { bound: a, inclusive: ia }, Self::Below { bound: b, inclusive: ib })
            | (Self::Above { bound: a, inclusive: ia }, Self::Above { bound: b, inclusive: ib }) => {
                let inner = if matches!(self, Self::Below { .. }) { a < b } else { a > b };
                inner || (a == b && (!ia || ib))
            }
            (Self::Below { .. } | Self::Above { .. }, Self::Except(q)) => !self.contains(q),
            (Self::Except(p), Self::Except(q)) => p == q,
            _ => false,
        }
    }
}

/// Interval containment for `<`, `<=`, `>`, `>=`, `==` and `!=` between one
/// accessor path and a numeric constant.
///
/// Predicates over different paths, or with non-numeric constants, are only
/// related when deep-equal.
#[derive(Debug, Clone, Copy)]
pub struct NumericRangeComparer {
    op: Operator,
}

impl NumericRangeComparer {
    /// A comparer for one comparison operator.
    #[must_use]
    pub const fn new(op: Operator) -> Self {
        Self { op }
    }

    /// Normalizes `path op constant` and `constant op path`.
    fn range(predicate: &Expression) -> Option<(&str, Range)> {
        let Expression::Call { op, args } = predicate else {
            return None;
        };
        match args.as_slice() {
            [Expression::Accessor(path), Expression::Constant(value)] => {
                Some((path, Range::from_comparison(*op, number(value)?)?))
            }
            [Expression::Constant(value), Expression::Accessor(path)] => {
                Some((path, Range::from_comparison(op.mirrored()?, number(value)?)?))
            }
            _ => None,
        }
    }
}

fn number(value: &Value) -> Option<f64> {
    value.as_float().filter(|x| x.is_finite())
}

impl PredicateComparer for NumericRangeComparer {
    fn operator(&self) -> Operator {
        self.op
    }

    fn relationship(&self, predicate: &Expression, other: &Expression) -> RelationshipType {
        match (Self::range(predicate), Self::range(other)) {
            (Some((path, a)), Some((other_path, b))) if path == other_path => {
                match (a.is_subset_of(b), b.is_subset_of(a)) {
                    (true, true) => RelationshipType::Equal,
                    (true, false) => RelationshipType::Specializes,
                    (false, true) => RelationshipType::Generalizes,
                    (false, false) => RelationshipType::Incomparable,
                }
            }
            _ if predicate.deep_equals(other) => RelationshipType::Equal,
            _ => RelationshipType::Incomparable,
        }
    }
}
