//! # trigger-tree
//!
//! An index of boolean trigger expressions that, given a memory, returns the
//! most specific triggers that hold.
//!
//! Trigger expressions are normalized into clauses (conjunctions of
//! predicates) and every clause is placed in a graph ordered by generality,
//! so a match walks from the always-true root towards more specific clauses
//! and reports only triggers that nothing more specific overrides.
//!
//! ## Core Concepts
//!
//! - **Expression**: the predicate language (`exists(a) && b.c > 3`)
//! - **Clause**: one conjunction of a trigger's disjunctive normal form
//! - **RelationshipType**: how two predicates, clauses or triggers compare
//! - **ComparerRegistry**: per-operator rules for relating two predicates
//! - **TriggerTree**: the index itself
//!
//! ## Usage
//!
//! ```rust
//! use trigger_tree::{Quantifier, TriggerTree};
//!
//! let mut tree = TriggerTree::new();
//! tree.add_trigger("exists(woof) || exists(blah)", 1, vec![])?;
//! tree.add_trigger("exists(blah)", 2, vec![])?;
//! tree.add_trigger("exists(blah) && exists(foo)", 3, vec![])?;
//! tree.add_trigger("exists(x.name)", 4, vec![Quantifier::any("x", ["user", "bot"])])?;
//!
//! let memory = serde_json::json!({"blah": 1, "woof": 3});
//! let actions: Vec<i32> = tree.matches(&memory).iter().map(|m| *m.action()).collect();
//! assert_eq!(actions, vec![1, 2]);
//! # Ok::<(), trigger_tree::TriggerTreeError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Expression language
pub mod error;
pub mod expression;
pub mod memory;
pub mod value;

// Clause algebra
pub mod clause;
pub mod comparer;
pub mod optimizer;
pub mod relationship;

// Index
pub mod config;
pub mod tree;
pub mod trigger;

pub use clause::Clause;
pub use comparer::{ComparerRegistry, NumericRangeComparer, PredicateComparer};
pub use config::{TriggerTreeConfig, MAX_EXPANSION_LIMIT};
pub use error::{EvaluationError, ExpressionError, TriggerTreeError, TriggerTreeResult, ValidationError};
pub use expression::{Expression, Operator};
pub use memory::Memory;
pub use optimizer::ClauseOptimizer;
pub use relationship::RelationshipType;
pub use tree::{NodeId, NodeView, TriggerMatch, TriggerTree};
pub use trigger::{Quantifier, QuantifierKind, Trigger, TriggerId};
pub use value::Value;
