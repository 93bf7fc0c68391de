//! Clause optimizers.
//!
//! Optimizers rewrite a trigger's clauses after normalization and before
//! quantifier expansion, for example to drop predicates a host knows are
//! always true.

use crate::clause::Clause;

/// Rewrites a clause in place.
pub trait ClauseOptimizer: Send + Sync {
    fn optimize(&self, clause: &mut Clause);
}

impl<F> ClauseOptimizer for F
where
    F: Fn(&mut Clause) + Send + Sync,
{
    fn optimize(&self, clause: &mut Clause) {
        self(clause);
    }
}
