//! Triggers: a rule expression plus the action to take when it matches.
//!
//! Construction turns the expression into clauses:
//! `!` is pushed down, the result is expanded into a disjunction of
//! conjunctions (`optional` adds a variant without its argument), predicates
//! implied by a more specific one are dropped, clause optimizers run, quantifiers are expanded,
//! clauses subsumed by a more general clause of the same trigger are marked,
//! and finally `ignore(...)` predicates are split out.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::clause::Clause;
use crate::comparer::ComparerRegistry;
use crate::error::{TriggerTreeError, TriggerTreeResult};
use crate::expression::{Expression, Operator};
use crate::memory::Memory;
use crate::optimizer::ClauseOptimizer;
use crate::relationship::RelationshipType;

/// Unique handle for a trigger added to a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerId(uuid::Uuid);

impl TriggerId {
    /// Creates a new random trigger ID.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for TriggerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a quantifier combines its bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantifierKind {
    /// Every binding must satisfy the predicate.
    All,
    /// At least one binding must satisfy the predicate.
    Any,
}

/// Expands a variable in a trigger into concrete memory paths.
///
/// # Examples
///
/// ```
/// use trigger_tree::{Quantifier, QuantifierKind};
///
/// let q = Quantifier::any("x", ["a", "b"]);
/// assert_eq!(q.kind(), QuantifierKind::Any);
/// assert_eq!(q.bindings(), ["a", "b"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantifier {
    variable: String,
    kind: QuantifierKind,
    bindings: Vec<String>,
}

impl Quantifier {
    /// A quantifier over `variable` with the given bindings.
    pub fn new<I, S>(variable: impl Into<String>, kind: QuantifierKind, bindings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            variable: variable.into(),
            kind,
            bindings: bindings.into_iter().map(Into::into).collect(),
        }
    }

    /// Every binding must hold.
    pub fn all<I, S>(variable: impl Into<String>, bindings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(variable, QuantifierKind::All, bindings)
    }

    /// Some binding must hold.
    pub fn any<I, S>(variable: impl Into<String>, bindings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(variable, QuantifierKind::Any, bindings)
    }

    /// Name the bindings replace.
    #[must_use]
    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// How the bindings combine.
    #[must_use]
    pub const fn kind(&self) -> QuantifierKind {
        self.kind
    }

    /// Paths substituted for the variable.
    #[must_use]
    pub fn bindings(&self) -> &[String] {
        &self.bindings
    }
}

/// Inputs shared by every trigger built for one tree.
pub(crate) struct ExpansionContext<'a> {
    pub comparers: &'a ComparerRegistry,
    pub optimizers: &'a [Box<dyn ClauseOptimizer>],
    pub max_expansion: usize,
}

impl ExpansionContext<'_> {
    fn check(&self, attempted: usize) -> TriggerTreeResult<()> {
        if attempted > self.max_expansion {
            return Err(TriggerTreeError::ExpansionLimitExceeded {
                limit: self.max_expansion,
                attempted,
            });
        }
        Ok(())
    }
}

/// A trigger expression, its clauses, and its action.
#[derive(Debug, Clone)]
pub struct Trigger<A> {
    id: TriggerId,
    expression: Expression,
    action: A,
    quantifiers: Vec<Quantifier>,
    clauses: Vec<Clause>,
}

impl<A> Trigger<A> {
    pub(crate) fn new(
        expression: Expression,
        action: A,
        quantifiers: Vec<Quantifier>,
        ctx: &ExpansionContext<'_>,
    ) -> TriggerTreeResult<Self> {
        let normal_form = expression.push_down_not();
        let mut clauses = generate_clauses(&normal_form, ctx)?;
        for clause in &mut clauses {
            clause.dedup_predicates(ctx.comparers);
            for optimizer in ctx.optimizers {
                optimizer.optimize(clause);
            }
        }
        for quantifier in &quantifiers {
            clauses = expand_quantifier(quantifier, clauses, ctx)?;
        }
        for clause in &mut clauses {
            clause.dedup_predicates(ctx.comparers);
        }
        mark_subsumed(&mut clauses, ctx.comparers);
        for clause in &mut clauses {
            clause.split_ignores();
        }
        trace!(expression = %expression, clauses = clauses.len(), "expanded trigger");

        Ok(Self {
            id: TriggerId::new(),
            expression,
            action,
            quantifiers,
            clauses,
        })
    }

    /// Handle used to remove the trigger.
    #[must_use]
    pub const fn id(&self) -> TriggerId {
        self.id
    }

    /// The expression as written, before normalization.
    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    /// Payload returned with every match.
    pub fn action(&self) -> &A {
        &self.action
    }

    /// Quantifiers the trigger was expanded with.
    pub fn quantifiers(&self) -> &[Quantifier] {
        &self.quantifiers
    }

    /// Disjunctive normal form: the trigger holds when any clause holds.
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Relationship of this trigger to `other`, over non-subsumed clauses.
    ///
    /// A trigger specializes another when each of its clauses equals or
    /// specializes some clause of the other.
    #[must_use]
    pub fn relationship(&self, other: &Self, comparers: &ComparerRegistry) -> RelationshipType {
        let first = one_way(self, other, comparers);
        let second = one_way(other, self, comparers);
        match (first, second) {
            (RelationshipType::Equal, RelationshipType::Equal) => RelationshipType::Equal,
            (RelationshipType::Equal | RelationshipType::Specializes, _) => RelationshipType::Specializes,
            (_, RelationshipType::Equal | RelationshipType::Specializes) => RelationshipType::Generalizes,
            _ => RelationshipType::Incomparable,
        }
    }

    /// First non-subsumed clause of this trigger that matches `node_clause`.
    #[must_use]
    pub fn matching_clause(&self, node_clause: &Clause, memory: &dyn Memory) -> Option<&Clause> {
        self.clauses
            .iter()
            .find(|clause| !clause.is_subsumed() && clause.matches(node_clause, memory))
    }

    /// Whether some clause of this trigger matches `node_clause`.
    #[must_use]
    pub fn matches(&self, node_clause: &Clause, memory: &dyn Memory) -> bool {
        self.matching_clause(node_clause, memory).is_some()
    }
}

impl<A> fmt::Display for Trigger<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.clauses.is_empty() {
            return f.write_str("<Empty>");
        }
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                f.write_str("\n|| ")?;
            }
            write!(f, "{clause}")?;
        }
        Ok(())
    }
}

/// Equal when every clause of `trigger` has an equal clause in `other`,
/// Specializes when at least one only specializes one.
fn one_way<A>(trigger: &Trigger<A>, other: &Trigger<A>, comparers: &ComparerRegistry) -> RelationshipType {
    let mut so_far = RelationshipType::Incomparable;
    for clause in trigger.clauses.iter().filter(|c| !c.is_subsumed()) {
        let found = other
            .clauses
            .iter()
            .filter(|c| !c.is_subsumed())
            .map(|second| clause.relationship(second, comparers))
            .find(|rel| matches!(rel, RelationshipType::Equal | RelationshipType::Specializes));
        match found {
            None => return RelationshipType::Incomparable,
            Some(RelationshipType::Equal) if so_far == RelationshipType::Incomparable => {
                so_far = RelationshipType::Equal;
            }
            Some(RelationshipType::Specializes) => so_far = RelationshipType::Specializes,
            Some(_) => {}
        }
    }
    so_far
}

fn generate_clauses(expression: &Expression, ctx: &ExpansionContext<'_>) -> TriggerTreeResult<Vec<Clause>> {
    match expression {
        Expression::Call { op: Operator::And, args } => {
            let mut so_far: Option<Vec<Clause>> = None;
            for child in args {
                let clauses = generate_clauses(child, ctx)?;
                if clauses.is_empty() {
                    // false anywhere in a conjunction
                    return Ok(Vec::new());
                }
                so_far = Some(match so_far {
                    None => clauses,
                    Some(previous) => {
                        ctx.check(previous.len().saturating_mul(clauses.len()))?;
                        let mut combined = Vec::with_capacity(previous.len() * clauses.len());
                        for old in &previous {
                            for clause in &clauses {
                                let mut predicates = old.predicates().to_vec();
                                predicates.extend_from_slice(clause.predicates());
                                combined.push(Clause::new(predicates));
                            }
                        }
                        combined
                    }
                });
            }
            Ok(so_far.unwrap_or_else(|| vec![Clause::default()]))
        }
        Expression::Call { op: Operator::Or, args } => {
            let mut clauses = Vec::new();
            for child in args {
                clauses.extend(generate_clauses(child, ctx)?);
                ctx.check(clauses.len())?;
            }
            Ok(clauses)
        }
        Expression::Call { op: Operator::Optional, args } if args.len() == 1 => {
            let mut clauses = vec![Clause::default()];
            clauses.extend(generate_clauses(&args[0], ctx)?);
            ctx.check(clauses.len())?;
            Ok(clauses)
        }
        other => match other.as_bool_constant() {
            Some(true) => Ok(vec![Clause::default()]),
            Some(false) => Ok(Vec::new()),
            None => Ok(vec![Clause::new(vec![other.clone()])]),
        },
    }
}

fn expand_quantifier(
    quantifier: &Quantifier,
    clauses: Vec<Clause>,
    ctx: &ExpansionContext<'_>,
) -> TriggerTreeResult<Vec<Clause>> {
    let variable = quantifier.variable();
    let mut expanded = Vec::with_capacity(clauses.len());
    for clause in clauses {
        match quantifier.kind() {
            QuantifierKind::All => expanded.push(expand_all(quantifier, &clause)),
            QuantifierKind::Any if quantifier.bindings().is_empty() => {
                // An empty existential is false for any clause that needs it.
                if !clause.predicates().iter().any(|p| p.refers_to(variable)) {
                    expanded.push(clause);
                }
            }
            QuantifierKind::Any => {
                if clause.predicates().iter().any(|p| p.refers_to(variable)) {
                    for binding in quantifier.bindings() {
                        let mut bound = clause.clone();
                        *bound.predicates_mut() = clause
                            .predicates()
                            .iter()
                            .map(|p| p.substitute(variable, binding).0)
                            .collect();
                        bound.bind(variable, binding.as_str());
                        expanded.push(bound);
                    }
                } else {
                    expanded.push(clause);
                }
            }
        }
        ctx.check(expanded.len())?;
    }
    Ok(expanded)
}

fn expand_all(quantifier: &Quantifier, clause: &Clause) -> Clause {
    let variable = quantifier.variable();
    let mut out = clause.clone();
    let mut predicates = Vec::with_capacity(clause.len());
    for predicate in clause.predicates() {
        if !predicate.refers_to(variable) {
            predicates.push(predicate.clone());
            continue;
        }
        // An empty universal is trivially true, so the predicate disappears.
        for binding in quantifier.bindings() {
            predicates.push(predicate.substitute(variable, binding).0);
        }
    }
    *out.predicates_mut() = predicates;
    out
}

/// Drops clauses equal to an earlier one and flags clauses that specialize
/// another clause of the same trigger.
fn mark_subsumed(clauses: &mut Vec<Clause>, comparers: &ComparerRegistry) {
    let mut i = 0;
    while i < clauses.len() {
        if !clauses[i].is_subsumed() {
            let mut j = i + 1;
            while j < clauses.len() {
                if clauses[j].is_subsumed() {
                    j += 1;
                    continue;
                }
                match clauses[i].relationship(&clauses[j], comparers) {
                    RelationshipType::Equal => {
                        clauses.remove(j);
                    }
                    RelationshipType::Specializes => {
                        clauses[i].set_subsumed(true);
                        break;
                    }
                    RelationshipType::Generalizes => {
                        clauses[j].set_subsumed(true);
                        j += 1;
                    }
                    RelationshipType::Incomparable => j += 1,
                }
            }
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(text: &str, quantifiers: Vec<Quantifier>) -> TriggerTreeResult<Trigger<&'static str>> {
        build_with_limit(text, quantifiers, 256)
    }

    fn build_with_limit(
        text: &str,
        quantifiers: Vec<Quantifier>,
        max_expansion: usize,
    ) -> TriggerTreeResult<Trigger<&'static str>> {
        let comparers = ComparerRegistry::default();
        let ctx = ExpansionContext {
            comparers: &comparers,
            optimizers: &[],
            max_expansion,
        };
        Trigger::new(Expression::parse(text)?, "action", quantifiers, &ctx)
    }

    fn clause_texts(trigger: &Trigger<&'static str>) -> Vec<String> {
        trigger.clauses().iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_disjunction_splits() {
        let trigger = build("exists(woof) || exists(blah)", vec![]).unwrap();
        assert_eq!(clause_texts(&trigger), vec!["(exists(woof))", "(exists(blah))"]);
    }

    #[test]
    fn test_conjunction_cross_product() {
        let trigger = build("(a == 1 || a == 2) && (b == 1 || b == 2)", vec![]).unwrap();
        assert_eq!(trigger.clauses().len(), 4);
        assert_eq!(
            clause_texts(&trigger),
            vec![
                "(a == 1 && b == 1)",
                "(a == 1 && b == 2)",
                "(a == 2 && b == 1)",
                "(a == 2 && b == 2)"
            ]
        );
    }

    #[test]
    fn test_constants() {
        assert_eq!(build("true", vec![]).unwrap().clauses().len(), 1);
        assert!(build("true", vec![]).unwrap().clauses()[0].is_empty());
        assert!(build("false", vec![]).unwrap().clauses().is_empty());
        assert!(build("exists(blah) && false", vec![]).unwrap().clauses().is_empty());
        assert_eq!(clause_texts(&build("exists(blah) && true", vec![]).unwrap()), vec!["(exists(blah))"]);
    }

    #[test]
    fn test_optional_expands() {
        let trigger = build("exists(a) && optional(exists(b))", vec![]).unwrap();
        // (a) generalizes (a && b), so the longer clause is subsumed
        assert_eq!(clause_texts(&trigger), vec!["(exists(a))", "*(exists(a) && exists(b))"]);
    }

    #[test]
    fn test_negated_optional() {
        let trigger = build("exists(a) && !optional(x < 3)", vec![]).unwrap();
        assert_eq!(clause_texts(&trigger), vec!["(exists(a))", "*(exists(a) && x >= 3)"]);
    }

    #[test]
    fn test_duplicate_predicates_removed() {
        let trigger = build("exists(a) && exists(a) && exists(b)", vec![]).unwrap();
        assert_eq!(trigger.clauses()[0].len(), 2);
    }

    #[test]
    fn test_redundant_ranges_reduced() {
        let trigger = build("x >= 0 && exists(z) && x >= 1", vec![]).unwrap();
        assert_eq!(clause_texts(&trigger), vec!["(exists(z) && x >= 1)"]);
        let trigger = build("x < 3 && x < 5", vec![]).unwrap();
        assert_eq!(clause_texts(&trigger), vec!["(x < 3)"]);
    }

    #[test]
    fn test_equal_clauses_collapse() {
        let trigger = build("(exists(a) && exists(b)) || (exists(b) && exists(a))", vec![]).unwrap();
        assert_eq!(trigger.clauses().len(), 1);
    }

    #[test]
    fn test_subsumed_by_later_clause() {
        let trigger = build("(exists(a) && exists(b)) || exists(a)", vec![]).unwrap();
        assert_eq!(clause_texts(&trigger), vec!["*(exists(a) && exists(b))", "(exists(a))"]);
    }

    #[test]
    fn test_ignores_split_last() {
        let trigger = build("ignore(!exists(foo)) && exists(blah)", vec![]).unwrap();
        assert_eq!(clause_texts(&trigger), vec!["(exists(blah)) ignored(!exists(foo))"]);
    }

    #[test]
    fn test_all_quantifier() {
        let trigger = build("x > 3 && exists(z)", vec![Quantifier::all("x", ["a", "b"])]).unwrap();
        assert_eq!(clause_texts(&trigger), vec!["(a > 3 && b > 3 && exists(z))"]);
    }

    #[test]
    fn test_all_quantifier_empty_bindings() {
        let trigger = build("x > 3 && exists(z)", vec![Quantifier::all("x", Vec::<String>::new())]).unwrap();
        assert_eq!(clause_texts(&trigger), vec!["(exists(z))"]);
    }

    #[test]
    fn test_any_quantifier() {
        let trigger = build("exists(x.name)", vec![Quantifier::any("x", ["a", "b"])]).unwrap();
        assert_eq!(clause_texts(&trigger), vec!["(exists(a.name)) x->a", "(exists(b.name)) x->b"]);
    }

    #[test]
    fn test_any_quantifier_unrelated_clause() {
        let trigger = build("exists(y)", vec![Quantifier::any("x", ["a", "b"])]).unwrap();
        assert_eq!(clause_texts(&trigger), vec!["(exists(y))"]);
    }

    #[test]
    fn test_any_quantifier_empty_bindings() {
        let trigger = build("exists(x) || exists(y)", vec![Quantifier::any("x", Vec::<String>::new())]).unwrap();
        assert_eq!(clause_texts(&trigger), vec!["(exists(y))"]);
    }

    #[test]
    fn test_expansion_limit_in_cross_product() {
        let text = "(a == 1 || a == 2 || a == 3) && (b == 1 || b == 2 || b == 3)";
        let err = build_with_limit(text, vec![], 8).unwrap_err();
        assert!(matches!(
            err,
            TriggerTreeError::ExpansionLimitExceeded { limit: 8, attempted: 9 }
        ));
        assert!(build_with_limit(text, vec![], 9).is_ok());
    }

    #[test]
    fn test_expansion_limit_in_quantifier() {
        let bindings: Vec<String> = (0..10).map(|i| format!("v{i}")).collect();
        let err = build_with_limit("exists(x) || exists(x.y)", vec![Quantifier::any("x", bindings)], 12).unwrap_err();
        assert!(err.is_expansion_limit());
    }

    #[test]
    fn test_relationship_between_triggers() {
        let comparers = ComparerRegistry::default();
        let either = build("exists(woof) || exists(blah)", vec![]).unwrap();
        let blah = build("exists(blah)", vec![]).unwrap();
        let blah_foo = build("exists(blah) && exists(foo)", vec![]).unwrap();

        assert_eq!(blah.relationship(&either, &comparers), RelationshipType::Specializes);
        assert_eq!(either.relationship(&blah, &comparers), RelationshipType::Generalizes);
        assert_eq!(blah_foo.relationship(&blah, &comparers), RelationshipType::Specializes);
        assert_eq!(blah.relationship(&blah, &comparers), RelationshipType::Equal);

        let woof = build("exists(woof)", vec![]).unwrap();
        assert_eq!(woof.relationship(&blah, &comparers), RelationshipType::Incomparable);
    }

    #[test]
    fn test_matching_clause_skips_subsumed() {
        let trigger = build("exists(a) || (exists(a) && exists(b))", vec![]).unwrap();
        let memory = serde_json::json!({"a": 1, "b": 2});
        let subsumed = trigger.clauses()[1].without_ignored();
        let general = trigger.clauses()[0].without_ignored();
        assert!(!trigger.matches(&subsumed, &memory));
        assert!(trigger.matches(&general, &memory));
    }

    #[test]
    fn test_optimizer_runs_before_quantifiers() {
        let comparers = ComparerRegistry::default();
        let strip_b = |clause: &mut Clause| {
            clause
                .predicates_mut()
                .retain(|p| !p.refers_to("b"));
        };
        let optimizers: Vec<Box<dyn ClauseOptimizer>> = vec![Box::new(strip_b)];
        let ctx = ExpansionContext {
            comparers: &comparers,
            optimizers: &optimizers,
            max_expansion: 256,
        };
        let trigger = Trigger::new(
            Expression::parse("exists(x) && exists(b)").unwrap(),
            1,
            vec![Quantifier::all("x", ["p", "q"])],
            &ctx,
        )
        .unwrap();
        assert_eq!(trigger.clauses()[0].to_string(), "(exists(p) && exists(q))");
        assert_eq!(*trigger.action(), 1);
    }

    #[test]
    fn test_display() {
        let trigger = build("exists(a) || exists(b)", vec![]).unwrap();
        assert_eq!(trigger.to_string(), "(exists(a))\n|| (exists(b))");
        assert_eq!(build("false", vec![]).unwrap().to_string(), "<Empty>");
    }
}
