//! Expression algebra for trigger conditions.
//!
//! An [`Expression`] is an immutable tree of constants, accessor paths and
//! operator calls. Triggers are written as text, parsed into this form,
//! normalized with [`Expression::push_down_not`] and then split into clauses.

mod eval;
mod parser;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ExpressionError;
use crate::value::Value;

/// Operators that can appear in a call node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Logical conjunction, `&&`.
    And,
    /// Logical disjunction, `||`.
    Or,
    /// Logical negation, `!`.
    Not,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
    /// `+`
    Add,
    /// Binary `-`.
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%`
    Modulo,
    /// Unary `-`.
    Negate,
    /// `exists(path)`: the path resolves in memory.
    Exists,
    /// `isMatch(value, pattern)`: regex match.
    IsMatch,
    /// `contains(haystack, needle)`
    Contains,
    /// Marks a predicate that is checked but does not shape the tree.
    Ignore,
    /// Expands into clauses with and without the wrapped predicate.
    Optional,
}

impl Operator {
    /// Stable textual name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::And => "&&",
            Self::Or => "||",
            Self::Not => "!",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulo => "%",
            Self::Negate => "-",
            Self::Exists => "exists",
            Self::IsMatch => "isMatch",
            Self::Contains => "contains",
            Self::Ignore => "ignore",
            Self::Optional => "optional",
        }
    }

    /// Returns true for `==`, `!=`, `<`, `<=`, `>` and `>=`.
    #[must_use]
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Equal
                | Self::NotEqual
                | Self::LessThan
                | Self::LessThanOrEqual
                | Self::GreaterThan
                | Self::GreaterThanOrEqual
        )
    }

    /// The comparison that holds exactly when this one does not.
    #[must_use]
    pub const fn negated(self) -> Option<Self> {
        match self {
            Self::LessThan => Some(Self::GreaterThanOrEqual),
            Self::LessThanOrEqual => Some(Self::GreaterThan),
            Self::GreaterThan => Some(Self::LessThanOrEqual),
            Self::GreaterThanOrEqual => Some(Self::LessThan),
            Self::Equal => Some(Self::NotEqual),
            Self::NotEqual => Some(Self::Equal),
            _ => None,
        }
    }

    /// The comparison with its operands swapped, so `a < b` becomes `b > a`.
    #[must_use]
    pub const fn mirrored(self) -> Option<Self> {
        match self {
            Self::LessThan => Some(Self::GreaterThan),
            Self::LessThanOrEqual => Some(Self::GreaterThanOrEqual),
            Self::GreaterThan => Some(Self::LessThan),
            Self::GreaterThanOrEqual => Some(Self::LessThanOrEqual),
            Self::Equal => Some(Self::Equal),
            Self::NotEqual => Some(Self::NotEqual),
            _ => None,
        }
    }

    /// Markers whose negation is pushed through to their argument.
    #[must_use]
    pub const fn is_marker(self) -> bool {
        matches!(self, Self::Ignore | Self::Optional)
    }

    const fn is_infix(self) -> bool {
        !matches!(
            self,
            Self::Not | Self::Negate | Self::Exists | Self::IsMatch | Self::Contains | Self::Ignore | Self::Optional
        )
    }

    const fn precedence(self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And => 2,
            Self::Equal | Self::NotEqual => 3,
            Self::LessThan | Self::LessThanOrEqual | Self::GreaterThan | Self::GreaterThanOrEqual => 4,
            Self::Add | Self::Subtract => 5,
            Self::Multiply | Self::Divide | Self::Modulo => 6,
            _ => 7,
        }
    }

    /// Looks up a function-call name.
    pub(crate) fn from_function(name: &str) -> Option<Self> {
        match name {
            "exists" => Some(Self::Exists),
            "isMatch" => Some(Self::IsMatch),
            "contains" => Some(Self::Contains),
            "ignore" => Some(Self::Ignore),
            "optional" => Some(Self::Optional),
            "and" => Some(Self::And),
            "or" => Some(Self::Or),
            "not" => Some(Self::Not),
            _ => None,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node of the expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    /// A literal value.
    Constant(Value),
    /// A memory path such as `turn.entities.city[0]`.
    Accessor(String),
    /// An operator applied to ordered arguments.
    Call {
        op: Operator,
        args: Vec<Expression>,
    },
}

impl Expression {
    /// Parses trigger text.
    ///
    /// # Errors
    ///
    /// Returns an [`ExpressionError`] when the text violates the grammar,
    /// names an unknown function, calls one with the wrong number of
    /// arguments, or gives `isMatch` a pattern that does not compile.
    ///
    /// # Examples
    ///
    /// ```
    /// use trigger_tree::Expression;
    ///
    /// let expr = Expression::parse("exists(blah) && woof == 3").unwrap();
    /// assert_eq!(expr.to_string(), "exists(blah) && woof == 3");
    /// ```
    pub fn parse(text: &str) -> Result<Self, ExpressionError> {
        parser::parse(text)
    }

    /// A literal.
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::Constant(value.into())
    }

    /// A memory path such as `user.name` or `items[0]`.
    pub fn accessor(path: impl Into<String>) -> Self {
        Self::Accessor(path.into())
    }

    /// An operator applied to arguments.
    #[must_use]
    pub fn call(op: Operator, args: Vec<Self>) -> Self {
        Self::Call { op, args }
    }

    /// Conjunction of `args`.
    #[must_use]
    pub fn and(args: Vec<Self>) -> Self {
        Self::call(Operator::And, args)
    }

    /// Disjunction of `args`.
    #[must_use]
    pub fn or(args: Vec<Self>) -> Self {
        Self::call(Operator::Or, args)
    }

    /// Negation of `arg`.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(arg: Self) -> Self {
        Self::call(Operator::Not, vec![arg])
    }

    /// Operator of a call node.
    #[must_use]
    pub const fn operator(&self) -> Option<Operator> {
        match self {
            Self::Call { op, .. } => Some(*op),
            _ => None,
        }
    }

    /// Arguments of a call node, empty for leaves.
    #[must_use]
    pub fn args(&self) -> &[Self] {
        match self {
            Self::Call { args, .. } => args,
            _ => &[],
        }
    }

    /// Returns the boolean if this is a boolean constant.
    #[must_use]
    pub const fn as_bool_constant(&self) -> Option<bool> {
        match self {
            Self::Constant(Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Returns true if both nodes have the same shape tag.
    #[must_use]
    pub fn same_kind(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Constant(_), Self::Constant(_)) | (Self::Accessor(_), Self::Accessor(_)) => true,
            (Self::Call { op: a, .. }, Self::Call { op: b, .. }) => a == b,
            _ => false,
        }
    }

    /// Structural equality.
    ///
    /// Arguments of `&&` and `||` are compared without regard to order;
    /// everything else is compared positionally.
    #[must_use]
    pub fn deep_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Constant(a), Self::Constant(b)) => a.loose_eq(b),
            (Self::Accessor(a), Self::Accessor(b)) => a == b,
            (Self::Call { op: a, args: xs }, Self::Call { op: b, args: ys }) => {
                if a != b || xs.len() != ys.len() {
                    return false;
                }
                if matches!(a, Operator::And | Operator::Or) {
                    xs.iter().all(|x| ys.iter().any(|y| x.deep_equals(y)))
                        && ys.iter().all(|y| xs.iter().any(|x| x.deep_equals(y)))
                } else {
                    xs.iter().zip(ys).all(|(x, y)| x.deep_equals(y))
                }
            }
            _ => false,
        }
    }

    /// Rewrites the expression so that `!` only appears directly above
    /// predicates.
    ///
    /// `&&`/`||` follow De Morgan, comparisons flip to their complement,
    /// double negation cancels and the `ignore`/`optional` markers pass the
    /// negation to their argument.
    #[must_use]
    pub fn push_down_not(&self) -> Self {
        self.push_down(false)
    }

    fn push_down(&self, in_not: bool) -> Self {
        match self {
            Self::Call { op, args } => match op {
                Operator::And | Operator::Or => {
                    let op = match (op, in_not) {
                        (Operator::And, true) => Operator::Or,
                        (Operator::Or, true) => Operator::And,
                        (op, _) => *op,
                    };
                    Self::call(op, args.iter().map(|a| a.push_down(in_not)).collect())
                }
                Operator::Not if args.len() == 1 => args[0].push_down(!in_not),
                op if op.is_marker() => {
                    Self::call(*op, args.iter().map(|a| a.push_down(in_not)).collect())
                }
                op if in_not => match op.negated() {
                    Some(negated) => Self::call(negated, args.clone()),
                    None => Self::not(self.clone()),
                },
                _ => self.clone(),
            },
            Self::Constant(Value::Bool(b)) if in_not => Self::Constant(Value::Bool(!b)),
            _ if in_not => Self::not(self.clone()),
            _ => self.clone(),
        }
    }

    /// Replaces the accessor `variable` (and paths below it) with `binding`.
    ///
    /// Returns the rewritten expression and whether anything changed.
    #[must_use]
    pub fn substitute(&self, variable: &str, binding: &str) -> (Self, bool) {
        match self {
            Self::Accessor(path) => match path.strip_prefix(variable) {
                Some(rest) if rest.is_empty() || rest.starts_with('.') || rest.starts_with('[') => {
                    (Self::Accessor(format!("{binding}{rest}")), true)
                }
                _ => (self.clone(), false),
            },
            Self::Call { op, args } => {
                let mut changed = false;
                let args = args
                    .iter()
                    .map(|arg| {
                        let (arg, arg_changed) = arg.substitute(variable, binding);
                        changed |= arg_changed;
                        arg
                    })
                    .collect();
                if changed {
                    (Self::call(*op, args), true)
                } else {
                    (self.clone(), false)
                }
            }
            Self::Constant(_) => (self.clone(), false),
        }
    }

    /// Returns true if some accessor reads `variable` or a path below it.
    #[must_use]
    pub fn refers_to(&self, variable: &str) -> bool {
        self.references().iter().any(|path| {
            path.strip_prefix(variable)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('.') || rest.starts_with('['))
        })
    }

    /// Static memory paths this expression reads, in first-seen order.
    #[must_use]
    pub fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Accessor(path) => {
                if !out.contains(&path.as_str()) {
                    out.push(path);
                }
            }
            Self::Call { args, .. } => {
                for arg in args {
                    arg.collect_references(out);
                }
            }
            Self::Constant(_) => {}
        }
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, parent: Operator) -> fmt::Result {
        match self {
            Self::Call { op, args } if op.is_infix() && args.len() >= 2 && op.precedence() <= parent.precedence() => {
                write!(f, "({self})")
            }
            _ => write!(f, "{self}"),
        }
    }
}

impl From<Value> for Expression {
    fn from(value: Value) -> Self {
        Self::Constant(value)
    }
}

fn fmt_constant(value: &Value, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value {
        Value::String(s) => {
            f.write_str("'")?;
            for ch in s.chars() {
                match ch {
                    '\'' => f.write_str("\\'")?,
                    '\\' => f.write_str("\\\\")?,
                    '\n' => f.write_str("\\n")?,
                    '\t' => f.write_str("\\t")?,
                    ch => write!(f, "{ch}")?,
                }
            }
            f.write_str("'")
        }
        other => write!(f, "{other}"),
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(value) => fmt_constant(value, f),
            Self::Accessor(path) => f.write_str(path),
            Self::Call { op, args } => match op {
                Operator::Not | Operator::Negate if args.len() == 1 => {
                    f.write_str(op.as_str())?;
                    match &args[0] {
                        Self::Call { op: inner, args: inner_args }
                            if inner.is_infix() && inner_args.len() >= 2 =>
                        {
                            write!(f, "({})", args[0])
                        }
                        arg => write!(f, "{arg}"),
                    }
                }
                op if op.is_infix() && args.len() >= 2 => {
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, " {} ", op.as_str())?;
                        }
                        arg.fmt_operand(f, *op)?;
                    }
                    Ok(())
                }
                op => {
                    let name = match op {
                        Operator::And => "and",
                        Operator::Or => "or",
                        Operator::Not => "not",
                        other => other.as_str(),
                    };
                    write!(f, "{name}(")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    f.write_str(")")
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Expression {
        Expression::parse(text).unwrap()
    }

    #[test]
    fn test_deep_equals_and_is_order_independent() {
        assert!(parse("a && b").deep_equals(&parse("b && a")));
        assert!(parse("a || b || c").deep_equals(&parse("c || a || b")));
    }

    #[test]
    fn test_deep_equals_comparison_is_positional() {
        assert!(!parse("a < b").deep_equals(&parse("b < a")));
        assert!(parse("a < 3").deep_equals(&parse("a < 3.0")));
    }

    #[test]
    fn test_deep_equals_different_arity() {
        assert!(!parse("a && b").deep_equals(&parse("a && b && c")));
        assert!(!parse("a && a").deep_equals(&parse("a && b")));
    }

    #[test]
    fn test_push_down_not_de_morgan() {
        let expr = parse("!(a < 3 && exists(b))").push_down_not();
        assert!(expr.deep_equals(&parse("a >= 3 || !exists(b)")));
    }

    #[test]
    fn test_push_down_not_double_negation() {
        let expr = parse("!!(x == 1)").push_down_not();
        assert!(expr.deep_equals(&parse("x == 1")));
    }

    #[test]
    fn test_push_down_not_through_markers() {
        let expr = parse("!optional(x > 2)").push_down_not();
        assert!(expr.deep_equals(&parse("optional(x <= 2)")));
        let expr = parse("ignore(!exists(foo))").push_down_not();
        assert!(expr.deep_equals(&parse("ignore(!exists(foo))")));
    }

    #[test]
    fn test_push_down_not_constants() {
        assert_eq!(parse("!true").push_down_not(), Expression::constant(false));
        assert_eq!(parse("!(a != 'x')").push_down_not(), parse("a == 'x'"));
    }

    #[test]
    fn test_substitute_exact_and_nested() {
        let (expr, changed) = parse("x.name == 'a' && y > 1").substitute("x", "user");
        assert!(changed);
        assert!(expr.deep_equals(&parse("user.name == 'a' && y > 1")));

        let (expr, changed) = parse("xx > 1").substitute("x", "user");
        assert!(!changed);
        assert_eq!(expr, parse("xx > 1"));
    }

    #[test]
    fn test_references() {
        let expr = parse("exists(a.b) && a.b > c[0] || isMatch(d, 'x+')");
        assert_eq!(expr.references(), vec!["a.b", "c[0]", "d"]);
        assert!(expr.refers_to("a"));
        assert!(expr.refers_to("c"));
        assert!(!expr.refers_to("e"));
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for text in [
            "exists(blah) && woof == 3",
            "(a || b) && c",
            "!(a && b)",
            "isMatch(name, '^a\\'b$')",
            "x + 2 * y >= 10",
            "optional(a > 1.5) && ignore(!exists(foo))",
        ] {
            let expr = parse(text);
            let reparsed = parse(&expr.to_string());
            assert!(expr.deep_equals(&reparsed), "{text} -> {expr}");
        }
    }

    #[test]
    fn test_operator_tables() {
        assert_eq!(Operator::LessThan.negated(), Some(Operator::GreaterThanOrEqual));
        assert_eq!(Operator::LessThan.mirrored(), Some(Operator::GreaterThan));
        assert_eq!(Operator::Exists.negated(), None);
        assert!(Operator::Equal.is_comparison());
        assert!(!Operator::And.is_comparison());
        assert!(Operator::Ignore.is_marker());
    }

    #[test]
    fn test_expression_serialization() {
        let expr = parse("exists(a) && b < 3");
        let json = serde_json::to_string(&expr).unwrap();
        let back: Expression = serde_json::from_str(&json).unwrap();
        assert_eq!(expr, back);
    }
}
