//! Error types for the trigger tree.
//!
//! All errors are strongly typed using thiserror.
//! This enables pattern matching on specific error conditions
//! and provides clear error messages.

use thiserror::Error;

/// Errors raised while parsing trigger expression text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    /// A character that starts no token.
    #[error("Unexpected character '{ch}' at position {position}")]
    UnexpectedCharacter {
        ch: char,
        position: usize,
    },

    /// A token where the grammar expects something else.
    #[error("Unexpected token '{token}' at position {position}")]
    UnexpectedToken {
        token: String,
        position: usize,
    },

    /// Input ended mid-expression.
    #[error("Unexpected end of expression")]
    UnexpectedEnd,

    /// A `(` without its `)` or the reverse.
    #[error("Unbalanced parenthesis at position {position}")]
    UnbalancedParenthesis {
        position: usize,
    },

    /// A string literal without its closing quote.
    #[error("Unterminated string starting at position {position}")]
    UnterminatedString {
        position: usize,
    },

    /// A numeric literal that does not parse.
    #[error("Invalid number '{text}' at position {position}")]
    InvalidNumber {
        text: String,
        position: usize,
    },

    /// A call to a function the language does not define.
    #[error("Unknown function '{name}'")]
    UnknownFunction {
        name: String,
    },

    /// A call with the wrong number of arguments.
    #[error("Function '{name}' expects {expected} argument(s), got {actual}")]
    InvalidArity {
        name: String,
        expected: String,
        actual: usize,
    },

    /// Parentheses or prefix operators nested past the parser's limit.
    #[error("Expression nested deeper than {max} levels at position {position}")]
    NestingTooDeep {
        max: usize,
        position: usize,
    },

    /// An `isMatch` pattern given as anything but a string literal.
    #[error("isMatch pattern must be a string literal")]
    NonLiteralPattern,

    /// A pattern the regex engine rejects.
    #[error("Invalid regex '{pattern}': {reason}")]
    InvalidRegex {
        pattern: String,
        reason: String,
    },
}

/// Errors raised while evaluating an expression against memory.
///
/// During matching these are never surfaced: a predicate that fails to
/// evaluate simply does not match.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    /// Operands of incompatible types.
    #[error("Operator '{operator}' cannot compare {left} with {right}")]
    TypeMismatch {
        operator: &'static str,
        left: &'static str,
        right: &'static str,
    },

    /// An operand type the operator rejects.
    #[error("Operator '{operator}' does not accept a {type_name} operand")]
    InvalidOperand {
        operator: &'static str,
        type_name: &'static str,
    },

    /// `/` or `%` by zero.
    #[error("Division by zero")]
    DivideByZero,

    /// A pattern the regex engine rejects.
    #[error("Invalid regex '{pattern}': {reason}")]
    InvalidRegex {
        pattern: String,
        reason: String,
    },
}

/// Validation errors for configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// `max_expansion` outside its allowed range.
    #[error("max_expansion must be in [1, {max}], got {value}")]
    InvalidMaxExpansion {
        value: usize,
        max: usize,
    },

    /// Configuration JSON that does not deserialize.
    #[error("Malformed configuration: {reason}")]
    MalformedConfig {
        reason: String,
    },
}

/// Top-level error type for trigger tree operations.
#[derive(Debug, Error)]
pub enum TriggerTreeError {
    /// Trigger text did not parse.
    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    /// Invalid configuration.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A trigger expanded into more clauses than allowed.
    #[error("Trigger expands to more than {limit} clauses (attempted {attempted})")]
    ExpansionLimitExceeded {
        limit: usize,
        attempted: usize,
    },

    /// Writing a rendered graph failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A broken internal invariant.
    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl TriggerTreeError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is an expression parse error.
    #[must_use]
    pub const fn is_expression(&self) -> bool {
        matches!(self, Self::Expression(_))
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if a trigger was rejected for expanding past the cap.
    #[must_use]
    pub const fn is_expansion_limit(&self) -> bool {
        matches!(self, Self::ExpansionLimitExceeded { .. })
    }

    /// Returns true if this is an I/O error.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

/// Result type alias for trigger tree operations.
pub type TriggerTreeResult<T> = Result<T, TriggerTreeError>;
