//! Evaluation of expressions against a [`Memory`].

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use regex::Regex;

use super::{Expression, Operator};
use crate::error::EvaluationError;
use crate::memory::Memory;
use crate::value::Value;

const REGEX_CACHE_MAX: usize = 1024;

static REGEX_CACHE: OnceLock<RwLock<HashMap<String, Regex>>> = OnceLock::new();

/// Compiles `pattern`, reusing earlier compilations.
///
/// A poisoned cache is bypassed rather than reported.
fn cached_regex(pattern: &str) -> Result<Regex, EvaluationError> {
    let cache = REGEX_CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    if let Ok(guard) = cache.read() {
        if let Some(re) = guard.get(pattern) {
            return Ok(re.clone());
        }
    }

    let compiled = Regex::new(pattern).map_err(|e| EvaluationError::InvalidRegex {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;

    if let Ok(mut guard) = cache.write() {
        if guard.len() >= REGEX_CACHE_MAX {
            guard.clear();
        }
        guard
            .entry(pattern.to_string())
            .or_insert_with(|| compiled.clone());
    }
    Ok(compiled)
}

impl Expression {
    /// Evaluates the expression.
    ///
    /// A missing accessor evaluates to `null`. `&&`, `||` and `!` treat a
    /// failing operand as false rather than failing themselves, so errors only
    /// surface from the predicate that produced them.
    ///
    /// # Errors
    ///
    /// Returns an [`EvaluationError`] for type mismatches in comparisons and
    /// arithmetic, non-string `isMatch` input, and division by zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use trigger_tree::{Expression, Value};
    ///
    /// let memory = serde_json::json!({"woof": 3});
    /// let expr = Expression::parse("woof + 1 == 4").unwrap();
    /// assert_eq!(expr.try_evaluate(&memory), Ok(Value::Bool(true)));
    /// ```
    pub fn try_evaluate(&self, memory: &dyn Memory) -> Result<Value, EvaluationError> {
        match self {
            Self::Constant(value) => Ok(value.clone()),
            Self::Accessor(path) => Ok(memory.get(path).unwrap_or(Value::Null)),
            Self::Call { op, args } => evaluate_call(*op, args, memory),
        }
    }

    /// Evaluates and applies truthiness.
    ///
    /// # Errors
    ///
    /// Propagates any [`EvaluationError`] from [`Expression::try_evaluate`].
    pub fn try_evaluate_bool(&self, memory: &dyn Memory) -> Result<bool, EvaluationError> {
        self.try_evaluate(memory).map(|value| value.is_truthy())
    }

    /// True only if the expression evaluates without error to a truthy value.
    #[must_use]
    pub fn holds(&self, memory: &dyn Memory) -> bool {
        self.try_evaluate_bool(memory).unwrap_or(false)
    }
}

fn evaluate_call(op: Operator, args: &[Expression], memory: &dyn Memory) -> Result<Value, EvaluationError> {
    match op {
        Operator::And => Ok(Value::Bool(args.iter().all(|arg| arg.holds(memory)))),
        Operator::Or => Ok(Value::Bool(args.iter().any(|arg| arg.holds(memory)))),
        Operator::Not => Ok(Value::Bool(!args.iter().all(|arg| arg.holds(memory)))),
        // Optional only shapes clause generation; on its own it always holds.
        Operator::Optional => Ok(Value::Bool(true)),
        Operator::Ignore => match args {
            [arg] => arg.try_evaluate(memory),
            _ => Ok(Value::Bool(true)),
        },
        Operator::Exists => Ok(Value::Bool(
            args.iter()
                .all(|arg| arg.try_evaluate(memory).is_ok_and(|v| !v.is_null())),
        )),
        _ => {
            let values = args
                .iter()
                .map(|arg| arg.try_evaluate(memory))
                .collect::<Result<Vec<_>, _>>()?;
            apply(op, &values)
        }
    }
}

fn apply(op: Operator, values: &[Value]) -> Result<Value, EvaluationError> {
    match (op, values) {
        (Operator::Equal, [a, b]) => Ok(Value::Bool(a.loose_eq(b))),
        (Operator::NotEqual, [a, b]) => Ok(Value::Bool(!a.loose_eq(b))),
        (
            Operator::LessThan | Operator::LessThanOrEqual | Operator::GreaterThan | Operator::GreaterThanOrEqual,
            [a, b],
        ) => {
            let ordering = a.compare(b).ok_or(EvaluationError::TypeMismatch {
                operator: op.as_str(),
                left: a.type_name(),
                right: b.type_name(),
            })?;
            Ok(Value::Bool(match op {
                Operator::LessThan => ordering == Ordering::Less,
                Operator::LessThanOrEqual => ordering != Ordering::Greater,
                Operator::GreaterThan => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        (Operator::Add, [Value::String(a), b]) => Ok(Value::String(format!("{a}{}", plain(b)))),
        (Operator::Add, [a, Value::String(b)]) => Ok(Value::String(format!("{}{b}", plain(a)))),
        (Operator::Add | Operator::Subtract | Operator::Multiply | Operator::Divide | Operator::Modulo, [a, b]) => {
            arithmetic(op, a, b)
        }
        (Operator::Negate, [Value::Int(v)]) => Ok(Value::Int(v.wrapping_neg())),
        (Operator::Negate, [Value::Float(v)]) => Ok(Value::Float(-v)),
        (Operator::Negate, [other]) => Err(EvaluationError::InvalidOperand {
            operator: op.as_str(),
            type_name: other.type_name(),
        }),
        (Operator::IsMatch, [input, pattern]) => is_match(input, pattern),
        (Operator::Contains, [collection, item]) => Ok(Value::Bool(contains(collection, item))),
        _ => Err(EvaluationError::InvalidOperand {
            operator: op.as_str(),
            type_name: "argument list",
        }),
    }
}

/// String form used for concatenation, without quotes.
fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn arithmetic(op: Operator, a: &Value, b: &Value) -> Result<Value, EvaluationError> {
    if let (Value::Int(x), Value::Int(y)) = (a, b) {
        let result = match op {
            Operator::Add => x.checked_add(*y),
            Operator::Subtract => x.checked_sub(*y),
            Operator::Multiply => x.checked_mul(*y),
            Operator::Divide | Operator::Modulo if *y == 0 => return Err(EvaluationError::DivideByZero),
            Operator::Divide => x.checked_div(*y),
            _ => x.checked_rem(*y),
        };
        if let Some(result) = result {
            return Ok(Value::Int(result));
        }
    }
    let (Some(x), Some(y)) = (a.as_float(), b.as_float()) else {
        let bad = if a.is_number() { b } else { a };
        return Err(EvaluationError::InvalidOperand {
            operator: op.as_str(),
            type_name: bad.type_name(),
        });
    };
    let result = match op {
        Operator::Add => x + y,
        Operator::Subtract => x - y,
        Operator::Multiply => x * y,
        _ if y == 0.0 => return Err(EvaluationError::DivideByZero),
        Operator::Divide => x / y,
        _ => x % y,
    };
    Ok(Value::Float(result))
}

fn is_match(input: &Value, pattern: &Value) -> Result<Value, EvaluationError> {
    let Value::String(pattern) = pattern else {
        return Err(EvaluationError::InvalidOperand {
            operator: Operator::IsMatch.as_str(),
            type_name: pattern.type_name(),
        });
    };
    let text = match input {
        Value::String(s) => s,
        Value::Null => return Ok(Value::Bool(false)),
        other => {
            return Err(EvaluationError::InvalidOperand {
                operator: Operator::IsMatch.as_str(),
                type_name: other.type_name(),
            })
        }
    };
    let regex = cached_regex(pattern)?;
    Ok(Value::Bool(regex.is_match(text)))
}

fn contains(collection: &Value, item: &Value) -> bool {
    match (collection, item) {
        (Value::String(s), Value::String(sub)) => s.contains(sub.as_str()),
        (Value::List(items), item) => items.iter().any(|x| x.loose_eq(item)),
        (Value::Object(map), Value::String(key)) => map.contains_key(key),
        _ => false,
    }
}
