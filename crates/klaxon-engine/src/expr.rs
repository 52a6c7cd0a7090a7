//! Condition predicate evaluation over a value snapshot.
//!
//! Two forms are supported. The simple form compares one device value
//! against an integer threshold with one of the six comparators. The
//! compound form is a whitespace-tokenised expression whose atoms are
//! three-token comparisons joined uniformly by `AND` or by `OR`; an atom's
//! right-hand side may reference another device in the same snapshot.

use std::collections::HashMap;
use std::str::FromStr;

use serde_json::Value;
use tracing::warn;

use crate::rule::AlertCondition;

/// Comparison operator for the simple form and for compound atoms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl FromStr for CompareOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            "==" => Ok(Self::Eq),
            "!=" => Ok(Self::Ne),
            _ => Err(format!("unknown compare operator: {s}")),
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lt => write!(f, "<"),
            Self::Le => write!(f, "<="),
            Self::Gt => write!(f, ">"),
            Self::Ge => write!(f, ">="),
            Self::Eq => write!(f, "=="),
            Self::Ne => write!(f, "!="),
        }
    }
}

impl CompareOp {
    /// IEEE-754 comparison, including strict equality. Callers are expected
    /// to use rounded integer thresholds where exactness matters.
    #[allow(clippy::float_cmp)]
    fn check(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Lt => value < threshold,
            Self::Le => value <= threshold,
            Self::Gt => value > threshold,
            Self::Ge => value >= threshold,
            Self::Eq => value == threshold,
            Self::Ne => value != threshold,
        }
    }
}

/// A snapshot value that could not be coerced to a float.
#[derive(Debug, Clone, thiserror::Error)]
#[error("value for device '{device}' is not numeric: {value}")]
pub struct ConversionError {
    pub device: String,
    pub value: Value,
}

/// Coerces every snapshot value to `f64`.
///
/// JSON numbers convert directly; strings must parse as decimal numbers.
/// Any other type fails the whole snapshot and the caller skips this
/// evaluation tick.
pub fn coerce_snapshot(
    raw: &HashMap<String, Value>,
) -> Result<HashMap<String, f64>, ConversionError> {
    let mut values = HashMap::with_capacity(raw.len());
    for (device, value) in raw {
        let number = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse::<f64>().ok(),
            _ => None,
        };
        match number {
            Some(f) => {
                values.insert(device.clone(), f);
            }
            None => {
                return Err(ConversionError {
                    device: device.clone(),
                    value: value.clone(),
                })
            }
        }
    }
    Ok(values)
}

/// Evaluates a condition's predicate against coerced snapshot values.
pub fn evaluate(condition: &AlertCondition, values: &HashMap<String, f64>) -> bool {
    let operator = condition.operator.as_str();
    if operator.contains("AND") || operator.contains("OR") {
        evaluate_compound(operator, values)
    } else {
        evaluate_simple(condition, values)
    }
}

fn evaluate_simple(condition: &AlertCondition, values: &HashMap<String, f64>) -> bool {
    let Some(&value) = values.get(&condition.device) else {
        return false;
    };
    match condition.operator.parse::<CompareOp>() {
        Ok(op) => op.check(value, condition.threshold as f64),
        Err(_) => {
            warn!(operator = %condition.operator, "unsupported operator");
            false
        }
    }
}

/// Compound form: atoms joined uniformly by `AND` or by `OR`, with
/// short-circuit combination. Mixed separators are not supported; `AND`
/// wins when both tokens appear.
fn evaluate_compound(expression: &str, values: &HashMap<String, f64>) -> bool {
    if expression.contains("AND") {
        expression
            .split("AND")
            .all(|atom| evaluate_atom(atom.trim(), values))
    } else {
        expression
            .split("OR")
            .any(|atom| evaluate_atom(atom.trim(), values))
    }
}

/// A single `device op literal-or-deviceref` atom. Anything malformed or
/// unresolvable contributes `false`.
fn evaluate_atom(atom: &str, values: &HashMap<String, f64>) -> bool {
    let parts: Vec<&str> = atom.split_whitespace().collect();
    if parts.len() != 3 {
        warn!(atom, "malformed condition atom");
        return false;
    }

    let Some(&value) = values.get(parts[0]) else {
        warn!(device = parts[0], atom, "device not present in snapshot");
        return false;
    };

    let threshold = match parts[2].parse::<f64>() {
        Ok(literal) => literal,
        Err(_) => match values.get(parts[2]) {
            Some(&referenced) => referenced,
            None => {
                warn!(atom, "threshold is neither a number nor a known device");
                return false;
            }
        },
    };

    match parts[1].parse::<CompareOp>() {
        Ok(op) => op.check(value, threshold),
        Err(_) => {
            warn!(operator = parts[1], atom, "unsupported operator in atom");
            false
        }
    }
}
