//! Condition evaluation.
//!
//! A condition compares the value at a payload path with a literal. The
//! evaluator is total: malformed or missing data makes a condition false,
//! never an error. Anything worth telling the workflow author about is
//! returned as a [`ConditionWarning`].

use crate::event::lookup_path;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::borrow::Cow;
use std::fmt;
use std::sync::OnceLock;
use tracing::warn;

/// Comparison operators. Unknown operator names fail to deserialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    #[serde(alias = "startswith")]
    StartsWith,
    #[serde(alias = "endswith")]
    EndsWith,
    /// Every element of a list is a string ending with the literal.
    AllEndWith,
    /// Regular expression search.
    #[serde(alias = "regex")]
    Matches,
    GreaterThan,
    LessThan,
    IsSet,
    IsUnset,
}

impl Operator {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::AllEndWith => "all_end_with",
            Self::Matches => "matches",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::IsSet => "is_set",
            Self::IsUnset => "is_unset",
        }
    }

    /// Whether the operator compares against a literal.
    #[must_use]
    pub fn takes_value(self) -> bool {
        !matches!(self, Self::IsSet | Self::IsUnset)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One comparison against an event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    /// Dot-separated payload path.
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: JsonValue,
    /// `matches` pattern compiled on first use.
    #[serde(skip)]
    compiled: OnceLock<Regex>,
}

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        self.field == other.field && self.operator == other.operator && self.value == other.value
    }
}

impl Condition {
    #[must_use]
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<JsonValue>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
            compiled: OnceLock::new(),
        }
    }

    /// Condition on field presence (`is_set` / `is_unset`).
    #[must_use]
    pub fn presence(field: impl Into<String>, operator: Operator) -> Self {
        Self::new(field, operator, JsonValue::Null)
    }

    /// Static checks done when a workflow is saved.
    pub fn check(&self) -> Result<(), String> {
        if self.field.trim().is_empty() {
            return Err("condition field path is empty".to_string());
        }
        match self.operator {
            Operator::Matches => {
                let pattern = self
                    .value
                    .as_str()
                    .ok_or_else(|| "matches requires a string pattern".to_string())?;
                Regex::new(pattern).map_err(|e| format!("invalid pattern '{pattern}': {e}"))?;
            }
            Operator::StartsWith | Operator::EndsWith | Operator::AllEndWith => {
                if !self.value.is_string() {
                    return Err(format!("{} requires a string value", self.operator));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// The compiled `pattern`, reused across evaluations while the value
    /// still holds the pattern it was compiled from.
    fn pattern(&self, pattern: &str) -> Result<Cow<'_, Regex>, regex::Error> {
        if let Some(regex) = self.compiled.get() {
            if regex.as_str() == pattern {
                return Ok(Cow::Borrowed(regex));
            }
            return Regex::new(pattern).map(Cow::Owned);
        }
        let regex = Regex::new(pattern)?;
        Ok(Cow::Borrowed(self.compiled.get_or_init(|| regex)))
    }

    /// Evaluate and log any warning.
    #[must_use]
    pub fn evaluate(&self, payload: &JsonValue) -> bool {
        let evaluation = evaluate(self, payload);
        if let Some(warning) = &evaluation.warning {
            warn!(field = %self.field, operator = %self.operator, warning = %warning, "Condition evaluated to false");
        }
        evaluation.matched
    }
}

/// Non-fatal problems found while evaluating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConditionWarning {
    /// A numeric comparison got a value that is not a number.
    NotNumeric { field: String, value: String },
    /// The `matches` pattern does not compile.
    InvalidPattern { pattern: String, reason: String },
    /// The payload value has a type the operator cannot handle.
    TypeMismatch {
        field: String,
        operator: Operator,
        found: &'static str,
    },
}

impl fmt::Display for ConditionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotNumeric { field, value } => {
                write!(f, "field '{field}': value {value} is not numeric")
            }
            Self::InvalidPattern { pattern, reason } => {
                write!(f, "invalid pattern '{pattern}': {reason}")
            }
            Self::TypeMismatch {
                field,
                operator,
                found,
            } => write!(f, "field '{field}': {operator} cannot compare a {found}"),
        }
    }
}

/// Result of evaluating one condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub matched: bool,
    pub warning: Option<ConditionWarning>,
}

impl Evaluation {
    fn from_bool(matched: bool) -> Self {
        Self {
            matched,
            warning: None,
        }
    }

    fn rejected(warning: ConditionWarning) -> Self {
        Self {
            matched: false,
            warning: Some(warning),
        }
    }
}

/// Evaluate `condition` against `payload`.
///
/// An absent field makes every operator false except `is_unset`.
#[must_use]
pub fn evaluate(condition: &Condition, payload: &JsonValue) -> Evaluation {
    let actual = lookup_path(payload, &condition.field);
    let literal = &condition.value;

    let Some(actual) = actual else {
        return Evaluation::from_bool(condition.operator == Operator::IsUnset);
    };

    let mismatch = || {
        Evaluation::rejected(ConditionWarning::TypeMismatch {
            field: condition.field.clone(),
            operator: condition.operator,
            found: type_name(actual),
        })
    };

    match condition.operator {
        Operator::IsSet => Evaluation::from_bool(true),
        Operator::IsUnset => Evaluation::from_bool(false),
        Operator::Equals => Evaluation::from_bool(loosely_equal(actual, literal)),
        Operator::NotEquals => Evaluation::from_bool(!loosely_equal(actual, literal)),
        Operator::Contains | Operator::NotContains => match contains(actual, literal) {
            Some(found) => {
                Evaluation::from_bool(found == (condition.operator == Operator::Contains))
            }
            None => mismatch(),
        },
        Operator::StartsWith | Operator::EndsWith => {
            let (Some(text), Some(affix)) = (actual.as_str(), literal.as_str()) else {
                return mismatch();
            };
            Evaluation::from_bool(if condition.operator == Operator::StartsWith {
                text.starts_with(affix)
            } else {
                text.ends_with(affix)
            })
        }
        Operator::AllEndWith => {
            let (Some(items), Some(suffix)) = (actual.as_array(), literal.as_str()) else {
                return mismatch();
            };
            Evaluation::from_bool(
                !items.is_empty()
                    && items
                        .iter()
                        .all(|item| item.as_str().is_some_and(|s| s.ends_with(suffix))),
            )
        }
        Operator::Matches => {
            let Some(pattern) = literal.as_str() else {
                return Evaluation::rejected(ConditionWarning::InvalidPattern {
                    pattern: literal.to_string(),
                    reason: "pattern is not a string".to_string(),
                });
            };
            let regex = match condition.pattern(pattern) {
                Ok(regex) => regex,
                Err(e) => {
                    return Evaluation::rejected(ConditionWarning::InvalidPattern {
                        pattern: pattern.to_string(),
                        reason: e.to_string(),
                    });
                }
            };
            match actual.as_str() {
                Some(text) => Evaluation::from_bool(regex.is_match(text)),
                None => mismatch(),
            }
        }
        Operator::GreaterThan | Operator::LessThan => {
            let Some(lhs) = as_number(actual) else {
                return Evaluation::rejected(ConditionWarning::NotNumeric {
                    field: condition.field.clone(),
                    value: actual.to_string(),
                });
            };
            let Some(rhs) = as_number(literal) else {
                return Evaluation::rejected(ConditionWarning::NotNumeric {
                    field: condition.field.clone(),
                    value: literal.to_string(),
                });
            };
            Evaluation::from_bool(if condition.operator == Operator::GreaterThan {
                lhs > rhs
            } else {
                lhs < rhs
            })
        }
    }
}

/// Equality that tolerates string literals for scalar payload values, so a
/// literal `"42"` equals a payload number `42`.
fn loosely_equal(actual: &JsonValue, literal: &JsonValue) -> bool {
    match (actual, literal) {
        (JsonValue::Number(a), JsonValue::Number(b)) => a.as_f64() == b.as_f64(),
        (JsonValue::String(a), JsonValue::Number(_) | JsonValue::Bool(_)) => {
            *a == literal.to_string()
        }
        (JsonValue::Number(_) | JsonValue::Bool(_), JsonValue::String(b)) => {
            actual.to_string() == *b
        }
        _ => actual == literal,
    }
}

/// `None` when the payload value cannot contain anything.
fn contains(actual: &JsonValue, literal: &JsonValue) -> Option<bool> {
    match actual {
        JsonValue::String(text) => literal.as_str().map(|needle| text.contains(needle)),
        JsonValue::Array(items) => Some(items.iter().any(|item| loosely_equal(item, literal))),
        JsonValue::Object(map) => literal.as_str().map(|key| map.contains_key(key)),
        _ => None,
    }
}

fn as_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "list",
        JsonValue::Object(_) => "object",
    }
}
