//! In-process evaluation of criteria against attribute maps.

use super::node::Criteria;
use super::predicate::{Direction, Operand, Operator, OrderTerm, Predicate};
use super::{CriteriaError, CriteriaResult};
use regex::Regex;
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Compiled predicate tree for one criteria node.
///
/// Relations are not evaluated; callers that cannot join reject them first.
#[derive(Debug)]
pub struct CriteriaMatcher {
    predicates: Vec<CompiledPredicate>,
    or_group: Vec<CriteriaMatcher>,
}

#[derive(Debug)]
struct CompiledPredicate {
    predicate: Predicate,
    like: Option<Regex>,
}

impl CriteriaMatcher {
    pub fn new(criteria: &Criteria) -> CriteriaResult<Self> {
        let predicates = criteria
            .predicates()
            .iter()
            .map(CompiledPredicate::new)
            .collect::<CriteriaResult<Vec<_>>>()?;
        let or_group = criteria
            .or_group()
            .iter()
            .map(CriteriaMatcher::new)
            .collect::<CriteriaResult<Vec<_>>>()?;
        Ok(Self {
            predicates,
            or_group,
        })
    }

    /// All predicates hold, and at least one OR sibling holds when the group is non-empty.
    pub fn matches(&self, attributes: &Map<String, Value>) -> bool {
        self.predicates
            .iter()
            .all(|compiled| compiled.matches(attributes))
            && (self.or_group.is_empty()
                || self.or_group.iter().any(|sibling| sibling.matches(attributes)))
    }
}

impl CompiledPredicate {
    fn new(predicate: &Predicate) -> CriteriaResult<Self> {
        let like = match (&predicate.operator, &predicate.operand) {
            (Operator::Like, Operand::Value(pattern)) => Some(like_regex(pattern)?),
            _ => None,
        };
        Ok(Self {
            predicate: predicate.clone(),
            like,
        })
    }

    fn matches(&self, attributes: &Map<String, Value>) -> bool {
        let Some(actual) = attributes.get(&self.predicate.attribute) else {
            return false;
        };

        match (&self.predicate.operator, &self.predicate.operand) {
            (Operator::IsNull, _) => actual.is_null(),
            (Operator::IsNotNull, _) => !actual.is_null(),
            (Operator::EqualTo, Operand::Value(expected)) => values_equal(actual, expected),
            (Operator::NotEqualTo, Operand::Value(expected)) => {
                !actual.is_null() && !values_equal(actual, expected)
            }
            (Operator::LessThan, Operand::Value(expected)) => {
                compare_values(actual, expected) == Some(Ordering::Less)
            }
            (Operator::GreaterThan, Operand::Value(expected)) => {
                compare_values(actual, expected) == Some(Ordering::Greater)
            }
            (Operator::LessThanOrEqualTo, Operand::Value(expected)) => matches!(
                compare_values(actual, expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
            (Operator::GreaterThanOrEqualTo, Operand::Value(expected)) => matches!(
                compare_values(actual, expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            (Operator::Like, _) => match (&self.like, text_of(actual)) {
                (Some(regex), Some(text)) => regex.is_match(&text),
                _ => false,
            },
            (Operator::In, Operand::Values(candidates)) => candidates
                .iter()
                .any(|candidate| values_equal(actual, candidate)),
            (Operator::Between, Operand::Range(min, max)) => {
                matches!(
                    compare_values(actual, min),
                    Some(Ordering::Greater | Ordering::Equal)
                ) && matches!(
                    compare_values(actual, max),
                    Some(Ordering::Less | Ordering::Equal)
                )
            }
            _ => false,
        }
    }
}

/// Orders scalar JSON values the way SQLite compares them.
///
/// Numbers compare numerically (numeric strings are coerced), strings
/// lexically, booleans as 0/1. `None` when either side is null or the
/// kinds are incomparable.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        _ => {
            let l = numeric(left)?;
            let r = numeric(right)?;
            l.partial_cmp(&r)
        }
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    left == right || compare_values(left, right) == Some(Ordering::Equal)
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// `%` matches any run, `_` one character; ASCII case-insensitive like SQLite.
fn like_regex(pattern: &Value) -> CriteriaResult<Regex> {
    let pattern = text_of(pattern)
        .ok_or_else(|| CriteriaError::invalid("like pattern must not be null"))?;
    let mut source = String::from("(?is)^");
    for ch in pattern.chars() {
        match ch {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');
    Regex::new(&source)
        .map_err(|err| CriteriaError::invalid(format!("invalid like pattern `{pattern}`: {err}")))
}

/// Stable sort by order terms; nulls first on ascending terms.
pub fn order_records<T, F>(records: &mut [T], terms: &[OrderTerm], attributes: F)
where
    F: Fn(&T) -> &Map<String, Value>,
{
    if terms.is_empty() {
        return;
    }
    records.sort_by(|left, right| {
        let left = attributes(left);
        let right = attributes(right);
        for term in terms {
            let l = left.get(&term.attribute).unwrap_or(&Value::Null);
            let r = right.get(&term.attribute).unwrap_or(&Value::Null);
            let ordering = match (l.is_null(), r.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                (false, false) => compare_values(l, r).unwrap_or(Ordering::Equal),
            };
            let ordering = match term.effective_direction() {
                Direction::Asc => ordering,
                Direction::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}
