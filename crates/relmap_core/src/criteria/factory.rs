//! Filter map -> criteria tree parsing.

use super::named::NamedCriteriaRegistry;
use super::node::Criteria;
use super::predicate::Operator;
use super::{CriteriaError, CriteriaResult, Filter};
use crate::config::EntityMap;
use log::debug;
use serde_json::Value;
use std::sync::Arc;

const RELATIONS_KEY: &str = "relations";
const ORDER_KEY: &str = "order";
const LIMIT_KEY: &str = "limit";
const OFFSET_KEY: &str = "offset";
const PAGE_KEY: &str = "page";

/// Builds criteria trees from declarative filter maps.
///
/// Filter keys are `attribute.operator` (or `attribute_operator`), the
/// reserved `relations` / `order` / `limit` / `offset` / `page`, or a single
/// token naming a registered [`NamedCriterion`](super::NamedCriterion).
#[derive(Debug, Clone)]
pub struct CriteriaFactory {
    entity_map: Arc<EntityMap>,
    named: NamedCriteriaRegistry,
}

impl CriteriaFactory {
    pub fn new(entity_map: Arc<EntityMap>) -> Self {
        Self::with_named_criteria(entity_map, NamedCriteriaRegistry::new())
    }

    pub fn with_named_criteria(entity_map: Arc<EntityMap>, named: NamedCriteriaRegistry) -> Self {
        Self { entity_map, named }
    }

    pub fn entity_map(&self) -> &Arc<EntityMap> {
        &self.entity_map
    }

    pub fn named_criteria(&self) -> &NamedCriteriaRegistry {
        &self.named
    }

    /// Parses `filter` into a new criteria tree rooted at `entity_name`.
    pub fn build(&self, entity_name: &str, filter: &Filter) -> CriteriaResult<Criteria> {
        let mut criteria = Criteria::new(entity_name)?;
        self.apply(&mut criteria, filter)?;
        Ok(criteria)
    }

    /// Same as [`CriteriaFactory::build`] for an untyped JSON value.
    pub fn build_from_value(&self, entity_name: &str, filter: &Value) -> CriteriaResult<Criteria> {
        match filter {
            Value::Object(map) => self.build(entity_name, map),
            Value::Null => self.build(entity_name, &Filter::new()),
            other => Err(CriteriaError::invalid(format!(
                "filter must be a JSON object, got {other}"
            ))),
        }
    }

    /// Applies `filter` to an existing node, appending to what it already holds.
    pub fn apply(&self, criteria: &mut Criteria, filter: &Filter) -> CriteriaResult<()> {
        let entity_name = criteria.entity_name().to_string();
        let aliases = self.entity_map.alias_map(&entity_name).ok();
        let mut relations = None;
        let mut limit = None;
        let mut page = None;

        for (raw_key, value) in filter {
            let key = aliases
                .and_then(|aliases| aliases.get(raw_key))
                .map(String::as_str)
                .unwrap_or(raw_key.as_str());

            match key {
                RELATIONS_KEY => relations = Some(value),
                LIMIT_KEY => {
                    let value = coerce_integer(LIMIT_KEY, value)?;
                    criteria.limit(value)?;
                    limit = Some(value);
                }
                OFFSET_KEY => {
                    criteria.offset(coerce_integer(OFFSET_KEY, value)?)?;
                }
                PAGE_KEY => page = Some(value),
                ORDER_KEY => apply_order(criteria, value)?,
                _ => self.apply_predicate(criteria, &entity_name, key, value)?,
            }
        }

        // `page` needs the (possibly aliased) limit, wherever it appears in the map.
        if let Some(page) = page {
            criteria.offset(page_offset(limit, page)?)?;
        }

        if let Some(relations) = relations {
            self.apply_relations(criteria, relations)?;
        }
        Ok(())
    }

    fn apply_predicate(
        &self,
        criteria: &mut Criteria,
        entity_name: &str,
        key: &str,
        value: &Value,
    ) -> CriteriaResult<()> {
        let separator = if key.contains('.') { '.' } else { '_' };
        let tokens: Vec<&str> = key.split(separator).collect();

        match tokens.as_slice() {
            [name] => {
                let criterion =
                    self.named
                        .get(entity_name, name)
                        .ok_or_else(|| CriteriaError::UnknownPredicate {
                            entity: entity_name.to_string(),
                            name: (*name).to_string(),
                        })?;
                criterion.apply(criteria, value)
            }
            [attribute, token] => {
                let operator =
                    Operator::from_token(token).ok_or_else(|| CriteriaError::UnknownPredicate {
                        entity: entity_name.to_string(),
                        name: (*token).to_string(),
                    })?;
                apply_operator(criteria, operator, attribute, value)
            }
            _ => {
                debug!(
                    "event=filter_key_ignored module=criteria entity={} key={} segments={}",
                    entity_name,
                    key,
                    tokens.len()
                );
                Ok(())
            }
        }
    }

    fn apply_relations(&self, criteria: &mut Criteria, relations: &Value) -> CriteriaResult<()> {
        let Value::Object(relations) = relations else {
            return Err(CriteriaError::invalid(
                "`relations` must map entity names to filter maps",
            ));
        };

        for (related, nested) in relations {
            if related.trim().is_empty() {
                return Err(CriteriaError::invalid("relation entity name must not be blank"));
            }
            let nested = match nested {
                Value::Object(nested) => nested,
                Value::Null => continue,
                other => {
                    return Err(CriteriaError::invalid(format!(
                        "relation `{related}` filter must be an object, got {other}"
                    )))
                }
            };
            if nested.is_empty() {
                continue;
            }
            let child = criteria.relation(related.as_str());
            self.apply(child, nested)?;
        }
        Ok(())
    }
}

fn apply_operator(
    criteria: &mut Criteria,
    operator: Operator,
    attribute: &str,
    value: &Value,
) -> CriteriaResult<()> {
    match operator {
        Operator::IsNull => {
            if is_truthy(value) {
                criteria.is_null(attribute);
            }
        }
        Operator::IsNotNull => {
            if is_truthy(value) {
                criteria.is_not_null(attribute);
            }
        }
        Operator::Between => match value {
            Value::Array(bounds) if bounds.len() == 2 => {
                criteria.between(attribute, bounds[0].clone(), bounds[1].clone());
            }
            other => {
                return Err(CriteriaError::invalid(format!(
                    "`{attribute}.between` requires a two-element array, got {other}"
                )))
            }
        },
        Operator::In => match value {
            Value::Array(values) => {
                criteria.in_values(attribute, values.iter().cloned());
            }
            other => {
                return Err(CriteriaError::invalid(format!(
                    "`{attribute}.in` requires an array, got {other}"
                )))
            }
        },
        Operator::EqualTo => {
            criteria.equal_to(attribute, value.clone());
        }
        Operator::NotEqualTo => {
            criteria.not_equal_to(attribute, value.clone());
        }
        Operator::LessThan => {
            criteria.less_than(attribute, value.clone());
        }
        Operator::GreaterThan => {
            criteria.greater_than(attribute, value.clone());
        }
        Operator::GreaterThanOrEqualTo => {
            criteria.greater_than_or_equal_to(attribute, value.clone());
        }
        Operator::LessThanOrEqualTo => {
            criteria.less_than_or_equal_to(attribute, value.clone());
        }
        Operator::Like => {
            criteria.like(attribute, value.clone());
        }
    }
    Ok(())
}

fn apply_order(criteria: &mut Criteria, value: &Value) -> CriteriaResult<()> {
    match value {
        Value::String(expression) => {
            criteria.order(expression)?;
        }
        Value::Array(expressions) => {
            for expression in expressions {
                let Value::String(expression) = expression else {
                    return Err(CriteriaError::invalid(format!(
                        "order entries must be strings, got {expression}"
                    )));
                };
                criteria.order(expression)?;
            }
        }
        other => {
            return Err(CriteriaError::invalid(format!(
                "order must be a string or an array of strings, got {other}"
            )))
        }
    }
    Ok(())
}

fn page_offset(limit: Option<i64>, page: &Value) -> CriteriaResult<i64> {
    let limit =
        limit.ok_or_else(|| CriteriaError::invalid("`page` requires `limit` in the same filter"))?;
    let page = coerce_integer(PAGE_KEY, page)?;
    if page < 1 {
        return Err(CriteriaError::invalid(format!("page must be >= 1, got {page}")));
    }
    limit
        .checked_mul(page - 1)
        .ok_or_else(|| CriteriaError::invalid("page offset overflows"))
}

fn coerce_integer(field: &str, value: &Value) -> CriteriaResult<i64> {
    let parsed = match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    };
    let parsed = parsed.ok_or_else(|| {
        CriteriaError::invalid(format!("{field} must be an integer, got {value}"))
    })?;
    if parsed < 0 {
        return Err(CriteriaError::invalid(format!(
            "{field} must be >= 0, got {parsed}"
        )));
    }
    Ok(parsed)
}

/// Loose truthiness used by `isNull` / `isNotNull` flags.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty() && text != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::{coerce_integer, is_truthy};
    use serde_json::json;

    #[test]
    fn coerce_integer_accepts_numbers_and_numeric_strings() {
        assert_eq!(coerce_integer("limit", &json!(10)).unwrap(), 10);
        assert_eq!(coerce_integer("limit", &json!(" 7 ")).unwrap(), 7);
        assert!(coerce_integer("limit", &json!(-1)).is_err());
        assert!(coerce_integer("limit", &json!("ten")).is_err());
        assert!(coerce_integer("limit", &json!(1.5)).is_err());
    }

    #[test]
    fn truthiness_follows_loose_rules() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("yes")));
        assert!(!is_truthy(&json!("0")));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!([])));
    }
}
