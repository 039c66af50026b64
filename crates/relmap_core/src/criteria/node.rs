use super::predicate::{Direction, Operand, Operator, OrderTerm, Predicate};
use super::{CriteriaError, CriteriaResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static ORDER_EXPRESSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)(?:\s+([A-Za-z]+))?\s*$")
        .expect("valid order expression regex")
});

/// Query intent for one entity name.
///
/// Builder methods return `&mut Self` so calls chain:
///
/// ```
/// use relmap_core::Criteria;
///
/// let mut criteria = Criteria::new("User").unwrap();
/// criteria.greater_than("id", 5).order_by("name", relmap_core::Direction::Desc);
/// criteria.or_criteria(None).less_than("id", 50).not_equal_to("id", 40);
/// assert_eq!(criteria.predicates().len(), 1);
/// assert_eq!(criteria.or_group().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Criteria {
    entity_name: String,
    predicates: Vec<Predicate>,
    relations: Vec<Criteria>,
    or_group: Vec<Criteria>,
    order: Vec<OrderTerm>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Criteria {
    /// Creates an empty root node. Blank entity names are rejected.
    pub fn new(entity_name: impl Into<String>) -> CriteriaResult<Self> {
        let entity_name = entity_name.into();
        if entity_name.trim().is_empty() {
            return Err(CriteriaError::invalid("entity name must not be blank"));
        }
        Ok(Self::node(entity_name))
    }

    fn node(entity_name: String) -> Self {
        Self {
            entity_name,
            predicates: Vec::new(),
            relations: Vec::new(),
            or_group: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn relations(&self) -> &[Criteria] {
        &self.relations
    }

    pub fn or_group(&self) -> &[Criteria] {
        &self.or_group
    }

    pub fn order_terms(&self) -> &[OrderTerm] {
        &self.order
    }

    pub fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<u64> {
        self.offset
    }

    /// True when the node constrains nothing (no predicates, joins or OR group).
    pub fn is_unconstrained(&self) -> bool {
        self.predicates.is_empty() && self.relations.is_empty() && self.or_group.is_empty()
    }

    pub fn push_predicate(&mut self, predicate: Predicate) -> &mut Self {
        self.predicates.push(predicate);
        self
    }

    fn compare(
        &mut self,
        operator: Operator,
        attribute: impl Into<String>,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.push_predicate(Predicate {
            operator,
            attribute: attribute.into(),
            operand: Operand::Value(value.into()),
        })
    }

    pub fn equal_to(&mut self, attribute: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.compare(Operator::EqualTo, attribute, value)
    }

    pub fn not_equal_to(
        &mut self,
        attribute: impl Into<String>,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.compare(Operator::NotEqualTo, attribute, value)
    }

    pub fn less_than(&mut self, attribute: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.compare(Operator::LessThan, attribute, value)
    }

    pub fn greater_than(
        &mut self,
        attribute: impl Into<String>,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.compare(Operator::GreaterThan, attribute, value)
    }

    pub fn greater_than_or_equal_to(
        &mut self,
        attribute: impl Into<String>,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.compare(Operator::GreaterThanOrEqualTo, attribute, value)
    }

    pub fn less_than_or_equal_to(
        &mut self,
        attribute: impl Into<String>,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.compare(Operator::LessThanOrEqualTo, attribute, value)
    }

    /// SQL `LIKE`; `%` and `_` are wildcards.
    pub fn like(&mut self, attribute: impl Into<String>, pattern: impl Into<Value>) -> &mut Self {
        self.compare(Operator::Like, attribute, pattern)
    }

    pub fn is_null(&mut self, attribute: impl Into<String>) -> &mut Self {
        self.push_predicate(Predicate {
            operator: Operator::IsNull,
            attribute: attribute.into(),
            operand: Operand::None,
        })
    }

    pub fn is_not_null(&mut self, attribute: impl Into<String>) -> &mut Self {
        self.push_predicate(Predicate {
            operator: Operator::IsNotNull,
            attribute: attribute.into(),
            operand: Operand::None,
        })
    }

    pub fn in_values<I, V>(&mut self, attribute: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.push_predicate(Predicate {
            operator: Operator::In,
            attribute: attribute.into(),
            operand: Operand::Values(values.into_iter().map(Into::into).collect()),
        })
    }

    /// Inclusive range.
    pub fn between(
        &mut self,
        attribute: impl Into<String>,
        min: impl Into<Value>,
        max: impl Into<Value>,
    ) -> &mut Self {
        self.push_predicate(Predicate {
            operator: Operator::Between,
            attribute: attribute.into(),
            operand: Operand::Range(min.into(), max.into()),
        })
    }

    /// Appends an order term from `"attr"`, `"attr ASC"` or `"attr DESC"`.
    pub fn order(&mut self, expression: &str) -> CriteriaResult<&mut Self> {
        let captures = ORDER_EXPRESSION_RE.captures(expression).ok_or_else(|| {
            CriteriaError::invalid(format!("malformed order expression `{expression}`"))
        })?;
        let direction = match captures.get(2) {
            Some(token) => Some(Direction::parse(token.as_str()).ok_or_else(|| {
                CriteriaError::invalid(format!(
                    "order direction must be ASC or DESC, got `{}`",
                    token.as_str()
                ))
            })?),
            None => None,
        };
        self.order.push(OrderTerm {
            attribute: captures[1].to_string(),
            direction,
        });
        Ok(self)
    }

    pub fn order_by(&mut self, attribute: impl Into<String>, direction: Direction) -> &mut Self {
        self.order.push(OrderTerm {
            attribute: attribute.into(),
            direction: Some(direction),
        });
        self
    }

    pub fn limit(&mut self, limit: i64) -> CriteriaResult<&mut Self> {
        self.limit = Some(non_negative("limit", limit)?);
        Ok(self)
    }

    pub fn offset(&mut self, offset: i64) -> CriteriaResult<&mut Self> {
        self.offset = Some(non_negative("offset", offset)?);
        Ok(self)
    }

    /// Overwrites pagination on this node, including clearing it.
    pub fn set_pagination(&mut self, limit: Option<u64>, offset: Option<u64>) -> &mut Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    /// Creates a joined child node for `entity_name` and returns it.
    pub fn relation(&mut self, entity_name: impl Into<String>) -> &mut Criteria {
        self.relations.push(Self::node(entity_name.into()));
        let last = self.relations.len() - 1;
        &mut self.relations[last]
    }

    /// Creates a sibling in this node's OR group; defaults to the same entity.
    pub fn or_criteria(&mut self, entity_name: Option<&str>) -> &mut Criteria {
        let entity_name = entity_name.unwrap_or(&self.entity_name).to_string();
        self.or_group.push(Self::node(entity_name));
        let last = self.or_group.len() - 1;
        &mut self.or_group[last]
    }
}

fn non_negative(field: &str, value: i64) -> CriteriaResult<u64> {
    u64::try_from(value)
        .map_err(|_| CriteriaError::invalid(format!("{field} must be >= 0, got {value}")))
}
