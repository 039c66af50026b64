use serde_json::Value;
use std::fmt::{Display, Formatter};

/// Closed set of comparison operators accepted in filter keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    EqualTo,
    NotEqualTo,
    LessThan,
    GreaterThan,
    GreaterThanOrEqualTo,
    LessThanOrEqualTo,
    Like,
    IsNull,
    IsNotNull,
    In,
    Between,
}

impl Operator {
    pub const ALL: [Operator; 11] = [
        Self::EqualTo,
        Self::NotEqualTo,
        Self::LessThan,
        Self::GreaterThan,
        Self::GreaterThanOrEqualTo,
        Self::LessThanOrEqualTo,
        Self::Like,
        Self::IsNull,
        Self::IsNotNull,
        Self::In,
        Self::Between,
    ];

    /// Parses the camelCase token used in filter keys (`status.equalTo`).
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|operator| operator.as_token() == token)
    }

    pub fn as_token(self) -> &'static str {
        match self {
            Self::EqualTo => "equalTo",
            Self::NotEqualTo => "notEqualTo",
            Self::LessThan => "lessThan",
            Self::GreaterThan => "greaterThan",
            Self::GreaterThanOrEqualTo => "greaterThanOrEqualTo",
            Self::LessThanOrEqualTo => "lessThanOrEqualTo",
            Self::Like => "like",
            Self::IsNull => "isNull",
            Self::IsNotNull => "isNotNull",
            Self::In => "in",
            Self::Between => "between",
        }
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_token())
    }
}

/// Right-hand side of a predicate; shape is fixed by the operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// `isNull` / `isNotNull`.
    None,
    Value(Value),
    /// `in`.
    Values(Vec<Value>),
    /// `between` (inclusive).
    Range(Value, Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub operator: Operator,
    pub attribute: String,
    pub operand: Operand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("asc") {
            Some(Self::Asc)
        } else if value.eq_ignore_ascii_case("desc") {
            Some(Self::Desc)
        } else {
            None
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One ORDER BY term. `direction: None` means the store default (ascending).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub attribute: String,
    pub direction: Option<Direction>,
}

impl OrderTerm {
    pub fn effective_direction(&self) -> Direction {
        self.direction.unwrap_or_default()
    }
}
