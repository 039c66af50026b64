use crate::criteria::{Direction, Operand, Operator};
use serde_json::Value;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Projection {
    /// Every column of the root table.
    #[default]
    All,
    /// `COUNT(*) AS row_count`.
    Count,
}

/// Inner join with no projected columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub table: String,
    /// Qualified `left = right` columns.
    pub left: String,
    pub right: String,
}

/// WHERE expression tree over qualified columns.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Predicate {
        column: String,
        operator: Operator,
        operand: Operand,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderClause {
    pub column: String,
    pub direction: Direction,
}

/// One flat `SELECT` statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub table: String,
    pub projection: Projection,
    pub joins: Vec<Join>,
    pub where_clause: Option<Condition>,
    pub order: Vec<OrderClause>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// SQL text plus positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Query {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Count variant: same FROM/JOIN/WHERE, no order or pagination.
    pub fn into_count(mut self) -> Self {
        self.projection = Projection::Count;
        self.order.clear();
        self.limit = None;
        self.offset = None;
        self
    }

    pub fn render(&self) -> RenderedQuery {
        let mut sql = String::new();
        let mut params = Vec::new();

        match self.projection {
            Projection::All => {
                let _ = write!(sql, "SELECT {}.* FROM {}", self.table, self.table);
            }
            Projection::Count => {
                let _ = write!(sql, "SELECT COUNT(*) AS row_count FROM {}", self.table);
            }
        }

        for join in &self.joins {
            let _ = write!(
                sql,
                " INNER JOIN {} ON {} = {}",
                join.table, join.left, join.right
            );
        }

        if let Some(condition) = &self.where_clause {
            sql.push_str(" WHERE ");
            render_condition(condition, false, &mut sql, &mut params);
        }

        if !self.order.is_empty() {
            let terms: Vec<String> = self
                .order
                .iter()
                .map(|clause| format!("{} {}", clause.column, clause.direction.as_sql()))
                .collect();
            let _ = write!(sql, " ORDER BY {}", terms.join(", "));
        }

        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) if offset > 0 => {
                let _ = write!(sql, " LIMIT {limit} OFFSET {offset}");
            }
            (Some(limit), _) => {
                let _ = write!(sql, " LIMIT {limit}");
            }
            (None, Some(offset)) if offset > 0 => {
                let _ = write!(sql, " LIMIT -1 OFFSET {offset}");
            }
            (None, _) => {}
        }

        RenderedQuery { sql, params }
    }
}

fn render_condition(condition: &Condition, nested: bool, sql: &mut String, params: &mut Vec<Value>) {
    match condition {
        Condition::Predicate {
            column,
            operator,
            operand,
        } => render_predicate(column, *operator, operand, sql, params),
        Condition::And(items) => render_group(items, " AND ", nested, sql, params),
        Condition::Or(items) => render_group(items, " OR ", nested, sql, params),
    }
}

fn render_group(
    items: &[Condition],
    glue: &str,
    nested: bool,
    sql: &mut String,
    params: &mut Vec<Value>,
) {
    match items {
        [] => sql.push_str("1 = 1"),
        [single] => render_condition(single, nested, sql, params),
        _ => {
            if nested {
                sql.push('(');
            }
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    sql.push_str(glue);
                }
                render_condition(item, true, sql, params);
            }
            if nested {
                sql.push(')');
            }
        }
    }
}

fn render_predicate(
    column: &str,
    operator: Operator,
    operand: &Operand,
    sql: &mut String,
    params: &mut Vec<Value>,
) {
    let comparison = match operator {
        Operator::EqualTo => "=",
        Operator::NotEqualTo => "!=",
        Operator::LessThan => "<",
        Operator::GreaterThan => ">",
        Operator::GreaterThanOrEqualTo => ">=",
        Operator::LessThanOrEqualTo => "<=",
        Operator::Like => "LIKE",
        Operator::IsNull => {
            let _ = write!(sql, "{column} IS NULL");
            return;
        }
        Operator::IsNotNull => {
            let _ = write!(sql, "{column} IS NOT NULL");
            return;
        }
        Operator::In => {
            match operand {
                Operand::Values(values) if !values.is_empty() => {
                    let placeholders = vec!["?"; values.len()].join(", ");
                    let _ = write!(sql, "{column} IN ({placeholders})");
                    params.extend(values.iter().cloned());
                }
                _ => sql.push_str("1 = 0"),
            }
            return;
        }
        Operator::Between => {
            let (min, max) = match operand {
                Operand::Range(min, max) => (min.clone(), max.clone()),
                _ => (Value::Null, Value::Null),
            };
            let _ = write!(sql, "{column} BETWEEN ? AND ?");
            params.push(min);
            params.push(max);
            return;
        }
    };

    let value = match operand {
        Operand::Value(value) => value.clone(),
        _ => Value::Null,
    };
    let _ = write!(sql, "{column} {comparison} ?");
    params.push(value);
}
