use super::statement::{Condition, Join, OrderClause, Query};
use crate::config::{ConfigResult, EntityMap, Relation};
use crate::criteria::{Criteria, Predicate};
use log::debug;
use std::sync::Arc;

/// Compiles criteria trees into flat SQL queries using the entity map.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    entity_map: Arc<EntityMap>,
}

impl QueryBuilder {
    pub fn new(entity_map: Arc<EntityMap>) -> Self {
        Self { entity_map }
    }

    pub fn entity_map(&self) -> &Arc<EntityMap> {
        &self.entity_map
    }

    /// Builds `SELECT root.* FROM root [JOIN ...] WHERE ... ORDER BY ... LIMIT/OFFSET`.
    ///
    /// Relation children add joins; their predicates, OR groups and order
    /// terms land in the same WHERE / ORDER BY clauses.
    pub fn compile(&self, criteria: &Criteria) -> ConfigResult<Query> {
        let mut query = Query::new(self.entity_map.table(criteria.entity_name())?);
        let conditions = self.compile_node(criteria, &mut query)?;
        query.where_clause = match conditions.len() {
            0 => None,
            _ => Some(Condition::And(conditions)),
        };
        query.limit = criteria.limit_value();
        query.offset = criteria.offset_value();

        debug!(
            "event=query_compile module=query entity={} table={} joins={} order_terms={}",
            criteria.entity_name(),
            query.table,
            query.joins.len(),
            query.order.len()
        );
        Ok(query)
    }

    /// Returns the AND-list contributed by `criteria` and its relation children.
    fn compile_node(&self, criteria: &Criteria, query: &mut Query) -> ConfigResult<Vec<Condition>> {
        let entity = criteria.entity_name();
        let mut conditions = criteria
            .predicates()
            .iter()
            .map(|predicate| self.predicate_condition(entity, predicate))
            .collect::<ConfigResult<Vec<_>>>()?;

        let mut alternatives = Vec::new();
        for sibling in criteria.or_group() {
            let sibling_conditions = self.compile_node(sibling, query)?;
            if !sibling_conditions.is_empty() {
                alternatives.push(Condition::And(sibling_conditions));
            }
        }
        if !alternatives.is_empty() {
            conditions.push(Condition::Or(alternatives));
        }

        for term in criteria.order_terms() {
            query.order.push(OrderClause {
                column: self.qualified_column(entity, &term.attribute)?,
                direction: term.effective_direction(),
            });
        }

        for child in criteria.relations() {
            self.push_joins(entity, child.entity_name(), query)?;
            conditions.extend(self.compile_node(child, query)?);
        }

        Ok(conditions)
    }

    fn push_joins(&self, entity: &str, related: &str, query: &mut Query) -> ConfigResult<()> {
        let main_table = self.entity_map.table(entity)?;
        let related_table = self.entity_map.table(related)?;

        match self.entity_map.relation(entity, related)? {
            Relation::Direct { local, foreign } => query.joins.push(Join {
                table: related_table.to_string(),
                left: qualify(main_table, local),
                right: qualify(related_table, foreign),
            }),
            Relation::ManyToMany {
                link_table,
                local_link,
                foreign_link,
            } => {
                let main_pk = self.entity_map.primary_key(entity)?;
                let related_pk = self.entity_map.primary_key(related)?;
                query.joins.push(Join {
                    table: link_table.clone(),
                    left: qualify(link_table, local_link),
                    right: qualify(main_table, main_pk),
                });
                query.joins.push(Join {
                    table: related_table.to_string(),
                    left: qualify(link_table, foreign_link),
                    right: qualify(related_table, related_pk),
                });
            }
        }
        Ok(())
    }

    fn predicate_condition(&self, entity: &str, predicate: &Predicate) -> ConfigResult<Condition> {
        Ok(Condition::Predicate {
            column: self.qualified_column(entity, &predicate.attribute)?,
            operator: predicate.operator,
            operand: predicate.operand.clone(),
        })
    }

    fn qualified_column(&self, entity: &str, attribute: &str) -> ConfigResult<String> {
        let table = self.entity_map.table(entity)?;
        let column = self.entity_map.column(entity, attribute)?;
        Ok(format!("{table}.{column}"))
    }
}

/// Bare column names belong to `table`; qualified names pass through.
fn qualify(table: &str, column: &str) -> String {
    if column.contains('.') {
        column.to_string()
    } else {
        format!("{table}.{column}")
    }
}
