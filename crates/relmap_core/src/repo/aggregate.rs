//! Read-only repository that assembles aggregates with eagerly loaded relations.

use super::entity::Entity;
use super::executor::Executor;
use super::identity_map::identity_key;
use super::{ensure_entity, AddOutcome, EntityRepository, RepoError, RepoResult};
use crate::config::Relation;
use crate::criteria::{Criteria, CriteriaFactory, Filter};
use crate::mapper::{Attributes, Mapper, Row};
use crate::query::QueryBuilder;
use indexmap::IndexMap;
use log::debug;
use serde_json::Value;

/// Related entity per registered relation name; `None` when not loaded or not found.
pub type RelatedEntities<R> = IndexMap<String, Option<R>>;

/// Builds one aggregate from the main row attributes and its related entities.
pub trait AggregateFactory<A, R> {
    fn create(&self, attributes: Attributes, related: RelatedEntities<R>) -> RepoResult<A>;
}

impl<A, R, F> AggregateFactory<A, R> for F
where
    F: Fn(Attributes, RelatedEntities<R>) -> RepoResult<A>,
{
    fn create(&self, attributes: Attributes, related: RelatedEntities<R>) -> RepoResult<A> {
        self(attributes, related)
    }
}

/// Finder over the main table that can eager-load direct relations.
///
/// `with(relation)` applies to the next read only.
pub struct FinderAggregateRepository<A, R> {
    entity_name: String,
    criteria_factory: CriteriaFactory,
    query_builder: QueryBuilder,
    mapper: Mapper,
    executor: Box<dyn Executor>,
    factory: Box<dyn AggregateFactory<A, R>>,
    related: IndexMap<String, Box<dyn EntityRepository<R>>>,
    with: Vec<String>,
}

struct JoinColumns {
    /// Column of the main row holding the join value.
    local_column: String,
    /// Attribute of the related entity matched against it.
    foreign_attribute: String,
}

impl<A, R: Entity> FinderAggregateRepository<A, R> {
    pub fn new(
        entity_name: &str,
        criteria_factory: CriteriaFactory,
        executor: Box<dyn Executor>,
        factory: Box<dyn AggregateFactory<A, R>>,
    ) -> RepoResult<Self> {
        let entity_name = entity_name.trim();
        if entity_name.is_empty() {
            return Err(RepoError::InvalidArgument(
                "entity name must not be blank".to_string(),
            ));
        }
        let entity_map = criteria_factory.entity_map().clone();
        let mapper = Mapper::new(&entity_map, entity_name)?;

        Ok(Self {
            entity_name: entity_name.to_string(),
            criteria_factory,
            query_builder: QueryBuilder::new(entity_map),
            mapper,
            executor,
            factory,
            related: IndexMap::new(),
            with: Vec::new(),
        })
    }

    /// Registers the repository serving `relation`; the relation must be declared.
    pub fn register_related(
        &mut self,
        relation: &str,
        repository: Box<dyn EntityRepository<R>>,
    ) -> RepoResult<()> {
        self.join_columns(relation)?;
        if self.related.contains_key(relation) {
            return Err(RepoError::InvalidArgument(format!(
                "related repository `{relation}` already registered for `{}`",
                self.entity_name
            )));
        }
        self.related.insert(relation.to_string(), repository);
        Ok(())
    }

    /// Eager-loads `relation` on the next read.
    pub fn with(&mut self, relation: &str) -> RepoResult<&mut Self> {
        if !self.related.contains_key(relation) {
            return Err(RepoError::UnknownRelation {
                entity: self.entity_name.clone(),
                related: relation.to_string(),
            });
        }
        if !self.with.iter().any(|name| name == relation) {
            self.with.push(relation.to_string());
        }
        Ok(self)
    }

    pub fn pending_with(&self) -> &[String] {
        &self.with
    }

    fn join_columns(&self, relation: &str) -> RepoResult<JoinColumns> {
        let entity_map = self.criteria_factory.entity_map();
        match entity_map.relation(&self.entity_name, relation)? {
            Relation::Direct { local, foreign } => {
                let foreign_column = bare_column(foreign);
                Ok(JoinColumns {
                    local_column: bare_column(local).to_string(),
                    foreign_attribute: entity_map.attribute(relation, foreign_column)?.to_string(),
                })
            }
            Relation::ManyToMany { .. } => Err(RepoError::IllegalOperation(format!(
                "cannot eager-load many-to-many relation `{relation}` of `{}`",
                self.entity_name
            ))),
        }
    }

    fn read(&mut self, criteria: &Criteria) -> RepoResult<Vec<A>> {
        let with = std::mem::take(&mut self.with);
        ensure_entity(&self.entity_name, criteria)?;

        let query = self.query_builder.compile(criteria)?;
        let rows = self.executor.select_rows(&query)?;

        let mut loaded: IndexMap<String, (String, IndexMap<String, R>)> = IndexMap::new();
        for relation in &with {
            let columns = self.join_columns(relation)?;
            let values = join_values(&rows, &columns.local_column, relation)?;
            let related = self.load_related(relation, &columns.foreign_attribute, values)?;
            loaded.insert(relation.clone(), (columns.local_column, related));
        }

        let mut aggregates = Vec::with_capacity(rows.len());
        for row in &rows {
            let attributes = self.mapper.from_row(row)?;
            let mut related = RelatedEntities::new();
            for relation in self.related.keys() {
                let entity = loaded.get(relation).and_then(|(local_column, entities)| {
                    row.get(local_column)
                        .and_then(identity_key)
                        .and_then(|key| entities.get(&key).cloned())
                });
                related.insert(relation.clone(), entity);
            }
            aggregates.push(self.factory.create(attributes, related)?);
        }

        debug!(
            "event=aggregate_read module=repo entity={} rows={} with={}",
            self.entity_name,
            aggregates.len(),
            with.join(",")
        );
        Ok(aggregates)
    }

    fn load_related(
        &mut self,
        relation: &str,
        foreign_attribute: &str,
        values: Vec<Value>,
    ) -> RepoResult<IndexMap<String, R>> {
        let repository = self
            .related
            .get_mut(relation)
            .ok_or_else(|| RepoError::UnknownRelation {
                entity: self.entity_name.clone(),
                related: relation.to_string(),
            })?;

        let mut filter = Filter::new();
        filter.insert(format!("{foreign_attribute}.in"), Value::Array(values));
        let criteria = repository.create_criteria(&filter)?;

        let mut by_key = IndexMap::new();
        for entity in repository.find_many(&criteria)? {
            if let Some(key) = entity
                .extract()
                .get(foreign_attribute)
                .and_then(identity_key)
            {
                by_key.entry(key).or_insert(entity);
            }
        }
        Ok(by_key)
    }
}

impl<A, R: Entity> EntityRepository<A> for FinderAggregateRepository<A, R> {
    fn entity_name(&self) -> &str {
        &self.entity_name
    }

    fn create_criteria(&self, filter: &Filter) -> RepoResult<Criteria> {
        Ok(self.criteria_factory.build(&self.entity_name, filter)?)
    }

    fn find(&mut self, criteria: &Criteria) -> RepoResult<Option<A>> {
        let mut single = criteria.clone();
        single.set_pagination(Some(1), Some(0));
        Ok(self.read(&single)?.into_iter().next())
    }

    fn find_many(&mut self, criteria: &Criteria) -> RepoResult<Vec<A>> {
        self.read(criteria)
    }

    fn find_by_id(&mut self, id: &Value) -> RepoResult<Option<A>> {
        let mut criteria = Criteria::new(self.entity_name.as_str())?;
        criteria.equal_to(self.mapper.primary_key_attribute(), id.clone());
        self.find(&criteria)
    }

    fn count(&self, criteria: &Criteria) -> RepoResult<u64> {
        ensure_entity(&self.entity_name, criteria)?;
        let query = self.query_builder.compile(criteria)?.into_count();
        let rows = self.executor.select_rows(&query)?;
        rows.first()
            .and_then(|row| row.get("row_count"))
            .map_or(Some(0), Value::as_u64)
            .ok_or_else(|| RepoError::InvalidData("row_count is not an integer".to_string()))
    }

    fn add(&mut self, _entity: A) -> RepoResult<AddOutcome<A>> {
        Err(RepoError::IllegalOperation(format!(
            "aggregate finder for `{}` cannot add",
            self.entity_name
        )))
    }

    fn remove(&mut self, _entity: &A) -> RepoResult<Option<usize>> {
        Err(RepoError::IllegalOperation(format!(
            "aggregate finder for `{}` cannot remove",
            self.entity_name
        )))
    }
}

fn bare_column(column: &str) -> &str {
    column.rsplit('.').next().unwrap_or(column)
}

/// Distinct non-null values of `column` across `rows`, in first-seen order.
fn join_values(rows: &[Row], column: &str, relation: &str) -> RepoResult<Vec<Value>> {
    let mut seen = IndexMap::new();
    for row in rows {
        let value = row.get(column).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "relation column `{column}` for `{relation}` was not fetched"
            ))
        })?;
        if let Some(key) = identity_key(value) {
            seen.entry(key).or_insert_with(|| value.clone());
        }
    }
    Ok(seen.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::{bare_column, join_values};
    use serde_json::{json, Map, Value};

    fn row(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn bare_column_strips_table_prefix() {
        assert_eq!(bare_column("tasks.assignee_id"), "assignee_id");
        assert_eq!(bare_column("assignee_id"), "assignee_id");
    }

    #[test]
    fn join_values_are_distinct_and_skip_nulls() {
        let rows = vec![
            row(json!({ "assignee_id": 2 })),
            row(json!({ "assignee_id": null })),
            row(json!({ "assignee_id": 2 })),
            row(json!({ "assignee_id": 5 })),
        ];
        assert_eq!(
            join_values(&rows, "assignee_id", "User").unwrap(),
            vec![json!(2), json!(5)]
        );
        assert!(join_values(&rows, "owner_id", "User").is_err());
    }
}
