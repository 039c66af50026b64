use super::entity::{Entity, EntityFactory};
use super::events::{publish_created, publish_deleted, publish_update, EventSink};
use super::executor::{Executor, SqliteExecutor};
use super::identity_map::{identity_key, IdentityMap};
use super::{ensure_entity, AddOutcome, EntityRepository, RepoError, RepoResult};
use crate::criteria::{Criteria, CriteriaFactory, Filter};
use crate::mapper::{Attributes, Mapper};
use crate::query::QueryBuilder;
use log::info;
use rusqlite::Connection;
use serde_json::Value;
use std::rc::Rc;

/// SQL-backed, identity-mapped repository for one entity.
pub struct Repository<E> {
    entity_name: String,
    criteria_factory: CriteriaFactory,
    query_builder: QueryBuilder,
    mapper: Mapper,
    executor: Box<dyn Executor>,
    factory: Box<dyn EntityFactory<E>>,
    events: Rc<dyn EventSink<E>>,
    identity_map: IdentityMap<E>,
}

impl<E: Entity> Repository<E> {
    /// Creates a repository; the entity must be configured in the factory's entity map.
    pub fn new(
        entity_name: &str,
        criteria_factory: CriteriaFactory,
        executor: Box<dyn Executor>,
        factory: Box<dyn EntityFactory<E>>,
        events: Rc<dyn EventSink<E>>,
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
            events,
            identity_map: IdentityMap::new(),
        })
    }

    /// Repository over a shared SQLite connection, using the configured table.
    pub fn sqlite(
        entity_name: &str,
        criteria_factory: CriteriaFactory,
        conn: Rc<Connection>,
        factory: Box<dyn EntityFactory<E>>,
        events: Rc<dyn EventSink<E>>,
    ) -> RepoResult<Self> {
        let entity_map = criteria_factory.entity_map();
        let executor = SqliteExecutor::new(
            conn,
            entity_map.table(entity_name.trim())?,
            entity_map.primary_key(entity_name.trim())?,
        );
        Self::new(
            entity_name,
            criteria_factory,
            Box::new(executor),
            factory,
            events,
        )
    }

    pub fn identity_map(&self) -> &IdentityMap<E> {
        &self.identity_map
    }

    fn id_of(&self, attributes: &Attributes) -> Option<(Value, String)> {
        let id = attributes.get(self.mapper.primary_key_attribute())?;
        identity_key(id).map(|key| (id.clone(), key))
    }

    fn load(&mut self, criteria: &Criteria) -> RepoResult<Vec<E>> {
        ensure_entity(&self.entity_name, criteria)?;
        let query = self.query_builder.compile(criteria)?;
        let rows = self.executor.select_rows(&query)?;
        let attributes = self.mapper.from_rows(&rows)?;
        let keys: Vec<Option<String>> = attributes
            .iter()
            .map(|attributes| self.id_of(attributes).map(|(_, key)| key))
            .collect();

        let entities = self.factory.create_many(attributes)?;
        if entities.len() != keys.len() {
            return Err(RepoError::InvalidData(format!(
                "`{}` factory built {} entities from {} rows",
                self.entity_name,
                entities.len(),
                keys.len()
            )));
        }
        for (key, entity) in keys.into_iter().zip(&entities) {
            if let Some(key) = key {
                self.identity_map.insert(key, entity.clone());
            }
        }
        Ok(entities)
    }

    fn insert(&mut self, mut entity: E, attributes: Attributes) -> RepoResult<AddOutcome<E>> {
        let supplied = self.id_of(&attributes);
        let mut row = self.mapper.to_row(&attributes)?;
        if let Some((id, _)) = &supplied {
            row.insert(self.mapper.primary_key().to_string(), id.clone());
        }

        let stored_id = self.executor.insert(&row)?;
        let key = match supplied {
            Some((_, key)) => key,
            None => {
                let mut generated = Attributes::new();
                generated.insert(
                    self.mapper.primary_key_attribute().to_string(),
                    stored_id.clone(),
                );
                entity.populate(&generated);
                identity_key(&stored_id).ok_or_else(|| {
                    RepoError::InvalidData(format!(
                        "insert into `{}` returned unusable id {stored_id}",
                        self.entity_name
                    ))
                })?
            }
        };

        let entity = publish_created(self.events.as_ref(), &self.entity_name, entity);
        self.identity_map.insert(key.clone(), entity.clone());
        info!(
            "event=entity_add module=repo status=ok entity={} outcome=created id={}",
            self.entity_name, key
        );
        Ok(AddOutcome::Created(entity))
    }
}

impl<E: Entity> EntityRepository<E> for Repository<E> {
    fn entity_name(&self) -> &str {
        &self.entity_name
    }

    fn create_criteria(&self, filter: &Filter) -> RepoResult<Criteria> {
        Ok(self.criteria_factory.build(&self.entity_name, filter)?)
    }

    fn find(&mut self, criteria: &Criteria) -> RepoResult<Option<E>> {
        let mut single = criteria.clone();
        single.set_pagination(Some(1), Some(0));
        Ok(self.load(&single)?.into_iter().next())
    }

    fn find_many(&mut self, criteria: &Criteria) -> RepoResult<Vec<E>> {
        self.load(criteria)
    }

    fn find_by_id(&mut self, id: &Value) -> RepoResult<Option<E>> {
        let mut criteria = Criteria::new(self.entity_name.as_str())?;
        criteria.equal_to(self.mapper.primary_key_attribute(), id.clone());
        self.find(&criteria)
    }

    fn count(&self, criteria: &Criteria) -> RepoResult<u64> {
        ensure_entity(&self.entity_name, criteria)?;
        let query = self.query_builder.compile(criteria)?.into_count();
        let rows = self.executor.select_rows(&query)?;
        let count = rows
            .first()
            .and_then(|row| row.get("row_count"))
            .map_or(Some(0), Value::as_u64)
            .ok_or_else(|| RepoError::InvalidData("row_count is not an integer".to_string()))?;
        Ok(count)
    }

    fn add(&mut self, entity: E) -> RepoResult<AddOutcome<E>> {
        let attributes = entity.extract();
        let loaded = self
            .id_of(&attributes)
            .filter(|(_, key)| self.identity_map.contains(key));

        let Some((id, key)) = loaded else {
            return self.insert(entity, attributes);
        };

        let Some(original) = self.identity_map.snapshot(&key).cloned() else {
            return self.insert(entity, attributes);
        };
        if original.extract() == attributes {
            self.identity_map.set_live(&key, entity.clone());
            return Ok(AddOutcome::Unchanged(entity));
        }

        let row = self.mapper.to_row(&attributes)?;
        let executor = self.executor.as_ref();
        let (entity, affected) = publish_update(
            self.events.as_ref(),
            &self.entity_name,
            original,
            entity,
            || executor.update(&row, &id),
        )?;
        self.identity_map.insert(key.clone(), entity.clone());
        info!(
            "event=entity_add module=repo status=ok entity={} outcome=updated id={} affected={}",
            self.entity_name, key, affected
        );
        Ok(AddOutcome::Updated { entity, affected })
    }

    fn remove(&mut self, entity: &E) -> RepoResult<Option<usize>> {
        let Some((id, key)) = self.id_of(&entity.extract()) else {
            return Ok(None);
        };

        let affected = self.executor.delete_by_id(&id)?;
        self.identity_map.remove(&key);
        publish_deleted(self.events.as_ref(), &self.entity_name, entity.clone());
        info!(
            "event=entity_remove module=repo status=ok entity={} id={} affected={}",
            self.entity_name, key, affected
        );
        Ok(Some(affected))
    }
}
