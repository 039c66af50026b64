use super::entity::Entity;
use super::events::{publish_created, publish_deleted, publish_update, EventSink};
use super::identity_map::{identity_key, IdentityMap};
use super::{ensure_entity, AddOutcome, EntityRepository, RepoError, RepoResult};
use crate::config::DEFAULT_PRIMARY_KEY;
use crate::criteria::{order_records, Criteria, CriteriaFactory, CriteriaMatcher, Filter};
use crate::mapper::Attributes;
use log::debug;
use serde_json::Value;
use std::rc::Rc;

/// Repository over an ordered in-process store, for tests and fixtures.
///
/// Same contract and events as [`Repository`](super::Repository); criteria
/// are evaluated against extracted attributes and joins are rejected.
pub struct InMemoryRepository<E> {
    entity_name: String,
    primary_key_attribute: String,
    criteria_factory: CriteriaFactory,
    events: Rc<dyn EventSink<E>>,
    store: IdentityMap<E>,
    next_id: u64,
}

impl<E: Entity> InMemoryRepository<E> {
    /// The primary key attribute comes from the entity map when the entity is
    /// configured there, `id` otherwise.
    pub fn new(
        entity_name: &str,
        criteria_factory: CriteriaFactory,
        events: Rc<dyn EventSink<E>>,
    ) -> RepoResult<Self> {
        let entity_name = entity_name.trim();
        if entity_name.is_empty() {
            return Err(RepoError::InvalidArgument(
                "entity name must not be blank".to_string(),
            ));
        }
        let primary_key_attribute = criteria_factory
            .entity_map()
            .primary_key_attribute(entity_name)
            .unwrap_or(DEFAULT_PRIMARY_KEY)
            .to_string();

        Ok(Self {
            entity_name: entity_name.to_string(),
            primary_key_attribute,
            criteria_factory,
            events,
            store: IdentityMap::new(),
            next_id: 1,
        })
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    fn id_of(&self, attributes: &Attributes) -> Option<(Value, String)> {
        let id = attributes.get(&self.primary_key_attribute)?;
        identity_key(id).map(|key| (id.clone(), key))
    }

    fn select(&self, criteria: &Criteria) -> RepoResult<Vec<E>> {
        ensure_entity(&self.entity_name, criteria)?;
        if !criteria.relations().is_empty() {
            return Err(RepoError::IllegalOperation(format!(
                "in-memory `{}` repository cannot join relations",
                self.entity_name
            )));
        }
        let matcher = CriteriaMatcher::new(criteria)?;

        let mut matched: Vec<(Attributes, E)> = self
            .store
            .snapshots()
            .map(|(_, entity)| (entity.extract(), entity))
            .filter(|(attributes, _)| matcher.matches(attributes))
            .map(|(attributes, entity)| (attributes, entity.clone()))
            .collect();
        order_records(&mut matched, criteria.order_terms(), |(attributes, _)| {
            attributes
        });

        let offset = usize::try_from(criteria.offset_value().unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = criteria
            .limit_value()
            .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));

        Ok(matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(_, entity)| entity)
            .collect())
    }

    fn allocate_id(&mut self) -> RepoResult<Value> {
        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or_else(|| {
            RepoError::IllegalOperation(format!(
                "id space of in-memory `{}` repository is exhausted",
                self.entity_name
            ))
        })?;
        Ok(Value::from(id))
    }

    fn observe_id(&mut self, id: &Value) {
        let numeric = match id {
            Value::Number(number) => number.as_u64(),
            Value::String(text) => text.trim().parse::<u64>().ok(),
            _ => None,
        };
        if let Some(numeric) = numeric {
            self.next_id = self.next_id.max(numeric.saturating_add(1));
        }
    }
}

impl<E: Entity> EntityRepository<E> for InMemoryRepository<E> {
    fn entity_name(&self) -> &str {
        &self.entity_name
    }

    fn create_criteria(&self, filter: &Filter) -> RepoResult<Criteria> {
        Ok(self.criteria_factory.build(&self.entity_name, filter)?)
    }

    fn find(&mut self, criteria: &Criteria) -> RepoResult<Option<E>> {
        let mut single = criteria.clone();
        single.set_pagination(Some(1), Some(0));
        Ok(self.select(&single)?.into_iter().next())
    }

    fn find_many(&mut self, criteria: &Criteria) -> RepoResult<Vec<E>> {
        self.select(criteria)
    }

    fn find_by_id(&mut self, id: &Value) -> RepoResult<Option<E>> {
        let mut criteria = Criteria::new(self.entity_name.as_str())?;
        criteria.equal_to(self.primary_key_attribute.as_str(), id.clone());
        self.find(&criteria)
    }

    fn count(&self, criteria: &Criteria) -> RepoResult<u64> {
        let mut unpaged = criteria.clone();
        unpaged.set_pagination(None, None);
        Ok(self.select(&unpaged)?.len() as u64)
    }

    fn add(&mut self, mut entity: E) -> RepoResult<AddOutcome<E>> {
        let attributes = entity.extract();

        if let Some((_, key)) = self.id_of(&attributes) {
            if let Some(original) = self.store.snapshot(&key).cloned() {
                if original.extract() == attributes {
                    return Ok(AddOutcome::Unchanged(entity));
                }
                let (entity, affected) = publish_update(
                    self.events.as_ref(),
                    &self.entity_name,
                    original,
                    entity,
                    || Ok(1),
                )?;
                self.store.insert(key, entity.clone());
                return Ok(AddOutcome::Updated { entity, affected });
            }
        }

        let key = match self.id_of(&attributes) {
            Some((id, key)) => {
                self.observe_id(&id);
                key
            }
            None => {
                let id = self.allocate_id()?;
                let mut generated = Attributes::new();
                generated.insert(self.primary_key_attribute.clone(), id.clone());
                entity.populate(&generated);
                id.to_string()
            }
        };

        let entity = publish_created(self.events.as_ref(), &self.entity_name, entity);
        self.store.insert(key.clone(), entity.clone());
        debug!(
            "event=entity_add module=repo status=ok store=memory entity={} outcome=created id={}",
            self.entity_name, key
        );
        Ok(AddOutcome::Created(entity))
    }

    fn remove(&mut self, entity: &E) -> RepoResult<Option<usize>> {
        let Some((_, key)) = self.id_of(&entity.extract()) else {
            return Ok(None);
        };
        let affected = usize::from(self.store.remove(&key).is_some());
        publish_deleted(self.events.as_ref(), &self.entity_name, entity.clone());
        Ok(Some(affected))
    }
}
