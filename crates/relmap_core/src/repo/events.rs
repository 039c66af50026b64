//! Entity lifecycle events and the repository-scoped event manager.
//!
//! Topics:
//! - `entity:<type>:created`, `entity:<type>:deleted`
//! - `entity:<type>:changed:pre` (before the write), `entity:<type>:changed`
//! - `attribute:<type>:<name>:changed`, one per differing attribute
//!
//! `<type>` is the repository's entity name.

use super::entity::Entity;
use super::RepoResult;
use crate::mapper::Attributes;
use indexmap::IndexMap;
use log::debug;
use std::cell::RefCell;
use std::rc::Rc;
use uuid::Uuid;

/// Topic that receives every published event.
pub const ANY_TOPIC: &str = "*";

#[derive(Debug, Clone, PartialEq)]
pub struct EntityChange<E> {
    pub original: E,
    pub changed: E,
    /// Attributes whose values differ, in attribute order.
    pub changed_attributes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityEvent<E> {
    /// Handlers may replace `entity`; the replacement is returned from `add`.
    Created { entity: E },
    Deleted { entity: E },
    /// Informational; `add` keeps the entity it wrote whatever handlers do here.
    Changed(EntityChange<E>),
}

impl<E> EntityEvent<E> {
    /// Entity the event is about (the new state for changes).
    pub fn entity(&self) -> &E {
        match self {
            Self::Created { entity } | Self::Deleted { entity } => entity,
            Self::Changed(change) => &change.changed,
        }
    }

    fn into_entity(self) -> E {
        match self {
            Self::Created { entity } | Self::Deleted { entity } => entity,
            Self::Changed(change) => change.changed,
        }
    }
}

/// Synchronous, ordered event transport injected into a repository.
pub trait EventSink<E> {
    fn publish(&self, topic: &str, event: &mut EntityEvent<E>);
}

pub type SubscriptionId = Uuid;

type Handler<E> = Rc<dyn Fn(&str, &mut EntityEvent<E>)>;

/// In-process publish/subscribe keyed by topic.
///
/// Handlers for a topic run in subscription order; `*` handlers run after
/// the topic's own handlers.
pub struct EventManager<E> {
    subscriptions: RefCell<IndexMap<String, Vec<(SubscriptionId, Handler<E>)>>>,
}

impl<E> Default for EventManager<E> {
    fn default() -> Self {
        Self {
            subscriptions: RefCell::new(IndexMap::new()),
        }
    }
}

impl<E> EventManager<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, topic: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&str, &mut EntityEvent<E>) + 'static,
    {
        let id = Uuid::new_v4();
        self.subscriptions
            .borrow_mut()
            .entry(topic.to_string())
            .or_default()
            .push((id, Rc::new(handler)));
        id
    }

    /// Removes one subscription; false when the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.borrow_mut();
        for handlers in subscriptions.values_mut() {
            if let Some(position) = handlers.iter().position(|(candidate, _)| *candidate == id) {
                handlers.remove(position);
                return true;
            }
        }
        false
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscriptions
            .borrow()
            .get(topic)
            .map_or(0, Vec::len)
    }

    fn handlers_for(&self, topic: &str) -> Vec<Handler<E>> {
        let subscriptions = self.subscriptions.borrow();
        [topic, ANY_TOPIC]
            .into_iter()
            .filter_map(|key| subscriptions.get(key))
            .flatten()
            .map(|(_, handler)| Rc::clone(handler))
            .collect()
    }
}

impl<E> EventSink<E> for EventManager<E> {
    fn publish(&self, topic: &str, event: &mut EntityEvent<E>) {
        // Handlers run without the registry borrowed so they may (un)subscribe.
        let handlers = self.handlers_for(topic);
        debug!(
            "event=entity_event module=repo topic={} handlers={}",
            topic,
            handlers.len()
        );
        for handler in handlers {
            handler(topic, event);
        }
    }
}

impl<E> std::fmt::Debug for EventManager<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let subscriptions = self.subscriptions.borrow();
        f.debug_struct("EventManager")
            .field(
                "topics",
                &subscriptions
                    .iter()
                    .map(|(topic, handlers)| (topic.as_str(), handlers.len()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Attributes whose values differ between two attribute maps.
///
/// Keys of `changed` come first in their order, then keys only present in `original`.
pub fn changed_attributes(original: &Attributes, changed: &Attributes) -> Vec<String> {
    let mut names: Vec<String> = changed
        .iter()
        .filter(|(name, value)| original.get(name.as_str()) != Some(*value))
        .map(|(name, _)| name.clone())
        .collect();
    names.extend(
        original
            .keys()
            .filter(|name| !changed.contains_key(name.as_str()))
            .cloned(),
    );
    names
}

pub(crate) fn created_topic(entity_name: &str) -> String {
    format!("entity:{entity_name}:created")
}

pub(crate) fn deleted_topic(entity_name: &str) -> String {
    format!("entity:{entity_name}:deleted")
}

pub(crate) fn changed_topic(entity_name: &str) -> String {
    format!("entity:{entity_name}:changed")
}

pub(crate) fn attribute_changed_topic(entity_name: &str, attribute: &str) -> String {
    format!("attribute:{entity_name}:{attribute}:changed")
}

/// Fires `created` and returns the (possibly substituted) entity.
pub(crate) fn publish_created<E>(sink: &dyn EventSink<E>, entity_name: &str, entity: E) -> E {
    let mut event = EntityEvent::Created { entity };
    sink.publish(&created_topic(entity_name), &mut event);
    event.into_entity()
}

pub(crate) fn publish_deleted<E>(sink: &dyn EventSink<E>, entity_name: &str, entity: E) {
    let mut event = EntityEvent::Deleted { entity };
    sink.publish(&deleted_topic(entity_name), &mut event);
}

/// Runs `write` between `changed:pre` and `changed` + per-attribute events.
///
/// Returns the entity that was written, and the write result. Handler edits
/// to a `Changed` payload are not persisted and are discarded.
pub(crate) fn publish_update<E, F>(
    sink: &dyn EventSink<E>,
    entity_name: &str,
    original: E,
    changed: E,
    write: F,
) -> RepoResult<(E, usize)>
where
    E: Entity,
    F: FnOnce() -> RepoResult<usize>,
{
    let changed_attributes = changed_attributes(&original.extract(), &changed.extract());
    let written = changed.clone();
    let mut event = EntityEvent::Changed(EntityChange {
        original,
        changed,
        changed_attributes: changed_attributes.clone(),
    });
    let topic = changed_topic(entity_name);

    sink.publish(&format!("{topic}:pre"), &mut event);
    let affected = write()?;
    sink.publish(&topic, &mut event);
    for attribute in &changed_attributes {
        sink.publish(&attribute_changed_topic(entity_name, attribute), &mut event);
    }

    Ok((written, affected))
}
