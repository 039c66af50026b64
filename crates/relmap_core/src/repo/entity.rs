use super::RepoResult;
use crate::mapper::Attributes;
use serde_json::Value;

/// Domain object that round-trips through an attribute map.
///
/// `Clone` produces the snapshot kept by identity maps, so it must be a deep copy.
pub trait Entity: Clone {
    fn extract(&self) -> Attributes;

    /// Merges `attributes` into the entity (used to back-fill generated ids).
    fn populate(&mut self, attributes: &Attributes);
}

pub trait EntityFactory<E> {
    fn create(&self, attributes: Attributes) -> RepoResult<E>;

    fn create_many(&self, rows: Vec<Attributes>) -> RepoResult<Vec<E>> {
        rows.into_iter().map(|row| self.create(row)).collect()
    }
}

/// Attribute-map entity for callers without a domain type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    attributes: Attributes,
}

impl Record {
    pub fn new(attributes: Attributes) -> Self {
        Self { attributes }
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.attributes.get(attribute)
    }

    pub fn set(&mut self, attribute: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.attributes.insert(attribute.into(), value.into());
        self
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }
}

impl From<Attributes> for Record {
    fn from(value: Attributes) -> Self {
        Self::new(value)
    }
}

impl Entity for Record {
    fn extract(&self) -> Attributes {
        self.attributes.clone()
    }

    fn populate(&mut self, attributes: &Attributes) {
        for (attribute, value) in attributes {
            self.attributes.insert(attribute.clone(), value.clone());
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecordFactory;

impl EntityFactory<Record> for RecordFactory {
    fn create(&self, attributes: Attributes) -> RepoResult<Record> {
        Ok(Record::new(attributes))
    }
}
