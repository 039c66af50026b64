//! Entity map model, JSON loading and lookup API.

use super::{ConfigError, ConfigResult};
use indexmap::IndexMap;
use log::info;
use serde::Deserialize;
use std::path::Path;

/// Primary key column used when an entity does not declare one.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Declared value encoding for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSerializer {
    /// Structured value stored as JSON text.
    Json,
}

impl ColumnSerializer {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Join declaration between two entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    /// One-to-one / one-to-many: `local = foreign`.
    Direct { local: String, foreign: String },
    /// Many-to-many through a link table.
    ManyToMany {
        link_table: String,
        local_link: String,
        foreign_link: String,
    },
}

/// Bijective column <-> attribute mapping, kept in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    by_column: IndexMap<String, String>,
    by_attribute: IndexMap<String, String>,
}

impl ColumnMap {
    pub fn column(&self, attribute: &str) -> Option<&str> {
        self.by_attribute.get(attribute).map(String::as_str)
    }

    pub fn attribute(&self, column: &str) -> Option<&str> {
        self.by_column.get(column).map(String::as_str)
    }

    /// Iterates `(column, attribute)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_column
            .iter()
            .map(|(column, attribute)| (column.as_str(), attribute.as_str()))
    }

    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.by_attribute.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_column.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_column.is_empty()
    }

    fn insert(&mut self, column: String, attribute: String) -> Result<(), String> {
        if self.by_attribute.contains_key(&attribute) {
            return Err(attribute);
        }
        if let Some(previous) = self.by_column.insert(column.clone(), attribute.clone()) {
            self.by_attribute.shift_remove(&previous);
        }
        self.by_attribute.insert(attribute, column);
        Ok(())
    }
}

/// Configuration of one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDefinition {
    pub table: String,
    pub columns: ColumnMap,
    pub relations: IndexMap<String, Relation>,
    pub primary_key: String,
    /// External filter key -> canonical filter key.
    pub aliases: IndexMap<String, String>,
    pub serializers: IndexMap<String, ColumnSerializer>,
    pending_duplicate: Option<String>,
}

impl EntityDefinition {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: ColumnMap::default(),
            relations: IndexMap::new(),
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
            aliases: IndexMap::new(),
            serializers: IndexMap::new(),
            pending_duplicate: None,
        }
    }

    pub fn column(mut self, column: impl Into<String>, attribute: impl Into<String>) -> Self {
        if let Err(duplicate) = self.columns.insert(column.into(), attribute.into()) {
            self.pending_duplicate.get_or_insert(duplicate);
        }
        self
    }

    pub fn relation(
        mut self,
        related: impl Into<String>,
        local: impl Into<String>,
        foreign: impl Into<String>,
    ) -> Self {
        self.relations.insert(
            related.into(),
            Relation::Direct {
                local: local.into(),
                foreign: foreign.into(),
            },
        );
        self
    }

    pub fn many_to_many(
        mut self,
        related: impl Into<String>,
        link_table: impl Into<String>,
        local_link: impl Into<String>,
        foreign_link: impl Into<String>,
    ) -> Self {
        self.relations.insert(
            related.into(),
            Relation::ManyToMany {
                link_table: link_table.into(),
                local_link: local_link.into(),
                foreign_link: foreign_link.into(),
            },
        );
        self
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    pub fn alias(mut self, key: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.aliases.insert(key.into(), canonical.into());
        self
    }

    pub fn serializer(mut self, column: impl Into<String>, serializer: ColumnSerializer) -> Self {
        self.serializers.insert(column.into(), serializer);
        self
    }

    fn validate(&self, entity: &str) -> ConfigResult<()> {
        if self.table.trim().is_empty() {
            return Err(ConfigError::MissingTable(entity.to_string()));
        }
        if let Some(attribute) = &self.pending_duplicate {
            return Err(ConfigError::DuplicateAttribute {
                entity: entity.to_string(),
                attribute: attribute.clone(),
            });
        }
        for column in self.serializers.keys() {
            if self.columns.attribute(column).is_none() {
                return Err(ConfigError::UnknownColumn {
                    entity: entity.to_string(),
                    column: column.clone(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntityDefinition {
    #[serde(default)]
    table: String,
    #[serde(default, alias = "columns")]
    columns_as_attributes_map: IndexMap<String, String>,
    #[serde(default)]
    relations: IndexMap<String, Vec<String>>,
    #[serde(default)]
    primary_key: Option<String>,
    #[serde(default, alias = "aliasMap")]
    aliases: IndexMap<String, String>,
    #[serde(default)]
    serialized: IndexMap<String, String>,
}

impl RawEntityDefinition {
    fn into_definition(self, entity: &str) -> ConfigResult<EntityDefinition> {
        let mut definition = EntityDefinition::new(self.table);
        for (column, attribute) in self.columns_as_attributes_map {
            definition = definition.column(column, attribute);
        }
        if let Some(primary_key) = self.primary_key {
            definition = definition.primary_key(primary_key);
        }

        for (related, mut parts) in self.relations {
            definition = match parts.len() {
                2 => {
                    let foreign = parts.remove(1);
                    let local = parts.remove(0);
                    definition.relation(related, local, foreign)
                }
                3 => {
                    let foreign_link = parts.remove(2);
                    let local_link = parts.remove(1);
                    let link_table = parts.remove(0);
                    definition.many_to_many(related, link_table, local_link, foreign_link)
                }
                other => {
                    return Err(ConfigError::InvalidRelation {
                        entity: entity.to_string(),
                        related,
                        parts: other,
                    })
                }
            };
        }

        for (key, canonical) in self.aliases {
            definition = definition.alias(key, canonical);
        }

        for (column, name) in self.serialized {
            let serializer =
                ColumnSerializer::parse(&name).ok_or_else(|| ConfigError::UnsupportedSerializer {
                    entity: entity.to_string(),
                    column: column.clone(),
                    serializer: name.clone(),
                })?;
            definition = definition.serializer(column, serializer);
        }

        Ok(definition)
    }
}

/// Read-only lookup service over all configured entities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityMap {
    entities: IndexMap<String, EntityDefinition>,
}

impl EntityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates an entity map from JSON text.
    pub fn from_json_str(source: &str) -> ConfigResult<Self> {
        let raw: IndexMap<String, RawEntityDefinition> = serde_json::from_str(source)?;
        Self::from_raw(raw)
    }

    /// Parses and validates an entity map from an in-memory JSON value.
    pub fn from_json_value(value: serde_json::Value) -> ConfigResult<Self> {
        let raw: IndexMap<String, RawEntityDefinition> = serde_json::from_value(value)?;
        Self::from_raw(raw)
    }

    /// Reads, parses and validates an entity map JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        let map = Self::from_json_str(&source)?;
        info!(
            "event=entity_map_load module=config status=ok entities={} path={}",
            map.len(),
            path.display()
        );
        Ok(map)
    }

    fn from_raw(raw: IndexMap<String, RawEntityDefinition>) -> ConfigResult<Self> {
        let mut map = Self::new();
        for (entity, definition) in raw {
            let definition = definition.into_definition(&entity)?;
            map.insert(entity, definition)?;
        }
        Ok(map)
    }

    /// Registers one validated entity definition.
    pub fn insert(
        &mut self,
        entity: impl Into<String>,
        definition: EntityDefinition,
    ) -> ConfigResult<()> {
        let entity = entity.into();
        if self.entities.contains_key(&entity) {
            return Err(ConfigError::DuplicateEntity(entity));
        }
        definition.validate(&entity)?;
        self.entities.insert(entity, definition);
        Ok(())
    }

    /// Builder-style variant of [`EntityMap::insert`].
    pub fn with_entity(
        mut self,
        entity: impl Into<String>,
        definition: EntityDefinition,
    ) -> ConfigResult<Self> {
        self.insert(entity, definition)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.entities.contains_key(entity)
    }

    pub fn definition(&self, entity: &str) -> ConfigResult<&EntityDefinition> {
        self.entities
            .get(entity)
            .ok_or_else(|| ConfigError::EntityNotConfigured(entity.to_string()))
    }

    pub fn table(&self, entity: &str) -> ConfigResult<&str> {
        Ok(self.definition(entity)?.table.as_str())
    }

    /// Resolves an attribute to its column name.
    pub fn column(&self, entity: &str, attribute: &str) -> ConfigResult<&str> {
        self.definition(entity)?
            .columns
            .column(attribute)
            .ok_or_else(|| ConfigError::UnknownAttribute {
                entity: entity.to_string(),
                attribute: attribute.to_string(),
            })
    }

    /// Resolves a column name to its attribute.
    pub fn attribute(&self, entity: &str, column: &str) -> ConfigResult<&str> {
        self.definition(entity)?
            .columns
            .attribute(column)
            .ok_or_else(|| ConfigError::UnknownColumn {
                entity: entity.to_string(),
                column: column.to_string(),
            })
    }

    pub fn column_map(&self, entity: &str) -> ConfigResult<&ColumnMap> {
        Ok(&self.definition(entity)?.columns)
    }

    pub fn relation(&self, entity: &str, related: &str) -> ConfigResult<&Relation> {
        self.definition(entity)?
            .relations
            .get(related)
            .ok_or_else(|| ConfigError::UnknownRelation {
                entity: entity.to_string(),
                related: related.to_string(),
            })
    }

    pub fn is_many_to_many(&self, entity: &str, related: &str) -> ConfigResult<bool> {
        Ok(matches!(
            self.relation(entity, related)?,
            Relation::ManyToMany { .. }
        ))
    }

    /// Returns `(link_table, local_link_column, foreign_link_column)`.
    pub fn many_to_many_parts(
        &self,
        entity: &str,
        related: &str,
    ) -> ConfigResult<(&str, &str, &str)> {
        match self.relation(entity, related)? {
            Relation::ManyToMany {
                link_table,
                local_link,
                foreign_link,
            } => Ok((link_table.as_str(), local_link.as_str(), foreign_link.as_str())),
            Relation::Direct { .. } => Err(ConfigError::NotManyToMany {
                entity: entity.to_string(),
                related: related.to_string(),
            }),
        }
    }

    pub fn primary_key(&self, entity: &str) -> ConfigResult<&str> {
        Ok(self.definition(entity)?.primary_key.as_str())
    }

    /// Attribute holding the primary key; the column name itself when unmapped.
    pub fn primary_key_attribute(&self, entity: &str) -> ConfigResult<&str> {
        let definition = self.definition(entity)?;
        Ok(definition
            .columns
            .attribute(&definition.primary_key)
            .unwrap_or(definition.primary_key.as_str()))
    }

    pub fn alias_map(&self, entity: &str) -> ConfigResult<&IndexMap<String, String>> {
        Ok(&self.definition(entity)?.aliases)
    }

    pub fn serializers(&self, entity: &str) -> ConfigResult<&IndexMap<String, ColumnSerializer>> {
        Ok(&self.definition(entity)?.serializers)
    }
}
