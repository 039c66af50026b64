//! Row <-> attribute map translation for one entity.
//!
//! # Responsibility
//! - Rename columns to attributes (and back) through the entity column map.
//! - Apply declared column serializers (`json`) on the way in and out.
//!
//! # Invariants
//! - `to_row` never emits the primary key column.
//! - Unmapped columns and attributes are dropped silently.
//! - `from_row(to_row(attrs))` restores every mapped attribute except the
//!   primary key.

use crate::config::{ColumnMap, ColumnSerializer, ConfigResult, EntityMap};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Column-keyed values as read from or written to storage.
pub type Row = Map<String, Value>;
/// Attribute-keyed values as seen by entities.
pub type Attributes = Map<String, Value>;

pub type MapperResult<T> = Result<T, MapperError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapperError {
    /// Stored JSON column does not decode.
    InvalidJson { column: String, message: String },
}

impl Display for MapperError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidJson { column, message } => {
                write!(f, "column `{column}` holds invalid json: {message}")
            }
        }
    }
}

impl Error for MapperError {}

#[derive(Debug, Clone)]
pub struct Mapper {
    entity: String,
    columns: ColumnMap,
    primary_key: String,
    primary_key_attribute: String,
    serializers: IndexMap<String, ColumnSerializer>,
}

impl Mapper {
    pub fn new(entity_map: &EntityMap, entity: &str) -> ConfigResult<Self> {
        Ok(Self {
            entity: entity.to_string(),
            columns: entity_map.column_map(entity)?.clone(),
            primary_key: entity_map.primary_key(entity)?.to_string(),
            primary_key_attribute: entity_map.primary_key_attribute(entity)?.to_string(),
            serializers: entity_map.serializers(entity)?.clone(),
        })
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn primary_key_attribute(&self) -> &str {
        &self.primary_key_attribute
    }

    /// Attribute map -> storage row, without the primary key.
    pub fn to_row(&self, attributes: &Attributes) -> MapperResult<Row> {
        let mut row = Row::new();
        for (column, attribute) in self.columns.iter() {
            if attribute == self.primary_key_attribute {
                continue;
            }
            let Some(value) = attributes.get(attribute) else {
                continue;
            };
            row.insert(column.to_string(), self.serialize(column, value)?);
        }
        Ok(row)
    }

    /// Storage row -> attribute map; unmapped columns are dropped.
    pub fn from_row(&self, row: &Row) -> MapperResult<Attributes> {
        let mut attributes = Attributes::new();
        for (column, value) in row {
            let Some(attribute) = self.columns.attribute(column) else {
                continue;
            };
            attributes.insert(attribute.to_string(), self.deserialize(column, value)?);
        }
        Ok(attributes)
    }

    pub fn from_rows(&self, rows: &[Row]) -> MapperResult<Vec<Attributes>> {
        rows.iter().map(|row| self.from_row(row)).collect()
    }

    fn serialize(&self, column: &str, value: &Value) -> MapperResult<Value> {
        match (self.serializers.get(column), value) {
            (_, Value::Null) | (None, _) => Ok(value.clone()),
            (Some(ColumnSerializer::Json), value) => serde_json::to_string(value)
                .map(Value::String)
                .map_err(|err| MapperError::InvalidJson {
                    column: column.to_string(),
                    message: err.to_string(),
                }),
        }
    }

    fn deserialize(&self, column: &str, value: &Value) -> MapperResult<Value> {
        match (self.serializers.get(column), value) {
            (Some(ColumnSerializer::Json), Value::String(text)) => serde_json::from_str(text)
                .map_err(|err| MapperError::InvalidJson {
                    column: column.to_string(),
                    message: err.to_string(),
                }),
            _ => Ok(value.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Attributes, Mapper, MapperError, Row};
    use crate::config::{ColumnSerializer, EntityDefinition, EntityMap};
    use serde_json::{json, Value};

    fn as_map(value: Value) -> serde_json::Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    fn mapper() -> Mapper {
        let map = EntityMap::new()
            .with_entity(
                "User",
                EntityDefinition::new("users")
                    .column("id", "id")
                    .column("name", "name")
                    .column("date_create", "dateCreate")
                    .column("prefs", "preferences")
                    .serializer("prefs", ColumnSerializer::Json),
            )
            .unwrap();
        Mapper::new(&map, "User").unwrap()
    }

    #[test]
    fn to_row_renames_drops_pk_and_unmapped() {
        let attributes: Attributes = as_map(json!({
            "id": 7,
            "name": "Gosha",
            "dateCreate": "2015-10-30",
            "nickname": "g"
        }));
        let row = mapper().to_row(&attributes).unwrap();
        assert_eq!(
            Value::Object(row),
            json!({ "name": "Gosha", "date_create": "2015-10-30" })
        );
    }

    #[test]
    fn json_columns_round_trip() {
        let mapper = mapper();
        let attributes: Attributes = as_map(json!({
            "id": 3,
            "name": "Ann",
            "preferences": { "theme": "dark", "tabs": [1, 2] }
        }));
        let row = mapper.to_row(&attributes).unwrap();
        assert_eq!(row["prefs"], json!(r#"{"theme":"dark","tabs":[1,2]}"#));

        let restored = mapper.from_row(&row).unwrap();
        assert_eq!(
            Value::Object(restored),
            json!({ "name": "Ann", "preferences": { "theme": "dark", "tabs": [1, 2] } })
        );
    }

    #[test]
    fn from_row_rejects_malformed_json() {
        let row: Row = as_map(json!({ "id": 1, "prefs": "{not json" }));
        let err = mapper().from_row(&row).unwrap_err();
        assert!(matches!(err, MapperError::InvalidJson { column, .. } if column == "prefs"));
    }

    #[test]
    fn from_row_keeps_primary_key_and_nulls() {
        let row: Row = as_map(json!({ "id": 1, "name": null, "prefs": null, "extra": 5 }));
        let attributes = mapper().from_row(&row).unwrap();
        assert_eq!(
            Value::Object(attributes),
            json!({ "id": 1, "name": null, "preferences": null })
        );
    }
}
