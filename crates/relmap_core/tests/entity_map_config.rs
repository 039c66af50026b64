use relmap_core::config::ColumnSerializer;
use relmap_core::{ConfigError, EntityMap, Relation};
use std::fs;
use tempfile::TempDir;

const ENTITY_MAP: &str = r#"{
    "Task": {
        "table": "tasks",
        "primaryKey": "task_id",
        "columnsAsAttributesMap": {
            "task_id": "id",
            "assignee_id": "assigneeId",
            "labels": "labels"
        },
        "relations": {
            "User": ["tasks.assignee_id", "users.id"],
            "Tag": ["tasks_tags", "task_id", "tag_id"]
        },
        "aliasMap": { "mine": "assigneeId.equalTo" },
        "serialized": { "labels": "json" }
    },
    "User": {
        "table": "users",
        "columns": { "id": "id", "name": "name" }
    }
}"#;

#[test]
fn loads_entity_map_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("entity_map.json");
    fs::write(&path, ENTITY_MAP).unwrap();

    let map = EntityMap::from_path(&path).unwrap();
    assert_eq!(map.len(), 2);
    assert_eq!(map.table("Task").unwrap(), "tasks");
    assert_eq!(map.primary_key("Task").unwrap(), "task_id");
    assert_eq!(map.primary_key_attribute("Task").unwrap(), "id");
    assert_eq!(map.primary_key("User").unwrap(), "id");
    assert_eq!(map.column("Task", "assigneeId").unwrap(), "assignee_id");
    assert_eq!(map.attribute("User", "name").unwrap(), "name");
    assert_eq!(
        map.alias_map("Task").unwrap().get("mine").map(String::as_str),
        Some("assigneeId.equalTo")
    );
    assert_eq!(
        map.serializers("Task").unwrap().get("labels"),
        Some(&ColumnSerializer::Json)
    );
}

#[test]
fn relations_are_direct_or_link_table() {
    let map = EntityMap::from_json_str(ENTITY_MAP).unwrap();

    assert_eq!(
        map.relation("Task", "User").unwrap(),
        &Relation::Direct {
            local: "tasks.assignee_id".to_string(),
            foreign: "users.id".to_string(),
        }
    );
    assert!(!map.is_many_to_many("Task", "User").unwrap());
    assert!(map.is_many_to_many("Task", "Tag").unwrap());
    assert_eq!(
        map.many_to_many_parts("Task", "Tag").unwrap(),
        ("tasks_tags", "task_id", "tag_id")
    );
    assert!(matches!(
        map.many_to_many_parts("Task", "User"),
        Err(ConfigError::NotManyToMany { .. })
    ));
    assert!(matches!(
        map.relation("User", "Task"),
        Err(ConfigError::UnknownRelation { .. })
    ));
}

#[test]
fn lookups_fail_with_configuration_errors() {
    let map = EntityMap::from_json_str(ENTITY_MAP).unwrap();
    assert_eq!(
        map.table("Project"),
        Err(ConfigError::EntityNotConfigured("Project".to_string()))
    );
    assert!(matches!(
        map.column("Task", "title"),
        Err(ConfigError::UnknownAttribute { .. })
    ));
}

#[test]
fn missing_file_reports_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.json");
    match EntityMap::from_path(&path) {
        Err(ConfigError::Io { path: reported, .. }) => {
            assert!(reported.ends_with("absent.json"));
        }
        other => panic!("expected io error, got {other:?}"),
    }
}

#[test]
fn malformed_definitions_are_rejected() {
    assert!(matches!(
        EntityMap::from_json_str("{ not json"),
        Err(ConfigError::Parse(_))
    ));
    assert!(matches!(
        EntityMap::from_json_str(r#"{ "Task": { "columns": { "id": "id" } } }"#),
        Err(ConfigError::MissingTable(_))
    ));
    assert!(matches!(
        EntityMap::from_json_str(
            r#"{ "Task": { "table": "tasks", "relations": { "User": ["tasks.user_id"] } } }"#
        ),
        Err(ConfigError::InvalidRelation { parts: 1, .. })
    ));
    assert!(matches!(
        EntityMap::from_json_str(
            r#"{ "Task": { "table": "tasks", "columns": { "a": "x", "b": "x" } } }"#
        ),
        Err(ConfigError::DuplicateAttribute { .. })
    ));
    assert!(matches!(
        EntityMap::from_json_str(
            r#"{ "Task": { "table": "tasks", "columns": { "meta": "meta" }, "serialized": { "meta": "php" } } }"#
        ),
        Err(ConfigError::UnsupportedSerializer { .. })
    ));
}
