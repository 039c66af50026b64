use relmap_core::db::open_db_in_memory;
use relmap_core::repo::EntityChange;
use relmap_core::{
    AddOutcome, Attributes, Criteria, CriteriaFactory, Entity, EntityEvent, EntityFactory,
    EntityMap, EntityRepository, EventManager, Executor, Query, Record, RecordFactory, RepoError,
    RepoResult, Repository, Row, SqliteExecutor,
};
use rusqlite::{ffi, Connection};
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

const SCHEMA: &str = "
    CREATE TABLE tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER,
        title TEXT NOT NULL DEFAULT '',
        status INTEGER NOT NULL DEFAULT 0,
        tags TEXT
    );
";

fn criteria_factory() -> CriteriaFactory {
    CriteriaFactory::new(Arc::new(
        EntityMap::from_json_value(json!({
            "Task": {
                "table": "tasks",
                "columnsAsAttributesMap": {
                    "id": "id",
                    "user_id": "userId",
                    "title": "title",
                    "status": "status",
                    "tags": "tags"
                },
                "serialized": { "tags": "json" }
            }
        }))
        .unwrap(),
    ))
}

fn connection() -> Rc<Connection> {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    Rc::new(conn)
}

/// Repository whose events are appended, by topic, to the returned log.
fn record_repository(
    conn: Rc<Connection>,
) -> (
    Repository<Record>,
    Rc<EventManager<Record>>,
    Rc<RefCell<Vec<String>>>,
) {
    let events = Rc::new(EventManager::<Record>::new());
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    events.subscribe("*", move |topic, _| sink.borrow_mut().push(topic.to_string()));

    let repository = Repository::sqlite(
        "Task",
        criteria_factory(),
        conn,
        Box::new(RecordFactory),
        events.clone(),
    )
    .unwrap();
    (repository, events, seen)
}

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => Record::new(map),
        _ => panic!("record fixture must be an object"),
    }
}

fn filter(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("filter fixture must be an object"),
    }
}

fn seed(repository: &mut Repository<Record>, titles: &[&str]) {
    for (index, title) in titles.iter().enumerate() {
        repository
            .add(record(json!({ "title": title, "status": index as i64 % 2, "userId": 7 })))
            .unwrap();
    }
}

#[test]
fn insert_back_fills_id_and_fires_created_once() {
    let conn = connection();
    let (mut repository, _events, seen) = record_repository(conn.clone());

    let outcome = repository
        .add(record(json!({ "title": "write docs", "status": 1, "tags": ["a", "b"] })))
        .unwrap();
    let created = match outcome {
        AddOutcome::Created(entity) => entity,
        other => panic!("expected insert, got {other:?}"),
    };
    assert_eq!(created.get("id"), Some(&json!(1)));
    assert_eq!(*seen.borrow(), vec!["entity:Task:created"]);

    let stored_tags: String = conn
        .query_row("SELECT tags FROM tasks WHERE id = 1", [], |row| row.get(0))
        .unwrap();
    assert_eq!(stored_tags, r#"["a","b"]"#);
}

#[test]
fn caller_supplied_id_is_persisted() {
    let conn = connection();
    let (mut repository, _events, _seen) = record_repository(conn.clone());

    repository
        .add(record(json!({ "id": 42, "title": "pinned" })))
        .unwrap();
    let title: String = conn
        .query_row("SELECT title FROM tasks WHERE id = 42", [], |row| row.get(0))
        .unwrap();
    assert_eq!(title, "pinned");
    assert!(repository.identity_map().contains("42"));
}

#[test]
fn find_by_id_decodes_serialized_columns() {
    let conn = connection();
    let (mut repository, _events, _seen) = record_repository(conn);
    repository
        .add(record(json!({ "title": "tagged", "tags": { "color": "red" } })))
        .unwrap();

    let found = repository.find_by_id(&json!(1)).unwrap().unwrap();
    assert_eq!(found.get("title"), Some(&json!("tagged")));
    assert_eq!(found.get("tags"), Some(&json!({ "color": "red" })));
    assert_eq!(found.get("userId"), Some(&Value::Null));

    assert!(repository.find_by_id(&json!(99)).unwrap().is_none());
}

#[test]
fn unchanged_add_fires_no_events() {
    let conn = connection();
    let (mut repository, _events, seen) = record_repository(conn);
    seed(&mut repository, &["one"]);
    seen.borrow_mut().clear();

    let loaded = repository.find_by_id(&json!(1)).unwrap().unwrap();
    let outcome = repository.add(loaded).unwrap();
    assert!(matches!(outcome, AddOutcome::Unchanged(_)));
    assert!(seen.borrow().is_empty());
}

#[test]
fn update_fires_pre_changed_and_attribute_events_in_order() {
    let conn = connection();
    let (mut repository, events, seen) = record_repository(conn.clone());
    seed(&mut repository, &["one"]);
    seen.borrow_mut().clear();

    let changes = Rc::new(RefCell::new(Vec::new()));
    let changes_sink = Rc::clone(&changes);
    events.subscribe("entity:Task:changed", move |_, event| {
        if let EntityEvent::Changed(EntityChange {
            original,
            changed_attributes,
            ..
        }) = event
        {
            changes_sink
                .borrow_mut()
                .push((original.get("status").cloned(), changed_attributes.clone()));
        }
    });

    let mut loaded = repository.find_by_id(&json!(1)).unwrap().unwrap();
    loaded.set("status", 3).set("title", "renamed");
    let outcome = repository.add(loaded).unwrap();

    assert!(matches!(outcome, AddOutcome::Updated { affected: 1, .. }));
    assert_eq!(
        *seen.borrow(),
        vec![
            "entity:Task:changed:pre",
            "entity:Task:changed",
            "attribute:Task:title:changed",
            "attribute:Task:status:changed",
        ]
    );
    assert_eq!(
        *changes.borrow(),
        vec![(
            Some(json!(0)),
            vec!["title".to_string(), "status".to_string()]
        )]
    );

    let (title, status): (String, i64) = conn
        .query_row("SELECT title, status FROM tasks WHERE id = 1", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap();
    assert_eq!((title.as_str(), status), ("renamed", 3));
}

#[test]
fn snapshot_moves_after_successful_update() {
    let conn = connection();
    let (mut repository, _events, seen) = record_repository(conn);
    seed(&mut repository, &["one"]);

    let mut loaded = repository.find_by_id(&json!(1)).unwrap().unwrap();
    loaded.set("status", 5);
    let updated = repository.add(loaded).unwrap().into_entity();
    seen.borrow_mut().clear();

    let outcome = repository.add(updated).unwrap();
    assert!(matches!(outcome, AddOutcome::Unchanged(_)));
    assert!(seen.borrow().is_empty());
}

#[test]
fn remove_fires_deleted_even_when_nothing_matched() {
    let conn = connection();
    let (mut repository, _events, seen) = record_repository(conn);
    seed(&mut repository, &["one"]);
    seen.borrow_mut().clear();

    let loaded = repository.find_by_id(&json!(1)).unwrap().unwrap();
    assert_eq!(repository.remove(&loaded).unwrap(), Some(1));
    assert!(!repository.identity_map().contains("1"));
    assert_eq!(repository.remove(&loaded).unwrap(), Some(0));
    assert_eq!(
        *seen.borrow(),
        vec!["entity:Task:deleted", "entity:Task:deleted"]
    );

    let orphan = record(json!({ "title": "never stored" }));
    assert_eq!(repository.remove(&orphan).unwrap(), None);
    assert_eq!(seen.borrow().len(), 2);
}

#[test]
fn find_returns_first_match_only() {
    let conn = connection();
    let (mut repository, _events, _seen) = record_repository(conn);
    seed(&mut repository, &["a", "b", "c"]);

    let last = repository
        .find_by(&filter(json!({ "order": "id DESC", "limit": 10, "offset": 2 })))
        .unwrap()
        .unwrap();
    assert_eq!(last.get("title"), Some(&json!("c")));
}

#[test]
fn find_many_applies_filters_order_and_pagination() {
    let conn = connection();
    let (mut repository, _events, _seen) = record_repository(conn);
    seed(&mut repository, &["a", "b", "c", "d", "e"]);

    let page = repository
        .find_many_by(&filter(json!({ "order": "title DESC", "limit": 2, "page": 2 })))
        .unwrap();
    let titles: Vec<&Value> = page.iter().filter_map(|task| task.get("title")).collect();
    assert_eq!(titles, vec![&json!("c"), &json!("b")]);

    let open = repository
        .find_many_by(&filter(json!({ "status.equalTo": 1 })))
        .unwrap();
    assert_eq!(open.len(), 2);
}

#[test]
fn count_ignores_pagination() {
    let conn = connection();
    let (mut repository, _events, _seen) = record_repository(conn);
    seed(&mut repository, &["a", "b", "c", "d"]);

    assert_eq!(
        repository
            .count_by(&filter(json!({ "status.equalTo": 0, "limit": 1 })))
            .unwrap(),
        2
    );
    assert_eq!(repository.count_by(&filter(json!({}))).unwrap(), 4);
}

#[test]
fn unknown_attribute_and_foreign_criteria_are_rejected() {
    let conn = connection();
    let (mut repository, _events, _seen) = record_repository(conn);

    let err = repository
        .find_many_by(&filter(json!({ "email.equalTo": "a@b.c" })))
        .unwrap_err();
    assert!(matches!(err, RepoError::UnknownAttribute { .. }));

    let err = repository
        .find_many(&Criteria::new("User").unwrap())
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidArgument(_)));
}

#[test]
fn created_handler_may_substitute_the_entity() {
    let conn = connection();
    let (mut repository, events, _seen) = record_repository(conn);
    events.subscribe("entity:Task:created", |_, event| {
        if let EntityEvent::Created { entity } = event {
            entity.set("title", "stamped");
        }
    });

    let created = repository
        .add(record(json!({ "title": "raw" })))
        .unwrap()
        .into_entity();
    assert_eq!(created.get("title"), Some(&json!("stamped")));
}

#[test]
fn changed_handler_edits_are_not_kept() {
    let conn = connection();
    let (mut repository, events, _seen) = record_repository(conn.clone());
    seed(&mut repository, &["a"]);
    events.subscribe("entity:Task:changed", |_, event| {
        if let EntityEvent::Changed(change) = event {
            change.changed.set("title", "handler");
        }
    });

    let mut loaded = repository.find_by_id(&json!(1)).unwrap().unwrap();
    loaded.set("status", 9);
    let updated = repository.add(loaded).unwrap().into_entity();
    assert_eq!(updated.get("title"), Some(&json!("a")));
    assert_eq!(
        repository.identity_map().snapshot("1").unwrap().get("title"),
        Some(&json!("a"))
    );

    let title: String = conn
        .query_row("SELECT title FROM tasks WHERE id = 1", [], |row| row.get(0))
        .unwrap();
    assert_eq!(title, "a");

    let mut retitled = updated;
    retitled.set("title", "handler");
    assert!(matches!(
        repository.add(retitled).unwrap(),
        AddOutcome::Updated { affected: 1, .. }
    ));
}

/// SQLite executor whose writes fail while `fail_writes` is set.
struct FlakyExecutor {
    inner: SqliteExecutor,
    fail_writes: Rc<Cell<bool>>,
}

impl FlakyExecutor {
    fn disk_full() -> RepoError {
        rusqlite::Error::SqliteFailure(ffi::Error::new(ffi::SQLITE_FULL), None).into()
    }
}

impl Executor for FlakyExecutor {
    fn select_rows(&self, query: &Query) -> RepoResult<Vec<Row>> {
        self.inner.select_rows(query)
    }

    fn insert(&self, row: &Row) -> RepoResult<Value> {
        if self.fail_writes.get() {
            return Err(Self::disk_full());
        }
        self.inner.insert(row)
    }

    fn update(&self, row: &Row, id: &Value) -> RepoResult<usize> {
        if self.fail_writes.get() {
            return Err(Self::disk_full());
        }
        self.inner.update(row, id)
    }

    fn delete_by_id(&self, id: &Value) -> RepoResult<usize> {
        self.inner.delete_by_id(id)
    }
}

fn flaky_repository(
    conn: Rc<Connection>,
) -> (Repository<Record>, Rc<Cell<bool>>, Rc<RefCell<Vec<String>>>) {
    let events = Rc::new(EventManager::<Record>::new());
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    events.subscribe("*", move |topic, _| sink.borrow_mut().push(topic.to_string()));

    let fail_writes = Rc::new(Cell::new(false));
    let executor = FlakyExecutor {
        inner: SqliteExecutor::new(conn, "tasks", "id"),
        fail_writes: Rc::clone(&fail_writes),
    };
    let repository = Repository::new(
        "Task",
        criteria_factory(),
        Box::new(executor),
        Box::new(RecordFactory),
        events,
    )
    .unwrap();
    (repository, fail_writes, seen)
}

#[test]
fn failed_update_keeps_snapshot_and_stops_after_pre_event() {
    let (mut repository, fail_writes, seen) = flaky_repository(connection());
    repository.add(record(json!({ "title": "a" }))).unwrap();
    let loaded = repository.find_by_id(&json!(1)).unwrap().unwrap();
    seen.borrow_mut().clear();

    fail_writes.set(true);
    let mut edited = loaded.clone();
    edited.set("title", "b");
    assert!(matches!(repository.add(edited), Err(RepoError::Db(_))));

    assert_eq!(*seen.borrow(), vec!["entity:Task:changed:pre"]);
    assert_eq!(repository.identity_map().snapshot("1"), Some(&loaded));

    fail_writes.set(false);
    let mut edited = loaded;
    edited.set("title", "b");
    assert!(matches!(
        repository.add(edited).unwrap(),
        AddOutcome::Updated { affected: 1, .. }
    ));
}

#[test]
fn failed_insert_fires_nothing_and_tracks_nothing() {
    let (mut repository, fail_writes, seen) = flaky_repository(connection());
    fail_writes.set(true);

    let err = repository
        .add(record(json!({ "title": "lost" })))
        .unwrap_err();
    assert!(matches!(err, RepoError::Db(_)));
    assert!(seen.borrow().is_empty());
    assert!(repository.identity_map().is_empty());
    assert_eq!(repository.count_by(&filter(json!({}))).unwrap(), 0);
}

#[derive(Debug, Clone, PartialEq)]
struct Task {
    id: Option<i64>,
    title: String,
    done: bool,
}

impl Entity for Task {
    fn extract(&self) -> Attributes {
        let mut attributes = Attributes::new();
        if let Some(id) = self.id {
            attributes.insert("id".to_string(), json!(id));
        }
        attributes.insert("title".to_string(), json!(self.title));
        attributes.insert("status".to_string(), json!(i64::from(self.done)));
        attributes
    }

    fn populate(&mut self, attributes: &Attributes) {
        if let Some(id) = attributes.get("id").and_then(Value::as_i64) {
            self.id = Some(id);
        }
    }
}

struct TaskFactory;

impl EntityFactory<Task> for TaskFactory {
    fn create(&self, attributes: Attributes) -> RepoResult<Task> {
        let title = attributes
            .get("title")
            .and_then(Value::as_str)
            .ok_or_else(|| RepoError::InvalidData("task without title".to_string()))?;
        Ok(Task {
            id: attributes.get("id").and_then(Value::as_i64),
            title: title.to_string(),
            done: attributes.get("status").and_then(Value::as_i64) == Some(1),
        })
    }
}

#[test]
fn domain_entities_round_trip_through_the_factory() {
    let conn = connection();
    let events = Rc::new(EventManager::<Task>::new());
    let mut repository = Repository::sqlite(
        "Task",
        criteria_factory(),
        conn,
        Box::new(TaskFactory),
        events,
    )
    .unwrap();

    let created = repository
        .add(Task {
            id: None,
            title: "ship".to_string(),
            done: false,
        })
        .unwrap()
        .into_entity();
    assert_eq!(created.id, Some(1));

    let mut loaded = repository.find_by_id(&json!("1")).unwrap().unwrap();
    assert_eq!(loaded, created);
    loaded.done = true;
    let outcome = repository.add(loaded).unwrap();
    assert!(matches!(outcome, AddOutcome::Updated { affected: 1, .. }));

    let done = repository
        .find_many_by(&filter(json!({ "status.equalTo": 1 })))
        .unwrap();
    assert_eq!(done.len(), 1);
    assert!(done[0].done);
}

/// Builds records in one pass and counts the batches it was handed.
struct BatchFactory {
    batches: Rc<Cell<usize>>,
    drop_last: bool,
}

impl EntityFactory<Record> for BatchFactory {
    fn create(&self, attributes: Attributes) -> RepoResult<Record> {
        Ok(Record::new(attributes))
    }

    fn create_many(&self, rows: Vec<Attributes>) -> RepoResult<Vec<Record>> {
        self.batches.set(self.batches.get() + 1);
        let mut records: Vec<Record> = rows.into_iter().map(Record::new).collect();
        if self.drop_last {
            records.pop();
        }
        Ok(records)
    }
}

fn batch_repository(
    conn: Rc<Connection>,
    drop_last: bool,
) -> (Repository<Record>, Rc<Cell<usize>>) {
    let batches = Rc::new(Cell::new(0));
    let factory = BatchFactory {
        batches: Rc::clone(&batches),
        drop_last,
    };
    let repository = Repository::sqlite(
        "Task",
        criteria_factory(),
        conn,
        Box::new(factory),
        Rc::new(EventManager::<Record>::new()),
    )
    .unwrap();
    (repository, batches)
}

#[test]
fn reads_build_entities_in_one_batch() {
    let conn = connection();
    let (mut seeder, _, _) = record_repository(Rc::clone(&conn));
    seed(&mut seeder, &["a", "b", "c"]);

    let (mut repository, batches) = batch_repository(conn, false);
    let found = repository
        .find_many_by(&filter(json!({ "order": "id" })))
        .unwrap();
    assert_eq!(found.len(), 3);
    assert_eq!(batches.get(), 1);
    assert_eq!(repository.identity_map().snapshot("3"), Some(&found[2]));
}

#[test]
fn factory_dropping_rows_is_invalid_data() {
    let conn = connection();
    let (mut seeder, _, _) = record_repository(Rc::clone(&conn));
    seed(&mut seeder, &["a", "b"]);

    let (mut repository, _) = batch_repository(conn, true);
    let err = repository.find_many_by(&filter(json!({}))).unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(_)));
    assert!(repository.identity_map().is_empty());
}
