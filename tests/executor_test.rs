mod common;

use bindery::prelude::*;
use common::{MockStore, Step, row};

const USERS_SQL: &str = "SELECT id, name FROM users";

fn users_store() -> MockStore {
    MockStore::new().respond(
        USERS_SQL,
        &["id", "name"],
        vec![row(&["1", "ann"]), row(&["2", "bob"])],
    )
}

#[test]
fn test_read_builds_records_in_column_order() {
    let mut driver = StoreDriver::new(users_store());
    let records = driver.execute_read(USERS_SQL, &[]).unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].columns().collect::<Vec<_>>(), vec!["id", "name"]);
    assert_eq!(records[1].get("name"), Some(&Value::from("bob")));
    assert_eq!(driver.client().prepared, vec![USERS_SQL]);
    assert_eq!(driver.client().closed, 1);
    assert_eq!(driver.client().open_statements(), 0);
}

#[test]
fn test_read_without_params_skips_bind() {
    let mut driver = StoreDriver::new(users_store());
    driver.execute_read(USERS_SQL, &[]).unwrap();
    assert!(driver.client().binds.is_empty());
}

#[test]
fn test_read_binds_params_in_order() {
    let sql = "SELECT * FROM t WHERE `a` IN (?, ?)";
    let store = MockStore::new().respond(sql, &["a"], vec![row(&["x"])]);
    let mut driver = StoreDriver::new(store);
    let params = vec![Param::text("x"), Param::text("y")];

    driver.execute_read(sql, &params).unwrap();
    assert_eq!(driver.client().binds, vec![params]);
}

#[test]
fn test_write_always_binds() {
    let mut driver = StoreDriver::new(MockStore::new().affected(4));
    let outcome = driver.execute_write("DELETE FROM sessions", &[], false).unwrap();

    assert_eq!(outcome, WriteOutcome::AffectedRows(4));
    assert_eq!(driver.client().binds, vec![Vec::<Param>::new()]);
    assert_eq!(driver.client().closed, 1);
}

#[test]
fn test_write_returns_generated_id() {
    let mut driver = StoreDriver::new(MockStore::new().affected(1).generated_id(42));
    assert!(driver.supports_last_insert_id());

    let outcome = driver
        .execute_write("INSERT INTO t (a) VALUES (?)", &[Param::text("v")], true)
        .unwrap();
    assert_eq!(outcome, WriteOutcome::GeneratedId(42));
    assert_eq!(driver.client().closed, 1);
}

#[test]
fn test_generated_id_without_capability_fails() {
    let mut driver = StoreDriver::new(MockStore::new().affected(1));
    assert!(!driver.supports_last_insert_id());

    let err = driver
        .execute_write("INSERT INTO t (a) VALUES (?)", &[Param::text("v")], true)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Execute);
    assert_eq!(driver.client().closed, 1);
}

#[test]
fn test_prepare_failure() {
    let mut driver = StoreDriver::new(MockStore::new().fail_at(Step::Prepare, "You have an error in your SQL syntax"));
    let err = driver.execute_read("SELEC oops", &[]).unwrap_err();

    assert_eq!(err.kind, ErrorKind::Prepare);
    assert_eq!(err.to_string(), "You have an error in your SQL syntax");
    assert_eq!(driver.last_error(), Some(&err));
    assert_eq!(driver.client().closed, 0);
}

#[test]
fn test_read_failures_close_handle_once() {
    let cases = [
        (Step::Bind, ErrorKind::Bind),
        (Step::Execute, ErrorKind::Execute),
        (Step::StoreResult, ErrorKind::Execute),
        (Step::Metadata, ErrorKind::Metadata),
        (Step::Fetch, ErrorKind::Metadata),
    ];

    for (step, kind) in cases {
        let sql = "SELECT * FROM t WHERE `a` >= ?";
        let store = MockStore::new()
            .respond(sql, &["a"], vec![row(&["5"])])
            .fail_at(step, "server went away");
        let mut driver = StoreDriver::new(store);

        let err = driver.execute_read(sql, &[Param::text("1")]).unwrap_err();
        assert_eq!(err.kind, kind, "step {:?}", step);
        assert!(!err.message.is_empty());
        assert_eq!(driver.client().closed, 1, "step {:?}", step);
        assert!(!driver.client().double_closed);
        assert_eq!(driver.client().open_statements(), 0);
    }
}

#[test]
fn test_write_failures_close_handle_once() {
    for step in [Step::Bind, Step::Execute] {
        let mut driver = StoreDriver::new(MockStore::new().fail_at(step, "Duplicate entry '1' for key 'PRIMARY'"));
        let err = driver
            .execute_write("INSERT INTO t (id) VALUES (?)", &[Param::text("1")], false)
            .unwrap_err();
        assert!(err.message.starts_with("Duplicate entry"));
        assert_eq!(driver.client().closed, 1);
    }
}

#[test]
fn test_bind_count_mismatch_is_bind_error() {
    let mut driver = StoreDriver::new(MockStore::new());
    let err = driver
        .execute_read("SELECT * FROM t WHERE a = ? AND b = ?", &[Param::text("1")])
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Bind);
    assert_eq!(driver.client().closed, 1);
}

#[test]
fn test_empty_store_message_gets_generic_text() {
    let mut driver = StoreDriver::new(MockStore::new().fail_at(Step::Execute, ""));
    let err = driver.execute_write("UPDATE t SET a = 1", &[], false).unwrap_err();
    assert_eq!(err.to_string(), "execute failed");
}

#[test]
fn test_query_on_error_appends_sql() {
    let store = MockStore::new().fail_at(Step::Execute, "Table 'db.t' doesn't exist");
    let mut driver = StoreDriver::new(store).query_on_error(true);

    let err = driver.execute_read("SELECT * FROM t", &[]).unwrap_err();
    assert_eq!(err.sql.as_deref(), Some("SELECT * FROM t"));
    assert_eq!(err.to_string(), "Table 'db.t' doesn't exist: SELECT * FROM t");
}

#[test]
fn test_driver_usable_after_failure() {
    let mut driver = StoreDriver::new(users_store().fail_at(Step::Execute, "lost connection"));
    assert!(driver.execute_read(USERS_SQL, &[]).is_err());
    assert!(driver.last_error().is_some());

    driver.client_mut().clear_failure();
    let records = driver.execute_read(USERS_SQL, &[]).unwrap();
    assert_eq!(records.len(), 2);
    assert!(driver.last_error().is_none());
}

#[test]
fn test_read_is_idempotent() {
    let mut driver = StoreDriver::new(users_store());
    let first = driver.execute_read(USERS_SQL, &[]).unwrap();
    let second = driver.execute_read(USERS_SQL, &[]).unwrap();
    assert_eq!(first, second);
    assert_eq!(driver.client().closed, 2);
}

#[test]
fn test_row_width_mismatch_is_metadata_error() {
    let store = MockStore::new().respond(USERS_SQL, &["id", "name"], vec![row(&["1"])]);
    let mut driver = StoreDriver::new(store);
    let err = driver.execute_read(USERS_SQL, &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Metadata);
    assert_eq!(driver.client().closed, 1);
}
