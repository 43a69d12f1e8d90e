//! Integration tests for blocking access outside the runtime.

mod common;

use pretty_assertions::assert_eq;
use tandem::prelude::*;
use tandem::ErrorCode;

fn database(mode: SyncMode) -> (Database, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::config(&dir, 2);
    config.sync_mode = mode;
    (Database::new(config).unwrap(), dir)
}

#[test]
fn test_sync_allowed_opens_its_own_connection() {
    let (db, _dir) = database(SyncMode::Allowed);
    db.execute_sync(&Query::raw("CREATE TABLE t (v INTEGER)", vec![]))
        .unwrap();
    let outcome = db
        .execute_sync(&Query::raw("INSERT INTO t (v) VALUES (?), (?)", vec![Value::Int(1), Value::Int(2)]))
        .unwrap();
    assert_eq!(outcome.rows_affected, 2);

    let outcome = db.execute_sync(&Query::raw("SELECT v FROM t", vec![])).unwrap();
    assert_eq!(outcome.rows.len(), 2);
    assert!(!db.is_connected());
}

#[test]
fn test_sync_forbidden_fails_fast() {
    let (db, _dir) = database(SyncMode::Forbidden);
    let err = db.execute_sync(&Query::raw("SELECT 1", vec![])).unwrap_err();
    assert_eq!(err.code, ErrorCode::SyncNotAllowed);
    assert!(err.is_misuse());

    {
        let _allowed = db.allow_sync();
        assert!(db.execute_sync(&Query::raw("SELECT 1", vec![])).is_ok());
    }
    assert_eq!(db.sync_mode(), SyncMode::Forbidden);
}

#[test]
fn test_sync_logged_modes_still_run() {
    common::init_tracing();
    for mode in [SyncMode::Warn, SyncMode::Error] {
        let (db, _dir) = database(mode);
        assert!(db.execute_sync(&Query::raw("SELECT 1", vec![])).is_ok());
    }
}

#[tokio::test]
async fn test_sync_inside_runtime_is_rejected() {
    let db = common::sqlite_db(1).await;
    let err = db.execute_sync(&Query::raw("SELECT 1", vec![])).unwrap_err();
    assert_eq!(err.code, ErrorCode::BlockingInAsync);
}
