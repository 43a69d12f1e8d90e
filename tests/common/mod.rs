//! Shared fixtures: a file-backed SQLite database in a temporary directory.

#![allow(dead_code)]

use std::time::Duration;

use tandem::prelude::*;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: Option<i64>,
    pub name: String,
    pub value: String,
}

impl_model!(Item {
    table: "items",
    primary_key: id,
    strategy: ServerGenerated,
    fields: [name, value],
});

impl Item {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// A database that lives as long as its temporary directory.
pub struct TestDb {
    pub db: Database,
    _dir: TempDir,
}

impl std::ops::Deref for TestDb {
    type Target = Database;

    fn deref(&self) -> &Database {
        &self.db
    }
}

pub fn config(dir: &TempDir, max_connections: usize) -> DatabaseConfig {
    let path = dir.path().join("test.db");
    DatabaseConfig::builder(Driver::Sqlite)
        .database(path.to_string_lossy())
        .max_connections(max_connections)
        .connect_timeout(Duration::from_secs(5))
        .build()
}

pub fn init_tracing() {
    tandem::logging::init();
    let _ = tracing_subscriber::fmt()
        .with_env_filter("tandem=debug")
        .with_test_writer()
        .try_init();
}

/// Connected database with an `items` table.
pub async fn sqlite_db(max_connections: usize) -> TestDb {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(config(&dir, max_connections)).unwrap();
    db.connect().await.unwrap();
    db.execute(&Query::raw(
        "CREATE TABLE items (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL UNIQUE, value TEXT NOT NULL)",
        vec![],
    ))
    .await
    .unwrap();
    TestDb { db, _dir: dir }
}

pub async fn count_items(db: &Database) -> u64 {
    db.count(&Select::<Item>::new()).await.unwrap()
}
