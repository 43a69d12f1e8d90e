//! Nested transaction state machine.
//!
//! Set `TANDEM_DEBUG=true` to see every transaction statement in the logs.
//!
//! A [`TransactionStack`] tracks the levels open on one connection. The first level is a
//! real transaction; every deeper level is a uniquely named savepoint:
//!
//! | depth | begin | commit | rollback |
//! |-------|-------|--------|----------|
//! | 1 | `BEGIN` | `COMMIT` | `ROLLBACK` |
//! | n > 1 | `SAVEPOINT s` | `RELEASE SAVEPOINT s` | `ROLLBACK TO SAVEPOINT s` |
//!
//! The stack only produces SQL; executing it is up to the caller, which pushes a prepared
//! record once its begin statements succeeded.
//!
//! ```rust
//! use tandem_query::{Dialect, TransactionConfig, TransactionStack};
//!
//! let mut stack = TransactionStack::new();
//! let outer = stack.prepare();
//! assert_eq!(outer.begin_statements(Dialect::Postgres, &TransactionConfig::new()), ["BEGIN"]);
//! stack.push(outer).unwrap();
//!
//! let inner = stack.prepare();
//! assert!(inner.begin_statements(Dialect::Postgres, &TransactionConfig::new())[0]
//!     .starts_with("SAVEPOINT tandem_"));
//! stack.push(inner).unwrap();
//! assert_eq!(stack.depth(), 2);
//!
//! let top = stack.pop().unwrap();
//! assert!(top.commit_statement().starts_with("RELEASE SAVEPOINT"));
//! ```

use tracing::debug;
use uuid::Uuid;

use crate::dialect::Dialect;
use crate::error::{QueryError, QueryResult};

/// Transaction isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    /// Read uncommitted - allows dirty reads.
    ReadUncommitted,
    /// Read committed - prevents dirty reads.
    ReadCommitted,
    /// Repeatable read - prevents non-repeatable reads.
    RepeatableRead,
    /// Serializable - highest isolation level.
    Serializable,
}

impl IsolationLevel {
    /// Get the SQL clause for this isolation level.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

/// Access mode for transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessMode {
    /// Read-write access (default).
    #[default]
    ReadWrite,
    /// Read-only access.
    ReadOnly,
}

/// Options applied when a top-level transaction begins. Savepoints ignore them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionConfig {
    /// Isolation level, `None` for the server default.
    pub isolation: Option<IsolationLevel>,
    /// Access mode.
    pub access_mode: AccessMode,
}

impl TransactionConfig {
    /// Create a new transaction config with server defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the isolation level.
    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = Some(level);
        self
    }

    /// Make the transaction read-only.
    pub fn read_only(mut self) -> Self {
        self.access_mode = AccessMode::ReadOnly;
        self
    }

    /// Statements opening a top-level transaction in `dialect`.
    pub fn begin_statements(&self, dialect: Dialect) -> Vec<String> {
        let read_only = self.access_mode == AccessMode::ReadOnly;
        match dialect {
            Dialect::Postgres => {
                let mut sql = String::from("BEGIN");
                if let Some(level) = self.isolation {
                    sql.push_str(" ISOLATION LEVEL ");
                    sql.push_str(level.as_sql());
                }
                if read_only {
                    sql.push_str(" READ ONLY");
                }
                vec![sql]
            }
            Dialect::Mysql => {
                let mut statements = Vec::with_capacity(2);
                if let Some(level) = self.isolation {
                    statements.push(format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_sql()));
                }
                statements.push(if read_only {
                    "START TRANSACTION READ ONLY".to_string()
                } else {
                    "BEGIN".to_string()
                });
                statements
            }
            // No isolation levels in SQLite; the write lock is taken at BEGIN.
            Dialect::Sqlite => match self.isolation {
                Some(IsolationLevel::Serializable) => vec!["BEGIN EXCLUSIVE".to_string()],
                _ => vec!["BEGIN IMMEDIATE".to_string()],
            },
        }
    }
}

/// Generate a savepoint name unique to this process.
pub fn savepoint_name() -> String {
    format!("tandem_{}", Uuid::new_v4().simple())
}

/// One open transaction level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    id: u64,
    depth: usize,
    savepoint: Option<String>,
}

impl TransactionRecord {
    /// Identifier unique within its stack.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 1 for the real transaction, 2 and up for savepoints.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Savepoint name for levels deeper than 1.
    pub fn savepoint(&self) -> Option<&str> {
        self.savepoint.as_deref()
    }

    /// Statements opening this level.
    pub fn begin_statements(&self, dialect: Dialect, config: &TransactionConfig) -> Vec<String> {
        let statements = match &self.savepoint {
            Some(name) => vec![format!("SAVEPOINT {}", name)],
            None => config.begin_statements(dialect),
        };
        debug!(depth = self.depth, statements = ?statements, "Transaction begin");
        statements
    }

    /// Statement committing this level.
    pub fn commit_statement(&self) -> String {
        match &self.savepoint {
            Some(name) => format!("RELEASE SAVEPOINT {}", name),
            None => "COMMIT".to_string(),
        }
    }

    /// Statement rolling back this level.
    pub fn rollback_statement(&self) -> String {
        match &self.savepoint {
            Some(name) => format!("ROLLBACK TO SAVEPOINT {}", name),
            None => "ROLLBACK".to_string(),
        }
    }
}

/// Stack of open levels on one connection.
#[derive(Debug, Default)]
pub struct TransactionStack {
    records: Vec<TransactionRecord>,
    next_id: u64,
}

impl TransactionStack {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open levels.
    pub fn depth(&self) -> usize {
        self.records.len()
    }

    /// Check if no transaction is open.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Innermost open level.
    pub fn top(&self) -> Option<&TransactionRecord> {
        self.records.last()
    }

    /// Check whether the level with `id` is still open.
    pub fn contains(&self, id: u64) -> bool {
        self.get(id).is_some()
    }

    /// The open level with `id`.
    pub fn get(&self, id: u64) -> Option<&TransactionRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Savepoint names of the open levels, outermost first.
    pub fn savepoints(&self) -> impl Iterator<Item = &str> {
        self.records.iter().filter_map(|r| r.savepoint())
    }

    /// Prepare the next level without opening it.
    pub fn prepare(&mut self) -> TransactionRecord {
        self.next_id += 1;
        let depth = self.records.len() + 1;
        TransactionRecord {
            id: self.next_id,
            depth,
            savepoint: (depth > 1).then(savepoint_name),
        }
    }

    /// Record a prepared level as open.
    ///
    /// Fails if another level was opened since the record was prepared.
    pub fn push(&mut self, record: TransactionRecord) -> QueryResult<()> {
        if record.depth != self.records.len() + 1 {
            return Err(QueryError::transaction_order(
                record.depth,
                self.records.len() + 1,
            ));
        }
        self.records.push(record);
        Ok(())
    }

    /// Close the innermost level.
    pub fn pop(&mut self) -> Option<TransactionRecord> {
        self.records.pop()
    }

    /// Close the level with `id` and every level nested inside it, innermost first.
    ///
    /// Returns nothing if that level is not open.
    pub fn pop_through(&mut self, id: u64) -> Vec<TransactionRecord> {
        match self.records.iter().position(|r| r.id == id) {
            Some(index) => self.records.drain(index..).rev().collect(),
            None => Vec::new(),
        }
    }

    /// Forget every open level, innermost first.
    pub fn clear(&mut self) -> Vec<TransactionRecord> {
        self.records.drain(..).rev().collect()
    }
}
