//! Model metadata consumed by the dispatcher.
//!
//! A model maps one table. The coordination layer only needs the table name, the column
//! list, the primary key and how it is generated; [`impl_model!`](crate::impl_model) derives
//! all of it for a plain struct.
//!
//! ```rust
//! use tandem_query::{impl_model, Model, PrimaryKeyStrategy, Value};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct User {
//!     id: Option<i64>,
//!     username: String,
//! }
//!
//! impl_model!(User {
//!     table: "users",
//!     primary_key: id,
//!     strategy: ServerGenerated,
//!     fields: [username],
//! });
//!
//! assert_eq!(User::TABLE, "users");
//! assert_eq!(User::columns(), &["id", "username"]);
//! assert_eq!(User::PK_STRATEGY, PrimaryKeyStrategy::ServerGenerated);
//!
//! let user = User { id: None, username: "ada".into() };
//! assert_eq!(user.primary_key(), Value::Null);
//! ```

use crate::error::QueryResult;
use crate::row::Row;
use crate::value::Value;

/// How the primary key of a table is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryKeyStrategy {
    /// The server generates the key (serial, auto increment, rowid).
    ServerGenerated,
    /// The caller supplies the key.
    Supplied,
}

/// A struct mapped to one table.
pub trait Model: Sized + Send + Sync + 'static {
    /// Table name.
    const TABLE: &'static str;
    /// Primary key column.
    const PRIMARY_KEY: &'static str;
    /// Primary key generation strategy.
    const PK_STRATEGY: PrimaryKeyStrategy;

    /// All columns, primary key first.
    fn columns() -> &'static [&'static str];

    /// Build an instance from a fetched row.
    fn from_row(row: &Row) -> QueryResult<Self>;

    /// Column values in [`columns`](Model::columns) order.
    fn values(&self) -> Vec<Value>;

    /// Current primary key, `Value::Null` when not yet assigned.
    fn primary_key(&self) -> Value;

    /// Assign the primary key after an insert.
    fn set_primary_key(&mut self, value: Value) -> QueryResult<()>;
}

/// Implement [`Model`] for a struct whose fields are named after their columns.
#[macro_export]
macro_rules! impl_model {
    ($type:ident {
        table: $table:literal,
        primary_key: $pk:ident,
        strategy: $strategy:ident,
        fields: [$($field:ident),* $(,)?] $(,)?
    }) => {
        impl $crate::model::Model for $type {
            const TABLE: &'static str = $table;
            const PRIMARY_KEY: &'static str = stringify!($pk);
            const PK_STRATEGY: $crate::model::PrimaryKeyStrategy =
                $crate::model::PrimaryKeyStrategy::$strategy;

            fn columns() -> &'static [&'static str] {
                &[stringify!($pk), $(stringify!($field)),*]
            }

            fn from_row(row: &$crate::row::Row) -> $crate::error::QueryResult<Self> {
                Ok(Self {
                    $pk: row.get_as(stringify!($pk))?,
                    $($field: row.get_as(stringify!($field))?,)*
                })
            }

            fn values(&self) -> Vec<$crate::value::Value> {
                vec![
                    $crate::value::Value::from(self.$pk.clone()),
                    $($crate::value::Value::from(self.$field.clone())),*
                ]
            }

            fn primary_key(&self) -> $crate::value::Value {
                $crate::value::Value::from(self.$pk.clone())
            }

            fn set_primary_key(
                &mut self,
                value: $crate::value::Value,
            ) -> $crate::error::QueryResult<()> {
                self.$pk = $crate::value::FromValue::from_value(value)?;
                Ok(())
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::value::Value;

    #[derive(Debug, Clone, PartialEq)]
    struct Tag {
        id: Option<i64>,
        label: String,
        weight: Option<f64>,
    }

    crate::impl_model!(Tag {
        table: "tags",
        primary_key: id,
        strategy: ServerGenerated,
        fields: [label, weight],
    });

    #[test]
    fn test_columns_and_values() {
        assert_eq!(Tag::columns(), &["id", "label", "weight"]);
        let tag = Tag {
            id: None,
            label: "rust".into(),
            weight: Some(0.5),
        };
        assert_eq!(
            tag.values(),
            vec![Value::Null, Value::Text("rust".into()), Value::Float(0.5)]
        );
    }

    #[test]
    fn test_set_primary_key() {
        let mut tag = Tag {
            id: None,
            label: "a".into(),
            weight: None,
        };
        tag.set_primary_key(Value::Int(9)).unwrap();
        assert_eq!(tag.id, Some(9));
        assert_eq!(tag.primary_key(), Value::Int(9));
    }

    #[test]
    fn test_from_row() {
        let columns: Arc<[String]> =
            vec!["id".to_string(), "label".to_string(), "weight".to_string()].into();
        let row = Row::new(
            columns,
            vec![Value::Int(3), Value::Text("db".into()), Value::Null],
        );
        let tag = Tag::from_row(&row).unwrap();
        assert_eq!(
            tag,
            Tag {
                id: Some(3),
                label: "db".into(),
                weight: None
            }
        );
    }
}
