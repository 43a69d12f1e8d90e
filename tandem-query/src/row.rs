//! Fetched rows in driver-neutral form.

use std::sync::Arc;

use crate::error::{QueryError, QueryResult};
use crate::value::{FromValue, Value};

/// One result row. Column names are shared between the rows of a result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Create a row from shared column names and its values.
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Column names, in select order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values, in select order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of the named column.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    /// Value at the given position.
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Convert the named column into `T`.
    pub fn get_as<T: FromValue>(&self, column: &str) -> QueryResult<T> {
        let value = self.get(column).ok_or_else(|| {
            QueryError::deserialization(format!("column '{}' not present in row", column))
        })?;
        T::from_value(value.clone()).map_err(|e| {
            QueryError::deserialization(format!("column '{}': {}", column, e.message))
        })
    }

    /// Consume the row, returning its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Row {
        let columns: Arc<[String]> = vec!["id".to_string(), "name".to_string()].into();
        Row::new(columns, vec![Value::Int(1), Value::Text("ada".into())])
    }

    #[test]
    fn test_get_by_name() {
        let row = row();
        assert_eq!(row.get("id"), Some(&Value::Int(1)));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.get_as::<String>("name").unwrap(), "ada");
    }

    #[test]
    fn test_get_as_missing_column() {
        let err = row().get_as::<i64>("email").unwrap_err();
        assert!(err.message.contains("email"));
    }

    #[test]
    fn test_get_as_wrong_type() {
        let err = row().get_as::<i64>("name").unwrap_err();
        assert!(err.message.contains("name"));
    }
}
