//! Parameter binding and row decoding for the SQLx backends.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArgumentBuffer, PgRow, PgTypeInfo, Postgres};
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tandem_query::{Row, Value};
use uuid::Uuid;

use crate::error::{SqlxError, SqlxResult};

/// NULL with no declared type, leaving the server to infer it from context.
#[derive(Debug, Clone, Copy)]
pub struct UntypedNull;

impl sqlx::Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl sqlx::Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>;
type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

/// Bind `params` to a PostgreSQL query in order.
pub fn bind_postgres<'q>(sql: &'q str, params: &[Value]) -> PgQuery<'q> {
    params.iter().fold(sqlx::query(sql), |query, value| match value {
        Value::Null => query.bind(UntypedNull),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.clone()),
        Value::Bytes(b) => query.bind(b.clone()),
        Value::Json(j) => query.bind(j.clone()),
        Value::Timestamp(ts) => query.bind(*ts),
        Value::Uuid(u) => query.bind(*u),
    })
}

/// Bind `params` to a SQLite query in order.
///
/// SQLite has no JSON or UUID storage class; both are bound as text.
pub fn bind_sqlite<'q>(sql: &'q str, params: &[Value]) -> SqliteQuery<'q> {
    params.iter().fold(sqlx::query(sql), |query, value| match value {
        Value::Null => query.bind(None::<i64>),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.clone()),
        Value::Bytes(b) => query.bind(b.clone()),
        Value::Json(j) => query.bind(j.to_string()),
        Value::Timestamp(ts) => query.bind(*ts),
        Value::Uuid(u) => query.bind(u.to_string()),
    })
}

fn column_names<R: sqlx::Row>(row: &R) -> Arc<[String]> {
    row.columns().iter().map(|c| c.name().to_string()).collect()
}

fn decode_failed(column: &str, err: sqlx::Error) -> SqlxError {
    SqlxError::deserialization(format!("column {:?}: {}", column, err))
}

/// Decode PostgreSQL rows by each column's declared type.
pub fn decode_postgres(rows: &[PgRow]) -> SqlxResult<Vec<Row>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let columns = column_names(first);
    rows.iter()
        .map(|row| {
            let values = (0..row.len())
                .map(|i| decode_pg_column(row, i))
                .collect::<SqlxResult<Vec<_>>>()?;
            Ok(Row::new(columns.clone(), values))
        })
        .collect()
}

fn decode_pg_column(row: &PgRow, index: usize) -> SqlxResult<Value> {
    let column = &row.columns()[index];
    let name = column.name();
    let failed = |e| decode_failed(name, e);
    let value = match column.type_info().name() {
        "BOOL" => row.try_get::<Option<bool>, _>(index).map_err(failed)?.map(Value::Bool),
        "INT2" => row
            .try_get::<Option<i16>, _>(index)
            .map_err(failed)?
            .map(|v| Value::Int(v.into())),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)
            .map_err(failed)?
            .map(|v| Value::Int(v.into())),
        "INT8" => row.try_get::<Option<i64>, _>(index).map_err(failed)?.map(Value::Int),
        "OID" => row
            .try_get::<Option<Oid>, _>(index)
            .map_err(failed)?
            .map(|v| Value::Int(v.0.into())),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)
            .map_err(failed)?
            .map(|v| Value::Float(v.into())),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index).map_err(failed)?.map(Value::Float),
        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" | "UNKNOWN" => row
            .try_get::<Option<String>, _>(index)
            .map_err(failed)?
            .map(Value::Text),
        "BYTEA" => row.try_get::<Option<Vec<u8>>, _>(index).map_err(failed)?.map(Value::Bytes),
        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(index)
            .map_err(failed)?
            .map(Value::Json),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)
            .map_err(failed)?
            .map(Value::Timestamp),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)
            .map_err(failed)?
            .map(|v| Value::Timestamp(v.naive_utc())),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(index)
            .map_err(failed)?
            .map(|v| Value::Timestamp(v.and_time(NaiveTime::MIN))),
        "UUID" => row.try_get::<Option<Uuid>, _>(index).map_err(failed)?.map(Value::Uuid),
        other => {
            return Err(SqlxError::deserialization(format!(
                "column {:?} has unsupported type {}",
                name, other
            )));
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Decode SQLite rows by each value's runtime storage class.
pub fn decode_sqlite(rows: &[SqliteRow]) -> SqlxResult<Vec<Row>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let columns = column_names(first);
    rows.iter()
        .map(|row| {
            let values = (0..row.len())
                .map(|i| decode_sqlite_column(row, i))
                .collect::<SqlxResult<Vec<_>>>()?;
            Ok(Row::new(columns.clone(), values))
        })
        .collect()
}

fn decode_sqlite_column(row: &SqliteRow, index: usize) -> SqlxResult<Value> {
    let name = row.columns()[index].name();
    let failed = |e| decode_failed(name, e);
    let raw = row.try_get_raw(index).map_err(failed)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let storage = raw.type_info().name().to_string();
    let value = match storage.as_str() {
        "INTEGER" => Value::Int(row.try_get_unchecked::<i64, _>(index).map_err(failed)?),
        "REAL" => Value::Float(row.try_get_unchecked::<f64, _>(index).map_err(failed)?),
        "BLOB" => Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(index).map_err(failed)?),
        _ => Value::Text(row.try_get_unchecked::<String, _>(index).map_err(failed)?),
    };
    Ok(value)
}
