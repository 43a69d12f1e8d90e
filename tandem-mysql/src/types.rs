//! Conversions between [`Value`] and `mysql_async` values.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Timelike};
use mysql_async::consts::ColumnType;
use tandem_query::{Row, Value};

use crate::error::{MysqlError, MysqlResult};

/// Convert a parameter to its MySQL representation.
///
/// Booleans become integers and UUIDs their hyphenated text, matching how MySQL stores them.
pub fn to_mysql(value: &Value) -> mysql_async::Value {
    match value {
        Value::Null => mysql_async::Value::NULL,
        Value::Bool(b) => mysql_async::Value::Int(i64::from(*b)),
        Value::Int(i) => mysql_async::Value::Int(*i),
        Value::Float(f) => mysql_async::Value::Double(*f),
        Value::Text(s) => mysql_async::Value::Bytes(s.clone().into_bytes()),
        Value::Bytes(b) => mysql_async::Value::Bytes(b.clone()),
        Value::Json(j) => mysql_async::Value::Bytes(j.to_string().into_bytes()),
        Value::Timestamp(ts) => mysql_async::Value::Date(
            ts.year() as u16,
            ts.month() as u8,
            ts.day() as u8,
            ts.hour() as u8,
            ts.minute() as u8,
            ts.second() as u8,
            ts.nanosecond() / 1_000,
        ),
        Value::Uuid(u) => mysql_async::Value::Bytes(u.to_string().into_bytes()),
    }
}

/// Convert parameters into positional MySQL params.
pub fn to_params(values: &[Value]) -> mysql_async::Params {
    if values.is_empty() {
        mysql_async::Params::Empty
    } else {
        mysql_async::Params::Positional(values.iter().map(to_mysql).collect())
    }
}

/// Convert a fetched value, using the column type to recognize JSON.
pub fn from_mysql(value: &mysql_async::Value, column_type: ColumnType) -> MysqlResult<Value> {
    let converted = match value {
        mysql_async::Value::NULL => Value::Null,
        mysql_async::Value::Int(i) => Value::Int(*i),
        mysql_async::Value::UInt(u) => Value::Int(i64::try_from(*u).map_err(|_| {
            MysqlError::deserialization(format!("unsigned value {} exceeds i64", u))
        })?),
        mysql_async::Value::Float(f) => Value::Float(f64::from(*f)),
        mysql_async::Value::Double(d) => Value::Float(*d),
        mysql_async::Value::Bytes(bytes) => match column_type {
            ColumnType::MYSQL_TYPE_JSON => serde_json::from_slice(bytes)
                .map(Value::Json)
                .map_err(|e| MysqlError::deserialization(format!("invalid JSON column: {}", e)))?,
            _ => match std::str::from_utf8(bytes) {
                Ok(text) => Value::Text(text.to_string()),
                Err(_) => Value::Bytes(bytes.clone()),
            },
        },
        mysql_async::Value::Date(year, month, day, hour, minute, second, micros) => {
            NaiveDate::from_ymd_opt(i32::from(*year), u32::from(*month), u32::from(*day))
                .and_then(|date| {
                    date.and_hms_micro_opt(
                        u32::from(*hour),
                        u32::from(*minute),
                        u32::from(*second),
                        *micros,
                    )
                })
                .map(Value::Timestamp)
                .unwrap_or(Value::Null)
        }
        mysql_async::Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let total_hours = u64::from(*days) * 24 + u64::from(*hours);
            Value::Text(format!(
                "{}{:02}:{:02}:{:02}.{:06}",
                if *negative { "-" } else { "" },
                total_hours,
                minutes,
                seconds,
                micros
            ))
        }
    };
    Ok(converted)
}

/// Decode rows, sharing one column list between them.
pub fn decode_rows(rows: &[mysql_async::Row]) -> MysqlResult<Vec<Row>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let columns_ref = first.columns_ref();
    let columns: Arc<[String]> = columns_ref
        .iter()
        .map(|c| c.name_str().into_owned())
        .collect();
    let types: Vec<ColumnType> = columns_ref.iter().map(|c| c.column_type()).collect();

    rows.iter()
        .map(|row| {
            let values = types
                .iter()
                .enumerate()
                .map(|(i, ty)| match row.as_ref(i) {
                    Some(value) => from_mysql(value, *ty),
                    None => Ok(Value::Null),
                })
                .collect::<MysqlResult<Vec<_>>>()?;
            Ok(Row::new(columns.clone(), values))
        })
        .collect()
}
