//! Conversions between [`Value`] and PostgreSQL wire types.
//!
//! Parameters are converted against the types the server inferred when the statement
//! was prepared, so an `i64` bound to an `INT4` column is narrowed rather than rejected.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tandem_query::{Row, Value};
use tokio_postgres::types::{ToSql, Type};
use uuid::Uuid;

use crate::error::{PgError, PgResult};

/// Boxed parameter ready to bind.
pub type PgParam = Box<dyn ToSql + Sync + Send>;

/// Convert `values` to parameters matching the prepared statement's `types`.
pub fn encode_params(values: &[Value], types: &[Type]) -> PgResult<Vec<PgParam>> {
    if values.len() != types.len() {
        return Err(PgError::type_conversion(format!(
            "statement expects {} parameters, got {}",
            types.len(),
            values.len()
        )));
    }
    values
        .iter()
        .zip(types)
        .map(|(value, ty)| encode(value, ty))
        .collect()
}

/// Convert one value for a parameter of type `ty`.
pub fn encode(value: &Value, ty: &Type) -> PgResult<PgParam> {
    let param: PgParam = match value {
        Value::Null => typed_null(ty),
        Value::Bool(b) => match *ty {
            Type::INT2 | Type::INT4 | Type::INT8 => encode(&Value::Int(i64::from(*b)), ty)?,
            _ => Box::new(*b),
        },
        Value::Int(i) => encode_int(*i, ty)?,
        Value::Float(f) => match *ty {
            Type::FLOAT4 => Box::new(*f as f32),
            Type::TEXT | Type::VARCHAR => Box::new(f.to_string()),
            _ => Box::new(*f),
        },
        Value::Text(s) => encode_text(s, ty)?,
        Value::Bytes(b) => Box::new(b.clone()),
        Value::Json(j) => match *ty {
            Type::TEXT | Type::VARCHAR => Box::new(j.to_string()),
            _ => Box::new(j.clone()),
        },
        Value::Timestamp(ts) => match *ty {
            Type::TIMESTAMPTZ => Box::new(DateTime::<Utc>::from_naive_utc_and_offset(*ts, Utc)),
            Type::DATE => Box::new(ts.date()),
            Type::TEXT | Type::VARCHAR => Box::new(ts.to_string()),
            _ => Box::new(*ts),
        },
        Value::Uuid(u) => match *ty {
            Type::TEXT | Type::VARCHAR => Box::new(u.to_string()),
            _ => Box::new(*u),
        },
    };
    Ok(param)
}

fn encode_int(i: i64, ty: &Type) -> PgResult<PgParam> {
    let out_of_range = || PgError::type_conversion(format!("{} out of range for {}", i, ty));
    let param: PgParam = match *ty {
        Type::INT2 => Box::new(i16::try_from(i).map_err(|_| out_of_range())?),
        Type::INT4 => Box::new(i32::try_from(i).map_err(|_| out_of_range())?),
        Type::OID => Box::new(u32::try_from(i).map_err(|_| out_of_range())?),
        Type::FLOAT4 => Box::new(i as f32),
        Type::FLOAT8 => Box::new(i as f64),
        Type::BOOL => Box::new(i != 0),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR => Box::new(i.to_string()),
        _ => Box::new(i),
    };
    Ok(param)
}

fn encode_text(s: &str, ty: &Type) -> PgResult<PgParam> {
    let invalid = |e: &dyn std::fmt::Display| {
        PgError::type_conversion(format!("cannot bind {:?} as {}: {}", s, ty, e))
    };
    let param: PgParam = match *ty {
        Type::UUID => Box::new(Uuid::parse_str(s).map_err(|e| invalid(&e))?),
        Type::JSON | Type::JSONB => {
            Box::new(serde_json::from_str::<serde_json::Value>(s).map_err(|e| invalid(&e))?)
        }
        Type::TIMESTAMP => Box::new(parse_timestamp(s).map_err(|e| invalid(&e))?),
        Type::TIMESTAMPTZ => Box::new(
            s.parse::<DateTime<Utc>>()
                .or_else(|_| parse_timestamp(s).map(|ts| ts.and_utc()))
                .map_err(|e| invalid(&e))?,
        ),
        Type::DATE => Box::new(s.parse::<NaiveDate>().map_err(|e| invalid(&e))?),
        Type::INT2 | Type::INT4 | Type::INT8 => {
            let i = s.parse::<i64>().map_err(|e| invalid(&e))?;
            encode_int(i, ty)?
        }
        _ => Box::new(s.to_string()),
    };
    Ok(param)
}

fn parse_timestamp(s: &str) -> chrono::ParseResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
}

/// A NULL typed so that the driver accepts it for `ty`.
fn typed_null(ty: &Type) -> PgParam {
    match *ty {
        Type::BOOL => Box::new(None::<bool>),
        Type::INT2 => Box::new(None::<i16>),
        Type::INT4 => Box::new(None::<i32>),
        Type::INT8 => Box::new(None::<i64>),
        Type::OID => Box::new(None::<u32>),
        Type::FLOAT4 => Box::new(None::<f32>),
        Type::FLOAT8 => Box::new(None::<f64>),
        Type::BYTEA => Box::new(None::<Vec<u8>>),
        Type::JSON | Type::JSONB => Box::new(None::<serde_json::Value>),
        Type::TIMESTAMP => Box::new(None::<NaiveDateTime>),
        Type::TIMESTAMPTZ => Box::new(None::<DateTime<Utc>>),
        Type::DATE => Box::new(None::<NaiveDate>),
        Type::TIME => Box::new(None::<NaiveTime>),
        Type::UUID => Box::new(None::<Uuid>),
        _ => Box::new(None::<String>),
    }
}

/// Borrow boxed parameters in the form `tokio-postgres` expects.
pub fn as_refs(params: &[PgParam]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|p| p.as_ref() as &(dyn ToSql + Sync))
        .collect()
}

/// Decode fetched rows, sharing one column list between them.
pub fn decode_rows(rows: &[tokio_postgres::Row]) -> PgResult<Vec<Row>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let columns: Arc<[String]> = first
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    rows.iter()
        .map(|row| {
            let values = (0..row.len())
                .map(|i| decode_column(row, i))
                .collect::<PgResult<Vec<_>>>()?;
            Ok(Row::new(columns.clone(), values))
        })
        .collect()
}

fn decode_column(row: &tokio_postgres::Row, index: usize) -> PgResult<Value> {
    let column = &row.columns()[index];
    let ty = column.type_();
    let failed = |e: tokio_postgres::Error| {
        PgError::deserialization(format!("column {:?}: {}", column.name(), e))
    };
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(index).map_err(failed)?.map(Value::Bool),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(index)
            .map_err(failed)?
            .map(|v| Value::Int(v.into())),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(index)
            .map_err(failed)?
            .map(|v| Value::Int(v.into())),
        Type::INT8 => row.try_get::<_, Option<i64>>(index).map_err(failed)?.map(Value::Int),
        Type::OID => row
            .try_get::<_, Option<u32>>(index)
            .map_err(failed)?
            .map(|v| Value::Int(v.into())),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(index)
            .map_err(failed)?
            .map(|v| Value::Float(v.into())),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(index).map_err(failed)?.map(Value::Float),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => row
            .try_get::<_, Option<String>>(index)
            .map_err(failed)?
            .map(Value::Text),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(index).map_err(failed)?.map(Value::Bytes),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(index)
            .map_err(failed)?
            .map(Value::Json),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(index)
            .map_err(failed)?
            .map(Value::Timestamp),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(index)
            .map_err(failed)?
            .map(|v| Value::Timestamp(v.naive_utc())),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(index)
            .map_err(failed)?
            .map(|v| Value::Timestamp(v.and_time(NaiveTime::MIN))),
        Type::UUID => row.try_get::<_, Option<Uuid>>(index).map_err(failed)?.map(Value::Uuid),
        _ => {
            return Err(PgError::deserialization(format!(
                "column {:?} has unsupported type {}",
                column.name(),
                ty
            )));
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_params_arity() {
        let err = encode_params(&[Value::Int(1)], &[Type::INT4, Type::TEXT]);
        assert!(matches!(err, Err(PgError::TypeConversion(_))));
    }

    #[test]
    fn test_encode_int_narrowing() {
        assert!(encode(&Value::Int(7), &Type::INT2).is_ok());
        assert!(encode(&Value::Int(i64::from(i32::MAX) + 1), &Type::INT4).is_err());
        assert!(encode(&Value::Int(-1), &Type::OID).is_err());
    }

    #[test]
    fn test_encode_text_for_typed_columns() {
        assert!(encode(&Value::from("6f2b3c2e-0f4e-4a8e-9c59-1f1c2b1f7a10"), &Type::UUID).is_ok());
        assert!(encode(&Value::from("not-a-uuid"), &Type::UUID).is_err());
        assert!(encode(&Value::from("{\"a\":1}"), &Type::JSONB).is_ok());
        assert!(encode(&Value::from("2024-03-01 12:30:00"), &Type::TIMESTAMP).is_ok());
        assert!(encode(&Value::from("42"), &Type::INT8).is_ok());
    }

    #[test]
    fn test_null_accepted_for_any_type() {
        for ty in [Type::INT4, Type::UUID, Type::JSONB, Type::TEXT, Type::TIMESTAMPTZ] {
            let param = encode(&Value::Null, &ty).unwrap();
            assert!(param.to_sql_checked(&ty, &mut Default::default()).is_ok());
        }
    }

    #[test]
    fn test_decode_no_rows() {
        assert!(decode_rows(&[]).unwrap().is_empty());
    }
}
