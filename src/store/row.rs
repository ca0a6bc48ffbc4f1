/// Schema-less row decoding for callers that don't have a row struct (the CLI).

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::{postgres::PgRow, Column, FromRow, Row, TypeInfo};
use uuid::Uuid;

use crate::score::SCORE_ALIAS;

/// Every column of a row as JSON, keyed by column name. The score column is
/// left out; it travels on `ScoredRow` instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DynamicRow(pub Map<String, Value>);

impl DynamicRow {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }
}

impl<'r> FromRow<'r, PgRow> for DynamicRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let mut values = Map::new();
        for column in row.columns() {
            if column.name() == SCORE_ALIAS {
                continue;
            }
            let idx = column.ordinal();
            let value = match column.type_info().name() {
                "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" | "citext" => {
                    row.try_get::<Option<String>, _>(idx)?.map(Value::from)
                }
                "INT2" => row.try_get::<Option<i16>, _>(idx)?.map(Value::from),
                "INT4" => row.try_get::<Option<i32>, _>(idx)?.map(Value::from),
                "INT8" => row.try_get::<Option<i64>, _>(idx)?.map(Value::from),
                "FLOAT4" => row.try_get::<Option<f32>, _>(idx)?.map(Value::from),
                "FLOAT8" => row.try_get::<Option<f64>, _>(idx)?.map(Value::from),
                "BOOL" => row.try_get::<Option<bool>, _>(idx)?.map(Value::from),
                "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(idx)?,
                "UUID" => row
                    .try_get::<Option<Uuid>, _>(idx)?
                    .map(|u| Value::from(u.to_string())),
                "TIMESTAMPTZ" => row
                    .try_get::<Option<DateTime<Utc>>, _>(idx)?
                    .map(|t| Value::from(t.to_rfc3339())),
                "TIMESTAMP" => row
                    .try_get::<Option<NaiveDateTime>, _>(idx)?
                    .map(|t| Value::from(t.to_string())),
                "DATE" => row
                    .try_get::<Option<NaiveDate>, _>(idx)?
                    .map(|d| Value::from(d.to_string())),
                other => Some(Value::from(format!("<{}>", other.to_lowercase()))),
            };
            values.insert(column.name().to_string(), value.unwrap_or(Value::Null));
        }
        Ok(DynamicRow(values))
    }
}
