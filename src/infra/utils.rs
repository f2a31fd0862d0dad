use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde_json::{json, Value};
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::{Column, Row, TypeInfo};

/// 值的文本形式；NULL 返回 `None`
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// 解析日期文本，兼容 `YYYY-MM-DD HH:MM:SS` 这类带时间的写法
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    let head = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// 按列顺序把 Postgres 行转换成 JSON 值
pub fn pg_row_values(row: &PgRow) -> Vec<Value> {
    row.columns()
        .iter()
        .map(|col| {
            let idx = col.ordinal();
            // 获取数据库原生类型名，如 "INT4", "NUMERIC"
            match col.type_info().name() {
                "INT2" => json!(row.try_get::<Option<i16>, _>(idx).unwrap_or(None)),
                "INT4" => json!(row.try_get::<Option<i32>, _>(idx).unwrap_or(None)),
                "INT8" => json!(row.try_get::<Option<i64>, _>(idx).unwrap_or(None)),
                "FLOAT4" => json!(row.try_get::<Option<f32>, _>(idx).unwrap_or(None)),
                "FLOAT8" => json!(row.try_get::<Option<f64>, _>(idx).unwrap_or(None)),
                "NUMERIC" => {
                    let v: Option<rust_decimal::Decimal> = row.try_get(idx).unwrap_or(None);
                    json!(v.and_then(|d| d.to_f64()))
                }
                "BOOL" => json!(row.try_get::<Option<bool>, _>(idx).unwrap_or(None)),
                "DATE" => {
                    let v: Option<NaiveDate> = row.try_get(idx).unwrap_or(None);
                    json!(v.map(|d| d.to_string()))
                }
                "TIME" => {
                    let v: Option<NaiveTime> = row.try_get(idx).unwrap_or(None);
                    json!(v.map(|t| t.to_string()))
                }
                "TIMESTAMP" => {
                    let v: Option<NaiveDateTime> = row.try_get(idx).unwrap_or(None);
                    json!(v.map(|dt| dt.to_string()))
                }
                "TIMESTAMPTZ" => {
                    let v: Option<DateTime<Utc>> = row.try_get(idx).unwrap_or(None);
                    json!(v.map(|dt| dt.to_rfc3339()))
                }
                "UUID" => {
                    let v: Option<uuid::Uuid> = row.try_get(idx).unwrap_or(None);
                    json!(v.map(|u| u.to_string()))
                }
                "JSON" | "JSONB" => {
                    let v: Option<Value> = row.try_get(idx).unwrap_or(None);
                    v.unwrap_or(Value::Null)
                }
                // TEXT / VARCHAR / BPCHAR / NAME 以及未知类型都尝试按字符串读取
                _ => json!(row.try_get::<Option<String>, _>(idx).unwrap_or(None)),
            }
        })
        .collect()
}

/// 按列顺序把 MySQL 行转换成 JSON 值
pub fn mysql_row_values(row: &MySqlRow) -> Vec<Value> {
    row.columns()
        .iter()
        .map(|col| {
            let idx = col.ordinal();
            match col.type_info().name() {
                "BOOLEAN" => json!(row.try_get::<Option<bool>, _>(idx).unwrap_or(None)),
                "TINYINT" => json!(row.try_get::<Option<i8>, _>(idx).unwrap_or(None)),
                "SMALLINT" => json!(row.try_get::<Option<i16>, _>(idx).unwrap_or(None)),
                "INT" | "MEDIUMINT" => json!(row.try_get::<Option<i32>, _>(idx).unwrap_or(None)),
                "BIGINT" => json!(row.try_get::<Option<i64>, _>(idx).unwrap_or(None)),
                "TINYINT UNSIGNED" => json!(row.try_get::<Option<u8>, _>(idx).unwrap_or(None)),
                "SMALLINT UNSIGNED" => json!(row.try_get::<Option<u16>, _>(idx).unwrap_or(None)),
                "INT UNSIGNED" | "MEDIUMINT UNSIGNED" => {
                    json!(row.try_get::<Option<u32>, _>(idx).unwrap_or(None))
                }
                "BIGINT UNSIGNED" | "BIT" => json!(row.try_get::<Option<u64>, _>(idx).unwrap_or(None)),
                "FLOAT" => json!(row.try_get::<Option<f32>, _>(idx).unwrap_or(None)),
                "DOUBLE" => json!(row.try_get::<Option<f64>, _>(idx).unwrap_or(None)),
                "DECIMAL" => {
                    let v: Option<rust_decimal::Decimal> = row.try_get(idx).unwrap_or(None);
                    json!(v.and_then(|d| d.to_f64()))
                }
                "DATE" => {
                    let v: Option<NaiveDate> = row.try_get(idx).unwrap_or(None);
                    json!(v.map(|d| d.to_string()))
                }
                "TIME" => {
                    let v: Option<NaiveTime> = row.try_get(idx).unwrap_or(None);
                    json!(v.map(|t| t.to_string()))
                }
                "DATETIME" => {
                    let v: Option<NaiveDateTime> = row.try_get(idx).unwrap_or(None);
                    json!(v.map(|dt| dt.to_string()))
                }
                "TIMESTAMP" => {
                    let v: Option<DateTime<Utc>> = row.try_get(idx).unwrap_or(None);
                    json!(v.map(|dt| dt.to_rfc3339()))
                }
                "JSON" => {
                    let v: Option<Value> = row.try_get(idx).unwrap_or(None);
                    v.unwrap_or(Value::Null)
                }
                _ => json!(row.try_get::<Option<String>, _>(idx).unwrap_or(None)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_form_of_values() {
        assert_eq!(value_text(&json!(null)), None);
        assert_eq!(value_text(&json!("Paid")), Some("Paid".into()));
        assert_eq!(value_text(&json!(3.5)), Some("3.5".into()));
        assert_eq!(value_text(&json!(42)), Some("42".into()));
        assert_eq!(value_text(&json!(true)), Some("true".into()));
    }

    #[test]
    fn dates_parse_with_or_without_time() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(parse_date("2024-03-09"), Some(d));
        assert_eq!(parse_date("2024-03-09 14:30:00"), Some(d));
        assert_eq!(parse_date("09/03/2024"), None);
        assert_eq!(parse_date("soon"), None);
    }
}
