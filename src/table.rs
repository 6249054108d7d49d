//! Table helpers: semantic column kinds, per-operator coercions and JSON conversion.
//!
//! A table is a polars [`DataFrame`]. Every stage reads cells as [`AnyValue`] and goes through
//! the coercion helpers here, so text, numeric and datetime semantics stay identical across
//! filtering, aggregation and ranking.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{AppError, AppResult};

/// Semantic type of a column, inferred from its polars dtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind { Numeric, Text, Datetime, Boolean }

impl ColumnKind {
    pub fn of(dtype: &DataType) -> Self {
        match dtype {
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
            | DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64
            | DataType::Float32 | DataType::Float64 | DataType::Decimal(..) => ColumnKind::Numeric,
            DataType::Date | DataType::Datetime(..) => ColumnKind::Datetime,
            DataType::Boolean => ColumnKind::Boolean,
            _ => ColumnKind::Text,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Numeric => "numeric",
            ColumnKind::Text => "text",
            ColumnKind::Datetime => "datetime",
            ColumnKind::Boolean => "boolean",
        }
    }
}

/// Column names with their semantic kinds, in table order.
pub fn describe_schema(df: &DataFrame) -> Vec<(String, ColumnKind)> {
    df.get_columns().iter().map(|c| (c.name().to_string(), ColumnKind::of(c.dtype()))).collect()
}

/// Render a float the way a person would type it: integral values drop the ".0".
pub fn format_number(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 { format!("{}", f as i64) } else { format!("{}", f) }
}

pub fn parse_number(s: &str) -> Option<f64> {
    let t = s.trim();
    if t.is_empty() { return None; }
    t.parse::<f64>().ok().filter(|f| f.is_finite())
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y", "%b %d, %Y", "%B %d, %Y", "%d %b %Y", "%d %B %Y"];

pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let t = s.trim();
    if t.is_empty() { return None; }
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) { return Some(dt.naive_utc()); }
    for f in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(t, f) { return Some(dt); }
    }
    for f in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(t, f) { return Some(d.and_time(NaiveTime::default())); }
    }
    None
}

pub fn format_datetime(dt: &NaiveDateTime) -> String {
    if dt.time() == NaiveTime::default() { dt.format("%Y-%m-%d").to_string() } else { dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string() }
}

fn datetime_from_parts(v: i64, unit: &TimeUnit) -> Option<NaiveDateTime> {
    let dt = match unit {
        TimeUnit::Nanoseconds => Some(DateTime::<Utc>::from_timestamp_nanos(v)),
        TimeUnit::Microseconds => DateTime::<Utc>::from_timestamp_micros(v),
        TimeUnit::Milliseconds => DateTime::<Utc>::from_timestamp_millis(v),
    };
    dt.map(|d| d.naive_utc())
}

/// Datetime coercion of a cell: temporal cells convert directly, text cells are parsed.
pub fn cell_datetime(av: &AnyValue) -> Option<NaiveDateTime> {
    match av {
        AnyValue::Date(days) => NaiveDate::from_num_days_from_ce_opt(*days + 719_163).map(|d| d.and_time(NaiveTime::default())),
        AnyValue::Datetime(v, unit, _) => datetime_from_parts(*v, unit),
        AnyValue::DatetimeOwned(v, unit, _) => datetime_from_parts(*v, unit),
        AnyValue::String(s) => parse_datetime(s),
        AnyValue::StringOwned(s) => parse_datetime(s.as_str()),
        _ => None,
    }
}

/// Numeric coercion of a cell. Temporal cells never coerce; NaN and infinities count as absent.
pub fn cell_number(av: &AnyValue) -> Option<f64> {
    match av {
        AnyValue::Null => None,
        AnyValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
        AnyValue::String(s) => parse_number(s),
        AnyValue::StringOwned(s) => parse_number(s.as_str()),
        AnyValue::Date(_) | AnyValue::Datetime(..) | AnyValue::DatetimeOwned(..) => None,
        other => other.try_extract::<f64>().ok().filter(|f| f.is_finite()),
    }
}

/// Text form of a cell, or `None` for nulls.
pub fn cell_text(av: &AnyValue) -> Option<String> {
    match av {
        AnyValue::Null => None,
        AnyValue::String(s) => Some(s.to_string()),
        AnyValue::StringOwned(s) => Some(s.to_string()),
        AnyValue::Boolean(b) => Some(b.to_string()),
        // Widen through the shortest f32 form so 0.1f32 reads as "0.1"
        AnyValue::Float32(f) => if f.is_nan() { None } else { Some(format_number(f.to_string().parse::<f64>().unwrap_or(*f as f64))) },
        AnyValue::Float64(f) => if f.is_nan() { None } else { Some(format_number(*f)) },
        AnyValue::Date(_) | AnyValue::Datetime(..) | AnyValue::DatetimeOwned(..) => cell_datetime(av).map(|d| format_datetime(&d)),
        other => Some(other.to_string()),
    }
}

/// Text form of a plan operand.
pub fn json_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(i.to_string()),
            None => n.as_f64().map(format_number),
        },
        other => Some(other.to_string()),
    }
}

pub fn json_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_number(s),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

pub fn json_datetime(v: &Value) -> Option<NaiveDateTime> {
    match v {
        Value::String(s) => parse_datetime(s),
        _ => None,
    }
}

fn cell_to_json(av: &AnyValue) -> Value {
    match av {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => json!(b),
        AnyValue::String(s) => json!(s),
        AnyValue::StringOwned(s) => json!(s.as_str()),
        AnyValue::Int8(v) => json!(v),
        AnyValue::Int16(v) => json!(v),
        AnyValue::Int32(v) => json!(v),
        AnyValue::Int64(v) => json!(v),
        AnyValue::UInt8(v) => json!(v),
        AnyValue::UInt16(v) => json!(v),
        AnyValue::UInt32(v) => json!(v),
        AnyValue::UInt64(v) => json!(v),
        // json! maps non-finite floats to null
        AnyValue::Float32(v) => json!(v),
        AnyValue::Float64(v) => json!(v),
        AnyValue::Date(_) | AnyValue::Datetime(..) | AnyValue::DatetimeOwned(..) => {
            cell_datetime(av).map(|d| json!(format_datetime(&d))).unwrap_or(Value::Null)
        }
        other => match cell_number(other) { Some(n) => json!(n), None => json!(other.to_string()) },
    }
}

/// Render a table as an array of row objects.
pub fn table_to_json(df: &DataFrame) -> AppResult<Value> {
    let cols = df.get_columns();
    let mut out = Vec::with_capacity(df.height());
    for row_idx in 0..df.height() {
        let mut map = serde_json::Map::with_capacity(cols.len());
        for c in cols {
            let av = c.get(row_idx)?;
            map.insert(c.name().to_string(), cell_to_json(&av));
        }
        out.push(Value::Object(map));
    }
    Ok(Value::Array(out))
}

fn column_from_cells(name: &str, cells: &[Option<&Value>]) -> AppResult<Column> {
    let present: Vec<&Value> = cells.iter().flatten().copied().collect();
    let series = if !present.is_empty() && present.iter().all(|v| v.is_boolean()) {
        Series::new(name.into(), cells.iter().map(|c| c.and_then(|v| v.as_bool())).collect::<Vec<Option<bool>>>())
    } else if !present.is_empty() && present.iter().all(|v| v.is_i64()) {
        Series::new(name.into(), cells.iter().map(|c| c.and_then(|v| v.as_i64())).collect::<Vec<Option<i64>>>())
    } else if !present.is_empty() && present.iter().all(|v| v.is_number()) {
        Series::new(name.into(), cells.iter().map(|c| c.and_then(|v| v.as_f64())).collect::<Vec<Option<f64>>>())
    } else if !present.is_empty() && present.iter().all(|v| json_datetime(v).is_some()) {
        let micros: Vec<Option<i64>> = cells.iter().map(|c| c.and_then(json_datetime).map(|d| d.and_utc().timestamp_micros())).collect();
        Series::new(name.into(), micros).cast(&DataType::Datetime(TimeUnit::Microseconds, None))?
    } else {
        Series::new(name.into(), cells.iter().map(|c| c.and_then(json_text)).collect::<Vec<Option<String>>>())
    };
    Ok(series.into())
}

/// Build a typed table from an array of row objects (or a single object as one row).
/// Columns follow first-seen key order; missing keys and JSON nulls become nulls.
pub fn table_from_json(j: &Value) -> AppResult<DataFrame> {
    let rows: Vec<&serde_json::Map<String, Value>> = match j {
        Value::Array(arr) => arr.iter().filter_map(|v| v.as_object()).collect(),
        Value::Object(m) => vec![m],
        _ => return Err(AppError::exec("invalid_table_json", "expected an array of row objects")),
    };
    let mut seen: HashSet<&str> = HashSet::new();
    let mut keys: Vec<&str> = Vec::new();
    for r in &rows {
        for k in r.keys() {
            if seen.insert(k.as_str()) { keys.push(k.as_str()); }
        }
    }
    debug!(target: "tabplan::table", keys=?keys, rows=rows.len(), "table_from_json: inferred columns");
    let mut cols: Vec<Column> = Vec::with_capacity(keys.len());
    for k in &keys {
        let cells: Vec<Option<&Value>> = rows.iter().map(|r| r.get(*k).filter(|v| !v.is_null())).collect();
        cols.push(column_from_cells(k, &cells)?);
    }
    Ok(DataFrame::new(cols)?)
}

/// Load a table from a JSON file holding an array of row objects.
pub fn load_table_file(path: &Path) -> AppResult<DataFrame> {
    let text = std::fs::read_to_string(path)?;
    let v: Value = serde_json::from_str(&text).with_context(|| format!("parsing table file {}", path.display()))?;
    let df = table_from_json(&v)?;
    debug!(target: "tabplan::table", path=%path.display(), rows=df.height(), cols=df.width(), "load_table_file");
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_from_dtypes() {
        assert_eq!(ColumnKind::of(&DataType::Int64), ColumnKind::Numeric);
        assert_eq!(ColumnKind::of(&DataType::Float32), ColumnKind::Numeric);
        assert_eq!(ColumnKind::of(&DataType::String), ColumnKind::Text);
        assert_eq!(ColumnKind::of(&DataType::Boolean), ColumnKind::Boolean);
        assert_eq!(ColumnKind::of(&DataType::Date), ColumnKind::Datetime);
        assert_eq!(ColumnKind::of(&DataType::Datetime(TimeUnit::Milliseconds, None)), ColumnKind::Datetime);
    }

    #[test]
    fn number_text_forms_agree() {
        assert_eq!(format_number(10.0), "10");
        assert_eq!(format_number(10.5), "10.5");
        assert_eq!(cell_text(&AnyValue::Float64(10.0)).as_deref(), Some("10"));
        assert_eq!(cell_text(&AnyValue::Int64(10)).as_deref(), Some("10"));
        assert_eq!(json_text(&json!(10)).as_deref(), Some("10"));
        assert_eq!(json_text(&json!(10.0)).as_deref(), Some("10"));
        assert_eq!(cell_text(&AnyValue::Null), None);
        assert_eq!(cell_text(&AnyValue::Float64(f64::NAN)), None);
        assert_eq!(cell_text(&AnyValue::Float32(0.1)).as_deref(), Some("0.1"));
        assert_eq!(cell_text(&AnyValue::Float32(3.0)).as_deref(), Some("3"));
    }

    #[test]
    fn numeric_coercion() {
        assert_eq!(cell_number(&AnyValue::String(" 12.5 ")), Some(12.5));
        assert_eq!(cell_number(&AnyValue::String("abc")), None);
        assert_eq!(cell_number(&AnyValue::Int32(4)), Some(4.0));
        assert_eq!(cell_number(&AnyValue::Boolean(true)), Some(1.0));
        assert_eq!(cell_number(&AnyValue::Float64(f64::NAN)), None);
        assert_eq!(cell_number(&AnyValue::Date(10)), None);
        assert_eq!(json_number(&json!("7")), Some(7.0));
        assert_eq!(json_number(&json!(null)), None);
    }

    #[test]
    fn datetime_coercion() {
        let d = parse_datetime("2024-03-05").unwrap();
        assert_eq!(format_datetime(&d), "2024-03-05");
        assert_eq!(parse_datetime("03/05/2024"), Some(d));
        assert_eq!(parse_datetime("2024-03-05T00:00:00Z"), Some(d));
        assert!(parse_datetime("not a date").is_none());
        // 2024-03-05 is 19787 days after the epoch
        assert_eq!(cell_datetime(&AnyValue::Date(19_787)), Some(d));
        let micros = d.and_utc().timestamp_micros();
        assert_eq!(cell_datetime(&AnyValue::Datetime(micros, TimeUnit::Microseconds, None)), Some(d));
    }

    #[test]
    fn json_round_trip_keeps_types() {
        let j = json!([
            {"city": "NYC", "rent": 1000, "ok": true, "moved": "2024-01-02"},
            {"city": "LA", "rent": 900.5, "ok": null},
            {"city": null, "rent": 1200, "ok": false, "moved": "2024-02-03"}
        ]);
        let df = table_from_json(&j).unwrap();
        assert_eq!(df.height(), 3);
        let names: Vec<String> = df.get_column_names().iter().map(|c| c.to_string()).collect();
        assert_eq!(names, vec!["city", "rent", "ok", "moved"]);
        let schema = describe_schema(&df);
        assert_eq!(schema[0].1, ColumnKind::Text);
        assert_eq!(schema[1].1, ColumnKind::Numeric);
        assert_eq!(schema[2].1, ColumnKind::Boolean);
        assert_eq!(schema[3].1, ColumnKind::Datetime);

        let out = table_to_json(&df).unwrap();
        assert_eq!(out[0]["city"], json!("NYC"));
        assert_eq!(out[1]["rent"], json!(900.5));
        assert_eq!(out[1]["ok"], Value::Null);
        assert_eq!(out[1]["moved"], Value::Null);
        assert_eq!(out[2]["city"], Value::Null);
        assert_eq!(out[2]["moved"], json!("2024-02-03"));
    }

    #[test]
    fn columns_follow_first_seen_key_order() {
        let df = table_from_json(&json!([{"zeta": 1, "alpha": "a"}, {"mid": true, "zeta": 2}])).unwrap();
        let names: Vec<String> = df.get_column_names().iter().map(|c| c.to_string()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn file_loader_maps_failures() {
        use std::io::Write;
        let dir = tempfile::tempdir().unwrap();
        let missing = load_table_file(&dir.path().join("absent.json")).unwrap_err();
        assert_eq!(missing.code_str(), "io_error");

        let bad_path = dir.path().join("bad.json");
        std::fs::File::create(&bad_path).unwrap().write_all(b"[{\"a\": 1,").unwrap();
        let bad = load_table_file(&bad_path).unwrap_err();
        assert_eq!(bad.code_str(), "exec_error");
        assert!(bad.message().starts_with("parsing table file"));

        let good_path = dir.path().join("good.json");
        std::fs::write(&good_path, r#"[{"b": 2, "a": "x"}]"#).unwrap();
        let df = load_table_file(&good_path).unwrap();
        assert_eq!(df.get_column_names().iter().map(|c| c.as_str()).collect::<Vec<_>>(), vec!["b", "a"]);
    }

    #[test]
    fn rejects_scalar_root() {
        assert!(table_from_json(&json!(42)).is_err());
        let empty = table_from_json(&json!([])).unwrap();
        assert_eq!(empty.width(), 0);
    }
}
