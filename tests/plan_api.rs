use std::io::Write;
use std::process::Command;

use serde_json::json;
use tabplan::table::{describe_schema, table_from_json, table_to_json, ColumnKind};
use tabplan::{run_plan, run_plan_json, EngineConfig, Plan};

fn rentals_json() -> serde_json::Value {
    json!([
        {"City": "NYC", "Rent": 1000, "Listed": "2024-01-05", "Pets": true},
        {"City": "NYC", "Rent": 1200, "Listed": "2024-02-10", "Pets": false},
        {"City": "LA", "Rent": 900, "Listed": "2024-01-20", "Pets": null},
        {"City": "LA", "Rent": 950.5, "Listed": "2024-03-01"}
    ])
}

fn write_temp(v: &serde_json::Value) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(serde_json::to_string(v).unwrap().as_bytes()).unwrap();
    f
}

#[test]
fn loader_infers_column_kinds() {
    let df = table_from_json(&rentals_json()).unwrap();
    let schema = describe_schema(&df);
    assert_eq!(schema, vec![
        ("City".to_string(), ColumnKind::Text),
        ("Rent".to_string(), ColumnKind::Numeric),
        ("Listed".to_string(), ColumnKind::Datetime),
        ("Pets".to_string(), ColumnKind::Boolean),
    ]);
}

#[test]
fn file_round_trip_through_the_engine() {
    let file = write_temp(&rentals_json());
    let text = std::fs::read_to_string(file.path()).unwrap();
    let df = table_from_json(&serde_json::from_str(&text).unwrap()).unwrap();

    let plan = Plan::from_json_str(r#"{"task": "summarize", "group_by": "city", "aggregations": [{"func": "total", "col": "rent"}], "order_by": ["-rent_sum"]}"#).unwrap();
    let out = run_plan(&df, &plan).unwrap();
    let rows = table_to_json(out.table.as_ref().unwrap()).unwrap();
    assert_eq!(rows, json!([{"City": "NYC", "Rent_sum": 2200.0}, {"City": "LA", "Rent_sum": 1850.5}]));
}

#[test]
fn date_filters_work_on_loaded_datetimes() {
    let df = table_from_json(&rentals_json()).unwrap();
    let out = run_plan_json(&df, &json!({"task": "rows", "filters": [
        {"column": "listed", "op": "date_between", "value": ["2024-01-01", "2024-01-31"]}
    ]}), &EngineConfig::default()).unwrap();
    let rows = out.to_json().unwrap();
    assert_eq!(rows["rows"].as_array().unwrap().len(), 2);
    assert_eq!(rows["rows"][0]["Listed"], json!("2024-01-05"));
}

#[test]
fn invalid_plans_are_rejected_before_execution() {
    let df = table_from_json(&rentals_json()).unwrap();
    let err = run_plan_json(&df, &json!({"task": "rows", "filters": {"column": "City"}}), &EngineConfig::default()).unwrap_err();
    assert_eq!(err.code_str(), "invalid_filters");
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn cli_prints_json_and_fails_topk_without_rank_column() {
    let table = write_temp(&rentals_json());
    let good = write_temp(&json!({"task": "topk", "rankBy": "rent", "k": 2}));
    let out = Command::new(env!("CARGO_BIN_EXE_tabplan"))
        .arg(table.path()).arg(good.path()).arg("--json")
        .output().unwrap();
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["rows"][0]["Rent"], json!(1200.0));
    assert_eq!(v["rows"].as_array().unwrap().len(), 2);

    let bad = write_temp(&json!({"task": "topk", "k": 2}));
    let out = Command::new(env!("CARGO_BIN_EXE_tabplan"))
        .arg(table.path()).arg(bad.path())
        .output().unwrap();
    assert_eq!(out.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&out.stderr).contains("rank_by_not_found"));
}

#[test]
fn cli_reports_unreadable_table_as_io_failure() {
    let dir = tempfile::tempdir().unwrap();
    let plan = write_temp(&json!({"task": "rows"}));
    let out = Command::new(env!("CARGO_BIN_EXE_tabplan"))
        .arg(dir.path().join("missing.json")).arg(plan.path())
        .output().unwrap();
    assert_eq!(out.status.code(), Some(5));
    assert!(String::from_utf8_lossy(&out.stderr).contains("io_error"));
}
