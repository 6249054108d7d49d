use polars::prelude::*;
use serde_json::json;

use super::fixtures::{city_rent, f64s, listings, plan, run, strs};
use crate::error::AppError;
use crate::exec::run_plan;

#[test]
fn ranks_descending_with_nulls_last() {
    let df = listings();
    let out = run(&df, json!({"task": "topk", "rankBy": "monthly_rent"}));
    let t = out.table.unwrap();
    assert_eq!(f64s(&t, "Monthly Rent"), vec![Some(3200.0), Some(2100.0), Some(1800.0), Some(1750.0), Some(1500.0), None]);
}

#[test]
fn k_caps_rows_and_filters_run_first() {
    let df = listings();
    let out = run(&df, json!({"task": "top_k", "rank_by": "Monthly Rent", "k": 2,
        "filters": [{"column": "furnished", "op": "eq", "value": "true"}]}));
    let t = out.table.unwrap();
    assert_eq!(strs(&t, "unit_size"), vec![None, Some("studio".into())]);
}

#[test]
fn limit_also_caps_topk() {
    let df = city_rent();
    let out = run(&df, json!({"task": "topk", "rankBy": "rent", "k": 3, "limit": 1}));
    assert_eq!(out.row_count(), 1);
}

#[test]
fn explicit_sort_reorders_the_top_rows() {
    let df = city_rent();
    let out = run(&df, json!({"task": "topk", "rankBy": "rent", "k": 2, "sort": [{"column": "rent", "direction": "asc"}]}));
    let t = out.table.unwrap();
    assert_eq!(f64s(&t, "rent"), vec![Some(1000.0), Some(1200.0)]);
}

#[test]
fn missing_or_unknown_rank_column_fails() {
    let df = city_rent();
    for p in [json!({"task": "topk", "k": 1}), json!({"task": "rank", "rankBy": "price"}), json!({"task": "topk", "rankBy": "  "})] {
        let err = run_plan(&df, &plan(p)).unwrap_err();
        assert!(matches!(err, AppError::ColumnNotFound { .. }));
        assert_eq!(err.code_str(), "rank_by_not_found");
    }
}

#[test]
fn zero_column_table_still_fails_topk() {
    let df = DataFrame::empty();
    let err = run_plan(&df, &plan(json!({"task": "topk", "rankBy": "rent"}))).unwrap_err();
    assert_eq!(err.code_str(), "rank_by_not_found");
}
