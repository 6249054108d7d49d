use polars::prelude::*;
use serde_json::Value;

use crate::exec::{run_plan, PlanOutcome};
use crate::plan::Plan;

/// The three-row table used throughout: city, rent.
pub fn city_rent() -> DataFrame {
    DataFrame::new(vec![
        Series::new("city".into(), &["NYC", "NYC", "LA"]).into(),
        Series::new("rent".into(), &[1000i64, 1200, 900]).into(),
    ]).unwrap()
}

/// Mixed-type listings with nulls, text-encoded numbers and dates.
pub fn listings() -> DataFrame {
    DataFrame::new(vec![
        Series::new("unit_size".into(), &[Some("studio"), Some("1br"), None, Some("1br"), Some("2br"), None]).into(),
        Series::new("Monthly Rent".into(), &[Some(1500.0), Some(2100.0), Some(1800.0), None, Some(3200.0), Some(1750.0)]).into(),
        Series::new("beds".into(), &[Some("0"), Some("1"), Some("n/a"), Some("1"), Some("2"), Some(" 1 ")]).into(),
        Series::new("listed".into(), &["2024-01-03", "2024-01-20", "2024-02-11", "01/25/2024", "2024-03-01", "someday"]).into(),
        Series::new("furnished".into(), &[true, false, false, true, false, true]).into(),
    ]).unwrap()
}

pub fn plan(v: Value) -> Plan {
    Plan::from_value(&v).unwrap()
}

pub fn run(df: &DataFrame, v: Value) -> PlanOutcome {
    run_plan(df, &plan(v)).unwrap()
}

pub fn strs(df: &DataFrame, name: &str) -> Vec<Option<String>> {
    let c = df.column(name).unwrap();
    (0..c.len()).map(|i| crate::table::cell_text(&c.get(i).unwrap())).collect()
}

pub fn f64s(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
    let c = df.column(name).unwrap();
    (0..c.len()).map(|i| crate::table::cell_number(&c.get(i).unwrap())).collect()
}

pub fn names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|s| s.to_string()).collect()
}
