//! PROJECT stage for list_rows: keep the requested columns, all rows, original order.

use polars::prelude::*;
use tracing::debug;

use crate::data_context::{DataContext, PlanStage};
use crate::error::AppResult;

/// Select the resolvable `columns`; when none resolve (or none were asked for) keep every column.
pub fn project(df: &DataFrame, columns: &[String], ctx: &mut DataContext) -> AppResult<(String, DataFrame)> {
    let mut keep: Vec<String> = Vec::new();
    for c in columns {
        match ctx.resolve_column(c) {
            Some(real) if !keep.contains(&real) => keep.push(real),
            Some(_) => {}
            None => ctx.note_dropped(PlanStage::Project, format!("column '{}' (no such column)", c)),
        }
    }
    let out = if keep.is_empty() { df.clone() } else { df.select(keep.iter().cloned())? };
    debug!(target: "tabplan::exec", "project: {} of {} column(s), {} row(s)", out.width(), df.width(), out.height());
    let msg = format!("Listed {} matching row(s) with {} column(s)", out.height(), out.width());
    Ok((msg, out))
}
