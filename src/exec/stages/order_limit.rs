//! SORT and LIMIT stages over a stage result.
//!
//! Sort keys resolve against the result table, so aggregate output names such as `rent_mean`
//! are sortable. A key naming an input column that only survives as a single `{column}_...`
//! metric column sorts by that metric. Unresolvable keys are dropped.

use polars::prelude::*;
use tracing::debug;

use crate::data_context::{DataContext, PlanStage};
use crate::error::AppResult;
use crate::ident::AliasMap;
use crate::plan::{SortDirection, SortKey};

/// Result column for a sort key, if one can be found.
fn resolve_sort_column(result: &AliasMap, key: &str, ctx: &DataContext) -> Option<String> {
    if let Some(real) = result.lookup(key) {
        return Some(real.to_string());
    }
    let source = ctx.resolve_column(key)?;
    let prefix = format!("{}_", source);
    let mut hits = result.columns().iter().filter(|c| c.starts_with(&prefix));
    match (hits.next(), hits.next()) {
        (Some(only), None) => Some(only.clone()),
        _ => None,
    }
}

/// Stable multi-key sort; nulls go last in either direction.
pub fn sort(df: DataFrame, keys: &[SortKey], ctx: &mut DataContext) -> AppResult<DataFrame> {
    if keys.is_empty() { return Ok(df); }
    let result_aliases = AliasMap::from_df(&df);
    let mut descending: Vec<bool> = Vec::new();
    let mut used: Vec<String> = Vec::new();
    for key in keys {
        let Some(name) = resolve_sort_column(&result_aliases, &key.column, ctx) else {
            ctx.note_dropped(PlanStage::Sort, format!("sort key '{}' (not in result)", key.column));
            continue;
        };
        if used.contains(&name) { continue; }
        descending.push(key.direction == SortDirection::Desc);
        used.push(name);
    }
    if used.is_empty() || df.height() < 2 { return Ok(df); }
    // Eager sort by name: `col()` would expand `*` and `^...$` names as selectors
    let by: Vec<&str> = used.iter().map(|s| s.as_str()).collect();
    let nulls_last: Vec<bool> = vec![true; by.len()];
    let opts = SortMultipleOptions { descending, nulls_last, maintain_order: true, multithreaded: true, limit: None };
    let out = df.sort(by, opts)?;
    debug!(target: "tabplan::exec", "sort: by {:?}", used);
    Ok(out)
}

/// Truncate to the first `limit` rows; a limit past the end is a no-op.
pub fn limit(df: DataFrame, limit: usize) -> DataFrame {
    if limit >= df.height() { df } else { df.slice(0, limit) }
}
