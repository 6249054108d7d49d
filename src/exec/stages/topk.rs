//! TOPK stage: highest `k` rows by a ranking column.
//!
//! Ranking uses numeric coercion; cells that do not coerce sort after every number. Ties keep
//! their filtered-table order. A missing or unresolvable ranking column is a hard error.

use polars::prelude::*;
use tracing::debug;

use crate::data_context::{DataContext, PlanStage};
use crate::error::AppResult;
use crate::table::cell_number;

pub fn topk(df: &DataFrame, rank_by: Option<&str>, k: usize, ctx: &mut DataContext) -> AppResult<(String, DataFrame)> {
    let requested = rank_by.map(str::trim).unwrap_or_default();
    let Some(rank_col) = (if requested.is_empty() { None } else { ctx.resolve_column(requested) }) else {
        return Err(DataContext::column_not_found_error("rank_by_not_found", requested, "topk rankBy", df));
    };
    let column = df.column(&rank_col)?;
    let mut ranked: Vec<(usize, Option<f64>)> = Vec::with_capacity(column.len());
    for i in 0..column.len() {
        ranked.push((i, cell_number(&column.get(i)?)));
    }
    // Stable: equal scores keep their original relative order
    ranked.sort_by(|(_, a), (_, b)| match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    let idx: Vec<IdxSize> = ranked.iter().take(k).map(|(i, _)| *i as IdxSize).collect();
    let out = df.take(&IdxCa::from_vec("idx".into(), idx))?;
    debug!(target: "tabplan::exec", "[{}] rank_by={} k={} -> {} of {} row(s)", PlanStage::TopK.as_str(), rank_col, k, out.height(), df.height());
    let msg = format!("Top {} row(s) by {} (descending)", out.height(), rank_col);
    Ok((msg, out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::EngineConfig;

    fn frame() -> DataFrame {
        DataFrame::new(vec![
            Series::new("name".into(), &["a", "b", "c", "d", "e"]).into(),
            Series::new("score".into(), &["3", "n/a", "7", "3", ""]).into(),
        ]).unwrap()
    }

    #[test]
    fn ranks_text_numbers_with_failures_last() {
        let df = frame();
        let mut ctx = DataContext::new(&df, EngineConfig::default());
        let (_, out) = topk(&df, Some("Score"), 10, &mut ctx).unwrap();
        let names: Vec<Option<&str>> = out.column("name").unwrap().str().unwrap().into_iter().collect();
        assert_eq!(names, vec![Some("c"), Some("a"), Some("d"), Some("b"), Some("e")]);
    }

    #[test]
    fn missing_rank_column_is_an_error() {
        let df = frame();
        let mut ctx = DataContext::new(&df, EngineConfig::default());
        let err = topk(&df, None, 3, &mut ctx).unwrap_err();
        assert_eq!(err.code_str(), "rank_by_not_found");
        let err = topk(&df, Some("height"), 3, &mut ctx).unwrap_err();
        assert_eq!(err.code_str(), "rank_by_not_found");
        assert!(err.message().contains("Available columns: [name, score]"));
    }
}
