//! AGGREGATE stage: grouped or ungrouped summary metrics.
//!
//! Groups are keyed on the text form of every key cell (null and NaN are each their own identity) and emitted
//! in first-appearance order. Key columns keep their source dtype; metric columns follow in
//! plan order. When no valid metric survives resolution, or the first valid metric is a
//! wildcard `count`, the stage returns group sizes only.

use std::collections::{HashMap, HashSet};

use polars::prelude::*;
use tracing::debug;

use crate::data_context::{DataContext, PlanStage};
use crate::error::AppResult;
use crate::plan::{AggKind, Metric};
use crate::table::{cell_number, cell_text};

/// A metric that survived resolution. `column == None` is a wildcard row count.
#[derive(Debug, Clone, PartialEq)]
struct ResolvedMetric {
    kind: AggKind,
    column: Option<String>,
    out_name: String,
}

/// Row indices per group, in first-appearance order.
struct Groups {
    rows: Vec<Vec<usize>>,
}

impl Groups {
    fn first_rows(&self) -> Vec<IdxSize> {
        self.rows.iter().filter_map(|r| r.first()).map(|i| *i as IdxSize).collect()
    }
    fn sizes(&self) -> Vec<i64> {
        self.rows.iter().map(|r| r.len() as i64).collect()
    }
}

fn resolve_keys(group_by: &[String], ctx: &mut DataContext) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for g in group_by {
        match ctx.resolve_column(g) {
            Some(real) if !keys.contains(&real) => keys.push(real),
            Some(_) => {}
            None => ctx.note_dropped(PlanStage::Aggregate, format!("group key '{}' (no such column)", g)),
        }
    }
    keys
}

fn resolve_metrics(metrics: &[Metric], ctx: &mut DataContext) -> Vec<ResolvedMetric> {
    let mut out: Vec<ResolvedMetric> = Vec::new();
    for m in metrics {
        if !m.kind.is_allowed() {
            ctx.note_dropped(PlanStage::Aggregate, format!("metric '{}' (aggregate not supported)", m.kind.as_str()));
            continue;
        }
        let alias = m.alias.as_deref().map(str::trim).filter(|a| !a.is_empty()).map(|a| a.to_string());
        if m.is_wildcard_count() {
            out.push(ResolvedMetric { kind: AggKind::Count, column: None, out_name: alias.unwrap_or_else(|| "count".to_string()) });
            continue;
        }
        let raw = m.column.as_deref().unwrap_or_default();
        let Some(real) = ctx.resolve_column(raw) else {
            ctx.note_dropped(PlanStage::Aggregate, format!("metric {}({}) (no such column)", m.kind.as_str(), raw));
            continue;
        };
        let out_name = alias.unwrap_or_else(|| format!("{}_{}", real, m.kind.as_str()));
        out.push(ResolvedMetric { kind: m.kind.clone(), column: Some(real), out_name });
    }
    out
}

/// Group identity of a key cell: its text form, with NaN kept apart from null.
fn group_token(av: &AnyValue) -> Option<String> {
    match av {
        AnyValue::Float32(f) if f.is_nan() => Some("NaN".to_string()),
        AnyValue::Float64(f) if f.is_nan() => Some("NaN".to_string()),
        other => cell_text(other),
    }
}

fn build_groups(df: &DataFrame, keys: &[String]) -> AppResult<Groups> {
    if keys.is_empty() {
        // Ungrouped: one group over the whole table, even when it is empty
        return Ok(Groups { rows: vec![(0..df.height()).collect()] });
    }
    let cols: Vec<&Column> = keys.iter().map(|k| df.column(k)).collect::<PolarsResult<_>>()?;
    let mut index: HashMap<Vec<Option<String>>, usize> = HashMap::new();
    let mut rows: Vec<Vec<usize>> = Vec::new();
    for r in 0..df.height() {
        let mut key: Vec<Option<String>> = Vec::with_capacity(cols.len());
        for c in &cols {
            key.push(group_token(&c.get(r)?));
        }
        let gid = *index.entry(key).or_insert_with(|| {
            rows.push(Vec::new());
            rows.len() - 1
        });
        rows[gid].push(r);
    }
    Ok(Groups { rows })
}

/// Reduce the coercible values of one group. `None` when nothing coerced.
fn reduce(kind: &AggKind, vals: &mut Vec<f64>) -> Option<f64> {
    if vals.is_empty() { return None; }
    match kind {
        AggKind::Sum => Some(vals.iter().sum()),
        AggKind::Mean => Some(vals.iter().sum::<f64>() / vals.len() as f64),
        AggKind::Median => {
            vals.sort_by(|a, b| a.total_cmp(b));
            let n = vals.len();
            if n % 2 == 1 { Some(vals[n / 2]) } else { Some((vals[n / 2 - 1] + vals[n / 2]) / 2.0) }
        }
        AggKind::Min => vals.iter().copied().reduce(f64::min),
        AggKind::Max => vals.iter().copied().reduce(f64::max),
        _ => None,
    }
}

fn metric_column(df: &DataFrame, groups: &Groups, m: &ResolvedMetric) -> AppResult<Column> {
    let name: PlSmallStr = m.out_name.as_str().into();
    let Some(src) = m.column.as_deref() else {
        return Ok(Series::new(name, groups.sizes()).into());
    };
    let column = df.column(src)?;
    let cells: Vec<AnyValue> = (0..column.len()).map(|i| column.get(i)).collect::<PolarsResult<_>>()?;
    let series = match &m.kind {
        AggKind::Count => {
            let counts: Vec<i64> = groups.rows.iter().map(|rows| rows.iter().filter(|r| !cells[**r].is_null()).count() as i64).collect();
            Series::new(name, counts)
        }
        AggKind::CountDistinct => {
            let counts: Vec<i64> = groups.rows.iter().map(|rows| {
                rows.iter().filter_map(|r| cell_text(&cells[*r])).collect::<HashSet<String>>().len() as i64
            }).collect();
            Series::new(name, counts)
        }
        kind => {
            let values: Vec<Option<f64>> = groups.rows.iter().map(|rows| {
                let mut vals: Vec<f64> = rows.iter().filter_map(|r| cell_number(&cells[*r])).collect();
                reduce(kind, &mut vals)
            }).collect();
            Series::new(name, values)
        }
    };
    Ok(series.into())
}

fn plural(n: usize, word: &str) -> String {
    format!("{} {}{}", n, word, if n == 1 { "" } else { "s" })
}

pub fn aggregate(df: &DataFrame, group_by: &[String], metrics: &[Metric], ctx: &mut DataContext) -> AppResult<(String, DataFrame)> {
    let keys = resolve_keys(group_by, ctx);
    let resolved = resolve_metrics(metrics, ctx);
    let groups = build_groups(df, &keys)?;

    let mut cols: Vec<Column> = if keys.is_empty() {
        Vec::new()
    } else {
        let idx = IdxCa::from_vec("idx".into(), groups.first_rows());
        df.select(keys.iter().cloned())?.take(&idx)?.take_columns()
    };

    let shortcut = resolved.first().map(|m| m.column.is_none()).unwrap_or(true);
    if shortcut {
        if resolved.len() > 1 {
            ctx.note_dropped(PlanStage::Aggregate, format!("{} metric(s) after the leading row count", resolved.len() - 1));
        }
        let name = if keys.iter().any(|k| k == "count") { "count_rows" } else { "count" };
        cols.push(Series::new(name.into(), groups.sizes()).into());
        let out = DataFrame::new(cols)?;
        debug!(target: "tabplan::exec", "aggregate: count shortcut over {} group(s), keys={:?}", groups.rows.len(), keys);
        let msg = if keys.is_empty() {
            format!("Counted {}", plural(df.height(), "row"))
        } else {
            format!("Counted {} across {} by {}", plural(df.height(), "row"), plural(groups.rows.len(), "group"), keys.join(", "))
        };
        return Ok((msg, out));
    }

    let mut seen_pairs: HashSet<(Option<String>, AggKind)> = HashSet::new();
    let mut names: HashSet<String> = keys.iter().cloned().collect();
    let mut computed = 0usize;
    for m in &resolved {
        if !seen_pairs.insert((m.column.clone(), m.kind.clone())) {
            let what = m.column.as_deref().unwrap_or("*");
            ctx.note_dropped(PlanStage::Aggregate, format!("metric {}({}) (duplicate)", m.kind.as_str(), what));
            continue;
        }
        if !names.insert(m.out_name.clone()) {
            ctx.note_dropped(PlanStage::Aggregate, format!("metric '{}' (output name already used)", m.out_name));
            continue;
        }
        cols.push(metric_column(df, &groups, m)?);
        computed += 1;
    }
    let out = DataFrame::new(cols)?;
    debug!(target: "tabplan::exec", "aggregate: {} metric(s), {} group(s), keys={:?}", computed, groups.rows.len(), keys);
    let msg = format!("Computed {} over {} from {}", plural(computed, "metric"), plural(groups.rows.len(), "group"), plural(df.height(), "row"));
    Ok((msg, out))
}
