//! FILTER stage: apply plan filter clauses conjunctively, in list order.
//!
//! Clauses fail open: an unresolved column, an unknown operator or a missing operand
//! leaves the row set untouched. Coercion failures fail closed per row: a row whose
//! cell (or whose clause operand) cannot be coerced for the operator never matches.

use chrono::NaiveDateTime;
use polars::prelude::*;
use serde_json::Value;
use tracing::debug;

use crate::data_context::{DataContext, PlanStage};
use crate::error::AppResult;
use crate::plan::{FilterClause, FilterOp};
use crate::table::{cell_datetime, cell_number, cell_text, json_datetime, json_number, json_text};
use crate::tprintln;

/// One side of a range predicate.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Bound<T> {
    Open,
    At(T),
    /// Operand present but not coercible; no row can match
    Invalid,
}

impl<T: PartialOrd + Copy> Bound<T> {
    fn admits_low(&self, v: T) -> bool {
        match self { Bound::Open => true, Bound::At(b) => v >= *b, Bound::Invalid => false }
    }
    fn admits_high(&self, v: T) -> bool {
        match self { Bound::Open => true, Bound::At(b) => v <= *b, Bound::Invalid => false }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Equals(String),
    NotEquals(String),
    /// `None` when the operand does not coerce to a number
    Greater(Option<f64>),
    Less(Option<f64>),
    Contains(String),
    Between(Bound<f64>, Bound<f64>),
    DateBetween(Bound<NaiveDateTime>, Bound<NaiveDateTime>),
}

fn norm_text(s: &str) -> String { s.trim().to_lowercase() }

fn bound<T>(v: &Option<Value>, coerce: impl Fn(&Value) -> Option<T>) -> Bound<T> {
    match v {
        None => Bound::Open,
        Some(x) => match coerce(x) { Some(b) => Bound::At(b), None => Bound::Invalid },
    }
}

/// Compile a clause into a row predicate; `None` means the clause is a no-op.
fn compile(clause: &FilterClause) -> Option<Predicate> {
    match &clause.op {
        FilterOp::Equals => clause.value.as_ref().and_then(json_text).map(|t| Predicate::Equals(norm_text(&t))),
        FilterOp::NotEquals => clause.value.as_ref().and_then(json_text).map(|t| Predicate::NotEquals(norm_text(&t))),
        FilterOp::GreaterThan => clause.value.as_ref().map(|v| Predicate::Greater(json_number(v))),
        FilterOp::LessThan => clause.value.as_ref().map(|v| Predicate::Less(json_number(v))),
        FilterOp::Contains => clause.value.as_ref().and_then(json_text).map(|t| Predicate::Contains(t.to_lowercase())),
        FilterOp::NumericBetween => {
            if clause.low.is_none() && clause.high.is_none() { return None; }
            Some(Predicate::Between(bound(&clause.low, json_number), bound(&clause.high, json_number)))
        }
        FilterOp::DateBetween => {
            if clause.low.is_none() && clause.high.is_none() { return None; }
            Some(Predicate::DateBetween(bound(&clause.low, json_datetime), bound(&clause.high, json_datetime)))
        }
        FilterOp::Unknown(_) => None,
    }
}

impl Predicate {
    fn matches(&self, av: &AnyValue) -> bool {
        match self {
            Predicate::Equals(t) => cell_text(av).map(|s| norm_text(&s) == *t).unwrap_or(false),
            // A null cell is not equal to any operand
            Predicate::NotEquals(t) => cell_text(av).map(|s| norm_text(&s) != *t).unwrap_or(true),
            Predicate::Greater(Some(x)) => cell_number(av).map(|v| v > *x).unwrap_or(false),
            Predicate::Less(Some(x)) => cell_number(av).map(|v| v < *x).unwrap_or(false),
            Predicate::Greater(None) | Predicate::Less(None) => false,
            Predicate::Contains(t) => cell_text(av).map(|s| s.to_lowercase().contains(t.as_str())).unwrap_or(false),
            Predicate::Between(lo, hi) => cell_number(av).map(|v| lo.admits_low(v) && hi.admits_high(v)).unwrap_or(false),
            Predicate::DateBetween(lo, hi) => cell_datetime(av).map(|d| lo.admits_low(d) && hi.admits_high(d)).unwrap_or(false),
        }
    }
}

/// Evaluate one predicate over a column into a keep-mask.
fn predicate_mask(column: &Column, pred: &Predicate) -> AppResult<Vec<bool>> {
    let mut keep: Vec<bool> = Vec::with_capacity(column.len());
    for i in 0..column.len() {
        let av = column.get(i)?;
        keep.push(pred.matches(&av));
    }
    Ok(keep)
}

pub fn filter(df: &DataFrame, clauses: &[FilterClause], ctx: &mut DataContext) -> AppResult<DataFrame> {
    let mut out = df.clone();
    for (i, clause) in clauses.iter().enumerate() {
        let Some(name) = ctx.resolve_column(&clause.column) else {
            ctx.note_dropped(PlanStage::Filter, format!("filter #{} on unknown column '{}'", i, clause.column));
            continue;
        };
        let Some(pred) = compile(clause) else {
            ctx.note_dropped(PlanStage::Filter, format!("filter #{} on '{}' ({:?} with no usable operand)", i, name, clause.op));
            continue;
        };
        let keep = predicate_mask(out.column(&name)?, &pred)?;
        let before = out.height();
        if keep.iter().all(|k| *k) { continue; }
        let mask = Series::new("__mask".into(), keep);
        out = out.filter(mask.bool()?)?;
        tprintln!("[FILTER] clause #{} {:?} on '{}': {} -> {} rows", i, pred, name, before, out.height());
    }
    debug!(target: "tabplan::exec", "filter: {} clause(s), {} -> {} rows", clauses.len(), df.height(), out.height());
    Ok(out)
}
