//! Plan execution pipeline.
//!
//! `Validate -> ResolveAliases -> Filter -> {Aggregate | Project | TopK} -> Sort -> Limit`.
//! Each stage borrows its input and returns a fresh frame; the caller's table is never mutated.

use polars::prelude::DataFrame;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::data_context::{DataContext, PlanStage};
use crate::error::AppResult;
use crate::plan::{Plan, TaskKind};
use crate::system::EngineConfig;
use crate::table::table_to_json;
use crate::tprintln;

pub mod stages;


/// Result of one plan execution.
///
/// `table == None` means the plan cannot produce tabular output and the caller should answer
/// some other way. It is not an error.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub summary: String,
    pub table: Option<DataFrame>,
    /// Parts of the plan dropped during execution, in stage order
    pub notes: Vec<String>,
}

impl PlanOutcome {
    pub fn row_count(&self) -> usize {
        self.table.as_ref().map(|t| t.height()).unwrap_or(0)
    }

    /// `{"summary": .., "rows": [..] | null}`
    pub fn to_json(&self) -> AppResult<Value> {
        let rows = match &self.table {
            Some(t) => table_to_json(t)?,
            None => Value::Null,
        };
        Ok(json!({ "summary": self.summary, "rows": rows }))
    }
}

pub fn run_plan(df: &DataFrame, plan: &Plan) -> AppResult<PlanOutcome> {
    run_plan_with_config(df, plan, &EngineConfig::default())
}

/// Validate a raw plan payload, then run it.
pub fn run_plan_json(df: &DataFrame, plan: &Value, config: &EngineConfig) -> AppResult<PlanOutcome> {
    let plan = Plan::from_value(plan)?;
    run_plan_with_config(df, &plan, config)
}

pub fn run_plan_with_config(df: &DataFrame, plan: &Plan, config: &EngineConfig) -> AppResult<PlanOutcome> {
    debug!(target: "tabplan::exec", "[{}] task={} rows={} cols={}", PlanStage::Validate.as_str(), plan.task.as_str(), df.height(), df.width());
    if df.width() == 0 && plan.task != TaskKind::TopK {
        return Ok(PlanOutcome { summary: "The table has no columns to answer from".to_string(), table: None, notes: Vec::new() });
    }

    let mut ctx = DataContext::new(df, *config);
    tprintln!("[{}] {} column(s)", PlanStage::ResolveAliases.as_str(), ctx.aliases.columns().len());

    let filtered = stages::filter::filter(df, &plan.filters, &mut ctx)?;

    let (message, result) = match plan.task {
        TaskKind::Aggregate => stages::aggregate::aggregate(&filtered, &plan.group_by, &plan.metrics, &mut ctx)?,
        TaskKind::ListRows => stages::project::project(&filtered, &plan.group_by, &mut ctx)?,
        TaskKind::TopK => {
            let k = ctx.config.effective_k(plan.k);
            stages::topk::topk(&filtered, plan.rank_by.as_deref(), k, &mut ctx)?
        }
    };

    let sorted = stages::order_limit::sort(result, &plan.sort, &mut ctx)?;
    let total = sorted.height();
    let cap = ctx.config.effective_limit(plan.limit);
    let out = stages::order_limit::limit(sorted, cap);
    debug!(target: "tabplan::exec", "[{}] cap={} {} -> {} row(s)", PlanStage::Limit.as_str(), cap, total, out.height());

    let summary = if out.height() < total {
        format!("{}; showing the first {} of {}", message, out.height(), total)
    } else {
        message
    };
    info!(target: "tabplan::exec", "plan {} done: {} row(s), {} dropped part(s)", plan.task.as_str(), out.height(), ctx.notes.len());
    Ok(PlanOutcome { summary, table: Some(out), notes: ctx.notes })
}
