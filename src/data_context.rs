//! DataContext: per-execution state shared by the plan stages.
//! Holds the alias map built once from the input schema, the engine configuration,
//! and the notes recorded whenever a stage drops part of a plan.

use polars::prelude::DataFrame;
use tracing::debug;

use crate::error::AppError;
use crate::ident::AliasMap;
use crate::system::EngineConfig;

/// Execution pipeline stages for plan processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanStage {
    Validate,
    ResolveAliases,
    Filter,
    Aggregate,
    Project,
    TopK,
    Sort,
    Limit,
}

impl PlanStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStage::Validate => "validate",
            PlanStage::ResolveAliases => "resolve_aliases",
            PlanStage::Filter => "filter",
            PlanStage::Aggregate => "aggregate",
            PlanStage::Project => "project",
            PlanStage::TopK => "topk",
            PlanStage::Sort => "sort",
            PlanStage::Limit => "limit",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DataContext {
    /// Normalized spelling -> real column, for the input table
    pub aliases: AliasMap,
    pub config: EngineConfig,
    /// Parts of the plan that were dropped, in the order they were dropped
    pub notes: Vec<String>,
}

impl DataContext {
    pub fn new(df: &DataFrame, config: EngineConfig) -> Self {
        let aliases = AliasMap::from_df(df);
        debug!(target: "tabplan::exec", "alias map built for {} column(s)", aliases.columns().len());
        Self { aliases, config, notes: Vec::new() }
    }

    /// Real column for a plan-supplied name, if it names one.
    pub fn resolve_column(&self, name: &str) -> Option<String> {
        self.aliases.lookup(name).map(|s| s.to_string())
    }

    /// Record a fail-open drop.
    pub fn note_dropped(&mut self, stage: PlanStage, what: String) {
        debug!(target: "tabplan::exec", "[{}] dropped {}", stage.as_str(), what);
        self.notes.push(format!("{}: dropped {}", stage.as_str(), what));
    }

    /// Column-not-found error with clause context and the available columns
    pub fn column_not_found_error(code: &str, name: &str, clause: &str, df: &DataFrame) -> AppError {
        let mut msg = if name.is_empty() {
            format!("{} requires a column and none was given", clause)
        } else {
            format!("Column {} not found in {}", name, clause)
        };
        let cols = df.get_column_names();
        if !cols.is_empty() {
            let shown: Vec<&str> = cols.iter().take(50).map(|s| s.as_str()).collect();
            msg.push_str(&format!(". Available columns: [{}]{}", shown.join(", "), if cols.len() > 50 { " (truncated)" } else { "" }));
        }
        AppError::column_not_found(code.to_string(), msg)
    }
}
