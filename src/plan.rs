//! Plan data model and shape-level validation.
//!
//! A plan arrives from an upstream translator as loosely shaped JSON. `Plan::from_value`
//! rejects payloads that are not record-like (root not an object, no string `task`,
//! `filters`/`metrics`/`sort` not lists) and tolerates everything else: unknown keys are
//! ignored, malformed list elements are skipped, and unrecognized operators or aggregate
//! kinds are kept so the engine can drop them at execution time.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::ident::compact_key;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind { Aggregate, ListRows, TopK }

impl TaskKind {
    /// Case-insensitive with synonyms; anything unrecognized is `ListRows`.
    pub fn parse(raw: &str) -> Self {
        match compact_key(raw).as_str() {
            "aggregate" | "agg" | "aggregation" | "groupby" | "summarize" | "summarise" | "summary" => TaskKind::Aggregate,
            "topk" | "rank" | "ranking" => TaskKind::TopK,
            "listrows" | "rows" | "list" => TaskKind::ListRows,
            other => {
                debug!(target: "tabplan::plan", "unrecognized task '{}' ({}); defaulting to list_rows", raw, other);
                TaskKind::ListRows
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Aggregate => "aggregate",
            TaskKind::ListRows => "list_rows",
            TaskKind::TopK => "topk",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    NumericBetween,
    DateBetween,
    /// Kept verbatim; evaluates as a no-op
    Unknown(String),
}

impl FilterOp {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "=" | "==" => return FilterOp::Equals,
            "!=" | "<>" => return FilterOp::NotEquals,
            ">" => return FilterOp::GreaterThan,
            "<" => return FilterOp::LessThan,
            _ => {}
        }
        match compact_key(raw).as_str() {
            "eq" | "equals" | "equal" | "is" => FilterOp::Equals,
            "ne" | "neq" | "notequals" | "notequal" | "isnot" => FilterOp::NotEquals,
            "gt" | "greaterthan" => FilterOp::GreaterThan,
            "lt" | "lessthan" => FilterOp::LessThan,
            "contains" | "like" | "includes" => FilterOp::Contains,
            "between" | "numericbetween" | "range" => FilterOp::NumericBetween,
            "datebetween" | "betweendates" | "daterange" => FilterOp::DateBetween,
            _ => FilterOp::Unknown(raw.to_string()),
        }
    }

    pub fn is_range(&self) -> bool { matches!(self, FilterOp::NumericBetween | FilterOp::DateBetween) }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterClause {
    pub column: String,
    pub op: FilterOp,
    /// Operand for the comparison operators
    pub value: Option<Value>,
    /// Inclusive lower bound for the range operators
    pub low: Option<Value>,
    /// Inclusive upper bound for the range operators
    pub high: Option<Value>,
}

impl FilterClause {
    pub fn new(column: impl Into<String>, op: FilterOp, value: Option<Value>) -> Self {
        Self { column: column.into(), op, value, low: None, high: None }
    }

    pub fn range(column: impl Into<String>, op: FilterOp, low: Option<Value>, high: Option<Value>) -> Self {
        Self { column: column.into(), op, value: None, low, high }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggKind {
    Count,
    Sum,
    Mean,
    Median,
    Min,
    Max,
    CountDistinct,
    /// Outside the allow-list; dropped by the engine
    Unknown(String),
}

impl AggKind {
    pub fn parse(raw: &str) -> Self {
        match compact_key(raw).as_str() {
            "count" => AggKind::Count,
            "sum" | "total" => AggKind::Sum,
            "mean" | "avg" | "average" => AggKind::Mean,
            "median" => AggKind::Median,
            "min" | "minimum" => AggKind::Min,
            "max" | "maximum" => AggKind::Max,
            "countdistinct" | "distinctcount" | "nunique" | "distinct" | "uniquecount" => AggKind::CountDistinct,
            _ => AggKind::Unknown(raw.to_string()),
        }
    }

    /// Name used in output columns (`{column}_{kind}`).
    pub fn as_str(&self) -> &str {
        match self {
            AggKind::Count => "count",
            AggKind::Sum => "sum",
            AggKind::Mean => "mean",
            AggKind::Median => "median",
            AggKind::Min => "min",
            AggKind::Max => "max",
            AggKind::CountDistinct => "count_distinct",
            AggKind::Unknown(s) => s.as_str(),
        }
    }

    pub fn is_allowed(&self) -> bool { !matches!(self, AggKind::Unknown(_)) }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub kind: AggKind,
    pub column: Option<String>,
    pub alias: Option<String>,
}

impl Metric {
    pub fn new(kind: AggKind, column: Option<&str>) -> Self {
        Self { kind, column: column.map(|c| c.to_string()), alias: None }
    }

    /// `count` with no column or a `*` column: a row count.
    pub fn is_wildcard_count(&self) -> bool {
        self.kind == AggKind::Count && self.column.as_deref().map(|c| c.trim().is_empty() || c.trim() == "*").unwrap_or(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection { Asc, Desc }

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortKey {
    pub column: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(column: impl Into<String>) -> Self { Self { column: column.into(), direction: SortDirection::Asc } }
    pub fn desc(column: impl Into<String>) -> Self { Self { column: column.into(), direction: SortDirection::Desc } }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub task: TaskKind,
    pub filters: Vec<FilterClause>,
    pub group_by: Vec<String>,
    pub metrics: Vec<Metric>,
    pub sort: Vec<SortKey>,
    pub limit: Option<i64>,
    pub k: Option<i64>,
    pub rank_by: Option<String>,
}

impl Plan {
    pub fn new(task: TaskKind) -> Self {
        Self { task, filters: Vec::new(), group_by: Vec::new(), metrics: Vec::new(), sort: Vec::new(), limit: None, k: None, rank_by: None }
    }

    pub fn from_json_str(text: &str) -> AppResult<Self> {
        let v: Value = serde_json::from_str(text)?;
        Self::from_value(&v)
    }

    pub fn from_value(v: &Value) -> AppResult<Self> {
        let obj = v.as_object().ok_or_else(|| AppError::invalid_plan("plan_not_object", "plan must be a JSON object"))?;
        let task = match field(obj, &["task", "type", "intent"]) {
            Some(Value::String(s)) => TaskKind::parse(s),
            Some(_) => return Err(AppError::invalid_plan("invalid_task", "plan task must be a string")),
            None => return Err(AppError::invalid_plan("missing_task", "plan has no task")),
        };
        let mut plan = Plan::new(task);

        for (i, f) in list_field(obj, &["filters", "filter", "where"], "filters")?.into_iter().enumerate() {
            match parse_filter(f) {
                Some(clause) => plan.filters.push(clause),
                None => debug!(target: "tabplan::plan", "skipping malformed filter #{}: {}", i, f),
            }
        }
        plan.group_by = match field(obj, &["groupBy", "group_by", "groupby", "by"]) {
            Some(Value::String(s)) => non_empty(s).into_iter().collect(),
            Some(Value::Array(items)) => items.iter().filter_map(as_name).collect(),
            Some(other) => {
                debug!(target: "tabplan::plan", "ignoring groupBy of unexpected shape: {}", other);
                Vec::new()
            }
            None => Vec::new(),
        };
        for (i, m) in list_field(obj, &["metrics", "aggregations", "aggs"], "metrics")?.into_iter().enumerate() {
            match parse_metric(m) {
                Some(metric) => plan.metrics.push(metric),
                None => debug!(target: "tabplan::plan", "skipping malformed metric #{}: {}", i, m),
            }
        }
        for (i, s) in list_field(obj, &["sort", "order_by", "orderBy"], "sort")?.into_iter().enumerate() {
            match parse_sort(s) {
                Some(key) => plan.sort.push(key),
                None => debug!(target: "tabplan::plan", "skipping malformed sort key #{}: {}", i, s),
            }
        }
        plan.limit = field(obj, &["limit", "max_rows"]).and_then(as_int);
        plan.k = field(obj, &["k", "top_k", "topK", "top"]).and_then(as_int);
        plan.rank_by = field(obj, &["rankBy", "rank_by", "rank_column"]).and_then(as_name);
        debug!(target: "tabplan::plan", "parsed plan: task={} filters={} group_by={:?} metrics={} sort={} limit={:?} k={:?} rank_by={:?}",
            plan.task.as_str(), plan.filters.len(), plan.group_by, plan.metrics.len(), plan.sort.len(), plan.limit, plan.k, plan.rank_by);
        Ok(plan)
    }
}

/// First present, non-null value among `names`.
fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().filter_map(|n| obj.get(*n)).find(|v| !v.is_null())
}

fn list_field<'a>(obj: &'a Map<String, Value>, names: &[&str], what: &str) -> AppResult<Vec<&'a Value>> {
    match field(obj, names) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.iter().collect()),
        Some(_) => Err(AppError::InvalidPlan { code: format!("invalid_{}", what), message: format!("plan {} must be a list", what) }),
    }
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() { None } else { Some(t.to_string()) }
}

fn as_name(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => non_empty(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn parse_filter(v: &Value) -> Option<FilterClause> {
    let obj = v.as_object()?;
    let column = field(obj, &["column", "col", "field"]).and_then(as_name)?;
    let op = match field(obj, &["op", "operator", "cmp", "comparison"]) {
        Some(Value::String(s)) => FilterOp::parse(s),
        Some(other) => FilterOp::Unknown(other.to_string()),
        None => FilterOp::Unknown(String::new()),
    };
    let value = field(obj, &["value", "val", "values"]).cloned();
    let mut low = field(obj, &["low", "min", "from", "start"]).cloned();
    let mut high = field(obj, &["high", "max", "to", "end"]).cloned();
    if op.is_range() && low.is_none() && high.is_none() {
        if let Some(Value::Array(pair)) = &value {
            if pair.len() == 2 {
                low = Some(pair[0].clone()).filter(|x| !x.is_null());
                high = Some(pair[1].clone()).filter(|x| !x.is_null());
            }
        }
    }
    Some(FilterClause { column, op, value, low, high })
}

fn parse_metric(v: &Value) -> Option<Metric> {
    match v {
        Value::String(s) => Some(Metric { kind: AggKind::parse(s), column: None, alias: None }),
        Value::Object(obj) => {
            let kind = match field(obj, &["agg", "aggregate", "aggregateKind", "aggregate_kind", "func", "function", "op", "kind"]) {
                Some(Value::String(s)) => AggKind::parse(s),
                Some(other) => AggKind::Unknown(other.to_string()),
                None => return None,
            };
            let column = field(obj, &["column", "col", "field"]).and_then(as_name);
            let alias = field(obj, &["alias", "as"]).and_then(as_name);
            Some(Metric { kind, column, alias })
        }
        _ => None,
    }
}

fn parse_direction(v: &Value) -> Option<SortDirection> {
    match v {
        Value::String(s) if s.trim().to_ascii_lowercase().starts_with("desc") => Some(SortDirection::Desc),
        Value::String(_) => Some(SortDirection::Asc),
        _ => None,
    }
}

fn parse_sort(v: &Value) -> Option<SortKey> {
    match v {
        Value::String(s) => {
            let t = s.trim();
            match t.strip_prefix('-') {
                Some(rest) => non_empty(rest).map(SortKey::desc),
                None => non_empty(t).map(SortKey::asc),
            }
        }
        Value::Object(obj) => {
            let column = field(obj, &["column", "col", "by", "field"]).and_then(as_name)?;
            let direction = if let Some(d) = field(obj, &["direction", "dir", "order"]).and_then(parse_direction) {
                d
            } else if let Some(Value::Bool(asc)) = field(obj, &["ascending", "asc"]) {
                if *asc { SortDirection::Asc } else { SortDirection::Desc }
            } else if let Some(Value::Bool(desc)) = field(obj, &["descending", "desc"]) {
                if *desc { SortDirection::Desc } else { SortDirection::Asc }
            } else {
                SortDirection::Asc
            };
            Some(SortKey { column, direction })
        }
        _ => None,
    }
}
