use std::path::{Path, PathBuf};

use anyhow::Context;
use polars::prelude::DataFrame;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use tabplan::table::{describe_schema, load_table_file};
use tabplan::{AppError, AppResult, EngineConfig, Plan};

const USAGE: &str = "usage: tabplan <table.json> <plan.json> [--json]";

struct Args {
    table: PathBuf,
    plan: PathBuf,
    json: bool,
}

fn parse_args() -> Option<Args> {
    let mut paths: Vec<PathBuf> = Vec::new();
    let mut json = false;
    for a in std::env::args().skip(1) {
        match a.as_str() {
            "--json" => json = true,
            "-h" | "--help" => return None,
            _ => paths.push(PathBuf::from(a)),
        }
    }
    if paths.len() != 2 { return None; }
    let plan = paths.pop()?;
    let table = paths.pop()?;
    Some(Args { table, plan, json })
}

fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn load_table(path: &Path) -> AppResult<DataFrame> {
    let df = load_table_file(path)?;
    let schema: Vec<String> = describe_schema(&df).iter().map(|(n, k)| format!("{}:{}", n, k.as_str())).collect();
    info!(target: "tabplan", "loaded {} row(s) from {} [{}]", df.height(), path.display(), schema.join(", "));
    Ok(df)
}

fn run(args: &Args) -> anyhow::Result<i32> {
    let df = match load_table(&args.table) {
        Ok(df) => df,
        Err(e) => {
            eprintln!("error: cannot load {}", args.table.display());
            return Ok(report(&e));
        }
    };
    let raw = read_json(&args.plan)?;
    let plan = match Plan::from_value(&raw) {
        Ok(p) => p,
        Err(e) => return Ok(report(&e)),
    };
    let config = EngineConfig::from_env();
    match tabplan::run_plan_with_config(&df, &plan, &config) {
        Ok(outcome) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&outcome.to_json()?)?);
            } else {
                println!("{}", outcome.summary);
                match &outcome.table {
                    Some(t) => println!("{}", t),
                    None => println!("(no table)"),
                }
                for n in &outcome.notes {
                    println!("note: {}", n);
                }
            }
            Ok(0)
        }
        Err(e) => Ok(report(&e)),
    }
}

fn report(e: &AppError) -> i32 {
    error!(target: "tabplan", "{}", e);
    eprintln!("error: {}", e);
    e.exit_code()
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let Some(args) = parse_args() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };
    let code = match run(&args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}
