pub mod error;
pub mod system;
pub mod ident;
pub mod plan;
pub mod table;
pub mod data_context;
pub mod exec;

pub use error::{AppError, AppResult};
pub use exec::{run_plan, run_plan_json, run_plan_with_config, PlanOutcome};
pub use plan::Plan;
pub use system::EngineConfig;

// Stage diagnostics helper: prints to stderr in test/debug builds.
// Usage: tprintln!("debug: {}", value);
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

// In release builds the macro keeps format checking but emits nothing.
#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        if false { let _ = format!($($arg)*); }
    });
}
