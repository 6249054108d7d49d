//! Engine configuration: row caps and defaults applied when a plan leaves them out.

use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_LIMIT: usize = 50;
pub const DEFAULT_K: usize = 10;
pub const DEFAULT_MAX_PREVIEW_ROWS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Row cap used when the plan carries no usable `limit`.
    pub default_limit: usize,
    /// Row count used by topk when the plan carries no usable `k`.
    pub default_k: usize,
    /// Hard ceiling on any result; the caller's preview size.
    pub max_preview_rows: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { default_limit: DEFAULT_LIMIT, default_k: DEFAULT_K, max_preview_rows: DEFAULT_MAX_PREVIEW_ROWS }
    }
}

fn env_usize(key: &str, fallback: usize) -> usize {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<usize>() {
            Ok(v) if v > 0 => v,
            _ => {
                debug!(target: "tabplan::config", "ignoring {}='{}' (expected a positive integer)", key, raw);
                fallback
            }
        },
        Err(_) => fallback,
    }
}

impl EngineConfig {
    /// Read overrides from `TABPLAN_DEFAULT_LIMIT`, `TABPLAN_DEFAULT_K` and
    /// `TABPLAN_MAX_PREVIEW_ROWS`; anything unset or unparseable keeps the default.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            default_limit: env_usize("TABPLAN_DEFAULT_LIMIT", d.default_limit),
            default_k: env_usize("TABPLAN_DEFAULT_K", d.default_k),
            max_preview_rows: env_usize("TABPLAN_MAX_PREVIEW_ROWS", d.max_preview_rows),
        }
    }

    /// Effective row cap for a requested limit. Non-positive requests count as absent.
    pub fn effective_limit(&self, requested: Option<i64>) -> usize {
        let n = match requested { Some(v) if v > 0 => v as usize, _ => self.default_limit };
        n.min(self.max_preview_rows)
    }

    /// Effective topk size for a requested k. Non-positive requests count as absent.
    pub fn effective_k(&self, requested: Option<i64>) -> usize {
        let n = match requested { Some(v) if v > 0 => v as usize, _ => self.default_k };
        n.min(self.max_preview_rows)
    }
}
