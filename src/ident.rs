//! Column identifier normalization and alias resolution
//! ----------------------------------------------------
//! Single source of truth for mapping loosely spelled column references
//! ("Unit Size", "unitSize", "`unit_size`") onto the real column names of a table.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use polars::prelude::DataFrame;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("static regex"));
static CAMEL_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"([\p{Ll}\p{N}])(\p{Lu})").expect("static regex"));

/// Strip one layer of surrounding quotes or backticks and outer whitespace.
pub fn strip_quotes(ident: &str) -> &str {
    let t = ident.trim();
    for (open, close) in [('"', '"'), ('`', '`'), ('\'', '\''), ('[', ']')] {
        if t.len() >= 2 && t.starts_with(open) && t.ends_with(close) {
            return t[open.len_utf8()..t.len() - close.len_utf8()].trim();
        }
    }
    t
}

fn fold(ident: &str) -> String {
    strip_quotes(ident).nfkc().collect::<String>().to_lowercase()
}

/// Lower-cased, non-alphanumeric runs collapsed to a single underscore.
pub fn snake_key(ident: &str) -> String {
    NON_ALNUM.replace_all(&fold(ident), "_").trim_matches('_').to_string()
}

/// Lower-cased, non-alphanumeric runs collapsed to a single space.
pub fn spaced_key(ident: &str) -> String {
    NON_ALNUM.replace_all(&fold(ident), " ").trim().to_string()
}

/// Lower-cased with every separator removed ("Unit Size" -> "unitsize").
pub fn compact_key(ident: &str) -> String {
    NON_ALNUM.replace_all(&fold(ident), "").to_string()
}

/// Snake form after splitting camelCase boundaries ("unitSize" -> "unit_size").
pub fn camel_snake_key(ident: &str) -> String {
    let raw = strip_quotes(ident).nfkc().collect::<String>();
    let split = CAMEL_BOUNDARY.replace_all(&raw, "${1}_${2}");
    snake_key(&split)
}

fn candidate_keys(ident: &str) -> [String; 4] {
    [snake_key(ident), spaced_key(ident), compact_key(ident), camel_snake_key(ident)]
}

/// Mapping from normalized spellings to real column names, built once per table schema.
#[derive(Debug, Clone, Default)]
pub struct AliasMap {
    columns: Vec<String>,
    exact: HashSet<String>,
    normalized: HashMap<String, String>,
}

impl AliasMap {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = AliasMap::default();
        for c in columns {
            let name = c.as_ref().to_string();
            if !map.exact.insert(name.clone()) { continue; }
            map.columns.push(name);
        }
        // Earlier columns keep a key when two columns normalize alike
        for name in &map.columns {
            for key in candidate_keys(name) {
                if key.is_empty() { continue; }
                map.normalized.entry(key).or_insert_with(|| name.clone());
            }
        }
        map
    }

    pub fn from_df(df: &DataFrame) -> Self {
        AliasMap::new(df.get_column_names().iter().map(|c| c.as_str()))
    }

    /// Real column name for `name`, if any spelling of it is known.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        if let Some(hit) = self.exact.get(name) { return Some(hit.as_str()); }
        let unquoted = strip_quotes(name);
        if let Some(hit) = self.exact.get(unquoted) { return Some(hit.as_str()); }
        candidate_keys(name)
            .iter()
            .filter(|k| !k.is_empty())
            .find_map(|k| self.normalized.get(k))
            .map(|s| s.as_str())
    }

    /// Lenient resolution: the mapped real column, or the input unchanged.
    pub fn resolve(&self, name: &str) -> String {
        self.lookup(name).map(|s| s.to_string()).unwrap_or_else(|| name.to_string())
    }

    pub fn contains(&self, name: &str) -> bool { self.lookup(name).is_some() }

    pub fn columns(&self) -> &[String] { &self.columns }
}
