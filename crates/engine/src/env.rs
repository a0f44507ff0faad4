//! Environment resolution – merge suite and scenario env into `NAME=VALUE`.
//!
//! A value of the exact form `{GLOBAL:NAME}` is replaced with the host
//! process's current value of `NAME`, or the empty string when unset.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn global_ref() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\{GLOBAL:(.*)\}$").expect("static regex"))
}

/// Resolve a single value, following one `{GLOBAL:NAME}` indirection.
pub fn resolve_value(value: &str) -> String {
    match global_ref().captures(value) {
        Some(caps) => std::env::var(&caps[1]).unwrap_or_default(),
        None => value.to_string(),
    }
}

/// Build the ordered env list for one scenario.
///
/// Suite entries the scenario does not override come first, then the
/// scenario's own entries; each group is in key order.
pub fn resolve_env(
    suite_env: &BTreeMap<String, String>,
    scenario_env: &BTreeMap<String, String>,
) -> Vec<String> {
    let inherited = suite_env
        .iter()
        .filter(|(key, _)| !scenario_env.contains_key(*key));

    inherited
        .chain(scenario_env.iter())
        .map(|(key, value)| format!("{}={}", key, resolve_value(value)))
        .collect()
}

/// Split a `NAME=VALUE` entry. Entries without `=` set `NAME` to empty.
pub fn split_entry(entry: &str) -> (&str, &str) {
    entry.split_once('=').unwrap_or((entry, ""))
}
