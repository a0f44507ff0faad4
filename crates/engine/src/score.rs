//! Scoring – aggregate visible instances into a weighted pass percentage.

use crate::suite::Suite;
use crate::types::SuiteSummary;
use std::time::Duration;

/// Summarise `suite`. Only visible instances count.
///
/// `score = 100 * passed weight / weight of non-skipped instances`; a suite
/// with nothing to score rates 100.
pub fn score(suite: &Suite) -> SuiteSummary {
    let mut total = 0;
    let mut skipped = 0;
    let mut failed = 0;
    let mut passed_weight: u64 = 0;
    let mut max_weight: u64 = 0;

    for instance in suite.instances().iter().filter(|i| i.is_visible()) {
        total += 1;
        if instance.is_skipped() {
            skipped += 1;
            continue;
        }
        let weight = u64::from(instance.definition.weight);
        max_weight += weight;
        if instance.is_success() {
            passed_weight += weight;
        } else {
            failed += 1;
        }
    }

    let score = if max_weight == 0 {
        100.0
    } else {
        100.0 * passed_weight as f64 / max_weight as f64
    };

    let duration = match (suite.started_at, suite.finished_at) {
        (Some(start), Some(end)) => (end - start).to_std().unwrap_or_default(),
        _ => Duration::ZERO,
    };

    SuiteSummary {
        total,
        successful: total - skipped - failed,
        failed,
        skipped,
        score,
        duration,
    }
}

/// Compact duration text truncated to milliseconds: `0s`, `350ms`,
/// `1.5s`, `2m3.04s`, `1h0m5s`.
pub fn format_duration(d: Duration) -> String {
    let total_ms = d.as_millis();
    if total_ms == 0 {
        return "0s".to_string();
    }
    if total_ms < 1000 {
        return format!("{}ms", total_ms);
    }

    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let secs = (total_ms / 1000) % 60;
    let millis = total_ms % 1000;

    let mut seconds = secs.to_string();
    if millis > 0 {
        let frac = format!("{:03}", millis);
        seconds.push('.');
        seconds.push_str(frac.trim_end_matches('0'));
    }

    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
