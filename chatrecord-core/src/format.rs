//! Formatting helpers shared by the record builder and the CLI printers.

use chrono::{DateTime, Local, Utc};

/// Format a duration in milliseconds compactly (e.g., "45s", "2m 05s", "1h 03m").
pub fn format_duration_ms(ms: i64) -> String {
    let secs = ms.max(0) / 1000;
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Format a latency sample (e.g., "850ms", "1.2s").
pub fn format_latency_ms(ms: f64) -> String {
    if ms < 1000.0 {
        format!("{:.0}ms", ms)
    } else {
        format!("{:.1}s", ms / 1000.0)
    }
}

/// Format a timestamp in local time for terminal output.
pub fn format_local(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// "1 copy", "3 copies": pluralize a count with explicit forms.
pub fn plural(count: u64, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}", count, plural)
    }
}
