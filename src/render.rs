//! Plain-text and JSON output for the CLI.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::services::AccountRow;
use crate::usage::{CodexUsageRow, CopilotUsageMetric, CopilotUsageRow, UsageRow};

const NOTE_MAX_CHARS: usize = 24;

/// `2d 3h`, `1h 5m`, `5m`. Negative durations render as `0m`.
pub fn format_duration_short(ms: i64) -> String {
    let total_minutes = ms.max(0) / 60_000;
    let days = total_minutes / (24 * 60);
    let hours = (total_minutes % (24 * 60)) / 60;
    let minutes = total_minutes % 60;

    match (days, hours, minutes) {
        (0, 0, minutes) => format!("{}m", minutes),
        (0, hours, 0) => format!("{}h", hours),
        (0, hours, minutes) => format!("{}h {}m", hours, minutes),
        (days, 0, _) => format!("{}d", days),
        (days, hours, _) => format!("{}d {}h", days, hours),
    }
}

fn resets_in(now_ms: i64, reset_at_ms: Option<i64>) -> String {
    match reset_at_ms {
        Some(reset_at_ms) => format!(" (resets in {})", format_duration_short(reset_at_ms.saturating_sub(now_ms))),
        None => String::new(),
    }
}

fn percent(value: f64) -> String {
    format!("{}%", value.clamp(0.0, 100.0).round() as i64)
}

/// Single-line note, whitespace collapsed and capped at a fixed width.
pub fn note_cell(note: Option<&str>) -> Option<String> {
    let collapsed = note?.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    if collapsed.chars().count() <= NOTE_MAX_CHARS {
        return Some(collapsed);
    }
    let kept: String = collapsed.chars().take(NOTE_MAX_CHARS - 3).collect();
    Some(format!("{}...", kept))
}

fn with_note(mut line: String, note: Option<&str>) -> String {
    if let Some(note) = note_cell(note) {
        line.push_str(&format!("  # {}", note));
    }
    line
}

fn codex_line(row: &CodexUsageRow, now_ms: i64) -> String {
    let head = format!("codex  {}  {}", row.email, row.plan_type);
    if let Some(error) = &row.error {
        return with_note(format!("{}  error: {}", head, error), row.note.as_deref());
    }
    let mut line = format!(
        "{}  {} {} used{}",
        head,
        row.primary_label,
        percent(row.primary_used_percent),
        resets_in(now_ms, row.primary_reset_at_ms)
    );
    if let Some(used) = row.secondary_used_percent {
        line.push_str(&format!(
            "  {} {} used{}",
            row.secondary_label,
            percent(used),
            resets_in(now_ms, row.secondary_reset_at_ms)
        ));
    }
    with_note(line, row.note.as_deref())
}

fn metric_cell(metric: &CopilotUsageMetric) -> String {
    let label = metric.label.as_str();
    if metric.unlimited == Some(true) {
        return format!("{} unlimited", label);
    }
    let mut cell = match metric.used_percent {
        Some(used) => format!("{} {} used", label, percent(used)),
        None => format!("{} -", label),
    };
    let remaining = metric.remaining.map(|value| value.round() as i64);
    let entitlement = metric.entitlement.map(|value| value.round() as i64);
    match (remaining, entitlement) {
        (Some(remaining), Some(entitlement)) => cell.push_str(&format!(" {}/{}", remaining, entitlement)),
        (Some(remaining), None) => cell.push_str(&format!(" {} left", remaining)),
        (None, Some(entitlement)) => cell.push_str(&format!(" ?/{}", entitlement)),
        (None, None) => {}
    }
    cell
}

fn copilot_line(row: &CopilotUsageRow, now_ms: i64) -> String {
    let head = format!("copilot  {}  {}", row.email, row.plan_type);
    if let Some(error) = &row.error {
        return with_note(format!("{}  error: {}", head, error), row.note.as_deref());
    }
    let mut line = head;
    for metric in &row.metrics {
        line.push_str("  ");
        line.push_str(&metric_cell(metric));
    }
    if row.metrics.is_empty() {
        line.push_str("  no quota data");
    }
    line.push_str(&resets_in(now_ms, row.reset_at_ms));
    with_note(line, row.note.as_deref())
}

pub fn usage_lines(rows: &[UsageRow], now_ms: i64) -> Vec<String> {
    rows.iter()
        .map(|row| match row {
            UsageRow::Codex(row) => codex_line(row, now_ms),
            UsageRow::Copilot(row) => copilot_line(row, now_ms),
        })
        .collect()
}

pub fn account_lines(rows: &[AccountRow]) -> Vec<String> {
    rows.iter()
        .map(|row| {
            let line = format!(
                "{} {}  {}  {}  {}",
                if row.active { "*" } else { " " },
                row.provider,
                row.email,
                row.plan_type.as_deref().unwrap_or("-"),
                row.id
            );
            with_note(line, row.note.as_deref())
        })
        .collect()
}

pub fn to_json<T: Serialize + ?Sized>(value: &T, what: &'static str) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|source| Error::Encode { what, source })
}
