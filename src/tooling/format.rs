//! Text and JSON rendering for CLI output.

use crate::admission::PendingAdmission;
use crate::clock::datetime_from_ms;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde_json::json;

/// Format a section heading with bold/underline.
pub fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

/// Human-friendly remaining time; negative means overdue
pub fn format_remaining(remaining_ms: i64) -> String {
    let secs = remaining_ms.abs() / 1000;
    let text = if secs >= 3600 {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    };
    if remaining_ms < 0 {
        format!("overdue {}", text)
    } else {
        text
    }
}

fn format_deadline(deadline_ms: i64) -> String {
    datetime_from_ms(deadline_ms)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| deadline_ms.to_string())
}

/// Pending admissions as a table; overdue rows are highlighted
pub fn format_pending_text(entries: &[PendingAdmission], now_ms: i64) -> String {
    let mut out = format!("{}\n\n", format_section_heading("Pending admissions"));
    if entries.is_empty() {
        out.push_str("No members are pending verification.\n");
        return out;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Chat", "User", "Admitted by", "Deadline", "Remaining"]);
    let mut overdue = 0;
    for entry in entries {
        let remaining_ms = entry.deadline_ms - now_ms;
        let remaining = format_remaining(remaining_ms);
        let remaining = if remaining_ms < 0 {
            overdue += 1;
            remaining.red().to_string()
        } else {
            remaining
        };
        table.add_row(vec![
            entry.chat_id.to_string(),
            entry.user_id.to_string(),
            entry.admitted_by.to_string(),
            format_deadline(entry.deadline_ms),
            remaining,
        ]);
    }
    out.push_str(&format!("{}\n", table));
    out.push_str(&format!("\n{} pending", entries.len()));
    if overdue > 0 {
        out.push_str(&format!(", {}", format!("{} overdue", overdue).yellow()));
    }
    out.push('\n');
    out
}

pub fn format_pending_json(entries: &[PendingAdmission], now_ms: i64) -> serde_json::Value {
    let rows: Vec<serde_json::Value> = entries
        .iter()
        .map(|e| {
            json!({
                "chat_id": e.chat_id,
                "user_id": e.user_id,
                "admitted_by": e.admitted_by,
                "deadline_ms": e.deadline_ms,
                "deadline": format_deadline(e.deadline_ms),
                "overdue": e.is_due(now_ms),
            })
        })
        .collect();
    json!({ "pending": rows, "count": entries.len() })
}
