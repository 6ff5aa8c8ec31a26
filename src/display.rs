// Terminal rendering of task rows

use crate::record::{Priority, TaskRecord};
use chrono::format::{Item, StrftimeItems};
use colored::{ColoredString, Colorize};
use std::fmt::Write;

pub const DEFAULT_DATE_FORMAT: &str = "%d/%m/%Y";

/// Priority number in the row's badge color: P1 red, P2 orange, P3 yellow
pub fn priority_badge(priority: Priority) -> ColoredString {
    let label = format!("[{}]", priority.value());
    match priority {
        Priority::High => label.red().bold(),
        Priority::Medium => label.truecolor(255, 165, 0).bold(),
        Priority::Low => label.yellow(),
    }
}

/// Whether chrono accepts every item of a strftime-style format
pub fn is_valid_date_format(date_format: &str) -> bool {
    !StrftimeItems::new(date_format).any(|item| matches!(item, Item::Error))
}

/// Falls back to [`DEFAULT_DATE_FORMAT`] when `date_format` does not render
pub fn format_updated_at(record: &TaskRecord, date_format: &str) -> String {
    let Some(dt) = record.updated_at_utc() else {
        return "-".to_string();
    };

    let mut out = String::new();
    if write!(out, "{}", dt.format(date_format)).is_err() {
        out.clear();
        let _ = write!(out, "{}", dt.format(DEFAULT_DATE_FORMAT));
    }
    out
}

pub fn format_row(record: &TaskRecord, date_format: &str) -> String {
    format!(
        "{:>4} {} {}  {}",
        record.id,
        priority_badge(record.priority),
        record.description,
        format_updated_at(record, date_format).dimmed()
    )
}

/// Whole list, one row per line
pub fn format_list(records: &[TaskRecord], date_format: &str) -> String {
    if records.is_empty() {
        return "No tasks".dimmed().to_string();
    }
    records
        .iter()
        .map(|r| format_row(r, date_format))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TaskRecord {
        TaskRecord {
            id: 3,
            description: "Buy milk".to_string(),
            priority: Priority::Medium,
            updated_at: 86_400_000,
        }
    }

    #[test]
    fn test_format_updated_at() {
        assert_eq!(format_updated_at(&record(), DEFAULT_DATE_FORMAT), "02/01/1970");
        assert_eq!(format_updated_at(&record(), "%Y-%m-%d"), "1970-01-02");
    }

    #[test]
    fn test_bad_date_format_falls_back_to_default() {
        assert_eq!(format_updated_at(&record(), "%Q"), "02/01/1970");
        colored::control::set_override(false);
        assert_eq!(format_row(&record(), "%Q"), "   3 [2] Buy milk  02/01/1970");
    }

    #[test]
    fn test_date_format_validation() {
        assert!(is_valid_date_format(DEFAULT_DATE_FORMAT));
        assert!(is_valid_date_format("%Y-%m-%d %H:%M"));
        assert!(!is_valid_date_format("%Q"));
        assert!(!is_valid_date_format("%d/%m/%"));
    }

    #[test]
    fn test_format_row_contains_fields() {
        colored::control::set_override(false);
        let row = format_row(&record(), DEFAULT_DATE_FORMAT);
        assert_eq!(row, "   3 [2] Buy milk  02/01/1970");
    }

    #[test]
    fn test_format_empty_list() {
        assert!(format_list(&[], DEFAULT_DATE_FORMAT).contains("No tasks"));
    }
}
