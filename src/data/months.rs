//! Fiscal-year month ordering
//!
//! Aggregation keeps months in first-seen order. Display wants the Indian
//! financial year (April to March), so ordering is a separate step applied by
//! consumers that need it.

use super::aggregate::leading_integer;
use super::MonthSummary;

/// Months of the financial year in display order
pub const FISCAL_MONTHS: [&str; 12] = [
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
    "January",
    "February",
    "March",
];

const CALENDAR_MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Label used for blank month values
pub const UNKNOWN_MONTH: &str = "Unknown";

/// Normalizes an upstream month label for display
///
/// Numeric labels `1..=12` become calendar month names, English names or
/// prefixes of at least three letters in any case (`"Sept"`, `"dec"`) become
/// the canonical name, and anything else is returned with its first letter
/// upper-cased.
pub fn normalize_label(raw: &str) -> String {
    let label = raw.trim();
    if label.is_empty() {
        return UNKNOWN_MONTH.to_string();
    }

    if let Some(n) = leading_integer(label).filter(|n| (1..=12).contains(n)) {
        return CALENDAR_MONTHS[(n - 1) as usize].to_string();
    }

    let lower = label.to_lowercase();
    if let Some(name) = CALENDAR_MONTHS.iter().find(|name| {
        let name = name.to_lowercase();
        lower.len() >= 3 && name.starts_with(&lower)
    }) {
        return name.to_string();
    }

    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => UNKNOWN_MONTH.to_string(),
    }
}

/// Position of a label within the financial year, if it names a month
pub fn fiscal_index(raw: &str) -> Option<usize> {
    let label = normalize_label(raw);
    FISCAL_MONTHS.iter().position(|m| *m == label)
}

/// Sorts summaries April to March; unrecognized months keep their relative
/// order after March
pub fn sort_fiscal(summaries: &mut [MonthSummary]) {
    summaries.sort_by_key(|s| fiscal_index(&s.month).unwrap_or(FISCAL_MONTHS.len()));
}
