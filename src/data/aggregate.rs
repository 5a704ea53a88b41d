//! Monthly aggregation of upstream rows
//!
//! Folds raw per-record rows into one [`MonthSummary`] per distinct month
//! label. The upstream schema is unstable, so each logical field is resolved
//! through an ordered list of accepted field names and every value is coerced
//! defensively (missing or non-numeric values count as zero).

use std::collections::HashMap;

use serde_json::Value;

use super::{MonthSummary, RawRecord};

/// Accepted spellings of the month field, in lookup order
pub const MONTH_FIELDS: &[&str] = &["month", "Month", "MONTH"];

/// Accepted spellings of the total expenditure field
pub const EXPENDITURE_FIELDS: &[&str] = &["Total_Exp"];

/// Accepted spellings of the households-worked field
pub const HOUSEHOLDS_FIELDS: &[&str] = &["Total_Households_Worked"];

/// Accepted spellings of the 15-day payment percentage field
// Upstream misspells "generated"
pub const PAYMENT_WITHIN_15_DAYS_FIELDS: &[&str] =
    &["percentage_payments_gererated_within_15_days"];

/// Accepted spellings of the approved labour budget field
pub const LABOUR_BUDGET_FIELDS: &[&str] = &["Approved_Labour_Budget"];

/// Accepted spellings of the average wage rate field
pub const WAGE_RATE_FIELDS: &[&str] = &["Average_Wage_rate_per_day_per_person"];

/// Running totals for one month group
#[derive(Debug)]
struct MonthAccumulator {
    month: String,
    expenditure: f64,
    households: i64,
    payment_sum: f64,
    payment_count: u32,
    labour_budget: f64,
    wage_rate: f64,
}

impl MonthAccumulator {
    /// Starts a group; budget and wage rate come from its first record only
    fn new(month: String, first: &RawRecord) -> Self {
        Self {
            month,
            expenditure: 0.0,
            households: 0,
            payment_sum: 0.0,
            payment_count: 0,
            labour_budget: number(field(first, LABOUR_BUDGET_FIELDS)),
            wage_rate: number(field(first, WAGE_RATE_FIELDS)),
        }
    }

    fn add(&mut self, record: &RawRecord) {
        self.expenditure += number(field(record, EXPENDITURE_FIELDS));
        self.households = self
            .households
            .saturating_add(integer(field(record, HOUSEHOLDS_FIELDS)));
        self.payment_sum += number(field(record, PAYMENT_WITHIN_15_DAYS_FIELDS));
        self.payment_count += 1;
    }

    fn finish(self) -> MonthSummary {
        let mean_payment = if self.payment_count == 0 {
            0.0
        } else {
            self.payment_sum / f64::from(self.payment_count)
        };

        MonthSummary {
            month: self.month,
            total_expenditure: to_fixed_2(self.expenditure),
            approved_labour_budget: self.labour_budget,
            average_wage_rate: self.wage_rate,
            total_households_worked: self.households,
            avg_payment_within_15_days: to_fixed_2(mean_payment),
        }
    }
}

/// Aggregates raw rows into monthly summaries
///
/// Records with no recognizable month are skipped entirely. Month labels are
/// grouped verbatim, so `"April"` and `"APRIL"` form separate groups. Output
/// follows the order in which each month was first seen, not calendar order;
/// see [`super::months::sort_fiscal`] for display ordering.
pub fn aggregate(records: &[RawRecord]) -> Vec<MonthSummary> {
    let mut groups: Vec<MonthAccumulator> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let Some(month) = month_of(record) else {
            continue;
        };

        let slot = match index.get(&month) {
            Some(&slot) => slot,
            None => {
                groups.push(MonthAccumulator::new(month.clone(), record));
                index.insert(month, groups.len() - 1);
                groups.len() - 1
            }
        };

        groups[slot].add(record);
    }

    groups.into_iter().map(MonthAccumulator::finish).collect()
}

/// Resolves the month label of a record from the accepted field names
///
/// The first alias holding a usable value wins; empty strings, zero and
/// non-scalar values are not usable.
pub fn month_of(record: &RawRecord) -> Option<String> {
    MONTH_FIELDS
        .iter()
        .filter_map(|name| record.get(name))
        .find_map(|value| match value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) if n.as_f64().is_some_and(|v| v != 0.0) => Some(n.to_string()),
            _ => None,
        })
}

/// Returns the first present, non-null value among a field's aliases
fn field<'a>(record: &'a RawRecord, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .filter_map(|name| record.get(name))
        .find(|value| !value.is_null())
}

/// Coerces a value to a float, treating anything unparseable as zero
fn number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => leading_float(s).unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Coerces a value to an integer, truncating fractions
fn integer(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|v| v.is_finite()).map(|v| v.trunc() as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => leading_integer(s).unwrap_or(0),
        _ => 0,
    }
}

/// Formats with two decimals, rounding exact halfway values away from zero
///
/// `{:.2}` rounds the exact binary value correctly except on ties, where it
/// picks the even digit. The only doubles that sit exactly halfway between
/// two cents are odd multiples of 1/8 (`0.125`, `80.375`, ...).
pub(crate) fn to_fixed_2(x: f64) -> String {
    let eighths = x * 8.0;
    if x.abs() < 1e15 && eighths.fract() == 0.0 && eighths % 2.0 != 0.0 {
        return format!("{:.2}", (x * 100.0).round() / 100.0);
    }
    format!("{:.2}", x)
}

/// Parses the longest numeric prefix of a string, e.g. `"12.5 lakh"` -> 12.5
pub(crate) fn leading_float(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        end = frac_end;
    }

    if digits == 0 {
        return None;
    }

    // Exponent only counts when digits follow it
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse().ok()
}

/// Parses the longest integer prefix of a string, e.g. `"42 households"` -> 42
pub(crate) fn leading_integer(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }

    if end == digits_start {
        return None;
    }
    s[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> RawRecord {
        serde_json::from_value(value).expect("test record should be an object")
    }

    #[test]
    fn test_two_rows_same_month() {
        let records = vec![
            record(json!({
                "month": "April",
                "Total_Exp": 100000,
                "Total_Households_Worked": 10,
                "percentage_payments_gererated_within_15_days": 80
            })),
            record(json!({
                "month": "April",
                "Total_Exp": 50000,
                "Total_Households_Worked": 5,
                "percentage_payments_gererated_within_15_days": 90
            })),
        ];

        let summaries = aggregate(&records);

        assert_eq!(summaries.len(), 1);
        let april = &summaries[0];
        assert_eq!(april.month, "April");
        assert_eq!(april.total_expenditure, "150000.00");
        assert_eq!(april.total_households_worked, 15);
        assert_eq!(april.avg_payment_within_15_days, "85.00");
    }

    #[test]
    fn test_halfway_values_round_up() {
        let records = vec![
            record(json!({
                "month": "April",
                "Total_Exp": 0.125,
                "percentage_payments_gererated_within_15_days": 80.25
            })),
            record(json!({
                "month": "April",
                "Total_Exp": 0,
                "percentage_payments_gererated_within_15_days": 80.0
            })),
        ];

        let april = &aggregate(&records)[0];

        assert_eq!(april.total_expenditure, "0.13");
        assert_eq!(april.avg_payment_within_15_days, "80.13");
    }

    #[test]
    fn test_to_fixed_2() {
        assert_eq!(to_fixed_2(0.375), "0.38");
        assert_eq!(to_fixed_2(2.5), "2.50");
        assert_eq!(to_fixed_2(-0.125), "-0.13");
        assert_eq!(to_fixed_2(150000.0), "150000.00");
        // 1.005 is stored slightly below the halfway point
        assert_eq!(to_fixed_2(1.005), "1.00");
        assert_eq!(to_fixed_2(33.333333), "33.33");
    }

    #[test]
    fn test_records_without_month_are_skipped() {
        let records = vec![
            record(json!({"Total_Exp": 999, "Total_Households_Worked": 99})),
            record(json!({"month": "", "Total_Exp": 999})),
            record(json!({"month": "May", "Total_Exp": "10.5"})),
        ];

        let summaries = aggregate(&records);

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].month, "May");
        assert_eq!(summaries[0].total_expenditure, "10.50");
        assert_eq!(summaries[0].total_households_worked, 0);
    }

    #[test]
    fn test_month_aliases_are_tried_in_order() {
        let records = vec![
            record(json!({"Month": "June", "Total_Exp": 1})),
            record(json!({"MONTH": "June", "Total_Exp": 2})),
            record(json!({"month": "", "Month": "June", "Total_Exp": 3})),
        ];

        let summaries = aggregate(&records);

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].total_expenditure, "6.00");
    }

    #[test]
    fn test_month_labels_are_not_normalized() {
        let records = vec![
            record(json!({"month": "April"})),
            record(json!({"month": "APRIL"})),
        ];

        let months: Vec<String> = aggregate(&records).into_iter().map(|s| s.month).collect();

        assert_eq!(months, vec!["April", "APRIL"]);
    }

    #[test]
    fn test_output_keeps_first_seen_order() {
        let records = vec![
            record(json!({"month": "Jan"})),
            record(json!({"month": "Apr"})),
            record(json!({"month": "Jan"})),
            record(json!({"month": "Dec"})),
        ];

        let months: Vec<String> = aggregate(&records).into_iter().map(|s| s.month).collect();

        assert_eq!(months, vec!["Jan", "Apr", "Dec"]);
    }

    #[test]
    fn test_budget_and_wage_come_from_first_record() {
        let records = vec![
            record(json!({
                "month": "July",
                "Approved_Labour_Budget": "5000",
                "Average_Wage_rate_per_day_per_person": 250.75
            })),
            record(json!({
                "month": "July",
                "Approved_Labour_Budget": 9999,
                "Average_Wage_rate_per_day_per_person": 1.0
            })),
        ];

        let july = &aggregate(&records)[0];

        assert_eq!(july.approved_labour_budget, 5000.0);
        assert_eq!(july.average_wage_rate, 250.75);
    }

    #[test]
    fn test_missing_percentage_counts_toward_mean() {
        let records = vec![
            record(json!({"month": "Aug", "percentage_payments_gererated_within_15_days": "100"})),
            record(json!({"month": "Aug"})),
            record(json!({"month": "Aug", "percentage_payments_gererated_within_15_days": null})),
        ];

        let aug = &aggregate(&records)[0];

        assert_eq!(aug.avg_payment_within_15_days, "33.33");
    }

    #[test]
    fn test_non_numeric_values_count_as_zero() {
        let records = vec![record(json!({
            "month": "Sep",
            "Total_Exp": "n/a",
            "Total_Households_Worked": "unknown",
            "percentage_payments_gererated_within_15_days": true
        }))];

        let sep = &aggregate(&records)[0];

        assert_eq!(sep.total_expenditure, "0.00");
        assert_eq!(sep.total_households_worked, 0);
        assert_eq!(sep.avg_payment_within_15_days, "0.00");
    }

    #[test]
    fn test_households_truncate_fractions() {
        let records = vec![
            record(json!({"month": "Oct", "Total_Households_Worked": "12.9"})),
            record(json!({"month": "Oct", "Total_Households_Worked": 3.7})),
        ];

        assert_eq!(aggregate(&records)[0].total_households_worked, 15);
    }

    #[test]
    fn test_numeric_month_becomes_label() {
        let records = vec![record(json!({"month": 4})), record(json!({"month": 0}))];

        let summaries = aggregate(&records);

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].month, "4");
    }

    #[test]
    fn test_aggregate_is_repeatable() {
        let records = vec![
            record(json!({"month": "Nov", "Total_Exp": 12.345})),
            record(json!({"month": "Dec", "Total_Exp": 1})),
        ];

        assert_eq!(aggregate(&records), aggregate(&records));
    }

    #[test]
    fn test_empty_input() {
        assert!(aggregate(&[]).is_empty());
    }

    #[test]
    fn test_leading_float() {
        assert_eq!(leading_float("12.5 lakh"), Some(12.5));
        assert_eq!(leading_float("  -3"), Some(-3.0));
        assert_eq!(leading_float(".5"), Some(0.5));
        assert_eq!(leading_float("1e3x"), Some(1000.0));
        assert_eq!(leading_float("7e"), Some(7.0));
        assert_eq!(leading_float("1,500"), Some(1.0));
        assert_eq!(leading_float("abc"), None);
        assert_eq!(leading_float("-"), None);
        assert_eq!(leading_float(""), None);
    }

    #[test]
    fn test_leading_integer() {
        assert_eq!(leading_integer("42 households"), Some(42));
        assert_eq!(leading_integer("12.9"), Some(12));
        assert_eq!(leading_integer("-7"), Some(-7));
        assert_eq!(leading_integer("x1"), None);
    }
}
