use chrono::{DateTime, Datelike, NaiveDate};

const FULL_DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

pub fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

pub fn month_label(year: i32, month: u32) -> String {
    format!("{:04}-{:02}", year, month)
}

/// Resolves a date-like period label to its (year, month).
///
/// Accepted shapes: `2024-07`, `2024-07-31`, `2024/07`, `2024/07/31`, `07/2024`,
/// `Jul 2024`, `July 2024` and RFC 3339 timestamps. Anything else yields `None`.
pub fn parse_month_label(label: &str) -> Option<(i32, u32)> {
    let label = label.trim();
    if label.is_empty() {
        return None;
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(label) {
        return Some((timestamp.year(), timestamp.month()));
    }

    for format in FULL_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(label, format) {
            return Some((date.year(), date.month()));
        }
    }

    // Month-only shapes get a synthetic first day so chrono can parse them.
    let candidates = [
        (format!("{}-01", label), "%Y-%m-%d"),
        (format!("{}/01", label), "%Y/%m/%d"),
        (format!("01/{}", label), "%d/%m/%Y"),
        (format!("01 {}", label), "%d %B %Y"),
    ];

    candidates
        .iter()
        .find_map(|(text, format)| NaiveDate::parse_from_str(text, format).ok())
        .map(|date| (date.year(), date.month()))
}

/// Canonical form of a period label: `YYYY-MM` when date-like, trimmed text otherwise.
pub fn canonicalize_period_label(label: &str) -> String {
    match parse_month_label(label) {
        Some((year, month)) => month_label(year, month),
        None => label.trim().to_string(),
    }
}

/// Label of the period `steps` months after `label`.
/// Labels that are not months get a relative suffix instead (`Q4+2`).
pub fn next_period_label(label: &str, steps: u32) -> String {
    match parse_month_label(label) {
        Some((mut year, mut month)) => {
            for _ in 0..steps {
                (year, month) = next_month(year, month);
            }
            month_label(year, month)
        }
        None => format!("{}+{}", label.trim(), steps),
    }
}

/// The `YYYY-MM` label twelve months before `label`, if `label` is a month.
pub fn same_month_prior_year(label: &str) -> Option<String> {
    parse_month_label(label).map(|(year, month)| month_label(year - 1, month))
}
