use crate::error::{KpiEngineError, Result};
use crate::metrics::Metric;
use crate::schema::{PeriodRecord, RawPeriodRow, RawValue};
use crate::utils::{canonicalize_period_label, parse_month_label};
use log::debug;
use std::collections::HashSet;

/// Validates one raw row and coerces it into a [`PeriodRecord`].
///
/// `row` is the 1-based data row number reported in validation errors.
pub fn normalize_row(raw: &RawPeriodRow, row: usize) -> Result<PeriodRecord> {
    let period = raw
        .period
        .as_ref()
        .and_then(RawValue::to_label)
        .or_else(|| raw.date.as_ref().and_then(RawValue::to_label))
        .map(|label| canonicalize_period_label(&label))
        .ok_or_else(|| {
            KpiEngineError::validation(row, "period", "a 'period' or 'date' value is required")
        })?;

    Ok(PeriodRecord {
        period,
        revenue: required_amount(raw, Metric::Revenue, row)?,
        cogs: required_amount(raw, Metric::Cogs, row)?,
        opex: required_amount(raw, Metric::Opex, row)?,
        ebitda: optional_amount(raw, Metric::Ebitda, row)?,
        net_income: optional_amount(raw, Metric::NetIncome, row)?,
        cash: optional_amount(raw, Metric::Cash, row)?,
        current_assets: optional_amount(raw, Metric::CurrentAssets, row)?,
        current_liabilities: optional_amount(raw, Metric::CurrentLiabilities, row)?,
        debt: optional_amount(raw, Metric::Debt, row)?,
        equity: optional_amount(raw, Metric::Equity, row)?,
        customers: optional_count(raw, Metric::Customers, row)?,
        employees: optional_count(raw, Metric::Employees, row)?,
        accounts_receivable: optional_amount(raw, Metric::AccountsReceivable, row)?,
        monthly_burn: optional_amount(raw, Metric::MonthlyBurn, row)?,
    })
}

/// Normalizes a batch of rows into an ordered, de-duplicated period sequence.
///
/// On a duplicate period label the first row seen is kept and later ones are
/// dropped, never merged. When every label is a calendar month the result is
/// sorted chronologically; otherwise the input order is kept.
pub fn normalize_rows(rows: &[RawPeriodRow]) -> Result<Vec<PeriodRecord>> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut periods = Vec::with_capacity(rows.len());

    for (idx, raw) in rows.iter().enumerate() {
        let record = normalize_row(raw, idx + 1)?;

        if !seen.insert(record.period.clone()) {
            debug!(
                "Dropping row {}: period '{}' already loaded from an earlier row",
                idx + 1,
                record.period
            );
            continue;
        }

        periods.push(record);
    }

    let months: Option<Vec<(i32, u32)>> = periods
        .iter()
        .map(|p| parse_month_label(&p.period))
        .collect();

    if months.is_some() {
        periods.sort_by_key(|p| parse_month_label(&p.period));
    } else {
        debug!("Non-calendar period labels present; keeping input order");
    }

    Ok(periods)
}

/// Reads an uploaded CSV into raw rows. Headers name the fields; empty cells are missing.
///
/// A malformed upload is a [`KpiEngineError::ValidationError`]. Row 0 is the header
/// line; data rows are numbered from 1 as in [`normalize_rows`].
pub fn parse_csv(bytes: &[u8]) -> Result<Vec<RawPeriodRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| csv_validation_error(0, &e, None))?
        .clone();
    check_headers(&headers)?;

    let mut rows = Vec::new();

    for (idx, record) in reader.records().enumerate() {
        let row = idx + 1;
        let record = record.map_err(|e| csv_validation_error(row, &e, Some(&headers)))?;
        let mut fields = serde_json::Map::new();

        for (header, cell) in headers.iter().zip(record.iter()) {
            if !cell.is_empty() {
                fields.insert(
                    header.to_string(),
                    serde_json::Value::String(cell.to_string()),
                );
            }
        }

        let raw = serde_json::from_value(serde_json::Value::Object(fields))
            .map_err(|e| KpiEngineError::validation(row, "row", e.to_string()))?;
        rows.push(raw);
    }

    Ok(rows)
}

/// Rejects headers that name the same field twice, counting `ar` as `accounts_receivable`.
fn check_headers(headers: &csv::StringRecord) -> Result<()> {
    let mut seen = HashSet::new();

    for header in headers.iter() {
        let field = if header == "ar" {
            Metric::AccountsReceivable.key()
        } else {
            header
        };

        if !header.is_empty() && !seen.insert(field) {
            return Err(KpiEngineError::validation(
                0,
                header,
                format!("column '{}' appears more than once", field),
            ));
        }
    }

    Ok(())
}

fn csv_validation_error(
    row: usize,
    err: &csv::Error,
    headers: Option<&csv::StringRecord>,
) -> KpiEngineError {
    match err.kind() {
        csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => KpiEngineError::validation(
            row,
            "row",
            format!("expected {} columns, found {}", expected_len, len),
        ),
        csv::ErrorKind::Utf8 { err: utf8, .. } => {
            let field = headers
                .and_then(|h| h.get(utf8.field()))
                .unwrap_or("header");
            KpiEngineError::validation(row, field, "cell is not valid UTF-8")
        }
        _ => KpiEngineError::validation(row, "row", err.to_string()),
    }
}

/// Six months of demo data for a growing mid-size company.
pub fn sample_rows() -> Vec<RawPeriodRow> {
    const SAMPLE: [(&str, f64, f64, f64, f64, f64, f64, f64); 6] = [
        ("2024-07", 1_850_000.0, 1_110_000.0, 410_000.0, 247_500.0, 3_100_000.0, 45.0, 1800.0),
        ("2024-08", 1_920_000.0, 1_152_000.0, 415_000.0, 264_750.0, 3_200_000.0, 47.0, 1920.0),
        ("2024-09", 2_050_000.0, 1_230_000.0, 420_000.0, 300_000.0, 3_300_000.0, 48.0, 2050.0),
        ("2024-10", 2_180_000.0, 1_308_000.0, 418_000.0, 340_500.0, 3_500_000.0, 49.0, 2100.0),
        ("2024-11", 2_320_000.0, 1_392_000.0, 422_000.0, 379_500.0, 3_800_000.0, 50.0, 2180.0),
        ("2024-12", 2_450_000.0, 1_470_000.0, 425_000.0, 416_250.0, 4_200_000.0, 51.0, 2195.0),
    ];

    SAMPLE
        .iter()
        .map(
            |&(period, revenue, cogs, opex, net_income, cash, employees, customers)| {
                RawPeriodRow::new(period, revenue, cogs, opex)
                    .with(Metric::NetIncome, net_income)
                    .with(Metric::Cash, cash)
                    .with(Metric::Employees, employees)
                    .with(Metric::Customers, customers)
            },
        )
        .collect()
}

fn numeric_field(raw: &RawPeriodRow, metric: Metric, row: usize) -> Result<Option<f64>> {
    match raw.field(metric) {
        None => Ok(None),
        Some(value) => value
            .to_number()
            .map_err(|details| KpiEngineError::validation(row, metric.key(), details)),
    }
}

fn required_amount(raw: &RawPeriodRow, metric: Metric, row: usize) -> Result<f64> {
    let value = numeric_field(raw, metric, row)?
        .ok_or_else(|| KpiEngineError::validation(row, metric.key(), "value is required"))?;

    if value < 0.0 {
        return Err(KpiEngineError::validation(
            row,
            metric.key(),
            format!("must be >= 0 (got {})", value),
        ));
    }

    Ok(value)
}

fn optional_amount(raw: &RawPeriodRow, metric: Metric, row: usize) -> Result<Option<f64>> {
    numeric_field(raw, metric, row)
}

fn optional_count(raw: &RawPeriodRow, metric: Metric, row: usize) -> Result<Option<u32>> {
    let Some(value) = numeric_field(raw, metric, row)? else {
        return Ok(None);
    };

    if value < 0.0 || value.fract() != 0.0 || value > f64::from(u32::MAX) {
        return Err(KpiEngineError::validation(
            row,
            metric.key(),
            format!("must be a non-negative whole number (got {})", value),
        ));
    }

    Ok(Some(value as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_row_coerces_period_and_numbers() {
        let raw = RawPeriodRow {
            date: Some(RawValue::from("Aug 2024")),
            revenue: Some(RawValue::from("1,920,000")),
            cogs: Some(RawValue::Number(1_152_000.0)),
            opex: Some(RawValue::from("415000")),
            employees: Some(RawValue::from("47")),
            ..RawPeriodRow::default()
        };

        let record = normalize_row(&raw, 1).unwrap();
        assert_eq!(record.period, "2024-08");
        assert_eq!(record.revenue, 1_920_000.0);
        assert_eq!(record.opex, 415_000.0);
        assert_eq!(record.employees, Some(47));
        assert_eq!(record.cash, None);
    }

    #[test]
    fn test_period_takes_precedence_over_date() {
        let mut raw = RawPeriodRow::new("2024-09", 10.0, 1.0, 1.0);
        raw.date = Some(RawValue::from("2023-01"));
        assert_eq!(normalize_row(&raw, 1).unwrap().period, "2024-09");
    }

    #[test]
    fn test_missing_required_field_is_rejected_with_field_detail() {
        let mut raw = RawPeriodRow::new("2024-07", 100.0, 50.0, 10.0);
        raw.cogs = None;

        match normalize_row(&raw, 3) {
            Err(KpiEngineError::ValidationError { row, field, .. }) => {
                assert_eq!(row, 3);
                assert_eq!(field, "cogs");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_period_is_rejected() {
        let mut raw = RawPeriodRow::new("2024-07", 100.0, 50.0, 10.0);
        raw.period = None;
        let err = normalize_row(&raw, 1).unwrap_err();
        assert!(matches!(err, KpiEngineError::ValidationError { ref field, .. } if field == "period"));
    }

    #[test]
    fn test_negative_revenue_is_rejected() {
        let raw = RawPeriodRow::new("2024-07", -1.0, 0.0, 0.0);
        let err = normalize_row(&raw, 1).unwrap_err();
        assert!(matches!(err, KpiEngineError::ValidationError { ref field, .. } if field == "revenue"));
    }

    #[test]
    fn test_non_numeric_optional_field_is_rejected() {
        let raw = RawPeriodRow::new("2024-07", 1.0, 0.0, 0.0).with(Metric::Cash, "lots");
        let err = normalize_row(&raw, 1).unwrap_err();
        assert!(matches!(err, KpiEngineError::ValidationError { ref field, .. } if field == "cash"));
    }

    #[test]
    fn test_fractional_count_is_rejected() {
        let raw = RawPeriodRow::new("2024-07", 1.0, 0.0, 0.0).with(Metric::Customers, 10.5);
        assert!(normalize_row(&raw, 1).is_err());
    }

    #[test]
    fn test_duplicates_keep_first_and_months_are_sorted() {
        let rows = vec![
            RawPeriodRow::new("2024-09", 300.0, 0.0, 0.0),
            RawPeriodRow::new("2024-07", 100.0, 0.0, 0.0),
            RawPeriodRow::new("2024-07-31", 999.0, 0.0, 0.0),
            RawPeriodRow::new("2024-08", 200.0, 0.0, 0.0),
        ];

        let periods = normalize_rows(&rows).unwrap();
        let labels: Vec<&str> = periods.iter().map(|p| p.period.as_str()).collect();
        assert_eq!(labels, vec!["2024-07", "2024-08", "2024-09"]);
        assert_eq!(periods[0].revenue, 100.0);
    }

    #[test]
    fn test_non_calendar_labels_keep_input_order() {
        let rows = vec![
            RawPeriodRow::new("Q2", 2.0, 0.0, 0.0),
            RawPeriodRow::new("Q1", 1.0, 0.0, 0.0),
        ];

        let periods = normalize_rows(&rows).unwrap();
        assert_eq!(periods[0].period, "Q2");
        assert_eq!(periods[1].period, "Q1");
    }

    #[test]
    fn test_parse_csv() {
        let csv = "date,revenue,cogs,opex,ar,cash,notes\n\
                   2024-07,\"1,850,000\",1110000,410000,90000,,first\n\
                   2024-08,1920000,1152000,415000,,3200000,\n";

        let rows = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].revenue, Some(RawValue::from("1,850,000")));
        assert_eq!(rows[0].accounts_receivable, Some(RawValue::from("90000")));
        assert_eq!(rows[0].cash, None);

        let periods = normalize_rows(&rows).unwrap();
        assert_eq!(periods[0].revenue, 1_850_000.0);
        assert_eq!(periods[1].cash, Some(3_200_000.0));
    }

    #[test]
    fn test_parse_csv_rejects_ragged_row() {
        let csv = "period,revenue,cogs,opex\n2024-07,100,50,20\n2024-08,100,50\n";
        let err = parse_csv(csv.as_bytes()).unwrap_err();

        assert!(err.is_rejected_input());
        match err {
            KpiEngineError::ValidationError { row, field, details } => {
                assert_eq!(row, 2);
                assert_eq!(field, "row");
                assert!(details.contains("expected 4 columns, found 3"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_csv_rejects_invalid_utf8() {
        let mut bytes = b"period,revenue,cogs,opex\n2024-07,".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe]);
        bytes.extend_from_slice(b",50,20\n");

        match parse_csv(&bytes) {
            Err(KpiEngineError::ValidationError { row, field, .. }) => {
                assert_eq!(row, 1);
                assert_eq!(field, "revenue");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_csv_rejects_duplicate_columns() {
        let csv = "period,revenue,cogs,opex,ar,accounts_receivable\n2024-07,1,1,1,5,6\n";
        match parse_csv(csv.as_bytes()) {
            Err(KpiEngineError::ValidationError { row, field, .. }) => {
                assert_eq!(row, 0);
                assert_eq!(field, "accounts_receivable");
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        let csv = "period,revenue,revenue,cogs,opex\n2024-07,1,2,1,1\n";
        assert!(parse_csv(csv.as_bytes()).unwrap_err().is_rejected_input());
    }

    #[test]
    fn test_negative_cogs_and_opex_are_rejected() {
        for (metric, raw) in [
            (Metric::Cogs, RawPeriodRow::new("2024-07", 100.0, -1.0, 0.0)),
            (Metric::Opex, RawPeriodRow::new("2024-07", 100.0, 0.0, -1.0)),
        ] {
            match normalize_row(&raw, 1) {
                Err(KpiEngineError::ValidationError { field, .. }) => {
                    assert_eq!(field, metric.key());
                }
                other => panic!("expected validation error, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_doubled_negative_markers_are_rejected() {
        for text in ["--5", "(-5)", "-$-5"] {
            let revenue = RawPeriodRow::new("2024-07", 1.0, 0.0, 0.0).with(Metric::Revenue, text);
            let err = normalize_row(&revenue, 1).unwrap_err();
            assert!(matches!(err, KpiEngineError::ValidationError { ref field, .. } if field == "revenue"));

            let cash = RawPeriodRow::new("2024-07", 1.0, 0.0, 0.0).with(Metric::Cash, text);
            let err = normalize_row(&cash, 1).unwrap_err();
            assert!(matches!(err, KpiEngineError::ValidationError { ref field, .. } if field == "cash"));
        }
    }

    #[test]
    fn test_sample_rows_normalize() {
        let periods = normalize_rows(&sample_rows()).unwrap();
        assert_eq!(periods.len(), 6);
        assert_eq!(periods[5].period, "2024-12");
        assert_eq!(periods[5].customers, Some(2195));
    }
}
