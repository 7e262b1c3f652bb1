use crate::kpi::compute_kpi_set;
use crate::metrics::{Metric, MetricKind, MetricPolarity};
use crate::schema::{KpiSet, PeriodRecord};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum VarianceStatus {
    Favorable,
    Unfavorable,
}

/// One metric compared between a current value and a baseline (prior period or budget).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VarianceEntry {
    pub metric: Metric,
    pub label: String,
    pub kind: MetricKind,
    pub current_value: f64,
    pub comparison_value: f64,
    pub variance_amount: f64,
    #[schemars(description = "(current - comparison) / |comparison| × 100, null for a zero baseline")]
    pub variance_percent: Option<f64>,
    pub status: VarianceStatus,
    pub driver_explanation: String,
}

impl VarianceEntry {
    /// Builds the entry for a metric whose value is known on both sides.
    pub fn new(metric: Metric, current: f64, comparison: f64) -> Self {
        let variance_amount = current - comparison;
        let variance_percent = variance_percent(current, comparison);
        let status = classify(metric.polarity(), current, comparison);

        Self {
            metric,
            label: metric.label().to_string(),
            kind: metric.kind(),
            current_value: current,
            comparison_value: comparison,
            variance_amount,
            variance_percent,
            status,
            driver_explanation: explain_driver(metric, variance_amount, variance_percent, status),
        }
    }

    pub fn is_favorable(&self) -> bool {
        self.status == VarianceStatus::Favorable
    }
}

pub fn variance_percent(current: f64, comparison: f64) -> Option<f64> {
    if comparison == 0.0 {
        return None;
    }

    let value = (current - comparison) / comparison.abs() * 100.0;
    value.is_finite().then_some(value)
}

/// Favorability of `current` against `comparison`.
///
/// A zero baseline has no meaningful direction, so the sign of `current` decides:
/// higher-is-better metrics are favorable when positive, lower-is-better metrics
/// when zero or negative.
pub fn classify(polarity: MetricPolarity, current: f64, comparison: f64) -> VarianceStatus {
    let favorable = if comparison == 0.0 {
        match polarity {
            MetricPolarity::HigherIsBetter => current > 0.0,
            MetricPolarity::LowerIsBetter => current <= 0.0,
        }
    } else {
        polarity.is_favorable(current, comparison)
    };

    if favorable {
        VarianceStatus::Favorable
    } else {
        VarianceStatus::Unfavorable
    }
}

/// Compares two KPI sets over every KPI that is available in both.
pub fn compare_kpis(current: &KpiSet, comparison: &KpiSet) -> Vec<VarianceEntry> {
    Metric::KPIS
        .iter()
        .filter_map(|metric| {
            let current_value = current.value(*metric)?;
            let comparison_value = comparison.value(*metric)?;
            Some(VarianceEntry::new(*metric, current_value, comparison_value))
        })
        .collect()
}

/// Compares the raw financial fields of two periods that are present in both.
pub fn compare_records(current: &PeriodRecord, comparison: &PeriodRecord) -> Vec<VarianceEntry> {
    Metric::RAW_FIELDS
        .iter()
        .filter_map(|metric| {
            let current_value = current.value(*metric)?;
            let comparison_value = comparison.value(*metric)?;
            Some(VarianceEntry::new(*metric, current_value, comparison_value))
        })
        .collect()
}

/// Actual-versus-budget comparison.
///
/// Both records are treated as standalone periods: the derived KPIs come first,
/// followed by the raw fields that are not already covered by a KPI.
pub fn compare_to_budget(actual: &PeriodRecord, budget: &PeriodRecord) -> Vec<VarianceEntry> {
    let actual_kpis = compute_kpi_set(actual, None, None);
    let budget_kpis = compute_kpi_set(budget, None, None);

    let mut entries = compare_kpis(&actual_kpis, &budget_kpis);
    entries.extend(
        compare_records(actual, budget)
            .into_iter()
            .filter(|entry| !Metric::KPIS.contains(&entry.metric)),
    );
    entries
}

fn explain_driver(
    metric: Metric,
    amount: f64,
    percent: Option<f64>,
    status: VarianceStatus,
) -> String {
    let favorable = status == VarianceStatus::Favorable;
    let label = metric.label();

    if amount == 0.0 {
        return format!("{} was unchanged.", label);
    }

    let direction = if amount > 0.0 { "increased" } else { "decreased" };
    let change = match (metric.kind(), percent) {
        (MetricKind::Percent, _) => format!("by {:.1}pp", amount.abs()),
        (_, Some(pct)) => format!("by {:.1}%", pct.abs()),
        (_, None) => "from a zero base".to_string(),
    };
    let abs_pct = percent.map(f64::abs);

    match metric {
        Metric::Revenue => match abs_pct {
            Some(pct) if pct > 10.0 => format!(
                "Revenue {} significantly ({:.1}%), indicating {}.",
                direction,
                pct,
                if favorable {
                    "strong momentum"
                } else {
                    "potential market challenges"
                }
            ),
            Some(pct) if pct > 5.0 => format!(
                "Revenue {} moderately ({:.1}%), {}.",
                direction,
                pct,
                if favorable {
                    "continuing growth trajectory"
                } else {
                    "requiring attention"
                }
            ),
            Some(pct) => format!(
                "Revenue remained relatively stable with a minor {} of {:.1}%.",
                if amount > 0.0 { "increase" } else { "decrease" },
                pct
            ),
            None => format!("Revenue {} {}.", direction, change),
        },
        Metric::GrossProfit | Metric::GrossMargin => {
            if favorable {
                format!(
                    "Gross margin improved {}, suggesting better pricing realization or COGS efficiency.",
                    change
                )
            } else {
                format!(
                    "Gross margin declined {}, potentially due to pricing pressure or higher input costs.",
                    change
                )
            }
        }
        Metric::OperatingIncome | Metric::OperatingMargin => {
            let is_margin = metric == Metric::OperatingMargin;
            if favorable {
                format!(
                    "Operating performance improved, reflecting {}.",
                    if is_margin {
                        "operating leverage"
                    } else {
                        "better cost management"
                    }
                )
            } else {
                format!(
                    "Operating performance declined, potentially due to {}.",
                    if is_margin {
                        "increased operating costs"
                    } else {
                        "cost overruns"
                    }
                )
            }
        }
        Metric::OpexRatio => {
            if favorable {
                "OpEx ratio improved (lower), indicating better expense control relative to revenue."
                    .to_string()
            } else {
                "OpEx ratio increased, suggesting expenses grew faster than revenue.".to_string()
            }
        }
        Metric::Ebitda | Metric::EbitdaMargin => format!(
            "EBITDA {} {}, {} core operating performance.",
            direction,
            change,
            if favorable { "strengthening" } else { "weakening" }
        ),
        Metric::NetIncome | Metric::NetMargin => format!(
            "Bottom line {} {}, {} overall profitability.",
            direction,
            change,
            if favorable { "improving" } else { "impacting" }
        ),
        Metric::Cogs | Metric::Opex => format!(
            "{} {} {}, {} cost pressure.",
            label,
            direction,
            change,
            if favorable { "easing" } else { "adding" }
        ),
        _ => format!("{} {} {}.", label, direction, change),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kpi::calculate_kpis;

    fn record(label: &str, revenue: f64, cogs: f64, opex: f64) -> PeriodRecord {
        PeriodRecord {
            period: label.to_string(),
            revenue,
            cogs,
            opex,
            ebitda: None,
            net_income: None,
            cash: None,
            current_assets: None,
            current_liabilities: None,
            debt: None,
            equity: None,
            customers: None,
            employees: None,
            accounts_receivable: None,
            monthly_burn: None,
        }
    }

    fn find(entries: &[VarianceEntry], metric: Metric) -> &VarianceEntry {
        entries
            .iter()
            .find(|e| e.metric == metric)
            .unwrap_or_else(|| panic!("no entry for {:?}", metric))
    }

    #[test]
    fn test_gross_margin_improvement_is_favorable() {
        let entry = VarianceEntry::new(Metric::GrossMargin, 40.0, 39.8);
        assert!((entry.variance_percent.unwrap() - 0.5025).abs() < 1e-3);
        assert_eq!(entry.status, VarianceStatus::Favorable);
        assert!(entry.driver_explanation.contains("0.2pp"));
    }

    #[test]
    fn test_opex_ratio_increase_is_unfavorable() {
        let entry = VarianceEntry::new(Metric::OpexRatio, 22.0, 21.0);
        assert_eq!(entry.status, VarianceStatus::Unfavorable);
        assert!(entry.driver_explanation.starts_with("OpEx ratio increased"));
    }

    #[test]
    fn test_variance_percent_uses_absolute_baseline() {
        let entry = VarianceEntry::new(Metric::NetIncome, -50.0, -100.0);
        assert!((entry.variance_percent.unwrap() - 50.0).abs() < 1e-9);
        assert_eq!(entry.status, VarianceStatus::Favorable);
        assert!((entry.variance_amount - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_baseline() {
        let up = VarianceEntry::new(Metric::Revenue, 10.0, 0.0);
        assert_eq!(up.variance_percent, None);
        assert_eq!(up.status, VarianceStatus::Favorable);

        let flat = VarianceEntry::new(Metric::Revenue, 0.0, 0.0);
        assert_eq!(flat.status, VarianceStatus::Unfavorable);

        let cost = VarianceEntry::new(Metric::Opex, 10.0, 0.0);
        assert_eq!(cost.status, VarianceStatus::Unfavorable);
        assert!(cost.driver_explanation.contains("zero base"));
    }

    #[test]
    fn test_ties_are_favorable() {
        assert_eq!(
            classify(MetricPolarity::LowerIsBetter, 3.0, 3.0),
            VarianceStatus::Favorable
        );
        assert_eq!(
            VarianceEntry::new(Metric::Revenue, 7.0, 7.0).driver_explanation,
            "Revenue was unchanged."
        );
    }

    #[test]
    fn test_revenue_driver_thresholds() {
        let big = VarianceEntry::new(Metric::Revenue, 1200.0, 1000.0);
        assert!(big.driver_explanation.contains("significantly (20.0%)"));

        let mid = VarianceEntry::new(Metric::Revenue, 1070.0, 1000.0);
        assert!(mid.driver_explanation.contains("moderately"));

        let small = VarianceEntry::new(Metric::Revenue, 990.0, 1000.0);
        assert!(small.driver_explanation.contains("relatively stable"));
        assert_eq!(small.status, VarianceStatus::Unfavorable);
    }

    #[test]
    fn test_compare_kpis_skips_gaps() {
        let periods = vec![
            record("2024-07", 1_850_000.0, 1_110_000.0, 410_000.0),
            record("2024-08", 1_920_000.0, 1_152_000.0, 415_000.0),
        ];
        let kpis = calculate_kpis(&periods);

        let entries = compare_kpis(&kpis[1], &kpis[0]);
        assert!(entries.iter().all(|e| e.metric != Metric::MomGrowth));
        assert!(entries.iter().all(|e| e.metric != Metric::CurrentRatio));

        let revenue = find(&entries, Metric::Revenue);
        assert_eq!(revenue.status, VarianceStatus::Favorable);
        assert!((revenue.variance_amount - 70_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_compare_records_uses_raw_polarity() {
        let current = record("2024-08", 100.0, 60.0, 30.0);
        let prior = record("2024-07", 100.0, 50.0, 30.0);

        let entries = compare_records(&current, &prior);
        assert_eq!(entries.len(), 3);
        assert_eq!(find(&entries, Metric::Cogs).status, VarianceStatus::Unfavorable);
        assert_eq!(find(&entries, Metric::Opex).status, VarianceStatus::Favorable);
    }

    #[test]
    fn test_compare_to_budget() {
        let mut actual = record("2024-08", 1_000.0, 550.0, 250.0);
        actual.cash = Some(900.0);
        let mut budget = record("2024-08", 1_100.0, 550.0, 240.0);
        budget.cash = Some(1_000.0);

        let entries = compare_to_budget(&actual, &budget);
        assert_eq!(find(&entries, Metric::Revenue).status, VarianceStatus::Unfavorable);
        assert_eq!(find(&entries, Metric::Cogs).status, VarianceStatus::Favorable);
        assert_eq!(find(&entries, Metric::Cash).status, VarianceStatus::Unfavorable);
        assert_eq!(
            entries.iter().filter(|e| e.metric == Metric::Revenue).count(),
            1
        );
    }
}
