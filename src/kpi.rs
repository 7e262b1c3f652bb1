use crate::schema::{KpiSet, PeriodRecord};
use crate::utils::same_month_prior_year;
use std::collections::HashMap;

/// Computes KPI sets over an ordered period sequence.
///
/// Each set only looks at its own period, the immediately preceding one in the
/// sequence (MoM growth) and, when present, the same calendar month a year earlier
/// (YoY growth). The year-ago lookup goes through a label index, not a scan.
pub struct KpiCalculator<'a> {
    periods: &'a [PeriodRecord],
    index: HashMap<&'a str, usize>,
}

impl<'a> KpiCalculator<'a> {
    pub fn new(periods: &'a [PeriodRecord]) -> Self {
        let index = periods
            .iter()
            .enumerate()
            .map(|(i, p)| (p.period.as_str(), i))
            .collect();

        Self { periods, index }
    }

    pub fn calculate(&self) -> Vec<KpiSet> {
        (0..self.periods.len())
            .map(|i| self.calculate_at(i))
            .collect()
    }

    fn calculate_at(&self, i: usize) -> KpiSet {
        let period = &self.periods[i];
        let prior = i.checked_sub(1).map(|p| &self.periods[p]);
        let year_ago = same_month_prior_year(&period.period)
            .and_then(|label| self.index.get(label.as_str()).copied())
            .map(|idx| &self.periods[idx]);

        compute_kpi_set(period, prior, year_ago)
    }
}

pub fn calculate_kpis(periods: &[PeriodRecord]) -> Vec<KpiSet> {
    KpiCalculator::new(periods).calculate()
}

/// Derives every KPI of one period.
///
/// Net income and EBITDA fall back to operating income (revenue - cogs - opex)
/// when not reported, so `net_margin` and `ebitda_margin` then equal
/// `operating_margin`. This is a placeholder approximation, not a tax or D&A model.
pub fn compute_kpi_set(
    period: &PeriodRecord,
    prior: Option<&PeriodRecord>,
    year_ago: Option<&PeriodRecord>,
) -> KpiSet {
    let revenue = period.revenue;
    let gross_profit = period.gross_profit();
    let operating_income = period.operating_income();
    let ebitda = period.ebitda.unwrap_or(operating_income);
    let net_income = period.net_income.unwrap_or(operating_income);

    let per_head = |count: Option<u32>| {
        count
            .filter(|c| *c > 0 && revenue > 0.0)
            .and_then(|c| ratio(revenue, f64::from(c)))
    };

    let burn = match period.monthly_burn {
        Some(burn) if burn > 0.0 => Some(burn),
        Some(_) => None,
        None if operating_income < 0.0 => Some(-operating_income),
        None => None,
    };

    KpiSet {
        period: period.period.clone(),
        revenue,
        gross_profit,
        operating_income,
        ebitda,
        net_income,
        gross_margin: percent(gross_profit, revenue),
        operating_margin: percent(operating_income, revenue),
        net_margin: percent(net_income, revenue),
        ebitda_margin: percent(ebitda, revenue),
        opex_ratio: percent(period.opex, revenue),
        revenue_per_employee: per_head(period.employees),
        arpu: per_head(period.customers),
        mom_growth: prior.and_then(|p| percent(revenue - p.revenue, p.revenue)),
        yoy_growth: year_ago.and_then(|p| percent(revenue - p.revenue, p.revenue)),
        current_ratio: period
            .current_assets
            .zip(period.current_liabilities)
            .and_then(|(assets, liabilities)| ratio(assets, liabilities)),
        quick_ratio: period
            .cash
            .zip(period.current_liabilities)
            .and_then(|(cash, liabilities)| {
                ratio(cash + period.accounts_receivable.unwrap_or(0.0), liabilities)
            }),
        cash_runway_months: period
            .cash
            .zip(burn)
            .and_then(|(cash, burn)| ratio(cash, burn)),
        debt_to_equity: period
            .debt
            .zip(period.equity.filter(|e| *e > 0.0))
            .and_then(|(debt, equity)| ratio(debt, equity)),
    }
}

/// `numerator / denominator`, or `None` for a zero denominator or a non-finite result.
pub fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        return None;
    }

    let value = numerator / denominator;
    value.is_finite().then_some(value)
}

pub fn percent(numerator: f64, denominator: f64) -> Option<f64> {
    ratio(numerator, denominator).map(|r| r * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn period(label: &str, revenue: f64, cogs: f64, opex: f64) -> PeriodRecord {
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

    #[test]
    fn test_margins_and_growth() {
        let periods = vec![
            period("2024-07", 1_850_000.0, 1_110_000.0, 410_000.0),
            period("2024-08", 1_920_000.0, 1_152_000.0, 415_000.0),
        ];

        let kpis = calculate_kpis(&periods);
        assert_eq!(kpis.len(), 2);
        assert_eq!(kpis[0].mom_growth, None);

        let aug = &kpis[1];
        assert!((aug.gross_margin.unwrap() - 40.0).abs() < 1e-9);
        assert!((aug.mom_growth.unwrap() - 3.7837837).abs() < 1e-6);

        let expected_operating = (1_920_000.0 - 1_152_000.0 - 415_000.0) / 1_920_000.0 * 100.0;
        assert!((aug.operating_margin.unwrap() - expected_operating).abs() < 1e-9);
        assert!((aug.opex_ratio.unwrap() - 415_000.0 / 1_920_000.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_net_and_ebitda_fall_back_to_operating_income() {
        let kpis = calculate_kpis(&[period("2024-07", 1000.0, 400.0, 300.0)]);
        let k = &kpis[0];
        assert_eq!(k.net_income, 300.0);
        assert_eq!(k.ebitda, 300.0);
        assert_eq!(k.net_margin, k.operating_margin);
        assert_eq!(k.ebitda_margin, k.operating_margin);
    }

    #[test]
    fn test_reported_net_income_and_ebitda_are_used() {
        let mut p = period("2024-07", 1000.0, 400.0, 300.0);
        p.net_income = Some(150.0);
        p.ebitda = Some(350.0);

        let k = compute_kpi_set(&p, None, None);
        assert!((k.net_margin.unwrap() - 15.0).abs() < 1e-9);
        assert!((k.ebitda_margin.unwrap() - 35.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_revenue_yields_gaps_not_nan() {
        let mut p = period("2024-07", 0.0, 10.0, 20.0);
        p.customers = Some(10);
        p.employees = Some(2);

        let k = compute_kpi_set(&p, None, None);
        assert_eq!(k.gross_margin, None);
        assert_eq!(k.operating_margin, None);
        assert_eq!(k.net_margin, None);
        assert_eq!(k.ebitda_margin, None);
        assert_eq!(k.opex_ratio, None);
        assert_eq!(k.arpu, None);
        assert_eq!(k.revenue_per_employee, None);
    }

    #[test]
    fn test_zero_prior_revenue_gives_no_growth() {
        let periods = vec![
            period("2024-07", 0.0, 0.0, 0.0),
            period("2024-08", 500.0, 0.0, 0.0),
        ];
        assert_eq!(calculate_kpis(&periods)[1].mom_growth, None);
    }

    #[test]
    fn test_zero_employees_gives_no_revenue_per_employee() {
        let mut p = period("2024-07", 100_000.0, 0.0, 0.0);
        p.employees = Some(0);
        p.customers = Some(40);

        let k = compute_kpi_set(&p, None, None);
        assert_eq!(k.revenue_per_employee, None);
        assert!((k.arpu.unwrap() - 2500.0).abs() < 1e-9);
    }

    #[test]
    fn test_liquidity_ratios() {
        let mut p = period("2024-07", 1000.0, 400.0, 300.0);
        p.current_assets = Some(600.0);
        p.current_liabilities = Some(400.0);
        p.cash = Some(300.0);
        p.accounts_receivable = Some(100.0);
        p.debt = Some(250.0);
        p.equity = Some(500.0);
        p.monthly_burn = Some(50.0);

        let k = compute_kpi_set(&p, None, None);
        assert!((k.current_ratio.unwrap() - 1.5).abs() < 1e-9);
        assert!((k.quick_ratio.unwrap() - 1.0).abs() < 1e-9);
        assert!((k.debt_to_equity.unwrap() - 0.5).abs() < 1e-9);
        assert!((k.cash_runway_months.unwrap() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_denominators_are_gaps() {
        let mut p = period("2024-07", 1000.0, 400.0, 300.0);
        p.current_assets = Some(600.0);
        p.current_liabilities = Some(0.0);
        p.cash = Some(300.0);
        p.debt = Some(250.0);
        p.equity = Some(0.0);

        let k = compute_kpi_set(&p, None, None);
        assert_eq!(k.current_ratio, None);
        assert_eq!(k.quick_ratio, None);
        assert_eq!(k.debt_to_equity, None);
        // Profitable with no reported burn: nothing to divide by.
        assert_eq!(k.cash_runway_months, None);
    }

    #[test]
    fn test_quick_ratio_without_receivables_or_cash() {
        let mut p = period("2024-07", 1000.0, 400.0, 300.0);
        p.current_liabilities = Some(400.0);
        p.cash = Some(300.0);

        // Missing receivables count as zero.
        let k = compute_kpi_set(&p, None, None);
        assert!((k.quick_ratio.unwrap() - 0.75).abs() < 1e-9);

        p.cash = None;
        p.accounts_receivable = Some(100.0);
        assert_eq!(compute_kpi_set(&p, None, None).quick_ratio, None);
    }

    #[test]
    fn test_non_positive_equity_has_no_leverage() {
        let mut p = period("2024-07", 1000.0, 400.0, 300.0);
        p.debt = Some(250.0);

        for equity in [0.0, -500.0] {
            p.equity = Some(equity);
            assert_eq!(compute_kpi_set(&p, None, None).debt_to_equity, None);
        }

        p.equity = None;
        assert_eq!(compute_kpi_set(&p, None, None).debt_to_equity, None);
    }

    #[test]
    fn test_non_positive_reported_burn_has_no_runway() {
        // Loss-making, so a derived burn would exist if none were reported.
        let mut p = period("2024-07", 1000.0, 700.0, 500.0);
        p.cash = Some(1200.0);

        for burn in [0.0, -100.0] {
            p.monthly_burn = Some(burn);
            assert_eq!(compute_kpi_set(&p, None, None).cash_runway_months, None);
        }
    }

    #[test]
    fn test_runway_from_operating_loss() {
        let mut p = period("2024-07", 1000.0, 700.0, 500.0);
        p.cash = Some(1200.0);

        let k = compute_kpi_set(&p, None, None);
        assert!((k.cash_runway_months.unwrap() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_yoy_growth_uses_label_index() {
        let periods = vec![
            period("2023-08", 800.0, 0.0, 0.0),
            period("2024-07", 900.0, 0.0, 0.0),
            period("2024-08", 1000.0, 0.0, 0.0),
        ];

        let kpis = calculate_kpis(&periods);
        assert_eq!(kpis[1].yoy_growth, None);
        assert!((kpis[2].yoy_growth.unwrap() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_ratio_guards() {
        assert_eq!(ratio(1.0, 0.0), None);
        assert_eq!(ratio(0.0, -0.0), None);
        assert_eq!(ratio(f64::MAX, f64::MIN_POSITIVE), None);
        assert_eq!(percent(1.0, 4.0), Some(25.0));
    }
}
