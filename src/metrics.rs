//! The metric catalogue.
//!
//! Every number that can appear in a [`KpiSet`](crate::KpiSet) or in a variance
//! comparison is named here once, together with its static display type
//! ([`MetricKind`]) and its favourability direction ([`MetricPolarity`]). Both are
//! properties of the metric itself and are never inferred from a value's magnitude.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    #[schemars(description = "Monetary amount, rendered like $1,920,000")]
    Currency,
    #[schemars(description = "Percentage already multiplied by 100, rendered like 40.0%")]
    Percent,
    #[schemars(description = "Plain ratio, rendered like 1.50x")]
    Ratio,
    #[schemars(description = "Whole-number count, rendered like 1,920")]
    Count,
    #[schemars(description = "Duration in months, rendered like 12.5 mo")]
    Months,
}

impl MetricKind {
    /// Renders a value for display. `None` is always shown as `N/A`.
    pub fn format(&self, value: Option<f64>) -> String {
        let Some(value) = value.filter(|v| v.is_finite()) else {
            return "N/A".to_string();
        };

        match self {
            Self::Currency => {
                let sign = if value < 0.0 { "-" } else { "" };
                format!("{}${}", sign, group_thousands(value.abs().round()))
            }
            Self::Percent => format!("{:.1}%", value),
            Self::Ratio => format!("{:.2}x", value),
            Self::Count => {
                let sign = if value < 0.0 { "-" } else { "" };
                format!("{}{}", sign, group_thousands(value.abs().round()))
            }
            Self::Months => format!("{:.1} mo", value),
        }
    }
}

fn group_thousands(whole: f64) -> String {
    let digits = format!("{:.0}", whole);
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    grouped
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MetricPolarity {
    #[schemars(description = "Revenue, profit and margin style metrics: an increase is favorable")]
    HigherIsBetter,
    #[schemars(description = "Cost, expense and leverage style metrics: a decrease is favorable")]
    LowerIsBetter,
}

impl MetricPolarity {
    /// Direction rule for a non-zero baseline. Unchanged values count as favorable.
    pub fn is_favorable(&self, current: f64, comparison: f64) -> bool {
        match self {
            Self::HigherIsBetter => current >= comparison,
            Self::LowerIsBetter => current <= comparison,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricDefinition {
    pub name: &'static str,
    pub formula: &'static str,
    pub interpretation: &'static str,
    pub target: &'static str,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Revenue,
    GrossProfit,
    GrossMargin,
    OperatingIncome,
    OperatingMargin,
    Ebitda,
    EbitdaMargin,
    NetIncome,
    NetMargin,
    OpexRatio,
    RevenuePerEmployee,
    Arpu,
    MomGrowth,
    YoyGrowth,
    CurrentRatio,
    QuickRatio,
    CashRunwayMonths,
    DebtToEquity,
    Cogs,
    Opex,
    Cash,
    CurrentAssets,
    CurrentLiabilities,
    Debt,
    Equity,
    Customers,
    Employees,
    AccountsReceivable,
    MonthlyBurn,
}

impl Metric {
    /// Metrics carried by a [`KpiSet`](crate::KpiSet), in display order.
    pub const KPIS: [Metric; 18] = [
        Metric::Revenue,
        Metric::GrossProfit,
        Metric::GrossMargin,
        Metric::OperatingIncome,
        Metric::OperatingMargin,
        Metric::Ebitda,
        Metric::EbitdaMargin,
        Metric::NetIncome,
        Metric::NetMargin,
        Metric::OpexRatio,
        Metric::RevenuePerEmployee,
        Metric::Arpu,
        Metric::MomGrowth,
        Metric::YoyGrowth,
        Metric::CurrentRatio,
        Metric::QuickRatio,
        Metric::CashRunwayMonths,
        Metric::DebtToEquity,
    ];

    /// Raw financial fields of a [`PeriodRecord`](crate::PeriodRecord) that can be compared.
    pub const RAW_FIELDS: [Metric; 14] = [
        Metric::Revenue,
        Metric::Cogs,
        Metric::Opex,
        Metric::Ebitda,
        Metric::NetIncome,
        Metric::Cash,
        Metric::CurrentAssets,
        Metric::CurrentLiabilities,
        Metric::Debt,
        Metric::Equity,
        Metric::Customers,
        Metric::Employees,
        Metric::AccountsReceivable,
        Metric::MonthlyBurn,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::Revenue => "revenue",
            Self::GrossProfit => "gross_profit",
            Self::GrossMargin => "gross_margin",
            Self::OperatingIncome => "operating_income",
            Self::OperatingMargin => "operating_margin",
            Self::Ebitda => "ebitda",
            Self::EbitdaMargin => "ebitda_margin",
            Self::NetIncome => "net_income",
            Self::NetMargin => "net_margin",
            Self::OpexRatio => "opex_ratio",
            Self::RevenuePerEmployee => "revenue_per_employee",
            Self::Arpu => "arpu",
            Self::MomGrowth => "mom_growth",
            Self::YoyGrowth => "yoy_growth",
            Self::CurrentRatio => "current_ratio",
            Self::QuickRatio => "quick_ratio",
            Self::CashRunwayMonths => "cash_runway_months",
            Self::DebtToEquity => "debt_to_equity",
            Self::Cogs => "cogs",
            Self::Opex => "opex",
            Self::Cash => "cash",
            Self::CurrentAssets => "current_assets",
            Self::CurrentLiabilities => "current_liabilities",
            Self::Debt => "debt",
            Self::Equity => "equity",
            Self::Customers => "customers",
            Self::Employees => "employees",
            Self::AccountsReceivable => "accounts_receivable",
            Self::MonthlyBurn => "monthly_burn",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Revenue => "Revenue",
            Self::GrossProfit => "Gross Profit",
            Self::GrossMargin => "Gross Margin (%)",
            Self::OperatingIncome => "Operating Income",
            Self::OperatingMargin => "Operating Margin (%)",
            Self::Ebitda => "EBITDA",
            Self::EbitdaMargin => "EBITDA Margin (%)",
            Self::NetIncome => "Net Income",
            Self::NetMargin => "Net Margin (%)",
            Self::OpexRatio => "OpEx Ratio (%)",
            Self::RevenuePerEmployee => "Revenue per Employee",
            Self::Arpu => "ARPU",
            Self::MomGrowth => "MoM Growth (%)",
            Self::YoyGrowth => "YoY Growth (%)",
            Self::CurrentRatio => "Current Ratio",
            Self::QuickRatio => "Quick Ratio",
            Self::CashRunwayMonths => "Cash Runway",
            Self::DebtToEquity => "Debt-to-Equity",
            Self::Cogs => "COGS",
            Self::Opex => "Operating Expenses",
            Self::Cash => "Cash",
            Self::CurrentAssets => "Current Assets",
            Self::CurrentLiabilities => "Current Liabilities",
            Self::Debt => "Debt",
            Self::Equity => "Equity",
            Self::Customers => "Customers",
            Self::Employees => "Employees",
            Self::AccountsReceivable => "Accounts Receivable",
            Self::MonthlyBurn => "Monthly Burn",
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Self::GrossMargin
            | Self::OperatingMargin
            | Self::EbitdaMargin
            | Self::NetMargin
            | Self::OpexRatio
            | Self::MomGrowth
            | Self::YoyGrowth => MetricKind::Percent,
            Self::CurrentRatio | Self::QuickRatio | Self::DebtToEquity => MetricKind::Ratio,
            Self::Customers | Self::Employees => MetricKind::Count,
            Self::CashRunwayMonths => MetricKind::Months,
            Self::Revenue
            | Self::GrossProfit
            | Self::OperatingIncome
            | Self::Ebitda
            | Self::NetIncome
            | Self::RevenuePerEmployee
            | Self::Arpu
            | Self::Cogs
            | Self::Opex
            | Self::Cash
            | Self::CurrentAssets
            | Self::CurrentLiabilities
            | Self::Debt
            | Self::Equity
            | Self::AccountsReceivable
            | Self::MonthlyBurn => MetricKind::Currency,
        }
    }

    pub fn polarity(&self) -> MetricPolarity {
        match self {
            Self::OpexRatio
            | Self::DebtToEquity
            | Self::Cogs
            | Self::Opex
            | Self::CurrentLiabilities
            | Self::Debt
            | Self::Employees
            | Self::AccountsReceivable
            | Self::MonthlyBurn => MetricPolarity::LowerIsBetter,
            _ => MetricPolarity::HigherIsBetter,
        }
    }

    pub fn definition(&self) -> MetricDefinition {
        let (name, formula, interpretation, target) = match self {
            Self::Revenue => (
                "Revenue",
                "Total sales recognised in the period",
                "Top-line scale of the business.",
                "Steady month-over-month growth",
            ),
            Self::GrossProfit => (
                "Gross Profit",
                "Revenue - COGS",
                "Profit left after direct costs.",
                "Grows at least as fast as revenue",
            ),
            Self::GrossMargin => (
                "Gross Margin",
                "(Revenue - COGS) / Revenue × 100",
                "Measures production efficiency and pricing power.",
                "Varies by industry; 40%+ is healthy for software",
            ),
            Self::OperatingIncome => (
                "Operating Income",
                "Revenue - COGS - OpEx",
                "Profit from core operations before interest and taxes.",
                "Positive and growing",
            ),
            Self::OperatingMargin => (
                "Operating Margin",
                "(Revenue - COGS - OpEx) / Revenue × 100",
                "Core business profitability before interest and taxes.",
                "15-25% for healthy businesses",
            ),
            Self::Ebitda => (
                "EBITDA",
                "Reported EBITDA, or Operating Income when not reported",
                "Operating cash earnings before non-cash charges.",
                "Positive and growing",
            ),
            Self::EbitdaMargin => (
                "EBITDA Margin",
                "EBITDA / Revenue × 100",
                "Operating cash profitability relative to sales.",
                "20%+ is strong for most industries",
            ),
            Self::NetIncome => (
                "Net Income",
                "Reported net income, or Operating Income when not reported",
                "Bottom-line profit after all expenses.",
                "Positive and growing",
            ),
            Self::NetMargin => (
                "Net Profit Margin",
                "Net Income / Revenue × 100",
                "Bottom-line profitability after all expenses.",
                "10%+ indicates strong profitability",
            ),
            Self::OpexRatio => (
                "Operating Expense Ratio",
                "Operating Expenses / Revenue × 100",
                "Lower is better. Indicates operational efficiency.",
                "<25% shows good expense control",
            ),
            Self::RevenuePerEmployee => (
                "Revenue per Employee",
                "Revenue / Employees",
                "Workforce productivity.",
                "Rising over time",
            ),
            Self::Arpu => (
                "Average Revenue per User",
                "Revenue / Customers",
                "Monetisation of the customer base.",
                "Stable or rising while customers grow",
            ),
            Self::MomGrowth => (
                "Revenue Growth (MoM)",
                "(Current Revenue - Prior Revenue) / Prior Revenue × 100",
                "Positive growth indicates business expansion.",
                "Consistently positive",
            ),
            Self::YoyGrowth => (
                "Revenue Growth (YoY)",
                "(Current Revenue - Same Month Last Year) / Same Month Last Year × 100",
                "Growth net of seasonality.",
                "Generally 10-20% YoY for growth companies",
            ),
            Self::CurrentRatio => (
                "Current Ratio",
                "Current Assets / Current Liabilities",
                "Measures short-term liquidity. >1 means you can cover short-term obligations.",
                "1.5-2.0x is healthy",
            ),
            Self::QuickRatio => (
                "Quick Ratio (Acid Test)",
                "(Cash + Accounts Receivable) / Current Liabilities",
                "More conservative liquidity measure excluding inventory.",
                ">1.0x indicates good liquidity",
            ),
            Self::CashRunwayMonths => (
                "Cash Runway",
                "Cash Balance / Monthly Burn Rate",
                "Months of operation possible with current cash.",
                "18+ months provides strategic flexibility",
            ),
            Self::DebtToEquity => (
                "Debt-to-Equity Ratio",
                "Total Debt / Shareholder Equity",
                "Measures financial leverage. Lower indicates less risk.",
                "<0.5x is conservative; <1.0x is acceptable",
            ),
            Self::Cogs => (
                "Cost of Goods Sold",
                "Direct costs of the goods or services sold",
                "Lower relative to revenue means better unit economics.",
                "Falling as a share of revenue",
            ),
            Self::Opex => (
                "Operating Expenses",
                "Salaries, rent, marketing and other overheads",
                "Lower relative to revenue means better operating leverage.",
                "Growing slower than revenue",
            ),
            Self::Cash => (
                "Cash",
                "Cash balance at period end",
                "Liquidity available to fund operations.",
                "Covers at least 18 months of burn",
            ),
            Self::CurrentAssets => (
                "Current Assets",
                "Assets convertible to cash within a year",
                "Short-term resources.",
                "Above current liabilities",
            ),
            Self::CurrentLiabilities => (
                "Current Liabilities",
                "Obligations due within a year",
                "Short-term claims on liquidity.",
                "Below current assets",
            ),
            Self::Debt => (
                "Debt",
                "Total interest-bearing debt",
                "Financial obligations to lenders.",
                "Serviceable from operating cash flow",
            ),
            Self::Equity => (
                "Equity",
                "Shareholder equity at period end",
                "Owners' residual interest.",
                "Positive and growing",
            ),
            Self::Customers => (
                "Customers",
                "Active customers at period end",
                "Size of the customer base.",
                "Growing",
            ),
            Self::Employees => (
                "Employees",
                "Headcount at period end",
                "Main driver of operating cost.",
                "Growing slower than revenue",
            ),
            Self::AccountsReceivable => (
                "Accounts Receivable",
                "Amounts billed but not yet collected",
                "Lower balances mean faster collection.",
                "Stable relative to revenue",
            ),
            Self::MonthlyBurn => (
                "Monthly Burn",
                "Net cash consumed per month",
                "Pace at which cash reserves are used.",
                "Falling toward zero",
            ),
        };

        MetricDefinition {
            name,
            formula,
            interpretation,
            target,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
