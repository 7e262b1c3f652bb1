use crate::metrics::{Metric, MetricKind};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A cell as it arrives from an upload or a JSON body: either already numeric or text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl RawValue {
    /// Coerces the cell to a number.
    ///
    /// Blank text is a missing value (`Ok(None)`). Text may carry surrounding whitespace,
    /// a leading `$`, thousands separators, or accounting parentheses for negatives.
    pub fn to_number(&self) -> std::result::Result<Option<f64>, String> {
        match self {
            Self::Number(n) if n.is_finite() => Ok(Some(*n)),
            Self::Number(n) => Err(format!("{} is not a finite number", n)),
            Self::Text(text) => parse_numeric_text(text),
        }
    }

    pub fn to_label(&self) -> Option<String> {
        match self {
            Self::Number(n) if n.fract() == 0.0 => Some(format!("{:.0}", n)),
            Self::Number(n) => Some(n.to_string()),
            Self::Text(text) if text.trim().is_empty() => None,
            Self::Text(text) => Some(text.trim().to_string()),
        }
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

fn parse_numeric_text(text: &str) -> std::result::Result<Option<f64>, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let not_numeric = || format!("'{}' is not numeric", trimmed);

    // One negative marker at most: accounting parentheses or a leading minus.
    let (negative, body) = match trimmed
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
    {
        Some(inner) => (true, inner.trim()),
        None => match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        },
    };

    let body = body.strip_prefix('$').unwrap_or(body);
    if body.contains(['-', '(', ')', '$']) {
        return Err(not_numeric());
    }

    let cleaned: String = body
        .chars()
        .filter(|c| *c != ',' && *c != '_' && !c.is_whitespace())
        .collect();

    let value: f64 = cleaned.parse().map_err(|_| not_numeric())?;

    if !value.is_finite() {
        return Err(format!("'{}' is not a finite number", trimmed));
    }

    Ok(Some(if negative { -value } else { value }))
}

/// One uploaded or seeded row before validation.
///
/// Field names are the fixed, case-sensitive column headers of an upload.
/// Unknown columns are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawPeriodRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Period label; takes precedence over `date` when both are present")]
    pub period: Option<RawValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Date-like period label such as 2024-07 or 2024-07-31")]
    pub date: Option<RawValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Required. Revenue for the period, must be >= 0")]
    pub revenue: Option<RawValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Required. Cost of goods sold, must be >= 0")]
    pub cogs: Option<RawValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Required. Operating expenses, must be >= 0")]
    pub opex: Option<RawValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ebitda: Option<RawValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_income: Option<RawValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash: Option<RawValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_assets: Option<RawValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_liabilities: Option<RawValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debt: Option<RawValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equity: Option<RawValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Active customers, a non-negative whole number")]
    pub customers: Option<RawValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(description = "Headcount, a non-negative whole number")]
    pub employees: Option<RawValue>,

    #[serde(default, alias = "ar", skip_serializing_if = "Option::is_none")]
    pub accounts_receivable: Option<RawValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_burn: Option<RawValue>,
}

impl RawPeriodRow {
    pub fn new(period: &str, revenue: f64, cogs: f64, opex: f64) -> Self {
        Self {
            period: Some(RawValue::from(period)),
            revenue: Some(RawValue::Number(revenue)),
            cogs: Some(RawValue::Number(cogs)),
            opex: Some(RawValue::Number(opex)),
            ..Self::default()
        }
    }

    /// Sets a raw financial field. Metrics that are not upload columns are ignored.
    pub fn with(mut self, metric: Metric, value: impl Into<RawValue>) -> Self {
        let value = Some(value.into());
        match metric {
            Metric::Revenue => self.revenue = value,
            Metric::Cogs => self.cogs = value,
            Metric::Opex => self.opex = value,
            Metric::Ebitda => self.ebitda = value,
            Metric::NetIncome => self.net_income = value,
            Metric::Cash => self.cash = value,
            Metric::CurrentAssets => self.current_assets = value,
            Metric::CurrentLiabilities => self.current_liabilities = value,
            Metric::Debt => self.debt = value,
            Metric::Equity => self.equity = value,
            Metric::Customers => self.customers = value,
            Metric::Employees => self.employees = value,
            Metric::AccountsReceivable => self.accounts_receivable = value,
            Metric::MonthlyBurn => self.monthly_burn = value,
            _ => {}
        }
        self
    }

    pub fn field(&self, metric: Metric) -> Option<&RawValue> {
        match metric {
            Metric::Revenue => self.revenue.as_ref(),
            Metric::Cogs => self.cogs.as_ref(),
            Metric::Opex => self.opex.as_ref(),
            Metric::Ebitda => self.ebitda.as_ref(),
            Metric::NetIncome => self.net_income.as_ref(),
            Metric::Cash => self.cash.as_ref(),
            Metric::CurrentAssets => self.current_assets.as_ref(),
            Metric::CurrentLiabilities => self.current_liabilities.as_ref(),
            Metric::Debt => self.debt.as_ref(),
            Metric::Equity => self.equity.as_ref(),
            Metric::Customers => self.customers.as_ref(),
            Metric::Employees => self.employees.as_ref(),
            Metric::AccountsReceivable => self.accounts_receivable.as_ref(),
            Metric::MonthlyBurn => self.monthly_burn.as_ref(),
            _ => None,
        }
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(RawPeriodRow)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

/// One validated reporting period. Immutable once built by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PeriodRecord {
    #[schemars(description = "Canonical period label, YYYY-MM when date-like")]
    pub period: String,
    pub revenue: f64,
    pub cogs: f64,
    pub opex: f64,
    pub ebitda: Option<f64>,
    pub net_income: Option<f64>,
    pub cash: Option<f64>,
    pub current_assets: Option<f64>,
    pub current_liabilities: Option<f64>,
    pub debt: Option<f64>,
    pub equity: Option<f64>,
    pub customers: Option<u32>,
    pub employees: Option<u32>,
    pub accounts_receivable: Option<f64>,
    pub monthly_burn: Option<f64>,
}

impl PeriodRecord {
    pub fn gross_profit(&self) -> f64 {
        self.revenue - self.cogs
    }

    pub fn operating_income(&self) -> f64 {
        self.gross_profit() - self.opex
    }

    /// Value of a raw financial field, `None` when absent or not a raw field.
    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Revenue => Some(self.revenue),
            Metric::Cogs => Some(self.cogs),
            Metric::Opex => Some(self.opex),
            Metric::Ebitda => self.ebitda,
            Metric::NetIncome => self.net_income,
            Metric::Cash => self.cash,
            Metric::CurrentAssets => self.current_assets,
            Metric::CurrentLiabilities => self.current_liabilities,
            Metric::Debt => self.debt,
            Metric::Equity => self.equity,
            Metric::Customers => self.customers.map(f64::from),
            Metric::Employees => self.employees.map(f64::from),
            Metric::AccountsReceivable => self.accounts_receivable,
            Metric::MonthlyBurn => self.monthly_burn,
            _ => None,
        }
    }
}

/// Derived metrics for one period.
///
/// Each field's schema description starts with its [`MetricKind`] tag. Percentages are already multiplied by 100 (`12.5` means 12.5%). A `None` is a
/// computation gap: the metric could not be derived because an input or a
/// denominator was missing or zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KpiSet {
    pub period: String,
    #[schemars(description = "currency: reported revenue")]
    pub revenue: f64,
    #[schemars(description = "currency: revenue - cogs")]
    pub gross_profit: f64,
    #[schemars(description = "currency: revenue - cogs - opex")]
    pub operating_income: f64,
    #[schemars(description = "currency: reported EBITDA, or operating income when not reported")]
    pub ebitda: f64,
    #[schemars(description = "currency: reported net income, or operating income when not reported")]
    pub net_income: f64,
    #[schemars(description = "percent: gross profit / revenue")]
    pub gross_margin: Option<f64>,
    #[schemars(description = "percent: operating income / revenue")]
    pub operating_margin: Option<f64>,
    #[schemars(description = "percent: net income / revenue")]
    pub net_margin: Option<f64>,
    #[schemars(description = "percent: EBITDA / revenue")]
    pub ebitda_margin: Option<f64>,
    #[schemars(description = "percent: opex / revenue")]
    pub opex_ratio: Option<f64>,
    #[schemars(description = "currency: revenue / employees")]
    pub revenue_per_employee: Option<f64>,
    #[schemars(description = "currency: revenue / customers")]
    pub arpu: Option<f64>,
    #[schemars(description = "percent: revenue change against the prior period")]
    pub mom_growth: Option<f64>,
    #[schemars(description = "percent: revenue change against the same month a year earlier")]
    pub yoy_growth: Option<f64>,
    #[schemars(description = "ratio: current assets / current liabilities")]
    pub current_ratio: Option<f64>,
    #[schemars(description = "ratio: (cash + accounts receivable) / current liabilities")]
    pub quick_ratio: Option<f64>,
    #[schemars(description = "months: cash / monthly burn")]
    pub cash_runway_months: Option<f64>,
    #[schemars(description = "ratio: debt / equity")]
    pub debt_to_equity: Option<f64>,
}

/// A KPI value paired with the type tag that decides how it is displayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiEntry {
    pub metric: Metric,
    pub label: String,
    pub kind: MetricKind,
    pub value: Option<f64>,
    pub display: String,
}

impl KpiSet {
    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Revenue => Some(self.revenue),
            Metric::GrossProfit => Some(self.gross_profit),
            Metric::OperatingIncome => Some(self.operating_income),
            Metric::Ebitda => Some(self.ebitda),
            Metric::NetIncome => Some(self.net_income),
            Metric::GrossMargin => self.gross_margin,
            Metric::OperatingMargin => self.operating_margin,
            Metric::NetMargin => self.net_margin,
            Metric::EbitdaMargin => self.ebitda_margin,
            Metric::OpexRatio => self.opex_ratio,
            Metric::RevenuePerEmployee => self.revenue_per_employee,
            Metric::Arpu => self.arpu,
            Metric::MomGrowth => self.mom_growth,
            Metric::YoyGrowth => self.yoy_growth,
            Metric::CurrentRatio => self.current_ratio,
            Metric::QuickRatio => self.quick_ratio,
            Metric::CashRunwayMonths => self.cash_runway_months,
            Metric::DebtToEquity => self.debt_to_equity,
            _ => None,
        }
    }

    pub fn entries(&self) -> Vec<KpiEntry> {
        Metric::KPIS
            .iter()
            .map(|metric| {
                let value = self.value(*metric);
                KpiEntry {
                    metric: *metric,
                    label: metric.label().to_string(),
                    kind: metric.kind(),
                    value,
                    display: metric.kind().format(value),
                }
            })
            .collect()
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(KpiSet)
    }

    /// Metrics of this set that are computation gaps.
    pub fn unavailable(&self) -> Vec<Metric> {
        Metric::KPIS
            .iter()
            .copied()
            .filter(|metric| self.value(*metric).is_none())
            .collect()
    }
}
