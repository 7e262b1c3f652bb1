use crate::config::ForecastConfig;
use crate::error::KpiEngineError;
use crate::schema::KpiSet;
use crate::utils::next_period_label;
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Monthly decline applied by the stress case, independent of history.
pub const STRESS_MONTHLY_GROWTH: f64 = -0.05;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum Scenario {
    Base,
    Upside,
    Downside,
    Stress,
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::Base,
        Scenario::Upside,
        Scenario::Downside,
        Scenario::Stress,
    ];

    /// Multiplier on the trailing average growth, `None` when the rate is fixed.
    pub fn growth_multiplier(&self) -> Option<f64> {
        match self {
            Self::Base => Some(1.0),
            Self::Upside => Some(1.5),
            Self::Downside => Some(0.5),
            Self::Stress => None,
        }
    }

    /// Monthly growth as a signed fraction, given the trailing average as a fraction.
    pub fn monthly_growth_rate(&self, trailing_average: f64) -> f64 {
        match self.growth_multiplier() {
            Some(multiplier) => trailing_average * multiplier,
            None => STRESS_MONTHLY_GROWTH,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Base => "Revenue grows at the trailing average monthly rate; margins held",
            Self::Upside => "Revenue grows at 1.5x the trailing average rate; margins held",
            Self::Downside => "Revenue grows at half the trailing average rate; margins held",
            Self::Stress => "Revenue declines 5% per month; margins held",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base => "Base",
            Self::Upside => "Upside",
            Self::Downside => "Downside",
            Self::Stress => "Stress",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = KpiEngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scenario| scenario.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| KpiEngineError::UnknownScenario(s.to_string()))
    }
}

/// One projected period. Only revenue and the held margins are projected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ForecastPeriod {
    pub period: String,
    pub revenue: f64,
    pub gross_margin: Option<f64>,
    pub operating_margin: Option<f64>,
    pub operating_income: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ForecastAssumptions {
    pub base_revenue: f64,
    #[schemars(description = "Average MoM growth of the trailing window, in percent")]
    pub trailing_average_growth: f64,
    pub growth_multiplier: Option<f64>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ForecastScenario {
    pub name: Scenario,
    #[schemars(description = "Signed fraction, e.g. -0.05 for a 5% monthly decline")]
    pub monthly_growth_rate: f64,
    pub periods: Vec<ForecastPeriod>,
    pub assumptions: ForecastAssumptions,
}

/// Mean of the non-null MoM growth values (percent) among the last `lookback` sets.
pub fn trailing_average_growth(kpis: &[KpiSet], lookback: usize) -> Option<f64> {
    let start = kpis.len().saturating_sub(lookback);
    let rates: Vec<f64> = kpis[start..].iter().filter_map(|k| k.mom_growth).collect();

    if rates.is_empty() {
        None
    } else {
        Some(rates.iter().sum::<f64>() / rates.len() as f64)
    }
}

/// Projects exactly `config.horizon` periods forward from the last KPI set.
///
/// Revenue compounds at the scenario rate; gross and operating margin are held at
/// the last actual period's values. An empty history gives a flat zero projection.
pub fn generate_forecast(
    kpis: &[KpiSet],
    scenario: Scenario,
    config: &ForecastConfig,
) -> ForecastScenario {
    let trailing = trailing_average_growth(kpis, config.lookback)
        .unwrap_or(config.no_history_growth);
    let rate = scenario.monthly_growth_rate(trailing / 100.0);

    let last = kpis.last();
    let base_revenue = last.map_or(0.0, |k| k.revenue);
    let gross_margin = last.and_then(|k| k.gross_margin);
    let operating_margin = last.and_then(|k| k.operating_margin);
    let last_label = last.map_or("forecast", |k| k.period.as_str());

    debug!(
        "Forecast {}: trailing growth {:.4}% over {} set(s), monthly rate {:.6}",
        scenario,
        trailing,
        kpis.len().min(config.lookback),
        rate
    );

    let mut revenue = base_revenue;
    let periods = (1..=config.horizon)
        .map(|step| {
            revenue *= 1.0 + rate;
            if !revenue.is_finite() {
                revenue = 0.0;
            }

            ForecastPeriod {
                period: next_period_label(last_label, step as u32),
                revenue,
                gross_margin,
                operating_margin,
                operating_income: operating_margin.map(|m| revenue * m / 100.0),
            }
        })
        .collect();

    ForecastScenario {
        name: scenario,
        monthly_growth_rate: rate,
        periods,
        assumptions: ForecastAssumptions {
            base_revenue,
            trailing_average_growth: trailing,
            growth_multiplier: scenario.growth_multiplier(),
            description: scenario.description().to_string(),
        },
    }
}

pub fn generate_all_forecasts(
    kpis: &[KpiSet],
    config: &ForecastConfig,
) -> BTreeMap<Scenario, ForecastScenario> {
    Scenario::ALL
        .into_iter()
        .map(|scenario| (scenario, generate_forecast(kpis, scenario, config)))
        .collect()
}
