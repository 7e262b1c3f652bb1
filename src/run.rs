use crate::config::{EngineConfig, ForecastConfig};
use crate::error::{KpiEngineError, Result};
use crate::forecast::{generate_all_forecasts, generate_forecast, ForecastScenario, Scenario};
use crate::ingestion::{normalize_rows, parse_csv, sample_rows};
use crate::kpi::calculate_kpis;
use crate::narrative::{NarrativeBlock, NarrativeContext};
use crate::schema::{KpiSet, PeriodRecord, RawPeriodRow};
use crate::utils::canonicalize_period_label;
use crate::variance::{compare_kpis, compare_records, VarianceEntry};
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// One complete analysis built from one ingestion event.
///
/// Periods and KPI sets are parallel, ordered sequences. A label index gives O(1)
/// access to any period and to the one before it. Variances are never stored; they
/// are computed on request from the KPI sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RunDocument")]
pub struct AnalysisRun {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    periods: Vec<PeriodRecord>,
    kpis: Vec<KpiSet>,
    forecasts: BTreeMap<Scenario, ForecastScenario>,
    narratives: Vec<NarrativeBlock>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

/// Persisted shape of a run: one document per run.
#[derive(Debug, Clone, Deserialize)]
struct RunDocument {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
    periods: Vec<PeriodRecord>,
    kpis: Vec<KpiSet>,
    #[serde(default)]
    forecasts: BTreeMap<Scenario, ForecastScenario>,
    #[serde(default)]
    narratives: Vec<NarrativeBlock>,
}

impl TryFrom<RunDocument> for AnalysisRun {
    type Error = KpiEngineError;

    fn try_from(doc: RunDocument) -> Result<Self> {
        if doc.periods.len() != doc.kpis.len() {
            return Err(KpiEngineError::ValidationError {
                row: 0,
                field: "kpis".to_string(),
                details: format!(
                    "{} KPI sets for {} periods",
                    doc.kpis.len(),
                    doc.periods.len()
                ),
            });
        }

        let index = build_index(&doc.periods);
        Ok(Self {
            id: doc.id,
            name: doc.name,
            created_at: doc.created_at,
            periods: doc.periods,
            kpis: doc.kpis,
            forecasts: doc.forecasts,
            narratives: doc.narratives,
            index,
        })
    }
}

fn build_index(periods: &[PeriodRecord]) -> HashMap<String, usize> {
    periods
        .iter()
        .enumerate()
        .map(|(i, p)| (p.period.clone(), i))
        .collect()
}

/// List view of a stored run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub period_count: usize,
    pub first_period: Option<String>,
    pub last_period: Option<String>,
}

impl AnalysisRun {
    pub fn periods(&self) -> &[PeriodRecord] {
        &self.periods
    }

    pub fn kpis(&self) -> &[KpiSet] {
        &self.kpis
    }

    pub fn forecasts(&self) -> &BTreeMap<Scenario, ForecastScenario> {
        &self.forecasts
    }

    pub fn narratives(&self) -> &[NarrativeBlock] {
        &self.narratives
    }

    /// Position of a period label, accepting any date-like spelling of a month.
    pub fn position(&self, label: &str) -> Option<usize> {
        self.index
            .get(label)
            .or_else(|| self.index.get(&canonicalize_period_label(label)))
            .copied()
    }

    pub fn period(&self, label: &str) -> Option<&PeriodRecord> {
        self.position(label).map(|i| &self.periods[i])
    }

    pub fn kpis_for(&self, label: &str) -> Option<&KpiSet> {
        self.position(label).map(|i| &self.kpis[i])
    }

    fn require(&self, label: &str) -> Result<usize> {
        self.position(label)
            .ok_or_else(|| KpiEngineError::UnknownPeriod(label.to_string()))
    }

    /// KPI variance of `current` against `comparison`.
    pub fn compare_variance(&self, current: &str, comparison: &str) -> Result<Vec<VarianceEntry>> {
        let current = self.require(current)?;
        let comparison = self.require(comparison)?;
        Ok(compare_kpis(&self.kpis[current], &self.kpis[comparison]))
    }

    /// Raw-field variance of `current` against `comparison`.
    pub fn compare_period_fields(
        &self,
        current: &str,
        comparison: &str,
    ) -> Result<Vec<VarianceEntry>> {
        let current = self.require(current)?;
        let comparison = self.require(comparison)?;
        Ok(compare_records(
            &self.periods[current],
            &self.periods[comparison],
        ))
    }

    /// Variance of `label` against the period right before it; `None` for the first period.
    pub fn compare_with_prior(&self, label: &str) -> Result<Option<Vec<VarianceEntry>>> {
        let i = self.require(label)?;
        Ok(i.checked_sub(1)
            .map(|prior| compare_kpis(&self.kpis[i], &self.kpis[prior])))
    }

    /// Last period against the one before it, empty when the run has a single period.
    pub fn latest_variance(&self) -> Vec<VarianceEntry> {
        match self.kpis.as_slice() {
            [.., prior, latest] => compare_kpis(latest, prior),
            _ => Vec::new(),
        }
    }

    pub fn generate_forecast(&self, scenario: Scenario) -> ForecastScenario {
        self.forecasts
            .get(&scenario)
            .cloned()
            .unwrap_or_else(|| generate_forecast(&self.kpis, scenario, &ForecastConfig::default()))
    }

    /// Projects a scenario with settings other than the ones the run was built with.
    pub fn forecast_with(&self, scenario: Scenario, config: &ForecastConfig) -> ForecastScenario {
        generate_forecast(&self.kpis, scenario, config)
    }

    pub fn narrative_context(&self) -> NarrativeContext {
        NarrativeContext::new(&self.kpis, &self.latest_variance(), &self.forecasts)
    }

    pub fn add_narrative(&mut self, block: NarrativeBlock) {
        self.narratives.push(block);
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            id: self.id,
            name: self.name.clone(),
            created_at: self.created_at,
            period_count: self.periods.len(),
            first_period: self.periods.first().map(|p| p.period.clone()),
            last_period: self.periods.last().map(|p| p.period.clone()),
        }
    }
}

/// Builds analysis runs: normalize, calculate KPIs, project all scenarios.
pub struct RunAggregator {
    config: EngineConfig,
}

impl Default for RunAggregator {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }
}

impl RunAggregator {
    /// Fails with [`KpiEngineError::ConfigError`] when `config` does not validate.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn build(&self, rows: &[RawPeriodRow], name: Option<&str>) -> Result<AnalysisRun> {
        let periods = normalize_rows(rows)?;
        if periods.is_empty() {
            return Err(KpiEngineError::EmptyInput);
        }

        let kpis = calculate_kpis(&periods);
        let forecasts = generate_all_forecasts(&kpis, &self.config.forecast);
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(self.config.default_run_name.as_str())
            .to_string();

        let run = AnalysisRun {
            id: Uuid::new_v4(),
            name,
            created_at: Utc::now(),
            index: build_index(&periods),
            periods,
            kpis,
            forecasts,
            narratives: Vec::new(),
        };

        info!(
            "Built analysis run '{}' ({}) with {} period(s)",
            run.name,
            run.id,
            run.periods.len()
        );

        Ok(run)
    }

    pub fn build_from_csv(&self, bytes: &[u8], name: Option<&str>) -> Result<AnalysisRun> {
        let rows = parse_csv(bytes)?;
        self.build(&rows, name)
    }

    pub fn build_sample(&self) -> Result<AnalysisRun> {
        self.build(&sample_rows(), Some(self.config.sample_run_name.as_str()))
    }
}

pub fn compute_run(rows: &[RawPeriodRow]) -> Result<AnalysisRun> {
    RunAggregator::default().build(rows, None)
}

pub fn compute_run_from_csv(bytes: &[u8], name: Option<&str>) -> Result<AnalysisRun> {
    RunAggregator::default().build_from_csv(bytes, name)
}

pub fn compute_sample_run() -> Result<AnalysisRun> {
    RunAggregator::default().build_sample()
}
