//! # Financial KPI Engine
//!
//! A library that turns tabular monthly financials (an upload or a seeded sample)
//! into an analysis run: validated periods, derived KPIs, period-over-period
//! variance and forward scenarios.
//!
//! ## Core Concepts
//!
//! - **Period Record**: One validated reporting period (revenue, COGS, OpEx and optional balance-sheet figures)
//! - **KPI Set**: Margins, growth, liquidity and leverage ratios for one period; a missing input gives `None`, never zero
//! - **Variance**: A metric compared against a baseline, classified Favorable/Unfavorable by the metric's fixed polarity
//! - **Scenario**: Base, Upside, Downside and Stress revenue projections from the trailing MoM growth
//! - **Run**: The immutable bundle of all of the above, built in one pass from one ingestion event
//!
//! ## Example
//!
//! ```rust
//! use financial_kpi_engine::*;
//!
//! let rows = vec![
//!     RawPeriodRow::new("2024-07", 1_850_000.0, 1_110_000.0, 410_000.0),
//!     RawPeriodRow::new("2024-08", 1_920_000.0, 1_152_000.0, 415_000.0),
//! ];
//!
//! let run = compute_run(&rows).unwrap();
//! let august = run.kpis_for("2024-08").unwrap();
//! assert!((august.gross_margin.unwrap() - 40.0).abs() < 1e-9);
//!
//! let variances = compare_variance(&run, "2024-08", "2024-07").unwrap();
//! assert!(!variances.is_empty());
//!
//! let stress = run.generate_forecast(Scenario::Stress);
//! assert_eq!(stress.monthly_growth_rate, -0.05);
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod forecast;
pub mod ingestion;
pub mod kpi;
pub mod metrics;
pub mod narrative;
pub mod run;
pub mod schema;
pub mod store;
pub mod utils;
pub mod variance;

#[cfg(feature = "gemini")]
pub mod llm;

pub use config::{EngineConfig, ForecastConfig, NarrativeConfig};
pub use error::{KpiEngineError, Result};
pub use export::{export_run, export_run_to_file, kpis_to_csv, run_to_json, run_to_markdown, ExportFormat};
pub use forecast::{
    generate_all_forecasts, generate_forecast, trailing_average_growth, ForecastAssumptions,
    ForecastPeriod, ForecastScenario, Scenario, STRESS_MONTHLY_GROWTH,
};
pub use ingestion::{normalize_row, normalize_rows, parse_csv, sample_rows};
pub use kpi::{calculate_kpis, compute_kpi_set, KpiCalculator};
pub use metrics::{Metric, MetricDefinition, MetricKind, MetricPolarity};
pub use narrative::{
    build_prompt, generate_narrative, parse_narrative_response, NarrativeBlock, NarrativeContext,
    NarrativeFocus, NarrativeGenerator, NarrativeResponse,
};
pub use run::{
    compute_run, compute_run_from_csv, compute_sample_run, AnalysisRun, RunAggregator, RunSummary,
};
pub use schema::*;
pub use store::{InMemoryRunStore, RunStore};
pub use utils::*;
pub use variance::{
    compare_kpis, compare_records, compare_to_budget, VarianceEntry, VarianceStatus,
};

/// KPI variance between two periods of a run.
pub fn compare_variance(
    run: &AnalysisRun,
    current_period: &str,
    comparison_period: &str,
) -> Result<Vec<VarianceEntry>> {
    run.compare_variance(current_period, comparison_period)
}

/// Builds a run and attaches a narrative generated for it.
pub async fn compute_run_with_narrative<G: NarrativeGenerator>(
    rows: &[RawPeriodRow],
    generator: &G,
    focus: NarrativeFocus,
) -> Result<AnalysisRun> {
    let mut run = compute_run(rows)?;
    let block = generate_narrative(generator, &run.narrative_context(), focus, None).await?;
    run.add_narrative(block);
    Ok(run)
}
