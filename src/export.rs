use crate::error::Result;
use crate::forecast::Scenario;
use crate::metrics::Metric;
use crate::run::AnalysisRun;
use crate::schema::KpiSet;
use std::fmt::Write as _;
use std::path::Path;

/// Metrics shown in the executive tables of the Markdown report.
const REPORT_METRICS: [Metric; 8] = [
    Metric::Revenue,
    Metric::GrossMargin,
    Metric::OperatingMargin,
    Metric::NetMargin,
    Metric::OpexRatio,
    Metric::MomGrowth,
    Metric::CurrentRatio,
    Metric::CashRunwayMonths,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// One row per period with every KPI.
    Csv,
    Json,
    PrettyJson,
    Markdown,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json | Self::PrettyJson => "json",
            Self::Markdown => "md",
        }
    }
}

/// KPI table as CSV. Gaps are written as `N/A`, never as an empty cell or zero.
pub fn kpis_to_csv(kpis: &[KpiSet]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    let mut header = vec!["period"];
    header.extend(Metric::KPIS.iter().map(Metric::key));
    wtr.write_record(&header)?;

    for set in kpis {
        let mut record = vec![set.period.clone()];
        record.extend(Metric::KPIS.iter().map(|metric| {
            set.value(*metric)
                .map_or_else(|| "N/A".to_string(), |value| value.to_string())
        }));
        wtr.write_record(&record)?;
    }

    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn run_to_json(run: &AnalysisRun, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(run)?
    } else {
        serde_json::to_string(run)?
    };
    Ok(json)
}

/// Executive report: KPI table, latest variances, scenario outlook and narratives.
pub fn run_to_markdown(run: &AnalysisRun) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# {}\n", run.name);
    let _ = writeln!(
        md,
        "Generated {} from {} period(s).\n",
        run.created_at.format("%Y-%m-%d %H:%M UTC"),
        run.periods().len()
    );

    md.push_str("## Key Performance Indicators\n\n| Period |");
    for metric in REPORT_METRICS {
        let _ = write!(md, " {} |", metric.label());
    }
    md.push_str("\n|---|");
    md.push_str(&"---:|".repeat(REPORT_METRICS.len()));
    md.push('\n');

    for set in run.kpis() {
        let _ = write!(md, "| {} |", set.period);
        for metric in REPORT_METRICS {
            let _ = write!(md, " {} |", metric.kind().format(set.value(metric)));
        }
        md.push('\n');
    }

    let variances = run.latest_variance();
    if !variances.is_empty() {
        md.push_str("\n## Latest Variance\n\n");
        md.push_str("| Metric | Current | Prior | Change | Status | Driver |\n");
        md.push_str("|---|---:|---:|---:|---|---|\n");
        for v in &variances {
            let change = v
                .variance_percent
                .map_or_else(|| "N/A".to_string(), |pct| format!("{:+.1}%", pct));
            let _ = writeln!(
                md,
                "| {} | {} | {} | {} | {:?} | {} |",
                v.label,
                v.kind.format(Some(v.current_value)),
                v.kind.format(Some(v.comparison_value)),
                change,
                v.status,
                v.driver_explanation
            );
        }
    }

    if !run.forecasts().is_empty() {
        md.push_str("\n## Forecast Scenarios\n\n");
        md.push_str("| Scenario | Monthly Growth | Final Period | Final Revenue | Assumption |\n");
        md.push_str("|---|---:|---|---:|---|\n");
        for scenario in Scenario::ALL {
            let Some(forecast) = run.forecasts().get(&scenario) else {
                continue;
            };
            let (period, revenue) = forecast
                .periods
                .last()
                .map_or(("N/A", None), |p| (p.period.as_str(), Some(p.revenue)));
            let _ = writeln!(
                md,
                "| {} | {:+.2}% | {} | {} | {} |",
                scenario,
                forecast.monthly_growth_rate * 100.0,
                period,
                Metric::Revenue.kind().format(revenue),
                forecast.assumptions.description
            );
        }
    }

    if !run.narratives().is_empty() {
        md.push_str("\n## Commentary\n");
        for block in run.narratives() {
            let _ = writeln!(
                md,
                "\n### {} ({})\n\n{}",
                block.focus.as_str(),
                block.generated_at.format("%Y-%m-%d"),
                block.response.summary
            );
            for item in &block.response.key_insights {
                let _ = writeln!(md, "- {}", item);
            }
        }
    }

    md
}

pub fn export_run(run: &AnalysisRun, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Csv => kpis_to_csv(run.kpis()),
        ExportFormat::Json => run_to_json(run, false),
        ExportFormat::PrettyJson => run_to_json(run, true),
        ExportFormat::Markdown => Ok(run_to_markdown(run)),
    }
}

pub fn export_run_to_file(run: &AnalysisRun, path: &Path, format: ExportFormat) -> Result<()> {
    let content = export_run(run, format)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrative::{NarrativeBlock, NarrativeFocus, NarrativeResponse};
    use crate::run::compute_sample_run;

    #[test]
    fn test_kpis_to_csv_marks_gaps() {
        let run = compute_sample_run().unwrap();
        let csv = kpis_to_csv(run.kpis()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 7);
        assert!(lines[0].starts_with("period,revenue,gross_profit,gross_margin"));
        assert!(lines[1].starts_with("2024-07,1850000,"));
        // First period has no prior month and the sample carries no balance sheet.
        assert!(lines[1].contains("N/A"));
        assert_eq!(
            lines[1].split(',').count(),
            Metric::KPIS.len() + 1
        );
    }

    #[test]
    fn test_markdown_report() {
        let mut run = compute_sample_run().unwrap();
        run.add_narrative(NarrativeBlock::new(
            NarrativeFocus::ExecutiveSummary,
            None,
            NarrativeResponse {
                summary: "Revenue up six months running.".to_string(),
                key_insights: vec!["Margins stable".to_string()],
                ..NarrativeResponse::default()
            },
        ));

        let md = run_to_markdown(&run);
        assert!(md.starts_with("# Sample Company - H2 2024"));
        assert!(md.contains("| 2024-12 | $2,450,000 |"));
        assert!(md.contains("Current Ratio"));
        assert!(md.contains("N/A"));
        assert!(md.contains("## Latest Variance"));
        assert!(md.contains("| Stress | -5.00% |"));
        assert!(md.contains("Revenue up six months running."));
        assert!(md.contains("- Margins stable"));
    }

    #[test]
    fn test_export_formats() {
        let run = compute_sample_run().unwrap();
        let json = export_run(&run, ExportFormat::Json).unwrap();
        assert!(json.contains("\"name\":\"Sample Company - H2 2024\""));
        assert!(export_run(&run, ExportFormat::PrettyJson).unwrap().contains('\n'));
        assert_eq!(ExportFormat::Markdown.extension(), "md");
    }
}
