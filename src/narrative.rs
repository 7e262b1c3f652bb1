//! Narrative blocks attached to an analysis run.
//!
//! The text itself comes from an external language-model service. This module only
//! prepares the numeric facts that service may talk about, parses what it returns,
//! and defines the [`NarrativeGenerator`] seam any provider plugs into. No number
//! in a run is ever derived from narrative output.

use crate::error::{KpiEngineError, Result};
use crate::forecast::{ForecastPeriod, ForecastScenario, Scenario};
use crate::metrics::Metric;
use crate::schema::KpiSet;
use crate::variance::VarianceEntry;
use chrono::{DateTime, Utc};
use log::warn;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::future::Future;
use std::str::FromStr;
use uuid::Uuid;

/// Number of variance lines handed to the narrative service.
const MAX_CONTEXT_VARIANCES: usize = 6;

pub const SYSTEM_PROMPT: &str = "You are a seasoned FP&A Director preparing insights for executive leadership. \
You provide clear, concise, data-driven analysis.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeFocus {
    #[default]
    ExecutiveSummary,
    Variance,
    Forecast,
    Recommendations,
}

impl NarrativeFocus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExecutiveSummary => "executive_summary",
            Self::Variance => "variance",
            Self::Forecast => "forecast",
            Self::Recommendations => "recommendations",
        }
    }

    pub fn instruction(&self) -> &'static str {
        match self {
            Self::ExecutiveSummary => {
                "Provide a concise executive summary for leadership. What are the key takeaways? \
                 What should the CFO highlight in the next board meeting?"
            }
            Self::Variance => {
                "Analyze the variances in detail. What drove the changes? \
                 Which variances require immediate attention?"
            }
            Self::Forecast => {
                "Explain the forecast scenarios. What are the key assumptions? \
                 What conditions would trigger upside vs downside cases?"
            }
            Self::Recommendations => {
                "Provide specific, actionable recommendations. \
                 What should finance leadership prioritize in the next 30/60/90 days?"
            }
        }
    }
}

impl FromStr for NarrativeFocus {
    type Err = KpiEngineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        [
            Self::ExecutiveSummary,
            Self::Variance,
            Self::Forecast,
            Self::Recommendations,
        ]
        .into_iter()
        .find(|focus| focus.as_str() == s.trim())
        .ok_or_else(|| KpiEngineError::NarrativeFailed(format!("unknown narrative focus '{}'", s)))
    }
}

/// The numeric facts a narrative may reference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NarrativeContext {
    pub latest: Option<KpiSet>,
    pub variances: Vec<VarianceEntry>,
    pub base_next_period: Option<ForecastPeriod>,
}

impl NarrativeContext {
    pub fn new(
        kpis: &[KpiSet],
        variances: &[VarianceEntry],
        forecasts: &BTreeMap<Scenario, ForecastScenario>,
    ) -> Self {
        Self {
            latest: kpis.last().cloned(),
            variances: variances.iter().take(MAX_CONTEXT_VARIANCES).cloned().collect(),
            base_next_period: forecasts
                .get(&Scenario::Base)
                .and_then(|base| base.periods.first())
                .cloned(),
        }
    }

    /// Plain-text rendering. Gaps are written as `N/A` so they are never mistaken for zero.
    pub fn render(&self) -> String {
        let mut out = String::new();

        if let Some(latest) = &self.latest {
            let _ = writeln!(out, "LATEST PERIOD ({}):", latest.period);
            for metric in [
                Metric::Revenue,
                Metric::MomGrowth,
                Metric::GrossMargin,
                Metric::OperatingMargin,
                Metric::NetMargin,
                Metric::OpexRatio,
                Metric::CurrentRatio,
                Metric::CashRunwayMonths,
            ] {
                let _ = writeln!(
                    out,
                    "- {}: {}",
                    metric.label(),
                    metric.kind().format(latest.value(metric))
                );
            }
        } else {
            out.push_str("LATEST PERIOD: data not available\n");
        }

        if !self.variances.is_empty() {
            out.push_str("\nKEY VARIANCES (vs Prior Period):\n");
            for variance in &self.variances {
                let change = variance
                    .variance_percent
                    .map_or_else(|| "N/A".to_string(), |pct| format!("{:+.1}%", pct));
                let _ = writeln!(out, "- {}: {} ({:?})", variance.label, change, variance.status);
            }
        }

        if let Some(next) = &self.base_next_period {
            let _ = writeln!(out, "\nBASE CASE FORECAST ({}):", next.period);
            let _ = writeln!(
                out,
                "- Projected Revenue: {}",
                Metric::Revenue.kind().format(Some(next.revenue))
            );
            let _ = writeln!(
                out,
                "- Projected Operating Margin: {}",
                Metric::OperatingMargin.kind().format(next.operating_margin)
            );
        }

        out
    }
}

/// Builds the user prompt for one narrative request.
pub fn build_prompt(
    context: &NarrativeContext,
    focus: NarrativeFocus,
    question: Option<&str>,
) -> String {
    let mut task = focus.instruction().to_string();
    if let Some(question) = question.map(str::trim).filter(|q| !q.is_empty()) {
        let _ = write!(task, "\n\nAdditionally, answer this specific question: {}", question);
    }

    format!(
        "RULES:\n\
         - Only reference the data provided below\n\
         - Never invent or assume numbers not in the data\n\
         - If data is missing, explicitly state \"data not available\"\n\
         - Be concise and decision-oriented\n\n\
         {}\n\
         TASK: {}\n\n\
         Respond in JSON with these exact keys: summary (2-4 sentences), key_insights (3-5 items), \
         risks (2-3 items), recommendations (3-4 items), variance_drivers (top 3, when analyzing variance).",
        context.render(),
        task
    )
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NarrativeResponse {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_insights: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variance_drivers: Option<Vec<String>>,
}

impl NarrativeResponse {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(NarrativeResponse)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::generate_json_schema())
    }

    fn unstructured(text: &str) -> Self {
        Self {
            summary: text.to_string(),
            key_insights: vec!["See summary for details".to_string()],
            risks: vec!["Unable to parse structured risks".to_string()],
            recommendations: vec!["Review full narrative for recommendations".to_string()],
            variance_drivers: None,
        }
    }
}

/// Parses a service reply into a [`NarrativeResponse`].
///
/// Markdown code fences are stripped first. A reply that is not the expected JSON
/// object is kept whole as the summary.
pub fn parse_narrative_response(raw: &str) -> NarrativeResponse {
    let text = strip_code_fence(raw);

    match serde_json::from_str::<NarrativeResponse>(text) {
        Ok(mut parsed) => {
            if parsed.summary.trim().is_empty() {
                parsed.summary = text.to_string();
            }
            parsed
        }
        Err(e) => {
            warn!("Narrative reply is not structured JSON ({}); keeping raw text", e);
            NarrativeResponse::unstructured(text)
        }
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// One generated narrative, stored on the run in generation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeBlock {
    pub id: Uuid,
    pub focus: NarrativeFocus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    pub response: NarrativeResponse,
    pub generated_at: DateTime<Utc>,
}

impl NarrativeBlock {
    pub fn new(focus: NarrativeFocus, question: Option<String>, response: NarrativeResponse) -> Self {
        Self {
            id: Uuid::new_v4(),
            focus,
            question,
            response,
            generated_at: Utc::now(),
        }
    }
}

/// A text-generation service. Implementations return the raw reply text.
pub trait NarrativeGenerator {
    fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// Asks `generator` for a narrative about `context` and parses the reply.
pub async fn generate_narrative<G: NarrativeGenerator>(
    generator: &G,
    context: &NarrativeContext,
    focus: NarrativeFocus,
    question: Option<&str>,
) -> Result<NarrativeBlock> {
    let prompt = build_prompt(context, focus, question);
    let reply = generator.complete(SYSTEM_PROMPT, &prompt).await?;

    Ok(NarrativeBlock::new(
        focus,
        question.map(str::to_string),
        parse_narrative_response(&reply),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kpi::calculate_kpis;
    use crate::schema::PeriodRecord;
    use crate::variance::compare_kpis;

    struct CannedGenerator(&'static str);

    impl NarrativeGenerator for CannedGenerator {
        fn complete(
            &self,
            _system_prompt: &str,
            user_prompt: &str,
        ) -> impl Future<Output = Result<String>> + Send {
            let reply = if user_prompt.contains("TASK:") {
                Ok(self.0.to_string())
            } else {
                Err(KpiEngineError::NarrativeFailed("prompt without task".to_string()))
            };
            async move { reply }
        }
    }

    fn kpis() -> Vec<KpiSet> {
        let period = |label: &str, revenue: f64| PeriodRecord {
            period: label.to_string(),
            revenue,
            cogs: revenue * 0.6,
            opex: revenue * 0.2,
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
        };
        calculate_kpis(&[period("2024-07", 1000.0), period("2024-08", 1100.0)])
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"summary\": \"Strong month.\", \"key_insights\": [\"a\"], \"risks\": [], \"recommendations\": [\"b\"]}\n```";
        let parsed = parse_narrative_response(raw);
        assert_eq!(parsed.summary, "Strong month.");
        assert_eq!(parsed.key_insights, vec!["a".to_string()]);
        assert_eq!(parsed.variance_drivers, None);
    }

    #[test]
    fn test_parse_plain_text_falls_back_to_summary() {
        let parsed = parse_narrative_response("Revenue grew; margins held.");
        assert_eq!(parsed.summary, "Revenue grew; margins held.");
        assert_eq!(parsed.key_insights.len(), 1);
    }

    #[test]
    fn test_context_renders_gaps_as_na() {
        let kpis = kpis();
        let variances = compare_kpis(&kpis[1], &kpis[0]);
        let context = NarrativeContext::new(&kpis, &variances, &BTreeMap::new());
        let text = context.render();

        assert!(text.contains("LATEST PERIOD (2024-08)"));
        assert!(text.contains("Revenue: $1,100"));
        assert!(text.contains("Current Ratio: N/A"));
        assert!(text.contains("KEY VARIANCES"));
        assert!(!text.contains("BASE CASE"));
        assert_eq!(context.variances.len(), MAX_CONTEXT_VARIANCES);
    }

    #[test]
    fn test_prompt_carries_focus_and_question() {
        let prompt = build_prompt(
            &NarrativeContext::default(),
            NarrativeFocus::Recommendations,
            Some("Should we hire?"),
        );
        assert!(prompt.contains("30/60/90"));
        assert!(prompt.contains("Should we hire?"));
        assert!(prompt.contains("data not available"));
    }

    #[test]
    fn test_focus_parsing() {
        assert_eq!(
            "variance".parse::<NarrativeFocus>().unwrap(),
            NarrativeFocus::Variance
        );
        assert!("poem".parse::<NarrativeFocus>().is_err());
    }

    #[test]
    fn test_response_schema_lists_keys() {
        let schema = NarrativeResponse::schema_as_json().unwrap();
        assert!(schema.contains("key_insights"));
        assert!(schema.contains("variance_drivers"));
    }

    #[tokio::test]
    async fn test_generate_narrative_with_canned_reply() {
        let generator = CannedGenerator(r#"{"summary": "All good.", "risks": ["churn"]}"#);
        let block = generate_narrative(
            &generator,
            &NarrativeContext::default(),
            NarrativeFocus::ExecutiveSummary,
            None,
        )
        .await
        .unwrap();

        assert_eq!(block.focus, NarrativeFocus::ExecutiveSummary);
        assert_eq!(block.response.summary, "All good.");
        assert_eq!(block.response.risks, vec!["churn".to_string()]);
        assert_eq!(block.question, None);
    }
}
