use crate::error::{KpiEngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_RUN_NAME: &str = "Financial Analysis";
pub const SAMPLE_RUN_NAME: &str = "Sample Company - H2 2024";

/// Engine-wide settings. Every field has a default, so `{}` is a valid config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub forecast: ForecastConfig,
    pub default_run_name: String,
    pub sample_run_name: String,
    pub narrative: NarrativeConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            forecast: ForecastConfig::default(),
            default_run_name: DEFAULT_RUN_NAME.to_string(),
            sample_run_name: SAMPLE_RUN_NAME.to_string(),
            narrative: NarrativeConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        self.forecast.validate()?;

        if self.narrative.timeout_secs == 0 {
            return Err(KpiEngineError::ConfigError(
                "narrative.timeout_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Number of future periods projected per scenario.
    pub horizon: usize,
    /// How many trailing periods feed the average MoM growth.
    pub lookback: usize,
    /// Monthly growth in percent assumed when no trailing MoM value exists.
    pub no_history_growth: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon: 6,
            lookback: 6,
            no_history_growth: 0.0,
        }
    }
}

impl ForecastConfig {
    pub fn validate(&self) -> Result<()> {
        if self.horizon == 0 {
            return Err(KpiEngineError::ConfigError(
                "forecast.horizon must be at least 1".to_string(),
            ));
        }
        if self.lookback == 0 {
            return Err(KpiEngineError::ConfigError(
                "forecast.lookback must be at least 1".to_string(),
            ));
        }
        if !self.no_history_growth.is_finite() {
            return Err(KpiEngineError::ConfigError(
                "forecast.no_history_growth must be a finite number".to_string(),
            ));
        }
        Ok(())
    }
}

/// Connection settings for the external narrative service.
///
/// Passed to the HTTP client when it is constructed; the crate never reads
/// these from the process environment.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrativeConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key: String::new(),
            timeout_secs: 60,
        }
    }
}

impl NarrativeConfig {
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }
}

impl std::fmt::Debug for NarrativeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NarrativeConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
