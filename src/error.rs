use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum KpiEngineError {
    #[error("Validation failed for row {row}, field '{field}': {details}")]
    ValidationError {
        row: usize,
        field: String,
        details: String,
    },

    #[error("No usable periods remain after normalization")]
    EmptyInput,

    #[error("Period '{0}' is not part of this analysis run")]
    UnknownPeriod(String),

    #[error("Unknown forecast scenario '{0}' (expected Base, Upside, Downside or Stress)")]
    UnknownScenario(String),

    #[error("Analysis run not found: {0}")]
    RunNotFound(Uuid),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Narrative generation failed: {0}")]
    NarrativeFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "gemini")]
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl KpiEngineError {
    pub fn validation(row: usize, field: &str, details: impl Into<String>) -> Self {
        Self::ValidationError {
            row,
            field: field.to_string(),
            details: details.into(),
        }
    }

    /// True for errors caused by caller input rather than the environment.
    pub fn is_rejected_input(&self) -> bool {
        matches!(
            self,
            Self::ValidationError { .. }
                | Self::EmptyInput
                | Self::UnknownPeriod(_)
                | Self::UnknownScenario(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, KpiEngineError>;
