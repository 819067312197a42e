//! Error types for the forecasting pipeline.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur across the pipeline stages.
///
/// Every stage fails fast on an unrecoverable input problem; the
/// orchestrator logs the failing stage and aborts the run, leaving
/// previously written artifacts untouched.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Bad or missing source columns, or no temporal overlap between inputs.
    #[error("ingestion failed: {0}")]
    Ingestion(String),

    /// Too little data for lag/rolling warm-up or fold construction.
    #[error("insufficient history: {0}")]
    InsufficientHistory(String),

    /// No candidate feature cleared the relevance threshold.
    #[error("no feature cleared the mutual-information threshold {threshold}")]
    NoInformativeFeatures { threshold: f64 },

    /// Transform was invoked on a scaler that has not been fitted.
    #[error("scaler used before fit")]
    ScalerNotFitted,

    /// Every trial for a model family failed during hyperparameter search.
    #[error("tuning exhausted for {family}: all {trials} trials failed")]
    TuningExhausted { family: String, trials: usize },

    /// Input feature names do not match the persisted feature set.
    #[error("feature set mismatch: missing {missing:?}, unknown {unknown:?}")]
    ArtifactMismatch {
        missing: Vec<String>,
        unknown: Vec<String>,
    },

    /// Persisted artifact was written with an incompatible schema version.
    #[error("artifact version mismatch for {name}: expected {expected}, found {found}")]
    ArtifactVersion {
        name: String,
        expected: u32,
        found: u32,
    },

    /// Model fitting or prediction failed.
    #[error("model error: {0}")]
    Model(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}
