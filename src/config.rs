//! Pipeline configuration.
//!
//! Loaded from a TOML file with environment overrides; every setting has a
//! default so a missing file still yields a usable configuration.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seed for every stochastic component (forest bagging, random search).
    /// Fixing it makes two runs on identical data reproducible.
    pub seed: Seed,
    pub data: DataConfig,
    pub split: SplitConfig,
    pub selection: SelectionConfig,
    pub tuning: TuningConfig,
    pub stacking: StackingConfig,
    pub paths: PathsConfig,
}

/// Newtype so the top-level `seed` key can default independently.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(transparent)]
pub struct Seed(pub u64);

impl Default for Seed {
    fn default() -> Self {
        Seed(42)
    }
}

/// Raw input locations and column names.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub load_path: PathBuf,
    pub temperature_path: PathBuf,
    /// Timestamp column in the load CSV.
    pub load_timestamp_column: String,
    /// Load value column in the load CSV.
    pub load_column: String,
    /// Timestamp column in the temperature CSV.
    pub temperature_timestamp_column: String,
    /// Which location's temperature column to keep.
    pub temperature_column: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            load_path: PathBuf::from("data/raw/PJME_hourly.csv"),
            temperature_path: PathBuf::from("data/raw/temperature.csv"),
            load_timestamp_column: "Datetime".to_string(),
            load_column: "PJME_MW".to_string(),
            temperature_timestamp_column: "datetime".to_string(),
            temperature_column: "Philadelphia".to_string(),
        }
    }
}

/// Train/holdout cutoff.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Cutoff timestamp: training is strictly before, holdout at/after.
    /// Accepts `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM:SS`.
    pub cutoff: String,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            cutoff: "2017-01-01".to_string(),
        }
    }
}

impl SplitConfig {
    pub fn cutoff(&self) -> Result<NaiveDateTime> {
        parse_timestamp(&self.cutoff).ok_or_else(|| {
            PipelineError::Ingestion(format!("unparseable cutoff timestamp '{}'", self.cutoff))
        })
    }
}

/// Feature selection thresholds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Keep features whose mutual information with the target exceeds this.
    pub mi_threshold: f64,
    /// Histogram bins per axis for the mutual-information estimate.
    pub mi_bins: usize,
    /// VIF above this is reported as a multicollinearity warning.
    pub vif_threshold: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            mi_threshold: 0.01,
            mi_bins: 10,
            vif_threshold: 10.0,
        }
    }
}

/// Hyperparameter search budget.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// Random-search trials per model family.
    pub trials: usize,
    /// Cross-validation folds for trial scoring.
    pub folds: usize,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            trials: 15,
            folds: 3,
        }
    }
}

/// Stacking ensemble shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StackingConfig {
    /// Folds for the out-of-fold level-0 predictions.
    pub folds: usize,
    /// Candidate regularization strengths for the ridge meta-learner.
    pub meta_alphas: Vec<f64>,
}

impl Default for StackingConfig {
    fn default() -> Self {
        Self {
            folds: 5,
            meta_alphas: vec![0.1, 1.0, 10.0],
        }
    }
}

/// Artifact locations. Each stage writes its outputs here and later stages
/// read them back, so a failed run restarts from the failed stage.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub model_dir: PathBuf,
    pub config_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/processed"),
            model_dir: PathBuf::from("models"),
            config_dir: PathBuf::from("configs"),
        }
    }
}

impl PathsConfig {
    pub fn merged_csv(&self) -> PathBuf {
        self.data_dir.join("merged.csv")
    }

    pub fn train_csv(&self) -> PathBuf {
        self.data_dir.join("train_scaled.csv")
    }

    pub fn holdout_csv(&self) -> PathBuf {
        self.data_dir.join("holdout_scaled.csv")
    }

    pub fn selected_features(&self) -> PathBuf {
        self.model_dir.join("selected_features.json")
    }

    pub fn scaler(&self) -> PathBuf {
        self.model_dir.join("scaler.json")
    }

    pub fn best_params(&self) -> PathBuf {
        self.config_dir.join("best_params.json")
    }

    pub fn ensemble(&self) -> PathBuf {
        self.model_dir.join("ensemble.json")
    }
}

impl Config {
    /// Load configuration from a TOML file plus `LOADCAST_*` environment
    /// overrides. A missing file falls back to defaults.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("LOADCAST").separator("__"))
            .build()?;
        let cfg: Config = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.split.cutoff()?;
        if self.tuning.trials == 0 {
            return Err(PipelineError::Ingestion(
                "tuning.trials must be at least 1".to_string(),
            ));
        }
        if self.tuning.folds < 2 || self.stacking.folds < 2 {
            return Err(PipelineError::Ingestion(
                "cross-validation requires at least 2 folds".to_string(),
            ));
        }
        if self.selection.mi_bins < 2 {
            return Err(PipelineError::Ingestion(
                "selection.mi_bins must be at least 2".to_string(),
            ));
        }
        if self.stacking.meta_alphas.is_empty()
            || self.stacking.meta_alphas.iter().any(|a| *a <= 0.0)
        {
            return Err(PipelineError::Ingestion(
                "stacking.meta_alphas must be non-empty and positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse a timestamp in any of the formats the raw inputs use.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Resolve every artifact path against a base directory. Used by tests and
/// callers that stage a whole run under one root.
pub fn rebase_paths(config: &mut Config, root: &Path) {
    config.paths.data_dir = root.join(&config.paths.data_dir);
    config.paths.model_dir = root.join(&config.paths.model_dir);
    config.paths.config_dir = root.join(&config.paths.config_dir);
}
