//! Base learner roster: model families, typed hyperparameters, and the
//! capability registry the trainer and ensemble query instead of branching
//! on compile-time features directly.

pub mod forest;

#[cfg(feature = "boosted")]
pub mod boosted;


use std::fmt;

use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::error::{PipelineError, Result};
use crate::tuner::HyperparameterConfig;

pub(crate) type Matrix = DenseMatrix<f64>;

pub(crate) fn to_matrix(rows: &[Vec<f64>]) -> Result<Matrix> {
    Ok(DenseMatrix::from_2d_vec(&rows.to_vec()))
}

pub(crate) fn model_err(e: smartcore::error::Failed) -> PipelineError {
    PipelineError::Model(e.to_string())
}

/// The fixed roster of base learner families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    RandomForest,
    GradientBoosting,
}

impl ModelFamily {
    /// Roster order. This is also the order base-learner outputs are fed to
    /// the meta-learner, at training and at inference.
    pub const ALL: [ModelFamily; 2] = [ModelFamily::RandomForest, ModelFamily::GradientBoosting];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::RandomForest => "random_forest",
            ModelFamily::GradientBoosting => "gradient_boosting",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hyperparameters for the bagging forest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RandomForestParams {
    pub n_trees: usize,
    pub max_depth: u16,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
        }
    }
}

/// Hyperparameters for gradient-boosted trees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: u16,
}

impl Default for GradientBoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 500,
            learning_rate: 0.1,
            max_depth: 3,
        }
    }
}

/// Seam for anything that fits on a feature matrix and predicts a value
/// per row.
pub trait Regressor {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()>;
    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>>;
}

/// A concrete base learner. An enum rather than a trait object so fitted
/// learners serialize into the ensemble artifact.
#[derive(Debug, Serialize, Deserialize)]
pub enum BaseLearner {
    RandomForest(forest::RandomForest),
    #[cfg(feature = "boosted")]
    GradientBoosting(boosted::GradientBoostedTrees),
}

impl BaseLearner {
    pub fn family(&self) -> ModelFamily {
        match self {
            BaseLearner::RandomForest(_) => ModelFamily::RandomForest,
            #[cfg(feature = "boosted")]
            BaseLearner::GradientBoosting(_) => ModelFamily::GradientBoosting,
        }
    }

    /// Construct an unfitted learner with its family's default parameters.
    /// `None` when the family is compiled out.
    pub fn with_defaults(family: ModelFamily, seed: u64) -> Option<BaseLearner> {
        match family {
            ModelFamily::RandomForest => Some(BaseLearner::RandomForest(
                forest::RandomForest::new(RandomForestParams::default(), seed),
            )),
            ModelFamily::GradientBoosting => {
                #[cfg(feature = "boosted")]
                {
                    Some(BaseLearner::GradientBoosting(
                        boosted::GradientBoostedTrees::new(GradientBoostingParams::default()),
                    ))
                }
                #[cfg(not(feature = "boosted"))]
                {
                    None
                }
            }
        }
    }

    /// Construct an unfitted learner from the tuned parameter config.
    ///
    /// A family without a tuned entry is an error: the ensemble consumes
    /// tuned parameters, never silent defaults.
    pub fn from_tuned(
        family: ModelFamily,
        tuned: &HyperparameterConfig,
        seed: u64,
    ) -> Result<BaseLearner> {
        let missing = || {
            PipelineError::Model(format!(
                "no tuned parameters for family {family}; run the tuning stage first"
            ))
        };
        match family {
            ModelFamily::RandomForest => {
                let params = tuned.random_forest.ok_or_else(missing)?;
                Ok(BaseLearner::RandomForest(forest::RandomForest::new(
                    params, seed,
                )))
            }
            ModelFamily::GradientBoosting => {
                #[cfg(feature = "boosted")]
                {
                    let params = tuned.gradient_boosting.ok_or_else(missing)?;
                    Ok(BaseLearner::GradientBoosting(
                        boosted::GradientBoostedTrees::new(params),
                    ))
                }
                #[cfg(not(feature = "boosted"))]
                {
                    Err(PipelineError::Model(format!(
                        "learner family {family} is not compiled into this build"
                    )))
                }
            }
        }
    }
}

impl Regressor for BaseLearner {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()> {
        match self {
            BaseLearner::RandomForest(m) => m.fit(x, y),
            #[cfg(feature = "boosted")]
            BaseLearner::GradientBoosting(m) => m.fit(x, y),
        }
    }

    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        match self {
            BaseLearner::RandomForest(m) => m.predict(x),
            #[cfg(feature = "boosted")]
            BaseLearner::GradientBoosting(m) => m.predict(x),
        }
    }
}

/// Availability entry for one learner family.
#[derive(Debug, Clone)]
pub struct LearnerInfo {
    pub family: ModelFamily,
    pub available: bool,
    pub note: &'static str,
}

/// Registry of learner families and their availability in this build.
///
/// Consumers iterate the available roster instead of checking compile-time
/// features themselves; a missing optional family degrades the roster, it
/// never fails the pipeline.
#[derive(Debug, Clone)]
pub struct LearnerRegistry {
    entries: Vec<LearnerInfo>,
}

impl LearnerRegistry {
    /// Detect what this build provides.
    pub fn detect() -> Self {
        Self {
            entries: vec![
                LearnerInfo {
                    family: ModelFamily::RandomForest,
                    available: true,
                    note: "bundled",
                },
                LearnerInfo {
                    family: ModelFamily::GradientBoosting,
                    available: cfg!(feature = "boosted"),
                    note: if cfg!(feature = "boosted") {
                        "bundled"
                    } else {
                        "compiled out (enable the `boosted` feature)"
                    },
                },
            ],
        }
    }

    /// Drop a family from the available roster. Used to exercise the
    /// degraded path without rebuilding.
    pub fn without(mut self, family: ModelFamily) -> Self {
        for entry in &mut self.entries {
            if entry.family == family {
                entry.available = false;
                entry.note = "disabled";
            }
        }
        self
    }

    pub fn entries(&self) -> &[LearnerInfo] {
        &self.entries
    }

    pub fn is_available(&self, family: ModelFamily) -> bool {
        self.entries
            .iter()
            .any(|e| e.family == family && e.available)
    }

    /// Available families in roster order.
    pub fn available(&self) -> Vec<ModelFamily> {
        ModelFamily::ALL
            .iter()
            .copied()
            .filter(|f| self.is_available(*f))
            .collect()
    }
}

impl Default for LearnerRegistry {
    fn default() -> Self {
        Self::detect()
    }
}

/// Holdout accuracy for one model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    /// Mean absolute error.
    pub mae: f64,
    /// Root mean squared error.
    pub rmse: f64,
    /// Mean absolute percentage error, in percent.
    pub mape: f64,
    /// Coefficient of determination.
    pub r2: f64,
}

impl EvalMetrics {
    pub fn regression(y_true: &[f64], y_pred: &[f64]) -> Self {
        let n = y_true.len().min(y_pred.len()) as f64;
        let mae = y_true
            .iter()
            .zip(y_pred)
            .map(|(t, p)| (t - p).abs())
            .sum::<f64>()
            / n;
        let mse = y_true
            .iter()
            .zip(y_pred)
            .map(|(t, p)| (t - p).powi(2))
            .sum::<f64>()
            / n;
        let mape = y_true
            .iter()
            .zip(y_pred)
            .map(|(t, p)| (t - p).abs() / t.abs().max(1e-8))
            .sum::<f64>()
            / n
            * 100.0;
        let mean = y_true.iter().sum::<f64>() / n;
        let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
        let ss_res: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();
        let r2 = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };
        Self {
            mae,
            rmse: mse.sqrt(),
            mape,
            r2,
        }
    }
}

/// Contiguous, order-preserving k-fold split of `n` rows: fold `f` holds
/// one block of consecutive rows, the complement is its training set.
pub fn kfold(n: usize, k: usize) -> Result<Vec<(Vec<usize>, Vec<usize>)>> {
    if k < 2 {
        return Err(PipelineError::Model(format!(
            "k-fold requires at least 2 folds, got {k}"
        )));
    }
    if n < k {
        return Err(PipelineError::InsufficientHistory(format!(
            "{k}-fold cross-validation needs at least {k} rows, got {n}"
        )));
    }

    let base = n / k;
    let remainder = n % k;
    let mut folds = Vec::with_capacity(k);
    let mut start = 0usize;
    for f in 0..k {
        let size = base + usize::from(f < remainder);
        let test: Vec<usize> = (start..start + size).collect();
        let train: Vec<usize> = (0..start).chain(start + size..n).collect();
        folds.push((train, test));
        start += size;
    }
    Ok(folds)
}

/// Root mean squared error, the tuning objective's raw value.
pub fn rmse(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let n = y_true.len().min(y_pred.len()) as f64;
    (y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / n)
        .sqrt()
}
