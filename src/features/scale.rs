//! Per-feature standardization.
//!
//! Fit on the training partition only; the holdout partition (and any
//! inference input) is transformed with the training statistics so it never
//! influences them.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::types::FeatureFrame;

/// Fitted statistics for one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    pub name: String,
    pub mean: f64,
    /// Standard deviation used for scaling; 1.0 for constant columns so the
    /// transform stays invertible.
    pub std: f64,
}

/// Standardizes features to zero mean and unit variance.
///
/// An unfitted scaler has no statistics; calling `transform` on it fails
/// with [`PipelineError::ScalerNotFitted`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    stats: Vec<FeatureStats>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fitted(&self) -> bool {
        !self.stats.is_empty()
    }

    pub fn stats(&self) -> &[FeatureStats] {
        &self.stats
    }

    /// Names of the features this scaler was fitted on, in order.
    pub fn feature_names(&self) -> Vec<String> {
        self.stats.iter().map(|s| s.name.clone()).collect()
    }

    /// Fit mean and standard deviation per column on the given frame.
    pub fn fit(&mut self, frame: &FeatureFrame) {
        let n = frame.len() as f64;
        self.stats = frame
            .feature_names
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let mean = frame.rows.iter().map(|r| r[idx]).sum::<f64>() / n;
                let variance =
                    frame.rows.iter().map(|r| (r[idx] - mean).powi(2)).sum::<f64>() / n;
                let std = variance.sqrt();
                FeatureStats {
                    name: name.clone(),
                    mean,
                    std: if std < 1e-12 { 1.0 } else { std },
                }
            })
            .collect();
    }

    /// Standardize a frame with the fitted statistics.
    pub fn transform(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        self.check_names(&frame.feature_names)?;
        let mut out = frame.clone();
        for row in &mut out.rows {
            for (value, stats) in row.iter_mut().zip(&self.stats) {
                *value = (*value - stats.mean) / stats.std;
            }
        }
        Ok(out)
    }

    /// Undo the standardization. `inverse_transform(transform(x)) ≈ x`.
    pub fn inverse_transform(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        self.check_names(&frame.feature_names)?;
        let mut out = frame.clone();
        for row in &mut out.rows {
            for (value, stats) in row.iter_mut().zip(&self.stats) {
                *value = *value * stats.std + stats.mean;
            }
        }
        Ok(out)
    }

    /// Standardize one row of raw values, already in fitted feature order.
    pub fn transform_row(&self, values: &[f64]) -> Result<Vec<f64>> {
        if !self.is_fitted() {
            return Err(PipelineError::ScalerNotFitted);
        }
        if values.len() != self.stats.len() {
            return Err(PipelineError::Model(format!(
                "scaler fitted on {} features, got {} values",
                self.stats.len(),
                values.len()
            )));
        }
        Ok(values
            .iter()
            .zip(&self.stats)
            .map(|(v, s)| (v - s.mean) / s.std)
            .collect())
    }

    fn check_names(&self, names: &[String]) -> Result<()> {
        if !self.is_fitted() {
            return Err(PipelineError::ScalerNotFitted);
        }
        if names == self.feature_names().as_slice() {
            return Ok(());
        }
        let fitted = self.feature_names();
        Err(PipelineError::ArtifactMismatch {
            missing: fitted
                .iter()
                .filter(|n| !names.contains(n))
                .cloned()
                .collect(),
            unknown: names
                .iter()
                .filter(|n| !fitted.contains(n))
                .cloned()
                .collect(),
        })
    }
}
