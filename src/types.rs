//! Core data model shared across the pipeline stages.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// One hour of the merged series.
///
/// The ingestor guarantees exactly one record per hourly timestamp in the
/// merged range: no duplicates, no gaps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesRecord {
    pub timestamp: NaiveDateTime,
    /// Hourly load in megawatts.
    pub load_mw: f64,
    /// Temperature at the target location, in kelvin.
    pub temperature: f64,
}

/// A named, ordered feature matrix with per-row timestamps and target.
///
/// Column order is part of the contract: downstream stages build their
/// input matrices in exactly this order, including at inference time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureFrame {
    pub feature_names: Vec<String>,
    pub timestamps: Vec<NaiveDateTime>,
    /// Row-major feature values, one inner vec per timestamp.
    pub rows: Vec<Vec<f64>>,
    pub target: Vec<f64>,
}

impl FeatureFrame {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.feature_names.iter().position(|n| n == name)
    }

    /// Copy of a single feature column, by name.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r[idx]).collect())
    }

    /// Project the frame onto the given feature names, in the given order.
    ///
    /// Fails when a requested name is absent, which happens when a persisted
    /// feature list is replayed against a frame built from different inputs.
    pub fn select(&self, names: &[String]) -> Result<FeatureFrame> {
        let mut indices = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for name in names {
            match self.column_index(name) {
                Some(idx) => indices.push(idx),
                None => missing.push(name.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(PipelineError::ArtifactMismatch {
                missing,
                unknown: Vec::new(),
            });
        }
        Ok(FeatureFrame {
            feature_names: names.to_vec(),
            timestamps: self.timestamps.clone(),
            rows: self
                .rows
                .iter()
                .map(|r| indices.iter().map(|&i| r[i]).collect())
                .collect(),
            target: self.target.clone(),
        })
    }

    /// Row subset by index, preserving order. Used for fold construction.
    pub fn subset(&self, indices: &[usize]) -> FeatureFrame {
        FeatureFrame {
            feature_names: self.feature_names.clone(),
            timestamps: indices.iter().map(|&i| self.timestamps[i]).collect(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
            target: indices.iter().map(|&i| self.target[i]).collect(),
        }
    }
}

/// Temporally disjoint train/holdout split.
///
/// Invariant: every training timestamp is strictly less than every holdout
/// timestamp. Rows are never shuffled.
#[derive(Debug, Clone)]
pub struct Partition {
    pub train: FeatureFrame,
    pub holdout: FeatureFrame,
}
