//! Base model training and holdout evaluation.
//!
//! Fits every available learner family on the scaled training matrix and
//! scores each one independently on the scaled holdout matrix. Families the
//! registry reports unavailable are skipped with a warning, never a failure.


use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::model::{BaseLearner, EvalMetrics, LearnerRegistry, ModelFamily, Regressor};
use crate::types::Partition;

/// One fitted base model and its holdout accuracy.
#[derive(Debug)]
pub struct TrainedBase {
    pub family: ModelFamily,
    pub model: BaseLearner,
    pub metrics: EvalMetrics,
}

/// Holdout accuracy per model family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub metrics: BTreeMap<String, EvalMetrics>,
}

/// Trains the fixed roster of base learners with default parameters.
pub struct BaseModelTrainer {
    registry: LearnerRegistry,
    seed: u64,
}

impl BaseModelTrainer {
    pub fn new(registry: LearnerRegistry, seed: u64) -> Self {
        Self { registry, seed }
    }

    /// Fit each available family concurrently; models share the immutable
    /// input matrices and own their state, so they train independently.
    pub fn train(&self, partition: &Partition) -> Result<(Vec<TrainedBase>, TrainingReport)> {
        let families: Vec<ModelFamily> = ModelFamily::ALL
            .iter()
            .copied()
            .filter(|family| {
                if self.registry.is_available(*family) {
                    true
                } else {
                    tracing::warn!("Learner family {} unavailable, skipping", family);
                    false
                }
            })
            .collect();

        let trained: Vec<TrainedBase> = families
            .par_iter()
            .map(|&family| self.train_one(family, partition))
            .collect::<Result<Vec<Option<TrainedBase>>>>()?
            .into_iter()
            .flatten()
            .collect();

        if trained.is_empty() {
            return Err(PipelineError::Model(
                "no learner family is available in this build".to_string(),
            ));
        }

        let mut metrics = BTreeMap::new();
        for t in &trained {
            tracing::info!("{} holdout MAPE: {:.2}%", t.family, t.metrics.mape);
            metrics.insert(t.family.to_string(), t.metrics);
        }
        Ok((trained, TrainingReport { metrics }))
    }

    fn train_one(&self, family: ModelFamily, partition: &Partition) -> Result<Option<TrainedBase>> {
        let Some(mut model) = BaseLearner::with_defaults(family, self.seed) else {
            tracing::warn!("Learner family {} not compiled in, skipping", family);
            return Ok(None);
        };
        model.fit(&partition.train.rows, &partition.train.target)?;
        let predictions = model.predict(&partition.holdout.rows)?;
        let metrics = EvalMetrics::regression(&partition.holdout.target, &predictions);
        Ok(Some(TrainedBase {
            family,
            model,
            metrics,
        }))
    }
}
