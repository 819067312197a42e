//! Hyperparameter search.
//!
//! Seeded random search per model family over a bounded space, scored by
//! negated k-fold cross-validated RMSE on the training partition only. The
//! search is stochastic and best-effort; reproducibility comes from the
//! caller-supplied seed. Fold evaluation runs on the thread pool, trial
//! sampling stays sequential so the draw order is deterministic.


use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::TuningConfig;
use crate::error::{PipelineError, Result};
use crate::model::{
    kfold, rmse, BaseLearner, GradientBoostingParams, LearnerRegistry, ModelFamily,
    RandomForestParams, Regressor,
};
use crate::types::FeatureFrame;

/// Tuned parameters per model family, written once by the tuner and read
/// once when the stacking ensemble is assembled. A family that was not
/// tuned has no entry; consumers must treat that as an error rather than
/// substituting defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_forest: Option<RandomForestParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gradient_boosting: Option<GradientBoostingParams>,
}

impl HyperparameterConfig {
    /// Families with a tuned entry, in roster order.
    pub fn tuned_families(&self) -> Vec<ModelFamily> {
        let mut families = Vec::new();
        if self.random_forest.is_some() {
            families.push(ModelFamily::RandomForest);
        }
        if self.gradient_boosting.is_some() {
            families.push(ModelFamily::GradientBoosting);
        }
        families
    }
}

/// Random-search tuner over the registered learner families.
pub struct Tuner {
    trials: usize,
    folds: usize,
    seed: u64,
    registry: LearnerRegistry,
}

impl Tuner {
    pub fn new(config: &TuningConfig, seed: u64, registry: LearnerRegistry) -> Self {
        Self {
            trials: config.trials,
            folds: config.folds,
            seed,
            registry,
        }
    }

    /// Search every available family and return the best parameters found.
    pub fn tune(&self, train: &FeatureFrame) -> Result<HyperparameterConfig> {
        let folds = kfold(train.len(), self.folds)?;
        let mut tuned = HyperparameterConfig::default();
        for family in self.registry.available() {
            match family {
                ModelFamily::RandomForest => {
                    tuned.random_forest = Some(self.tune_forest(train, &folds)?);
                }
                ModelFamily::GradientBoosting => {
                    tuned.gradient_boosting = Some(self.tune_boosted(train, &folds)?);
                }
            }
        }
        Ok(tuned)
    }

    fn tune_forest(&self, train: &FeatureFrame, folds: &[Fold]) -> Result<RandomForestParams> {
        let mut rng = self.family_rng(ModelFamily::RandomForest);
        let candidates: Vec<RandomForestParams> = (0..self.trials)
            .map(|_| RandomForestParams {
                n_trees: rng.random_range(50..=200),
                max_depth: rng.random_range(5..=15),
            })
            .collect();
        let seed = self.seed;
        self.search(ModelFamily::RandomForest, train, folds, candidates, move |p| {
            BaseLearner::RandomForest(crate::model::forest::RandomForest::new(*p, seed))
        })
    }

    fn tune_boosted(&self, train: &FeatureFrame, folds: &[Fold]) -> Result<GradientBoostingParams> {
        #[cfg(feature = "boosted")]
        {
            let mut rng = self.family_rng(ModelFamily::GradientBoosting);
            let candidates: Vec<GradientBoostingParams> = (0..self.trials)
                .map(|_| GradientBoostingParams {
                    n_estimators: rng.random_range(500..=1000),
                    learning_rate: rng
                        .random_range(0.01f64.ln()..=0.1f64.ln())
                        .exp(),
                    max_depth: rng.random_range(3..=9),
                })
                .collect();
            self.search(ModelFamily::GradientBoosting, train, folds, candidates, |p| {
                BaseLearner::GradientBoosting(crate::model::boosted::GradientBoostedTrees::new(*p))
            })
        }
        #[cfg(not(feature = "boosted"))]
        {
            let _ = (train, folds);
            Err(PipelineError::Model(
                "gradient boosting is not compiled into this build".to_string(),
            ))
        }
    }

    /// Evaluate every candidate; keep the one maximizing negated CV RMSE.
    /// Trials whose folds fail or score non-finite are discarded; a family
    /// with zero completed trials aborts the search.
    fn search<P: Copy + std::fmt::Debug + Sync>(
        &self,
        family: ModelFamily,
        train: &FeatureFrame,
        folds: &[Fold],
        candidates: Vec<P>,
        make_learner: impl Fn(&P) -> BaseLearner + Sync,
    ) -> Result<P> {
        let mut best: Option<(f64, P)> = None;
        let mut completed = 0usize;
        for params in &candidates {
            let score = match self.cv_score(train, folds, || make_learner(params)) {
                Ok(s) if s.is_finite() => s,
                Ok(_) | Err(_) => {
                    tracing::warn!("{} trial with {:?} failed, discarding", family, params);
                    continue;
                }
            };
            completed += 1;
            if best.map(|(b, _)| score > b).unwrap_or(true) {
                best = Some((score, *params));
            }
        }

        match best {
            Some((score, params)) => {
                tracing::info!(
                    "{}: best CV RMSE {:.3} over {} of {} trials, params {:?}",
                    family,
                    -score,
                    completed,
                    self.trials,
                    params
                );
                Ok(params)
            }
            None => Err(PipelineError::TuningExhausted {
                family: family.to_string(),
                trials: self.trials,
            }),
        }
    }

    /// Negated mean per-fold RMSE (higher is better).
    fn cv_score(
        &self,
        train: &FeatureFrame,
        folds: &[Fold],
        make_learner: impl Fn() -> BaseLearner + Sync,
    ) -> Result<f64> {
        let fold_errors: Vec<f64> = folds
            .par_iter()
            .map(|(fit_idx, val_idx)| {
                let fit = train.subset(fit_idx);
                let val = train.subset(val_idx);
                let mut learner = make_learner();
                learner.fit(&fit.rows, &fit.target)?;
                let predictions = learner.predict(&val.rows)?;
                Ok(rmse(&val.target, &predictions))
            })
            .collect::<Result<Vec<f64>>>()?;
        Ok(-(fold_errors.iter().sum::<f64>() / fold_errors.len() as f64))
    }

    fn family_rng(&self, family: ModelFamily) -> StdRng {
        let offset = ModelFamily::ALL
            .iter()
            .position(|f| *f == family)
            .unwrap_or(0) as u64;
        StdRng::seed_from_u64(self.seed.wrapping_add(offset))
    }
}

type Fold = (Vec<usize>, Vec<usize>);
