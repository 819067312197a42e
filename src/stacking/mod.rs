//! Two-level stacking ensemble.
//!
//! Level 0 produces out-of-fold predictions per base learner, so no learner
//! ever predicts a row it was trained on. Level 1 fits a ridge meta-learner
//! on those predictions, choosing its regularization strength by internal
//! cross-validation. The base learners are then refit on the full training
//! partition for inference; only the meta weights come from the
//! out-of-fold stage.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smartcore::linear::ridge_regression::{RidgeRegression, RidgeRegressionParameters};

use crate::config::StackingConfig;
use crate::error::{PipelineError, Result};
use crate::features::scale::StandardScaler;
use crate::model::{
    kfold, model_err, rmse, to_matrix, BaseLearner, LearnerRegistry, Matrix, ModelFamily,
    Regressor,
};
use crate::tuner::HyperparameterConfig;
use crate::types::FeatureFrame;

type RidgeModel = RidgeRegression<f64, f64, Matrix, Vec<f64>>;

/// Ridge meta-learner with the regularization strength that won the
/// internal cross-validation.
#[derive(Debug, Serialize, Deserialize)]
struct MetaLearner {
    alpha: f64,
    model: RidgeModel,
}

/// The persisted ensemble: fitted base learners, meta-learner, and the
/// feature set and scaler they were trained with. The artifact is unusable
/// without the paired scaler and feature list, so they travel together.
#[derive(Debug, Serialize, Deserialize)]
pub struct StackedEnsemble {
    feature_names: Vec<String>,
    scaler: StandardScaler,
    /// Family order of `base`; meta inputs follow this order exactly.
    families: Vec<ModelFamily>,
    base: Vec<BaseLearner>,
    meta: MetaLearner,
}

/// Builds a [`StackedEnsemble`] from tuned hyperparameters.
pub struct StackingTrainer {
    folds: usize,
    meta_alphas: Vec<f64>,
    seed: u64,
    registry: LearnerRegistry,
}

impl StackingTrainer {
    pub fn new(config: &StackingConfig, seed: u64, registry: LearnerRegistry) -> Self {
        Self {
            folds: config.folds,
            meta_alphas: config.meta_alphas.clone(),
            seed,
            registry,
        }
    }

    /// Fit the full two-level model on the scaled training frame.
    ///
    /// `scaler` is the transform already applied to `train`; it is stored in
    /// the artifact so inference inputs go through the identical transform.
    pub fn fit(
        &self,
        train: &FeatureFrame,
        tuned: &HyperparameterConfig,
        scaler: StandardScaler,
    ) -> Result<StackedEnsemble> {
        let families = self.registry.available();
        if families.is_empty() {
            return Err(PipelineError::Model(
                "no learner family is available for stacking".to_string(),
            ));
        }
        let folds = kfold(train.len(), self.folds)?;

        // Level 0: one out-of-fold prediction column per family.
        let oof_columns: Vec<Vec<f64>> = families
            .iter()
            .map(|&family| self.out_of_fold(family, train, tuned, &folds))
            .collect::<Result<Vec<_>>>()?;
        let meta_rows: Vec<Vec<f64>> = (0..train.len())
            .map(|i| oof_columns.iter().map(|c| c[i]).collect())
            .collect();

        // Level 1: ridge on the out-of-fold matrix, alpha by internal CV.
        let alpha = self.select_alpha(&meta_rows, &train.target)?;
        let meta_matrix = to_matrix(&meta_rows)?;
        let meta = RidgeRegression::fit(
            &meta_matrix,
            &train.target.to_vec(),
            RidgeRegressionParameters::default().with_alpha(alpha),
        )
        .map_err(model_err)?;
        tracing::info!("Meta-learner fitted with alpha {}", alpha);

        // Final fit: base learners see the entire training partition.
        let base: Vec<BaseLearner> = families
            .par_iter()
            .map(|&family| {
                let mut learner = BaseLearner::from_tuned(family, tuned, self.seed)?;
                learner.fit(&train.rows, &train.target)?;
                Ok(learner)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(StackedEnsemble {
            feature_names: train.feature_names.clone(),
            scaler,
            families,
            base,
            meta: MetaLearner { alpha, model: meta },
        })
    }

    /// Out-of-fold predictions for one family: for each fold, fit a fresh
    /// learner on the complement and predict the held-out block.
    fn out_of_fold(
        &self,
        family: ModelFamily,
        train: &FeatureFrame,
        tuned: &HyperparameterConfig,
        folds: &[(Vec<usize>, Vec<usize>)],
    ) -> Result<Vec<f64>> {
        let fold_predictions: Vec<(Vec<usize>, Vec<f64>)> = folds
            .par_iter()
            .map(|(fit_idx, val_idx)| {
                let fit = train.subset(fit_idx);
                let val = train.subset(val_idx);
                let mut learner = BaseLearner::from_tuned(family, tuned, self.seed)?;
                learner.fit(&fit.rows, &fit.target)?;
                Ok((val_idx.clone(), learner.predict(&val.rows)?))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut column = vec![0.0; train.len()];
        for (indices, predictions) in fold_predictions {
            for (&i, &p) in indices.iter().zip(&predictions) {
                column[i] = p;
            }
        }
        Ok(column)
    }

    /// Pick the ridge alpha minimizing cross-validated RMSE on the
    /// out-of-fold matrix. Grid order breaks ties.
    fn select_alpha(&self, meta_rows: &[Vec<f64>], target: &[f64]) -> Result<f64> {
        let folds = kfold(meta_rows.len(), self.folds)?;
        let mut best: Option<(f64, f64)> = None;
        for &alpha in &self.meta_alphas {
            let fold_errors: Vec<f64> = folds
                .iter()
                .map(|(fit_idx, val_idx)| {
                    let fit_rows: Vec<Vec<f64>> =
                        fit_idx.iter().map(|&i| meta_rows[i].clone()).collect();
                    let fit_target: Vec<f64> = fit_idx.iter().map(|&i| target[i]).collect();
                    let val_rows: Vec<Vec<f64>> =
                        val_idx.iter().map(|&i| meta_rows[i].clone()).collect();
                    let val_target: Vec<f64> = val_idx.iter().map(|&i| target[i]).collect();
                    let model = RidgeRegression::fit(
                        &to_matrix(&fit_rows)?,
                        &fit_target,
                        RidgeRegressionParameters::default().with_alpha(alpha),
                    )
                    .map_err(model_err)?;
                    let predictions = model.predict(&to_matrix(&val_rows)?).map_err(model_err)?;
                    Ok(rmse(&val_target, &predictions))
                })
                .collect::<Result<Vec<f64>>>()?;
            let score = fold_errors.iter().sum::<f64>() / fold_errors.len() as f64;
            if best.map(|(b, _)| score < b).unwrap_or(true) {
                best = Some((score, alpha));
            }
        }
        best.map(|(_, alpha)| alpha).ok_or_else(|| {
            PipelineError::Model("no meta-learner alpha candidates configured".to_string())
        })
    }
}

impl StackedEnsemble {
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn families(&self) -> &[ModelFamily] {
        &self.families
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    /// Predict on rows that are already scaled and in feature-set order.
    pub fn predict_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        let base_columns: Vec<Vec<f64>> = self
            .base
            .iter()
            .map(|learner| learner.predict(rows))
            .collect::<Result<Vec<_>>>()?;
        let meta_rows: Vec<Vec<f64>> = (0..rows.len())
            .map(|i| base_columns.iter().map(|c| c[i]).collect())
            .collect();
        self.meta
            .model
            .predict(&to_matrix(&meta_rows)?)
            .map_err(model_err)
    }

    /// Predict from a raw feature-name → value mapping.
    ///
    /// The mapping must contain exactly the persisted feature set; missing
    /// or unknown names are rejected before any scaling or prediction.
    pub fn predict(&self, input: &BTreeMap<String, f64>) -> Result<f64> {
        let missing: Vec<String> = self
            .feature_names
            .iter()
            .filter(|n| !input.contains_key(*n))
            .cloned()
            .collect();
        let unknown: Vec<String> = input
            .keys()
            .filter(|k| !self.feature_names.contains(k))
            .cloned()
            .collect();
        if !missing.is_empty() || !unknown.is_empty() {
            return Err(PipelineError::ArtifactMismatch { missing, unknown });
        }

        let raw: Vec<f64> = self.feature_names.iter().map(|n| input[n]).collect();
        let scaled = self.scaler.transform_row(&raw)?;
        Ok(self.predict_rows(&[scaled])?[0])
    }
}
