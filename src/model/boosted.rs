//! Gradient-boosted regression trees.
//!
//! Stagewise boosting over smartcore decision trees: each tree is fit to
//! the current residuals and added with a shrinkage factor. Tree growth is
//! deterministic (every split sees every feature), so a fit is reproducible
//! without a seed.

use serde::{Deserialize, Serialize};
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};

use crate::error::{PipelineError, Result};
use crate::model::{model_err, to_matrix, GradientBoostingParams, Matrix, Regressor};

type TreeModel = DecisionTreeRegressor<f64, f64, Matrix, Vec<f64>>;

/// Gradient-boosted trees base learner.
#[derive(Debug, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    params: GradientBoostingParams,
    /// Constant initial prediction (training target mean).
    base: f64,
    trees: Vec<TreeModel>,
}

impl GradientBoostedTrees {
    pub fn new(params: GradientBoostingParams) -> Self {
        Self {
            params,
            base: 0.0,
            trees: Vec::new(),
        }
    }

    pub fn params(&self) -> &GradientBoostingParams {
        &self.params
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }
}

impl Regressor for GradientBoostedTrees {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()> {
        if y.is_empty() {
            return Err(PipelineError::Model(
                "cannot fit gradient boosting on an empty target".to_string(),
            ));
        }
        let matrix = to_matrix(x)?;
        self.base = y.iter().sum::<f64>() / y.len() as f64;
        self.trees = Vec::with_capacity(self.params.n_estimators);

        let mut current = vec![self.base; y.len()];
        let mut residual: Vec<f64> = y.iter().zip(&current).map(|(t, c)| t - c).collect();
        let tree_params =
            DecisionTreeRegressorParameters::default().with_max_depth(self.params.max_depth);

        for _ in 0..self.params.n_estimators {
            let tree = DecisionTreeRegressor::fit(&matrix, &residual, tree_params.clone())
                .map_err(model_err)?;
            let update = tree.predict(&matrix).map_err(model_err)?;
            for i in 0..current.len() {
                current[i] += self.params.learning_rate * update[i];
                residual[i] = y[i] - current[i];
            }
            self.trees.push(tree);
        }
        Ok(())
    }

    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        if self.trees.is_empty() {
            return Err(PipelineError::Model(
                "gradient boosting used before fit".to_string(),
            ));
        }
        let matrix = to_matrix(x)?;
        let mut predictions = vec![self.base; x.len()];
        for tree in &self.trees {
            let update = tree.predict(&matrix).map_err(model_err)?;
            for (p, u) in predictions.iter_mut().zip(&update) {
                *p += self.params.learning_rate * u;
            }
        }
        Ok(predictions)
    }
}
