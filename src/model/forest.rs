//! Bagging forest base learner, wrapping the smartcore random forest.

use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};

use crate::error::{PipelineError, Result};
use crate::model::{model_err, to_matrix, Matrix, RandomForestParams, Regressor};

type ForestModel = RandomForestRegressor<f64, f64, Matrix, Vec<f64>>;

/// Random forest regressor with a fixed bagging seed for reproducible runs.
#[derive(Debug, Serialize, Deserialize)]
pub struct RandomForest {
    params: RandomForestParams,
    seed: u64,
    model: Option<ForestModel>,
}

impl RandomForest {
    pub fn new(params: RandomForestParams, seed: u64) -> Self {
        Self {
            params,
            seed,
            model: None,
        }
    }

    pub fn params(&self) -> &RandomForestParams {
        &self.params
    }

    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }
}

impl Regressor for RandomForest {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()> {
        let parameters = RandomForestRegressorParameters::default()
            .with_n_trees(self.params.n_trees)
            .with_max_depth(self.params.max_depth)
            .with_seed(self.seed);
        let model =
            RandomForestRegressor::fit(&to_matrix(x)?, &y.to_vec(), parameters).map_err(model_err)?;
        self.model = Some(model);
        Ok(())
    }

    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| PipelineError::Model("random forest used before fit".to_string()))?;
        model.predict(&to_matrix(x)?).map_err(model_err)
    }
}
