//! Stage orchestration.
//!
//! Stages communicate exclusively through artifacts on disk, so each one can
//! be re-run on its own after a failure. `run` executes the whole sequence;
//! a stage that fails aborts the run and leaves earlier artifacts in place.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{Datelike, Timelike};

use crate::artifacts;
use crate::config::Config;
use crate::error::Result;
use crate::features::scale::StandardScaler;
use crate::features::select::FeatureSelector;
use crate::features::FeatureBuilder;
use crate::ingest::Ingestor;
use crate::model::{EvalMetrics, LearnerRegistry};
use crate::stacking::StackingTrainer;
use crate::trainer::{BaseModelTrainer, TrainingReport};
use crate::tuner::{HyperparameterConfig, Tuner};
use crate::types::{Partition, TimeSeriesRecord};

pub struct Pipeline {
    config: Config,
    registry: LearnerRegistry,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            registry: LearnerRegistry::detect(),
        }
    }

    pub fn with_registry(config: Config, registry: LearnerRegistry) -> Self {
        Self { config, registry }
    }

    /// Run every stage in order.
    pub fn run(&self) -> Result<()> {
        self.ingest()?;
        self.prepare()?;
        let report = self.train()?;
        self.tune()?;
        let stacked = self.stack()?;

        for (family, metrics) in &report.metrics {
            tracing::info!("{:<20} baseline  MAPE {:.2}%", family, metrics.mape);
        }
        tracing::info!("{:<20} optimized MAPE {:.2}%", "stacking", stacked.mape);
        tracing::info!("Pipeline completed; artifacts in {}", self.config.paths.model_dir.display());
        Ok(())
    }

    /// Merge the raw inputs into the hourly series artifact.
    pub fn ingest(&self) -> Result<Vec<TimeSeriesRecord>> {
        self.stage("ingestion", || {
            let records = Ingestor::new(&self.config.data).run()?;
            artifacts::write_merged_csv(&self.config.paths.merged_csv(), &records)?;
            Ok(records)
        })
    }

    /// Build features, split, select, scale; persist everything the later
    /// stages read.
    pub fn prepare(&self) -> Result<Partition> {
        self.stage("preparation", || {
            let records = artifacts::read_merged_csv(&self.config.paths.merged_csv())?;
            let cutoff = self.config.split.cutoff()?;
            let partition = FeatureBuilder::new(cutoff).build(&records)?;

            let report = FeatureSelector::new(&self.config.selection).select(&partition.train)?;
            artifacts::write_selection(&self.config.paths.selected_features(), &report)?;

            let train = partition.train.select(&report.selected)?;
            let holdout = partition.holdout.select(&report.selected)?;

            let mut scaler = StandardScaler::new();
            scaler.fit(&train);
            artifacts::write_scaler(&self.config.paths.scaler(), &scaler)?;

            let scaled = Partition {
                train: scaler.transform(&train)?,
                holdout: scaler.transform(&holdout)?,
            };
            artifacts::write_frame_csv(&self.config.paths.train_csv(), &scaled.train)?;
            artifacts::write_frame_csv(&self.config.paths.holdout_csv(), &scaled.holdout)?;
            Ok(scaled)
        })
    }

    /// Fit the base roster with default parameters and report holdout MAPE.
    pub fn train(&self) -> Result<TrainingReport> {
        self.stage("base training", || {
            let partition = self.load_partition()?;
            let trainer = BaseModelTrainer::new(self.registry.clone(), self.config.seed.0);
            let (_, report) = trainer.train(&partition)?;
            Ok(report)
        })
    }

    /// Random-search the hyperparameter spaces and persist the best config.
    pub fn tune(&self) -> Result<HyperparameterConfig> {
        self.stage("tuning", || {
            let train = artifacts::read_frame_csv(&self.config.paths.train_csv())?;
            let tuner = Tuner::new(&self.config.tuning, self.config.seed.0, self.registry.clone());
            let tuned = tuner.tune(&train)?;
            artifacts::write_params(&self.config.paths.best_params(), &tuned)?;
            Ok(tuned)
        })
    }

    /// Assemble and fit the stacking ensemble, evaluate it on the holdout
    /// partition, and persist the final artifact.
    pub fn stack(&self) -> Result<EvalMetrics> {
        self.stage("stacking", || {
            let partition = self.load_partition()?;
            let tuned = artifacts::read_params(&self.config.paths.best_params())?;
            let scaler = artifacts::read_scaler(&self.config.paths.scaler())?;

            let trainer =
                StackingTrainer::new(&self.config.stacking, self.config.seed.0, self.registry.clone());
            let ensemble = trainer.fit(&partition.train, &tuned, scaler)?;

            let predictions = ensemble.predict_rows(&partition.holdout.rows)?;
            let metrics = EvalMetrics::regression(&partition.holdout.target, &predictions);
            tracing::info!("Stacked ensemble holdout MAPE: {:.2}%", metrics.mape);

            artifacts::write_ensemble(&self.config.paths.ensemble(), &ensemble)?;
            Ok(metrics)
        })
    }

    /// Evaluate the persisted ensemble on the holdout partition, sliced by
    /// calendar regime: overall, weekday, weekend, and evening peak hours.
    pub fn evaluate(&self) -> Result<Vec<(String, EvalMetrics)>> {
        self.stage("evaluation", || {
            let holdout = artifacts::read_frame_csv(&self.config.paths.holdout_csv())?;
            let ensemble = artifacts::read_ensemble(&self.config.paths.ensemble())?;
            let predictions = ensemble.predict_rows(&holdout.rows)?;

            let slice = |name: &str, mask: &dyn Fn(usize) -> bool| {
                let idx: Vec<usize> = (0..holdout.len()).filter(|&i| mask(i)).collect();
                let y: Vec<f64> = idx.iter().map(|&i| holdout.target[i]).collect();
                let p: Vec<f64> = idx.iter().map(|&i| predictions[i]).collect();
                (name.to_string(), EvalMetrics::regression(&y, &p), idx.len())
            };
            let weekend = |i: usize| holdout.timestamps[i].weekday().num_days_from_monday() >= 5;
            let peak = |i: usize| (17..=21).contains(&holdout.timestamps[i].hour());

            let mut report = Vec::new();
            for (name, metrics, rows) in [
                slice("overall", &|_| true),
                slice("weekday", &|i| !weekend(i)),
                slice("weekend", &weekend),
                slice("peak_17_21", &peak),
            ] {
                if rows == 0 {
                    tracing::warn!("{:<12} no holdout rows in slice", name);
                    continue;
                }
                tracing::info!(
                    "{:<12} MAPE {:.2}%  MAE {:.1}  RMSE {:.1}  ({} rows)",
                    name,
                    metrics.mape,
                    metrics.mae,
                    metrics.rmse,
                    rows
                );
                report.push((name, metrics));
            }
            Ok(report)
        })
    }

    /// Single-row inference from a JSON feature mapping, using only the
    /// persisted artifacts. Exercises the same validation the serving layer
    /// relies on: the mapping must contain exactly the selected feature set.
    pub fn predict_file(&self, input: &Path) -> Result<f64> {
        self.stage("prediction", || {
            let ensemble = artifacts::read_ensemble(&self.config.paths.ensemble())?;
            let mapping: BTreeMap<String, f64> =
                serde_json::from_slice(&std::fs::read(input)?)?;
            let value = ensemble.predict(&mapping)?;
            tracing::info!("Predicted load: {:.1} MW", value);
            Ok(value)
        })
    }

    fn load_partition(&self) -> Result<Partition> {
        Ok(Partition {
            train: artifacts::read_frame_csv(&self.config.paths.train_csv())?,
            holdout: artifacts::read_frame_csv(&self.config.paths.holdout_csv())?,
        })
    }

    fn stage<T>(&self, name: &str, body: impl FnOnce() -> Result<T>) -> Result<T> {
        tracing::info!("--- stage {} started ---", name);
        match body() {
            Ok(value) => {
                tracing::info!("--- stage {} completed ---", name);
                Ok(value)
            }
            Err(e) => {
                tracing::error!("stage {} failed: {}", name, e);
                Err(e)
            }
        }
    }
}
