//! Unit tests for the stacking ensemble

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::config::StackingConfig;
    use crate::error::PipelineError;
    use crate::features::scale::StandardScaler;
    use crate::model::{GradientBoostingParams, LearnerRegistry, RandomForestParams};
    use crate::tuner::HyperparameterConfig;
    use crate::types::FeatureFrame;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn make_frame(n: usize) -> FeatureFrame {
        let start = NaiveDate::from_ymd_opt(2016, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| vec![(i as f64 / 8.0).sin(), i as f64 / n as f64])
            .collect();
        FeatureFrame {
            feature_names: vec!["wave".to_string(), "trend".to_string()],
            timestamps: (0..n)
                .map(|i| start + chrono::Duration::hours(i as i64))
                .collect(),
            target: rows.iter().map(|r| 200.0 + 40.0 * r[0] + 80.0 * r[1]).collect(),
            rows,
        }
    }

    fn small_params() -> HyperparameterConfig {
        HyperparameterConfig {
            random_forest: Some(RandomForestParams {
                n_trees: 20,
                max_depth: 6,
            }),
            gradient_boosting: Some(GradientBoostingParams {
                n_estimators: 40,
                learning_rate: 0.1,
                max_depth: 3,
            }),
        }
    }

    fn fitted_scaler(frame: &FeatureFrame) -> StandardScaler {
        let mut scaler = StandardScaler::new();
        scaler.fit(frame);
        scaler
    }

    fn fit_ensemble(seed: u64) -> (StackedEnsemble, FeatureFrame) {
        let raw = make_frame(60);
        let scaler = fitted_scaler(&raw);
        let scaled = scaler.transform(&raw).unwrap();
        let trainer = StackingTrainer::new(
            &StackingConfig::default(),
            seed,
            LearnerRegistry::detect(),
        );
        let ensemble = trainer.fit(&scaled, &small_params(), scaler).unwrap();
        (ensemble, scaled)
    }

    #[test]
    fn test_fit_learns_the_training_signal() {
        let (ensemble, scaled) = fit_ensemble(42);
        let predictions = ensemble.predict_rows(&scaled.rows).unwrap();
        let metrics = crate::model::EvalMetrics::regression(&scaled.target, &predictions);
        assert!(metrics.r2 > 0.5, "stack failed to learn: {metrics:?}");
    }

    #[test]
    fn test_meta_input_order_matches_roster() {
        let (ensemble, _) = fit_ensemble(42);
        assert_eq!(ensemble.families(), LearnerRegistry::detect().available());
    }

    #[test]
    fn test_fixed_seed_reproduces_predictions() {
        let (a, scaled) = fit_ensemble(7);
        let (b, _) = fit_ensemble(7);
        let pa = a.predict_rows(&scaled.rows).unwrap();
        let pb = b.predict_rows(&scaled.rows).unwrap();
        for (x, y) in pa.iter().zip(&pb) {
            assert!((x - y).abs() < 1e-9, "{x} != {y}");
        }
    }

    #[test]
    fn test_predict_from_mapping_matches_rows() {
        let (ensemble, _) = fit_ensemble(42);
        let raw = make_frame(60);
        let mut mapping = BTreeMap::new();
        mapping.insert("wave".to_string(), raw.rows[30][0]);
        mapping.insert("trend".to_string(), raw.rows[30][1]);

        let from_mapping = ensemble.predict(&mapping).unwrap();
        let scaled_row = ensemble.scaler().transform_row(&raw.rows[30]).unwrap();
        let from_rows = ensemble.predict_rows(&[scaled_row]).unwrap()[0];
        assert!((from_mapping - from_rows).abs() < 1e-9);
    }

    #[test]
    fn test_missing_feature_rejected_before_prediction() {
        let (ensemble, _) = fit_ensemble(42);
        let mut mapping = BTreeMap::new();
        mapping.insert("wave".to_string(), 0.3);

        match ensemble.predict(&mapping) {
            Err(PipelineError::ArtifactMismatch { missing, unknown }) => {
                assert_eq!(missing, vec!["trend".to_string()]);
                assert!(unknown.is_empty());
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_feature_rejected_before_prediction() {
        let (ensemble, _) = fit_ensemble(42);
        let mut mapping = BTreeMap::new();
        mapping.insert("wave".to_string(), 0.3);
        mapping.insert("trend".to_string(), 0.5);
        mapping.insert("surprise".to_string(), 1.0);

        match ensemble.predict(&mapping) {
            Err(PipelineError::ArtifactMismatch { missing, unknown }) => {
                assert!(missing.is_empty());
                assert_eq!(unknown, vec!["surprise".to_string()]);
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_serialization_roundtrip_preserves_predictions() {
        let (ensemble, scaled) = fit_ensemble(42);
        let json = serde_json::to_string(&ensemble).unwrap();
        let restored: StackedEnsemble = serde_json::from_str(&json).unwrap();

        let before = ensemble.predict_rows(&scaled.rows).unwrap();
        let after = restored.predict_rows(&scaled.rows).unwrap();
        for (x, y) in before.iter().zip(&after) {
            assert!((x - y).abs() < 1e-9);
        }
        assert_eq!(restored.feature_names(), ensemble.feature_names());
        assert_eq!(restored.families(), ensemble.families());
    }

    #[test]
    fn test_missing_tuned_params_fail() {
        let raw = make_frame(40);
        let scaler = fitted_scaler(&raw);
        let scaled = scaler.transform(&raw).unwrap();
        let trainer = StackingTrainer::new(
            &StackingConfig::default(),
            42,
            LearnerRegistry::detect(),
        );
        let err = trainer
            .fit(&scaled, &HyperparameterConfig::default(), scaler)
            .unwrap_err();
        assert!(err.to_string().contains("tuned parameters"));
    }
}
