//! Unit tests for artifact persistence

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::features::select::{FeatureScore, SelectionReport};
    use crate::model::{GradientBoostingParams, RandomForestParams};
    use crate::types::{FeatureFrame, TimeSeriesRecord};
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::TempDir;

    fn sample_report() -> SelectionReport {
        SelectionReport {
            scores: vec![
                FeatureScore {
                    name: "lag_24h".to_string(),
                    mi: 1.25,
                    vif: 3.0,
                },
                FeatureScore {
                    name: "hour".to_string(),
                    mi: 0.4,
                    vif: 1.2,
                },
            ],
            selected: vec!["lag_24h".to_string(), "hour".to_string()],
            threshold: 0.01,
        }
    }

    #[test]
    fn test_selection_roundtrip_and_no_temp_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("models/selected_features.json");
        write_selection(&path, &sample_report()).unwrap();

        assert!(path.exists());
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|x| x == "tmp").unwrap_or(false))
            .collect();
        assert!(leftovers.is_empty(), "temp file left behind");

        let restored = read_selection(&path).unwrap();
        assert_eq!(restored.selected, sample_report().selected);
        assert_eq!(restored.scores.len(), 2);
        assert_eq!(restored.scores[0].mi, 1.25);
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("selected_features.json");
        fs::write(
            &path,
            r#"{"version": 99, "scores": [], "selected": ["x"], "threshold": 0.01}"#,
        )
        .unwrap();

        match read_selection(&path) {
            Err(crate::error::PipelineError::ArtifactVersion {
                expected, found, ..
            }) => {
                assert_eq!(expected, SELECTION_VERSION);
                assert_eq!(found, 99);
            }
            other => panic!("expected version mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_params_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("best_params.json");
        let params = crate::tuner::HyperparameterConfig {
            random_forest: Some(RandomForestParams {
                n_trees: 120,
                max_depth: 9,
            }),
            gradient_boosting: Some(GradientBoostingParams {
                n_estimators: 640,
                learning_rate: 0.03,
                max_depth: 4,
            }),
        };
        write_params(&path, &params).unwrap();
        assert_eq!(read_params(&path).unwrap(), params);
    }

    #[test]
    fn test_scaler_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scaler.json");
        let frame = FeatureFrame {
            feature_names: vec!["a".to_string(), "b".to_string()],
            timestamps: vec![
                NaiveDate::from_ymd_opt(2016, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap();
                3
            ],
            rows: vec![vec![1.0, 10.0], vec![2.0, 20.0], vec![3.0, 30.0]],
            target: vec![0.0, 0.0, 0.0],
        };
        let mut scaler = crate::features::scale::StandardScaler::new();
        scaler.fit(&frame);

        write_scaler(&path, &scaler).unwrap();
        let restored = read_scaler(&path).unwrap();
        assert_eq!(restored, scaler);
    }

    #[test]
    fn test_merged_csv_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("merged.csv");
        let start = NaiveDate::from_ymd_opt(2015, 7, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let records: Vec<TimeSeriesRecord> = (0..48)
            .map(|i| TimeSeriesRecord {
                timestamp: start + chrono::Duration::hours(i),
                load_mw: 1000.0 + i as f64 * 0.125,
                temperature: 290.0 - i as f64 * 0.01,
            })
            .collect();

        write_merged_csv(&path, &records).unwrap();
        assert_eq!(read_merged_csv(&path).unwrap(), records);
    }

    #[test]
    fn test_frame_csv_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("train_scaled.csv");
        let start = NaiveDate::from_ymd_opt(2016, 2, 1)
            .unwrap()
            .and_hms_opt(5, 0, 0)
            .unwrap();
        let frame = FeatureFrame {
            feature_names: vec!["lag_24h".to_string(), "hour".to_string()],
            timestamps: (0..10).map(|i| start + chrono::Duration::hours(i)).collect(),
            rows: (0..10)
                .map(|i| vec![i as f64 * 0.1 - 0.33, (i % 24) as f64])
                .collect(),
            target: (0..10).map(|i| 900.0 + i as f64).collect(),
        };

        write_frame_csv(&path, &frame).unwrap();
        assert_eq!(read_frame_csv(&path).unwrap(), frame);
    }

    #[test]
    fn test_atomic_write_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("best_params.json");
        let first = crate::tuner::HyperparameterConfig {
            random_forest: Some(RandomForestParams {
                n_trees: 60,
                max_depth: 5,
            }),
            gradient_boosting: None,
        };
        let second = crate::tuner::HyperparameterConfig {
            random_forest: Some(RandomForestParams {
                n_trees: 180,
                max_depth: 12,
            }),
            gradient_boosting: None,
        };
        write_params(&path, &first).unwrap();
        write_params(&path, &second).unwrap();
        assert_eq!(read_params(&path).unwrap(), second);
    }
}
