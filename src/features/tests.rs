//! Unit tests for feature construction, selection, and scaling

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::config::SelectionConfig;
    use crate::error::PipelineError;
    use crate::features::scale::StandardScaler;
    use crate::features::select::{mutual_information, FeatureSelector};
    use crate::types::{FeatureFrame, TimeSeriesRecord};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn start() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2015, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    /// Deterministic load value for hour index `i`.
    fn load_at(i: usize) -> f64 {
        1000.0
            + 300.0 * (2.0 * std::f64::consts::PI * (i % 24) as f64 / 24.0).sin()
            + 2.0 * (i % 7) as f64
    }

    fn synthetic_records(n: usize) -> Vec<TimeSeriesRecord> {
        (0..n)
            .map(|i| TimeSeriesRecord {
                timestamp: start() + chrono::Duration::hours(i as i64),
                load_mw: load_at(i),
                temperature: 275.0 + 10.0 * (2.0 * std::f64::consts::PI * i as f64 / 24.0).cos(),
            })
            .collect()
    }

    fn build_partition(n: usize, cutoff_hour: usize) -> crate::types::Partition {
        let cutoff = start() + chrono::Duration::hours(cutoff_hour as i64);
        FeatureBuilder::new(cutoff).build(&synthetic_records(n)).unwrap()
    }

    #[test]
    fn test_warmup_rows_dropped_exactly() {
        let partition = build_partition(400, 350);
        let total = partition.train.len() + partition.holdout.len();
        assert_eq!(total, 400 - LAG_LONG_HOURS);
        // The first surviving row is the first with a full week of history.
        assert_eq!(
            partition.train.timestamps[0],
            start() + chrono::Duration::hours(LAG_LONG_HOURS as i64)
        );
    }

    #[test]
    fn test_rolling_mean_excludes_current_observation() {
        let partition = build_partition(400, 350);
        let idx = partition.train.column_index("rolling_mean_24h").unwrap();
        for (row_i, ts) in partition.train.timestamps.iter().enumerate().take(20) {
            let hour = (*ts - start()).num_hours() as usize;
            let expected: f64 =
                (hour - ROLLING_WINDOW_HOURS..hour).map(load_at).sum::<f64>() / 24.0;
            assert_relative_eq!(partition.train.rows[row_i][idx], expected, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_lag_features() {
        let partition = build_partition(400, 350);
        let lag24 = partition.train.column_index("lag_24h").unwrap();
        let lag168 = partition.train.column_index("lag_168h").unwrap();
        for (row_i, ts) in partition.train.timestamps.iter().enumerate().take(10) {
            let hour = (*ts - start()).num_hours() as usize;
            assert_relative_eq!(
                partition.train.rows[row_i][lag24],
                load_at(hour - 24),
                epsilon = 1e-9
            );
            assert_relative_eq!(
                partition.train.rows[row_i][lag168],
                load_at(hour - 168),
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn test_calendar_fields_match_chrono() {
        let partition = build_partition(400, 350);
        let frame = &partition.train;
        // 2015-01-08 13:00 is hour index 181: a Thursday in Q1, day 8 of the year.
        let row = frame
            .timestamps
            .iter()
            .position(|ts| ts.to_string() == "2015-01-08 13:00:00")
            .unwrap();
        let get = |name: &str| frame.rows[row][frame.column_index(name).unwrap()];
        assert_eq!(get("hour"), 13.0);
        assert_eq!(get("day_of_week"), 3.0);
        assert_eq!(get("month"), 1.0);
        assert_eq!(get("quarter"), 1.0);
        assert_eq!(get("year"), 2015.0);
        assert_eq!(get("day_of_year"), 8.0);
        let temp = get("temperature");
        assert_relative_eq!(get("temperature_sq"), temp * temp, epsilon = 1e-9);
    }

    #[test]
    fn test_split_is_strictly_ordered() {
        let partition = build_partition(400, 300);
        let cutoff = start() + chrono::Duration::hours(300);
        let last_train = partition.train.timestamps.last().unwrap();
        let first_holdout = partition.holdout.timestamps.first().unwrap();
        assert!(last_train < first_holdout);
        assert!(partition.train.timestamps.iter().all(|ts| *ts < cutoff));
        assert!(partition.holdout.timestamps.iter().all(|ts| *ts >= cutoff));
    }

    #[test]
    fn test_cutoff_before_first_usable_row_fails() {
        let cutoff = start() + chrono::Duration::hours(100);
        let err = FeatureBuilder::new(cutoff)
            .build(&synthetic_records(400))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientHistory(_)));
    }

    #[test]
    fn test_cutoff_past_end_fails() {
        let cutoff = start() + chrono::Duration::hours(4000);
        let err = FeatureBuilder::new(cutoff)
            .build(&synthetic_records(400))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientHistory(_)));
    }

    #[test]
    fn test_too_few_records_fails() {
        let err = FeatureBuilder::new(start())
            .build(&synthetic_records(100))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientHistory(_)));
    }

    // ---- selection ----

    fn make_frame(names: &[&str], columns: Vec<Vec<f64>>, target: Vec<f64>) -> FeatureFrame {
        let n = target.len();
        FeatureFrame {
            feature_names: names.iter().map(|s| s.to_string()).collect(),
            timestamps: (0..n)
                .map(|i| start() + chrono::Duration::hours(i as i64))
                .collect(),
            rows: (0..n).map(|i| columns.iter().map(|c| c[i]).collect()).collect(),
            target,
        }
    }

    #[test]
    fn test_constant_feature_scores_zero_and_is_dropped() {
        let n = 300;
        let signal: Vec<f64> = (0..n).map(|i| (i as f64 / 10.0).sin()).collect();
        let target: Vec<f64> = signal.iter().map(|v| 5.0 * v + 1.0).collect();
        let constant = vec![3.0; n];

        assert_eq!(mutual_information(&constant, &target, 10), 0.0);

        let frame = make_frame(&["signal", "flat"], vec![signal, constant], target);
        let report = FeatureSelector::new(&SelectionConfig::default())
            .select(&frame)
            .unwrap();
        assert_eq!(report.selected, vec!["signal".to_string()]);
    }

    #[test]
    fn test_all_constant_features_fail() {
        let n = 100;
        let frame = make_frame(
            &["a", "b"],
            vec![vec![1.0; n], vec![2.0; n]],
            (0..n).map(|i| i as f64).collect(),
        );
        let err = FeatureSelector::new(&SelectionConfig::default())
            .select(&frame)
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoInformativeFeatures { .. }));
    }

    #[test]
    fn test_perfectly_correlated_pair_has_high_vif() {
        let n = 300;
        let x1: Vec<f64> = (0..n).map(|i| (i as f64 / 7.0).sin()).collect();
        let x2: Vec<f64> = x1.iter().map(|v| 2.0 * v).collect();
        let noise: Vec<f64> = (0..n).map(|i| ((i * 37 % 101) as f64) / 101.0).collect();
        let target: Vec<f64> = x1.iter().map(|v| 10.0 * v).collect();

        let frame = make_frame(&["x1", "x2", "noise"], vec![x1, x2, noise], target);
        let report = FeatureSelector::new(&SelectionConfig::default())
            .select(&frame)
            .unwrap();

        let score = |name: &str| report.scores.iter().find(|s| s.name == name).unwrap();
        assert!(score("x1").vif > 10.0);
        assert!(score("x2").vif > 10.0);
        // Redundancy is reported, not filtered: MI still keeps the pair.
        assert!(report.selected.contains(&"x1".to_string()));
        assert!(report.selected.contains(&"x2".to_string()));
    }

    #[test]
    fn test_selection_ordered_by_relevance() {
        let n = 400;
        let strong: Vec<f64> = (0..n).map(|i| (i as f64 / 9.0).sin()).collect();
        let weak: Vec<f64> = (0..n)
            .map(|i| (i as f64 / 9.0).sin() + 2.0 * (((i * 53) % 211) as f64 / 211.0 - 0.5))
            .collect();
        let target: Vec<f64> = strong.iter().map(|v| 4.0 * v).collect();

        let frame = make_frame(&["weak", "strong"], vec![weak, strong], target);
        let report = FeatureSelector::new(&SelectionConfig::default())
            .select(&frame)
            .unwrap();
        assert_eq!(report.selected[0], "strong");
    }

    // ---- scaling ----

    fn sample_frame() -> FeatureFrame {
        let n = 200;
        make_frame(
            &["a", "b", "flat"],
            vec![
                (0..n).map(|i| 100.0 + (i as f64 / 5.0).sin() * 20.0).collect(),
                (0..n).map(|i| -3.0 + i as f64 * 0.01).collect(),
                vec![7.0; n],
            ],
            (0..n).map(|i| i as f64).collect(),
        )
    }

    #[test]
    fn test_scaler_roundtrip() {
        let frame = sample_frame();
        let mut scaler = StandardScaler::new();
        scaler.fit(&frame);
        let scaled = scaler.transform(&frame).unwrap();
        let restored = scaler.inverse_transform(&scaled).unwrap();
        for (row, orig) in restored.rows.iter().zip(&frame.rows) {
            for (v, o) in row.iter().zip(orig) {
                assert_relative_eq!(*v, *o, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_scaler_standardizes_training_frame() {
        let frame = sample_frame();
        let mut scaler = StandardScaler::new();
        scaler.fit(&frame);
        let scaled = scaler.transform(&frame).unwrap();

        let n = scaled.len() as f64;
        for idx in 0..2 {
            let mean: f64 = scaled.rows.iter().map(|r| r[idx]).sum::<f64>() / n;
            let var: f64 = scaled.rows.iter().map(|r| (r[idx] - mean).powi(2)).sum::<f64>() / n;
            assert_relative_eq!(mean, 0.0, epsilon = 1e-9);
            assert_relative_eq!(var, 1.0, epsilon = 1e-9);
        }
        // Constant column maps to exactly zero, not NaN.
        assert!(scaled.rows.iter().all(|r| r[2] == 0.0));
    }

    #[test]
    fn test_holdout_does_not_influence_fit() {
        let train = sample_frame();
        let mut shifted = train.clone();
        for row in &mut shifted.rows {
            row[0] += 500.0;
        }

        let mut scaler = StandardScaler::new();
        scaler.fit(&train);
        let before = scaler.stats()[0].clone();
        // Transforming the shifted frame must not move the fitted stats.
        let scaled = scaler.transform(&shifted).unwrap();
        assert_eq!(scaler.stats()[0], before);
        let mean: f64 =
            scaled.rows.iter().map(|r| r[0]).sum::<f64>() / scaled.len() as f64;
        assert!(mean > 10.0);
    }

    #[test]
    fn test_transform_before_fit_fails() {
        let frame = sample_frame();
        let scaler = StandardScaler::new();
        assert!(matches!(
            scaler.transform(&frame),
            Err(PipelineError::ScalerNotFitted)
        ));
        assert!(matches!(
            scaler.transform_row(&[1.0]),
            Err(PipelineError::ScalerNotFitted)
        ));
    }

    #[test]
    fn test_transform_rejects_mismatched_names() {
        let frame = sample_frame();
        let mut scaler = StandardScaler::new();
        scaler.fit(&frame);

        let mut renamed = frame.clone();
        renamed.feature_names[1] = "other".to_string();
        match scaler.transform(&renamed) {
            Err(PipelineError::ArtifactMismatch { missing, unknown }) => {
                assert_eq!(missing, vec!["b".to_string()]);
                assert_eq!(unknown, vec!["other".to_string()]);
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_transform_row_matches_frame_transform() {
        let frame = sample_frame();
        let mut scaler = StandardScaler::new();
        scaler.fit(&frame);
        let scaled = scaler.transform(&frame).unwrap();
        let row = scaler.transform_row(&frame.rows[17]).unwrap();
        assert_eq!(row, scaled.rows[17]);
    }
}
