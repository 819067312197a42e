//! Temporal feature construction and the train/holdout split.
//!
//! Every derived feature at timestamp `t` uses only information strictly
//! before `t` (lags, rolling mean) or intrinsic to `t` (calendar fields,
//! temperature). Rows without enough history for the longest lag are
//! dropped, not imputed.

pub mod scale;
pub mod select;

#[cfg(test)]
mod tests;

use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::error::{PipelineError, Result};
use crate::types::{FeatureFrame, Partition, TimeSeriesRecord};

/// Short lag: same hour yesterday.
pub const LAG_SHORT_HOURS: usize = 24;
/// Long lag: same hour one week earlier. Also the warm-up length.
pub const LAG_LONG_HOURS: usize = 168;
/// Trailing window for the rolling mean, ending at `t - 1`.
pub const ROLLING_WINDOW_HOURS: usize = 24;

/// Target column name used in persisted tabular artifacts.
pub const TARGET_COLUMN: &str = "load_mw";

/// Candidate feature names, in the fixed order the matrices are built in.
pub const CANDIDATE_FEATURES: [&str; 11] = [
    "temperature",
    "temperature_sq",
    "hour",
    "day_of_week",
    "month",
    "quarter",
    "year",
    "day_of_year",
    "lag_24h",
    "lag_168h",
    "rolling_mean_24h",
];

/// Derives calendar, lag and rolling features from the merged series and
/// splits the result at a single cutoff timestamp.
pub struct FeatureBuilder {
    cutoff: NaiveDateTime,
}

impl FeatureBuilder {
    pub fn new(cutoff: NaiveDateTime) -> Self {
        Self { cutoff }
    }

    /// Build the full candidate feature frame and split it.
    ///
    /// The first [`LAG_LONG_HOURS`] rows have no value for the longest lag
    /// and are dropped. An empty training or holdout partition fails loudly
    /// rather than letting a later stage train on nothing.
    pub fn build(&self, records: &[TimeSeriesRecord]) -> Result<Partition> {
        if records.len() <= LAG_LONG_HOURS {
            return Err(PipelineError::InsufficientHistory(format!(
                "need more than {} hourly records for lag warm-up, got {}",
                LAG_LONG_HOURS,
                records.len()
            )));
        }

        let loads: Vec<f64> = records.iter().map(|r| r.load_mw).collect();
        let mut frame = FeatureFrame {
            feature_names: CANDIDATE_FEATURES.iter().map(|s| s.to_string()).collect(),
            ..FeatureFrame::default()
        };

        for (i, record) in records.iter().enumerate().skip(LAG_LONG_HOURS) {
            let rolling: f64 = loads[i - ROLLING_WINDOW_HOURS..i].iter().sum::<f64>()
                / ROLLING_WINDOW_HOURS as f64;
            let mut row = calendar_features(record.timestamp, record.temperature);
            row.push(loads[i - LAG_SHORT_HOURS]);
            row.push(loads[i - LAG_LONG_HOURS]);
            row.push(rolling);

            frame.timestamps.push(record.timestamp);
            frame.rows.push(row);
            frame.target.push(record.load_mw);
        }

        let split = frame
            .timestamps
            .iter()
            .position(|ts| *ts >= self.cutoff)
            .unwrap_or(frame.len());
        if split == 0 {
            return Err(PipelineError::InsufficientHistory(format!(
                "training partition is empty: cutoff {} precedes first usable row {}",
                self.cutoff, frame.timestamps[0]
            )));
        }
        if split == frame.len() {
            return Err(PipelineError::InsufficientHistory(format!(
                "holdout partition is empty: cutoff {} is past the last row {}",
                self.cutoff,
                frame.timestamps[frame.len() - 1]
            )));
        }

        let train_idx: Vec<usize> = (0..split).collect();
        let holdout_idx: Vec<usize> = (split..frame.len()).collect();
        let partition = Partition {
            train: frame.subset(&train_idx),
            holdout: frame.subset(&holdout_idx),
        };
        tracing::info!(
            "Feature split at {}: {} training rows, {} holdout rows",
            self.cutoff,
            partition.train.len(),
            partition.holdout.len()
        );
        Ok(partition)
    }
}

/// Calendar components plus the temperature terms, in candidate order up to
/// the lag features.
fn calendar_features(ts: NaiveDateTime, temperature: f64) -> Vec<f64> {
    vec![
        temperature,
        temperature * temperature,
        ts.hour() as f64,
        ts.weekday().num_days_from_monday() as f64,
        ts.month() as f64,
        ((ts.month0() / 3) + 1) as f64,
        ts.year() as f64,
        ts.ordinal() as f64,
    ]
}
