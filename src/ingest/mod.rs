//! Raw data ingestion and merging.
//!
//! Turns two raw CSV time series (hourly load readings, multi-location
//! temperature readings) into one gap-filled, de-duplicated hourly series:
//! 1. Drop duplicate load timestamps (keep first) - DST artifacts
//! 2. Reindex onto the complete hourly range, interpolating load gaps
//! 3. Forward-fill the target location's temperature (never backward,
//!    so no future value leaks into an earlier hour)
//! 4. Inner-join the two series on timestamp


use std::collections::HashMap;
use std::path::Path;

use chrono::{Duration, NaiveDateTime};

use crate::config::{parse_timestamp, DataConfig};
use crate::error::{PipelineError, Result};
use crate::types::TimeSeriesRecord;

/// Merges the raw load and temperature series into hourly records.
pub struct Ingestor {
    data: DataConfig,
}

impl Ingestor {
    pub fn new(data: &DataConfig) -> Self {
        Self { data: data.clone() }
    }

    /// Run the full ingestion pass.
    ///
    /// Fails when a required column is missing from either input, or when
    /// the two series share no timestamps after cleaning.
    pub fn run(&self) -> Result<Vec<TimeSeriesRecord>> {
        let load = read_series(
            &self.data.load_path,
            &self.data.load_timestamp_column,
            &self.data.load_column,
        )?;
        let load = dedupe_keep_first(load, "load");
        let load = reindex_hourly(load)?;

        let temperature = read_series(
            &self.data.temperature_path,
            &self.data.temperature_timestamp_column,
            &self.data.temperature_column,
        )?;
        let temperature = dedupe_keep_first(temperature, "temperature");
        let temperature = forward_fill(temperature);

        let temp_by_ts: HashMap<NaiveDateTime, f64> = temperature.into_iter().collect();
        let merged: Vec<TimeSeriesRecord> = load
            .into_iter()
            .filter_map(|(timestamp, load_mw)| {
                temp_by_ts.get(&timestamp).map(|&temperature| TimeSeriesRecord {
                    timestamp,
                    load_mw,
                    temperature,
                })
            })
            .collect();

        if merged.is_empty() {
            return Err(PipelineError::Ingestion(
                "no overlapping timestamps between load and temperature series".to_string(),
            ));
        }

        tracing::info!("Merged series: {} hourly records", merged.len());
        Ok(merged)
    }
}

/// Read one (timestamp, value) series from a CSV, locating the two columns
/// by header name. An empty or unparseable value cell becomes a missing
/// observation; a bad timestamp fails the whole file.
fn read_series(path: &Path, ts_column: &str, value_column: &str) -> Result<Vec<(NaiveDateTime, Option<f64>)>> {
    let mut reader = csv::ReaderBuilder::new().from_path(path).map_err(|e| {
        PipelineError::Ingestion(format!("cannot open {}: {}", path.display(), e))
    })?;

    let headers = reader.headers()?.clone();
    let ts_idx = find_column(&headers, ts_column, path)?;
    let value_idx = find_column(&headers, value_column, path)?;

    let mut series = Vec::new();
    for record in reader.records() {
        let record = record?;
        let raw_ts = record.get(ts_idx).unwrap_or("");
        let timestamp = parse_timestamp(raw_ts).ok_or_else(|| {
            PipelineError::Ingestion(format!(
                "{}: unparseable timestamp '{}'",
                path.display(),
                raw_ts
            ))
        })?;
        let value = record
            .get(value_idx)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite());
        series.push((timestamp, value));
    }
    series.sort_by_key(|(ts, _)| *ts);
    Ok(series)
}

fn find_column(headers: &csv::StringRecord, name: &str, path: &Path) -> Result<usize> {
    headers.iter().position(|h| h == name).ok_or_else(|| {
        PipelineError::Ingestion(format!("{}: missing column '{}'", path.display(), name))
    })
}

/// Drop duplicate timestamps, keeping the first occurrence. Duplicates show
/// up around daylight-saving transitions.
fn dedupe_keep_first(
    series: Vec<(NaiveDateTime, Option<f64>)>,
    label: &str,
) -> Vec<(NaiveDateTime, Option<f64>)> {
    let mut out: Vec<(NaiveDateTime, Option<f64>)> = Vec::with_capacity(series.len());
    let mut dropped = 0usize;
    for (ts, value) in series {
        if out.last().map(|(last, _)| *last == ts).unwrap_or(false) {
            dropped += 1;
        } else {
            out.push((ts, value));
        }
    }
    if dropped > 0 {
        tracing::warn!("Dropped {} duplicate timestamps from {} series", dropped, label);
    }
    out
}

/// Reindex the load series onto the complete hourly range from its first to
/// its last observation, filling gaps by linear interpolation. Observations
/// that do not fall on the hourly grid are discarded.
fn reindex_hourly(series: Vec<(NaiveDateTime, Option<f64>)>) -> Result<Vec<(NaiveDateTime, f64)>> {
    let known: Vec<(NaiveDateTime, f64)> = {
        let start = series
            .first()
            .map(|(ts, _)| *ts)
            .ok_or_else(|| PipelineError::Ingestion("load series is empty".to_string()))?;
        series
            .iter()
            .filter(|(ts, _)| (*ts - start).num_seconds() % 3600 == 0)
            .filter_map(|(ts, v)| v.map(|v| (*ts, v)))
            .collect()
    };
    if known.is_empty() {
        return Err(PipelineError::Ingestion(
            "load series has no usable observations".to_string(),
        ));
    }

    let start = known[0].0;
    let end = known[known.len() - 1].0;
    let mut out = Vec::new();
    let mut filled = 0usize;
    // Index of the last known observation at or before the cursor.
    let mut left = 0usize;
    let mut cursor = start;
    while cursor <= end {
        while left + 1 < known.len() && known[left + 1].0 <= cursor {
            left += 1;
        }
        let (t0, v0) = known[left];
        let value = if t0 == cursor {
            v0
        } else {
            let (t1, v1) = known[left + 1];
            let span = (t1 - t0).num_seconds() as f64;
            let offset = (cursor - t0).num_seconds() as f64;
            filled += 1;
            v0 + (v1 - v0) * offset / span
        };
        out.push((cursor, value));
        cursor = cursor + Duration::hours(1);
    }
    if filled > 0 {
        tracing::info!("Interpolated {} missing hours in load series", filled);
    }
    Ok(out)
}

/// Carry the last observed value forward over missing observations. Rows
/// before the first observation are dropped, never back-filled.
fn forward_fill(series: Vec<(NaiveDateTime, Option<f64>)>) -> Vec<(NaiveDateTime, f64)> {
    let mut out = Vec::with_capacity(series.len());
    let mut last = None;
    for (ts, value) in series {
        if value.is_some() {
            last = value;
        }
        if let Some(v) = last {
            out.push((ts, v));
        }
    }
    out
}
