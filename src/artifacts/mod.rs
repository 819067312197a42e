//! Stage-boundary artifacts.
//!
//! Every JSON artifact carries an explicit schema version and is written
//! all-or-nothing: serialize to a temp path in the destination directory,
//! then atomically rename. A crash mid-write can never leave a half-written
//! artifact for a later stage to load. Artifacts are immutable once
//! written; stages re-write whole files, never patch them.

#[cfg(test)]
mod tests;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::features::scale::StandardScaler;
use crate::features::select::SelectionReport;
use crate::features::TARGET_COLUMN;
use crate::stacking::StackedEnsemble;
use crate::tuner::HyperparameterConfig;
use crate::types::{FeatureFrame, TimeSeriesRecord};

pub const SELECTION_VERSION: u32 = 1;
pub const SCALER_VERSION: u32 = 1;
pub const PARAMS_VERSION: u32 = 1;
pub const ENSEMBLE_VERSION: u32 = 1;

const FRAME_TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    version: u32,
    #[serde(flatten)]
    payload: &'a T,
}

/// Write bytes to `path` via a sibling temp file and an atomic rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn write_versioned<T: Serialize>(path: &Path, version: u32, payload: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(&Envelope { version, payload })?;
    write_atomic(path, &bytes)?;
    tracing::info!("Wrote artifact {}", path.display());
    Ok(())
}

fn read_versioned<T: DeserializeOwned>(path: &Path, version: u32, name: &str) -> Result<T> {
    let bytes = fs::read(path)?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)?;
    let found = value.get("version").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
    if found != version {
        return Err(PipelineError::ArtifactVersion {
            name: name.to_string(),
            expected: version,
            found,
        });
    }
    Ok(serde_json::from_value(value)?)
}

pub fn write_selection(path: &Path, report: &SelectionReport) -> Result<()> {
    write_versioned(path, SELECTION_VERSION, report)
}

pub fn read_selection(path: &Path) -> Result<SelectionReport> {
    read_versioned(path, SELECTION_VERSION, "selected_features")
}

pub fn write_scaler(path: &Path, scaler: &StandardScaler) -> Result<()> {
    write_versioned(path, SCALER_VERSION, scaler)
}

pub fn read_scaler(path: &Path) -> Result<StandardScaler> {
    read_versioned(path, SCALER_VERSION, "scaler")
}

pub fn write_params(path: &Path, params: &HyperparameterConfig) -> Result<()> {
    write_versioned(path, PARAMS_VERSION, params)
}

pub fn read_params(path: &Path) -> Result<HyperparameterConfig> {
    read_versioned(path, PARAMS_VERSION, "best_params")
}

pub fn write_ensemble(path: &Path, ensemble: &StackedEnsemble) -> Result<()> {
    write_versioned(path, ENSEMBLE_VERSION, ensemble)
}

pub fn read_ensemble(path: &Path) -> Result<StackedEnsemble> {
    read_versioned(path, ENSEMBLE_VERSION, "ensemble")
}

/// Persist the merged series. Formatting is deterministic, so re-running
/// ingestion on identical inputs produces a byte-identical file.
pub fn write_merged_csv(path: &Path, records: &[TimeSeriesRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.serialize(record)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    write_atomic(path, &bytes)
}

pub fn read_merged_csv(path: &Path) -> Result<Vec<TimeSeriesRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for record in reader.deserialize() {
        records.push(record?);
    }
    Ok(records)
}

/// Persist a feature frame as CSV: timestamp column, feature columns in
/// contract order, then the target column.
pub fn write_frame_csv(path: &Path, frame: &FeatureFrame) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut header = vec!["timestamp".to_string()];
    header.extend(frame.feature_names.iter().cloned());
    header.push(TARGET_COLUMN.to_string());
    writer.write_record(&header)?;

    for i in 0..frame.len() {
        let mut row = vec![frame.timestamps[i].format(FRAME_TS_FORMAT).to_string()];
        row.extend(frame.rows[i].iter().map(|v| v.to_string()));
        row.push(frame.target[i].to_string());
        writer.write_record(&row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    write_atomic(path, &bytes)
}

pub fn read_frame_csv(path: &Path) -> Result<FeatureFrame> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let width = headers.len();
    if width < 2 {
        return Err(PipelineError::Ingestion(format!(
            "{}: malformed feature frame header",
            path.display()
        )));
    }
    let feature_names: Vec<String> = headers
        .iter()
        .skip(1)
        .take(width - 2)
        .map(|s| s.to_string())
        .collect();

    let mut frame = FeatureFrame {
        feature_names,
        ..FeatureFrame::default()
    };
    for record in reader.records() {
        let record = record?;
        let raw_ts = record.get(0).unwrap_or("");
        let timestamp = NaiveDateTime::parse_from_str(raw_ts, FRAME_TS_FORMAT).map_err(|_| {
            PipelineError::Ingestion(format!(
                "{}: unparseable timestamp '{}'",
                path.display(),
                raw_ts
            ))
        })?;
        let mut values = Vec::with_capacity(width - 1);
        for field in record.iter().skip(1) {
            values.push(field.parse::<f64>().map_err(|_| {
                PipelineError::Ingestion(format!(
                    "{}: unparseable value '{}'",
                    path.display(),
                    field
                ))
            })?);
        }
        let target = values.pop().ok_or_else(|| {
            PipelineError::Ingestion(format!("{}: short row", path.display()))
        })?;
        frame.timestamps.push(timestamp);
        frame.rows.push(values);
        frame.target.push(target);
    }
    Ok(frame)
}
