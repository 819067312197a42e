//! Feature relevance scoring and selection.
//!
//! Relevance is a mutual-information score against the target (captures
//! non-linear dependence, robust to monotonic transforms). Multicollinearity
//! is diagnosed per feature with a variance inflation factor; the VIF is
//! reported, not used as a filter.

use serde::{Deserialize, Serialize};
use smartcore::linear::linear_regression::{
    LinearRegression, LinearRegressionParameters, LinearRegressionSolverName,
};

use crate::config::SelectionConfig;
use crate::error::{PipelineError, Result};
use crate::model::to_matrix;
use crate::types::FeatureFrame;

/// VIF ceiling for reporting; perfect collinearity would otherwise be
/// unrepresentable in JSON.
const VIF_CAP: f64 = 1e12;

/// Relevance and collinearity scores for one candidate feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureScore {
    pub name: String,
    pub mi: f64,
    pub vif: f64,
}

/// Outcome of a selection pass, persisted alongside the selected list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionReport {
    /// Scores for every candidate, in original column order.
    pub scores: Vec<FeatureScore>,
    /// Selected names, descending mutual information, ties in column order.
    pub selected: Vec<String>,
    pub threshold: f64,
}

/// Ranks candidate features and fixes the final feature set.
pub struct FeatureSelector {
    threshold: f64,
    bins: usize,
    vif_threshold: f64,
}

impl FeatureSelector {
    pub fn new(config: &SelectionConfig) -> Self {
        Self {
            threshold: config.mi_threshold,
            bins: config.mi_bins,
            vif_threshold: config.vif_threshold,
        }
    }

    /// Score every candidate feature on the training frame and keep those
    /// whose mutual information with the target clears the threshold.
    pub fn select(&self, train: &FeatureFrame) -> Result<SelectionReport> {
        if train.is_empty() {
            return Err(PipelineError::InsufficientHistory(
                "cannot select features from an empty training frame".to_string(),
            ));
        }

        let vifs = vif_scores(train)?;
        let mut scores = Vec::with_capacity(train.feature_names.len());
        for (idx, name) in train.feature_names.iter().enumerate() {
            let column: Vec<f64> = train.rows.iter().map(|r| r[idx]).collect();
            let mi = mutual_information(&column, &train.target, self.bins);
            scores.push(FeatureScore {
                name: name.clone(),
                mi,
                vif: vifs[idx],
            });
        }

        for score in &scores {
            if score.vif > self.vif_threshold {
                tracing::warn!(
                    "Feature {} has VIF {:.1} (multicollinear with the rest)",
                    score.name,
                    score.vif
                );
            }
        }

        let mut ranked: Vec<usize> = (0..scores.len())
            .filter(|&i| scores[i].mi > self.threshold)
            .collect();
        ranked.sort_by(|&a, &b| {
            scores[b]
                .mi
                .partial_cmp(&scores[a].mi)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });
        if ranked.is_empty() {
            return Err(PipelineError::NoInformativeFeatures {
                threshold: self.threshold,
            });
        }

        let selected: Vec<String> = ranked.iter().map(|&i| scores[i].name.clone()).collect();
        let top: Vec<String> = ranked
            .iter()
            .take(5)
            .map(|&i| format!("{} ({:.3})", scores[i].name, scores[i].mi))
            .collect();
        tracing::info!("Selected {} features; top by MI: {}", selected.len(), top.join(", "));

        Ok(SelectionReport {
            scores,
            selected,
            threshold: self.threshold,
        })
    }
}

/// Histogram estimate of the mutual information between `x` and `y`, in
/// nats, with the Miller-Madow small-sample correction clamped at zero.
/// A constant input scores exactly zero.
pub fn mutual_information(x: &[f64], y: &[f64], bins: usize) -> f64 {
    let n = x.len().min(y.len());
    if n == 0 {
        return 0.0;
    }

    let xb = bin_indices(&x[..n], bins);
    let yb = bin_indices(&y[..n], bins);
    let mut joint = vec![0usize; bins * bins];
    let mut mx = vec![0usize; bins];
    let mut my = vec![0usize; bins];
    for i in 0..n {
        joint[xb[i] * bins + yb[i]] += 1;
        mx[xb[i]] += 1;
        my[yb[i]] += 1;
    }

    let nf = n as f64;
    let mut mi = 0.0;
    for bx in 0..bins {
        for by in 0..bins {
            let c = joint[bx * bins + by];
            if c == 0 {
                continue;
            }
            let p = c as f64 / nf;
            let px = mx[bx] as f64 / nf;
            let py = my[by] as f64 / nf;
            mi += p * (p / (px * py)).ln();
        }
    }

    // Miller-Madow: the raw histogram estimate is biased upward by roughly
    // (occupied cells - occupied margins + 1) / 2n.
    let kx = mx.iter().filter(|&&c| c > 0).count() as f64;
    let ky = my.iter().filter(|&&c| c > 0).count() as f64;
    let kxy = joint.iter().filter(|&&c| c > 0).count() as f64;
    (mi - (kxy - kx - ky + 1.0) / (2.0 * nf)).max(0.0)
}

fn bin_indices(values: &[f64], bins: usize) -> Vec<usize> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    values
        .iter()
        .map(|&v| {
            if span < 1e-12 {
                0
            } else {
                (((v - min) / span * bins as f64) as usize).min(bins - 1)
            }
        })
        .collect()
}

/// Variance inflation factor per feature: regress each column on all the
/// others and take 1/(1-R²). Capped at [`VIF_CAP`]; a failed auxiliary fit
/// also reports the cap, since it signals a degenerate design matrix.
fn vif_scores(frame: &FeatureFrame) -> Result<Vec<f64>> {
    let p = frame.feature_names.len();
    if p < 2 {
        return Ok(vec![1.0; p]);
    }

    let mut vifs = Vec::with_capacity(p);
    for j in 0..p {
        let others: Vec<Vec<f64>> = frame
            .rows
            .iter()
            .map(|r| {
                r.iter()
                    .enumerate()
                    .filter(|(i, _)| *i != j)
                    .map(|(_, v)| *v)
                    .collect()
            })
            .collect();
        let column: Vec<f64> = frame.rows.iter().map(|r| r[j]).collect();
        vifs.push(single_vif(&others, &column)?);
    }
    Ok(vifs)
}

fn single_vif(others: &[Vec<f64>], column: &[f64]) -> Result<f64> {
    let n = column.len() as f64;
    let mean = column.iter().sum::<f64>() / n;
    let ss_tot: f64 = column.iter().map(|v| (v - mean).powi(2)).sum();
    if ss_tot < 1e-12 {
        // Constant column: no variance to inflate.
        return Ok(1.0);
    }

    let x = to_matrix(others)?;
    let params =
        LinearRegressionParameters::default().with_solver(LinearRegressionSolverName::SVD);
    let fit = LinearRegression::fit(&x, &column.to_vec(), params)
        .and_then(|model| model.predict(&x));
    let predictions = match fit {
        Ok(p) => p,
        Err(_) => return Ok(VIF_CAP),
    };

    let ss_res: f64 = column
        .iter()
        .zip(&predictions)
        .map(|(v, p)| (v - p).powi(2))
        .sum();
    let r2 = (1.0 - ss_res / ss_tot).clamp(0.0, 1.0);
    Ok((1.0 / (1.0 - r2).max(1.0 / VIF_CAP)).min(VIF_CAP))
}
