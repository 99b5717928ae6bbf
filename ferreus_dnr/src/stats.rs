/////////////////////////////////////////////////////////////////////////////////////////////
//
// Computes descriptive and model performance statistics for estimates against observations.
//
// Created on: 17 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Model performance statistics.
//!
//! Bias and error statistics follow the usual air-quality model evaluation
//! definitions, with `yref` the reference (observations) and `yhat` the estimate:
//!
//! - `mb = mean(yhat - yref)`, `me = mean(|yhat - yref|)`
//! - `rmse = mean((yhat - yref)²)^½`
//! - `nmb = 100 mb / mean(yref)`, `nme = 100 me / mean(yref)`
//! - `fmb = 200 mb / (mean(yref) + mean(yhat))`, likewise `fme`
//! - `ioa = 1 - Σ(yhat - yref)² / Σ(|yhat - ō| + |yref - ō|)²` with `ō = mean(yref)`
//! - `rmse_pct = 100 rmse / mean(yref)`
//! - `lr_slope`, `lr_intercept`: least-squares line of `yhat` on `yref`, with
//!   `lr_pvalue` the two-sided t-test of a zero slope

use crate::{
    error::{DnrError, Result},
    table::Table,
};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Descriptive statistics of an estimate and its agreement with a reference.
///
/// Percent statistics (`nmb`, `nme`, `fmb`, `fme`, `rmse_pct`) are already multiplied by 100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerformanceStats {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub p05: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    pub max: f64,
    pub skew: f64,
    pub cov: f64,
    pub r: f64,
    pub mb: f64,
    pub me: f64,
    pub rmse: f64,
    pub nmb: f64,
    pub nme: f64,
    pub fmb: f64,
    pub fme: f64,
    pub ioa: f64,
    pub rmse_pct: f64,
    pub lr_slope: f64,
    pub lr_intercept: f64,
    pub lr_pvalue: f64,
}

impl PerformanceStats {
    /// Statistic names in the order of [`PerformanceStats::values`].
    pub const NAMES: [&'static str; 25] = [
        "count", "mean", "std", "min", "5%", "25%", "50%", "75%", "95%", "max", "skew", "cov",
        "r", "mb", "me", "rmse", "nmb", "nme", "fmb", "fme", "ioa", "rmse_pct", "lr_slope",
        "lr_intercept", "lr_pvalue",
    ];

    pub fn values(&self) -> [f64; 25] {
        [
            self.count as f64,
            self.mean,
            self.std,
            self.min,
            self.p05,
            self.p25,
            self.p50,
            self.p75,
            self.p95,
            self.max,
            self.skew,
            self.cov,
            self.r,
            self.mb,
            self.me,
            self.rmse,
            self.nmb,
            self.nme,
            self.fmb,
            self.fme,
            self.ioa,
            self.rmse_pct,
            self.lr_slope,
            self.lr_intercept,
            self.lr_pvalue,
        ]
    }
}

fn mean(v: &[f64]) -> f64 {
    v.iter().sum::<f64>() / v.len() as f64
}

// Linear interpolation between closest ranks; `sorted` must be ascending.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

// Two-sided p-value of a zero slope given the correlation of `n` pairs.
fn slope_pvalue(r: f64, n: usize) -> f64 {
    let df = n as f64 - 2.0;
    let Ok(dist) = StudentsT::new(0.0, 1.0, df) else {
        return f64::NAN;
    };
    if r.is_nan() {
        return f64::NAN;
    }
    let t = r * (df / ((1.0 - r) * (1.0 + r)).max(0.0)).sqrt();
    2.0 * dist.sf(t.abs())
}

/// Statistics of `estimate` against `reference` over rows where both are finite numbers.
///
/// With no complete rows every statistic except `count` is NaN.
pub fn performance_stats(estimate: &[f64], reference: &[f64]) -> Result<PerformanceStats> {
    if estimate.len() != reference.len() {
        return Err(DnrError::invalid(format!(
            "estimate has {} rows but reference has {}",
            estimate.len(),
            reference.len()
        )));
    }

    let (yhat, yref): (Vec<f64>, Vec<f64>) = estimate
        .iter()
        .zip(reference)
        .filter(|(e, r)| !e.is_nan() && !r.is_nan())
        .map(|(e, r)| (*e, *r))
        .unzip();
    let n = yhat.len();
    let nf = n as f64;

    let m = mean(&yhat);
    let om = mean(&yref);
    let std = (yhat.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (nf - 1.0)).sqrt();

    let mut sorted = yhat.clone();
    sorted.sort_by(f64::total_cmp);

    let bias: Vec<f64> = yhat.iter().zip(&yref).map(|(e, r)| e - r).collect();
    let mb = mean(&bias);
    let me = bias.iter().map(|b| b.abs()).sum::<f64>() / nf;
    let sse: f64 = bias.iter().map(|b| b * b).sum();

    let ioa_den: f64 = yhat
        .iter()
        .zip(&yref)
        .map(|(e, r)| ((e - om).abs() + (r - om).abs()).powi(2))
        .sum();

    let cov_xy: f64 = yhat.iter().zip(&yref).map(|(e, r)| (e - m) * (r - om)).sum();
    let ss_x: f64 = yhat.iter().map(|e| (e - m).powi(2)).sum();
    let ss_y: f64 = yref.iter().map(|r| (r - om).powi(2)).sum();

    let r = cov_xy / (ss_x * ss_y).sqrt();
    let rmse = (sse / nf).sqrt();
    let lr_slope = cov_xy / ss_y;

    let p50 = quantile(&sorted, 0.5);
    Ok(PerformanceStats {
        count: n,
        mean: m,
        std,
        min: sorted.first().copied().unwrap_or(f64::NAN),
        p05: quantile(&sorted, 0.05),
        p25: quantile(&sorted, 0.25),
        p50,
        p75: quantile(&sorted, 0.75),
        p95: quantile(&sorted, 0.95),
        max: sorted.last().copied().unwrap_or(f64::NAN),
        skew: p50 / m,
        cov: std / m,
        r,
        mb,
        me,
        rmse,
        nmb: mb / om * 100.0,
        nme: me / om * 100.0,
        fmb: mb / (om + m) * 200.0,
        fme: me / (om + m) * 200.0,
        ioa: 1.0 - sse / ioa_den,
        rmse_pct: rmse / om * 100.0,
        lr_slope,
        lr_intercept: m - lr_slope * om,
        lr_pvalue: slope_pvalue(r, n),
    })
}

/// Statistics of every numeric column of `table` against `ref_key`.
///
/// One row per column (the reference included) with a `key` text column
/// followed by the [`PerformanceStats::NAMES`] columns.
pub fn performance_table(table: &Table, ref_key: &str) -> Result<Table> {
    let reference = table.column(ref_key)?;
    let keys: Vec<&str> = table
        .column_names()
        .into_iter()
        .filter(|k| table.column(k).is_ok())
        .collect();

    let stats = keys
        .iter()
        .map(|k| performance_stats(table.column(k)?, reference))
        .collect::<Result<Vec<_>>>()?;

    let mut out = Table::new();
    out.insert_text_column("key", keys.iter().map(|k| k.to_string()).collect())?;
    for (j, name) in PerformanceStats::NAMES.iter().enumerate() {
        out.insert_column(name, stats.iter().map(|s| s.values()[j]).collect())?;
    }
    Ok(out)
}
