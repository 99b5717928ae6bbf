/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements distance-weighted ensembling and least-squares ensemble fusion of fused fields.
//
// Created on: 17 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Merging several fused surfaces into one.
//!
//! - [`distweight`] weights each observation source by a power of its
//!   distance to the nearest observation, then blends the weighted sources
//!   with the background model through a logistic function of the closest
//!   source distance.
//! - [`WeightedEnsemble`] fits spatially varying member coefficients
//!   against a reference by least squares.

use crate::{
    config::DistWeightSettings,
    error::{DnrError, Result},
    progress::{emit, ProgressMsg, ProgressSink},
    table::Table,
};
use faer::Mat;
use ferreus_dnr_utils::{nan_min, ZERO_DISTANCE_WEIGHT};
use std::sync::Arc;

/// Distance-weighted blend of observation sources and a background model.
///
/// For each row and source `i` with distance `d_i` and value `v_i`:
///
/// - `w_i = d_i ^ power`, zero when `v_i` or `w_i` is NaN, `1e20` when
///   `d_i` is zero, then multiplied by any scale registered for `v_i`'s column
/// - `nwgt_i = w_i / Σ w` (zero when `Σ w = 0`)
/// - `bc = L / (1 + exp(k (min d - x0)))`, zero when `Σ w = 0`
/// - `y = bc Σ nwgt_i v_i + (1 - bc) * background`, NaN where the
///   background is NaN
///
/// Returns a table with `<value>_WGT` (`bc * nwgt_i`) for each value column,
/// `<mod_key>_WGT` (`1 - bc`) and `y_key`. With `settings.add` the same
/// columns are also added to `table`.
pub fn distweight(
    table: &mut Table,
    dist_keys: &[&str],
    val_keys: &[&str],
    mod_key: &str,
    y_key: &str,
    settings: &DistWeightSettings,
) -> Result<Table> {
    if dist_keys.len() != val_keys.len() {
        return Err(DnrError::invalid(format!(
            "{} distance columns supplied for {} value columns",
            dist_keys.len(),
            val_keys.len()
        )));
    }
    if let Some(bad) = settings.scales.keys().find(|k| !val_keys.contains(&k.as_str())) {
        return Err(DnrError::invalid(format!(
            "scale supplied for `{bad}`, which is not a value column"
        )));
    }

    let dists = dist_keys
        .iter()
        .map(|k| table.column(k))
        .collect::<Result<Vec<_>>>()?;
    let vals = val_keys
        .iter()
        .map(|k| table.column(k))
        .collect::<Result<Vec<_>>>()?;
    let background = table.column(mod_key)?;
    let scales: Vec<f64> = val_keys
        .iter()
        .map(|k| settings.scales.get(*k).copied().unwrap_or(1.0))
        .collect();

    let n = table.nrows();
    let m = val_keys.len();
    let mut val_wgt = vec![vec![0.0; n]; m];
    let mut mod_wgt = vec![0.0; n];
    let mut fused = vec![0.0; n];

    for r in 0..n {
        let w: Vec<f64> = (0..m)
            .map(|i| {
                let raw = dists[i][r].powf(settings.power);
                let w = if vals[i][r].is_nan() || raw.is_nan() {
                    0.0
                } else if raw == f64::INFINITY {
                    ZERO_DISTANCE_WEIGHT
                } else {
                    raw
                };
                w * scales[i]
            })
            .collect();
        let total: f64 = w.iter().sum();

        let min_distance = nan_min(&(0..m).map(|i| dists[i][r]).collect::<Vec<_>>());
        let bc = if total > 0.0 {
            let bc = settings.logistic.weight(min_distance);
            if bc.is_nan() {
                0.0
            } else {
                bc
            }
        } else {
            0.0
        };

        let mut y = (1.0 - bc) * background[r];
        for i in 0..m {
            let nwgt = if total > 0.0 { w[i] / total } else { 0.0 };
            val_wgt[i][r] = bc * nwgt;
            if !vals[i][r].is_nan() {
                y += bc * nwgt * vals[i][r];
            }
        }
        mod_wgt[r] = 1.0 - bc;
        fused[r] = if background[r].is_nan() { f64::NAN } else { y };
    }

    let mut out = Table::new();
    for (key, wgt) in val_keys.iter().zip(val_wgt) {
        out.insert_column(&format!("{key}_WGT"), wgt)?;
    }
    out.insert_column(&format!("{mod_key}_WGT"), mod_wgt)?;
    out.insert_column(y_key, fused)?;

    if settings.add {
        table.extend(out.clone())?;
    }
    Ok(out)
}

const DEFAULT_MAX_ITERATIONS: usize = 500;
const DEFAULT_TOLERANCE: f64 = 1e-10;

/// Additive ensemble `ŷ = Σ_e α_e ŷ_e` with spatially varying member
/// coefficients `α_e = a_e + Σ_c b_{e,c} c`.
///
/// The intercepts `a_e` and slopes `b_{e,c}` minimise the squared error
/// against a reference column. They are found by conjugate gradients on the
/// normal equations (CGLS), starting from zero.
///
/// ### Default Values
/// - `max_iterations`: `500`
/// - `tolerance`: `1e-10` (relative norm of the normal-equation residual)
#[derive(Debug, Clone)]
pub struct WeightedEnsemble {
    pub coord_keys: Vec<String>,
    pub member_keys: Vec<String>,
    pub y_key: String,
    pub max_iterations: usize,
    pub tolerance: f64,

    // Per member: one slope per coordinate, then the intercept.
    coefficients: Option<Vec<f64>>,
    converged: bool,
    iterations: usize,
    progress_callback: Option<Arc<dyn ProgressSink>>,
}

impl WeightedEnsemble {
    pub fn new(coord_keys: &[&str], member_keys: &[&str], y_key: &str) -> Self {
        Self {
            coord_keys: coord_keys.iter().map(|k| k.to_string()).collect(),
            member_keys: member_keys.iter().map(|k| k.to_string()).collect(),
            y_key: y_key.to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            coefficients: None,
            converged: false,
            iterations: 0,
            progress_callback: None,
        }
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Attaches a sink that receives solver iterations and convergence warnings.
    pub fn with_progress(mut self, progress_callback: Arc<dyn ProgressSink>) -> Self {
        self.progress_callback = Some(progress_callback);
        self
    }

    /// Fitted coefficients, `(n_coords + 1)` per member.
    pub fn coefficients(&self) -> Option<&[f64]> {
        self.coefficients.as_deref()
    }

    /// Whether the last fit reached `tolerance`.
    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    fn coords_plus_intercept(&self, table: &Table) -> Result<Mat<f64>> {
        let keys: Vec<&str> = self.coord_keys.iter().map(String::as_str).collect();
        let coords = table.to_mat(&keys)?;
        Ok(Mat::from_fn(coords.nrows(), coords.ncols() + 1, |i, j| {
            if j < coords.ncols() {
                coords[(i, j)]
            } else {
                1.0
            }
        }))
    }

    fn members(&self, table: &Table) -> Result<Mat<f64>> {
        let keys: Vec<&str> = self.member_keys.iter().map(String::as_str).collect();
        table.to_mat(&keys)
    }

    /// Fits the coefficients on the rows of `table` without NaN.
    ///
    /// Failing to reach `tolerance` within `max_iterations` emits a
    /// [`ProgressMsg::ConvergenceWarning`] and keeps the partial solution.
    pub fn fit(&mut self, table: &Table) -> Result<()> {
        let cpi = self.coords_plus_intercept(table)?;
        let models = self.members(table)?;
        let y_all = table.column(&self.y_key)?;

        let rows: Vec<usize> = (0..table.nrows())
            .filter(|&i| {
                !y_all[i].is_nan()
                    && (0..cpi.ncols()).all(|c| !cpi[(i, c)].is_nan())
                    && (0..models.ncols()).all(|e| !models[(i, e)].is_nan())
            })
            .collect();
        if rows.is_empty() {
            return Err(DnrError::invalid("no complete rows to fit the ensemble on"));
        }

        let ncp = cpi.ncols();
        let design = Mat::from_fn(rows.len(), ncp * models.ncols(), |r, col| {
            let i = rows[r];
            models[(i, col / ncp)] * cpi[(i, col % ncp)]
        });
        let y = Mat::from_fn(rows.len(), 1, |r, _| y_all[rows[r]]);

        let (x, converged, iterations, residual) = self.cgls(&design, &y);
        if !converged {
            emit(
                &self.progress_callback,
                ProgressMsg::ConvergenceWarning {
                    iterations,
                    residual,
                },
            );
        }

        self.coefficients = Some(x.col(0).iter().copied().collect());
        self.converged = converged;
        self.iterations = iterations;
        Ok(())
    }

    // Returns (solution, converged, iterations, relative residual).
    fn cgls(&self, a: &Mat<f64>, b: &Mat<f64>) -> (Mat<f64>, bool, usize, f64) {
        let p_len = a.ncols();
        let mut x = Mat::<f64>::zeros(p_len, 1);
        let mut r = b.clone();
        let mut s = a.transpose() * &r;
        let mut p = s.clone();

        let gamma0 = s.norm_l2().powi(2);
        if gamma0 == 0.0 {
            return (x, true, 0, 0.0);
        }
        let mut gamma = gamma0;
        let mut residual = 1.0;

        for iter in 1..=self.max_iterations {
            let q = a * &p;
            let qq = q.norm_l2().powi(2);
            if qq == 0.0 {
                return (x, residual < self.tolerance, iter - 1, residual);
            }
            let alpha = gamma / qq;
            for k in 0..p_len {
                x[(k, 0)] += alpha * p[(k, 0)];
            }
            for k in 0..r.nrows() {
                r[(k, 0)] -= alpha * q[(k, 0)];
            }

            s = a.transpose() * &r;
            let gamma_new = s.norm_l2().powi(2);
            residual = (gamma_new / gamma0).sqrt();

            emit(
                &self.progress_callback,
                ProgressMsg::SolverIteration { iter, residual },
            );
            if residual < self.tolerance {
                return (x, true, iter, residual);
            }

            let beta = gamma_new / gamma;
            for k in 0..p_len {
                p[(k, 0)] = s[(k, 0)] + beta * p[(k, 0)];
            }
            gamma = gamma_new;
        }
        (x, false, self.max_iterations, residual)
    }

    /// Member coefficients `α_e` for every row of `table`, one column per member.
    pub fn alphas(&self, table: &Table) -> Result<Mat<f64>> {
        let coefficients = self
            .coefficients
            .as_ref()
            .ok_or(DnrError::NotFitted { operation: "alphas" })?;
        let cpi = self.coords_plus_intercept(table)?;
        let ncp = cpi.ncols();

        Ok(Mat::from_fn(cpi.nrows(), self.member_keys.len(), |i, e| {
            (0..ncp).map(|c| coefficients[e * ncp + c] * cpi[(i, c)]).sum()
        }))
    }

    /// Fused estimate `Σ_e α_e ŷ_e` for every row of `table`.
    pub fn predict(&self, table: &Table) -> Result<Vec<f64>> {
        let alphas = self.alphas(table)?;
        let models = self.members(table)?;
        Ok((0..models.nrows())
            .map(|i| (0..models.ncols()).map(|e| alphas[(i, e)] * models[(i, e)]).sum())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{common::generate_random_points, progress::CollectingSink};

    fn sources() -> Table {
        let mut table = Table::new();
        table.insert_column("NAQFC", vec![10.0, 10.0, 10.0, f64::NAN]).unwrap();
        table.insert_column("AN", vec![20.0, 20.0, f64::NAN, 20.0]).unwrap();
        table.insert_column("PA", vec![30.0, 30.0, 30.0, 30.0]).unwrap();
        table.insert_column("AN_DIST", vec![5.0, 1e4, 5.0, 5.0]).unwrap();
        table.insert_column("PA_DIST", vec![10.0, 2e4, 0.0, 10.0]).unwrap();
        table
    }

    fn run(table: &mut Table, settings: &DistWeightSettings) -> Result<Table> {
        distweight(
            table,
            &["AN_DIST", "PA_DIST"],
            &["AN", "PA"],
            "NAQFC",
            "FUSED",
            settings,
        )
    }

    #[test]
    fn weights_follow_inverse_distance_and_logistic_blend() {
        let mut table = sources();
        let out = run(&mut table, &DistWeightSettings::default()).unwrap();

        let bc = 1.0 / (1.0 + (0.3f64 * (5.0 - 125.0)).exp());
        let (wa, wp) = (1.0 / 25.0, 1.0 / 100.0);
        let an = out.column("AN_WGT").unwrap()[0];
        let pa = out.column("PA_WGT").unwrap()[0];
        assert!((an - bc * wa / (wa + wp)).abs() < 1e-12);
        assert!((pa - bc * wp / (wa + wp)).abs() < 1e-12);
        assert!((out.column("NAQFC_WGT").unwrap()[0] - (1.0 - bc)).abs() < 1e-12);

        let expected = an * 20.0 + pa * 30.0 + (1.0 - bc) * 10.0;
        assert!((out.column("FUSED").unwrap()[0] - expected).abs() < 1e-9);
        assert!(table.contains("FUSED"));
    }

    #[test]
    fn far_sources_fall_back_to_the_background() {
        let mut table = sources();
        let out = run(&mut table, &DistWeightSettings::default()).unwrap();
        assert!((out.column("FUSED").unwrap()[1] - 10.0).abs() < 1e-9);
        assert!(out.column("NAQFC_WGT").unwrap()[1] > 1.0 - 1e-12);
    }

    #[test]
    fn missing_source_gets_zero_weight() {
        let mut table = sources();
        let out = run(&mut table, &DistWeightSettings::default()).unwrap();
        // Row 2: AN is missing and PA sits on a monitor.
        assert_eq!(out.column("AN_WGT").unwrap()[2], 0.0);
        let bc = 1.0 - out.column("NAQFC_WGT").unwrap()[2];
        assert!((out.column("PA_WGT").unwrap()[2] - bc).abs() < 1e-12);
        // Row 3: background missing.
        assert!(out.column("FUSED").unwrap()[3].is_nan());
    }

    #[test]
    fn scales_and_add_are_honoured() {
        let mut table = sources();
        let settings = DistWeightSettings::builder().scale("PA", 0.0).add(false).build();
        let out = run(&mut table, &settings).unwrap();
        assert_eq!(out.column("PA_WGT").unwrap()[0], 0.0);
        assert!(!table.contains("FUSED"));
    }

    #[test]
    fn bad_keys_are_rejected() {
        let mut table = sources();
        let settings = DistWeightSettings::default();
        assert!(matches!(
            distweight(&mut table, &["AN_DIST"], &["AN", "PA"], "NAQFC", "F", &settings),
            Err(DnrError::InvalidInput { .. })
        ));
        assert!(matches!(
            distweight(&mut table, &["XX"], &["AN"], "NAQFC", "F", &settings),
            Err(DnrError::InvalidInput { .. })
        ));
        let scaled = DistWeightSettings::builder().scale("GEOS", 2.0).build();
        assert!(matches!(
            run(&mut table, &scaled),
            Err(DnrError::InvalidInput { .. })
        ));
    }

    fn ensemble_table(n: usize) -> Table {
        let coords = generate_random_points(n, 2, Some(21));
        let members = generate_random_points(n, 2, Some(22));
        let mut table = Table::new();
        let x: Vec<f64> = coords.col(0).iter().copied().collect();
        let y: Vec<f64> = coords.col(1).iter().copied().collect();
        let m1: Vec<f64> = members.col(0).iter().map(|v| 10.0 + 20.0 * v).collect();
        let m2: Vec<f64> = members.col(1).iter().map(|v| 5.0 + 30.0 * v).collect();
        let truth: Vec<f64> = (0..n)
            .map(|i| (0.5 + 0.2 * x[i]) * m1[i] + (0.3 - 0.1 * y[i]) * m2[i])
            .collect();
        table.insert_column("x", x).unwrap();
        table.insert_column("y", y).unwrap();
        table.insert_column("m1", m1).unwrap();
        table.insert_column("m2", m2).unwrap();
        table.insert_column("obs", truth).unwrap();
        table
    }

    #[test]
    fn weighted_ensemble_recovers_exact_coefficients() {
        let table = ensemble_table(200);
        let mut ensemble = WeightedEnsemble::new(&["x", "y"], &["m1", "m2"], "obs");
        ensemble.fit(&table).unwrap();
        assert!(ensemble.converged());

        let c = ensemble.coefficients().unwrap();
        let expected = [0.2, 0.0, 0.5, 0.0, -0.1, 0.3];
        for (got, want) in c.iter().zip(expected) {
            assert!((got - want).abs() < 1e-4, "{got} vs {want}");
        }

        let predicted = ensemble.predict(&table).unwrap();
        let truth = table.column("obs").unwrap();
        for (p, t) in predicted.iter().zip(truth) {
            assert!((p - t).abs() < 1e-3);
        }
    }

    #[test]
    fn weighted_ensemble_warns_when_iterations_run_out() {
        let table = ensemble_table(50);
        let sink = CollectingSink::new();
        let mut ensemble = WeightedEnsemble::new(&["x", "y"], &["m1", "m2"], "obs")
            .max_iterations(1)
            .with_progress(sink.clone());
        ensemble.fit(&table).unwrap();

        assert!(!ensemble.converged());
        assert_eq!(ensemble.iterations(), 1);
        let messages = sink.messages();
        assert!(matches!(messages[0], ProgressMsg::SolverIteration { iter: 1, .. }));
        assert!(matches!(
            messages.last(),
            Some(ProgressMsg::ConvergenceWarning { iterations: 1, .. })
        ));
    }

    #[test]
    fn alphas_need_a_fit() {
        let ensemble = WeightedEnsemble::new(&["x"], &["m1"], "obs");
        assert!(matches!(
            ensemble.alphas(&ensemble_table(3)),
            Err(DnrError::NotFitted { .. })
        ));
    }
}
