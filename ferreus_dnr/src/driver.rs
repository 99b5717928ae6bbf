/////////////////////////////////////////////////////////////////////////////////////////////
//
// Orchestrates cross-validation, fitting, and prediction of a fusion run over tables.
//
// Created on: 17 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Table-level fusion of observations with a background model.
//!
//! [`fuse`] interpolates the observation column and the co-located background
//! column together, so each output row carries both `obs` and `mod`
//! interpolated to it. Additive (`abc`), multiplicative (`mbc`) and combined
//! (`bc`) corrections of the row's own background value are then appended.

use crate::{
    bias_correction::ambc,
    common::{create_evaluation_grid, pad_and_snap_extents},
    config::RegressorSettings,
    cross_validation::{cross_val_predict, KFold},
    error::{DnrError, Result},
    grouped::GroupedDelaunayNeighborsRegressor,
    progress::{emit, ProgressMsg, ProgressSink},
    regressor::{DelaunayNeighborsRegressor, NeighborsRegressor, TrainingData},
    table::Table,
    weights::{DelaunayWeights, DistanceWeights},
};
use faer::Mat;
use ferreus_dnr_utils::{get_pointarray_extents, select_mat_rows};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Column names and suffixes used by [`fuse`].
///
/// ### Default Values
/// - `obs_key`: `"obs"`
/// - `mod_key`: `"mod"`
/// - `x_keys`: `["x", "y"]`
/// - `weight_key`: `"sample_weight"` (used when the fit table has it)
/// - `group_key`: `"groups"` (used when the fit table has it)
/// - `yhat_suffix`: `"_dnr"`
/// - `cv_suffix`: `Some("_dnr_cv")`
/// - `loo_suffix`: `None`
/// - `kfold`: 10 shuffled folds, seed `42`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FuseOptions {
    pub obs_key: String,
    pub mod_key: String,
    pub x_keys: Vec<String>,
    pub weight_key: String,
    pub group_key: String,
    pub yhat_suffix: String,
    pub cv_suffix: Option<String>,
    pub loo_suffix: Option<String>,
    pub kfold: KFold,
}

impl Default for FuseOptions {
    fn default() -> Self {
        Self {
            obs_key: "obs".into(),
            mod_key: "mod".into(),
            x_keys: vec!["x".into(), "y".into()],
            weight_key: "sample_weight".into(),
            group_key: "groups".into(),
            yhat_suffix: "_dnr".into(),
            cv_suffix: Some("_dnr_cv".into()),
            loo_suffix: None,
            kfold: KFold::new(10),
        }
    }
}

impl FuseOptions {
    fn x_keys(&self) -> Vec<&str> {
        self.x_keys.iter().map(String::as_str).collect()
    }

    fn y_keys(&self) -> [&str; 2] {
        [self.obs_key.as_str(), self.mod_key.as_str()]
    }
}

/// Regressor chosen by [`default_regressor`].
#[derive(Debug, Clone)]
pub enum FuseRegressor {
    Single(DelaunayNeighborsRegressor),
    Grouped(GroupedDelaunayNeighborsRegressor),
}

impl NeighborsRegressor for FuseRegressor {
    fn fit_training(&mut self, data: &TrainingData) -> Result<()> {
        match self {
            FuseRegressor::Single(r) => r.fit_training(data),
            FuseRegressor::Grouped(r) => r.fit_training(data),
        }
    }

    fn predict(&self, query: &Mat<f64>) -> Result<Mat<f64>> {
        match self {
            FuseRegressor::Single(r) => r.predict(query),
            FuseRegressor::Grouped(r) => r.predict(query),
        }
    }

    fn nearest_distance(&self, query: &Mat<f64>) -> Result<Vec<f64>> {
        match self {
            FuseRegressor::Single(r) => r.nearest_distance(query),
            FuseRegressor::Grouped(r) => r.nearest_distance(query),
        }
    }
}

/// Settings of the regressor [`fuse`] uses when none is supplied: 30
/// neighbours, `max(d, 1e-10)^-2` distance weights, Delaunay neighbours only.
pub fn default_settings() -> RegressorSettings {
    RegressorSettings::builder()
        .n_neighbors(30)
        .weights(DistanceWeights::Power {
            exponent: -2.0,
            min_distance: 1e-10,
        })
        .delaunay_weights(DelaunayWeights::Only)
        .build()
}

/// Grouped regressor when `fit` has the group column, base regressor otherwise.
pub fn default_regressor(fit: &Table, options: &FuseOptions) -> FuseRegressor {
    if fit.contains(&options.group_key) {
        FuseRegressor::Grouped(GroupedDelaunayNeighborsRegressor::new(default_settings()))
    } else {
        FuseRegressor::Single(DelaunayNeighborsRegressor::new(default_settings()))
    }
}

/// Adds bias-correction columns for predictions carrying `suffix`.
///
/// With `o` the interpolated observation and `m` the interpolated background:
/// `bias = m - o`, `ratio = m / o`, `mbc = mod / ratio`, `abc = mod - bias`
/// and `bc` the [`ambc`] combination of the two.
pub fn biascorrect(table: &mut Table, suffix: &str, obs_key: &str, mod_key: &str) -> Result<()> {
    let background = table.column(mod_key)?;
    let mod_hat = table.column(&format!("{mod_key}{suffix}"))?;
    let obs_hat = table.column(&format!("{obs_key}{suffix}"))?;

    let bias: Vec<f64> = mod_hat.iter().zip(obs_hat).map(|(m, o)| m - o).collect();
    let ratio: Vec<f64> = mod_hat.iter().zip(obs_hat).map(|(m, o)| m / o).collect();
    let mbc: Vec<f64> = background.iter().zip(&ratio).map(|(b, r)| b / r).collect();
    let abc: Vec<f64> = background.iter().zip(&bias).map(|(b, d)| b - d).collect();
    let bc: Vec<f64> = abc.iter().zip(&mbc).map(|(a, m)| ambc(*a, *m)).collect();

    table.insert_column(&format!("bias{suffix}"), bias)?;
    table.insert_column(&format!("ratio{suffix}"), ratio)?;
    table.insert_column(&format!("mbc{suffix}"), mbc)?;
    table.insert_column(&format!("abc{suffix}"), abc)?;
    table.insert_column(&format!("bc{suffix}"), bc)?;
    Ok(())
}

// Rows of `fit` usable for training: coordinates, obs, mod (and weight) present.
fn valid_rows(fit: &Table, options: &FuseOptions) -> Result<Vec<usize>> {
    let mut keys = options.x_keys();
    keys.extend(options.y_keys());
    if fit.contains(&options.weight_key) {
        keys.push(&options.weight_key);
    }
    let columns = keys
        .iter()
        .map(|k| fit.column(k))
        .collect::<Result<Vec<_>>>()?;
    Ok((0..fit.nrows())
        .filter(|&i| columns.iter().all(|c| !c[i].is_nan()))
        .collect())
}

fn training_data(fit: &Table, rows: &[usize], options: &FuseOptions) -> Result<TrainingData> {
    let subset = fit.select_rows(rows);
    subset.training_data(
        &options.x_keys(),
        &options.y_keys(),
        Some(options.weight_key.as_str()).filter(|k| fit.contains(k)),
        Some(options.group_key.as_str()).filter(|k| fit.contains(k)),
    )
}

// Writes `values` (one entry per row of `rows`) into a full-length NaN column.
fn scatter(n: usize, rows: &[usize], values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut out = vec![f64::NAN; n];
    for (&row, v) in rows.iter().zip(values) {
        out[row] = v;
    }
    out
}

// Predicts `[obs, mod]` and the nearest observation distance at every row of
// `table` with complete coordinates, and stores them under `suffix`.
fn predict_into<R: NeighborsRegressor>(
    regressor: &R,
    table: &mut Table,
    suffix: &str,
    options: &FuseOptions,
) -> Result<()> {
    let x_keys = options.x_keys();
    let coords = table.to_mat(&x_keys)?;
    let rows: Vec<usize> = (0..table.nrows())
        .filter(|&i| (0..coords.ncols()).all(|j| !coords[(i, j)].is_nan()))
        .collect();
    let query = Mat::from_fn(rows.len(), coords.ncols(), |r, j| coords[(rows[r], j)]);

    let predicted = regressor.predict(&query)?;
    let distances = regressor.nearest_distance(&query)?;
    if predicted.ncols() != 2 {
        return Err(DnrError::invalid(format!(
            "expected obs and mod predictions, regressor returned {} columns",
            predicted.ncols()
        )));
    }

    let n = table.nrows();
    for (j, key) in options.y_keys().iter().enumerate() {
        let column = scatter(n, &rows, (0..rows.len()).map(|r| predicted[(r, j)]));
        table.insert_column(&format!("{key}{suffix}"), column)?;
    }
    table.insert_column(&format!("dist{suffix}"), scatter(n, &rows, distances.into_iter()))?;
    biascorrect(table, suffix, &options.obs_key, &options.mod_key)
}

/// Fuses observations in `fit` with the background model and applies the
/// result to `target`.
///
/// 1. With `cv_suffix`, out-of-fold predictions of `[obs, mod]` are added to
///    `fit` together with `fold`, `dist` and bias-correction columns.
/// 2. `regressor` is fitted on the complete rows of `fit` (using the weight
///    and group columns when present) and predicts back onto `fit` with
///    `yhat_suffix`.
/// 3. When given, `target` receives the same `yhat_suffix` columns.
///
/// Rows of `fit` with missing coordinates, `obs`, `mod` or weight are not
/// used for fitting and get NaN predictions.
pub fn fuse<R: NeighborsRegressor>(
    target: Option<&mut Table>,
    fit: &mut Table,
    regressor: &mut R,
    options: &FuseOptions,
    progress_callback: &Option<Arc<dyn ProgressSink>>,
) -> Result<()> {
    let rows = valid_rows(fit, options)?;
    let data = training_data(fit, &rows, options)?;
    emit(
        progress_callback,
        ProgressMsg::Message {
            message: format!(
                "fitting on {} of {} rows with x keys {:?}",
                rows.len(),
                fit.nrows(),
                options.x_keys
            ),
        },
    );

    if let Some(cv) = &options.cv_suffix {
        let result = cross_val_predict(regressor, &data, &options.kfold, progress_callback)?;
        let n = fit.nrows();
        for (j, key) in options.y_keys().iter().enumerate() {
            let column = scatter(n, &rows, (0..rows.len()).map(|r| result.predictions[(r, j)]));
            fit.insert_column(&format!("{key}{cv}"), column)?;
        }
        fit.insert_column(
            &format!("fold{cv}"),
            scatter(n, &rows, result.fold.iter().map(|&f| f as f64)),
        )?;
        fit.insert_column(
            &format!("dist{cv}"),
            scatter(n, &rows, result.nearest_distance.into_iter()),
        )?;
        biascorrect(fit, cv, &options.obs_key, &options.mod_key)?;
    }

    regressor.fit_training(&data)?;
    predict_into(regressor, fit, &options.yhat_suffix, options)?;

    if let Some(target) = target {
        predict_into(regressor, target, &options.yhat_suffix, options)?;
    }
    Ok(())
}

/// Adds leave-one-out columns with `loo_suffix` to `fit`, using a base
/// regressor already fitted on `fit` by [`fuse`].
///
/// `dist<loo>` is the distance to the nearest other observation.
pub fn fuse_leave_one_out(
    fit: &mut Table,
    regressor: &DelaunayNeighborsRegressor,
    options: &FuseOptions,
) -> Result<()> {
    let loo = options
        .loo_suffix
        .as_deref()
        .ok_or_else(|| DnrError::invalid("leave-one-out needs `loo_suffix`"))?;
    let rows = valid_rows(fit, options)?;
    if regressor.n_samples() != rows.len() {
        return Err(DnrError::invalid(format!(
            "regressor was fitted on {} rows but the table has {} complete rows",
            regressor.n_samples(),
            rows.len()
        )));
    }

    let predicted = regressor.leave_one_out()?;
    let distances = regressor.leave_one_out_distance()?;
    let n = fit.nrows();
    for (j, key) in options.y_keys().iter().enumerate() {
        let column = scatter(n, &rows, (0..rows.len()).map(|r| predicted[(r, j)]));
        fit.insert_column(&format!("{key}{loo}"), column)?;
    }
    fit.insert_column(&format!("dist{loo}"), scatter(n, &rows, distances.into_iter()))?;
    biascorrect(fit, loo, &options.obs_key, &options.mod_key)
}

/// Regular target grid covering the `x_keys` extents of `fit`.
///
/// Extents are snapped outwards to multiples of `resolution`, then padded by
/// one cell and `buffer` on each side. Only two coordinate columns are supported.
pub fn extent_grid(fit: &Table, x_keys: &[&str], resolution: f64, buffer: f64) -> Result<Table> {
    if x_keys.len() != 2 {
        return Err(DnrError::invalid(format!(
            "extent grids need 2 coordinate columns, got {}",
            x_keys.len()
        )));
    }
    if resolution.is_nan() || resolution <= 0.0 {
        return Err(DnrError::invalid("grid resolution must be positive"));
    }

    let points = fit.to_mat(x_keys)?;
    let rows: Vec<usize> = (0..points.nrows())
        .filter(|&i| (0..2).all(|j| points[(i, j)].is_finite()))
        .collect();
    if rows.is_empty() {
        return Err(DnrError::invalid("no finite coordinates to grid"));
    }

    let extents = pad_and_snap_extents(
        &get_pointarray_extents(&select_mat_rows(&points, &rows)),
        resolution,
        buffer,
    );
    let ranges = [(extents[0], extents[2]), (extents[1], extents[3])];
    let counts: Vec<usize> = ranges
        .iter()
        .map(|(lo, hi)| ((hi - lo) / resolution).round() as usize + 1)
        .collect();

    Table::from_mat(x_keys, &create_evaluation_grid(&ranges, &counts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{common::generate_random_points, test_functions::TestFunctions};

    fn tables(n_fit: usize, grouped: bool) -> (Table, Table) {
        let sites = generate_random_points(n_fit, 2, Some(31));
        let obs = TestFunctions::pollutant_field(&sites);
        let bg = TestFunctions::background_model(&sites, 0.8, 1.0);

        let mut fit = Table::from_mat(&["x", "y"], &sites).unwrap();
        let mut obs_col: Vec<f64> = obs.col(0).iter().copied().collect();
        obs_col[3] = f64::NAN;
        fit.insert_column("obs", obs_col).unwrap();
        fit.insert_column("mod", bg.col(0).iter().copied().collect()).unwrap();
        if grouped {
            fit.insert_text_column(
                "groups",
                (0..n_fit).map(|i| if i % 4 == 0 { "an" } else { "pa" }.to_string()).collect(),
            )
            .unwrap();
        }

        let grid = crate::common::create_evaluation_grid(&[(0.0, 1.0), (0.0, 1.0)], &[6, 6]);
        let mut target = Table::from_mat(&["x", "y"], &grid).unwrap();
        let grid_bg = TestFunctions::background_model(&grid, 0.8, 1.0);
        target
            .insert_column("mod", grid_bg.col(0).iter().copied().collect())
            .unwrap();
        (fit, target)
    }

    #[test]
    fn biascorrect_uses_the_combined_rule() {
        let mut table = Table::new();
        table.insert_column("mod", vec![10.0, 1.0]).unwrap();
        table.insert_column("obs_s", vec![8.0, 2.0]).unwrap();
        table.insert_column("mod_s", vec![4.0, 8.0]).unwrap();
        biascorrect(&mut table, "_s", "obs", "mod").unwrap();

        assert_eq!(table.column("abc_s").unwrap(), &[14.0, -5.0]);
        assert_eq!(table.column("mbc_s").unwrap(), &[20.0, 0.25]);
        assert_eq!(table.column("bc_s").unwrap(), &[17.0, 0.25]);
        assert_eq!(table.column("bias_s").unwrap(), &[-4.0, 6.0]);
    }

    #[test]
    fn fuse_adds_cross_validation_fit_and_target_columns() {
        let (mut fit, mut target) = tables(150, false);
        let options = FuseOptions::default();
        let mut regressor = default_regressor(&fit, &options);
        assert!(matches!(regressor, FuseRegressor::Single(_)));

        fuse(Some(&mut target), &mut fit, &mut regressor, &options, &None).unwrap();

        for key in ["obs_dnr_cv", "mod_dnr_cv", "fold_dnr_cv", "dist_dnr_cv", "bc_dnr_cv"] {
            assert!(fit.contains(key), "{key}");
        }
        assert!(fit.column("obs_dnr_cv").unwrap()[3].is_nan());
        assert!(fit.column("obs_dnr").unwrap()[3].is_nan());
        assert!(fit.column("fold_dnr_cv").unwrap()[0] < 10.0);

        let bc = target.column("bc_dnr").unwrap();
        assert_eq!(bc.len(), 36);
        assert!(bc.iter().all(|v| v.is_finite()));
        assert!(target.column("dist_dnr").unwrap().iter().all(|d| *d >= 0.0));
    }

    #[test]
    fn grouped_fit_tables_get_a_grouped_regressor() {
        let (mut fit, mut target) = tables(120, true);
        let options = FuseOptions {
            cv_suffix: None,
            ..FuseOptions::default()
        };
        let mut regressor = default_regressor(&fit, &options);
        assert!(matches!(regressor, FuseRegressor::Grouped(_)));

        fuse(Some(&mut target), &mut fit, &mut regressor, &options, &None).unwrap();
        assert!(!fit.contains("obs_dnr_cv"));
        assert!(target.column("obs_dnr").unwrap().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn leave_one_out_columns_match_the_base_regressor() {
        let (mut fit, _) = tables(80, false);
        let options = FuseOptions {
            cv_suffix: None,
            loo_suffix: Some("_dnr_loo".into()),
            ..FuseOptions::default()
        };
        let mut regressor = DelaunayNeighborsRegressor::new(default_settings());
        fuse(None, &mut fit, &mut regressor, &options, &None).unwrap();
        fuse_leave_one_out(&mut fit, &regressor, &options).unwrap();

        let loo = fit.column("obs_dnr_loo").unwrap();
        assert!(loo[3].is_nan());
        assert!(loo[0].is_finite());
        assert!(fit.column("dist_dnr_loo").unwrap()[0] > 0.0);

        let without = FuseOptions::default();
        assert!(matches!(
            fuse_leave_one_out(&mut fit, &regressor, &without),
            Err(DnrError::InvalidInput { .. })
        ));
    }

    #[test]
    fn extent_grid_covers_the_monitors() {
        let mut fit = Table::new();
        fit.insert_column("x", vec![0.3, 0.7, f64::NAN]).unwrap();
        fit.insert_column("y", vec![0.3, 0.7, 0.5]).unwrap();

        let grid = extent_grid(&fit, &["x", "y"], 0.5, 0.0).unwrap();
        assert_eq!(grid.nrows(), 25);
        assert_eq!(grid.column("x").unwrap()[0], -0.5);
        assert_eq!(grid.column("y").unwrap()[24], 1.5);
        assert!(extent_grid(&fit, &["x"], 0.5, 0.0).is_err());
        assert!(extent_grid(&fit, &["x", "y"], 0.0, 0.0).is_err());
    }

    #[test]
    fn missing_columns_are_reported() {
        let (mut fit, _) = tables(20, false);
        let options = FuseOptions {
            obs_key: "pm25".into(),
            ..FuseOptions::default()
        };
        let mut regressor = default_regressor(&fit, &options);
        assert!(matches!(
            fuse(None, &mut fit, &mut regressor, &options, &None),
            Err(DnrError::InvalidInput { .. })
        ));
    }
}
