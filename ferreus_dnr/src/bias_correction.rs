/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements the bias-correction layer that blends interpolated observations with a background model.
//
// Created on: 17 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Bias correction of a background model against interpolated observations.
//!
//! [`BCRegressor`] wraps any [`NeighborsRegressor`]. It is fitted on points
//! with three columns `x, y, background` and the observed value, interpolates
//! both the observations and the background at the observation sites to every
//! query, and corrects the query's background value:
//!
//! - additive: `abc = raw + obs_dnr - mod_dnr`
//! - multiplicative: `mbc = raw * obs_dnr / mod_dnr`
//! - combined: `ambc = (abc + mbc) / 2`, or `mbc` where `abc < 0`
//! - blended: `bbc`, an inverse cross-validated squared-error weighting of
//!   `obs_dnr`, `abc`, `mbc` and `ambc`.

use crate::{
    cross_validation::{cross_val_predict, KFold},
    error::{DnrError, Result},
    progress::ProgressSink,
    regressor::{NeighborsRegressor, TrainingData},
};
use faer::Mat;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc};

/// Output mode of a [`BCRegressor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BiasCorrection {
    /// Interpolated observations only.
    Obs,
    /// Additive correction.
    Abc,
    /// Multiplicative correction.
    Mbc,
    /// Mean of additive and multiplicative, multiplicative where additive is negative.
    Ambc,
    /// `obs_dnr`, `mod_abc`, `mod_mbc` and `mod_ambc` side by side.
    Individual,
    /// Error-weighted blend of the individual estimates.
    #[default]
    Best,
    /// Individual estimates, their blending weights, and the blend.
    Debug,
}

// Debug weight columns follow the `w_obs_dnr, w_mod_mbc, w_mod_abc, w_mod_ambc` naming.
const DEBUG_WEIGHT_ORDER: [usize; 4] = [0, 2, 1, 3];

impl BiasCorrection {
    /// Column names produced by `predict` in this mode.
    pub fn feature_names_out(&self) -> &'static [&'static str] {
        match self {
            BiasCorrection::Obs => &["obs_dnr"],
            BiasCorrection::Abc => &["mod_abc"],
            BiasCorrection::Mbc => &["mod_mbc"],
            BiasCorrection::Ambc => &["mod_ambc"],
            BiasCorrection::Individual => &["obs_dnr", "mod_abc", "mod_mbc", "mod_ambc"],
            BiasCorrection::Best => &["mod_bbc"],
            BiasCorrection::Debug => &[
                "obs_dnr",
                "mod_abc",
                "mod_mbc",
                "mod_ambc",
                "w_obs_dnr",
                "w_mod_mbc",
                "w_mod_abc",
                "w_mod_ambc",
                "mod_bbc",
            ],
        }
    }

    /// Whether this mode needs the cross-validated error surface.
    pub fn needs_error_surface(&self) -> bool {
        matches!(self, BiasCorrection::Best | BiasCorrection::Debug)
    }
}

impl fmt::Display for BiasCorrection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BiasCorrection::Obs => "obs",
            BiasCorrection::Abc => "abc",
            BiasCorrection::Mbc => "mbc",
            BiasCorrection::Ambc => "ambc",
            BiasCorrection::Individual => "individual",
            BiasCorrection::Best => "best",
            BiasCorrection::Debug => "debug",
        };
        write!(f, "{name}")
    }
}

impl FromStr for BiasCorrection {
    type Err = DnrError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "obs" => Ok(BiasCorrection::Obs),
            "abc" => Ok(BiasCorrection::Abc),
            "mbc" => Ok(BiasCorrection::Mbc),
            "ambc" => Ok(BiasCorrection::Ambc),
            "individual" => Ok(BiasCorrection::Individual),
            "best" => Ok(BiasCorrection::Best),
            "debug" => Ok(BiasCorrection::Debug),
            other => Err(DnrError::invalid(format!(
                "unknown bias correction `{other}`; expected one of obs, abc, mbc, ambc, individual, best, debug"
            ))),
        }
    }
}

/// Combined additive/multiplicative correction: the mean of the two, or
/// `mbc` where `abc` is negative.
pub fn ambc(abc: f64, mbc: f64) -> f64 {
    if abc < 0.0 {
        mbc
    } else {
        (abc + mbc) / 2.0
    }
}

#[derive(Debug, Clone)]
struct FittedBC<R> {
    // Predicts `[background, observation]` from `(x, y)`.
    model: R,
    // Predicts the squared error of each individual estimate from `(x, y)`.
    error_surface: Option<R>,
}

/// Bias-correcting wrapper around a neighbour regressor.
///
/// Points are `N x 3` (`x, y, background`) and values a single observation
/// column. The wrapped regressor is used as an unfitted template: fitting
/// clones it for the value model and, in `best` and `debug` modes, for the
/// error surface.
///
/// # Example
/// ```
/// use faer::Mat;
/// use ferreus_dnr::{
///     bias_correction::{BCRegressor, BiasCorrection},
///     config::RegressorSettings,
///     regressor::TrainingData,
///     DelaunayNeighborsRegressor,
/// };
///
/// let points = Mat::from_fn(4, 3, |i, j| match j {
///     0 => (i % 2) as f64,
///     1 => (i / 2) as f64,
///     _ => 10.0,
/// });
/// let obs = Mat::from_fn(4, 1, |_, _| 12.0);
/// let data = TrainingData::new(points, obs).unwrap();
///
/// let template = DelaunayNeighborsRegressor::new(RegressorSettings::default());
/// let mut bc = BCRegressor::new(template, BiasCorrection::Abc);
/// bc.fit(&data).unwrap();
///
/// let query = Mat::from_fn(1, 3, |_, j| [0.5, 0.5, 20.0][j]);
/// let corrected = bc.predict(&query).unwrap();
/// assert!((corrected[(0, 0)] - 22.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone)]
pub struct BCRegressor<R> {
    /// Unfitted template of the underlying regressor.
    pub template: R,

    /// Folds used to build the error surface.
    ///
    /// ### Default Values
    /// - `KFold { n_splits: 5, shuffle: true, seed: 42 }`
    pub kfold: KFold,

    how: BiasCorrection,
    fitted: Option<FittedBC<R>>,
    progress_callback: Option<Arc<dyn ProgressSink>>,
}

impl<R: NeighborsRegressor> BCRegressor<R> {
    pub fn new(template: R, how: BiasCorrection) -> Self {
        Self {
            template,
            kfold: KFold::default(),
            how,
            fitted: None,
            progress_callback: None,
        }
    }

    /// Attaches a sink that receives fold progress while the error surface is built.
    pub fn with_progress(mut self, progress_callback: Arc<dyn ProgressSink>) -> Self {
        self.progress_callback = Some(progress_callback);
        self
    }

    pub fn how(&self) -> BiasCorrection {
        self.how
    }

    /// Changes the output mode after fitting.
    ///
    /// Switching to `best` or `debug` needs an error surface, so it fails on
    /// a regressor that was fitted in another mode.
    pub fn set_how(&mut self, how: BiasCorrection) -> Result<()> {
        if let Some(fitted) = &self.fitted {
            if how.needs_error_surface() && fitted.error_surface.is_none() {
                return Err(DnrError::invalid(format!(
                    "`{how}` needs an error surface; refit in `best` or `debug` mode"
                )));
            }
        }
        self.how = how;
        Ok(())
    }

    /// Column names produced by [`BCRegressor::predict`].
    pub fn feature_names_out(&self) -> &'static [&'static str] {
        self.how.feature_names_out()
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    fn check_points(points: &Mat<f64>) -> Result<()> {
        if points.ncols() != 3 {
            return Err(DnrError::invalid(format!(
                "bias correction needs x, y and background columns, got {} columns",
                points.ncols()
            )));
        }
        Ok(())
    }

    fn with_values(data: &TrainingData, values: Mat<f64>) -> TrainingData {
        TrainingData {
            points: xy(&data.points),
            values,
            sample_weight: data.sample_weight.clone(),
            groups: data.groups.clone(),
        }
    }

    /// Fits the value model and, for `best` and `debug`, the error surface.
    pub fn fit(&mut self, data: &TrainingData) -> Result<()> {
        Self::check_points(&data.points)?;
        if data.values.ncols() != 1 {
            return Err(DnrError::invalid(format!(
                "bias correction needs a single observation column, got {}",
                data.values.ncols()
            )));
        }
        let n = data.nrows();

        let error_surface = if self.how.needs_error_surface() {
            let mut individual = self.clone();
            individual.how = BiasCorrection::Individual;
            individual.fitted = None;

            let cv = cross_val_predict(&individual, data, &self.kfold, &self.progress_callback)?;
            let serr = Mat::from_fn(n, cv.predictions.ncols(), |i, j| {
                (cv.predictions[(i, j)] - data.values[(i, 0)]).powi(2)
            });

            let mut surface = self.template.clone();
            surface.fit_training(&Self::with_values(data, serr))?;
            Some(surface)
        } else {
            None
        };

        let targets = Mat::from_fn(n, 2, |i, j| {
            if j == 0 {
                data.points[(i, 2)]
            } else {
                data.values[(i, 0)]
            }
        });
        let mut model = self.template.clone();
        model.fit_training(&Self::with_values(data, targets))?;

        self.fitted = Some(FittedBC {
            model,
            error_surface,
        });
        Ok(())
    }

    /// Corrected estimates for each query row, one column per
    /// [`BCRegressor::feature_names_out`] entry.
    pub fn predict(&self, query: &Mat<f64>) -> Result<Mat<f64>> {
        let fitted = self
            .fitted
            .as_ref()
            .ok_or(DnrError::NotFitted { operation: "predict" })?;
        Self::check_points(query)?;

        let sites = xy(query);
        let interpolated = fitted.model.predict(&sites)?;
        let n = query.nrows();

        // Individual estimates: obs_dnr, mod_abc, mod_mbc, mod_ambc.
        let individual = Mat::from_fn(n, 4, |i, j| {
            let raw = query[(i, 2)];
            let mod_dnr = interpolated[(i, 0)];
            let obs_dnr = interpolated[(i, 1)];
            let abc = raw + obs_dnr - mod_dnr;
            let mbc = raw * obs_dnr / mod_dnr;
            match j {
                0 => obs_dnr,
                1 => abc,
                2 => mbc,
                _ => ambc(abc, mbc),
            }
        });

        let column = |j: usize| Mat::from_fn(n, 1, |i, _| individual[(i, j)]);
        match self.how {
            BiasCorrection::Obs => Ok(column(0)),
            BiasCorrection::Abc => Ok(column(1)),
            BiasCorrection::Mbc => Ok(column(2)),
            BiasCorrection::Ambc => Ok(column(3)),
            BiasCorrection::Individual => Ok(individual),
            BiasCorrection::Best | BiasCorrection::Debug => {
                let surface = fitted.error_surface.as_ref().ok_or_else(|| {
                    DnrError::invalid(format!(
                        "`{}` needs an error surface; refit in this mode",
                        self.how
                    ))
                })?;
                let serr = surface.predict(&sites)?;
                let w = Mat::from_fn(n, 4, |i, j| 1.0 / serr[(i, j)]);
                let bbc: Vec<f64> = (0..n)
                    .map(|i| {
                        let num: f64 = (0..4).map(|j| individual[(i, j)] * w[(i, j)]).sum();
                        let denom: f64 = (0..4).map(|j| w[(i, j)]).sum();
                        num / denom
                    })
                    .collect();

                if self.how == BiasCorrection::Best {
                    return Ok(Mat::from_fn(n, 1, |i, _| bbc[i]));
                }
                Ok(Mat::from_fn(n, 9, |i, j| match j {
                    0..=3 => individual[(i, j)],
                    4..=7 => w[(i, DEBUG_WEIGHT_ORDER[j - 4])],
                    _ => bbc[i],
                }))
            }
        }
    }

    /// Distance from each query row to the closest observation site.
    pub fn nearest_distance(&self, query: &Mat<f64>) -> Result<Vec<f64>> {
        let fitted = self.fitted.as_ref().ok_or(DnrError::NotFitted {
            operation: "nearest_distance",
        })?;
        Self::check_points(query)?;
        fitted.model.nearest_distance(&xy(query))
    }
}

impl<R: NeighborsRegressor> NeighborsRegressor for BCRegressor<R> {
    fn fit_training(&mut self, data: &TrainingData) -> Result<()> {
        self.fit(data)
    }

    fn predict(&self, query: &Mat<f64>) -> Result<Mat<f64>> {
        BCRegressor::predict(self, query)
    }

    fn nearest_distance(&self, query: &Mat<f64>) -> Result<Vec<f64>> {
        BCRegressor::nearest_distance(self, query)
    }
}

fn xy(points: &Mat<f64>) -> Mat<f64> {
    Mat::from_fn(points.nrows(), 2, |i, j| points[(i, j)])
}
