/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements the Delaunay-neighbour regressor and the training data it is fitted on.
//
// Created on: 17 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Delaunay-neighbour regression.
//!
//! [`DelaunayNeighborsRegressor`] is a k-nearest-neighbour regressor whose
//! neighbour weights can depend on whether each neighbour is a Delaunay
//! neighbour of the query point, and on per-sample weights supplied at fit time.

use crate::{
    config::RegressorSettings,
    delaunay::delaunay_masks,
    error::{DnrError, Result},
    kdtree::{DistanceMetric, KDTree, Neighbours},
    progress::ProgressSink,
    weights::{apply_sample_weights, DistanceWeights},
};
use faer::Mat;
use ferreus_dnr_utils::{select_mat_rows, select_rows};
use std::sync::Arc;

/// Observations used to fit a regressor.
///
/// `points` holds one row of coordinates per observation and `values` one
/// row of targets. Optional per-row sample weights and group labels travel
/// with the rows when the data is subset.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingData {
    pub points: Mat<f64>,
    pub values: Mat<f64>,
    pub sample_weight: Option<Vec<f64>>,
    pub groups: Option<Vec<String>>,
}

impl TrainingData {
    /// Pairs coordinates with target values; both must have the same number of rows.
    pub fn new(points: Mat<f64>, values: Mat<f64>) -> Result<Self> {
        if points.nrows() != values.nrows() {
            return Err(DnrError::invalid(format!(
                "points have {} rows but values have {}",
                points.nrows(),
                values.nrows()
            )));
        }
        Ok(Self {
            points,
            values,
            sample_weight: None,
            groups: None,
        })
    }

    /// Attaches non-negative per-row sample weights.
    pub fn with_sample_weight(mut self, sample_weight: Vec<f64>) -> Result<Self> {
        validate_sample_weight(&sample_weight, self.nrows())?;
        self.sample_weight = Some(sample_weight);
        Ok(self)
    }

    /// Attaches a group label to every row.
    pub fn with_groups(mut self, groups: Vec<String>) -> Result<Self> {
        if groups.len() != self.nrows() {
            return Err(DnrError::invalid(format!(
                "{} group labels supplied for {} rows",
                groups.len(),
                self.nrows()
            )));
        }
        self.groups = Some(groups);
        Ok(self)
    }

    /// Number of observations.
    pub fn nrows(&self) -> usize {
        self.points.nrows()
    }

    /// Returns the rows at `rows`, in the order given.
    pub fn subset(&self, rows: &[usize]) -> Self {
        Self {
            points: select_mat_rows(&self.points, rows),
            values: select_mat_rows(&self.values, rows),
            sample_weight: self.sample_weight.as_ref().map(|w| select_rows(w, rows)),
            groups: self.groups.as_ref().map(|g| select_rows(g, rows)),
        }
    }

    /// Drops every row with a missing (NaN) coordinate or value.
    pub fn retain_valid(self) -> Self {
        let keep: Vec<usize> = (0..self.nrows())
            .filter(|&i| {
                (0..self.points.ncols()).all(|j| !self.points[(i, j)].is_nan())
                    && (0..self.values.ncols()).all(|j| !self.values[(i, j)].is_nan())
            })
            .collect();
        if keep.len() == self.nrows() {
            self
        } else {
            self.subset(&keep)
        }
    }
}

fn validate_sample_weight(sample_weight: &[f64], nrows: usize) -> Result<()> {
    if sample_weight.len() != nrows {
        return Err(DnrError::invalid(format!(
            "{} sample weights supplied for {} rows",
            sample_weight.len(),
            nrows
        )));
    }
    if let Some(bad) = sample_weight.iter().find(|w| !(**w >= 0.0)) {
        return Err(DnrError::invalid(format!(
            "sample weights must be non-negative, found {bad}"
        )));
    }
    Ok(())
}

/// Common interface of the neighbour regressors, used by cross-validation and
/// the bias-correction layer.
pub trait NeighborsRegressor: Clone + Send + Sync {
    /// Fits the regressor, replacing any previous fit.
    fn fit_training(&mut self, data: &TrainingData) -> Result<()>;

    /// Predicts one row of outputs per query row.
    fn predict(&self, query: &Mat<f64>) -> Result<Mat<f64>>;

    /// Distance from each query row to the closest training point.
    fn nearest_distance(&self, query: &Mat<f64>) -> Result<Vec<f64>>;
}

/// Neighbours of a batch of queries along with their final weights.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighbourWeights {
    pub neighbours: Neighbours,

    /// Delaunay indicator per neighbour, when adjacency was computed.
    pub mask: Option<Vec<Vec<bool>>>,

    /// Weight per neighbour, or `None` when every neighbour counts equally.
    pub weights: Option<Vec<Vec<f64>>>,
}

#[derive(Debug, Clone)]
struct FittedState {
    points: Mat<f64>,
    values: Mat<f64>,
    sample_weight: Option<Vec<f64>>,
    tree: KDTree,
}

/// K-nearest-neighbour regressor with Delaunay-aware neighbour weights.
///
/// # Examples
///
/// ```
/// use faer::mat;
/// use ferreus_dnr::{config::RegressorSettings, weights::DelaunayWeights, DelaunayNeighborsRegressor};
///
/// let points = mat![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0f64]];
/// let values = mat![[1.0], [2.0], [3.0], [4.0f64]];
///
/// let settings = RegressorSettings::builder()
///     .n_neighbors(4)
///     .delaunay_weights(DelaunayWeights::Equal)
///     .build();
/// let mut dnr = DelaunayNeighborsRegressor::new(settings);
/// dnr.fit(&points, &values, None).unwrap();
///
/// let predicted = dnr.predict(&mat![[0.5, 0.5f64]]).unwrap();
/// assert!((predicted[(0, 0)] - 2.5).abs() < 1e-12);
/// ```
#[derive(Debug, Clone)]
pub struct DelaunayNeighborsRegressor {
    /// Neighbour count, weighting policies and metric.
    pub settings: RegressorSettings,

    fitted: Option<FittedState>,

    /// Optional callback for reporting degenerate neighbourhoods.
    pub(crate) progress_callback: Option<Arc<dyn ProgressSink>>,
}

impl DelaunayNeighborsRegressor {
    pub fn new(settings: RegressorSettings) -> Self {
        Self {
            settings,
            fitted: None,
            progress_callback: None,
        }
    }

    /// Attaches a sink that receives degenerate-neighbourhood reports.
    pub fn with_progress(mut self, progress_callback: Arc<dyn ProgressSink>) -> Self {
        self.progress_callback = Some(progress_callback);
        self
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Number of training points, zero before `fit`.
    pub fn n_samples(&self) -> usize {
        self.fitted.as_ref().map_or(0, |s| s.points.nrows())
    }

    /// Number of output columns, zero before `fit`.
    pub fn n_outputs(&self) -> usize {
        self.fitted.as_ref().map_or(0, |s| s.values.ncols())
    }

    fn state(&self, operation: &'static str) -> Result<&FittedState> {
        self.fitted
            .as_ref()
            .ok_or(DnrError::NotFitted { operation })
    }

    pub(crate) fn fitted_values(&self, operation: &'static str) -> Result<&Mat<f64>> {
        Ok(&self.state(operation)?.values)
    }

    /// Fits the regressor on `points` (one row per observation) and `values`.
    ///
    /// Any previous fit is replaced. Delaunay weighting requires two
    /// coordinate columns.
    pub fn fit(
        &mut self,
        points: &Mat<f64>,
        values: &Mat<f64>,
        sample_weight: Option<&[f64]>,
    ) -> Result<()> {
        if points.nrows() != values.nrows() {
            return Err(DnrError::invalid(format!(
                "points have {} rows but values have {}",
                points.nrows(),
                values.nrows()
            )));
        }
        if points.nrows() == 0 {
            return Err(DnrError::invalid("cannot fit on an empty training set"));
        }
        if points.ncols() == 0 || values.ncols() == 0 {
            return Err(DnrError::invalid(
                "points and values need at least one column each",
            ));
        }
        if self.settings.delaunay_weights.needs_adjacency() && points.ncols() != 2 {
            return Err(DnrError::invalid(format!(
                "Delaunay weighting needs 2-D coordinates, got {} columns",
                points.ncols()
            )));
        }
        if self.settings.n_neighbors == 0 {
            return Err(DnrError::invalid("n_neighbors must be at least 1"));
        }
        if let DistanceMetric::Minkowski { p } = self.settings.metric {
            if !(p >= 1.0) {
                return Err(DnrError::invalid(format!(
                    "Minkowski order must be at least 1, got {p}"
                )));
            }
        }
        if let Some(sw) = sample_weight {
            validate_sample_weight(sw, points.nrows())?;
        }

        self.fitted = Some(FittedState {
            points: points.clone(),
            values: values.clone(),
            sample_weight: sample_weight.map(|w| w.to_vec()),
            tree: KDTree::new(points),
        });
        Ok(())
    }

    fn check_query(&self, state: &FittedState, query: &Mat<f64>) -> Result<()> {
        if query.ncols() != state.points.ncols() {
            return Err(DnrError::invalid(format!(
                "query has {} columns but the regressor was fitted on {}",
                query.ncols(),
                state.points.ncols()
            )));
        }
        Ok(())
    }

    /// Returns the `k` nearest training points of each query row, closest first.
    ///
    /// `k` defaults to `n_neighbors` and is clamped to the number of training points.
    pub fn kneighbors(&self, query: &Mat<f64>, k: Option<usize>) -> Result<Neighbours> {
        let state = self.state("kneighbors")?;
        self.check_query(state, query)?;
        let k = k.unwrap_or(self.settings.n_neighbors);
        Ok(state
            .tree
            .k_nearest_neighbors_batch(query, k, self.settings.metric))
    }

    /// Computes the neighbours of each query row and their final weights.
    ///
    /// `weights_override` replaces the configured distance policy, which is
    /// how grouped regressors apply per-group policies.
    pub fn neighbour_weights(
        &self,
        query: &Mat<f64>,
        weights_override: Option<&DistanceWeights>,
    ) -> Result<NeighbourWeights> {
        let neighbours = self.kneighbors(query, None)?;
        self.weights_for(query, neighbours, weights_override)
    }

    fn weights_for(
        &self,
        query: &Mat<f64>,
        neighbours: Neighbours,
        weights_override: Option<&DistanceWeights>,
    ) -> Result<NeighbourWeights> {
        let state = self.state("neighbour_weights")?;
        let policy = weights_override.unwrap_or(&self.settings.weights);
        let delaunay = &self.settings.delaunay_weights;

        let mask = if delaunay.needs_adjacency() {
            let queries: Vec<[f64; 2]> = (0..query.nrows())
                .map(|i| [query[(i, 0)], query[(i, 1)]])
                .collect();
            let neighbour_sets: Vec<Vec<[f64; 2]>> = neighbours
                .indices
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|&idx| [state.points[(idx, 0)], state.points[(idx, 1)]])
                        .collect()
                })
                .collect();
            Some(delaunay_masks(
                &queries,
                &neighbour_sets,
                self.settings.n_jobs,
                &self.progress_callback,
            ))
        } else {
            None
        };

        let rows = (0..neighbours.len())
            .map(|i| {
                let base = policy.row_weights(&neighbours.distances[i])?;
                let composed = match &mask {
                    Some(mask) => delaunay.compose(&mask[i], base)?,
                    None => base,
                };
                Ok(apply_sample_weights(
                    composed,
                    &neighbours.indices[i],
                    state.sample_weight.as_deref(),
                ))
            })
            .collect::<Result<Vec<Option<Vec<f64>>>>>()?;
        let weights = rows.into_iter().collect::<Option<Vec<Vec<f64>>>>();

        Ok(NeighbourWeights {
            neighbours,
            mask,
            weights,
        })
    }

    /// Weighted mean of the neighbours' values for every query row.
    ///
    /// A row whose weights sum to zero is NaN.
    pub fn predict(&self, query: &Mat<f64>) -> Result<Mat<f64>> {
        let state = self.state("predict")?;
        let nw = self.neighbour_weights(query, None)?;
        Ok(weighted_mean(&state.values, &nw))
    }

    /// Predicts each training point from the other training points only.
    pub fn leave_one_out(&self) -> Result<Mat<f64>> {
        let state = self.state("leave_one_out")?;
        let neighbours = self.others(state, self.settings.n_neighbors)?;
        let nw = self.weights_for(&state.points, neighbours, None)?;
        Ok(weighted_mean(&state.values, &nw))
    }

    /// Distance from each training point to the nearest other training point.
    ///
    /// NaN when the regressor was fitted on a single point.
    pub fn leave_one_out_distance(&self) -> Result<Vec<f64>> {
        let state = self.state("leave_one_out_distance")?;
        let neighbours = self.others(state, 1)?;
        Ok(neighbours
            .distances
            .iter()
            .map(|row| row.first().copied().unwrap_or(f64::NAN))
            .collect())
    }

    // Up to `k` neighbours of every training point, excluding the point itself.
    fn others(&self, state: &FittedState, k: usize) -> Result<Neighbours> {
        let mut neighbours = self.kneighbors(&state.points, Some(k + 1))?;
        let n = state.points.nrows();
        let keep = k.min(n.saturating_sub(1));

        for (i, (ids, dists)) in neighbours
            .indices
            .iter_mut()
            .zip(neighbours.distances.iter_mut())
            .enumerate()
        {
            match ids.iter().position(|&id| id == i) {
                Some(pos) => {
                    ids.remove(pos);
                    dists.remove(pos);
                }
                None => {
                    ids.pop();
                    dists.pop();
                }
            }
            ids.truncate(keep);
            dists.truncate(keep);
        }
        Ok(neighbours)
    }

    /// Distance from each query row to the closest training point.
    pub fn nearest_distance(&self, query: &Mat<f64>) -> Result<Vec<f64>> {
        let neighbours = self.kneighbors(query, Some(1))?;
        Ok(neighbours
            .distances
            .iter()
            .map(|row| row.first().copied().unwrap_or(f64::NAN))
            .collect())
    }
}

impl NeighborsRegressor for DelaunayNeighborsRegressor {
    fn fit_training(&mut self, data: &TrainingData) -> Result<()> {
        self.fit(&data.points, &data.values, data.sample_weight.as_deref())
    }

    fn predict(&self, query: &Mat<f64>) -> Result<Mat<f64>> {
        DelaunayNeighborsRegressor::predict(self, query)
    }

    fn nearest_distance(&self, query: &Mat<f64>) -> Result<Vec<f64>> {
        DelaunayNeighborsRegressor::nearest_distance(self, query)
    }
}

/// Weighted (or plain) mean of `values` over each row of neighbours.
pub(crate) fn weighted_mean(values: &Mat<f64>, nw: &NeighbourWeights) -> Mat<f64> {
    let n_rows = nw.neighbours.len();
    let n_out = values.ncols();
    let mut out = Mat::<f64>::zeros(n_rows, n_out);

    for i in 0..n_rows {
        let ids = &nw.neighbours.indices[i];
        match &nw.weights {
            None => {
                let count = ids.len() as f64;
                for j in 0..n_out {
                    let sum: f64 = ids.iter().map(|&idx| values[(idx, j)]).sum();
                    out[(i, j)] = sum / count;
                }
            }
            Some(weights) => {
                let w = &weights[i];
                let denom: f64 = w.iter().sum();
                for j in 0..n_out {
                    out[(i, j)] = if denom == 0.0 {
                        f64::NAN
                    } else {
                        let num: f64 = ids
                            .iter()
                            .zip(w)
                            .map(|(&idx, &wi)| values[(idx, j)] * wi)
                            .sum();
                        num / denom
                    };
                }
            }
        }
    }
    out
}
