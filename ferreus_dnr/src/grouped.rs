/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements grouped and fused Delaunay-neighbour regressors over labelled observation sources.
//
// Created on: 17 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Regressors that treat each observation group (for example each monitoring
//! network) as its own neighbourhood.
//!
//! - [`GroupedDelaunayNeighborsRegressor`] finds neighbours and Delaunay
//!   adjacency per group, then normalises the weights of all groups together.
//! - [`FusedDelaunayNeighborsRegressor`] predicts a separate surface per group
//!   and blends the surfaces with per-group [`FusionWeight`]s.

use crate::{
    config::RegressorSettings,
    error::{DnrError, Result},
    progress::ProgressSink,
    regressor::{DelaunayNeighborsRegressor, NeighborsRegressor, TrainingData},
    weights::DistanceWeights,
};
use faer::Mat;
use ferreus_dnr_utils::nan_min;
use std::{collections::HashMap, fmt, sync::Arc};

/// Group label used when the training data carries no groups.
pub const DEFAULT_GROUP: &str = "";

/// One base regressor per group, indexed by a dense group id.
///
/// Labels are sorted, so ids are stable for a given set of labels.
#[derive(Debug, Clone, Default)]
pub(crate) struct GroupArena {
    labels: Vec<String>,
    ids: HashMap<String, usize>,
    regressors: Vec<DelaunayNeighborsRegressor>,
}

impl GroupArena {
    fn fit(
        data: &TrainingData,
        settings: &RegressorSettings,
        progress_callback: &Option<Arc<dyn ProgressSink>>,
    ) -> Result<Self> {
        let groups: Vec<String> = match &data.groups {
            Some(groups) => {
                if groups.len() != data.nrows() {
                    return Err(DnrError::invalid(format!(
                        "{} group labels supplied for {} rows",
                        groups.len(),
                        data.nrows()
                    )));
                }
                groups.clone()
            }
            None => vec![DEFAULT_GROUP.to_string(); data.nrows()],
        };

        let mut labels = groups.clone();
        labels.sort_unstable();
        labels.dedup();

        let ids: HashMap<String, usize> = labels
            .iter()
            .enumerate()
            .map(|(id, label)| (label.clone(), id))
            .collect();

        let mut rows: Vec<Vec<usize>> = vec![Vec::new(); labels.len()];
        for (i, g) in groups.iter().enumerate() {
            rows[ids[g]].push(i);
        }

        let regressors = rows
            .iter()
            .map(|rows| {
                let subset = data.subset(rows);
                let mut dnr = DelaunayNeighborsRegressor::new(settings.clone());
                dnr.progress_callback = progress_callback.clone();
                dnr.fit(&subset.points, &subset.values, subset.sample_weight.as_deref())?;
                Ok(dnr)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            labels,
            ids,
            regressors,
        })
    }

    fn check_fitted(&self, operation: &'static str) -> Result<()> {
        if self.regressors.is_empty() {
            Err(DnrError::NotFitted { operation })
        } else {
            Ok(())
        }
    }

    fn nearest_distance(&self, query: &Mat<f64>) -> Result<Vec<f64>> {
        self.check_fitted("nearest_distance")?;
        let per_group = self
            .regressors
            .iter()
            .map(|dnr| dnr.nearest_distance(query))
            .collect::<Result<Vec<_>>>()?;
        Ok((0..query.nrows())
            .map(|i| nan_min(&per_group.iter().map(|d| d[i]).collect::<Vec<_>>()))
            .collect())
    }
}

/// Distance policy per group for [`GroupedDelaunayNeighborsRegressor`].
#[derive(Debug, Clone, Default)]
pub enum GroupWeights {
    /// Every group uses the regressor's configured weights.
    #[default]
    Shared,

    /// Each group uses its own policy; every fitted label needs an entry.
    PerGroup(HashMap<String, DistanceWeights>),
}

/// Delaunay-neighbour regressor with an independent neighbourhood per group
/// and a single joint normalisation of all neighbour weights.
///
/// With one group the predictions equal those of [`DelaunayNeighborsRegressor`].
#[derive(Debug, Clone)]
pub struct GroupedDelaunayNeighborsRegressor {
    pub settings: RegressorSettings,
    pub group_weights: GroupWeights,
    arena: GroupArena,
    progress_callback: Option<Arc<dyn ProgressSink>>,
}

impl GroupedDelaunayNeighborsRegressor {
    pub fn new(settings: RegressorSettings) -> Self {
        Self {
            settings,
            group_weights: GroupWeights::Shared,
            arena: GroupArena::default(),
            progress_callback: None,
        }
    }

    /// Sets the per-group distance policies.
    pub fn with_group_weights(mut self, group_weights: GroupWeights) -> Self {
        self.group_weights = group_weights;
        self
    }

    /// Attaches a sink that receives degenerate-neighbourhood reports.
    pub fn with_progress(mut self, progress_callback: Arc<dyn ProgressSink>) -> Self {
        self.progress_callback = Some(progress_callback);
        self
    }

    /// Sorted group labels seen at fit time.
    pub fn labels(&self) -> &[String] {
        &self.arena.labels
    }

    /// The fitted base regressor of `label`.
    pub fn regressor(&self, label: &str) -> Option<&DelaunayNeighborsRegressor> {
        self.arena.ids.get(label).map(|&id| &self.arena.regressors[id])
    }

    /// Fits one base regressor per group of `data`. Rows without groups form
    /// the single group [`DEFAULT_GROUP`].
    pub fn fit(&mut self, data: &TrainingData) -> Result<()> {
        let arena = GroupArena::fit(data, &self.settings, &self.progress_callback)?;
        if let GroupWeights::PerGroup(map) = &self.group_weights {
            if let Some(missing) = arena.labels.iter().find(|l| !map.contains_key(*l)) {
                return Err(DnrError::invalid(format!(
                    "no distance weights supplied for group `{missing}`"
                )));
            }
        }
        self.arena = arena;
        Ok(())
    }

    /// Weighted mean over the neighbours of every group, with one denominator
    /// for all groups. A zero weight sum gives NaN.
    pub fn predict(&self, query: &Mat<f64>) -> Result<Mat<f64>> {
        self.arena.check_fitted("predict")?;

        let mut per_group = Vec::with_capacity(self.arena.regressors.len());
        for (label, dnr) in self.arena.labels.iter().zip(&self.arena.regressors) {
            let policy = match &self.group_weights {
                GroupWeights::Shared => None,
                GroupWeights::PerGroup(map) => map.get(label),
            };
            let nw = dnr.neighbour_weights(query, policy)?;
            let weights = nw.weights.unwrap_or_else(|| {
                nw.neighbours
                    .indices
                    .iter()
                    .map(|row| vec![1.0; row.len()])
                    .collect()
            });
            per_group.push((dnr.fitted_values("predict")?, nw.neighbours.indices, weights));
        }

        let n_out = per_group.first().map_or(0, |(values, _, _)| values.ncols());
        let mut out = Mat::<f64>::zeros(query.nrows(), n_out);

        for i in 0..query.nrows() {
            let joint: Vec<f64> = per_group
                .iter()
                .flat_map(|(_, _, w)| w[i].iter().copied())
                .collect();
            let denom: f64 = joint.iter().sum();

            for j in 0..n_out {
                out[(i, j)] = if denom == 0.0 {
                    f64::NAN
                } else {
                    let num: f64 = per_group
                        .iter()
                        .flat_map(|(values, ids, w)| {
                            ids[i]
                                .iter()
                                .zip(&w[i])
                                .map(move |(&idx, &wi)| values[(idx, j)] * wi)
                        })
                        .sum();
                    num / denom
                };
            }
        }
        Ok(out)
    }

    /// Distance from each query row to the closest training point of any group.
    pub fn nearest_distance(&self, query: &Mat<f64>) -> Result<Vec<f64>> {
        self.arena.nearest_distance(query)
    }
}

impl NeighborsRegressor for GroupedDelaunayNeighborsRegressor {
    fn fit_training(&mut self, data: &TrainingData) -> Result<()> {
        self.fit(data)
    }

    fn predict(&self, query: &Mat<f64>) -> Result<Mat<f64>> {
        GroupedDelaunayNeighborsRegressor::predict(self, query)
    }

    fn nearest_distance(&self, query: &Mat<f64>) -> Result<Vec<f64>> {
        GroupedDelaunayNeighborsRegressor::nearest_distance(self, query)
    }
}

/// User supplied fusion weight: one weight per query row for a group's regressor.
pub type FusionWeightFn =
    Arc<dyn Fn(&DelaunayNeighborsRegressor, &Mat<f64>) -> Result<Vec<f64>> + Send + Sync>;

/// Weight of one group's surface when fusing.
#[derive(Clone)]
pub enum FusionWeight {
    /// One for every row.
    Uniform,

    /// `scale * max(d, min_distance) ^ exponent` where `d` is the distance
    /// to the group's closest observation.
    NearestDistance {
        exponent: f64,
        min_distance: f64,
        scale: f64,
    },

    /// Arbitrary function of the group's regressor and the query.
    Custom(FusionWeightFn),
}

impl fmt::Debug for FusionWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FusionWeight::Uniform => write!(f, "Uniform"),
            FusionWeight::NearestDistance {
                exponent,
                min_distance,
                scale,
            } => f
                .debug_struct("NearestDistance")
                .field("exponent", exponent)
                .field("min_distance", min_distance)
                .field("scale", scale)
                .finish(),
            FusionWeight::Custom(_) => write!(f, "Custom(<fn>)"),
        }
    }
}

impl FusionWeight {
    /// Weight of `dnr`'s predictions at each row of `query`.
    pub fn evaluate(&self, dnr: &DelaunayNeighborsRegressor, query: &Mat<f64>) -> Result<Vec<f64>> {
        match self {
            FusionWeight::Uniform => Ok(vec![1.0; query.nrows()]),
            FusionWeight::NearestDistance {
                exponent,
                min_distance,
                scale,
            } => Ok(dnr
                .nearest_distance(query)?
                .into_iter()
                .map(|d| scale * d.max(*min_distance).powf(*exponent))
                .collect()),
            FusionWeight::Custom(f) => f(dnr, query),
        }
    }
}

/// Separate Delaunay-neighbour surfaces per group, blended row by row as
/// `Σ f_g ŷ_g / Σ f_g`.
#[derive(Debug, Clone)]
pub struct FusedDelaunayNeighborsRegressor {
    pub settings: RegressorSettings,
    pub fusion_weights: HashMap<String, FusionWeight>,
    arena: GroupArena,
    progress_callback: Option<Arc<dyn ProgressSink>>,
}

impl FusedDelaunayNeighborsRegressor {
    pub fn new(settings: RegressorSettings, fusion_weights: HashMap<String, FusionWeight>) -> Self {
        Self {
            settings,
            fusion_weights,
            arena: GroupArena::default(),
            progress_callback: None,
        }
    }

    /// Attaches a sink that receives degenerate-neighbourhood reports.
    pub fn with_progress(mut self, progress_callback: Arc<dyn ProgressSink>) -> Self {
        self.progress_callback = Some(progress_callback);
        self
    }

    /// Sorted group labels seen at fit time.
    pub fn labels(&self) -> &[String] {
        &self.arena.labels
    }

    /// The fitted base regressor of `label`.
    pub fn regressor(&self, label: &str) -> Option<&DelaunayNeighborsRegressor> {
        self.arena.ids.get(label).map(|&id| &self.arena.regressors[id])
    }

    /// Fits one base regressor per group; every group needs a fusion weight.
    pub fn fit(&mut self, data: &TrainingData) -> Result<()> {
        let arena = GroupArena::fit(data, &self.settings, &self.progress_callback)?;
        if let Some(missing) = arena
            .labels
            .iter()
            .find(|l| !self.fusion_weights.contains_key(*l))
        {
            return Err(DnrError::invalid(format!(
                "no fusion weight supplied for group `{missing}`"
            )));
        }
        self.arena = arena;
        Ok(())
    }

    /// Blends the per-group predictions. A zero fusion-weight sum gives NaN.
    pub fn predict(&self, query: &Mat<f64>) -> Result<Mat<f64>> {
        self.arena.check_fitted("predict")?;
        let n = query.nrows();

        let mut surfaces = Vec::with_capacity(self.arena.regressors.len());
        for (label, dnr) in self.arena.labels.iter().zip(&self.arena.regressors) {
            let weight = self
                .fusion_weights
                .get(label)
                .ok_or_else(|| DnrError::invalid(format!("no fusion weight for group `{label}`")))?;
            let scales = weight.evaluate(dnr, query)?;
            if scales.len() != n {
                return Err(DnrError::invalid(format!(
                    "fusion weight of group `{label}` returned {} values for {n} rows",
                    scales.len()
                )));
            }
            surfaces.push((dnr.predict(query)?, scales));
        }

        let n_out = surfaces.first().map_or(0, |(pred, _)| pred.ncols());
        let mut out = Mat::<f64>::zeros(n, n_out);
        for i in 0..n {
            let denom: f64 = surfaces.iter().map(|(_, s)| s[i]).sum();
            for j in 0..n_out {
                out[(i, j)] = if denom == 0.0 {
                    f64::NAN
                } else {
                    surfaces.iter().map(|(p, s)| s[i] * p[(i, j)]).sum::<f64>() / denom
                };
            }
        }
        Ok(out)
    }

    /// Distance from each query row to the closest training point of any group.
    pub fn nearest_distance(&self, query: &Mat<f64>) -> Result<Vec<f64>> {
        self.arena.nearest_distance(query)
    }
}

impl NeighborsRegressor for FusedDelaunayNeighborsRegressor {
    fn fit_training(&mut self, data: &TrainingData) -> Result<()> {
        self.fit(data)
    }

    fn predict(&self, query: &Mat<f64>) -> Result<Mat<f64>> {
        FusedDelaunayNeighborsRegressor::predict(self, query)
    }

    fn nearest_distance(&self, query: &Mat<f64>) -> Result<Vec<f64>> {
        FusedDelaunayNeighborsRegressor::nearest_distance(self, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{common::generate_random_points, test_functions::TestFunctions, weights::DelaunayWeights};
    use faer::mat;

    fn settings() -> RegressorSettings {
        RegressorSettings::builder()
            .n_neighbors(8)
            .weights(DistanceWeights::Power {
                exponent: -2.0,
                min_distance: 1e-10,
            })
            .delaunay_weights(DelaunayWeights::Only)
            .build()
    }

    fn two_sources(n: usize) -> TrainingData {
        let points = generate_random_points(n, 2, Some(17));
        let values = TestFunctions::pollutant_field(&points);
        let groups = (0..n)
            .map(|i| if i % 3 == 0 { "airnow" } else { "purpleair" }.to_string())
            .collect();
        TrainingData::new(points, values)
            .unwrap()
            .with_groups(groups)
            .unwrap()
    }

    #[test]
    fn single_group_matches_base_regressor_exactly() {
        let n = 80;
        let points = generate_random_points(n, 2, Some(2));
        let values = TestFunctions::pollutant_field(&points);
        let weights: Vec<f64> = (0..n).map(|i| 1.0 + (i % 4) as f64).collect();
        let data = TrainingData::new(points.clone(), values.clone())
            .unwrap()
            .with_sample_weight(weights.clone())
            .unwrap();
        let queries = generate_random_points(25, 2, Some(3));

        for (weights_policy, delaunay) in [
            (DistanceWeights::Uniform, DelaunayWeights::None),
            (DistanceWeights::Uniform, DelaunayWeights::Only),
            (DistanceWeights::Distance, DelaunayWeights::Scale(3.0)),
        ] {
            let settings = RegressorSettings::builder()
                .n_neighbors(6)
                .weights(weights_policy)
                .delaunay_weights(delaunay)
                .build();

            let mut base = DelaunayNeighborsRegressor::new(settings.clone());
            base.fit(&points, &values, Some(&weights)).unwrap();
            let mut grouped = GroupedDelaunayNeighborsRegressor::new(settings);
            grouped.fit(&data).unwrap();

            let expected = base.predict(&queries).unwrap();
            let got = grouped.predict(&queries).unwrap();
            for i in 0..queries.nrows() {
                assert_eq!(got[(i, 0)].to_bits(), expected[(i, 0)].to_bits());
            }
        }

        // Unweighted uniform mean.
        let settings = RegressorSettings::builder()
            .n_neighbors(6)
            .delaunay_weights(DelaunayWeights::None)
            .build();
        let mut base = DelaunayNeighborsRegressor::new(settings.clone());
        base.fit(&points, &values, None).unwrap();
        let mut grouped = GroupedDelaunayNeighborsRegressor::new(settings);
        grouped
            .fit(&TrainingData::new(points, values).unwrap())
            .unwrap();
        assert_eq!(grouped.labels(), &[DEFAULT_GROUP.to_string()]);
        let expected = base.predict(&queries).unwrap();
        let got = grouped.predict(&queries).unwrap();
        for i in 0..queries.nrows() {
            assert_eq!(got[(i, 0)].to_bits(), expected[(i, 0)].to_bits());
        }
    }

    #[test]
    fn groups_are_sorted_and_normalised_jointly() {
        let points = mat![[0.0, 0.0], [1.0, 0.0], [0.0, 0.1], [1.0, 0.1f64]];
        let values = mat![[10.0], [20.0], [30.0], [50.0f64]];
        let data = TrainingData::new(points, values)
            .unwrap()
            .with_groups(vec!["b".into(), "b".into(), "a".into(), "a".into()])
            .unwrap();

        let settings = RegressorSettings::builder()
            .n_neighbors(2)
            .delaunay_weights(DelaunayWeights::None)
            .build();
        let mut grouped = GroupedDelaunayNeighborsRegressor::new(settings);
        grouped.fit(&data).unwrap();
        assert_eq!(grouped.labels(), &["a".to_string(), "b".to_string()]);

        // Uniform weights become ones, so all four values share one denominator.
        let predicted = grouped.predict(&mat![[0.5, 0.05f64]]).unwrap();
        assert!((predicted[(0, 0)] - 27.5).abs() < 1e-12);
    }

    #[test]
    fn per_group_weights_must_cover_every_group() {
        let data = two_sources(30);
        let mut map = HashMap::new();
        map.insert("airnow".to_string(), DistanceWeights::Distance);

        let mut grouped = GroupedDelaunayNeighborsRegressor::new(settings())
            .with_group_weights(GroupWeights::PerGroup(map.clone()));
        assert!(matches!(grouped.fit(&data), Err(DnrError::InvalidInput { .. })));

        map.insert("purpleair".to_string(), DistanceWeights::Uniform);
        let mut grouped = GroupedDelaunayNeighborsRegressor::new(settings())
            .with_group_weights(GroupWeights::PerGroup(map));
        grouped.fit(&data).unwrap();
        let predicted = grouped.predict(&generate_random_points(5, 2, Some(1))).unwrap();
        assert!(predicted.col(0).iter().all(|v| v.is_finite()));
    }

    #[test]
    fn fused_predictions_blend_group_surfaces() {
        let data = two_sources(60);
        let mut fusion = HashMap::new();
        fusion.insert("airnow".to_string(), FusionWeight::Uniform);
        fusion.insert(
            "purpleair".to_string(),
            FusionWeight::Custom(Arc::new(|_: &DelaunayNeighborsRegressor, q: &Mat<f64>| {
                Ok(vec![3.0; q.nrows()])
            })),
        );

        let mut fused = FusedDelaunayNeighborsRegressor::new(settings(), fusion);
        fused.fit(&data).unwrap();

        let queries = generate_random_points(10, 2, Some(8));
        let predicted = fused.predict(&queries).unwrap();
        let a = fused.regressor("airnow").unwrap().predict(&queries).unwrap();
        let b = fused.regressor("purpleair").unwrap().predict(&queries).unwrap();
        for i in 0..queries.nrows() {
            let expected = (a[(i, 0)] + 3.0 * b[(i, 0)]) / 4.0;
            assert!((predicted[(i, 0)] - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn fused_requires_weight_for_every_group_and_zero_sum_is_nan() {
        let data = two_sources(30);
        let mut fusion = HashMap::new();
        fusion.insert("airnow".to_string(), FusionWeight::Uniform);
        let mut fused = FusedDelaunayNeighborsRegressor::new(settings(), fusion.clone());
        assert!(matches!(fused.fit(&data), Err(DnrError::InvalidInput { .. })));

        let zero = FusionWeight::NearestDistance {
            exponent: -2.0,
            min_distance: 1e-6,
            scale: 0.0,
        };
        fusion.insert("airnow".to_string(), zero.clone());
        fusion.insert("purpleair".to_string(), zero);
        let mut fused = FusedDelaunayNeighborsRegressor::new(settings(), fusion);
        fused.fit(&data).unwrap();
        let predicted = fused.predict(&mat![[0.5, 0.5f64]]).unwrap();
        assert!(predicted[(0, 0)].is_nan());
    }

    #[test]
    fn nearest_distance_weight_favours_close_groups() {
        let points = mat![[0.0, 0.0], [0.1, 0.0], [0.0, 0.1], [5.0, 5.0], [5.1, 5.0], [5.0, 5.1f64]];
        let values = mat![[1.0], [1.0], [1.0], [9.0], [9.0], [9.0f64]];
        let data = TrainingData::new(points, values)
            .unwrap()
            .with_groups(["near", "near", "near", "far", "far", "far"].map(String::from).to_vec())
            .unwrap();

        let weight = FusionWeight::NearestDistance {
            exponent: -2.0,
            min_distance: 1e-10,
            scale: 1.0,
        };
        let fusion: HashMap<String, FusionWeight> = [("near", weight.clone()), ("far", weight)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        let mut fused = FusedDelaunayNeighborsRegressor::new(settings(), fusion);
        fused.fit(&data).unwrap();

        let predicted = fused.predict(&mat![[0.03, 0.03f64]]).unwrap();
        assert!(predicted[(0, 0)] < 1.01);
        assert_eq!(fused.nearest_distance(&mat![[5.0, 5.0f64]]).unwrap(), vec![0.0]);
    }

    #[test]
    fn unfitted_grouped_regressors_report_not_fitted() {
        let grouped = GroupedDelaunayNeighborsRegressor::new(settings());
        assert!(matches!(
            grouped.predict(&mat![[0.0, 0.0f64]]),
            Err(DnrError::NotFitted { .. })
        ));
        let fused = FusedDelaunayNeighborsRegressor::new(settings(), HashMap::new());
        assert!(matches!(
            fused.predict(&mat![[0.0, 0.0f64]]),
            Err(DnrError::NotFitted { .. })
        ));
    }
}
