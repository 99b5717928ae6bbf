/////////////////////////////////////////////////////////////////////////////////////////////
//
// Declares configuration types for neighbour regressors, ensemble weighting, and fusion runs.
//
// Created on: 17 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Declares configuration types for neighbour regressors, ensemble weighting, and fusion runs.
use crate::{
    bias_correction::BiasCorrection,
    cross_validation::KFold,
    driver::FuseOptions,
    error::ConfigIOError,
    kdtree::DistanceMetric,
    weights::{DelaunayWeights, DistanceWeights},
};
use ferreus_dnr_utils::{
    DEFAULT_DISTANCE_POWER, DEFAULT_LOGISTIC_K, DEFAULT_LOGISTIC_L, DEFAULT_LOGISTIC_X0,
    DEFAULT_N_NEIGHBORS,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

/// Settings shared by every Delaunay-neighbour regressor.
///
/// ### Default Values
/// - `n_neighbors`: `5`
/// - `weights`: [`DistanceWeights::Uniform`]
/// - `delaunay_weights`: [`DelaunayWeights::Only`]
/// - `metric`: [`DistanceMetric::Euclidean`]
/// - `n_jobs`: `None` (sequential)
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct RegressorSettings {
    /// Number of nearest training points considered for each query.
    /// Clamped to the number of training points at query time.
    pub n_neighbors: usize,

    /// Base weight of each neighbour from its distance.
    pub weights: DistanceWeights,

    /// How Delaunay adjacency modifies the base weights.
    pub delaunay_weights: DelaunayWeights,

    /// Distance used to rank neighbours.
    pub metric: DistanceMetric,

    /// Number of parallel slices used for the adjacency tests.
    pub n_jobs: Option<usize>,
}

impl Default for RegressorSettings {
    fn default() -> Self {
        RegressorSettings::builder().build()
    }
}

impl RegressorSettings {
    /// Returns a new [`RegressorSettingsBuilder`] populated with defaults.
    pub fn builder() -> RegressorSettingsBuilder {
        RegressorSettingsBuilder::new()
    }
}

/// A convenience builder for constructing [`RegressorSettings`].
///
/// The builder should be called via the [`RegressorSettings::builder`] method.
///
/// See [`RegressorSettings`] for details on each field.
#[derive(Debug, Clone)]
pub struct RegressorSettingsBuilder {
    pub n_neighbors: usize,
    pub weights: DistanceWeights,
    pub delaunay_weights: DelaunayWeights,
    pub metric: DistanceMetric,
    pub n_jobs: Option<usize>,
}

impl RegressorSettingsBuilder {
    fn new() -> Self {
        Self {
            n_neighbors: DEFAULT_N_NEIGHBORS,
            weights: DistanceWeights::Uniform,
            delaunay_weights: DelaunayWeights::Only,
            metric: DistanceMetric::Euclidean,
            n_jobs: None,
        }
    }

    /// Sets the number of neighbours.
    pub fn n_neighbors(mut self, n_neighbors: usize) -> Self {
        self.n_neighbors = n_neighbors;
        self
    }

    /// Sets the distance weighting policy.
    pub fn weights(mut self, weights: DistanceWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Sets the Delaunay weighting policy.
    pub fn delaunay_weights(mut self, delaunay_weights: DelaunayWeights) -> Self {
        self.delaunay_weights = delaunay_weights;
        self
    }

    /// Sets the distance metric.
    pub fn metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Sets the number of parallel slices for the adjacency tests.
    pub fn n_jobs(mut self, n_jobs: Option<usize>) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    /// Builds and returns a [`RegressorSettings`] instance.
    pub fn build(self) -> RegressorSettings {
        RegressorSettings {
            n_neighbors: self.n_neighbors,
            weights: self.weights,
            delaunay_weights: self.delaunay_weights,
            metric: self.metric,
            n_jobs: self.n_jobs,
        }
    }
}

/// Logistic blending of interpolated observations against the background
/// model, `L / (1 + exp(k * (d - x0)))` for a nearest distance `d`.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct Logistic {
    /// Upper asymptote.
    pub l: f64,
    /// Steepness.
    pub k: f64,
    /// Midpoint distance, in the same units as the distance columns.
    pub x0: f64,
}

impl Default for Logistic {
    fn default() -> Self {
        Logistic {
            l: DEFAULT_LOGISTIC_L,
            k: DEFAULT_LOGISTIC_K,
            x0: DEFAULT_LOGISTIC_X0,
        }
    }
}

impl Logistic {
    /// Evaluates the logistic weight at distance `d`.
    #[inline]
    pub fn weight(&self, d: f64) -> f64 {
        self.l / (1.0 + (self.k * (d - self.x0)).exp())
    }
}

/// Settings for [`crate::ensemble::distweight`].
///
/// ### Default Values
/// - `power`: `-2`
/// - `logistic`: `L = 1`, `k = 0.3`, `x0 = 125`
/// - `scales`: empty
/// - `add`: `true`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct DistWeightSettings {
    /// Power applied to each source's distance.
    pub power: f64,

    /// Blending between the observation sources and the background.
    pub logistic: Logistic,

    /// Extra multiplier for the weights of a value column.
    pub scales: BTreeMap<String, f64>,

    /// Whether to add the output columns to the input table.
    pub add: bool,
}

impl Default for DistWeightSettings {
    fn default() -> Self {
        DistWeightSettings::builder().build()
    }
}

impl DistWeightSettings {
    /// Returns a new [`DistWeightSettingsBuilder`] populated with defaults.
    pub fn builder() -> DistWeightSettingsBuilder {
        DistWeightSettingsBuilder {
            power: DEFAULT_DISTANCE_POWER,
            logistic: Logistic::default(),
            scales: BTreeMap::new(),
            add: true,
        }
    }
}

/// A convenience builder for constructing [`DistWeightSettings`].
#[derive(Debug, Clone)]
pub struct DistWeightSettingsBuilder {
    pub power: f64,
    pub logistic: Logistic,
    pub scales: BTreeMap<String, f64>,
    pub add: bool,
}

impl DistWeightSettingsBuilder {
    /// Sets the distance power.
    pub fn power(mut self, power: f64) -> Self {
        self.power = power;
        self
    }

    /// Sets the logistic blending parameters.
    pub fn logistic(mut self, l: f64, k: f64, x0: f64) -> Self {
        self.logistic = Logistic { l, k, x0 };
        self
    }

    /// Adds a weight multiplier for the value column `key`.
    pub fn scale<S: Into<String>>(mut self, key: S, scale: f64) -> Self {
        self.scales.insert(key.into(), scale);
        self
    }

    /// Sets whether the output columns are added to the input table.
    pub fn add(mut self, add: bool) -> Self {
        self.add = add;
        self
    }

    /// Builds and returns a [`DistWeightSettings`] instance.
    pub fn build(self) -> DistWeightSettings {
        DistWeightSettings {
            power: self.power,
            logistic: self.logistic,
            scales: self.scales,
            add: self.add,
        }
    }
}

/// Everything needed to repeat a fusion run, saved and loaded as JSON.
///
/// Custom weighting closures cannot be serialised; saving a configuration
/// that holds one fails with [`ConfigIOError::Serialize`].
#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct FusionConfig {
    pub regressor: RegressorSettings,
    pub kfold: KFold,
    pub bias_correction: BiasCorrection,
    pub distweight: DistWeightSettings,
    pub fuse: FuseOptions,
}

impl FusionConfig {
    /// Writes the configuration as pretty-printed JSON.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigIOError> {
        let path_ref = path.as_ref();
        let file = File::create(path_ref).map_err(|e| ConfigIOError::Create {
            path: path_ref.to_path_buf(),
            source: e,
        })?;
        let mut w = BufWriter::new(file);

        serde_json::to_writer_pretty(&mut w, self).map_err(|e| ConfigIOError::Serialize {
            path: path_ref.to_path_buf(),
            source: e,
        })?;
        w.flush().map_err(|e| ConfigIOError::Flush {
            path: path_ref.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }

    /// Reads a configuration written by [`FusionConfig::save_json`].
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, ConfigIOError> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref).map_err(|e| ConfigIOError::Open {
            path: path_ref.to_path_buf(),
            source: e,
        })?;
        let reader = BufReader::new(file);

        serde_json::from_reader(reader).map_err(|e| ConfigIOError::Parse {
            path: path_ref.to_path_buf(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn builder_defaults() {
        let settings = RegressorSettings::default();
        assert_eq!(settings.n_neighbors, 5);
        assert!(settings.weights.is_uniform());
        assert!(matches!(settings.delaunay_weights, DelaunayWeights::Only));
        assert_eq!(settings.metric, DistanceMetric::Euclidean);
        assert_eq!(settings.n_jobs, None);

        let dw = DistWeightSettings::default();
        assert_eq!(dw.power, -2.0);
        assert_eq!(dw.logistic, Logistic { l: 1.0, k: 0.3, x0: 125.0 });
        assert!(dw.scales.is_empty());
    }

    #[test]
    fn logistic_is_half_at_midpoint() {
        let logistic = Logistic::default();
        assert!((logistic.weight(125.0) - 0.5).abs() < 1e-15);
        assert!(logistic.weight(0.0) > 0.99);
        assert!(logistic.weight(1000.0) < 1e-12);
    }

    #[test]
    fn fusion_config_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fusion.json");

        let mut config = FusionConfig::default();
        config.regressor = RegressorSettings::builder()
            .n_neighbors(30)
            .weights(DistanceWeights::Power {
                exponent: -2.0,
                min_distance: 1e-10,
            })
            .delaunay_weights(DelaunayWeights::Scale(4.0))
            .metric(DistanceMetric::Minkowski { p: 3.0 })
            .n_jobs(Some(2))
            .build();
        config.bias_correction = BiasCorrection::Ambc;
        config.distweight = DistWeightSettings::builder().scale("pa", 0.25).build();

        config.save_json(&path).unwrap();
        let loaded = FusionConfig::load_json(&path).unwrap();

        assert_eq!(loaded.regressor.n_neighbors, 30);
        assert!(matches!(
            loaded.regressor.weights,
            DistanceWeights::Power { exponent, min_distance } if exponent == -2.0 && min_distance == 1e-10
        ));
        assert!(matches!(loaded.regressor.delaunay_weights, DelaunayWeights::Scale(s) if s == 4.0));
        assert_eq!(loaded.regressor.metric, DistanceMetric::Minkowski { p: 3.0 });
        assert_eq!(loaded.regressor.n_jobs, Some(2));
        assert_eq!(loaded.bias_correction, BiasCorrection::Ambc);
        assert_eq!(loaded.distweight, config.distweight);
        assert_eq!(loaded.kfold, config.kfold);
    }

    #[test]
    fn custom_weights_cannot_be_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");

        let mut config = FusionConfig::default();
        config.regressor.weights = DistanceWeights::Custom(Arc::new(|d: &[f64]| d.to_vec()));

        assert!(matches!(
            config.save_json(&path),
            Err(ConfigIOError::Serialize { .. })
        ));
    }

    #[test]
    fn missing_config_reports_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert!(matches!(
            FusionConfig::load_json(&path),
            Err(ConfigIOError::Open { .. })
        ));
    }
}
