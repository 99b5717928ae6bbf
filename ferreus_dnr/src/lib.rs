/////////////////////////////////////////////////////////////////////////////////////////////
//
// Exposes the public API and high-level documentation for Delaunay-neighbour field fusion.
//
// Created on: 17 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Delaunay-neighbour regression and fusion of sparse observations.
//!
//! Surface concentrations of air pollutants are observed at a sparse,
//! irregular set of monitors, while a chemical transport model provides a
//! complete but biased background grid. This crate estimates the field by
//! interpolating the observations (and the background sampled at the
//! monitors) with a nearest-neighbour regressor that only trusts neighbours
//! adjacent to the query point in a local Delaunay triangulation, then
//! corrects the background with the interpolated bias.
//!
//! The building blocks are:
//!
//! - [`DelaunayNeighborsRegressor`] - k nearest neighbours from a KD-tree,
//!   reweighted by a local Delaunay adjacency test.
//! - [`grouped`] - per-network neighbourhoods normalised jointly, or separate
//!   surfaces blended with per-network fusion weights.
//! - [`bias_correction`] - additive, multiplicative and error-weighted
//!   corrections of the background.
//! - [`ensemble`] - distance-weighted and least-squares merging of several
//!   fused surfaces.
//! - [`driver::fuse`] - the table-level run: cross-validation, fit, and
//!   prediction onto a target grid.
//! - [`stats`] and [`nowcast`] - model evaluation statistics and the PM NowCast.
//!
//! Check out the examples directory in the repository for an end-to-end run.
//!
//! # Features
//! - Delaunay adjacency computed locally per query and fanned out with rayon
//! - Power, inverse-distance or user supplied neighbour weights, plus sample weights
//! - K-fold cross-validation and leave-one-out diagnostics
//! - CSV tables and JSON configuration
//! - Built on [`faer`](https://docs.rs/faer/latest/faer/) matrices
//!
//! # Examples
//!
//! ```
//! use ferreus_dnr::{
//!     DelaunayNeighborsRegressor,
//!     config::RegressorSettings,
//!     weights::{DelaunayWeights, DistanceWeights},
//!     generate_random_points,
//!     TestFunctions,
//! };
//!
//! // Generate some monitor locations in the unit square
//! let sites = generate_random_points(200, 2, Some(42));
//!
//! // Assign concentrations from a synthetic field
//! let observed = TestFunctions::pollutant_field(&sites);
//!
//! // Inverse-square weights over Delaunay neighbours only
//! let settings = RegressorSettings::builder()
//!     .n_neighbors(30)
//!     .weights(DistanceWeights::Power { exponent: -2.0, min_distance: 1e-10 })
//!     .delaunay_weights(DelaunayWeights::Only)
//!     .build();
//!
//! let mut dnr = DelaunayNeighborsRegressor::new(settings);
//! dnr.fit(&sites, &observed, None).unwrap();
//!
//! // Predicting at a monitor returns its own observation
//! let predicted = dnr.predict(&sites).unwrap();
//! let max_diff = (0..sites.nrows())
//!     .map(|i| (predicted[(i, 0)] - observed[(i, 0)]).abs())
//!     .fold(0.0, f64::max);
//!
//! assert!(max_diff < 1e-6);
//! ```
pub mod bias_correction;

mod common;

pub mod config;

pub mod cross_validation;

pub mod delaunay;

pub mod driver;

pub mod ensemble;

pub mod error;

pub mod grouped;

pub mod kdtree;

pub mod nowcast;

pub mod progress;

pub mod regressor;

pub mod stats;

pub mod table;

mod test_functions;

pub mod weights;

pub use {
    common::{create_evaluation_grid, generate_random_points, pad_and_snap_extents},
    error::{DnrError, Result},
    regressor::{DelaunayNeighborsRegressor, NeighborsRegressor, TrainingData},
    test_functions::TestFunctions,
};
