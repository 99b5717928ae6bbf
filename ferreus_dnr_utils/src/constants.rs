/////////////////////////////////////////////////////////////////////////////////////////////
//
// Defines shared numerical constants for neighbour weighting, fold splitting, and fusion.
//
// Created on: 17 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

/// Default number of neighbours considered per query point.
pub const DEFAULT_N_NEIGHBORS: usize = 5;

/// Number of closest neighbours flagged as adjacent when a local triangulation
/// leaves the query point without any Delaunay neighbour.
pub const DEGENERATE_FALLBACK_NEIGHBORS: usize = 3;

/// Default number of cross-validation folds.
pub const DEFAULT_N_SPLITS: usize = 5;

/// Default seed for shuffling cross-validation folds.
pub const DEFAULT_RANDOM_STATE: u64 = 42;

/// Finite weight given to a source observed at exactly zero distance in the
/// ensemble distance weighting.
pub const ZERO_DISTANCE_WEIGHT: f64 = 1e20;

/// Default power applied to source distances in the ensemble distance weighting.
pub const DEFAULT_DISTANCE_POWER: f64 = -2.0;

/// Default logistic trust numerator.
pub const DEFAULT_LOGISTIC_L: f64 = 1.0;

/// Default logistic trust steepness.
pub const DEFAULT_LOGISTIC_K: f64 = 0.3;

/// Default logistic trust mid-point, in the same units as the distances.
pub const DEFAULT_LOGISTIC_X0: f64 = 125.0;
