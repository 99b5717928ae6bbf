/////////////////////////////////////////////////////////////////////////////////////////////
//
// Re-exports distance, sorting, and matrix helpers used across the ferreus_dnr crates.
//
// Created on: 17 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Utilities for the [`ferreus_dnr`] crate
mod constants;
mod distance;
mod utils;

pub use {
    constants::*,
    distance::{chebyshev_distance, euclidean_distance, manhattan_distance, minkowski_distance},
    utils::{argsort, get_pointarray_extents, nan_min, select_mat_rows, select_rows},
};
