/////////////////////////////////////////////////////////////////////////////////////////////
//
// Defines shared helpers for random point generation, extent padding, and evaluation grids.
//
// Created on: 17 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use faer::Mat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Round a value down to the nearest multiple of resolution
pub(crate) fn round_down(value: f64, resolution: f64) -> f64 {
    (value / resolution).floor() * resolution
}

/// Round a value up to the nearest multiple of resolution
pub(crate) fn round_up(value: f64, resolution: f64) -> f64 {
    (value / resolution).ceil() * resolution
}

/// Generate a matrix of random points in the unit hypercube.
///
/// # Parameters
/// - `n`: Number of points to generate (rows in the output matrix).
/// - `d`: Number of spatial dimensions per point (columns in the output matrix).
/// - `seed`: Optional random seed.
///   - If `Some(seed)` is provided, the same sequence of points will be generated
///     deterministically across runs and platforms (useful for reproducible tests).
///   - If `None`, the generator is seeded from the operating system's randomness source.
///
/// # Returns
/// A `Mat<f64>` of shape `(n, d)` where each element lies in `[0.0, 1.0)`.
///
/// # Example
/// ```
/// use ferreus_dnr::generate_random_points;
///
/// // Generate 100 reproducible observation sites
/// let pts = generate_random_points(100, 2, Some(42));
/// assert_eq!(pts.ncols(), 2);
/// ```
pub fn generate_random_points(n: usize, d: usize, seed: Option<u64>) -> Mat<f64> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    Mat::from_fn(n, d, |_, _| rng.random_range(0.0..1.0))
}

/// Pads and snaps 2D extents `[xmin, ymin, xmax, ymax]` to the nearest multiple of
/// resolution, then expands the bounds by one resolution unit and the given buffer.
///
/// Any other extents length is returned unchanged.
///
/// # Example
/// ```
/// use ferreus_dnr::pad_and_snap_extents;
///
/// let extents = pad_and_snap_extents(&[0.3, 0.3, 0.7, 0.7], 0.5, 0.0);
/// assert_eq!(extents, vec![-0.5, -0.5, 1.5, 1.5]);
/// ```
pub fn pad_and_snap_extents(initial_extents: &[f64], resolution: f64, buffer: f64) -> Vec<f64> {
    let mut extents = initial_extents.to_vec();
    if extents.len() == 4 {
        extents[0] = round_down(extents[0], resolution) - resolution - buffer;
        extents[1] = round_down(extents[1], resolution) - resolution - buffer;
        extents[2] = round_up(extents[2], resolution) + resolution + buffer;
        extents[3] = round_up(extents[3], resolution) + resolution + buffer;
    }
    extents
}

/// Create a regular evaluation grid from per-dimension ranges and sample counts.
///
/// The first dimension varies fastest. A dimension with a single sample sits
/// at the start of its range.
///
/// # Arguments
/// * `ranges` - Inclusive `(min, max)` range for each dimension.
/// * `counts` - Number of grid samples per range; extra entries in either slice are ignored.
///
/// # Returns
/// A `Mat<f64>` with one row per grid point and one column per dimension.
pub fn create_evaluation_grid(ranges: &[(f64, f64)], counts: &[usize]) -> Mat<f64> {
    let num_dimensions = ranges.len().min(counts.len());
    let dimensions = &counts[..num_dimensions];
    let total_points: usize = dimensions.iter().product();

    Mat::from_fn(total_points, num_dimensions, |row_idx, col_idx| {
        let dim_points = dimensions[col_idx];
        let (start, end) = ranges[col_idx];
        let step = if dim_points > 1 {
            (end - start) / (dim_points as f64 - 1.0)
        } else {
            0.0
        };

        let stride: usize = dimensions[..col_idx].iter().product();

        let index_in_dim = (row_idx / stride) % dim_points;
        start + step * index_in_dim as f64
    })
}
