/////////////////////////////////////////////////////////////////////////////////////////////
//
// Provides synthetic concentration fields for validating and demonstrating field fusion.
//
// Created on: 17 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Synthetic 2D fields on the unit square.
//!
//! [`TestFunctions::pollutant_field`] plays the role of the true surface
//! sampled by monitors, and [`TestFunctions::background_model`] a smoothed,
//! biased model of it.
use faer::Mat;

/// Struct that implements 2D fields used to generate observations and
/// background values for testing fusion.
pub struct TestFunctions;

impl TestFunctions {
    /// Periodic concentration field:
    /// <div>
    /// $$
    /// F(x,y) = 30\left(1 + \sin(3\pi x)\,\sin(3\pi y)\right)
    /// $$
    /// </div>
    ///
    /// Values lie in `[0, 60]`.
    pub fn pollutant_field(points: &Mat<f64>) -> Mat<f64> {
        assert_eq!(points.ncols(), 2);
        let three_pi = 3.0 * std::f64::consts::PI;

        Mat::from_fn(points.nrows(), 1, |i, _| {
            let x = points[(i, 0)];
            let y = points[(i, 1)];
            30.0 * (1.0 + (three_pi * x).sin() * (three_pi * y).sin())
        })
    }

    /// Background model of [`TestFunctions::pollutant_field`]: a single
    /// broad plume centred on the square, scaled by `bias` and shifted by `offset`.
    ///
    /// <div>
    /// $$
    /// M(x,y) = \text{bias}\cdot\left(10 + 40\exp\!\left[-8\left((x-\tfrac12)^2 + (y-\tfrac12)^2\right)\right]\right) + \text{offset}
    /// $$
    /// </div>
    pub fn background_model(points: &Mat<f64>, bias: f64, offset: f64) -> Mat<f64> {
        assert_eq!(points.ncols(), 2);

        Mat::from_fn(points.nrows(), 1, |i, _| {
            let dx = points[(i, 0)] - 0.5;
            let dy = points[(i, 1)] - 0.5;
            let plume = 10.0 + 40.0 * (-8.0 * (dx * dx + dy * dy)).exp();
            bias * plume + offset
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::mat;

    #[test]
    fn pollutant_field_stays_in_range() {
        let points = mat![[0.5 / 3.0, 0.5 / 3.0], [0.5 / 3.0, 1.5 / 3.0], [0.0, 0.7f64]];
        let values = TestFunctions::pollutant_field(&points);
        assert!((values[(0, 0)] - 60.0).abs() < 1e-9);
        assert!(values[(1, 0)].abs() < 1e-9);
        assert!((values[(2, 0)] - 30.0).abs() < 1e-9);
    }

    #[test]
    fn background_peaks_at_the_centre() {
        let points = mat![[0.5, 0.5], [0.0, 0.0f64]];
        let values = TestFunctions::background_model(&points, 0.5, 1.0);
        assert!((values[(0, 0)] - 26.0).abs() < 1e-12);
        assert!(values[(1, 0)] < values[(0, 0)]);
    }
}
