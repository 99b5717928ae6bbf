/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements the Minkowski family of point distances used by the neighbour search.
//
// Created on: 17 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

/// Calculates the euclidean distance between two points.
///
/// # Examples
///
/// ```
/// use ferreus_dnr_utils::euclidean_distance;
///
/// assert_eq!(euclidean_distance(&[1.0, 2.0], &[4.0, 6.0]), 5.0);
/// ```
#[inline(always)]
pub fn euclidean_distance(target: &[f64], source: &[f64]) -> f64 {
    let mut dist = 0.0;
    for (t, s) in target.iter().zip(source.iter()) {
        let diff = t - s;
        dist += diff * diff;
    }
    dist.sqrt()
}

/// Sum of absolute coordinate differences.
#[inline(always)]
pub fn manhattan_distance(target: &[f64], source: &[f64]) -> f64 {
    target
        .iter()
        .zip(source.iter())
        .map(|(t, s)| (t - s).abs())
        .sum()
}

/// Infinity-norm distance.
#[inline(always)]
pub fn chebyshev_distance(target: &[f64], source: &[f64]) -> f64 {
    target
        .iter()
        .zip(source.iter())
        .map(|(t, s)| (t - s).abs())
        .fold(0.0_f64, f64::max)
}

/// Minkowski distance of order `p`.
///
/// `p = 1` and `p = 2` are dispatched to [`manhattan_distance`] and
/// [`euclidean_distance`] so that the common cases stay exact.
///
/// # Examples
///
/// ```
/// use ferreus_dnr_utils::minkowski_distance;
///
/// let d = minkowski_distance(&[0.0, 0.0], &[3.0, 4.0], 2.0);
/// assert_eq!(d, 5.0);
///
/// let d1 = minkowski_distance(&[0.0, 0.0], &[3.0, 4.0], 1.0);
/// assert_eq!(d1, 7.0);
/// ```
#[inline(always)]
pub fn minkowski_distance(target: &[f64], source: &[f64], p: f64) -> f64 {
    if p == 2.0 {
        return euclidean_distance(target, source);
    }
    if p == 1.0 {
        return manhattan_distance(target, source);
    }
    if p.is_infinite() {
        return chebyshev_distance(target, source);
    }
    target
        .iter()
        .zip(source.iter())
        .map(|(t, s)| (t - s).abs().powf(p))
        .sum::<f64>()
        .powf(1.0 / p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minkowski_orders_agree_with_special_cases() {
        let a = [0.3, -1.2];
        let b = [2.5, 0.7];
        assert_eq!(minkowski_distance(&a, &b, 2.0), euclidean_distance(&a, &b));
        assert_eq!(minkowski_distance(&a, &b, 1.0), manhattan_distance(&a, &b));
        assert_eq!(
            minkowski_distance(&a, &b, f64::INFINITY),
            chebyshev_distance(&a, &b)
        );

        let d3 = minkowski_distance(&a, &b, 3.0);
        assert!(d3 <= manhattan_distance(&a, &b));
        assert!(d3 >= chebyshev_distance(&a, &b));
    }

    #[test]
    fn coincident_points_have_zero_distance() {
        let a = [12.5, 7.25];
        for p in [1.0, 2.0, 3.0, f64::INFINITY] {
            assert_eq!(minkowski_distance(&a, &a, p), 0.0);
        }
    }
}
