/////////////////////////////////////////////////////////////////////////////////////////////
//
// Computes the PM NowCast weighted average of recent hourly particulate concentrations.
//
// Created on: 17 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! PM NowCast.
//!
//! The NowCast turns up to twelve hourly concentrations into a current
//! estimate that leans on recent hours when the series is changing fast:
//!
//! 1. values below the method detection limit are raised to it
//! 2. `s = (max - min) / max` over the available hours
//! 3. `wf = clamp(1 - s, 0.5, 1)`
//! 4. hour `h` hours ago gets weight `wf^h`, missing hours get `0`
//!
//! The result is undefined (NaN) when fewer than two of the three most recent
//! hours are present, or when every available hour is zero.

/// Hours in a NowCast window.
pub const NOWCAST_HOURS: usize = 12;

// Recent hours that must be mostly present.
const RECENT_HOURS: usize = 3;
const MIN_RECENT_VALID: usize = 2;

/// NowCast of hourly concentrations ordered oldest first.
///
/// Only the last [`NOWCAST_HOURS`] values are used; NaN marks a missing hour.
///
/// # Examples
///
/// ```
/// use ferreus_dnr::nowcast::pm_nowcast;
///
/// // A rising series leans on the latest hour.
/// let nc = pm_nowcast(&[10.0, 20.0, 40.0], 0.0);
/// assert!((nc - 30.0).abs() < 1e-12);
/// ```
pub fn pm_nowcast(hours: &[f64], mdl: f64) -> f64 {
    let window = &hours[hours.len().saturating_sub(NOWCAST_HOURS)..];

    let recent = &window[window.len().saturating_sub(RECENT_HOURS)..];
    if recent.iter().filter(|v| v.is_finite()).count() < MIN_RECENT_VALID {
        return f64::NAN;
    }

    let clipped: Vec<f64> = window
        .iter()
        .map(|&v| if v.is_finite() { v.max(mdl) } else { f64::NAN })
        .collect();

    let (cmin, cmax) = clipped
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if cmax == 0.0 {
        return f64::NAN;
    }

    let wf = (1.0 - (cmax - cmin) / cmax).clamp(0.5, 1.0);
    let last = clipped.len() - 1;
    let (num, den) = clipped
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .fold((0.0, 0.0), |(num, den), (i, &v)| {
            let w = wf.powi((last - i) as i32);
            (num + w * v, den + w)
        });
    num / den
}

/// Rolling [`pm_nowcast`] of an hourly series: entry `i` uses the hours up
/// to and including `i`.
pub fn pm_nowcast_series(series: &[f64], mdl: f64) -> Vec<f64> {
    (0..series.len())
        .map(|i| pm_nowcast(&series[..=i], mdl))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steady_concentrations_are_unchanged() {
        assert_eq!(pm_nowcast(&[12.5; 12], 0.0), 12.5);
    }

    #[test]
    fn missing_hours_get_no_weight() {
        // wf = 0.5; weights 0.25, 0, 1.
        let nc = pm_nowcast(&[10.0, f64::NAN, 40.0], 0.0);
        assert!((nc - 34.0).abs() < 1e-12);
    }

    #[test]
    fn sparse_recent_hours_are_undefined() {
        assert!(pm_nowcast(&[10.0, 20.0, f64::NAN, f64::NAN], 0.0).is_nan());
        assert!(pm_nowcast(&[10.0], 0.0).is_nan());
        assert!(pm_nowcast(&[], 0.0).is_nan());
    }

    #[test]
    fn all_zero_hours_are_undefined() {
        assert!(pm_nowcast(&[0.0, 0.0, 0.0], 0.0).is_nan());
    }

    #[test]
    fn values_below_detection_limit_are_raised() {
        // c = [2, 4]; s = 0.5 so wf = 0.5.
        let nc = pm_nowcast(&[-1.0, 4.0], 2.0);
        assert!((nc - 5.0 / 1.5).abs() < 1e-12);
    }

    #[test]
    fn weight_factor_is_at_least_one_half() {
        // s = 0.2 gives wf = 0.8 and weights 0.8, 1.
        let nc = pm_nowcast(&[8.0, 10.0], 0.0);
        assert!((nc - (0.8 * 8.0 + 10.0) / 1.8).abs() < 1e-12);
    }

    #[test]
    fn series_uses_a_twelve_hour_window() {
        let mut series = vec![1000.0];
        series.extend([10.0; 12]);
        let nc = pm_nowcast_series(&series, 0.0);

        assert_eq!(nc.len(), 13);
        assert!(nc[0].is_nan());
        assert!(nc[11] > 10.0);
        assert_eq!(nc[12], 10.0);
    }
}
