/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements the distance and Delaunay weighting policies used to combine neighbour values.
//
// Created on: 17 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Neighbour weighting policies.
//!
//! A prediction weight is built in three steps: a [`DistanceWeights`] base
//! weight from the neighbour distances, a [`DelaunayWeights`] composition with
//! the Delaunay indicator, and finally the per-sample weights supplied at fit
//! time. A `None` base weight means every neighbour counts equally.

use crate::error::DnrError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc};

/// User supplied distance weighting: maps one row of neighbour distances to weights.
pub type DistanceWeightFn = Arc<dyn Fn(&[f64]) -> Vec<f64> + Send + Sync>;

/// User supplied Delaunay composition: maps the Delaunay indicator and the base
/// weights (if any) of one row to final weights.
pub type DelaunayWeightFn = Arc<dyn Fn(&[bool], Option<&[f64]>) -> Vec<f64> + Send + Sync>;

/// Base weight assigned to each neighbour from its distance.
#[derive(Clone, Serialize, Deserialize, Default)]
pub enum DistanceWeights {
    /// Every neighbour counts equally.
    #[default]
    Uniform,

    /// Inverse distance, `1 / d`. A row with any neighbour at exactly zero
    /// distance gives those neighbours `1` and every other neighbour `0`.
    Distance,

    /// `max(d, min_distance) ^ exponent`.
    Power { exponent: f64, min_distance: f64 },

    /// Arbitrary function of the distance row.
    #[serde(skip)]
    Custom(DistanceWeightFn),
}

impl fmt::Debug for DistanceWeights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceWeights::Uniform => write!(f, "Uniform"),
            DistanceWeights::Distance => write!(f, "Distance"),
            DistanceWeights::Power {
                exponent,
                min_distance,
            } => f
                .debug_struct("Power")
                .field("exponent", exponent)
                .field("min_distance", min_distance)
                .finish(),
            DistanceWeights::Custom(_) => write!(f, "Custom(<fn>)"),
        }
    }
}

impl DistanceWeights {
    /// Returns `true` when the weights do not depend on the distances.
    pub fn is_uniform(&self) -> bool {
        matches!(self, DistanceWeights::Uniform)
    }

    /// Base weights for one row of neighbour distances, or `None` when every
    /// neighbour counts equally.
    ///
    /// # Errors
    /// `InvalidInput` when a custom function returns the wrong number of weights.
    pub fn row_weights(&self, distances: &[f64]) -> Result<Option<Vec<f64>>, DnrError> {
        Ok(match self {
            DistanceWeights::Uniform => None,
            DistanceWeights::Distance => {
                if distances.iter().any(|&d| d == 0.0) {
                    Some(
                        distances
                            .iter()
                            .map(|&d| if d == 0.0 { 1.0 } else { 0.0 })
                            .collect(),
                    )
                } else {
                    Some(distances.iter().map(|&d| 1.0 / d).collect())
                }
            }
            DistanceWeights::Power {
                exponent,
                min_distance,
            } => Some(
                distances
                    .iter()
                    .map(|&d| d.max(*min_distance).powf(*exponent))
                    .collect(),
            ),
            DistanceWeights::Custom(f) => Some(checked_len(f(distances), distances.len())?),
        })
    }
}

impl FromStr for DistanceWeights {
    type Err = DnrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uniform" => Ok(DistanceWeights::Uniform),
            "distance" => Ok(DistanceWeights::Distance),
            other => Err(DnrError::invalid(format!(
                "unknown distance weighting `{other}`; expected `uniform` or `distance`"
            ))),
        }
    }
}

/// How the Delaunay indicator modifies the base weights.
#[derive(Clone, Serialize, Deserialize, Default)]
pub enum DelaunayWeights {
    /// Base weights of Delaunay neighbours, zero elsewhere.
    #[default]
    Only,

    /// One for Delaunay neighbours, zero elsewhere.
    Equal,

    /// Base weights unchanged. Adjacency is not computed.
    None,

    /// Base weights multiplied by the factor for Delaunay neighbours.
    Scale(f64),

    /// Arbitrary function of the indicator and base weights.
    #[serde(skip)]
    Custom(DelaunayWeightFn),
}

impl fmt::Debug for DelaunayWeights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelaunayWeights::Only => write!(f, "Only"),
            DelaunayWeights::Equal => write!(f, "Equal"),
            DelaunayWeights::None => write!(f, "None"),
            DelaunayWeights::Scale(s) => f.debug_tuple("Scale").field(s).finish(),
            DelaunayWeights::Custom(_) => write!(f, "Custom(<fn>)"),
        }
    }
}

impl DelaunayWeights {
    /// Returns `true` when the composition uses the Delaunay indicator.
    pub fn needs_adjacency(&self) -> bool {
        !matches!(self, DelaunayWeights::None)
    }

    /// Composes the Delaunay indicator of one row with its base weights.
    ///
    /// # Errors
    /// `InvalidInput` when a custom function returns the wrong number of weights.
    pub fn compose(
        &self,
        mask: &[bool],
        base: Option<Vec<f64>>,
    ) -> Result<Option<Vec<f64>>, DnrError> {
        let indicator = || mask.iter().map(|&m| if m { 1.0 } else { 0.0 });
        Ok(match self {
            DelaunayWeights::None => base,
            DelaunayWeights::Equal => Some(indicator().collect()),
            DelaunayWeights::Only => Some(match base {
                Some(w) => w.iter().zip(indicator()).map(|(w, i)| w * i).collect(),
                None => indicator().collect(),
            }),
            DelaunayWeights::Scale(s) => {
                let factor = mask.iter().map(|&m| if m { *s } else { 1.0 });
                Some(match base {
                    Some(w) => w.iter().zip(factor).map(|(w, f)| w * f).collect(),
                    None => factor.collect(),
                })
            }
            DelaunayWeights::Custom(f) => Some(checked_len(f(mask, base.as_deref()), mask.len())?),
        })
    }
}

fn checked_len(weights: Vec<f64>, expected: usize) -> Result<Vec<f64>, DnrError> {
    if weights.len() == expected {
        Ok(weights)
    } else {
        Err(DnrError::invalid(format!(
            "custom weighting returned {} weights for {expected} neighbours",
            weights.len()
        )))
    }
}

impl FromStr for DelaunayWeights {
    type Err = DnrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let literal = s.trim().to_ascii_lowercase();
        match literal.as_str() {
            "only" => Ok(DelaunayWeights::Only),
            "equal" => Ok(DelaunayWeights::Equal),
            "none" => Ok(DelaunayWeights::None),
            other => match other.parse::<f64>() {
                Ok(factor) if factor.is_finite() => Ok(DelaunayWeights::Scale(factor)),
                Ok(_) => Err(DnrError::invalid(format!(
                    "Delaunay scale factor `{other}` must be finite"
                ))),
                Err(_) => Err(DnrError::invalid(format!(
                    "unknown Delaunay weighting `{other}`; expected `only`, `equal`, `none` or a number"
                ))),
            },
        }
    }
}

/// Multiplies `weights` by the sample weights of the neighbours in `indices`.
///
/// A uniform row (`None`) becomes the neighbours' sample weights.
pub(crate) fn apply_sample_weights(
    weights: Option<Vec<f64>>,
    indices: &[usize],
    sample_weight: Option<&[f64]>,
) -> Option<Vec<f64>> {
    let Some(sw) = sample_weight else {
        return weights;
    };
    Some(match weights {
        Some(w) => w
            .iter()
            .zip(indices)
            .map(|(w, &idx)| w * sw[idx])
            .collect(),
        None => indices.iter().map(|&idx| sw[idx]).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_distance_handles_coincident_neighbours() {
        let w = DistanceWeights::Distance.row_weights(&[0.0, 2.0, 0.0, 4.0]).unwrap();
        assert_eq!(w, Some(vec![1.0, 0.0, 1.0, 0.0]));

        let w = DistanceWeights::Distance.row_weights(&[2.0, 4.0]).unwrap();
        assert_eq!(w, Some(vec![0.5, 0.25]));
    }

    #[test]
    fn power_weights_clip_small_distances() {
        let policy = DistanceWeights::Power {
            exponent: -2.0,
            min_distance: 0.5,
        };
        assert_eq!(policy.row_weights(&[0.0, 1.0, 2.0]).unwrap(), Some(vec![4.0, 1.0, 0.25]));
    }

    #[test]
    fn custom_distance_weights_are_applied_verbatim() {
        let policy = DistanceWeights::Custom(Arc::new(|d: &[f64]| d.iter().map(|x| x + 1.0).collect()));
        assert_eq!(policy.row_weights(&[1.0, 2.0]).unwrap(), Some(vec![2.0, 3.0]));
    }

    #[test]
    fn delaunay_compositions() {
        let mask = [true, false, true];
        let base = Some(vec![2.0, 3.0, 4.0]);

        assert_eq!(
            DelaunayWeights::Only.compose(&mask, base.clone()).unwrap(),
            Some(vec![2.0, 0.0, 4.0])
        );
        assert_eq!(
            DelaunayWeights::Only.compose(&mask, None).unwrap(),
            Some(vec![1.0, 0.0, 1.0])
        );
        assert_eq!(
            DelaunayWeights::Equal.compose(&mask, base.clone()).unwrap(),
            Some(vec![1.0, 0.0, 1.0])
        );
        assert_eq!(DelaunayWeights::None.compose(&mask, None).unwrap(), None);
        assert_eq!(
            DelaunayWeights::Scale(10.0).compose(&mask, base).unwrap(),
            Some(vec![20.0, 3.0, 40.0])
        );
        assert_eq!(
            DelaunayWeights::Scale(10.0).compose(&mask, None).unwrap(),
            Some(vec![10.0, 1.0, 10.0])
        );
    }

    #[test]
    fn literals_parse_and_unknown_literals_fail() {
        assert!(matches!("uniform".parse::<DistanceWeights>(), Ok(DistanceWeights::Uniform)));
        assert!(matches!("Distance".parse::<DistanceWeights>(), Ok(DistanceWeights::Distance)));
        assert!(matches!(
            "gaussian".parse::<DistanceWeights>(),
            Err(DnrError::InvalidInput { .. })
        ));

        assert!(matches!("only".parse::<DelaunayWeights>(), Ok(DelaunayWeights::Only)));
        assert!(matches!("equal".parse::<DelaunayWeights>(), Ok(DelaunayWeights::Equal)));
        assert!(matches!("none".parse::<DelaunayWeights>(), Ok(DelaunayWeights::None)));
        assert!(matches!(
            "2.5".parse::<DelaunayWeights>(),
            Ok(DelaunayWeights::Scale(s)) if s == 2.5
        ));
        assert!(matches!(
            "sometimes".parse::<DelaunayWeights>(),
            Err(DnrError::InvalidInput { .. })
        ));
    }

    #[test]
    fn non_finite_scale_literals_fail() {
        for literal in ["nan", "inf", "-inf", "NaN"] {
            assert!(matches!(
                literal.parse::<DelaunayWeights>(),
                Err(DnrError::InvalidInput { .. })
            ));
        }
        assert!(matches!(
            "-0.5".parse::<DelaunayWeights>(),
            Ok(DelaunayWeights::Scale(s)) if s == -0.5
        ));
    }

    #[test]
    fn custom_weights_of_the_wrong_length_fail() {
        let short = DistanceWeights::Custom(Arc::new(|d: &[f64]| vec![1.0; d.len() - 1]));
        assert!(matches!(
            short.row_weights(&[1.0, 2.0, 3.0]),
            Err(DnrError::InvalidInput { .. })
        ));

        let long = DelaunayWeights::Custom(Arc::new(|m: &[bool], _: Option<&[f64]>| vec![1.0; m.len() + 1]));
        assert!(matches!(
            long.compose(&[true, false], None),
            Err(DnrError::InvalidInput { .. })
        ));
    }

    #[test]
    fn sample_weights_multiply_or_replace() {
        let sw = [1.0, 2.0, 3.0];
        assert_eq!(
            apply_sample_weights(Some(vec![1.0, 1.0]), &[2, 0], Some(&sw)),
            Some(vec![3.0, 1.0])
        );
        assert_eq!(apply_sample_weights(None, &[1, 2], Some(&sw)), Some(vec![2.0, 3.0]));
        assert_eq!(apply_sample_weights(None, &[1, 2], None), None);
    }
}
