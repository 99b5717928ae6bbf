/////////////////////////////////////////////////////////////////////////////////////////////
//
// Tests which neighbours of a query point are its Delaunay neighbours via local triangulations.
//
// Created on: 17 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Local Delaunay adjacency.
//!
//! For every query point the `k` nearest training points and the query itself
//! (inserted last) are triangulated with Bowyer-Watson. A neighbour is a
//! *Delaunay neighbour* when it shares a triangulation edge with the query.
//!
//! The unbounded outside of the hull is represented by ghost triangles
//! attached to a symbolic vertex at infinity, so hull edges with arbitrarily
//! large empty circles are kept.
//!
//! When the query ends up with no adjacency at all (coincident points,
//! collinear sets or fewer than three points) the three closest neighbour
//! positions are used instead and the row is flagged as degenerate.

use crate::progress::{emit, ProgressMsg, ProgressSink};
use ferreus_dnr_utils::DEGENERATE_FALLBACK_NEIGHBORS;
use rayon::prelude::*;
use std::sync::Arc;

// Vertex at infinity. Ghost triangles keep it in their last slot.
const GHOST: usize = usize::MAX;

/// Adjacency of one query point to its neighbour list.
#[derive(Debug, Clone, PartialEq)]
pub struct Adjacency {
    /// `true` where the neighbour at that position is a Delaunay neighbour.
    pub mask: Vec<bool>,

    /// Set when the triangulation gave no adjacency and the closest
    /// neighbours were substituted.
    pub degenerate: bool,
}

// Counter-clockwise triangle. A ghost triangle `[u, v, GHOST]` stands for the
// half-plane left of the hull edge `u -> v`.
#[derive(Clone, Copy)]
struct Triangle {
    v: [usize; 3],
}

impl Triangle {
    fn new(a: usize, b: usize, c: usize) -> Self {
        let v = if a == GHOST {
            [b, c, a]
        } else if b == GHOST {
            [c, a, b]
        } else {
            [a, b, c]
        };
        Self { v }
    }

    fn is_ghost(&self) -> bool {
        self.v[2] == GHOST
    }

    fn edges(&self) -> [[usize; 2]; 3] {
        let [a, b, c] = self.v;
        [[a, b], [b, c], [c, a]]
    }

    /// `true` when inserting `p` destroys this triangle.
    fn conflicts(&self, xy: &[[f64; 2]], p: [f64; 2]) -> bool {
        let [a, b, c] = self.v;
        if !self.is_ghost() {
            return in_circumcircle(xy[a], xy[b], xy[c], p);
        }

        let (u, v) = (xy[a], xy[b]);
        let orient = orientation(u, v, p);
        if orient != 0.0 {
            return orient > 0.0;
        }
        // On the hull line only the open edge belongs to the ghost's circle.
        let along = (p[0] - u[0]) * (v[0] - u[0]) + (p[1] - u[1]) * (v[1] - u[1]);
        let length2 = (v[0] - u[0]).powi(2) + (v[1] - u[1]).powi(2);
        along > 0.0 && along < length2
    }
}

#[inline]
fn orientation(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

/// `true` when `p` lies strictly inside the circumcircle of `(a, b, c)`,
/// whatever the winding of the triangle.
fn in_circumcircle(a: [f64; 2], b: [f64; 2], c: [f64; 2], p: [f64; 2]) -> bool {
    let orient = orientation(a, b, c);
    if orient == 0.0 {
        return false;
    }

    let (adx, ady) = (a[0] - p[0], a[1] - p[1]);
    let (bdx, bdy) = (b[0] - p[0], b[1] - p[1]);
    let (cdx, cdy) = (c[0] - p[0], c[1] - p[1]);

    let ad = adx * adx + ady * ady;
    let bd = bdx * bdx + bdy * bdy;
    let cd = cdx * cdx + cdy * cdy;

    let det = adx * (bdy * cd - bd * cdy) - ady * (bdx * cd - bd * cdx) + ad * (bdx * cdy - bdy * cdx);

    det * orient.signum() > 0.0
}

// First non-degenerate triangle of `order` plus its three ghosts. The seed
// vertices are removed from `order`; `None` when every point is collinear.
fn seed_triangulation(xy: &[[f64; 2]], order: &mut Vec<usize>) -> Option<Vec<Triangle>> {
    if order.len() < 3 {
        return None;
    }
    let (a, b) = (order[0], order[1]);
    let c = order[2..]
        .iter()
        .copied()
        .find(|&c| orientation(xy[a], xy[b], xy[c]) != 0.0)?;
    order.retain(|&i| i != a && i != b && i != c);

    let (a, b) = if orientation(xy[a], xy[b], xy[c]) > 0.0 {
        (a, b)
    } else {
        (b, a)
    };
    Some(vec![
        Triangle::new(a, b, c),
        Triangle::new(b, a, GHOST),
        Triangle::new(c, b, GHOST),
        Triangle::new(a, c, GHOST),
    ])
}

// Bowyer-Watson insertion of vertex `i`: removes every conflicting triangle
// and fans the cavity boundary out to the new vertex.
fn insert_vertex(triangles: &mut Vec<Triangle>, xy: &[[f64; 2]], i: usize) {
    let p = xy[i];
    let mut boundary: Vec<[usize; 2]> = Vec::new();
    let mut kept: Vec<Triangle> = Vec::with_capacity(triangles.len() + 2);

    for tri in triangles.drain(..) {
        if !tri.conflicts(xy, p) {
            kept.push(tri);
            continue;
        }
        for edge in tri.edges() {
            // Edges shared by two cavity triangles are interior to the cavity.
            match boundary
                .iter()
                .position(|e| e[0] == edge[1] && e[1] == edge[0])
            {
                Some(pos) => {
                    boundary.swap_remove(pos);
                }
                None => boundary.push(edge),
            }
        }
    }

    kept.extend(boundary.iter().map(|e| Triangle::new(e[0], e[1], i)));
    *triangles = kept;
}

/// Triangulates `points` and returns, for every point before the last, whether it
/// shares an edge with the last point.
fn query_adjacency(points: &[[f64; 2]]) -> Vec<bool> {
    let n = points.len();
    let k = n.saturating_sub(1);
    let mut adjacent = vec![false; k];
    if n < 3 {
        return adjacent;
    }

    // Centre on the query and normalise to unit half-width.
    let query = points[k];
    let half_width = points
        .iter()
        .filter(|p| p[0].is_finite() && p[1].is_finite())
        .map(|p| (p[0] - query[0]).abs().max((p[1] - query[1]).abs()))
        .fold(0.0_f64, f64::max);
    let scale = if half_width > 0.0 && half_width.is_finite() {
        half_width
    } else {
        1.0
    };

    let xy: Vec<[f64; 2]> = points
        .iter()
        .map(|p| [(p[0] - query[0]) / scale, (p[1] - query[1]) / scale])
        .collect();

    let mut order: Vec<usize> = Vec::with_capacity(n);
    for (i, p) in points.iter().enumerate() {
        if !(p[0].is_finite() && p[1].is_finite()) {
            continue;
        }
        // Exact duplicates add nothing to the triangulation.
        if order.iter().any(|&j| points[j] == *p) {
            continue;
        }
        order.push(i);
    }

    let Some(mut triangles) = seed_triangulation(&xy, &mut order) else {
        return adjacent;
    };
    for i in order {
        insert_vertex(&mut triangles, &xy, i);
    }

    for tri in triangles.iter().filter(|t| !t.is_ghost() && t.v.contains(&k)) {
        for v in tri.v {
            if v != k {
                adjacent[v] = true;
            }
        }
    }

    adjacent
}

/// Determines which of `neighbours` are Delaunay neighbours of `query`.
///
/// `neighbours` should be ordered closest first, since a degenerate
/// neighbourhood falls back to the first three positions. A neighbour that
/// coincides exactly with the query is always adjacent.
///
/// # Examples
///
/// ```
/// use ferreus_dnr::delaunay::delaunay_mask;
///
/// // The two far points are hidden behind the first two.
/// let neighbours = [[1.0, 0.0], [0.0, 1.0], [2.0, 2.5], [5.0, 5.0]];
/// let adjacency = delaunay_mask([0.0, 0.0], &neighbours);
///
/// assert_eq!(adjacency.mask, vec![true, true, false, false]);
/// assert!(!adjacency.degenerate);
/// ```
pub fn delaunay_mask(query: [f64; 2], neighbours: &[[f64; 2]]) -> Adjacency {
    let mut local: Vec<[f64; 2]> = Vec::with_capacity(neighbours.len() + 1);
    local.extend_from_slice(neighbours);
    local.push(query);

    let mut mask = query_adjacency(&local);

    let degenerate = !mask.iter().any(|&m| m);
    if degenerate {
        let n_forced = DEGENERATE_FALLBACK_NEIGHBORS.min(mask.len());
        mask[..n_forced].iter_mut().for_each(|m| *m = true);
    }

    for (m, nb) in mask.iter_mut().zip(neighbours) {
        if *nb == query {
            *m = true;
        }
    }

    Adjacency { mask, degenerate }
}

fn masks_for_range(
    queries: &[[f64; 2]],
    neighbour_sets: &[Vec<[f64; 2]>],
    offset: usize,
    sink: &Option<Arc<dyn ProgressSink>>,
) -> Vec<Vec<bool>> {
    queries
        .iter()
        .zip(neighbour_sets)
        .enumerate()
        .map(|(i, (query, neighbours))| {
            let adjacency = delaunay_mask(*query, neighbours);
            if adjacency.degenerate {
                emit(
                    sink,
                    ProgressMsg::DegenerateNeighbourhood {
                        query_index: offset + i,
                    },
                );
            }
            adjacency.mask
        })
        .collect()
}

/// Batched [`delaunay_mask`].
///
/// With `n_jobs = Some(n)` the rows are cut into `n` contiguous slices of
/// `len / n` rows (the last slice takes the remainder) which are processed in
/// parallel and concatenated in order, so the result is identical to the
/// sequential form. Degenerate rows are reported to `sink` as
/// [`ProgressMsg::DegenerateNeighbourhood`].
pub fn delaunay_masks(
    queries: &[[f64; 2]],
    neighbour_sets: &[Vec<[f64; 2]>],
    n_jobs: Option<usize>,
    sink: &Option<Arc<dyn ProgressSink>>,
) -> Vec<Vec<bool>> {
    let n_rows = queries.len().min(neighbour_sets.len());

    let n_jobs = match n_jobs {
        Some(n) if n > 1 => n,
        _ => return masks_for_range(&queries[..n_rows], &neighbour_sets[..n_rows], 0, sink),
    };

    let base = n_rows / n_jobs;
    let bounds: Vec<(usize, usize)> = (0..n_jobs)
        .map(|j| {
            let start = j * base;
            let end = if j + 1 == n_jobs { n_rows } else { start + base };
            (start, end)
        })
        .collect();

    bounds
        .par_iter()
        .map(|&(start, end)| {
            masks_for_range(
                &queries[start..end],
                &neighbour_sets[start..end],
                start,
                sink,
            )
        })
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect()
}
