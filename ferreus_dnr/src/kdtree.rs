/////////////////////////////////////////////////////////////////////////////////////////////
//
// Provides a simple KD-tree implementation for k-nearest-neighbour queries over observations.
//
// Created on: 17 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use faer::Mat;
use ferreus_dnr_utils::{chebyshev_distance, euclidean_distance, manhattan_distance, minkowski_distance};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Distance used to rank neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DistanceMetric {
    Euclidean,
    Manhattan,
    Chebyshev,
    /// Minkowski distance of order `p >= 1`.
    Minkowski { p: f64 },
}

impl Default for DistanceMetric {
    fn default() -> Self {
        DistanceMetric::Euclidean
    }
}

impl DistanceMetric {
    #[inline]
    pub fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            DistanceMetric::Euclidean => euclidean_distance(a, b),
            DistanceMetric::Manhattan => manhattan_distance(a, b),
            DistanceMetric::Chebyshev => chebyshev_distance(a, b),
            DistanceMetric::Minkowski { p } => minkowski_distance(a, b, *p),
        }
    }
}

// A single point together with its row in the source matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct PointRowWithId {
    pub coords: Vec<f64>,
    pub id: usize,
}

impl PointRowWithId {
    pub fn from_mat_row(points: &Mat<f64>, row: usize) -> Self {
        Self {
            coords: (0..points.ncols()).map(|j| points[(row, j)]).collect(),
            id: row,
        }
    }
}

/// A node in the KDTree
#[derive(Debug, Clone)]
struct Node {
    point: PointRowWithId,
    left: Option<usize>,
    right: Option<usize>,
}

#[derive(Debug, PartialEq)]
struct Neighbour {
    distance: f64,
    id: usize,
}

impl Eq for Neighbour {}

impl PartialOrd for Neighbour {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbour {
    // Max-heap on distance so the current worst candidate sits on top.
    // Equal distances are ordered by row id.
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.id.cmp(&other.id))
    }
}

/// Neighbour lists for a batch of query points, closest first.
///
/// Every row holds the same number of entries: `min(k, n_points)`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Neighbours {
    pub indices: Vec<Vec<usize>>,
    pub distances: Vec<Vec<f64>>,
}

impl Neighbours {
    /// Number of query rows.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// The KDTree structure
#[derive(Debug, Clone)]
pub struct KDTree {
    nodes: Vec<Node>,
    dimensions: usize,
}

impl KDTree {
    /// Constructs a new KDTree from a Mat of points.
    pub fn new(points: &Mat<f64>) -> Self {
        let mut rows: Vec<PointRowWithId> = (0..points.nrows())
            .map(|i| PointRowWithId::from_mat_row(points, i))
            .collect();

        let mut tree = KDTree {
            nodes: Vec::with_capacity(rows.len()),
            dimensions: points.ncols(),
        };
        tree.build_tree(&mut rows, 0);
        tree
    }

    /// Number of points stored in the tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Recursively builds the KDTree and stores nodes in a flat vector.
    fn build_tree(&mut self, points: &mut [PointRowWithId], depth: usize) -> Option<usize> {
        if points.is_empty() {
            return None;
        }

        let axis = depth % self.dimensions.max(1);

        points.sort_by(|a, b| a.coords[axis].total_cmp(&b.coords[axis]));

        let mid = points.len() / 2;

        let node_index = self.nodes.len();
        self.nodes.push(Node {
            point: points[mid].clone(),
            left: None,
            right: None,
        });

        let (lower, upper) = points.split_at_mut(mid);
        self.nodes[node_index].left = self.build_tree(lower, depth + 1);
        self.nodes[node_index].right = self.build_tree(&mut upper[1..], depth + 1);

        Some(node_index)
    }

    fn axis_diff_ok(diff: f64, best_radius: f64) -> bool {
        // |diff| <= radius ⇒ the search ball intersects the splitting plane
        diff.abs() <= best_radius
    }

    /// Returns up to `k` `(row id, distance)` pairs, closest first.
    pub fn k_nearest_neighbors(
        &self,
        target: &[f64],
        k: usize,
        metric: DistanceMetric,
    ) -> Vec<(usize, f64)> {
        if k == 0 || self.nodes.is_empty() {
            return Vec::new();
        }
        let mut heap = BinaryHeap::with_capacity(k + 1);
        self.k_nearest_impl(0, target, k, 0, metric, &mut heap);

        heap.into_sorted_vec()
            .into_iter()
            .map(|n| (n.id, n.distance))
            .collect()
    }

    /// Batched [`KDTree::k_nearest_neighbors`] over the rows of `query_points`.
    pub fn k_nearest_neighbors_batch(
        &self,
        query_points: &Mat<f64>,
        k: usize,
        metric: DistanceMetric,
    ) -> Neighbours {
        let num_queries = query_points.nrows();
        let mut neighbours = Neighbours {
            indices: Vec::with_capacity(num_queries),
            distances: Vec::with_capacity(num_queries),
        };

        let mut query = vec![0.0; query_points.ncols()];
        for i in 0..num_queries {
            for (j, q) in query.iter_mut().enumerate() {
                *q = query_points[(i, j)];
            }
            let (ids, dists): (Vec<usize>, Vec<f64>) =
                self.k_nearest_neighbors(&query, k, metric).into_iter().unzip();
            neighbours.indices.push(ids);
            neighbours.distances.push(dists);
        }
        neighbours
    }

    fn k_nearest_impl(
        &self,
        node_index: usize,
        target: &[f64],
        k: usize,
        depth: usize,
        metric: DistanceMetric,
        heap: &mut BinaryHeap<Neighbour>,
    ) {
        let node = &self.nodes[node_index];
        let candidate = Neighbour {
            distance: metric.distance(target, &node.point.coords),
            id: node.point.id,
        };

        if heap.len() < k {
            heap.push(candidate);
        } else if heap.peek().is_some_and(|worst| candidate < *worst) {
            heap.pop();
            heap.push(candidate);
        }

        let axis = depth % self.dimensions.max(1);
        let diff = target[axis] - node.point.coords[axis];

        let (near_idx, far_idx) = if diff < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        if let Some(near) = near_idx {
            self.k_nearest_impl(near, target, k, depth + 1, metric, heap);
        }

        if let Some(far) = far_idx {
            let visit_far = match heap.peek() {
                Some(worst) => heap.len() < k || Self::axis_diff_ok(diff, worst.distance),
                None => true,
            };
            if visit_far {
                self.k_nearest_impl(far, target, k, depth + 1, metric, heap);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferreus_dnr_utils::argsort;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_points(n: usize, dim: usize, seed: u64) -> Mat<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        Mat::from_fn(n, dim, |_, _| rng.random_range(0.0..1.0))
    }

    fn brute_force_knn(
        points: &Mat<f64>,
        target: &[f64],
        k: usize,
        metric: DistanceMetric,
    ) -> Vec<f64> {
        let dists: Vec<f64> = (0..points.nrows())
            .map(|i| {
                let p = PointRowWithId::from_mat_row(points, i);
                metric.distance(target, &p.coords)
            })
            .collect();
        argsort(&dists).into_iter().take(k).map(|i| dists[i]).collect()
    }

    #[test]
    fn knn_matches_bruteforce_for_all_metrics() {
        let metrics = [
            DistanceMetric::Euclidean,
            DistanceMetric::Manhattan,
            DistanceMetric::Chebyshev,
            DistanceMetric::Minkowski { p: 3.0 },
        ];
        for (n, seed) in [(50usize, 1u64), (300, 2), (1000, 3)] {
            let points = random_points(n, 2, seed);
            let tree = KDTree::new(&points);
            let mut rng = StdRng::seed_from_u64(seed + 100);

            for _ in 0..20 {
                let target = [rng.random_range(-0.2..1.2), rng.random_range(-0.2..1.2)];
                let k = rng.random_range(1..12);
                for metric in metrics {
                    let got: Vec<f64> = tree
                        .k_nearest_neighbors(&target, k, metric)
                        .into_iter()
                        .map(|(_, d)| d)
                        .collect();
                    let expected = brute_force_knn(&points, &target, k, metric);
                    assert_eq!(got.len(), expected.len());
                    for (g, e) in got.iter().zip(expected.iter()) {
                        assert!((g - e).abs() < 1e-12, "{metric:?}: {g} != {e}");
                    }
                }
            }
        }
    }

    #[test]
    fn results_are_sorted_closest_first() {
        let points = random_points(200, 2, 9);
        let tree = KDTree::new(&points);
        let result = tree.k_nearest_neighbors(&[0.5, 0.5], 15, DistanceMetric::Euclidean);
        assert_eq!(result.len(), 15);
        assert!(result.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn k_larger_than_tree_is_clamped() {
        let points = random_points(4, 2, 5);
        let tree = KDTree::new(&points);
        let result = tree.k_nearest_neighbors(&[0.1, 0.1], 10, DistanceMetric::Euclidean);
        assert_eq!(result.len(), 4);
        let mut ids: Vec<usize> = result.iter().map(|(i, _)| *i).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn empty_tree_returns_empty() {
        let points = Mat::<f64>::zeros(0, 2);
        let tree = KDTree::new(&points);
        assert!(tree.is_empty());
        assert!(tree
            .k_nearest_neighbors(&[0.0, 0.0], 3, DistanceMetric::Euclidean)
            .is_empty());
    }

    #[test]
    fn duplicates_are_all_returned_at_zero_distance() {
        let mut points = Mat::<f64>::zeros(3, 2);
        points[(0, 0)] = 0.3;
        points[(0, 1)] = 0.7;
        points[(1, 0)] = 0.3;
        points[(1, 1)] = 0.7;
        points[(2, 0)] = 0.9;
        points[(2, 1)] = 0.9;

        let tree = KDTree::new(&points);
        let result = tree.k_nearest_neighbors(&[0.3, 0.7], 2, DistanceMetric::Euclidean);
        assert_eq!(result, vec![(0, 0.0), (1, 0.0)]);
    }

    #[test]
    fn batch_rows_match_single_queries() {
        let points = random_points(120, 2, 21);
        let queries = random_points(10, 2, 22);
        let tree = KDTree::new(&points);
        let batch = tree.k_nearest_neighbors_batch(&queries, 6, DistanceMetric::Euclidean);
        assert_eq!(batch.len(), 10);
        for i in 0..10 {
            let single = tree.k_nearest_neighbors(
                &[queries[(i, 0)], queries[(i, 1)]],
                6,
                DistanceMetric::Euclidean,
            );
            let ids: Vec<usize> = single.iter().map(|(id, _)| *id).collect();
            assert_eq!(batch.indices[i], ids);
        }
    }
}
