/////////////////////////////////////////////////////////////////////////////////////////////
//
// Supplies general-purpose utilities for row selection, sorting, and extents of point sets.
//
// Created on: 17 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use faer::Mat;

/// Returns an owned `Mat<T>` from a subset of row indices.
///
/// # Examples
///
/// ```
/// use faer::mat;
/// use ferreus_dnr_utils::select_mat_rows;
///
/// let matrix = mat![
///     [0.0, 1.0],
///     [1.0, 1.0],
///     [2.0, 2.0],
///     [3.0, 3.0f64],
/// ];
///
/// let sub_matrix = select_mat_rows(&matrix, &[0usize, 2]);
///
/// assert_eq!(
///     sub_matrix,
///     mat![
///         [0.0, 1.0],
///         [2.0, 2.0f64],
///     ]
/// );
/// ```
#[inline(always)]
pub fn select_mat_rows<T>(existing_mat: &Mat<T>, row_indices: &[usize]) -> Mat<T>
where
    T: Clone,
{
    Mat::from_fn(row_indices.len(), existing_mat.ncols(), |i, j| {
        existing_mat.get(row_indices[i], j).clone()
    })
}

/// Returns the elements of `data` at `indices`, in index order.
///
/// # Examples
///
/// ```
/// use ferreus_dnr_utils::select_rows;
///
/// let labels = vec!["a", "b", "c"];
/// assert_eq!(select_rows(&labels, &[2, 0]), vec!["c", "a"]);
/// ```
#[inline(always)]
pub fn select_rows<T: Clone>(data: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&i| data[i].clone()).collect()
}

/// Returns the indices that would sort the input slice.
///
/// Incomparable values (NaN) compare as equal, so they keep their relative order.
///
/// # Examples
///
/// ```
/// use ferreus_dnr_utils::argsort;
///
/// let data = [30, 10, 20];
///
/// let sorted_indices = argsort(&data);
///
/// assert_eq!(sorted_indices, vec![1, 2, 0]);
/// ```
#[inline(always)]
pub fn argsort<T: PartialOrd>(data: &[T]) -> Vec<usize> {
    let mut indices = (0..data.len()).collect::<Vec<_>>();
    indices.sort_by(|&i, &j| {
        data[i]
            .partial_cmp(&data[j])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    indices
}

/// Minimum of the non-NaN values, or NaN when there are none.
///
/// # Examples
///
/// ```
/// use ferreus_dnr_utils::nan_min;
///
/// assert_eq!(nan_min(&[3.0, f64::NAN, 1.5]), 1.5);
/// assert!(nan_min(&[f64::NAN]).is_nan());
/// ```
#[inline(always)]
pub fn nan_min(data: &[f64]) -> f64 {
    data.iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f64::NAN, |acc, v| if acc.is_nan() || v < acc { v } else { acc })
}

/// Computes the axis aligned bounding box (AABB) extents of a matrix of points.
///
/// Returns a flat vector containing the minimum and maximum values along each column (dimension)
/// of the input matrix. The result is arranged as:
///
/// `[min_0, min_1, ..., min_n, max_0, max_1, ..., max_n]`
///
/// where `n` is the number of columns in the matrix. An empty matrix yields an
/// empty vector.
///
/// # Examples
///
/// ```
/// use faer::mat;
/// use ferreus_dnr_utils::get_pointarray_extents;
///
/// let points = mat![
///     [1.0, 2.0],
///     [3.0, -1.0],
///     [0.5, 4.0f64]
/// ];
/// let extents = get_pointarray_extents(&points);
/// assert_eq!(extents, vec![0.5, -1.0, 3.0, 4.0]);
/// ```
pub fn get_pointarray_extents(points: &Mat<f64>) -> Vec<f64> {
    let ncols = points.ncols();
    if points.nrows() == 0 {
        return Vec::new();
    }

    // The first half of the vector stores mins, the second half stores maxs.
    let mut extents = vec![0.0; 2 * ncols];
    for col in 0..ncols {
        extents[col] = points[(0, col)];
        extents[col + ncols] = points[(0, col)];
    }

    for row in 0..points.nrows() {
        for col in 0..ncols {
            let item = points[(row, col)];
            if item < extents[col] {
                extents[col] = item;
            }
            if item > extents[col + ncols] {
                extents[col + ncols] = item;
            }
        }
    }

    extents
}
