/////////////////////////////////////////////////////////////////////////////////////////////
//
// Provides k-fold splitting and out-of-fold prediction for neighbour regressors.
//
// Created on: 17 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! K-fold cross-validation.
//!
//! Folds are run one after another; each fold refits a clone of the regressor
//! on the remaining rows and its predictions are written back by row index.

use crate::{
    error::{DnrError, Result},
    progress::{emit, ProgressMsg, ProgressSink},
    regressor::{NeighborsRegressor, TrainingData},
};
use faer::Mat;
use ferreus_dnr_utils::{DEFAULT_N_SPLITS, DEFAULT_RANDOM_STATE};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// K-fold splitter.
///
/// The first `n % n_splits` folds hold one extra row. With `shuffle` the row
/// order is permuted with a generator seeded from `seed` before splitting.
///
/// ### Default Values
/// - `n_splits`: `5`
/// - `shuffle`: `true`
/// - `seed`: `42`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KFold {
    pub n_splits: usize,
    pub shuffle: bool,
    pub seed: u64,
}

impl Default for KFold {
    fn default() -> Self {
        KFold {
            n_splits: DEFAULT_N_SPLITS,
            shuffle: true,
            seed: DEFAULT_RANDOM_STATE,
        }
    }
}

/// Training and held-out row indices of one fold.
#[derive(Clone, Debug, PartialEq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl KFold {
    /// Shuffled k-fold with the default seed.
    pub fn new(n_splits: usize) -> Self {
        KFold {
            n_splits,
            ..KFold::default()
        }
    }

    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Splits `n` rows into folds.
    ///
    /// Training indices are ascending; held-out indices follow the (possibly
    /// shuffled) row order.
    pub fn split(&self, n: usize) -> Result<Vec<Fold>> {
        if self.n_splits < 2 {
            return Err(DnrError::invalid(format!(
                "k-fold needs at least 2 splits, got {}",
                self.n_splits
            )));
        }
        if self.n_splits > n {
            return Err(DnrError::invalid(format!(
                "cannot split {n} rows into {} folds",
                self.n_splits
            )));
        }

        let mut order: Vec<usize> = (0..n).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.seed);
            order.shuffle(&mut rng);
        }

        let base = n / self.n_splits;
        let extra = n % self.n_splits;

        let mut folds = Vec::with_capacity(self.n_splits);
        let mut start = 0;
        for f in 0..self.n_splits {
            let size = base + usize::from(f < extra);
            let test = order[start..start + size].to_vec();

            let mut held_out = vec![false; n];
            test.iter().for_each(|&i| held_out[i] = true);
            let train = (0..n).filter(|&i| !held_out[i]).collect();

            folds.push(Fold { train, test });
            start += size;
        }
        Ok(folds)
    }
}

/// Out-of-fold results of [`cross_val_predict`], one entry per input row.
#[derive(Clone, Debug, PartialEq)]
pub struct CrossValidation {
    /// Prediction of each row by the fold that held it out.
    pub predictions: Mat<f64>,

    /// Fold that held out each row.
    pub fold: Vec<usize>,

    /// Distance from each row to the closest training point of its fold.
    pub nearest_distance: Vec<f64>,
}

/// Predicts every row of `data` with a clone of `regressor` fitted on the
/// other folds.
///
/// A [`ProgressMsg::FoldComplete`] is emitted after each fold.
pub fn cross_val_predict<R: NeighborsRegressor>(
    regressor: &R,
    data: &TrainingData,
    kfold: &KFold,
    progress_callback: &Option<Arc<dyn ProgressSink>>,
) -> Result<CrossValidation> {
    let n = data.nrows();
    let folds = kfold.split(n)?;

    let mut predictions: Option<Mat<f64>> = None;
    let mut fold_of = vec![0usize; n];
    let mut nearest_distance = vec![f64::NAN; n];

    for (f, Fold { train, test }) in folds.iter().enumerate() {
        let mut model = regressor.clone();
        model.fit_training(&data.subset(train))?;

        let held_out = data.subset(test);
        let predicted = model.predict(&held_out.points)?;
        let distances = model.nearest_distance(&held_out.points)?;

        let out = predictions
            .get_or_insert_with(|| Mat::from_fn(n, predicted.ncols(), |_, _| f64::NAN));
        for (r, &row) in test.iter().enumerate() {
            for j in 0..predicted.ncols().min(out.ncols()) {
                out[(row, j)] = predicted[(r, j)];
            }
            fold_of[row] = f;
            nearest_distance[row] = distances[r];
        }

        emit(
            progress_callback,
            ProgressMsg::FoldComplete {
                fold: f,
                n_splits: folds.len(),
            },
        );
    }

    Ok(CrossValidation {
        predictions: predictions.unwrap_or_else(|| Mat::zeros(n, 0)),
        fold: fold_of,
        nearest_distance,
    })
}
