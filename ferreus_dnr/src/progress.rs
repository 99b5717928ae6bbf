/////////////////////////////////////////////////////////////////////////////////////////////
//
// Defines progress and diagnostic messages, sinks, and helper functions for regressors.
//
// Created on: 17 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Progress reporting primitives for fitting, cross-validation and fusion.

use std::fmt::Debug;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;

/// Progress and diagnostic events emitted by regressors and fusion routines.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressMsg {
    /// The local triangulation around a query point gave it no Delaunay
    /// neighbour, so its closest neighbours were used instead.
    DegenerateNeighbourhood { query_index: usize },

    /// A cross-validation fold has been refit and predicted.
    FoldComplete { fold: usize, n_splits: usize },

    /// Iteration status of the ensemble least-squares solver.
    SolverIteration { iter: usize, residual: f64 },

    /// The ensemble least-squares solver stopped before reaching its tolerance.
    /// The partially optimised coefficients are still used.
    ConvergenceWarning { iterations: usize, residual: f64 },

    /// Arbitrary informational message.
    Message { message: String },
}

/// Sink that consumes progress messages.
pub trait ProgressSink: Send + Sync + Debug {
    fn emit(&self, msg: ProgressMsg);
}

/// Progress sink that forwards messages over a channel.
#[derive(Debug)]
pub struct ClosureSink {
    tx: mpsc::SyncSender<ProgressMsg>,
}

impl ProgressSink for ClosureSink {
    #[inline]
    fn emit(&self, msg: ProgressMsg) {
        let _ = self.tx.try_send(msg);
    }
}

/// Spawns a listener thread that runs a handler closure for each progress message.
///
/// The listener exits once every clone of the returned sink has been dropped.
pub fn closure_sink<F>(
    buffer: usize,
    mut handler: F,
) -> (Arc<dyn ProgressSink>, thread::JoinHandle<()>)
where
    F: FnMut(ProgressMsg) + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel::<ProgressMsg>(buffer.max(1));
    let sink: Arc<dyn ProgressSink> = Arc::new(ClosureSink { tx });

    let handle = thread::spawn(move || {
        while let Ok(msg) = rx.recv() {
            handler(msg);
        }
    });

    (sink, handle)
}

/// Sink that keeps every message in memory, in emission order.
///
/// Handy for inspecting diagnostics after a batch prediction.
#[derive(Debug, Default)]
pub struct CollectingSink {
    messages: Mutex<Vec<ProgressMsg>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns a copy of the messages received so far.
    pub fn messages(&self) -> Vec<ProgressMsg> {
        match self.messages.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ProgressSink for CollectingSink {
    fn emit(&self, msg: ProgressMsg) {
        match self.messages.lock() {
            Ok(mut guard) => guard.push(msg),
            Err(poisoned) => poisoned.into_inner().push(msg),
        }
    }
}

/// Forwards `msg` to `sink` when one is attached.
#[inline]
pub(crate) fn emit(sink: &Option<Arc<dyn ProgressSink>>, msg: ProgressMsg) {
    if let Some(sink) = sink {
        sink.emit(msg);
    }
}
