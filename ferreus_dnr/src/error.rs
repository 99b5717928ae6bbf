/////////////////////////////////////////////////////////////////////////////////////////////
//
// Declares the error types returned by regressors, configuration files, and table I/O.
//
// Created on: 17 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Error types.
//!
//! Invalid user input is always reported as a [`DnrError`]; numerical
//! conditions such as a zero weight sum are not errors and surface as NaN in
//! the returned predictions.

use std::{
    error::Error,
    fmt, io,
    path::PathBuf,
};

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DnrError>;

/// Errors raised by the regression and fusion routines.
#[derive(Debug)]
pub enum DnrError {
    /// Inputs are inconsistent or an option is not recognised.
    InvalidInput { reason: String },

    /// A query operation was attempted before `fit`.
    NotFitted { operation: &'static str },
}

impl DnrError {
    pub(crate) fn invalid<S: Into<String>>(reason: S) -> Self {
        DnrError::InvalidInput {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for DnrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DnrError::InvalidInput { reason } => write!(f, "invalid input: {reason}"),
            DnrError::NotFitted { operation } => {
                write!(f, "regressor must be fitted before calling `{operation}`")
            }
        }
    }
}

impl Error for DnrError {}

/// Errors that can occur when saving or loading a [`crate::config::FusionConfig`].
#[derive(Debug)]
pub enum ConfigIOError {
    /// Failed to create the output file.
    Create { path: PathBuf, source: io::Error },
    /// Failed to open the input file.
    Open { path: PathBuf, source: io::Error },
    /// Failed to flush buffered output to disk.
    Flush { path: PathBuf, source: io::Error },
    /// Error serializing the configuration to JSON.
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// Error parsing JSON when reading a configuration from disk.
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl fmt::Display for ConfigIOError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigIOError::Create { path, source } => {
                write!(f, "failed to create {}: {}", path.display(), source)
            }
            ConfigIOError::Open { path, source } => {
                write!(f, "failed to open {}: {}", path.display(), source)
            }
            ConfigIOError::Flush { path, source } => {
                write!(f, "failed to flush {}: {}", path.display(), source)
            }
            ConfigIOError::Serialize { path, source } => {
                write!(f, "failed to serialize config to {}: {}", path.display(), source)
            }
            ConfigIOError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
        }
    }
}

impl Error for ConfigIOError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigIOError::Create { source, .. }
            | ConfigIOError::Open { source, .. }
            | ConfigIOError::Flush { source, .. } => Some(source),
            ConfigIOError::Serialize { source, .. } | ConfigIOError::Parse { source, .. } => {
                Some(source)
            }
        }
    }
}

/// Errors that can occur when reading or writing a [`crate::table::Table`] as CSV.
#[derive(Debug)]
pub enum TableIOError {
    /// Failed to read or write the CSV stream.
    Csv { path: PathBuf, source: csv::Error },
    /// A record has a different number of fields to the header.
    Shape {
        path: PathBuf,
        line: usize,
        expected: usize,
        found: usize,
    },
}

impl fmt::Display for TableIOError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableIOError::Csv { path, source } => {
                write!(f, "csv error in {}: {}", path.display(), source)
            }
            TableIOError::Shape {
                path,
                line,
                expected,
                found,
            } => write!(
                f,
                "{} line {}: expected {} fields, found {}",
                path.display(),
                line,
                expected,
                found
            ),
        }
    }
}

impl Error for TableIOError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TableIOError::Csv { source, .. } => Some(source),
            TableIOError::Shape { .. } => None,
        }
    }
}
