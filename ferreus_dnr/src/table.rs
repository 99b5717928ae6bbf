/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements a named-column table with CSV input and output for observations and targets.
//
// Created on: 17 Oct 2026     Author: Daniel Owen
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Column-oriented tables.
//!
//! A [`Table`] holds ordered, equal-length columns that are either numeric
//! (`f64`, NaN for missing) or text (group labels, site names). Observation
//! and target tables used by [`crate::driver::fuse`] are both `Table`s.

use crate::{
    error::{DnrError, Result, TableIOError},
    regressor::TrainingData,
};
use faer::Mat;
use std::path::Path;

/// Values of a single column.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn select(&self, rows: &[usize]) -> Column {
        match self {
            Column::Numeric(v) => Column::Numeric(rows.iter().map(|&i| v[i]).collect()),
            Column::Text(v) => Column::Text(rows.iter().map(|&i| v[i].clone()).collect()),
        }
    }
}

/// Ordered named columns of equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<(String, Column)>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a numeric table from the columns of `mat`.
    pub fn from_mat(keys: &[&str], mat: &Mat<f64>) -> Result<Self> {
        if keys.len() != mat.ncols() {
            return Err(DnrError::invalid(format!(
                "{} column names supplied for {} columns",
                keys.len(),
                mat.ncols()
            )));
        }
        let mut table = Table::new();
        for (j, key) in keys.iter().enumerate() {
            table.insert_column(key, mat.col(j).iter().copied().collect())?;
        }
        Ok(table)
    }

    /// Number of rows, zero for a table without columns.
    pub fn nrows(&self) -> usize {
        self.columns.first().map_or(0, |(_, c)| c.len())
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.columns.iter().position(|(k, _)| k == key)
    }

    fn get(&self, key: &str) -> Result<&Column> {
        self.position(key)
            .map(|p| &self.columns[p].1)
            .ok_or_else(|| DnrError::invalid(format!("table has no column `{key}`")))
    }

    /// Numeric column `key`.
    pub fn column(&self, key: &str) -> Result<&[f64]> {
        match self.get(key)? {
            Column::Numeric(v) => Ok(v),
            Column::Text(_) => Err(DnrError::invalid(format!("column `{key}` is not numeric"))),
        }
    }

    /// Text column `key`; numeric columns are formatted.
    pub fn text_column(&self, key: &str) -> Result<Vec<String>> {
        match self.get(key)? {
            Column::Text(v) => Ok(v.clone()),
            Column::Numeric(v) => Ok(v.iter().map(|x| x.to_string()).collect()),
        }
    }

    fn insert(&mut self, key: &str, column: Column) -> Result<()> {
        if !self.columns.is_empty() && column.len() != self.nrows() {
            return Err(DnrError::invalid(format!(
                "column `{key}` has {} rows but the table has {}",
                column.len(),
                self.nrows()
            )));
        }
        match self.position(key) {
            Some(p) => self.columns[p].1 = column,
            None => self.columns.push((key.to_string(), column)),
        }
        Ok(())
    }

    /// Adds a numeric column, replacing any column of the same name in place.
    pub fn insert_column(&mut self, key: &str, values: Vec<f64>) -> Result<()> {
        self.insert(key, Column::Numeric(values))
    }

    /// Adds a text column, replacing any column of the same name in place.
    pub fn insert_text_column(&mut self, key: &str, values: Vec<String>) -> Result<()> {
        self.insert(key, Column::Text(values))
    }

    /// Adds every column of `other`.
    pub fn extend(&mut self, other: Table) -> Result<()> {
        for (key, column) in other.columns {
            self.insert(&key, column)?;
        }
        Ok(())
    }

    /// Table holding only `rows`, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Table {
        Table {
            columns: self
                .columns
                .iter()
                .map(|(k, c)| (k.clone(), c.select(rows)))
                .collect(),
        }
    }

    /// Numeric columns `keys` as a matrix, one column per key.
    pub fn to_mat(&self, keys: &[&str]) -> Result<Mat<f64>> {
        let cols = keys
            .iter()
            .map(|k| self.column(k))
            .collect::<Result<Vec<_>>>()?;
        Ok(Mat::from_fn(self.nrows(), cols.len(), |i, j| cols[j][i]))
    }

    /// Builds training data from coordinate and value columns.
    ///
    /// Rows with a NaN coordinate, value or weight are dropped.
    pub fn training_data(
        &self,
        x_keys: &[&str],
        y_keys: &[&str],
        weight_key: Option<&str>,
        group_key: Option<&str>,
    ) -> Result<TrainingData> {
        let keep: Vec<usize> = match weight_key {
            Some(k) => {
                let w = self.column(k)?;
                (0..self.nrows()).filter(|&i| !w[i].is_nan()).collect()
            }
            None => (0..self.nrows()).collect(),
        };
        let rows = self.select_rows(&keep);

        let mut data = TrainingData::new(rows.to_mat(x_keys)?, rows.to_mat(y_keys)?)?;
        if let Some(k) = weight_key {
            data = data.with_sample_weight(rows.column(k)?.to_vec())?;
        }
        if let Some(k) = group_key {
            data = data.with_groups(rows.text_column(k)?)?;
        }
        Ok(data.retain_valid())
    }

    /// Reads a CSV file with a header row.
    ///
    /// Empty cells and `nan` parse as NaN. A column with any other
    /// non-numeric cell is read as text.
    pub fn read_csv<P: AsRef<Path>>(path: P) -> std::result::Result<Self, TableIOError> {
        let path_ref = path.as_ref();
        let csv_err = |source: csv::Error| TableIOError::Csv {
            path: path_ref.to_path_buf(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path_ref)
            .map_err(csv_err)?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(csv_err)?
            .iter()
            .map(str::to_string)
            .collect();

        let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for (r, record) in reader.records().enumerate() {
            let record = record.map_err(csv_err)?;
            if record.len() != headers.len() {
                return Err(TableIOError::Shape {
                    path: path_ref.to_path_buf(),
                    line: record.position().map_or(r + 2, |p| p.line() as usize),
                    expected: headers.len(),
                    found: record.len(),
                });
            }
            for (j, field) in record.iter().enumerate() {
                cells[j].push(field.to_string());
            }
        }

        let columns = headers
            .into_iter()
            .zip(cells)
            .map(|(key, raw)| {
                let parsed: Option<Vec<f64>> = raw.iter().map(|s| parse_cell(s)).collect();
                let column = match parsed {
                    Some(values) => Column::Numeric(values),
                    None => Column::Text(raw),
                };
                (key, column)
            })
            .collect();
        Ok(Table { columns })
    }

    /// Writes the table as CSV with a header row; NaN is written as an empty cell.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> std::result::Result<(), TableIOError> {
        let path_ref = path.as_ref();
        let csv_err = |source: csv::Error| TableIOError::Csv {
            path: path_ref.to_path_buf(),
            source,
        };

        let mut writer = csv::Writer::from_path(path_ref).map_err(csv_err)?;
        writer
            .write_record(self.columns.iter().map(|(k, _)| k.as_str()))
            .map_err(csv_err)?;

        for i in 0..self.nrows() {
            let row = self.columns.iter().map(|(_, c)| match c {
                Column::Numeric(v) if v[i].is_nan() => String::new(),
                Column::Numeric(v) => v[i].to_string(),
                Column::Text(v) => v[i].clone(),
            });
            writer.write_record(row).map_err(csv_err)?;
        }
        writer.flush().map_err(|e| csv_err(e.into()))?;
        Ok(())
    }
}

fn parse_cell(cell: &str) -> Option<f64> {
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        Some(f64::NAN)
    } else {
        cell.parse::<f64>().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faer::mat;
    use std::fs;

    fn observations() -> Table {
        let mut table = Table::new();
        table.insert_column("x", vec![0.0, 1.0, 0.0, 1.0]).unwrap();
        table.insert_column("y", vec![0.0, 0.0, 1.0, 1.0]).unwrap();
        table.insert_column("obs", vec![5.0, f64::NAN, 7.0, 9.0]).unwrap();
        table
            .insert_column("sample_weight", vec![1.0, 1.0, f64::NAN, 2.0])
            .unwrap();
        table
            .insert_text_column("groups", vec!["a".into(), "b".into(), "a".into(), "b".into()])
            .unwrap();
        table
    }

    #[test]
    fn columns_keep_insertion_order_and_replace_in_place() {
        let mut table = observations();
        table.insert_column("x", vec![2.0; 4]).unwrap();
        assert_eq!(
            table.column_names(),
            vec!["x", "y", "obs", "sample_weight", "groups"]
        );
        assert_eq!(table.column("x").unwrap(), &[2.0; 4]);
        assert!(matches!(
            table.insert_column("z", vec![1.0]),
            Err(DnrError::InvalidInput { .. })
        ));
        assert!(matches!(table.column("groups"), Err(DnrError::InvalidInput { .. })));
        assert!(matches!(table.column("nope"), Err(DnrError::InvalidInput { .. })));
    }

    #[test]
    fn training_data_drops_incomplete_rows() {
        let data = observations()
            .training_data(&["x", "y"], &["obs"], Some("sample_weight"), Some("groups"))
            .unwrap();
        assert_eq!(data.nrows(), 2);
        assert_eq!(data.values, mat![[5.0], [9.0f64]]);
        assert_eq!(data.sample_weight, Some(vec![1.0, 2.0]));
        assert_eq!(data.groups, Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn rows_are_only_dropped_for_the_weight_column_in_use() {
        let data = observations()
            .training_data(&["x", "y"], &["obs"], None, Some("groups"))
            .unwrap();
        assert_eq!(data.nrows(), 3);
        assert_eq!(data.values, mat![[5.0], [7.0], [9.0f64]]);
        assert_eq!(
            data.groups,
            Some(vec!["a".to_string(), "a".to_string(), "b".to_string()])
        );
        assert_eq!(data.sample_weight, None);
    }

    #[test]
    fn csv_round_trip_preserves_nan_and_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obs.csv");
        let table = observations();
        table.write_csv(&path).unwrap();

        let loaded = Table::read_csv(&path).unwrap();
        assert_eq!(loaded.column_names(), table.column_names());
        assert!(loaded.column("obs").unwrap()[1].is_nan());
        assert_eq!(loaded.column("obs").unwrap()[3], 9.0);
        assert_eq!(loaded.text_column("groups").unwrap(), table.text_column("groups").unwrap());
    }

    #[test]
    fn ragged_csv_reports_the_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ragged.csv");
        fs::write(&path, "x,y,obs\n0,0,1\n1,1\n").unwrap();
        assert!(matches!(
            Table::read_csv(&path),
            Err(TableIOError::Shape { line: 3, expected: 3, found: 2, .. })
        ));
        assert!(matches!(
            Table::read_csv(dir.path().join("missing.csv")),
            Err(TableIOError::Csv { .. })
        ));
    }

    #[test]
    fn matrices_convert_both_ways() {
        let m = mat![[1.0, 2.0], [3.0, 4.0f64]];
        let table = Table::from_mat(&["a", "b"], &m).unwrap();
        assert_eq!(table.to_mat(&["b", "a"]).unwrap(), mat![[2.0, 1.0], [4.0, 3.0f64]]);
        assert_eq!(table.select_rows(&[1]).column("a").unwrap(), &[3.0]);
    }
}
