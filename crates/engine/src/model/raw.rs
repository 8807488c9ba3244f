//! Untyped tabular input handed over by storage collaborators

use sinf_common::errors::{InfluenceError, Result};
use std::str::FromStr;

/// Header plus string cells, as read from CSV or any other row source.
///
/// Row numbers in errors are 1-based data rows (the header is not counted).
#[derive(Debug, Clone)]
pub struct RawTable {
    name: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            headers: headers.into_iter().map(|h| h.trim().to_string()).collect(),
            rows,
        }
    }

    /// Table name used in error messages
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a required column
    pub fn column(&self, name: &str) -> Result<usize> {
        self.find_column(name)
            .ok_or_else(|| InfluenceError::schema(&self.name, name))
    }

    /// Index of an optional column
    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Raw cell text; a short row is reported as an invalid record
    pub fn cell(&self, row: usize, column: usize) -> Result<&str> {
        self.rows[row]
            .get(column)
            .map(|s| s.as_str())
            .ok_or_else(|| {
                InfluenceError::invalid_record(
                    &self.name,
                    row + 1,
                    format!("expected at least {} fields", column + 1),
                )
            })
    }

    /// Parse a cell into `T`
    pub fn parse<T: FromStr>(&self, row: usize, column: usize) -> Result<T> {
        let text = self.cell(row, column)?.trim();
        text.parse::<T>().map_err(|_| {
            InfluenceError::invalid_record(
                &self.name,
                row + 1,
                format!("cannot parse '{}' in column '{}'", text, self.headers[column]),
            )
        })
    }

    /// Parse a cell as a finite float
    pub fn parse_finite(&self, row: usize, column: usize) -> Result<f64> {
        let value: f64 = self.parse(row, column)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(InfluenceError::invalid_record(
                &self.name,
                row + 1,
                format!("non-finite value in column '{}'", self.headers[column]),
            ))
        }
    }
}
