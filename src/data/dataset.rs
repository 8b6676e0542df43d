//! In-memory tabular dataset used as input to every analysis.

use crate::error::{ExperimentError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::path::Path;

/// A cell value that can be categorical, continuous, or missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Variable {
    /// Categorical value with a string level.
    Categorical(String),
    /// Continuous numeric value.
    Continuous(f64),
    /// Missing value.
    Missing,
}

impl Variable {
    /// Check if this is a missing value.
    pub fn is_missing(&self) -> bool {
        matches!(self, Variable::Missing)
    }

    /// Try to get as categorical string.
    pub fn as_categorical(&self) -> Option<&str> {
        match self {
            Variable::Categorical(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as continuous f64.
    pub fn as_continuous(&self) -> Option<f64> {
        match self {
            Variable::Continuous(v) => Some(*v),
            _ => None,
        }
    }

    /// Label used when the value identifies a group (variant, unit, segment).
    ///
    /// Continuous values use the shortest float display, so `1.0` is `"1"`.
    pub fn label(&self) -> Option<String> {
        match self {
            Variable::Categorical(s) => Some(s.clone()),
            Variable::Continuous(v) => Some(format!("{}", v)),
            Variable::Missing => None,
        }
    }

    fn parse(raw: &str, var_type: VariableType) -> Self {
        let raw = raw.trim();
        if is_missing_token(raw) {
            return Variable::Missing;
        }
        match var_type {
            VariableType::Continuous => match raw.parse::<f64>() {
                Ok(v) if v.is_finite() => Variable::Continuous(v),
                _ => Variable::Missing,
            },
            VariableType::Categorical => Variable::Categorical(raw.to_string()),
        }
    }
}

impl From<f64> for Variable {
    fn from(v: f64) -> Self {
        if v.is_nan() {
            Variable::Missing
        } else {
            Variable::Continuous(v)
        }
    }
}

impl From<Option<f64>> for Variable {
    fn from(v: Option<f64>) -> Self {
        v.map(Variable::from).unwrap_or(Variable::Missing)
    }
}

impl From<&str> for Variable {
    fn from(s: &str) -> Self {
        Variable::Categorical(s.to_string())
    }
}

impl From<String> for Variable {
    fn from(s: String) -> Self {
        Variable::Categorical(s)
    }
}

/// Column type, inferred on load or from the cells of a new column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableType {
    Categorical,
    Continuous,
}

fn is_missing_token(raw: &str) -> bool {
    raw.is_empty() || raw == "NA" || raw == "na" || raw == "NaN" || raw == "nan"
}

/// Column-oriented table of named columns.
///
/// Every operation that derives data returns a new `Dataset`; the receiver
/// is never modified.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    /// Column names in order.
    column_names: Vec<String>,
    /// Cells stored per column.
    columns: HashMap<String, Vec<Variable>>,
    /// Type of each column.
    column_types: HashMap<String, VariableType>,
    /// Number of rows.
    n_rows: usize,
}

impl Dataset {
    /// Create an empty dataset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a dataset from a CSV file with a header row.
    ///
    /// Columns are inferred as continuous if all values parse as numbers,
    /// otherwise categorical. Empty cells and `NA`/`NaN` are missing.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    /// Load a dataset from any CSV reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let header: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
        if header.is_empty() || header.iter().all(|h| h.is_empty()) {
            return Err(ExperimentError::EmptyData("CSV has no header".to_string()));
        }

        let mut raw_rows: Vec<Vec<String>> = Vec::new();
        for record in rdr.records() {
            let record = record?;
            if record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }
            raw_rows.push(record.iter().map(String::from).collect());
        }

        let mut dataset = Dataset::new();
        for (col_idx, name) in header.iter().enumerate() {
            let cell = |row: &Vec<String>| row.get(col_idx).map(|s| s.trim().to_string());
            let all_numeric = raw_rows.iter().all(|row| match cell(row) {
                None => true,
                Some(v) => is_missing_token(&v) || v.parse::<f64>().is_ok(),
            });
            let var_type = if all_numeric {
                VariableType::Continuous
            } else {
                VariableType::Categorical
            };
            let values: Vec<Variable> = raw_rows
                .iter()
                .map(|row| match cell(row) {
                    Some(v) => Variable::parse(&v, var_type),
                    None => Variable::Missing,
                })
                .collect();
            dataset = dataset.insert(name, values, var_type)?;
        }
        dataset.n_rows = raw_rows.len();
        Ok(dataset)
    }

    /// Write the dataset as CSV with a header row.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.to_writer(file)
    }

    /// Write the dataset as CSV to any writer.
    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.column_names)?;
        for row in 0..self.n_rows {
            let record: Vec<String> = self
                .column_names
                .iter()
                .map(|name| self.columns[name][row].label().unwrap_or_default())
                .collect();
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Add (or replace) a column, returning the extended dataset.
    ///
    /// The column type is continuous unless some cell is categorical.
    pub fn with_column(self, name: &str, values: Vec<Variable>) -> Result<Self> {
        let var_type = if values.iter().any(|v| v.as_categorical().is_some()) {
            VariableType::Categorical
        } else {
            VariableType::Continuous
        };
        let values = if var_type == VariableType::Categorical {
            values
                .into_iter()
                .map(|v| match v {
                    Variable::Continuous(x) => Variable::Categorical(format!("{}", x)),
                    other => other,
                })
                .collect()
        } else {
            values
        };
        self.insert(name, values, var_type)
    }

    /// Add a continuous column.
    pub fn with_continuous(self, name: &str, values: Vec<f64>) -> Result<Self> {
        let values = values.into_iter().map(Variable::from).collect();
        self.insert(name, values, VariableType::Continuous)
    }

    /// Add a continuous column with explicit missing values.
    pub fn with_optional(self, name: &str, values: Vec<Option<f64>>) -> Result<Self> {
        let values = values.into_iter().map(Variable::from).collect();
        self.insert(name, values, VariableType::Continuous)
    }

    /// Add a categorical column.
    pub fn with_categorical<S: Into<String>>(self, name: &str, values: Vec<S>) -> Result<Self> {
        let values = values
            .into_iter()
            .map(|s| Variable::Categorical(s.into()))
            .collect();
        self.insert(name, values, VariableType::Categorical)
    }

    fn insert(mut self, name: &str, values: Vec<Variable>, var_type: VariableType) -> Result<Self> {
        if self.column_names.is_empty() {
            self.n_rows = values.len();
        } else if values.len() != self.n_rows {
            return Err(ExperimentError::DimensionMismatch {
                expected: self.n_rows,
                actual: values.len(),
            });
        }
        if !self.columns.contains_key(name) {
            self.column_names.push(name.to_string());
        }
        self.columns.insert(name.to_string(), values);
        self.column_types.insert(name.to_string(), var_type);
        Ok(self)
    }

    /// Column names in order.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of columns.
    pub fn n_columns(&self) -> usize {
        self.column_names.len()
    }

    /// Check if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    /// Check if a column exists.
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    /// Fail with `MissingColumn` for the first absent column.
    pub fn require_columns(&self, columns: &[&str]) -> Result<()> {
        match columns.iter().find(|c| !self.has_column(c)) {
            Some(c) => Err(ExperimentError::MissingColumn(c.to_string())),
            None => Ok(()),
        }
    }

    /// Get the type of a column.
    pub fn column_type(&self, column: &str) -> Option<VariableType> {
        self.column_types.get(column).copied()
    }

    /// Get all cells of a column.
    pub fn column(&self, column: &str) -> Result<&[Variable]> {
        self.columns
            .get(column)
            .map(Vec::as_slice)
            .ok_or_else(|| ExperimentError::MissingColumn(column.to_string()))
    }

    /// Get a column as numbers, with `None` for missing cells.
    pub fn numeric(&self, column: &str) -> Result<Vec<Option<f64>>> {
        if self.column_type(column) == Some(VariableType::Categorical) {
            return Err(ExperimentError::InvalidVariableType {
                column: column.to_string(),
                reason: "expected a numeric column".to_string(),
            });
        }
        Ok(self.column(column)?.iter().map(Variable::as_continuous).collect())
    }

    /// Get a column as group labels, with `None` for missing cells.
    pub fn labels(&self, column: &str) -> Result<Vec<Option<String>>> {
        Ok(self.column(column)?.iter().map(Variable::label).collect())
    }

    /// Distinct non-missing labels of a column in first-seen order.
    pub fn distinct(&self, column: &str) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut levels = Vec::new();
        for label in self.labels(column)?.into_iter().flatten() {
            if seen.insert(label.clone()) {
                levels.push(label);
            }
        }
        Ok(levels)
    }

    /// Keep only rows where `mask` is true.
    pub fn filter_rows(&self, mask: &[bool]) -> Result<Self> {
        if mask.len() != self.n_rows {
            return Err(ExperimentError::DimensionMismatch {
                expected: self.n_rows,
                actual: mask.len(),
            });
        }
        let indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter(|(_, &keep)| keep)
            .map(|(i, _)| i)
            .collect();
        Ok(self.select_rows(&indices))
    }

    /// Keep rows whose label in `column` equals `value`.
    pub fn filter_eq(&self, column: &str, value: &str) -> Result<Self> {
        let mask: Vec<bool> = self
            .labels(column)?
            .iter()
            .map(|l| l.as_deref() == Some(value))
            .collect();
        self.filter_rows(&mask)
    }

    /// Build a dataset from the given row indices (in order).
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|(name, values)| {
                let subset = indices.iter().map(|&i| values[i].clone()).collect();
                (name.clone(), subset)
            })
            .collect();
        Self {
            column_names: self.column_names.clone(),
            columns,
            column_types: self.column_types.clone(),
            n_rows: indices.len(),
        }
    }
}
