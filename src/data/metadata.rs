//! Per-cell observation metadata (batch, sample, condition, QC covariates).

use crate::error::{HvgError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A variable value that is either categorical or continuous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Variable {
    /// Categorical variable with string levels.
    Categorical(String),
    /// Continuous numeric variable.
    Continuous(f64),
    /// Missing value.
    Missing,
}

impl Variable {
    /// Try to get as continuous f64.
    pub fn as_continuous(&self) -> Option<f64> {
        match self {
            Variable::Continuous(v) => Some(*v),
            _ => None,
        }
    }

    /// Level label when the value is used as a grouping key.
    fn as_level(&self) -> Option<String> {
        match self {
            Variable::Categorical(s) => Some(s.clone()),
            Variable::Continuous(v) => Some(v.to_string()),
            Variable::Missing => None,
        }
    }

    fn parse(raw: &str, var_type: VariableType) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw == "NA" || raw == "na" {
            return Variable::Missing;
        }
        match var_type {
            VariableType::Continuous => raw
                .parse::<f64>()
                .map(Variable::Continuous)
                .unwrap_or(Variable::Missing),
            VariableType::Categorical => Variable::Categorical(raw.to_string()),
        }
    }
}

/// Type hint for columns when loading metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableType {
    Categorical,
    Continuous,
}

/// Assignment of every cell to one of K batches.
///
/// Levels are sorted, numerically when every level is a number;
/// `codes[i]` indexes into `levels` for cell `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchLabels {
    levels: Vec<String>,
    codes: Vec<usize>,
}

impl BatchLabels {
    /// Every cell in one implicit batch.
    pub fn single(n_cells: usize) -> Self {
        Self {
            levels: vec!["0".to_string()],
            codes: vec![0; n_cells],
        }
    }

    /// Build from one label per cell.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        let mut levels: Vec<String> = labels
            .iter()
            .map(|l| l.as_ref().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let numeric: Option<Vec<f64>> = levels.iter().map(|l| l.parse::<f64>().ok()).collect();
        if let Some(values) = numeric {
            let mut paired: Vec<(f64, String)> = values.into_iter().zip(levels).collect();
            paired.sort_by(|a, b| a.0.total_cmp(&b.0));
            levels = paired.into_iter().map(|(_, l)| l).collect();
        }
        let index: HashMap<&str, usize> = levels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i))
            .collect();
        let codes = labels.iter().map(|l| index[l.as_ref()]).collect();
        Self { levels, codes }
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn n_batches(&self) -> usize {
        self.levels.len()
    }

    pub fn n_cells(&self) -> usize {
        self.codes.len()
    }

    /// Indices of the cells belonging to batch `batch`.
    pub fn cells_in(&self, batch: usize) -> Vec<usize> {
        self.codes
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == batch)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Cell metadata containing observation variables for each cell.
#[derive(Debug, Clone, Default)]
pub struct CellMetadata {
    /// Cell IDs in order.
    cell_ids: Vec<String>,
    /// Column names.
    column_names: Vec<String>,
    /// Data stored as cell_id -> column_name -> Variable.
    data: HashMap<String, HashMap<String, Variable>>,
    /// Type hints for each column.
    column_types: HashMap<String, VariableType>,
}

impl CellMetadata {
    /// Create metadata for the given cells with no columns.
    pub fn new(cell_ids: Vec<String>) -> Self {
        let data = cell_ids
            .iter()
            .map(|id| (id.clone(), HashMap::new()))
            .collect();
        Self {
            cell_ids,
            column_names: Vec::new(),
            data,
            column_types: HashMap::new(),
        }
    }

    /// Add or replace a categorical column, one value per cell in order.
    pub fn with_categorical<S: AsRef<str>>(mut self, column: &str, values: &[S]) -> Result<Self> {
        if values.len() != self.cell_ids.len() {
            return Err(HvgError::DimensionMismatch {
                expected: self.cell_ids.len(),
                actual: values.len(),
            });
        }
        for (cell_id, value) in self.cell_ids.iter().zip(values) {
            let var = Variable::parse(value.as_ref(), VariableType::Categorical);
            if let Some(row) = self.data.get_mut(cell_id) {
                row.insert(column.to_string(), var);
            }
        }
        if !self.has_column(column) {
            self.column_names.push(column.to_string());
        }
        self.column_types
            .insert(column.to_string(), VariableType::Categorical);
        Ok(self)
    }

    /// Load metadata from a TSV file.
    ///
    /// Expected format:
    /// - First row: header with column names (first column is the cell ID)
    /// - Subsequent rows: cell ID followed by variable values
    ///
    /// Columns are inferred as continuous if all values parse as numbers,
    /// otherwise categorical. Use `with_categorical_column` to override.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| HvgError::EmptyData("Empty metadata file".to_string()))??;
        let header: Vec<&str> = header_line.split('\t').collect();
        if header.len() < 2 {
            return Err(HvgError::EmptyData(
                "Metadata must have at least one variable column".to_string(),
            ));
        }
        let column_names: Vec<String> = header[1..].iter().map(|s| s.to_string()).collect();

        // First pass: collect all values to infer types
        let mut raw_data: Vec<(String, Vec<String>)> = Vec::new();
        for line_result in lines {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let values: Vec<String> = fields[1..].iter().map(|s| s.to_string()).collect();
            raw_data.push((fields[0].to_string(), values));
        }

        if raw_data.is_empty() {
            return Err(HvgError::EmptyData("No cells in metadata".to_string()));
        }

        let mut column_types = HashMap::new();
        for (col_idx, col_name) in column_names.iter().enumerate() {
            let all_numeric = raw_data.iter().all(|(_, values)| {
                let v = values.get(col_idx).map(|s| s.trim()).unwrap_or("");
                v.is_empty() || v == "NA" || v == "na" || v.parse::<f64>().is_ok()
            });
            let var_type = if all_numeric {
                VariableType::Continuous
            } else {
                VariableType::Categorical
            };
            column_types.insert(col_name.clone(), var_type);
        }

        let mut cell_ids = Vec::with_capacity(raw_data.len());
        let mut data = HashMap::with_capacity(raw_data.len());
        for (cell_id, values) in raw_data {
            let row: HashMap<String, Variable> = column_names
                .iter()
                .enumerate()
                .map(|(col_idx, col_name)| {
                    let var = match values.get(col_idx) {
                        Some(raw) => Variable::parse(raw, column_types[col_name]),
                        None => Variable::Missing,
                    };
                    (col_name.clone(), var)
                })
                .collect();
            cell_ids.push(cell_id.clone());
            data.insert(cell_id, row);
        }

        Ok(Self {
            cell_ids,
            column_names,
            data,
            column_types,
        })
    }

    /// Force a column to be read as categorical (e.g. numeric batch codes).
    pub fn with_categorical_column(mut self, column: &str) -> Self {
        if !self.has_column(column) {
            return self;
        }
        self.column_types
            .insert(column.to_string(), VariableType::Categorical);
        for row in self.data.values_mut() {
            if let Some(var) = row.get_mut(column) {
                if let Some(level) = var.as_level() {
                    *var = Variable::Categorical(level);
                }
            }
        }
        self
    }

    /// Cell IDs in order.
    pub fn cell_ids(&self) -> &[String] {
        &self.cell_ids
    }

    /// Column names.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn n_cells(&self) -> usize {
        self.cell_ids.len()
    }

    /// Get a variable value for a specific cell and column.
    pub fn get(&self, cell_id: &str, column: &str) -> Option<&Variable> {
        self.data.get(cell_id).and_then(|m| m.get(column))
    }

    /// Get the type of a column.
    pub fn column_type(&self, column: &str) -> Option<VariableType> {
        self.column_types.get(column).copied()
    }

    /// Check if a column exists.
    pub fn has_column(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }

    /// Batch assignment for `cell_ids` read from `column`.
    ///
    /// Every cell must be present and labelled; continuous values are used as
    /// their textual level.
    pub fn batch_labels(&self, column: &str, cell_ids: &[String]) -> Result<BatchLabels> {
        if !self.has_column(column) {
            return Err(HvgError::MissingColumn(column.to_string()));
        }
        let labels = cell_ids
            .iter()
            .map(|cell| {
                let var = self.get(cell, column).ok_or_else(|| {
                    HvgError::CellMismatch(format!("Cell '{}' not found in metadata", cell))
                })?;
                var.as_level().ok_or_else(|| HvgError::MissingBatchLabel {
                    column: column.to_string(),
                    cell: cell.clone(),
                })
            })
            .collect::<Result<Vec<String>>>()?;
        Ok(BatchLabels::from_labels(&labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_tsv() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "cell_id\tbatch\tn_counts\tplate").unwrap();
        writeln!(file, "C1\tB\t1200\t1").unwrap();
        writeln!(file, "C2\tA\t800\t2").unwrap();
        writeln!(file, "C3\tB\t950\t1").unwrap();
        writeln!(file, "C4\tA\t1430\t2").unwrap();
        file.flush().unwrap();
        file
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_load_metadata() {
        let file = create_test_tsv();
        let meta = CellMetadata::from_tsv(file.path()).unwrap();

        assert_eq!(meta.n_cells(), 4);
        assert_eq!(meta.cell_ids(), &["C1", "C2", "C3", "C4"]);
        assert_eq!(meta.column_names(), &["batch", "n_counts", "plate"]);
        assert_eq!(meta.column_type("batch"), Some(VariableType::Categorical));
        assert_eq!(meta.column_type("n_counts"), Some(VariableType::Continuous));
        assert_eq!(meta.get("C2", "n_counts").unwrap().as_continuous(), Some(800.0));
    }

    #[test]
    fn test_batch_labels_sorted_levels() {
        let file = create_test_tsv();
        let meta = CellMetadata::from_tsv(file.path()).unwrap();

        let labels = meta
            .batch_labels("batch", &ids(&["C1", "C2", "C3", "C4"]))
            .unwrap();
        assert_eq!(labels.levels(), &["A", "B"]);
        assert_eq!(labels.cells_in(0), vec![1, 3]);
        assert_eq!(labels.cells_in(1), vec![0, 2]);
    }

    #[test]
    fn test_numeric_batch_column() {
        let file = create_test_tsv();
        let meta = CellMetadata::from_tsv(file.path())
            .unwrap()
            .with_categorical_column("plate");
        assert_eq!(meta.column_type("plate"), Some(VariableType::Categorical));

        let labels = meta
            .batch_labels("plate", &ids(&["C1", "C2", "C3", "C4"]))
            .unwrap();
        assert_eq!(labels.n_batches(), 2);
        assert_eq!(labels.cells_in(0), vec![0, 2]);
    }

    #[test]
    fn test_batch_labels_errors() {
        let meta = CellMetadata::new(ids(&["C1", "C2"]))
            .with_categorical("batch", &["x", "NA"])
            .unwrap();

        assert!(matches!(
            meta.batch_labels("missing", &ids(&["C1", "C2"])),
            Err(HvgError::MissingColumn(_))
        ));
        assert!(matches!(
            meta.batch_labels("batch", &ids(&["C1", "C2"])),
            Err(HvgError::MissingBatchLabel { .. })
        ));
        assert!(matches!(
            meta.batch_labels("batch", &ids(&["C1", "C9"])),
            Err(HvgError::CellMismatch(_))
        ));
    }

    #[test]
    fn test_with_categorical_length_mismatch() {
        let result = CellMetadata::new(ids(&["C1", "C2"])).with_categorical("batch", &["x"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_numeric_levels_sort_by_value() {
        let labels = BatchLabels::from_labels(&["10", "2", "1", "2", "10"]);
        assert_eq!(labels.levels(), &["1", "2", "10"]);
        assert_eq!(labels.cells_in(2), vec![0, 4]);

        let mixed = BatchLabels::from_labels(&["10", "b", "2"]);
        assert_eq!(mixed.levels(), &["10", "2", "b"]);
    }

    #[test]
    fn test_single_batch() {
        let labels = BatchLabels::single(3);
        assert_eq!(labels.n_batches(), 1);
        assert_eq!(labels.cells_in(0), vec![0, 1, 2]);
    }
}
