//! Cell × gene expression matrix with dense or sparse storage.

use crate::data::reductions::GeneReductions;
use crate::error::{HvgError, Result};
use nalgebra::DMatrix;
use sprs::{CsMat, TriMat};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Backing storage of an [`ExpressionMatrix`].
#[derive(Debug, Clone)]
pub enum MatrixData {
    /// Dense cells × genes matrix.
    Dense(DMatrix<f64>),
    /// Sparse cells × genes matrix in CSR format (one row per cell).
    Sparse(CsMat<f64>),
}

/// An expression matrix storing per-cell gene measurements.
///
/// Rows represent cells, columns represent genes. Values are raw counts or
/// log-normalized expression depending on where in the workflow the matrix
/// comes from.
#[derive(Debug, Clone)]
pub struct ExpressionMatrix {
    data: MatrixData,
    /// Cell identifiers (row names)
    cell_ids: Vec<String>,
    /// Gene identifiers (column names)
    gene_ids: Vec<String>,
}

impl ExpressionMatrix {
    /// Create a new ExpressionMatrix from storage and identifiers.
    ///
    /// Sparse input in CSC layout is converted to CSR.
    pub fn new(data: MatrixData, cell_ids: Vec<String>, gene_ids: Vec<String>) -> Result<Self> {
        let data = match data {
            MatrixData::Sparse(m) if !m.is_csr() => MatrixData::Sparse(m.to_csr()),
            other => other,
        };
        let (nrows, ncols) = match &data {
            MatrixData::Dense(m) => m.shape(),
            MatrixData::Sparse(m) => m.shape(),
        };
        if nrows != cell_ids.len() {
            return Err(HvgError::DimensionMismatch {
                expected: nrows,
                actual: cell_ids.len(),
            });
        }
        if ncols != gene_ids.len() {
            return Err(HvgError::DimensionMismatch {
                expected: ncols,
                actual: gene_ids.len(),
            });
        }
        Ok(Self {
            data,
            cell_ids,
            gene_ids,
        })
    }

    /// Create from a dense cells × genes matrix.
    pub fn from_dense(
        data: DMatrix<f64>,
        cell_ids: Vec<String>,
        gene_ids: Vec<String>,
    ) -> Result<Self> {
        Self::new(MatrixData::Dense(data), cell_ids, gene_ids)
    }

    /// Create from a sparse cells × genes matrix.
    pub fn from_sparse(
        data: CsMat<f64>,
        cell_ids: Vec<String>,
        gene_ids: Vec<String>,
    ) -> Result<Self> {
        Self::new(MatrixData::Sparse(data), cell_ids, gene_ids)
    }

    /// Load a matrix from a gene-per-row TSV file into sparse storage.
    ///
    /// Expected format:
    /// - First row: header with cell IDs (first column is the gene ID header)
    /// - Subsequent rows: gene ID followed by one value per cell
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| HvgError::EmptyData("Empty TSV file".to_string()))??;
        let header: Vec<&str> = header_line.split('\t').collect();
        if header.len() < 2 {
            return Err(HvgError::EmptyData(
                "TSV must have at least one cell".to_string(),
            ));
        }
        let cell_ids: Vec<String> = header[1..].iter().map(|s| s.to_string()).collect();
        let n_cells = cell_ids.len();

        // Triplets are (cell, gene, value): the file is transposed on load.
        let mut triplets: Vec<(usize, usize, f64)> = Vec::new();
        let mut gene_ids: Vec<String> = Vec::new();

        for line_result in lines {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let gene_idx = gene_ids.len();
            gene_ids.push(fields[0].to_string());

            for (cell_idx, value_str) in fields[1..].iter().enumerate() {
                if cell_idx >= n_cells {
                    break;
                }
                let value: f64 = value_str.trim().parse().map_err(|_| HvgError::InvalidValue {
                    value: value_str.to_string(),
                    row: gene_idx,
                    col: cell_idx,
                })?;
                if value != 0.0 {
                    triplets.push((cell_idx, gene_idx, value));
                }
            }
        }

        let n_genes = gene_ids.len();
        if n_genes == 0 {
            return Err(HvgError::EmptyData("No genes in TSV".to_string()));
        }

        let mut tri_mat = TriMat::new((n_cells, n_genes));
        for (row, col, val) in triplets {
            tri_mat.add_triplet(row, col, val);
        }

        Self::from_sparse(tri_mat.to_csr(), cell_ids, gene_ids)
    }

    /// Write the matrix to a gene-per-row TSV file.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        write!(writer, "gene_id")?;
        for cell_id in &self.cell_ids {
            write!(writer, "\t{}", cell_id)?;
        }
        writeln!(writer)?;

        for (gene_idx, gene_id) in self.gene_ids.iter().enumerate() {
            write!(writer, "{}", gene_id)?;
            for cell_idx in 0..self.n_cells() {
                write!(writer, "\t{}", self.get(cell_idx, gene_idx))?;
            }
            writeln!(writer)?;
        }

        Ok(())
    }

    /// Get the value at (cell, gene), returning 0 for missing sparse entries.
    #[inline]
    pub fn get(&self, cell: usize, gene: usize) -> f64 {
        match &self.data {
            MatrixData::Dense(m) => m[(cell, gene)],
            MatrixData::Sparse(m) => m.get(cell, gene).copied().unwrap_or(0.0),
        }
    }

    /// Number of cells (rows).
    #[inline]
    pub fn n_cells(&self) -> usize {
        self.cell_ids.len()
    }

    /// Number of genes (columns).
    #[inline]
    pub fn n_genes(&self) -> usize {
        self.gene_ids.len()
    }

    /// Cell identifiers.
    #[inline]
    pub fn cell_ids(&self) -> &[String] {
        &self.cell_ids
    }

    /// Gene identifiers.
    #[inline]
    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    /// Underlying storage.
    #[inline]
    pub fn data(&self) -> &MatrixData {
        &self.data
    }

    #[inline]
    pub fn is_sparse(&self) -> bool {
        matches!(self.data, MatrixData::Sparse(_))
    }

    /// Per-gene reductions over whichever storage backs this matrix.
    pub fn reductions(&self) -> &dyn GeneReductions {
        match &self.data {
            MatrixData::Dense(m) => m,
            MatrixData::Sparse(m) => m,
        }
    }

    /// Apply `f` to every stored value, returning a new matrix.
    ///
    /// Sparse storage only visits stored entries, so `f(0.0)` must be `0.0`
    /// (true for `expm1` and scaling).
    pub fn map_values<F>(&self, f: F) -> Self
    where
        F: Fn(f64) -> f64,
    {
        let data = match &self.data {
            MatrixData::Dense(m) => MatrixData::Dense(m.map(&f)),
            MatrixData::Sparse(m) => MatrixData::Sparse(m.map(|&v| f(v))),
        };
        Self {
            data,
            cell_ids: self.cell_ids.clone(),
            gene_ids: self.gene_ids.clone(),
        }
    }

    /// Subset the matrix to include only specified cells (by index).
    pub fn subset_cells(&self, indices: &[usize]) -> Result<Self> {
        let mut new_cell_ids = Vec::with_capacity(indices.len());
        for &old_row in indices {
            if old_row >= self.n_cells() {
                return Err(HvgError::InvalidParameter(format!(
                    "Cell index {} out of bounds",
                    old_row
                )));
            }
            new_cell_ids.push(self.cell_ids[old_row].clone());
        }

        let data = match &self.data {
            MatrixData::Dense(m) => MatrixData::Dense(m.select_rows(indices)),
            MatrixData::Sparse(m) => {
                let mut tri_mat = TriMat::new((indices.len(), self.n_genes()));
                for (new_row, &old_row) in indices.iter().enumerate() {
                    if let Some(row_vec) = m.outer_view(old_row) {
                        for (col, &val) in row_vec.iter() {
                            tri_mat.add_triplet(new_row, col, val);
                        }
                    }
                }
                MatrixData::Sparse(tri_mat.to_csr())
            }
        };

        Self::new(data, new_cell_ids, self.gene_ids.clone())
    }

    /// Subset the matrix to include only specified genes (by index).
    pub fn subset_genes(&self, indices: &[usize]) -> Result<Self> {
        let mut new_gene_ids = Vec::with_capacity(indices.len());
        for &old_col in indices {
            if old_col >= self.n_genes() {
                return Err(HvgError::InvalidParameter(format!(
                    "Gene index {} out of bounds",
                    old_col
                )));
            }
            new_gene_ids.push(self.gene_ids[old_col].clone());
        }

        let data = match &self.data {
            MatrixData::Dense(m) => MatrixData::Dense(m.select_columns(indices)),
            MatrixData::Sparse(m) => {
                let col_map: HashMap<usize, usize> = indices
                    .iter()
                    .enumerate()
                    .map(|(new_idx, &old_idx)| (old_idx, new_idx))
                    .collect();
                let mut tri_mat = TriMat::new((self.n_cells(), indices.len()));
                for (row, row_vec) in m.outer_iterator().enumerate() {
                    for (old_col, &val) in row_vec.iter() {
                        if let Some(&new_col) = col_map.get(&old_col) {
                            tri_mat.add_triplet(row, new_col, val);
                        }
                    }
                }
                MatrixData::Sparse(tri_mat.to_csr())
            }
        };

        Self::new(data, self.cell_ids.clone(), new_gene_ids)
    }

    /// Split the matrix into consecutive blocks of at most `chunk_size` cells.
    pub fn row_chunks(&self, chunk_size: usize) -> Result<Vec<Self>> {
        if chunk_size == 0 {
            return Err(HvgError::InvalidParameter(
                "Chunk size must be positive".to_string(),
            ));
        }
        (0..self.n_cells())
            .step_by(chunk_size)
            .map(|start| {
                let end = (start + chunk_size).min(self.n_cells());
                let rows: Vec<usize> = (start..end).collect();
                self.subset_cells(&rows)
            })
            .collect()
    }

    /// Convert to a dense matrix.
    pub fn to_dense(&self) -> DMatrix<f64> {
        match &self.data {
            MatrixData::Dense(m) => m.clone(),
            MatrixData::Sparse(m) => {
                let mut dense = DMatrix::zeros(self.n_cells(), self.n_genes());
                for (row, row_vec) in m.outer_iterator().enumerate() {
                    for (col, &val) in row_vec.iter() {
                        dense[(row, col)] = val;
                    }
                }
                dense
            }
        }
    }

    /// Convert to sparse CSR storage, dropping exact zeros.
    pub fn to_sparse(&self) -> Result<Self> {
        match &self.data {
            MatrixData::Sparse(_) => Ok(self.clone()),
            MatrixData::Dense(m) => {
                let mut tri_mat = TriMat::new(m.shape());
                for col in 0..m.ncols() {
                    for row in 0..m.nrows() {
                        let val = m[(row, col)];
                        if val != 0.0 {
                            tri_mat.add_triplet(row, col, val);
                        }
                    }
                }
                Self::from_sparse(
                    tri_mat.to_csr(),
                    self.cell_ids.clone(),
                    self.gene_ids.clone(),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_test_matrix() -> ExpressionMatrix {
        // 4 cells × 3 genes
        let mut tri_mat = TriMat::new((4, 3));
        tri_mat.add_triplet(0, 0, 10.0);
        tri_mat.add_triplet(1, 0, 20.0);
        tri_mat.add_triplet(3, 0, 5.0);
        tri_mat.add_triplet(0, 1, 100.0);
        tri_mat.add_triplet(1, 1, 200.0);
        tri_mat.add_triplet(2, 1, 150.0);
        tri_mat.add_triplet(3, 1, 175.0);
        // gene C is only detected in cell 0
        tri_mat.add_triplet(0, 2, 1.0);

        let cell_ids: Vec<String> = (1..=4).map(|i| format!("cell{}", i)).collect();
        let gene_ids = vec!["gene_A".to_string(), "gene_B".to_string(), "gene_C".to_string()];
        ExpressionMatrix::from_sparse(tri_mat.to_csr(), cell_ids, gene_ids).unwrap()
    }

    #[test]
    fn test_dimensions() {
        let mat = create_test_matrix();
        assert_eq!(mat.n_cells(), 4);
        assert_eq!(mat.n_genes(), 3);
        assert!(mat.is_sparse());
    }

    #[test]
    fn test_dimension_mismatch() {
        let dense = DMatrix::<f64>::zeros(2, 3);
        let result = ExpressionMatrix::from_dense(
            dense,
            vec!["c1".into()],
            vec!["g1".into(), "g2".into(), "g3".into()],
        );
        assert!(matches!(
            result,
            Err(HvgError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_get_values() {
        let mat = create_test_matrix();
        assert_eq!(mat.get(0, 0), 10.0);
        assert_eq!(mat.get(2, 0), 0.0);
        assert_eq!(mat.get(0, 2), 1.0);
        assert_eq!(mat.get(1, 2), 0.0);
    }

    #[test]
    fn test_tsv_roundtrip() {
        let mat = create_test_matrix();

        let temp_file = NamedTempFile::new().unwrap();
        mat.to_tsv(temp_file.path()).unwrap();

        let loaded = ExpressionMatrix::from_tsv(temp_file.path()).unwrap();
        assert_eq!(loaded.cell_ids(), mat.cell_ids());
        assert_eq!(loaded.gene_ids(), mat.gene_ids());
        for cell in 0..mat.n_cells() {
            for gene in 0..mat.n_genes() {
                assert_eq!(loaded.get(cell, gene), mat.get(cell, gene));
            }
        }
    }

    #[test]
    fn test_from_tsv_rejects_bad_value() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gene_id\tc1\tc2").unwrap();
        writeln!(file, "g1\t1\tabc").unwrap();
        file.flush().unwrap();

        let result = ExpressionMatrix::from_tsv(file.path());
        assert!(matches!(result, Err(HvgError::InvalidValue { row: 0, col: 1, .. })));
    }

    #[test]
    fn test_subset_cells_dense_and_sparse_agree() {
        let sparse = create_test_matrix();
        let dense = ExpressionMatrix::from_dense(
            sparse.to_dense(),
            sparse.cell_ids().to_vec(),
            sparse.gene_ids().to_vec(),
        )
        .unwrap();

        let a = sparse.subset_cells(&[3, 0]).unwrap();
        let b = dense.subset_cells(&[3, 0]).unwrap();
        assert_eq!(a.cell_ids(), &["cell4", "cell1"]);
        assert_eq!(a.to_dense(), b.to_dense());
        assert_eq!(a.get(0, 0), 5.0);
    }

    #[test]
    fn test_subset_genes() {
        let mat = create_test_matrix();
        let subset = mat.subset_genes(&[2, 0]).unwrap();
        assert_eq!(subset.gene_ids(), &["gene_C", "gene_A"]);
        assert_eq!(subset.get(0, 0), 1.0);
        assert_eq!(subset.get(1, 1), 20.0);
        assert!(mat.subset_genes(&[5]).is_err());
    }

    #[test]
    fn test_map_values_keeps_sparsity() {
        let mat = create_test_matrix();
        let scaled = mat.map_values(|v| v * 2.0);
        assert_eq!(scaled.get(0, 0), 20.0);
        assert_eq!(scaled.get(2, 0), 0.0);
        assert!(scaled.is_sparse());
    }

    #[test]
    fn test_row_chunks_cover_all_cells() {
        let mat = create_test_matrix();
        let chunks = mat.row_chunks(3).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].n_cells(), 3);
        assert_eq!(chunks[1].n_cells(), 1);
        assert_eq!(chunks[1].get(0, 0), 5.0);
        assert!(mat.row_chunks(0).is_err());
    }
}
