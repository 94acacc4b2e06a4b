//! Annotated matrix store: expression data plus cell and gene annotations.
//!
//! A minimal stand-in for the AnnData layout used across single-cell
//! tooling: a primary matrix `X`, optional named layers of the same shape,
//! per-cell observations, per-gene annotation columns, and the unstructured
//! entries HVG selection reads (`log1p`) and writes (`hvg`).

use crate::data::result::{GeneStats, HvgTable};
use crate::data::{CellMetadata, ExpressionMatrix};
use crate::error::{HvgError, Result};
use crate::hvg::Flavor;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Provenance of a previous `log1p` transform.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Log1pInfo {
    /// Logarithm base; `None` means natural log.
    pub base: Option<f64>,
}

/// One per-gene annotation column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VarColumn {
    Bool(Vec<bool>),
    Float(Vec<f64>),
    Int(Vec<i64>),
}

impl VarColumn {
    pub fn len(&self) -> usize {
        match self {
            VarColumn::Bool(v) => v.len(),
            VarColumn::Float(v) => v.len(),
            VarColumn::Int(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bool(&self) -> Option<&[bool]> {
        match self {
            VarColumn::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<&[f64]> {
        match self {
            VarColumn::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<&[i64]> {
        match self {
            VarColumn::Int(v) => Some(v),
            _ => None,
        }
    }

    fn select(&self, keep: &[bool]) -> Self {
        fn pick<T: Clone>(values: &[T], keep: &[bool]) -> Vec<T> {
            values
                .iter()
                .zip(keep)
                .filter(|(_, k)| **k)
                .map(|(v, _)| v.clone())
                .collect()
        }
        match self {
            VarColumn::Bool(v) => VarColumn::Bool(pick(v, keep)),
            VarColumn::Float(v) => VarColumn::Float(pick(v, keep)),
            VarColumn::Int(v) => VarColumn::Int(pick(v, keep)),
        }
    }
}

/// Cell × gene expression data with annotations.
#[derive(Debug, Clone)]
pub struct AnnotatedMatrix {
    x: ExpressionMatrix,
    layers: BTreeMap<String, ExpressionMatrix>,
    obs: CellMetadata,
    var: BTreeMap<String, VarColumn>,
    log1p: Option<Log1pInfo>,
    hvg: Option<Flavor>,
}

impl AnnotatedMatrix {
    /// Wrap a primary matrix with empty annotations.
    pub fn new(x: ExpressionMatrix) -> Self {
        let obs = CellMetadata::new(x.cell_ids().to_vec());
        Self {
            x,
            layers: BTreeMap::new(),
            obs,
            var: BTreeMap::new(),
            log1p: None,
            hvg: None,
        }
    }

    /// Attach per-cell observations; every matrix cell must be present.
    pub fn with_obs(mut self, obs: CellMetadata) -> Result<Self> {
        let known: HashSet<&str> = obs.cell_ids().iter().map(String::as_str).collect();
        if let Some(missing) = self
            .x
            .cell_ids()
            .iter()
            .find(|id| !known.contains(id.as_str()))
        {
            return Err(HvgError::CellMismatch(format!(
                "Cell '{}' not found in metadata",
                missing
            )));
        }
        self.obs = obs;
        Ok(self)
    }

    /// Add a named layer with the same cells and genes as `X`.
    pub fn with_layer(mut self, name: &str, layer: ExpressionMatrix) -> Result<Self> {
        if layer.n_cells() != self.x.n_cells() {
            return Err(HvgError::DimensionMismatch {
                expected: self.x.n_cells(),
                actual: layer.n_cells(),
            });
        }
        if layer.n_genes() != self.x.n_genes() {
            return Err(HvgError::DimensionMismatch {
                expected: self.x.n_genes(),
                actual: layer.n_genes(),
            });
        }
        self.layers.insert(name.to_string(), layer);
        Ok(self)
    }

    /// Record that `X` holds `log1p`-transformed values.
    pub fn with_log1p(mut self, info: Log1pInfo) -> Self {
        self.log1p = Some(info);
        self
    }

    pub fn x(&self) -> &ExpressionMatrix {
        &self.x
    }

    /// `X` or the named layer.
    pub fn matrix(&self, layer: Option<&str>) -> Result<&ExpressionMatrix> {
        match layer {
            None => Ok(&self.x),
            Some(name) => self
                .layers
                .get(name)
                .ok_or_else(|| HvgError::MissingLayer(name.to_string())),
        }
    }

    pub fn obs(&self) -> &CellMetadata {
        &self.obs
    }

    pub fn log1p(&self) -> Option<&Log1pInfo> {
        self.log1p.as_ref()
    }

    /// Flavor of the last in-place HVG run.
    pub fn hvg(&self) -> Option<Flavor> {
        self.hvg
    }

    pub fn n_cells(&self) -> usize {
        self.x.n_cells()
    }

    pub fn n_genes(&self) -> usize {
        self.x.n_genes()
    }

    pub fn gene_ids(&self) -> &[String] {
        self.x.gene_ids()
    }

    /// A per-gene annotation column.
    pub fn var(&self, column: &str) -> Option<&VarColumn> {
        self.var.get(column)
    }

    /// Names of all per-gene annotation columns.
    pub fn var_columns(&self) -> Vec<&str> {
        self.var.keys().map(String::as_str).collect()
    }

    /// Insert or replace a per-gene annotation column.
    pub fn set_var(&mut self, column: &str, values: VarColumn) -> Result<()> {
        if values.len() != self.n_genes() {
            return Err(HvgError::DimensionMismatch {
                expected: self.n_genes(),
                actual: values.len(),
            });
        }
        self.var.insert(column.to_string(), values);
        Ok(())
    }

    /// Write HVG columns into `var` and record the flavor.
    pub fn write_hvg(&mut self, table: &HvgTable) -> Result<()> {
        if table.len() != self.n_genes() {
            return Err(HvgError::DimensionMismatch {
                expected: self.n_genes(),
                actual: table.len(),
            });
        }
        let float = |f: fn(&GeneStats) -> Option<f64>| {
            VarColumn::Float(table.iter().map(|g| f(g).unwrap_or(f64::NAN)).collect())
        };

        self.set_var("highly_variable", VarColumn::Bool(table.mask()))?;
        self.set_var(
            "means",
            VarColumn::Float(table.iter().map(|g| g.means).collect()),
        )?;
        if table.flavor.is_dispersion_based() {
            self.set_var("dispersions", float(|g| g.dispersions))?;
            self.set_var("dispersions_norm", float(|g| g.dispersions_norm))?;
        } else {
            self.set_var("variances", float(|g| g.variances))?;
            self.set_var("variances_norm", float(|g| g.variances_norm))?;
            self.set_var("highly_variable_rank", float(|g| g.highly_variable_rank))?;
        }
        if table.batched {
            self.set_var(
                "highly_variable_nbatches",
                VarColumn::Int(
                    table
                        .iter()
                        .map(|g| g.highly_variable_nbatches.unwrap_or(0) as i64)
                        .collect(),
                ),
            )?;
            if table.flavor.is_dispersion_based() {
                self.set_var(
                    "highly_variable_intersection",
                    VarColumn::Bool(
                        table
                            .iter()
                            .map(|g| g.highly_variable_intersection.unwrap_or(false))
                            .collect(),
                    ),
                )?;
            }
        }
        self.hvg = Some(table.flavor);
        Ok(())
    }

    /// Restrict genes to those flagged in `keep`, across `X`, layers and `var`.
    pub fn subset_genes(&mut self, keep: &[bool]) -> Result<()> {
        if keep.len() != self.n_genes() {
            return Err(HvgError::DimensionMismatch {
                expected: self.n_genes(),
                actual: keep.len(),
            });
        }
        let indices: Vec<usize> = keep
            .iter()
            .enumerate()
            .filter(|(_, k)| **k)
            .map(|(i, _)| i)
            .collect();
        self.x = self.x.subset_genes(&indices)?;
        for layer in self.layers.values_mut() {
            *layer = layer.subset_genes(&indices)?;
        }
        for column in self.var.values_mut() {
            *column = column.select(keep);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    fn adata() -> AnnotatedMatrix {
        let x = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 2.0, 3.0, 1.0, 0.0]);
        let cells = vec!["c1".to_string(), "c2".to_string()];
        let genes = vec!["g1".to_string(), "g2".to_string(), "g3".to_string()];
        AnnotatedMatrix::new(ExpressionMatrix::from_dense(x, cells, genes).unwrap())
    }

    #[test]
    fn test_layers() {
        let base = adata();
        let counts = base.x().map_values(|v| v * 10.0);
        let a = base.with_layer("counts", counts).unwrap();
        assert_eq!(a.matrix(Some("counts")).unwrap().get(1, 0), 30.0);
        assert_eq!(a.matrix(None).unwrap().get(1, 0), 3.0);
        assert!(matches!(a.matrix(Some("raw")), Err(HvgError::MissingLayer(_))));
    }

    #[test]
    fn test_layer_shape_checked() {
        let a = adata();
        let wrong = a.x().subset_genes(&[0]).unwrap();
        assert!(a.with_layer("bad", wrong).is_err());
    }

    #[test]
    fn test_obs_must_cover_cells() {
        let obs = CellMetadata::new(vec!["c1".to_string()]);
        assert!(matches!(adata().with_obs(obs), Err(HvgError::CellMismatch(_))));
    }

    #[test]
    fn test_write_hvg_and_subset() {
        let mut a = adata();
        let genes: Vec<GeneStats> = ["g1", "g2", "g3"]
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let mut g = GeneStats::new(id.to_string(), i as f64);
                g.dispersions = Some(1.0);
                g.dispersions_norm = Some(i as f64);
                g.highly_variable = i != 1;
                g
            })
            .collect();
        let table = HvgTable::new(Flavor::CellRanger, false, genes);
        a.write_hvg(&table).unwrap();

        assert_eq!(a.hvg(), Some(Flavor::CellRanger));
        assert_eq!(
            a.var("highly_variable").unwrap().as_bool(),
            Some(&[true, false, true][..])
        );
        assert!(a.var("variances").is_none());

        let mask = table.mask();
        a.subset_genes(&mask).unwrap();
        assert_eq!(a.n_genes(), 2);
        assert_eq!(a.gene_ids(), &["g1", "g3"]);
        assert_eq!(a.var("means").unwrap().as_float(), Some(&[0.0, 2.0][..]));
    }
}
