//! Orchestration: validate a configuration, dispatch to a flavor, and write
//! or return the per-gene table.

use crate::data::{AnnotatedMatrix, HvgTable};
use crate::error::Result;
use crate::hvg::batch::highly_variable_batched;
use crate::hvg::cutoff::Cutoff;
use crate::hvg::dispersion::{highly_variable_dispersion, DispersionParams};
use crate::hvg::seurat_v3::{highly_variable_seurat_v3, SeuratV3Params};
use crate::hvg::{Flavor, HvgConfig, DEFAULT_V3_N_TOP_GENES};
use crate::observe::{LogObserver, Observer};
use std::sync::Arc;

/// Annotate highly variable genes, logging through the `log` facade.
///
/// With `config.inplace` the columns are written into `adata.var` (and the
/// genes subset when `config.subset`) and `None` is returned; otherwise the
/// table is returned and `adata` is left untouched.
pub fn highly_variable_genes(
    adata: &mut AnnotatedMatrix,
    config: &HvgConfig,
) -> Result<Option<HvgTable>> {
    run(adata, config, &LogObserver)
}

/// Compute the per-gene table without touching `adata`.
///
/// `config.subset` restricts the table to the selected genes;
/// `config.inplace` is ignored.
pub fn compute_highly_variable_genes(
    adata: &AnnotatedMatrix,
    config: &HvgConfig,
    observer: &dyn Observer,
) -> Result<HvgTable> {
    let table = compute(adata, config, observer)?;
    Ok(if config.subset {
        table.subset_selected()
    } else {
        table
    })
}

fn run(
    adata: &mut AnnotatedMatrix,
    config: &HvgConfig,
    observer: &dyn Observer,
) -> Result<Option<HvgTable>> {
    let table = compute(adata, config, observer)?;

    if !config.inplace {
        return Ok(Some(if config.subset {
            table.subset_selected()
        } else {
            table
        }));
    }

    adata.write_hvg(&table)?;
    observer.info(&format!(
        "    finished, added to `.var`: {}",
        table
            .columns()
            .iter()
            .map(|c| format!("'{}'", c))
            .collect::<Vec<_>>()
            .join(", ")
    ));
    if config.subset {
        adata.subset_genes(&table.mask())?;
    }
    Ok(None)
}

fn compute(
    adata: &AnnotatedMatrix,
    config: &HvgConfig,
    observer: &dyn Observer,
) -> Result<HvgTable> {
    observer.info("extracting highly variable genes");
    config.validate()?;

    let matrix = adata.matrix(config.layer.as_deref())?;
    let batches = match &config.batch_key {
        Some(key) => Some(adata.obs().batch_labels(key, matrix.cell_ids())?),
        None => None,
    };

    let genes = match config.flavor {
        Flavor::SeuratV3 => {
            let params = SeuratV3Params {
                n_top_genes: config.n_top_genes.unwrap_or(DEFAULT_V3_N_TOP_GENES),
                span: config.span,
                check_values: config.check_values,
                chunk_size: config.chunk_size,
            };
            highly_variable_seurat_v3(matrix, batches.as_ref(), &params, observer)?
        }
        flavor => {
            let cutoff = Cutoff::resolve(config.n_top_genes, config.interval(), observer)?;
            let params = DispersionParams {
                flavor,
                n_bins: config.n_bins,
                log1p_base: adata.log1p().and_then(|info| info.base),
                chunk_size: config.chunk_size,
            };
            match &batches {
                Some(labels) => {
                    highly_variable_batched(matrix, labels, &params, &cutoff, observer)?
                }
                None => highly_variable_dispersion(matrix, &params, &cutoff, observer)?,
            }
        }
    };

    Ok(HvgTable::new(config.flavor, batches.is_some(), genes))
}

/// Builder for a selection run.
///
/// # Example
///
/// ```no_run
/// use composable_hvg::prelude::*;
///
/// let x = ExpressionMatrix::from_tsv("counts.tsv").unwrap();
/// let mut adata = AnnotatedMatrix::new(x);
/// HvgSelector::new()
///     .flavor(Flavor::SeuratV3)
///     .n_top_genes(2000)
///     .run(&mut adata)
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct HvgSelector {
    config: HvgConfig,
    observer: Arc<dyn Observer>,
}

impl Default for HvgSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl HvgSelector {
    /// Default configuration, logging through the `log` facade.
    pub fn new() -> Self {
        Self::from_config(HvgConfig::default())
    }

    /// Create from a config.
    pub fn from_config(config: HvgConfig) -> Self {
        Self {
            config,
            observer: Arc::new(LogObserver),
        }
    }

    pub fn config(&self) -> &HvgConfig {
        &self.config
    }

    /// Send diagnostics to `observer` instead of the `log` facade.
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn flavor(mut self, flavor: Flavor) -> Self {
        self.config.flavor = flavor;
        self
    }

    pub fn layer(mut self, layer: &str) -> Self {
        self.config.layer = Some(layer.to_string());
        self
    }

    pub fn n_top_genes(mut self, n: usize) -> Self {
        self.config.n_top_genes = Some(n);
        self
    }

    /// Bounds on mean expression (strict).
    pub fn mean_bounds(mut self, min_mean: f64, max_mean: f64) -> Self {
        self.config.min_mean = min_mean;
        self.config.max_mean = max_mean;
        self
    }

    /// Bounds on normalized dispersion (strict).
    pub fn disp_bounds(mut self, min_disp: f64, max_disp: f64) -> Self {
        self.config.min_disp = min_disp;
        self.config.max_disp = max_disp;
        self
    }

    pub fn span(mut self, span: f64) -> Self {
        self.config.span = span;
        self
    }

    pub fn n_bins(mut self, n_bins: usize) -> Self {
        self.config.n_bins = n_bins;
        self
    }

    pub fn batch_key(mut self, key: &str) -> Self {
        self.config.batch_key = Some(key.to_string());
        self
    }

    pub fn subset(mut self, subset: bool) -> Self {
        self.config.subset = subset;
        self
    }

    pub fn inplace(mut self, inplace: bool) -> Self {
        self.config.inplace = inplace;
        self
    }

    pub fn check_values(mut self, check: bool) -> Self {
        self.config.check_values = check;
        self
    }

    /// Reduce moments `size` cells at a time.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = Some(size);
        self
    }

    /// Run on `adata`; see [`highly_variable_genes`].
    pub fn run(&self, adata: &mut AnnotatedMatrix) -> Result<Option<HvgTable>> {
        run(adata, &self.config, self.observer.as_ref())
    }

    /// Compute the table without touching `adata`.
    pub fn compute(&self, adata: &AnnotatedMatrix) -> Result<HvgTable> {
        compute_highly_variable_genes(adata, &self.config, self.observer.as_ref())
    }
}
