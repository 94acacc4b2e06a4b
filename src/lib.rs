//! Composable Highly Variable Gene (HVG) Selection Library
//!
//! This library selects highly variable genes from single-cell expression
//! matrices, the feature-selection step that precedes dimensionality
//! reduction and clustering.
//!
//! # Overview
//!
//! The library is organized into composable modules:
//!
//! - **data**: Core data structures (ExpressionMatrix, CellMetadata, AnnotatedMatrix, HvgTable)
//! - **stats**: Per-gene moments, robust summaries, loess
//! - **filter**: Detection-based gene filtering
//! - **hvg**: Flavors (`seurat`, `cell_ranger`, `seurat_v3`), cutoffs, batch aggregation
//! - **observe**: Diagnostic sinks
//!
//! # Example
//!
//! ```no_run
//! use composable_hvg::prelude::*;
//!
//! // Load data
//! let counts = ExpressionMatrix::from_tsv("counts.tsv").unwrap();
//! let obs = CellMetadata::from_tsv("obs.tsv").unwrap();
//! let adata = AnnotatedMatrix::new(counts).with_obs(obs).unwrap();
//!
//! // Rank genes by regularized variance within each sample
//! let table = HvgSelector::new()
//!     .flavor(Flavor::SeuratV3)
//!     .n_top_genes(2000)
//!     .batch_key("sample")
//!     .compute(&adata)
//!     .unwrap();
//! println!("{}", table.summary());
//! ```

pub mod data;
pub mod error;
pub mod filter;
pub mod hvg;
pub mod observe;
pub mod stats;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::data::{
        AnnotatedMatrix, BatchLabels, CellMetadata, ExpressionMatrix, GeneReductions, GeneStats,
        HvgSummary, HvgTable, Log1pInfo, MatrixData, VarColumn, Variable, VariableType,
    };
    pub use crate::error::{HvgError, Result};
    pub use crate::filter::{filter_genes_min_cells, subset_genes_min_cells, GeneFilterResult};
    pub use crate::hvg::{
        compute_highly_variable_genes, highly_variable_batched, highly_variable_dispersion,
        highly_variable_genes, highly_variable_seurat_v3, Cutoff, DispersionParams,
        DispersionStats, Flavor, HvgConfig, HvgSelector, IntervalCutoffs, MeanBins,
        SeuratV3Params,
    };
    pub use crate::observe::{CollectingObserver, LogObserver, Observer};
    pub use crate::stats::{gene_moments, loess_fit, mean_var, mean_var_chunked, MomentAccumulator};
}
