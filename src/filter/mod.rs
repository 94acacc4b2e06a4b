//! Filtering primitives for expression matrices.

pub mod detection;

pub use detection::{filter_genes_min_cells, subset_genes_min_cells, GeneFilterResult};
