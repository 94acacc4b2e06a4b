//! Statistical building blocks: moments, robust summaries, local regression.

pub mod loess;
pub mod moments;
pub mod summary;

pub use loess::loess_fit;
pub use moments::{gene_moments, mean_var, mean_var_chunked, MomentAccumulator};
pub use summary::{descending_order, descending_ranks, mad, median, nan_mean, nan_std, percentile};
