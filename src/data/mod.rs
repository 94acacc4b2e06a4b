//! Data structures for highly variable gene selection.

mod annotated;
mod expression_matrix;
mod metadata;
mod reductions;
mod result;

pub use annotated::{AnnotatedMatrix, Log1pInfo, VarColumn};
pub use expression_matrix::{ExpressionMatrix, MatrixData};
pub use metadata::{BatchLabels, CellMetadata, Variable, VariableType};
pub use reductions::GeneReductions;
pub use result::{GeneStats, HvgSummary, HvgTable};
