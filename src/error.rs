//! Error types for the composable-hvg library.

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum HvgError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid value '{value}' at row {row}, column {col}")]
    InvalidValue {
        value: String,
        row: usize,
        col: usize,
    },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Cell ID mismatch: {0}")]
    CellMismatch(String),

    #[error("Layer '{0}' not found")]
    MissingLayer(String),

    #[error("Missing column '{0}' in cell metadata")]
    MissingColumn(String),

    #[error("Cell '{cell}' has no label in batch column '{column}'")]
    MissingBatchLabel { column: String, cell: String },

    #[error("Unknown flavor '{0}': expected one of 'seurat', 'cell_ranger', 'seurat_v3'")]
    UnknownFlavor(String),

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Missing capability: {0}")]
    MissingCapability(String),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, HvgError>;
