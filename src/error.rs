//! Error types for model loading and upload scoring

use std::path::PathBuf;
use thiserror::Error;

/// Startup-class failures. Either one means no upload can be scored.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Fetching or persisting the pipeline artifact failed
    #[error("failed to download pipeline artifact from {url}: {reason}")]
    Download { url: String, reason: String },

    /// The local artifact could not be turned into a pipeline
    #[error("failed to load pipeline artifact {path}: {reason}")]
    Load { path: PathBuf, reason: String },
}

/// Per-upload failures. The upload is rejected and the process keeps serving.
#[derive(Debug, Error)]
pub enum ScoreError {
    /// The upload is not readable CSV
    #[error("could not read the uploaded file as CSV: {0}")]
    Parse(String),

    /// Required columns are absent (or duplicated) after renaming
    #[error("{0}")]
    Schema(SchemaViolation),

    /// A value could not be converted to its column's type
    #[error("row {row}, column '{column}': cannot read '{value}' as {expected}")]
    TypeCoercion {
        row: usize,
        column: String,
        value: String,
        expected: &'static str,
    },

    /// The pipeline rejected its input
    #[error("pipeline rejected the input: {0}")]
    Inference(String),

    /// The scored table could not be serialized
    #[error("could not write the predictions file: {0}")]
    Export(String),
}

/// Why a normalized header set does not match the pipeline schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    MissingColumns(Vec<String>),
    DuplicateColumn(String),
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaViolation::MissingColumns(columns) => {
                write!(f, "missing required column(s): {}", columns.join(", "))
            }
            SchemaViolation::DuplicateColumn(column) => {
                write!(f, "column '{}' appears more than once after renaming", column)
            }
        }
    }
}

impl ScoreError {
    /// Short machine-readable kind, used for metrics and JSON responses
    pub fn kind(&self) -> &'static str {
        match self {
            ScoreError::Parse(_) => "parse",
            ScoreError::Schema(_) => "schema",
            ScoreError::TypeCoercion { .. } => "type_coercion",
            ScoreError::Inference(_) => "inference",
            ScoreError::Export(_) => "export",
        }
    }
}

impl From<csv::Error> for ScoreError {
    fn from(e: csv::Error) -> Self {
        ScoreError::Parse(e.to_string())
    }
}
