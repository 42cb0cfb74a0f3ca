//! The inference pipeline contract

use crate::error::ScoreError;
use crate::types::record::InventoryTable;
use thiserror::Error;

/// Ways a pipeline can reject its input
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input column '{0}' is missing")]
    MissingColumn(String),

    #[error("column '{column}' expects {expected} values, got '{value}'")]
    ColumnType {
        column: String,
        expected: String,
        value: String,
    },

    #[error("input '{input}' has unsupported type {ty}")]
    UnsupportedInput { input: String, ty: String },

    /// Error text from the underlying runtime, kept verbatim
    #[error("{0}")]
    Runtime(String),

    #[error("unexpected output: {0}")]
    Output(String),
}

impl From<PipelineError> for ScoreError {
    fn from(e: PipelineError) -> Self {
        ScoreError::Inference(e.to_string())
    }
}

/// Row-major probability matrix, one row per input row, one column per class
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityMatrix {
    rows: usize,
    classes: usize,
    data: Vec<f64>,
}

impl ProbabilityMatrix {
    pub fn new(rows: usize, classes: usize, data: Vec<f64>) -> Result<Self, PipelineError> {
        if data.len() != rows * classes {
            return Err(PipelineError::Output(format!(
                "{} values do not form a {}x{} matrix",
                data.len(),
                rows,
                classes
            )));
        }
        Ok(Self {
            rows,
            classes,
            data,
        })
    }

    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, PipelineError> {
        let classes = rows.first().map(Vec::len).unwrap_or(0);
        if rows.iter().any(|r| r.len() != classes) {
            return Err(PipelineError::Output(
                "probability rows have different class counts".to_string(),
            ));
        }
        let n = rows.len();
        Self::new(n, classes, rows.into_iter().flatten().collect())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn classes(&self) -> usize {
        self.classes
    }

    /// Probabilities of one class across all rows
    pub fn class_column(&self, class: usize) -> Result<Vec<f64>, PipelineError> {
        if class >= self.classes {
            return Err(PipelineError::Output(format!(
                "class index {} out of range for {} classes",
                class, self.classes
            )));
        }
        Ok((0..self.rows)
            .map(|r| self.data[r * self.classes + class])
            .collect())
    }
}

/// A loaded, immutable classification pipeline
pub trait Pipeline: Send + Sync {
    /// Human-readable identifier, for logs
    fn name(&self) -> &str;

    /// Column names the pipeline reads
    fn input_columns(&self) -> Vec<String>;

    /// Class probabilities for every row of `table`
    fn predict_proba(&self, table: &InventoryTable) -> Result<ProbabilityMatrix, PipelineError>;
}
