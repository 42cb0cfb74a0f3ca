//! Upload scoring: normalize, infer, derive, render.

use crate::config::ScoringConfig;
use crate::error::ScoreError;
use crate::export::{self, TableView};
use crate::models::pipeline::Pipeline;
use crate::normalizer::Normalizer;
use crate::types::record::InventoryTable;
use crate::types::scored::{ScoredRecord, ScoredTable};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Everything produced for one upload
#[derive(Debug, Clone)]
pub struct ScoreReport {
    /// Leading rows of the normalized input
    pub preview: TableView,
    /// Leading rows of the per-product scores
    pub results: TableView,
    /// The full augmented table
    pub table: ScoredTable,
    /// CSV serialization of `table`
    pub csv: Vec<u8>,
}

/// JSON body of a scoring response
#[derive(Debug, Serialize)]
pub struct ScoreSummary<'a> {
    pub rows: usize,
    pub mean_stockout_risk: Option<f64>,
    pub total_economic_impact: f64,
    pub preview: &'a TableView,
    pub results: &'a TableView,
    pub csv: String,
}

impl ScoreReport {
    pub fn rows(&self) -> usize {
        self.table.len()
    }

    pub fn mean_stockout_risk(&self) -> Option<f64> {
        if self.table.is_empty() {
            return None;
        }
        let sum: f64 = self.table.rows.iter().map(|r| r.stockout_risk).sum();
        Some(sum / self.table.len() as f64)
    }

    /// Sum of the known economic impacts
    pub fn total_economic_impact(&self) -> f64 {
        self.table
            .rows
            .iter()
            .filter_map(|r| r.economic_impact)
            .sum()
    }

    pub fn summary(&self) -> ScoreSummary<'_> {
        ScoreSummary {
            rows: self.rows(),
            mean_stockout_risk: self.mean_stockout_risk(),
            total_economic_impact: self.total_economic_impact(),
            preview: &self.preview,
            results: &self.results,
            csv: String::from_utf8_lossy(&self.csv).into_owned(),
        }
    }
}

/// Scores uploads against one loaded pipeline
pub struct Scorer {
    pipeline: Arc<dyn Pipeline>,
    normalizer: Normalizer,
    positive_class: usize,
    limits: ScoringConfig,
}

impl Scorer {
    pub fn new(pipeline: Arc<dyn Pipeline>, positive_class: usize, limits: ScoringConfig) -> Self {
        let normalizer = Normalizer::new(pipeline.input_columns());
        Self {
            pipeline,
            normalizer,
            positive_class,
            limits,
        }
    }

    pub fn pipeline_name(&self) -> &str {
        self.pipeline.name()
    }

    /// Score one upload. Either the whole upload is scored or an error is
    /// returned; there are no partial results.
    pub fn score(&self, upload: &[u8]) -> Result<ScoreReport, ScoreError> {
        let start = Instant::now();

        let table = self.normalizer.normalize_bytes(upload)?;
        let scored = self.score_table(table)?;
        let csv = export::to_csv(&scored).map_err(|e| ScoreError::Export(e.to_string()))?;

        debug!(
            rows = scored.len(),
            bytes_in = upload.len(),
            bytes_out = csv.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Upload scored"
        );

        Ok(ScoreReport {
            preview: export::preview_view(&scored, self.limits.preview_rows),
            results: export::results_view(&scored, self.limits.result_rows),
            table: scored,
            csv,
        })
    }

    /// Run inference on a normalized table and attach the derived metric
    pub fn score_table(&self, table: InventoryTable) -> Result<ScoredTable, ScoreError> {
        let risks = self.stockout_risks(&table)?;

        let rows = table
            .records
            .into_iter()
            .zip(risks)
            .map(|(record, risk)| ScoredRecord::new(record, risk))
            .collect();

        Ok(ScoredTable {
            columns: table.columns,
            rows,
        })
    }

    fn stockout_risks(&self, table: &InventoryTable) -> Result<Vec<f64>, ScoreError> {
        if table.is_empty() {
            return Ok(Vec::new());
        }

        let matrix = self.pipeline.predict_proba(table)?;
        if matrix.rows() != table.len() {
            return Err(ScoreError::Inference(format!(
                "pipeline returned {} rows for {} input rows",
                matrix.rows(),
                table.len()
            )));
        }

        let risks = matrix.class_column(self.positive_class)?;
        if let Some((index, risk)) = risks
            .iter()
            .enumerate()
            .find(|(_, p)| !(0.0..=1.0).contains(*p))
        {
            return Err(ScoreError::Inference(format!(
                "row {}: stockout probability {} is outside [0, 1]",
                index + 1,
                risk
            )));
        }

        Ok(risks)
    }
}
