//! ONNX Runtime implementation of the scoring pipeline

use crate::error::LoaderError;
use crate::models::pipeline::{Pipeline, PipelineError, ProbabilityMatrix};
use crate::types::record::{CellValue, InventoryTable};
use anyhow::Context;
use chrono::Datelike;
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use ort::tensor::TensorElementType;
use ort::value::{
    DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor, ValueType,
};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// `NaiveDate::num_days_from_ce` of 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i64 = 719_163;

/// A declared graph input: one per pipeline column
#[derive(Debug, Clone)]
struct InputSpec {
    name: String,
    ty: TensorElementType,
}

/// Exported classification pipeline running on ONNX Runtime.
///
/// Each graph input is one table column of shape `[N, 1]`, which is how
/// column-transformer pipelines are exported. The session needs exclusive
/// access to run, so calls are serialized through a mutex.
pub struct OnnxPipeline {
    name: String,
    session: Mutex<Session>,
    inputs: Vec<InputSpec>,
    output_name: String,
}

impl OnnxPipeline {
    /// Load an exported pipeline from file
    pub fn load<P: AsRef<Path>>(path: P, onnx_threads: usize) -> Result<Self, LoaderError> {
        let path = path.as_ref();
        let load_err = |reason: String| LoaderError::Load {
            path: path.to_path_buf(),
            reason,
        };

        info!(path = %path.display(), threads = onnx_threads, "Loading ONNX pipeline");

        let session =
            build_session(path, onnx_threads).map_err(|e| load_err(format!("{:#}", e)))?;

        let mut inputs = Vec::with_capacity(session.inputs.len());
        for input in &session.inputs {
            match &input.input_type {
                ValueType::Tensor { ty, .. } => inputs.push(InputSpec {
                    name: input.name.clone(),
                    ty: *ty,
                }),
                other => {
                    return Err(load_err(
                        PipelineError::UnsupportedInput {
                            input: input.name.clone(),
                            ty: format!("{:?}", other),
                        }
                        .to_string(),
                    ))
                }
            }
        }

        let output_names: Vec<&str> = session.outputs.iter().map(|o| o.name.as_str()).collect();
        let output_name = probability_output(&output_names);

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "pipeline".to_string());

        info!(
            pipeline = %name,
            inputs = inputs.len(),
            output = %output_name,
            "Pipeline loaded successfully"
        );

        Ok(Self {
            name,
            session: Mutex::new(session),
            inputs,
            output_name,
        })
    }

    /// Extract the probability matrix from the session outputs.
    /// Handles both tensor outputs `[N, C]` and seq(map(int64, float)) outputs.
    fn extract_probabilities(
        &self,
        outputs: &SessionOutputs,
        rows: usize,
    ) -> Result<ProbabilityMatrix, PipelineError> {
        if let Some(output) = outputs.get(self.output_name.as_str()) {
            if let Some(matrix) = self.try_extract(output, rows)? {
                return Ok(matrix);
            }
        }

        for (name, output) in outputs.iter() {
            // Skip "label" output
            if name.contains("label") {
                continue;
            }
            if let Some(matrix) = self.try_extract(&output, rows)? {
                debug!(pipeline = %self.name, output = %name, "Extracted probabilities (fallback)");
                return Ok(matrix);
            }
        }

        Err(PipelineError::Output("no probability output found".to_string()))
    }

    fn try_extract(
        &self,
        output: &DynValue,
        rows: usize,
    ) -> Result<Option<ProbabilityMatrix>, PipelineError> {
        if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
            let dims: Vec<i64> = shape.iter().copied().collect();
            let data = data.iter().map(|&v| v as f64).collect();
            return tensor_to_matrix(&dims, data, rows).map(Some);
        }
        if let Ok((shape, data)) = output.try_extract_tensor::<f64>() {
            let dims: Vec<i64> = shape.iter().copied().collect();
            return tensor_to_matrix(&dims, data.to_vec(), rows).map(Some);
        }

        let dtype = output.dtype();
        if DynSequenceValueType::can_downcast(&dtype) {
            return extract_from_sequence_map(output, rows).map(Some);
        }

        Ok(None)
    }
}

impl Pipeline for OnnxPipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_columns(&self) -> Vec<String> {
        self.inputs.iter().map(|i| i.name.clone()).collect()
    }

    fn predict_proba(&self, table: &InventoryTable) -> Result<ProbabilityMatrix, PipelineError> {
        let rows = table.len();
        let mut inputs: Vec<(String, DynValue)> = Vec::with_capacity(self.inputs.len());
        for spec in &self.inputs {
            let values = table
                .column_values(&spec.name)
                .ok_or_else(|| PipelineError::MissingColumn(spec.name.clone()))?;
            inputs.push((spec.name.clone(), input_tensor(spec, &values)?));
        }

        let mut session = self
            .session
            .lock()
            .map_err(|e| PipelineError::Runtime(format!("Lock error: {}", e)))?;
        let outputs = session.run(inputs).map_err(runtime_err)?;

        let matrix = self.extract_probabilities(&outputs, rows)?;
        debug!(
            pipeline = %self.name,
            rows = rows,
            classes = matrix.classes(),
            "Inference complete"
        );
        Ok(matrix)
    }
}

fn build_session(path: &Path, onnx_threads: usize) -> anyhow::Result<Session> {
    ort::init().commit()?;

    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(onnx_threads)?
        .commit_from_file(path)
        .with_context(|| format!("Failed to load model from {:?}", path))?;

    Ok(session)
}

fn runtime_err<E: std::fmt::Display>(e: E) -> PipelineError {
    PipelineError::Runtime(e.to_string())
}

/// Build the `[N, 1]` tensor for one column, typed as the graph declares
fn input_tensor(spec: &InputSpec, values: &[CellValue<'_>]) -> Result<DynValue, PipelineError> {
    let shape = vec![values.len() as i64, 1_i64];

    match spec.ty {
        TensorElementType::String => {
            let data: Vec<String> = values.iter().map(CellValue::render).collect();
            Tensor::from_string_array((shape, &data[..]))
                .map(|t| t.into_dyn())
                .map_err(runtime_err)
        }
        TensorElementType::Float32 => {
            let data = values
                .iter()
                .map(|v| numeric(&spec.name, v).map(|n| n.unwrap_or(f64::NAN) as f32))
                .collect::<Result<Vec<f32>, _>>()?;
            Tensor::from_array((shape, data))
                .map(|t| t.into_dyn())
                .map_err(runtime_err)
        }
        TensorElementType::Float64 => {
            let data = values
                .iter()
                .map(|v| numeric(&spec.name, v).map(|n| n.unwrap_or(f64::NAN)))
                .collect::<Result<Vec<f64>, _>>()?;
            Tensor::from_array((shape, data))
                .map(|t| t.into_dyn())
                .map_err(runtime_err)
        }
        TensorElementType::Int64 => {
            let data = values
                .iter()
                .map(|v| integral(&spec.name, v))
                .collect::<Result<Vec<i64>, _>>()?;
            Tensor::from_array((shape, data))
                .map(|t| t.into_dyn())
                .map_err(runtime_err)
        }
        other => Err(PipelineError::UnsupportedInput {
            input: spec.name.clone(),
            ty: format!("{:?}", other),
        }),
    }
}

/// Numeric form of a cell; dates become days since 1970-01-01
fn numeric(column: &str, value: &CellValue<'_>) -> Result<Option<f64>, PipelineError> {
    match value {
        CellValue::Number(n) => Ok(*n),
        CellValue::Date(d) => {
            Ok(d.map(|d| (d.num_days_from_ce() as i64 - UNIX_EPOCH_DAYS_FROM_CE) as f64))
        }
        CellValue::Text(s) | CellValue::Category(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            s.parse::<f64>().map(Some).map_err(|_| PipelineError::ColumnType {
                column: column.to_string(),
                expected: "numeric".to_string(),
                value: s.to_string(),
            })
        }
    }
}

fn integral(column: &str, value: &CellValue<'_>) -> Result<i64, PipelineError> {
    let mismatch = || PipelineError::ColumnType {
        column: column.to_string(),
        expected: "integer".to_string(),
        value: value.render(),
    };
    match numeric(column, value)? {
        Some(n) if n.fract() == 0.0 && n.is_finite() => Ok(n as i64),
        _ => Err(mismatch()),
    }
}

/// Shape a flat probability tensor into a matrix with `rows` rows.
/// A single probability per row is read as the positive class of a binary model.
fn tensor_to_matrix(
    dims: &[i64],
    data: Vec<f64>,
    rows: usize,
) -> Result<ProbabilityMatrix, PipelineError> {
    let single_column = match dims {
        [n, 1] | [n] => *n as usize == rows,
        _ => false,
    };
    if single_column {
        let expanded = data.into_iter().flat_map(|p| [1.0 - p, p]).collect();
        return ProbabilityMatrix::new(rows, 2, expanded);
    }

    match dims {
        [n, classes] if *n as usize == rows => {
            ProbabilityMatrix::new(rows, *classes as usize, data)
        }
        _ => Err(PipelineError::Output(format!(
            "probability tensor of shape {:?} does not match {} input rows",
            dims, rows
        ))),
    }
}

/// Extract probabilities from seq(map(int64, float)) format, one map per row
fn extract_from_sequence_map(
    output: &DynValue,
    rows: usize,
) -> Result<ProbabilityMatrix, PipelineError> {
    let allocator = Allocator::default();

    let sequence = output
        .downcast_ref::<DynSequenceValueType>()
        .map_err(|e| PipelineError::Output(format!("Failed to downcast to sequence: {}", e)))?;

    let maps = sequence
        .try_extract_sequence::<DynMapValueType>(&allocator)
        .map_err(|e| PipelineError::Output(e.to_string()))?;

    if maps.len() != rows {
        return Err(PipelineError::Output(format!(
            "{} probability maps for {} input rows",
            maps.len(),
            rows
        )));
    }

    let mut matrix_rows = Vec::with_capacity(rows);
    for map_value in &maps {
        let mut kv_pairs = map_value
            .try_extract_key_values::<i64, f32>()
            .map_err(|e| PipelineError::Output(e.to_string()))?;
        kv_pairs.sort_by_key(|(class_id, _)| *class_id);
        matrix_rows.push(kv_pairs.into_iter().map(|(_, p)| p as f64).collect());
    }

    ProbabilityMatrix::from_rows(matrix_rows)
}

/// Pick the output holding class probabilities. A "prob" name wins over a
/// generic "output" name, which skl2onnx also gives the label output.
fn probability_output(names: &[&str]) -> String {
    names
        .iter()
        .find(|n| n.contains("prob"))
        .or_else(|| {
            names
                .iter()
                .find(|n| n.contains("output") && !n.contains("label"))
        })
        .or_else(|| names.last())
        .map(|n| n.to_string())
        .unwrap_or_else(|| "probabilities".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_probability_output_prefers_prob_over_label() {
        assert_eq!(
            probability_output(&["output_label", "output_probability"]),
            "output_probability"
        );
        assert_eq!(probability_output(&["label", "output"]), "output");
        assert_eq!(probability_output(&["logits"]), "logits");
        assert_eq!(probability_output(&[]), "probabilities");
    }

    #[test]
    fn test_two_class_tensor() {
        let matrix = tensor_to_matrix(&[2, 2], vec![0.9, 0.1, 0.3, 0.7], 2).unwrap();
        assert_eq!(matrix.class_column(1).unwrap(), vec![0.1, 0.7]);
    }

    #[test]
    fn test_single_probability_column_expands_to_binary() {
        let matrix = tensor_to_matrix(&[2, 1], vec![0.2, 0.6], 2).unwrap();
        assert_eq!(matrix.classes(), 2);
        assert_eq!(matrix.class_column(1).unwrap(), vec![0.2, 0.6]);
        assert!((matrix.class_column(0).unwrap()[0] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_row_count_mismatch() {
        assert!(tensor_to_matrix(&[3, 2], vec![0.5; 6], 2).is_err());
    }

    #[test]
    fn test_dates_become_epoch_days() {
        let date = NaiveDate::from_ymd_opt(1970, 1, 11);
        assert_eq!(numeric("date", &CellValue::Date(date)).unwrap(), Some(10.0));
    }

    #[test]
    fn test_text_in_numeric_input_names_column() {
        let err = numeric("holiday_promo", &CellValue::Category("yes")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "column 'holiday_promo' expects numeric values, got 'yes'"
        );
        assert_eq!(numeric("holiday_promo", &CellValue::Category("1")).unwrap(), Some(1.0));
    }

    #[test]
    fn test_integral_rejects_fractions_and_missing() {
        assert_eq!(integral("units_sold", &CellValue::Number(Some(20.0))).unwrap(), 20);
        assert!(integral("price", &CellValue::Number(Some(9.99))).is_err());
        assert!(integral("price", &CellValue::Number(None)).is_err());
    }

    #[test]
    fn test_corrupt_artifact_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipe_execution.onnx");
        std::fs::write(&path, b"definitely not a protobuf graph").unwrap();

        match OnnxPipeline::load(&path, 1) {
            Err(LoaderError::Load { path: p, .. }) => assert_eq!(p, path),
            Err(other) => panic!("expected load error, got {}", other),
            Ok(_) => panic!("garbage artifact loaded"),
        }
    }
}
