//! Pipeline loading and inference

pub mod inference;
pub mod loader;
pub mod pipeline;

pub use inference::OnnxPipeline;
pub use loader::{ArtifactFormat, ModelLoader, OnnxFormat};
pub use pipeline::{Pipeline, PipelineError, ProbabilityMatrix};
