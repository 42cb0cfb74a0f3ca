//! Retail Stockout Risk Scoring
//!
//! Scores inventory uploads for stockout risk with a pre-trained
//! classification pipeline and returns the augmented table, with an
//! economic impact estimate per row, as HTML, JSON or CSV.

pub mod config;
pub mod error;
pub mod export;
pub mod metrics;
pub mod models;
pub mod normalizer;
pub mod render;
pub mod scoring;
pub mod server;
pub mod types;

pub use config::AppConfig;
pub use error::{LoaderError, ScoreError};
pub use models::loader::ModelLoader;
pub use models::pipeline::{Pipeline, ProbabilityMatrix};
pub use normalizer::Normalizer;
pub use scoring::{ScoreReport, Scorer};
pub use server::{build_router, AppState};
pub use types::{InventoryRecord, InventoryTable, ScoredRecord, ScoredTable};
