//! Type definitions for the stockout scoring service

pub mod record;
pub mod scored;

pub use record::{CellValue, Field, FieldKind, InventoryRecord, InventoryTable, TableColumn};
pub use scored::{ScoredRecord, ScoredTable};
