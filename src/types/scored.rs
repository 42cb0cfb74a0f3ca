//! Scored inventory records

use crate::types::record::{InventoryRecord, TableColumn};

/// Name of the appended probability column
pub const STOCKOUT_RISK_COLUMN: &str = "stockout_risk";
/// Name of the appended revenue-at-risk column
pub const ECONOMIC_IMPACT_COLUMN: &str = "economic_impact";

/// An inventory record with its model score and derived metric
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: InventoryRecord,
    /// Probability of the stockout class, in [0, 1]
    pub stockout_risk: f64,
    /// `stockout_risk * demand_forecast * price`; missing when either input is
    pub economic_impact: Option<f64>,
}

impl ScoredRecord {
    pub fn new(record: InventoryRecord, stockout_risk: f64) -> Self {
        let economic_impact = economic_impact(
            stockout_risk,
            record.demand_forecast,
            record.price,
        );
        Self {
            record,
            stockout_risk,
            economic_impact,
        }
    }
}

/// Revenue at risk for one row
pub fn economic_impact(
    stockout_risk: f64,
    demand_forecast: Option<f64>,
    price: Option<f64>,
) -> Option<f64> {
    Some(stockout_risk * demand_forecast? * price?)
}

/// The full augmented table returned for an upload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoredTable {
    /// Input columns in upload order; the two score columns follow them
    pub columns: Vec<TableColumn>,
    pub rows: Vec<ScoredRecord>,
}

impl ScoredTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Header of the exported table
    pub fn header(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(TableColumn::name)
            .chain([STOCKOUT_RISK_COLUMN, ECONOMIC_IMPACT_COLUMN])
            .collect()
    }

    /// Rendered cells of one row, aligned with `header()`
    pub fn render_row(&self, row: &ScoredRecord) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| c.value(&row.record).render())
            .chain([
                row.stockout_risk.to_string(),
                row.economic_impact.map(|v| v.to_string()).unwrap_or_default(),
            ])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::record::Field;

    #[test]
    fn test_economic_impact_formula() {
        let impact = economic_impact(0.4, Some(25.0), Some(9.99)).unwrap();
        assert!((impact - 0.4 * 25.0 * 9.99).abs() < 1e-12);
    }

    #[test]
    fn test_economic_impact_missing_inputs() {
        assert_eq!(economic_impact(0.4, None, Some(9.99)), None);
        assert_eq!(economic_impact(0.4, Some(25.0), None), None);
    }

    #[test]
    fn test_header_and_row_alignment() {
        let record = InventoryRecord {
            store_id: "S1".to_string(),
            price: Some(2.5),
            demand_forecast: None,
            ..Default::default()
        };
        let table = ScoredTable {
            columns: vec![TableColumn::Known(Field::StoreId), TableColumn::Known(Field::Price)],
            rows: vec![ScoredRecord::new(record, 0.5)],
        };

        assert_eq!(
            table.header(),
            vec!["store_id", "price", "stockout_risk", "economic_impact"]
        );
        assert_eq!(table.render_row(&table.rows[0]), vec!["S1", "2.5", "0.5", ""]);
    }
}
