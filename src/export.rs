//! Rendering of scored tables: preview/result views and CSV export

use crate::types::record::Field;
use crate::types::scored::{ScoredTable, ECONOMIC_IMPACT_COLUMN, STOCKOUT_RISK_COLUMN};
use serde::Serialize;

/// File name offered for the CSV download
pub const EXPORT_FILE_NAME: &str = "predictions.csv";
/// MIME type of the CSV download
pub const EXPORT_CONTENT_TYPE: &str = "text/csv";

/// A rendered table: header plus text rows
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableView {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// First `limit` rows of the normalized input columns
pub fn preview_view(table: &ScoredTable, limit: usize) -> TableView {
    TableView {
        header: table.columns.iter().map(|c| c.name().to_string()).collect(),
        rows: table
            .rows
            .iter()
            .take(limit)
            .map(|row| {
                table
                    .columns
                    .iter()
                    .map(|c| c.value(&row.record).render())
                    .collect()
            })
            .collect(),
    }
}

/// First `limit` rows of {store_id, product_id, stockout_risk, economic_impact}
pub fn results_view(table: &ScoredTable, limit: usize) -> TableView {
    TableView {
        header: vec![
            Field::StoreId.column_name().to_string(),
            Field::ProductId.column_name().to_string(),
            STOCKOUT_RISK_COLUMN.to_string(),
            ECONOMIC_IMPACT_COLUMN.to_string(),
        ],
        rows: table
            .rows
            .iter()
            .take(limit)
            .map(|row| {
                vec![
                    row.record.store_id.clone(),
                    row.record.product_id.clone(),
                    row.stockout_risk.to_string(),
                    row.economic_impact.map(|v| v.to_string()).unwrap_or_default(),
                ]
            })
            .collect(),
    }
}

/// Serialize the full augmented table: header row, no index column
pub fn to_csv(table: &ScoredTable) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(table.header())?;
    for row in &table.rows {
        writer.write_record(table.render_row(row))?;
    }
    writer.into_inner().map_err(|e| e.into_error().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::record::{InventoryRecord, TableColumn};
    use crate::types::scored::ScoredRecord;

    fn table() -> ScoredTable {
        let rows = (0..30)
            .map(|i| {
                let record = InventoryRecord {
                    store_id: format!("S{}", i),
                    product_id: "P1, large".to_string(),
                    demand_forecast: Some(10.0),
                    price: Some(2.0),
                    ..Default::default()
                };
                ScoredRecord::new(record, 0.25)
            })
            .collect();
        ScoredTable {
            columns: vec![
                TableColumn::Known(Field::StoreId),
                TableColumn::Known(Field::ProductId),
                TableColumn::Known(Field::DemandForecast),
                TableColumn::Known(Field::Price),
            ],
            rows,
        }
    }

    #[test]
    fn test_views_are_truncated() {
        let table = table();
        let preview = preview_view(&table, 5);
        assert_eq!(preview.rows.len(), 5);
        assert_eq!(preview.header, vec!["store_id", "product_id", "demand_forecast", "price"]);

        let results = results_view(&table, 20);
        assert_eq!(results.rows.len(), 20);
        assert_eq!(results.rows[3], vec!["S3", "P1, large", "0.25", "5"]);
    }

    #[test]
    fn test_csv_export_reparses() {
        let table = table();
        let bytes = to_csv(&table).unwrap();

        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(
            header,
            vec![
                "store_id",
                "product_id",
                "demand_forecast",
                "price",
                "stockout_risk",
                "economic_impact"
            ]
        );

        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), table.len());
        assert_eq!(&rows[0][1], "P1, large");
        assert_eq!(&rows[0][5], "5");
    }
}
