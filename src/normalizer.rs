//! Upload normalization: CSV parsing, header renaming and type coercion.
//!
//! Turns the raw bytes of an inventory upload into an [`InventoryTable`]
//! whose column names match the schema the pipeline was trained on.
//! Headers outside the rename table pass through unchanged.

use crate::error::{SchemaViolation, ScoreError};
use crate::types::record::{
    Categorical, Field, FieldKind, InventoryRecord, InventoryTable, TableColumn,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::collections::HashSet;
use tracing::debug;

/// Upload header → pipeline column name
pub const COLUMN_RENAMES: [(&str, &str); 15] = [
    ("Date", "date"),
    ("Store ID", "store_id"),
    ("Product ID", "product_id"),
    ("Category", "category"),
    ("Region", "region"),
    ("Inventory Level", "inventory_level"),
    ("Units Sold", "units_sold"),
    ("Units Ordered", "units_ordered"),
    ("Demand Forecast", "demand_forecast"),
    ("Price", "price"),
    ("Discount", "discount"),
    ("Weather Condition", "weather_condition"),
    ("Holiday/Promotion", "holiday_promo"),
    ("Competitor Pricing", "competitor_pricing"),
    ("Seasonality", "seasonality"),
];

/// Columns the scorer itself reads, whatever the pipeline needs
pub const SCORING_COLUMNS: [&str; 4] = ["store_id", "product_id", "demand_forecast", "price"];

/// Cell texts read as a missing value in numeric and date columns
const MISSING_MARKERS: [&str; 8] = ["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None"];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"];

/// Map an upload header to its pipeline column name
pub fn rename_column(header: &str) -> &str {
    COLUMN_RENAMES
        .iter()
        .find(|(from, _)| *from == header)
        .map(|(_, to)| *to)
        .unwrap_or(header)
}

/// Raw CSV content: header plus string rows of equal width
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Decode CSV bytes. Rows of a different width than the header are rejected.
pub fn read_csv(bytes: &[u8]) -> Result<RawTable, ScoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(ScoreError::Parse("the file has no header row".to_string()));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }

    Ok(RawTable { headers, rows })
}

/// Normalizes uploads against the set of columns the pipeline requires
pub struct Normalizer {
    required: Vec<String>,
}

impl Normalizer {
    /// Create a normalizer. `pipeline_columns` are the inputs the pipeline
    /// declares; the scorer's own columns are always required too.
    pub fn new<I, S>(pipeline_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut required: Vec<String> = Vec::new();
        for column in pipeline_columns
            .into_iter()
            .map(Into::into)
            .chain(SCORING_COLUMNS.iter().map(|c| c.to_string()))
        {
            if !required.contains(&column) {
                required.push(column);
            }
        }
        Self { required }
    }

    /// Columns an upload must provide after renaming
    pub fn required_columns(&self) -> &[String] {
        &self.required
    }

    /// Parse and normalize an upload in one step
    pub fn normalize_bytes(&self, bytes: &[u8]) -> Result<InventoryTable, ScoreError> {
        let raw = read_csv(bytes)?;
        self.normalize(raw)
    }

    /// Rename headers, check the schema, and type every row
    pub fn normalize(&self, raw: RawTable) -> Result<InventoryTable, ScoreError> {
        let columns = self.resolve_columns(&raw.headers)?;

        let mut records = Vec::with_capacity(raw.rows.len());
        for (index, row) in raw.rows.into_iter().enumerate() {
            records.push(coerce_row(&columns, row, index + 1)?);
        }

        debug!(
            rows = records.len(),
            columns = columns.len(),
            "Upload normalized"
        );

        Ok(InventoryTable { columns, records })
    }

    fn resolve_columns(&self, headers: &[String]) -> Result<Vec<TableColumn>, ScoreError> {
        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(headers.len());
        let mut passthrough_slots = 0;

        for header in headers {
            let name = rename_column(header);
            if !seen.insert(name.to_string()) {
                return Err(ScoreError::Schema(SchemaViolation::DuplicateColumn(
                    name.to_string(),
                )));
            }

            match Field::from_column_name(name) {
                Some(field) => columns.push(TableColumn::Known(field)),
                None => {
                    columns.push(TableColumn::Passthrough {
                        name: name.to_string(),
                        slot: passthrough_slots,
                    });
                    passthrough_slots += 1;
                }
            }
        }

        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|c| !seen.contains(c.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ScoreError::Schema(SchemaViolation::MissingColumns(missing)));
        }

        Ok(columns)
    }
}

fn coerce_row(
    columns: &[TableColumn],
    row: Vec<String>,
    row_number: usize,
) -> Result<InventoryRecord, ScoreError> {
    let mut record = InventoryRecord::default();

    for (column, cell) in columns.iter().zip(row) {
        let field = match column {
            TableColumn::Known(field) => *field,
            TableColumn::Passthrough { .. } => {
                record.passthrough.push(cell);
                continue;
            }
        };

        match field.kind() {
            FieldKind::Date => {
                record.date = parse_date(&cell).ok_or_else(|| ScoreError::TypeCoercion {
                    row: row_number,
                    column: field.column_name().to_string(),
                    value: cell.clone(),
                    expected: "a calendar date",
                })?;
            }
            FieldKind::Numeric => {
                let value = parse_number(&cell).ok_or_else(|| ScoreError::TypeCoercion {
                    row: row_number,
                    column: field.column_name().to_string(),
                    value: cell.clone(),
                    expected: "a number",
                })?;
                if let Some(slot) = record.number_mut(field) {
                    *slot = value;
                }
            }
            FieldKind::Categorical => record.holiday_promo = Categorical::new(cell.trim()),
            FieldKind::Text => {
                if let Some(slot) = record.text_mut(field) {
                    *slot = cell;
                }
            }
        }
    }

    Ok(record)
}

fn is_missing(cell: &str) -> bool {
    MISSING_MARKERS.contains(&cell)
}

/// `None` when the cell is unparseable, `Some(None)` when it is missing
fn parse_number(cell: &str) -> Option<Option<f64>> {
    let cell = cell.trim();
    if is_missing(cell) {
        return Some(None);
    }
    cell.parse::<f64>().ok().map(Some)
}

/// `None` when the cell is unparseable, `Some(None)` when it is missing
pub fn parse_date(cell: &str) -> Option<Option<NaiveDate>> {
    let cell = cell.trim();
    if is_missing(cell) {
        return Some(None);
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(cell, format) {
            return Some(Some(date));
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(cell, format) {
            return Some(Some(datetime.date()));
        }
    }
    DateTime::parse_from_rfc3339(cell)
        .ok()
        .map(|dt| Some(dt.date_naive()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::record::CellValue;

    const HEADER: &str = "Date,Store ID,Product ID,Category,Region,Inventory Level,Units Sold,Units Ordered,Demand Forecast,Price,Discount,Weather Condition,Holiday/Promotion,Competitor Pricing,Seasonality";
    const ROW: &str = "2024-01-01,S1,P1,Food,North,100,20,30,25,9.99,0,Sunny,0,9.50,Winter";

    fn normalizer() -> Normalizer {
        Normalizer::new(Field::ALL.iter().map(|f| f.column_name()))
    }

    #[test]
    fn test_rename_table_is_exact() {
        for field in Field::ALL {
            assert_eq!(rename_column(field.upload_header()), field.column_name());
        }
        assert_eq!(rename_column("Shelf Zone"), "Shelf Zone");
    }

    #[test]
    fn test_normalize_full_row() {
        let csv = format!("{HEADER}\n{ROW}\n");
        let table = normalizer().normalize_bytes(csv.as_bytes()).unwrap();

        let expected: Vec<&str> = COLUMN_RENAMES.iter().map(|(_, to)| *to).collect();
        assert_eq!(table.column_names(), expected);
        assert_eq!(table.len(), 1);

        let record = &table.records[0];
        assert_eq!(record.store_id, "S1");
        assert_eq!(record.demand_forecast, Some(25.0));
        assert_eq!(record.price, Some(9.99));
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(record.holiday_promo.label(), "0");
    }

    #[test]
    fn test_passthrough_columns_keep_position() {
        let csv = format!("Zone,{HEADER}\nA7,{ROW}\n");
        let table = normalizer().normalize_bytes(csv.as_bytes()).unwrap();

        assert_eq!(table.column_names()[0], "Zone");
        assert_eq!(table.column_values("Zone").unwrap(), vec![CellValue::Text("A7")]);
    }

    #[test]
    fn test_missing_price_is_schema_error() {
        let header = HEADER.replace(",Price", "");
        let row = ROW.replace(",9.99", "");
        let csv = format!("{header}\n{row}\n");

        match normalizer().normalize_bytes(csv.as_bytes()) {
            Err(ScoreError::Schema(SchemaViolation::MissingColumns(missing))) => {
                assert_eq!(missing, vec!["price".to_string()]);
            }
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_after_rename_is_schema_error() {
        let csv = format!("{HEADER},price\n{ROW},1\n");
        let err = normalizer().normalize_bytes(csv.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            ScoreError::Schema(SchemaViolation::DuplicateColumn(ref c)) if c == "price"
        ));
    }

    #[test]
    fn test_unparseable_date_reports_row() {
        let bad = ROW.replace("2024-01-01", "not-a-date");
        let csv = format!("{HEADER}\n{ROW}\n{bad}\n");

        match normalizer().normalize_bytes(csv.as_bytes()) {
            Err(ScoreError::TypeCoercion { row, column, value, .. }) => {
                assert_eq!(row, 2);
                assert_eq!(column, "date");
                assert_eq!(value, "not-a-date");
            }
            other => panic!("expected type coercion error, got {:?}", other),
        }
    }

    #[test]
    fn test_non_numeric_price_is_type_coercion() {
        let csv = format!("{HEADER}\n{}\n", ROW.replace(",9.99,", ",abc,"));

        match normalizer().normalize_bytes(csv.as_bytes()) {
            Err(ScoreError::TypeCoercion { row, column, value, expected }) => {
                assert_eq!(row, 1);
                assert_eq!(column, "price");
                assert_eq!(value, "abc");
                assert_eq!(expected, "a number");
            }
            other => panic!("expected type coercion error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_utf8_is_parse_error() {
        let err = normalizer()
            .normalize_bytes(b"Date,Store ID\n\xff\xfe,S1\n")
            .unwrap_err();
        assert!(matches!(err, ScoreError::Parse(_)));
    }

    #[test]
    fn test_missing_numeric_is_none() {
        let row = ROW.replace(",25,", ",,");
        let csv = format!("{HEADER}\n{row}\n");
        let table = normalizer().normalize_bytes(csv.as_bytes()).unwrap();
        assert_eq!(table.records[0].demand_forecast, None);
    }

    #[test]
    fn test_ragged_rows_are_parse_errors() {
        let csv = format!("{HEADER}\n2024-01-01,S1\n");
        let err = normalizer().normalize_bytes(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, ScoreError::Parse(_)));
    }

    #[test]
    fn test_empty_upload_is_parse_error() {
        let err = normalizer().normalize_bytes(b"").unwrap_err();
        assert!(matches!(err, ScoreError::Parse(_)));
    }

    #[test]
    fn test_date_formats() {
        let jan_first = NaiveDate::from_ymd_opt(2024, 1, 1);
        assert_eq!(parse_date("2024-01-01"), Some(jan_first));
        assert_eq!(parse_date("2024/01/01"), Some(jan_first));
        assert_eq!(parse_date("01/01/2024"), Some(jan_first));
        assert_eq!(parse_date("2024-01-01 13:45:00"), Some(jan_first));
        assert_eq!(parse_date("2024-01-01T00:00:00+02:00"), Some(jan_first));
        assert_eq!(parse_date(""), Some(None));
        assert_eq!(parse_date("tomorrow"), None);
    }

    #[test]
    fn test_required_columns_include_scoring_columns() {
        let normalizer = Normalizer::new(["date", "price"]);
        assert_eq!(
            normalizer.required_columns(),
            &["date", "price", "store_id", "product_id", "demand_forecast"]
        );
    }
}
