//! Inventory record data structures

use chrono::NaiveDate;

/// How a field's values are typed once normalized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Calendar date
    Date,
    /// Free text identifier or label
    Text,
    /// Real number; an empty cell is a missing value
    Numeric,
    /// Finite set of labels, kept as the label text
    Categorical,
}

/// The fifteen known inventory columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Date,
    StoreId,
    ProductId,
    Category,
    Region,
    InventoryLevel,
    UnitsSold,
    UnitsOrdered,
    DemandForecast,
    Price,
    Discount,
    WeatherCondition,
    HolidayPromo,
    CompetitorPricing,
    Seasonality,
}

impl Field {
    /// All fields, in upload header order
    pub const ALL: [Field; 15] = [
        Field::Date,
        Field::StoreId,
        Field::ProductId,
        Field::Category,
        Field::Region,
        Field::InventoryLevel,
        Field::UnitsSold,
        Field::UnitsOrdered,
        Field::DemandForecast,
        Field::Price,
        Field::Discount,
        Field::WeatherCondition,
        Field::HolidayPromo,
        Field::CompetitorPricing,
        Field::Seasonality,
    ];

    /// Human-readable header used in uploaded files
    pub fn upload_header(self) -> &'static str {
        match self {
            Field::Date => "Date",
            Field::StoreId => "Store ID",
            Field::ProductId => "Product ID",
            Field::Category => "Category",
            Field::Region => "Region",
            Field::InventoryLevel => "Inventory Level",
            Field::UnitsSold => "Units Sold",
            Field::UnitsOrdered => "Units Ordered",
            Field::DemandForecast => "Demand Forecast",
            Field::Price => "Price",
            Field::Discount => "Discount",
            Field::WeatherCondition => "Weather Condition",
            Field::HolidayPromo => "Holiday/Promotion",
            Field::CompetitorPricing => "Competitor Pricing",
            Field::Seasonality => "Seasonality",
        }
    }

    /// Column name in the pipeline schema
    pub fn column_name(self) -> &'static str {
        match self {
            Field::Date => "date",
            Field::StoreId => "store_id",
            Field::ProductId => "product_id",
            Field::Category => "category",
            Field::Region => "region",
            Field::InventoryLevel => "inventory_level",
            Field::UnitsSold => "units_sold",
            Field::UnitsOrdered => "units_ordered",
            Field::DemandForecast => "demand_forecast",
            Field::Price => "price",
            Field::Discount => "discount",
            Field::WeatherCondition => "weather_condition",
            Field::HolidayPromo => "holiday_promo",
            Field::CompetitorPricing => "competitor_pricing",
            Field::Seasonality => "seasonality",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Field::Date => FieldKind::Date,
            Field::StoreId
            | Field::ProductId
            | Field::Category
            | Field::Region
            | Field::WeatherCondition
            | Field::Seasonality => FieldKind::Text,
            Field::InventoryLevel
            | Field::UnitsSold
            | Field::UnitsOrdered
            | Field::DemandForecast
            | Field::Price
            | Field::Discount
            | Field::CompetitorPricing => FieldKind::Numeric,
            Field::HolidayPromo => FieldKind::Categorical,
        }
    }

    /// Look up a field by its pipeline column name
    pub fn from_column_name(name: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.column_name() == name)
    }
}

/// A categorical label (e.g. the holiday/promotion flag)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Categorical(String);

impl Categorical {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn label(&self) -> &str {
        &self.0
    }
}

/// One normalized row of an inventory upload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InventoryRecord {
    pub date: Option<NaiveDate>,
    pub store_id: String,
    pub product_id: String,
    pub category: String,
    pub region: String,
    pub inventory_level: Option<f64>,
    pub units_sold: Option<f64>,
    pub units_ordered: Option<f64>,
    pub demand_forecast: Option<f64>,
    pub price: Option<f64>,
    pub discount: Option<f64>,
    pub weather_condition: String,
    pub holiday_promo: Categorical,
    pub competitor_pricing: Option<f64>,
    pub seasonality: String,
    /// Values of unmapped columns, aligned with the table's passthrough columns
    pub passthrough: Vec<String>,
}

/// A typed view of a single cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellValue<'a> {
    Date(Option<NaiveDate>),
    Text(&'a str),
    Number(Option<f64>),
    Category(&'a str),
}

impl CellValue<'_> {
    /// Text form used for CSV export and string-typed pipeline inputs
    pub fn render(&self) -> String {
        match self {
            CellValue::Date(Some(d)) => d.format("%Y-%m-%d").to_string(),
            CellValue::Date(None) | CellValue::Number(None) => String::new(),
            CellValue::Number(Some(v)) => v.to_string(),
            CellValue::Text(s) | CellValue::Category(s) => s.to_string(),
        }
    }
}

impl InventoryRecord {
    /// Typed value of a known field
    pub fn value(&self, field: Field) -> CellValue<'_> {
        match field {
            Field::Date => CellValue::Date(self.date),
            Field::StoreId => CellValue::Text(&self.store_id),
            Field::ProductId => CellValue::Text(&self.product_id),
            Field::Category => CellValue::Text(&self.category),
            Field::Region => CellValue::Text(&self.region),
            Field::InventoryLevel => CellValue::Number(self.inventory_level),
            Field::UnitsSold => CellValue::Number(self.units_sold),
            Field::UnitsOrdered => CellValue::Number(self.units_ordered),
            Field::DemandForecast => CellValue::Number(self.demand_forecast),
            Field::Price => CellValue::Number(self.price),
            Field::Discount => CellValue::Number(self.discount),
            Field::WeatherCondition => CellValue::Text(&self.weather_condition),
            Field::HolidayPromo => CellValue::Category(self.holiday_promo.label()),
            Field::CompetitorPricing => CellValue::Number(self.competitor_pricing),
            Field::Seasonality => CellValue::Text(&self.seasonality),
        }
    }

    /// Mutable slot for a numeric field
    pub(crate) fn number_mut(&mut self, field: Field) -> Option<&mut Option<f64>> {
        match field {
            Field::InventoryLevel => Some(&mut self.inventory_level),
            Field::UnitsSold => Some(&mut self.units_sold),
            Field::UnitsOrdered => Some(&mut self.units_ordered),
            Field::DemandForecast => Some(&mut self.demand_forecast),
            Field::Price => Some(&mut self.price),
            Field::Discount => Some(&mut self.discount),
            Field::CompetitorPricing => Some(&mut self.competitor_pricing),
            _ => None,
        }
    }

    /// Mutable slot for a free-text field
    pub(crate) fn text_mut(&mut self, field: Field) -> Option<&mut String> {
        match field {
            Field::StoreId => Some(&mut self.store_id),
            Field::ProductId => Some(&mut self.product_id),
            Field::Category => Some(&mut self.category),
            Field::Region => Some(&mut self.region),
            Field::WeatherCondition => Some(&mut self.weather_condition),
            Field::Seasonality => Some(&mut self.seasonality),
            _ => None,
        }
    }
}

/// A column of a normalized table, in upload order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableColumn {
    /// One of the fifteen known fields
    Known(Field),
    /// An unmapped column carried through unchanged; `slot` indexes
    /// `InventoryRecord::passthrough`
    Passthrough { name: String, slot: usize },
}

impl TableColumn {
    pub fn name(&self) -> &str {
        match self {
            TableColumn::Known(field) => field.column_name(),
            TableColumn::Passthrough { name, .. } => name,
        }
    }

    /// Value of this column in `record`
    pub fn value<'a>(&self, record: &'a InventoryRecord) -> CellValue<'a> {
        match self {
            TableColumn::Known(field) => record.value(*field),
            TableColumn::Passthrough { slot, .. } => CellValue::Text(
                record.passthrough.get(*slot).map(String::as_str).unwrap_or(""),
            ),
        }
    }
}

/// A normalized upload: ordered columns plus typed rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InventoryTable {
    pub columns: Vec<TableColumn>,
    pub records: Vec<InventoryRecord>,
}

impl InventoryTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Column names in order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(TableColumn::name).collect()
    }

    /// Find a column by its normalized name
    pub fn column(&self, name: &str) -> Option<&TableColumn> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// All values of the named column, one per record
    pub fn column_values(&self, name: &str) -> Option<Vec<CellValue<'_>>> {
        let column = self.column(name)?;
        Some(self.records.iter().map(|r| column.value(r)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_lookup_by_column_name() {
        for field in Field::ALL {
            assert_eq!(Field::from_column_name(field.column_name()), Some(field));
        }
        assert_eq!(Field::from_column_name("Store ID"), None);
    }

    #[test]
    fn test_cell_rendering() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1);
        assert_eq!(CellValue::Date(date).render(), "2024-01-01");
        assert_eq!(CellValue::Number(Some(100.0)).render(), "100");
        assert_eq!(CellValue::Number(Some(9.99)).render(), "9.99");
        assert_eq!(CellValue::Number(None).render(), "");
        assert_eq!(CellValue::Category("1").render(), "1");
    }

    #[test]
    fn test_passthrough_column_value() {
        let record = InventoryRecord {
            store_id: "S1".to_string(),
            passthrough: vec!["north-east".to_string()],
            ..Default::default()
        };
        let zone = TableColumn::Passthrough {
            name: "Zone".to_string(),
            slot: 0,
        };
        assert_eq!(zone.value(&record), CellValue::Text("north-east"));
        assert_eq!(
            TableColumn::Known(Field::StoreId).value(&record),
            CellValue::Text("S1")
        );
    }
}
