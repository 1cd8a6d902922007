use crate::error::QueryError;
use crate::query::{QueryBuilder, ResultRow};
use crate::schema::FieldDescriptor;
use serde::Serialize;
use serde_json::{Map, Value};

/// Output shape of an extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractFormat {
    /// Bare sequence of values; `key_field` is ignored.
    Array,
    /// `{x, y}` coordinate pairs, one per row, for charting.
    Point,
    /// Mapping from key-field value to field value, last write wins.
    Object,
}

/// Equality condition a row must satisfy to survive extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterPair {
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Field to extract, normally a key figure but any field works.
    pub field: String,
    /// All pairs must match for a row to be included; empty keeps every row.
    pub filter: Vec<FilterPair>,
    pub format: ExtractFormat,
    /// Required for `Point` and `Object`, ignored for `Array`.
    pub key_field: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPoint {
    pub x: Value,
    pub y: Value,
}

/// An extraction result in the requested shape.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesData {
    Array(Vec<Value>),
    Points(Vec<DataPoint>),
    Object(Map<String, Value>),
}

/// Read-only projections over a query's result rows.
///
/// Every operation is a pure pass over the data set; nothing here talks
/// to the network or mutates the builder.
pub struct ResultExtractor<'a> {
    query: &'a QueryBuilder,
}

impl<'a> ResultExtractor<'a> {
    pub fn new(query: &'a QueryBuilder) -> Self {
        Self { query }
    }

    /// Convenience lookup by field name, case-insensitive. The setters on
    /// the builder stay case-sensitive; only this lookup relaxes casing.
    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.query
            .catalog()
            .fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Distinct values of `field` across all rows, in first-occurrence
    /// order.
    pub fn series_values(&self, field: &str) -> Vec<Value> {
        let mut values: Vec<Value> = Vec::new();
        for row in self.query.data_set() {
            let value = row.get(field).cloned().unwrap_or(Value::Null);
            if !values.contains(&value) {
                values.push(value);
            }
        }
        values
    }

    /// Filters the data set and projects it into the requested shape.
    pub fn extract(&self, options: &ExtractOptions) -> Result<SeriesData, QueryError> {
        let rows: Vec<&ResultRow> = self
            .query
            .data_set()
            .iter()
            .filter(|row| {
                options
                    .filter
                    .iter()
                    .all(|pair| row.get(&pair.field) == Some(&pair.value))
            })
            .collect();

        let value_of =
            |row: &ResultRow, key: &str| row.get(key).cloned().unwrap_or(Value::Null);

        match options.format {
            ExtractFormat::Array => Ok(SeriesData::Array(
                rows.into_iter()
                    .map(|row| value_of(row, &options.field))
                    .collect(),
            )),
            ExtractFormat::Point => {
                let key_field = options
                    .key_field
                    .as_deref()
                    .ok_or_else(|| QueryError::MissingKeyField("point".to_string()))?;
                Ok(SeriesData::Points(
                    rows.into_iter()
                        .map(|row| DataPoint {
                            x: value_of(row, key_field),
                            y: value_of(row, &options.field),
                        })
                        .collect(),
                ))
            }
            ExtractFormat::Object => {
                let key_field = options
                    .key_field
                    .as_deref()
                    .ok_or_else(|| QueryError::MissingKeyField("object".to_string()))?;
                let mut mapping = Map::new();
                for row in rows {
                    let key = match value_of(row, key_field) {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    mapping.insert(key, value_of(row, &options.field));
                }
                Ok(SeriesData::Object(mapping))
            }
        }
    }
}
