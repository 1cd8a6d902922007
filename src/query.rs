use crate::error::QueryError;
use crate::schema::SchemaCatalog;
use crate::transport::Transport;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Characters escaped when a value is embedded in the query URL. Keeps
/// the marks the backend accepts unescaped inside quoted literals.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// One post-selection condition. The operator is an open string so any
/// operator the backend understands can pass through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterClause {
    pub field: String,
    pub operator: String,
    pub value: String,
}

/// One row of an executed query, as returned by the backend.
pub type ResultRow = serde_json::Map<String, Value>;

/// A validated, mutable query specification against one catalog.
///
/// Setters replace their part of the specification wholesale and reject
/// any input referencing a name the catalog does not know; a rejected
/// input never changes the builder. `aggregate_by` conventionally lists
/// characteristics before key figures; that ordering is up to the caller
/// and never checked here.
pub struct QueryBuilder {
    catalog: SchemaCatalog,
    transport: Arc<dyn Transport>,
    use_cache: bool,
    aggregate_by: Vec<String>,
    variables: HashMap<String, String>,
    filter: Vec<FilterClause>,
    data_set: Vec<ResultRow>,
}

impl QueryBuilder {
    pub fn new(catalog: SchemaCatalog, transport: Arc<dyn Transport>, use_cache: bool) -> Self {
        Self {
            catalog,
            transport,
            use_cache,
            aggregate_by: Vec::new(),
            variables: HashMap::new(),
            filter: Vec::new(),
            data_set: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Rows from the most recent successful execution.
    pub fn data_set(&self) -> &[ResultRow] {
        &self.data_set
    }

    /// Replaces the aggregation list. Order is preserved verbatim and
    /// duplicates are not removed.
    pub fn set_aggregate_by(&mut self, field_list: Vec<String>) -> Result<(), QueryError> {
        for name in &field_list {
            if !self.catalog.has_field(name) {
                let err = QueryError::UnknownField {
                    name: name.clone(),
                    valid: self.catalog.field_names().join(", "),
                };
                warn!(query = %self.catalog.query_name, "{err}");
                return Err(err);
            }
        }
        self.aggregate_by = field_list;
        Ok(())
    }

    /// Replaces the selection-variable assignments.
    pub fn set_variables(&mut self, variables: HashMap<String, String>) -> Result<(), QueryError> {
        for name in variables.keys() {
            if !self.catalog.has_parameter(name) {
                let err = QueryError::UnknownParameter {
                    name: name.clone(),
                    valid: self.catalog.parameter_names().join(", "),
                };
                warn!(query = %self.catalog.query_name, "{err}");
                return Err(err);
            }
        }
        self.variables = variables;
        Ok(())
    }

    /// Replaces the filter list. Filter values are not validated, only
    /// field names and clause shape.
    pub fn set_filter(&mut self, filter: Vec<FilterClause>) -> Result<(), QueryError> {
        for clause in &filter {
            if clause.field.is_empty() || clause.operator.is_empty() {
                let err = QueryError::InvalidFilterClause(format!(
                    "field and operator are required, got {clause:?}"
                ));
                warn!(query = %self.catalog.query_name, "{err}");
                return Err(err);
            }
            if !self.catalog.has_field(&clause.field) {
                let err = QueryError::UnknownField {
                    name: clause.field.clone(),
                    valid: self.catalog.field_names().join(", "),
                };
                warn!(query = %self.catalog.query_name, "{err}");
                return Err(err);
            }
        }
        self.filter = filter;
        Ok(())
    }

    /// Path segment assigning every catalog parameter, in catalog order.
    /// Unset parameters render as `''`, which the backend reads as "no
    /// restriction"; set ones carry their percent-encoded value.
    pub fn variable_segment(&self) -> String {
        let assignments: Vec<String> = self
            .catalog
            .parameters
            .iter()
            .map(|p| {
                let value = self
                    .variables
                    .get(&p.name)
                    .map(|v| utf8_percent_encode(v, COMPONENT).to_string())
                    .unwrap_or_default();
                format!("{}='{}'", p.name, value)
            })
            .collect();
        format!("({})/", assignments.join(","))
    }

    pub fn aggregate_segment(&self) -> String {
        self.aggregate_by.join(",")
    }

    /// Filter expression, clauses joined with ` and `. `startswith`
    /// renders as a function call; every other operator renders infix.
    /// Quote characters in values are escaped by doubling.
    pub fn filter_segment(&self) -> String {
        let clauses: Vec<String> = self
            .filter
            .iter()
            .map(|c| {
                let value = c.value.replace('\'', "''");
                if c.operator == "startswith" {
                    format!("startswith({},'{}')", c.field, value)
                } else {
                    format!("{} {} '{}'", c.field, c.operator, value)
                }
            })
            .collect();
        clauses.join(" and ")
    }

    pub fn build_url(&self) -> String {
        format!(
            "{}{}_SRV/{}{}Results?$select={}&$filter={}&$format=json",
            self.catalog.source_url,
            self.catalog.query_name,
            self.catalog.query_name,
            self.variable_segment(),
            self.aggregate_segment(),
            utf8_percent_encode(&self.filter_segment(), COMPONENT),
        )
    }

    /// Executes the rendered query through the transport.
    ///
    /// A response shaped `{ d: { results: [...] } }` replaces the data
    /// set wholesale and yields the row count. Any other shape, and any
    /// transport error, leaves the previous data set in place.
    pub async fn execute(&mut self) -> Result<usize, QueryError> {
        let url = self.build_url();
        debug!(query = %self.catalog.query_name, url = %url, "executing query");

        let payload = match self.transport.fetch_json(&url, self.use_cache).await {
            Ok(payload) => payload,
            Err(e) => {
                error!(query = %self.catalog.query_name, url = %url, error = %e, "error loading data");
                return Err(e.into());
            }
        };

        match payload.pointer("/d/results") {
            Some(Value::Array(rows)) => {
                self.data_set = rows
                    .iter()
                    .filter_map(|row| row.as_object().cloned())
                    .collect();
                Ok(self.data_set.len())
            }
            _ => {
                error!(
                    query = %self.catalog.query_name,
                    url = %url,
                    payload = %payload,
                    "unexpected data returned"
                );
                Err(QueryError::MalformedResponse {
                    query_name: self.catalog.query_name.clone(),
                })
            }
        }
    }
}
