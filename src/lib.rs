//! bexdata: client-side data access for analytical OData (BEx-style) services
//!
//! This library discovers a data source's schema (fields and selection
//! parameters) from its metadata document, builds validated queries
//! against that schema, executes them, and reshapes the tabular result
//! into application-ready series for reporting and charting.
//!
//! # Example
//!
//! ```rust,no_run
//! use bexdata::{
//!     ExtractFormat, ExtractOptions, FilterClause, HttpTransport, MetadataCache,
//!     QueryBuilder, ResultExtractor, SchemaCatalog, Settings, Transport,
//! };
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Initialize settings
//!     let settings = Settings::new()?;
//!
//!     // Create the transport and the application-owned metadata cache
//!     let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&settings)?);
//!     let cache = MetadataCache::new();
//!
//!     // Discover the schema (blocks until the metadata round-trip completes)
//!     let catalog = SchemaCatalog::load(
//!         transport.as_ref(),
//!         &cache,
//!         &settings.service.base_url,
//!         "ZSALES_Q001",
//!         settings.cache.enabled,
//!     )
//!     .await;
//!
//!     // Build a validated query
//!     let mut query = QueryBuilder::new(catalog, Arc::clone(&transport), settings.cache.enabled);
//!     query.set_aggregate_by(vec!["COUNTRY".into(), "SALES".into()])?;
//!     query.set_variables(HashMap::from([("P_YEAR".to_string(), "2024".to_string())]))?;
//!     query.set_filter(vec![FilterClause {
//!         field: "COUNTRY".into(),
//!         operator: "eq".into(),
//!         value: "US".into(),
//!     }])?;
//!
//!     // Execute and reshape
//!     let rows = query.execute().await?;
//!     println!("received {rows} rows");
//!
//!     let extractor = ResultExtractor::new(&query);
//!     let series = extractor.extract(&ExtractOptions {
//!         field: "SALES".into(),
//!         filter: Vec::new(),
//!         format: ExtractFormat::Point,
//!         key_field: Some("COUNTRY".into()),
//!     })?;
//!     println!("series: {series:?}");
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod query;
pub mod schema;
pub mod tests;
pub mod transport;

pub use config::Settings;
pub use error::{QueryError, TransportError};
pub use extract::{
    DataPoint, ExtractFormat, ExtractOptions, FilterPair, ResultExtractor, SeriesData,
};
pub use query::{FilterClause, QueryBuilder, ResultRow};
pub use schema::{
    CachedSchema, FieldDescriptor, MetadataCache, ParameterDescriptor, SchemaCatalog,
};
pub use transport::{HttpTransport, Transport};
