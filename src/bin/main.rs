use bexdata::{
    ExtractFormat, ExtractOptions, FilterClause, HttpTransport, MetadataCache, QueryBuilder,
    ResultExtractor, SchemaCatalog, Settings, Transport,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Initialize settings
    let settings = Settings::new()?;

    // Create the transport and metadata cache
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&settings)?);
    let cache = MetadataCache::new();

    // Discover the schema
    let catalog = SchemaCatalog::load(
        transport.as_ref(),
        &cache,
        &settings.service.base_url,
        "ZSALES_Q001",
        settings.cache.enabled,
    )
    .await;

    println!("\nDiscovered fields:");
    for field in &catalog.fields {
        println!("- {} ({}, role: {})", field.name, field.label, field.aggregation_role);
    }

    println!("\nSelection parameters:");
    for parameter in &catalog.parameters {
        println!("- {} ({})", parameter.name, parameter.label);
    }

    if catalog.fields.is_empty() {
        println!("\nNo schema available, skipping query execution.");
        return Ok(());
    }

    // Build and run a query
    let mut query = QueryBuilder::new(catalog, Arc::clone(&transport), settings.cache.enabled);
    query.set_aggregate_by(vec!["COUNTRY".into(), "MONTH".into(), "SALES".into()])?;
    query.set_variables(HashMap::from([("P_YEAR".to_string(), "2024".to_string())]))?;
    query.set_filter(vec![FilterClause {
        field: "COUNTRY".into(),
        operator: "eq".into(),
        value: "US".into(),
    }])?;

    let rows = query.execute().await?;
    println!("\nReceived {rows} rows from {}", query.build_url());

    // Reshape for charting
    let extractor = ResultExtractor::new(&query);
    let months = extractor.series_values("MONTH");
    println!("\nMonths in result: {months:?}");

    let series = extractor.extract(&ExtractOptions {
        field: "SALES".into(),
        filter: Vec::new(),
        format: ExtractFormat::Point,
        key_field: Some("MONTH".into()),
    })?;
    println!("\nSales by month: {series:?}");

    Ok(())
}
