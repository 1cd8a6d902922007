#[cfg(test)]
mod tests {
    use crate::error::{QueryError, TransportError};
    use crate::extract::{ExtractFormat, ExtractOptions, FilterPair, ResultExtractor, SeriesData};
    use crate::query::{FilterClause, QueryBuilder};
    use crate::schema::{MetadataCache, SchemaCatalog};
    use crate::transport::Transport;
    use async_trait::async_trait;
    use mockall::*;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Arc;

    mock! {
        pub Transport {}

        #[async_trait]
        impl Transport for Transport {
            async fn fetch_xml(&self, url: &str, use_cache: bool) -> Result<String, TransportError>;
            async fn fetch_json(&self, url: &str, use_cache: bool) -> Result<Value, TransportError>;
        }
    }

    const METADATA_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<edmx:Edmx xmlns:edmx="http://schemas.microsoft.com/ado/2007/06/edmx"
           xmlns:sap="http://www.sap.com/Protocols/SAPData">
  <edmx:DataServices>
    <Schema xmlns="http://schemas.microsoft.com/ado/2008/09/edm">
      <EntityType Name="ZSALES_Q001Result" sap:semantics="aggregate">
        <Property Name="COUNTRY" sap:label="Country" sap:aggregation-role="dimension" sap:text="COUNTRY_TEXT"/>
        <Property Name="MONTH" sap:label="Month" sap:aggregation-role="dimension" sap:text=""/>
        <Property Name="SALES" sap:label="Sales" sap:aggregation-role="measure" sap:text=""/>
      </EntityType>
      <EntityType Name="ZSALES_Q001Parameters" sap:semantics="parameters">
        <Key>
          <PropertyRef Name="P_YEAR"/>
          <PropertyRef Name="P_REGION"/>
        </Key>
        <Property Name="P_YEAR" sap:label="Year"/>
        <Property Name="P_REGION" sap:label="Region"/>
        <Property Name="P_HIDDEN" sap:label="Not an input parameter"/>
      </EntityType>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#;

    const BASE_URL: &str = "https://host/odata/";
    const QUERY_NAME: &str = "ZSALES_Q001";

    async fn loaded_catalog(transport: &dyn Transport, cache: &MetadataCache) -> SchemaCatalog {
        SchemaCatalog::load(transport, cache, BASE_URL, QUERY_NAME, true).await
    }

    fn sales_rows() -> Value {
        json!({
            "d": {
                "results": [
                    {"COUNTRY": "US", "MONTH": "Jan", "SALES": 10},
                    {"COUNTRY": "US", "MONTH": "Feb", "SALES": 20},
                    {"COUNTRY": "DE", "MONTH": "Jan", "SALES": 5},
                ]
            }
        })
    }

    /// Builds a query over the fixture schema with the fixture rows
    /// already executed into its data set.
    async fn executed_query(results: Value) -> QueryBuilder {
        let mut mock = MockTransport::new();
        mock.expect_fetch_xml()
            .times(1)
            .returning(|_, _| Ok(METADATA_XML.to_string()));
        mock.expect_fetch_json()
            .times(1)
            .return_once(move |_, _| Ok(results));

        let transport: Arc<dyn Transport> = Arc::new(mock);
        let cache = MetadataCache::new();
        let catalog = loaded_catalog(transport.as_ref(), &cache).await;

        let mut query = QueryBuilder::new(catalog, transport, true);
        query.execute().await.unwrap();
        query
    }

    #[tokio::test]
    async fn test_metadata_load_populates_catalog() {
        let mut mock = MockTransport::new();
        mock.expect_fetch_xml()
            .times(1)
            .withf(|url, use_cache| {
                url == "https://host/odata/ZSALES_Q001_SRV/$metadata" && *use_cache
            })
            .returning(|_, _| Ok(METADATA_XML.to_string()));

        let cache = MetadataCache::new();
        let catalog = loaded_catalog(&mock, &cache).await;

        assert_eq!(catalog.field_names(), ["COUNTRY", "MONTH", "SALES"]);
        assert_eq!(catalog.parameter_names(), ["P_YEAR", "P_REGION"]);
    }

    #[tokio::test]
    async fn test_second_cached_load_performs_no_fetch() {
        let mut mock = MockTransport::new();
        mock.expect_fetch_xml()
            .times(1)
            .returning(|_, _| Ok(METADATA_XML.to_string()));

        let cache = MetadataCache::new();
        let first = loaded_catalog(&mock, &cache).await;
        let second = loaded_catalog(&mock, &cache).await;

        assert_eq!(first.field_names(), second.field_names());
        assert_eq!(first.parameter_names(), second.parameter_names());
    }

    #[tokio::test]
    async fn test_uncached_load_fetches_again() {
        let mut mock = MockTransport::new();
        mock.expect_fetch_xml()
            .times(2)
            .returning(|_, _| Ok(METADATA_XML.to_string()));

        let cache = MetadataCache::new();
        SchemaCatalog::load(&mock, &cache, BASE_URL, QUERY_NAME, false).await;
        SchemaCatalog::load(&mock, &cache, BASE_URL, QUERY_NAME, false).await;
    }

    #[tokio::test]
    async fn test_transport_error_leaves_catalog_empty_but_usable() {
        let mut mock = MockTransport::new();
        mock.expect_fetch_xml()
            .times(1)
            .returning(|_, _| Err(TransportError::Decode("connection refused".to_string())));

        let cache = MetadataCache::new();
        let catalog = loaded_catalog(&mock, &cache).await;

        assert!(catalog.fields.is_empty());
        assert!(catalog.parameters.is_empty());

        // Every field validation now rejects, without panicking.
        let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
        let mut query = QueryBuilder::new(catalog, transport, true);
        assert!(query.set_aggregate_by(vec!["COUNTRY".into()]).is_err());
    }

    #[tokio::test]
    async fn test_execute_replaces_data_set() {
        let mut mock = MockTransport::new();
        mock.expect_fetch_xml()
            .returning(|_, _| Ok(METADATA_XML.to_string()));
        mock.expect_fetch_json()
            .times(1)
            .withf(|url, _| url.ends_with("&$format=json") && url.contains("$select=COUNTRY,SALES"))
            .returning(|_, _| Ok(sales_rows()));

        let transport: Arc<dyn Transport> = Arc::new(mock);
        let cache = MetadataCache::new();
        let catalog = loaded_catalog(transport.as_ref(), &cache).await;

        let mut query = QueryBuilder::new(catalog, transport, true);
        query
            .set_aggregate_by(vec!["COUNTRY".into(), "SALES".into()])
            .unwrap();

        let count = query.execute().await.unwrap();
        assert_eq!(count, 3);
        assert_eq!(query.data_set().len(), 3);
        assert_eq!(query.data_set()[0]["COUNTRY"], json!("US"));
    }

    #[tokio::test]
    async fn test_execute_rejects_unexpected_response_shape() {
        let mut mock = MockTransport::new();
        mock.expect_fetch_xml()
            .returning(|_, _| Ok(METADATA_XML.to_string()));
        mock.expect_fetch_json()
            .times(1)
            .returning(|_, _| Ok(json!({"error": "not the expected envelope"})));

        let transport: Arc<dyn Transport> = Arc::new(mock);
        let cache = MetadataCache::new();
        let catalog = loaded_catalog(transport.as_ref(), &cache).await;

        let mut query = QueryBuilder::new(catalog, transport, true);
        let result = query.execute().await;

        assert!(matches!(result, Err(QueryError::MalformedResponse { .. })));
        assert!(query.data_set().is_empty());
    }

    #[tokio::test]
    async fn test_execute_surfaces_transport_error() {
        let mut mock = MockTransport::new();
        mock.expect_fetch_xml()
            .returning(|_, _| Ok(METADATA_XML.to_string()));
        mock.expect_fetch_json()
            .times(1)
            .returning(|_, _| Err(TransportError::Decode("timed out".to_string())));

        let transport: Arc<dyn Transport> = Arc::new(mock);
        let cache = MetadataCache::new();
        let catalog = loaded_catalog(transport.as_ref(), &cache).await;

        let mut query = QueryBuilder::new(catalog, transport, true);
        assert!(matches!(
            query.execute().await,
            Err(QueryError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_extract_points_in_row_order() {
        let query = executed_query(json!({
            "d": {
                "results": [
                    {"MONTH": "Jan", "SALES": 10},
                    {"MONTH": "Feb", "SALES": 20},
                ]
            }
        }))
        .await;

        let extractor = ResultExtractor::new(&query);
        let series = extractor
            .extract(&ExtractOptions {
                field: "SALES".into(),
                filter: Vec::new(),
                format: ExtractFormat::Point,
                key_field: Some("MONTH".into()),
            })
            .unwrap();

        match series {
            SeriesData::Points(points) => {
                assert_eq!(points.len(), 2);
                assert_eq!(points[0].x, json!("Jan"));
                assert_eq!(points[0].y, json!(10));
                assert_eq!(points[1].x, json!("Feb"));
                assert_eq!(points[1].y, json!(20));
            }
            other => panic!("expected points, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_extract_object_last_write_wins() {
        let query = executed_query(json!({
            "d": {
                "results": [
                    {"MONTH": "Jan", "SALES": 10},
                    {"MONTH": "Jan", "SALES": 99},
                    {"MONTH": "Feb", "SALES": 20},
                ]
            }
        }))
        .await;

        let extractor = ResultExtractor::new(&query);
        let series = extractor
            .extract(&ExtractOptions {
                field: "SALES".into(),
                filter: Vec::new(),
                format: ExtractFormat::Object,
                key_field: Some("MONTH".into()),
            })
            .unwrap();

        match series {
            SeriesData::Object(mapping) => {
                assert_eq!(mapping.len(), 2);
                assert_eq!(mapping["Jan"], json!(99));
                assert_eq!(mapping["Feb"], json!(20));
            }
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_extract_array_ignores_key_field() {
        let query = executed_query(sales_rows()).await;

        let extractor = ResultExtractor::new(&query);
        let series = extractor
            .extract(&ExtractOptions {
                field: "SALES".into(),
                filter: Vec::new(),
                format: ExtractFormat::Array,
                key_field: Some("MONTH".into()),
            })
            .unwrap();

        assert_eq!(
            series,
            SeriesData::Array(vec![json!(10), json!(20), json!(5)])
        );
    }

    #[tokio::test]
    async fn test_extract_applies_every_filter_pair() {
        let query = executed_query(sales_rows()).await;

        let extractor = ResultExtractor::new(&query);
        let series = extractor
            .extract(&ExtractOptions {
                field: "SALES".into(),
                filter: vec![
                    FilterPair {
                        field: "COUNTRY".into(),
                        value: json!("US"),
                    },
                    FilterPair {
                        field: "MONTH".into(),
                        value: json!("Jan"),
                    },
                ],
                format: ExtractFormat::Array,
                key_field: None,
            })
            .unwrap();

        assert_eq!(series, SeriesData::Array(vec![json!(10)]));
    }

    #[tokio::test]
    async fn test_extract_point_requires_key_field() {
        let query = executed_query(sales_rows()).await;

        let extractor = ResultExtractor::new(&query);
        let result = extractor.extract(&ExtractOptions {
            field: "SALES".into(),
            filter: Vec::new(),
            format: ExtractFormat::Point,
            key_field: None,
        });

        assert!(matches!(result, Err(QueryError::MissingKeyField(_))));
    }

    #[tokio::test]
    async fn test_series_values_distinct_in_first_occurrence_order() {
        let query = executed_query(json!({
            "d": {
                "results": [
                    {"MONTH": "Mar"},
                    {"MONTH": "Jan"},
                    {"MONTH": "Mar"},
                    {"MONTH": "Feb"},
                    {"MONTH": "Jan"},
                ]
            }
        }))
        .await;

        let extractor = ResultExtractor::new(&query);
        assert_eq!(
            extractor.series_values("MONTH"),
            vec![json!("Mar"), json!("Jan"), json!("Feb")]
        );
    }

    #[tokio::test]
    async fn test_field_by_name_is_case_insensitive() {
        let query = executed_query(sales_rows()).await;

        let extractor = ResultExtractor::new(&query);
        let field = extractor.field_by_name("country").unwrap();
        assert_eq!(field.name, "COUNTRY");
        assert_eq!(field.label, "Country");
        assert!(extractor.field_by_name("missing").is_none());
    }

    #[tokio::test]
    async fn test_round_trip_url_recovers_specification() {
        let mut mock = MockTransport::new();
        mock.expect_fetch_xml()
            .returning(|_, _| Ok(METADATA_XML.to_string()));

        let transport: Arc<dyn Transport> = Arc::new(mock);
        let cache = MetadataCache::new();
        let catalog = loaded_catalog(transport.as_ref(), &cache).await;

        let mut query = QueryBuilder::new(catalog, transport, true);
        query
            .set_aggregate_by(vec!["COUNTRY".into(), "MONTH".into(), "SALES".into()])
            .unwrap();
        query
            .set_variables(HashMap::from([("P_YEAR".to_string(), "2024".to_string())]))
            .unwrap();
        query
            .set_filter(vec![FilterClause {
                field: "COUNTRY".into(),
                operator: "eq".into(),
                value: "US".into(),
            }])
            .unwrap();

        let url = query.build_url();

        // Select list round-trips verbatim.
        let select = url
            .split("$select=")
            .nth(1)
            .and_then(|rest| rest.split('&').next())
            .unwrap();
        assert_eq!(select, "COUNTRY,MONTH,SALES");

        // Variable assignments round-trip, unset ones stay empty.
        let variables = url
            .split('(')
            .nth(1)
            .and_then(|rest| rest.split(')').next())
            .unwrap();
        assert_eq!(variables, "P_YEAR='2024',P_REGION=''");

        // Filter expression round-trips modulo percent-encoding.
        let filter = url
            .split("$filter=")
            .nth(1)
            .and_then(|rest| rest.split('&').next())
            .unwrap();
        assert_eq!(filter.replace("%20", " "), "COUNTRY eq 'US'");
    }
}
