use crate::transport::Transport;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, warn};

const SAP_NS: &str = "http://www.sap.com/Protocols/SAPData";

/// One selectable field of a data source: a characteristic (dimension)
/// or a key figure (measure), as declared on the aggregate entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub label: String,
    pub aggregation_role: String,
    pub text: String,
}

/// One selection-screen parameter, drawn from the parameters entity and
/// limited to properties named in its `Key/PropertyRef` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    pub name: String,
    pub label: String,
    pub aggregation_role: String,
    pub text: String,
}

/// Cached schema lists for one query name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CachedSchema {
    pub fields: Vec<FieldDescriptor>,
    pub parameters: Vec<ParameterDescriptor>,
}

/// Metadata cache keyed by query name.
///
/// Entries are written on every successful load and never invalidated.
/// The handle is cheap to clone; the application owns its lifecycle and
/// decides which catalogs share it.
#[derive(Clone, Default)]
pub struct MetadataCache {
    entries: Arc<Mutex<HashMap<String, CachedSchema>>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, query_name: &str) -> Option<CachedSchema> {
        self.entries.lock().await.get(query_name).cloned()
    }

    pub async fn insert(&self, query_name: &str, schema: CachedSchema) {
        self.entries
            .lock()
            .await
            .insert(query_name.to_string(), schema);
    }
}

/// The discovered schema of one data source: its fields and selection
/// parameters, in metadata document order. Never mutated after load.
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    pub source_url: String,
    pub query_name: String,
    pub fields: Vec<FieldDescriptor>,
    pub parameters: Vec<ParameterDescriptor>,
}

impl SchemaCatalog {
    /// Loads the schema for `query_name`, serving it from `cache` when
    /// `use_cache` is set and an entry exists.
    ///
    /// Load failures are not fatal: a transport error, an unparseable
    /// document or an empty field list leave the catalog usable with
    /// empty lists (all field validation will then reject any name) and
    /// are reported through tracing.
    pub async fn load(
        transport: &dyn Transport,
        cache: &MetadataCache,
        source_url: &str,
        query_name: &str,
        use_cache: bool,
    ) -> Self {
        let mut catalog = Self {
            source_url: source_url.to_string(),
            query_name: query_name.to_string(),
            fields: Vec::new(),
            parameters: Vec::new(),
        };

        if use_cache {
            if let Some(cached) = cache.get(query_name).await {
                catalog.fields = cached.fields;
                catalog.parameters = cached.parameters;
                return catalog;
            }
        }

        let metadata_url = format!("{source_url}{query_name}_SRV/$metadata");

        let body = match transport.fetch_xml(&metadata_url, use_cache).await {
            Ok(body) => body,
            Err(e) => {
                error!(query = query_name, error = %e, "error loading metadata");
                return catalog;
            }
        };

        match parse_metadata(&body) {
            Ok((fields, parameters)) => {
                if fields.is_empty() {
                    warn!(
                        query = query_name,
                        url = %metadata_url,
                        "no metadata found"
                    );
                }
                catalog.fields = fields;
                catalog.parameters = parameters;

                // Written back regardless of `use_cache`, so later loads
                // of the same query name can opt in.
                cache
                    .insert(
                        query_name,
                        CachedSchema {
                            fields: catalog.fields.clone(),
                            parameters: catalog.parameters.clone(),
                        },
                    )
                    .await;
            }
            Err(e) => {
                error!(query = query_name, url = %metadata_url, error = %e, "error loading metadata");
            }
        }

        catalog
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.iter().any(|p| p.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters.iter().map(|p| p.name.as_str()).collect()
    }
}

fn sap_attr(node: &Node, name: &str) -> String {
    node.attributes()
        .find(|a| a.namespace() == Some(SAP_NS) && a.name() == name)
        .map(|a| a.value().to_string())
        .unwrap_or_default()
}

fn semantics<'a>(node: &'a Node) -> Option<&'a str> {
    node.attributes()
        .find(|a| a.namespace() == Some(SAP_NS) && a.name() == "semantics")
        .map(|a| a.value())
}

fn descriptor_parts(prop: &Node) -> (String, String, String, String) {
    (
        prop.attribute("Name").unwrap_or_default().to_string(),
        sap_attr(prop, "label"),
        sap_attr(prop, "aggregation-role"),
        sap_attr(prop, "text"),
    )
}

/// Extracts the field and parameter lists from a metadata document.
///
/// The entity marked `sap:semantics="aggregate"` carries the selectable
/// fields; the one marked `sap:semantics="parameters"` carries the
/// variable screen, with its `Key/PropertyRef` names deciding which
/// properties are valid input parameters. Document order is preserved.
fn parse_metadata(
    xml: &str,
) -> Result<(Vec<FieldDescriptor>, Vec<ParameterDescriptor>), roxmltree::Error> {
    let doc = Document::parse(xml)?;

    let mut fields = Vec::new();
    let mut parameters = Vec::new();

    for entity in doc
        .descendants()
        .filter(|n| n.has_tag_name("EntityType"))
    {
        match semantics(&entity) {
            Some("aggregate") => {
                for prop in entity.children().filter(|n| n.has_tag_name("Property")) {
                    let (name, label, aggregation_role, text) = descriptor_parts(&prop);
                    fields.push(FieldDescriptor {
                        name,
                        label,
                        aggregation_role,
                        text,
                    });
                }
            }
            Some("parameters") => {
                let valid_params: Vec<&str> = entity
                    .descendants()
                    .filter(|n| n.has_tag_name("PropertyRef"))
                    .filter_map(|n| n.attribute("Name"))
                    .collect();

                for prop in entity.children().filter(|n| n.has_tag_name("Property")) {
                    let (name, label, aggregation_role, text) = descriptor_parts(&prop);
                    if valid_params.iter().any(|v| *v == name) {
                        parameters.push(ParameterDescriptor {
                            name,
                            label,
                            aggregation_role,
                            text,
                        });
                    }
                }
            }
            _ => {}
        }
    }

    Ok((fields, parameters))
}
