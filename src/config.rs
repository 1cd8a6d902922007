use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub service: ServiceSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Deserialize)]
pub struct ServiceSettings {
    /// Base URL of the OData service, up to (not including) the
    /// `{queryName}_SRV` segment.
    pub base_url: String,
    /// Upper bound on a query round-trip, enforced by the transport.
    pub timeout_secs: u64,
    /// When set, requests are posted to this proxy endpoint instead of
    /// being sent to the target URL directly.
    pub proxy_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CacheSettings {
    pub enabled: bool,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config_dir = Path::new("config");

        let builder = Config::builder()
            .set_default("service.base_url", "https://localhost:8000/sap/opu/odata/sap/")?
            .set_default("service.timeout_secs", 400_i64)?
            .set_default("cache.enabled", true)?
            // Start with default settings
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local overrides
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // Add environment variables with prefix BEXDATA_
            .add_source(Environment::with_prefix("BEXDATA").separator("_"));

        builder.build()?.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service: ServiceSettings {
                base_url: "https://localhost:8000/sap/opu/odata/sap/".to_string(),
                timeout_secs: 400,
                proxy_url: None,
            },
            cache: CacheSettings { enabled: true },
        }
    }
}
