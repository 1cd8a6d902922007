use crate::config::Settings;
use crate::error::TransportError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Network seam between this layer and the OData backend.
///
/// Every request the crate makes goes through this trait, so the whole
/// layer can be exercised without a network. `fetch_xml` is used for the
/// one-shot metadata document; `fetch_json` for query execution. The
/// `use_cache` flag is a side-channel hint for intermediaries, never
/// interpreted here.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch_xml(&self, url: &str, use_cache: bool) -> Result<String, TransportError>;

    async fn fetch_json(&self, url: &str, use_cache: bool)
        -> Result<serde_json::Value, TransportError>;
}

/// Production transport backed by reqwest.
///
/// When `service.proxy_url` is configured, requests are posted to the
/// proxy with `url` and `usecache` form fields; otherwise the target URL
/// is fetched directly. No retries, no authentication.
pub struct HttpTransport {
    client: reqwest::Client,
    proxy_url: Option<String>,
}

impl HttpTransport {
    pub fn new(settings: &Settings) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.service.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            proxy_url: settings.service.proxy_url.clone(),
        })
    }

    async fn request(
        &self,
        url: &str,
        use_cache: bool,
    ) -> Result<reqwest::Response, TransportError> {
        let response = match &self.proxy_url {
            Some(proxy) => {
                debug!(target_url = url, "routing request through proxy");
                self.client
                    .post(proxy)
                    .form(&[("url", url), ("usecache", if use_cache { "1" } else { "0" })])
                    .send()
                    .await?
            }
            None => self.client.get(url).send().await?,
        };

        if !response.status().is_success() {
            return Err(TransportError::UnexpectedStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_xml(&self, url: &str, use_cache: bool) -> Result<String, TransportError> {
        let response = self.request(url, use_cache).await?;
        Ok(response.text().await?)
    }

    async fn fetch_json(
        &self,
        url: &str,
        use_cache: bool,
    ) -> Result<serde_json::Value, TransportError> {
        let response = self.request(url, use_cache).await?;
        response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}
