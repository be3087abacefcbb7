//! Advisory lookups over HTTP

use async_trait::async_trait;
use dockyard_core::advisory::{AdvisorySource, LookupError};
use reqwest::{Client, StatusCode};
use std::collections::HashSet;
use tracing::debug;

/// License list keyed by SPDX identifier
pub const DEFAULT_LICENSE_LIST_URL: &str =
    "https://raw.githubusercontent.com/sindresorhus/spdx-license-list/master/spdx.json";
/// Metadata registry site; entries live under `/<id>`, the API under `/api/tool/<id>`
pub const DEFAULT_REGISTRY_URL: &str = "https://bio.tools";
/// Package index recipe pages, `/<name>/README.html`
pub const DEFAULT_PACKAGE_INDEX_URL: &str = "https://bioconda.github.io/recipes";

/// `AdvisorySource` querying the public license list, registry and package index
#[derive(Debug, Clone)]
pub struct AdvisoryClient {
    license_list_url: String,
    registry_url: String,
    package_index_url: String,
    client: Client,
}

impl Default for AdvisoryClient {
    fn default() -> Self {
        Self::with_urls(
            DEFAULT_LICENSE_LIST_URL,
            DEFAULT_REGISTRY_URL,
            DEFAULT_PACKAGE_INDEX_URL,
        )
    }
}

impl AdvisoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client with custom service locations
    pub fn with_urls(
        license_list_url: impl Into<String>,
        registry_url: impl Into<String>,
        package_index_url: impl Into<String>,
    ) -> Self {
        Self {
            license_list_url: license_list_url.into(),
            registry_url: registry_url.into().trim_end_matches('/').to_string(),
            package_index_url: package_index_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// Whether `url` exists: success is true, 404 is false, anything else fails
    async fn probe(&self, url: &str) -> Result<bool, LookupError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LookupError(e.to_string()))?;

        let status = response.status();
        debug!("Probed {}: {}", url, status);
        match status {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(LookupError(format!("{} returned {}", url, s))),
        }
    }
}

#[async_trait]
impl AdvisorySource for AdvisoryClient {
    async fn license_ids(&self) -> Result<HashSet<String>, LookupError> {
        let response = self
            .client
            .get(&self.license_list_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LookupError(e.to_string()))?;

        let list: serde_json::Map<String, serde_json::Value> = response
            .json()
            .await
            .map_err(|e| LookupError(format!("invalid license list: {}", e)))?;

        Ok(list.into_iter().map(|(id, _)| id).collect())
    }

    async fn registry_entry_exists(&self, id: &str) -> Result<bool, LookupError> {
        self.probe(&format!("{}/api/tool/{}/?format=json", self.registry_url, id))
            .await
    }

    async fn package_exists(&self, name: &str) -> Result<bool, LookupError> {
        self.probe(&self.package_url(name)).await
    }

    fn registry_entry_url(&self, id: &str) -> String {
        format!("{}/{}", self.registry_url, id)
    }

    fn package_url(&self, name: &str) -> String {
        format!("{}/{}/README.html", self.package_index_url, name)
    }
}
