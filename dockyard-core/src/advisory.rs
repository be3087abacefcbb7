//! Advisory data sources
//!
//! Lookups used by the label validator for non-fatal metadata advice: the
//! reference license list, the metadata registry (bio.tools) and the external
//! package index (bioconda). Lookup failures only ever skip an advisory.

use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;

/// A lookup against an external advisory source failed
#[derive(Debug, Error)]
#[error("advisory lookup failed: {0}")]
pub struct LookupError(pub String);

/// External data consulted for advisory checks
#[async_trait]
pub trait AdvisorySource: Send + Sync {
    /// Known license identifiers
    async fn license_ids(&self) -> Result<HashSet<String>, LookupError>;

    /// Whether the metadata registry has an entry with this identifier
    async fn registry_entry_exists(&self, id: &str) -> Result<bool, LookupError>;

    /// Whether the external package index already packages this software
    async fn package_exists(&self, name: &str) -> Result<bool, LookupError>;

    /// Public page of a metadata registry entry
    fn registry_entry_url(&self, id: &str) -> String {
        format!("https://bio.tools/{}", id)
    }

    /// Public page of an external package
    fn package_url(&self, name: &str) -> String {
        format!("https://bioconda.github.io/recipes/{}/README.html", name)
    }
}

/// Source with no data; every lookup fails and every advisory is skipped
pub struct NoAdvisories;

#[async_trait]
impl AdvisorySource for NoAdvisories {
    async fn license_ids(&self) -> Result<HashSet<String>, LookupError> {
        Err(LookupError("advisory lookups disabled".to_string()))
    }

    async fn registry_entry_exists(&self, _id: &str) -> Result<bool, LookupError> {
        Err(LookupError("advisory lookups disabled".to_string()))
    }

    async fn package_exists(&self, _name: &str) -> Result<bool, LookupError> {
        Err(LookupError("advisory lookups disabled".to_string()))
    }
}
