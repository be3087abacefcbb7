//! Recipe label set
//!
//! Labels are read from a built image; the pipeline never writes them back.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label keys read by the validator and the metadata bot
pub mod keys {
    pub const SOFTWARE: &str = "software";
    pub const SOFTWARE_VERSION: &str = "software.version";
    pub const VERSION: &str = "version";
    pub const BASE_IMAGE: &str = "base_image";
    pub const SUMMARY: &str = "about.summary";
    pub const HOME: &str = "about.home";
    pub const LICENSE: &str = "about.license";
    pub const LICENSE_FILE: &str = "about.license_file";
    pub const BIOTOOLS: &str = "extra.identifiers.biotools";
    pub const CONTAINER: &str = "container";
}

/// Read-only key/value labels of a recipe image
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    pub fn new(labels: BTreeMap<String, String>) -> Self {
        Self(labels)
    }

    /// Raw value for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Trimmed value for `key`, `None` when missing or blank
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
