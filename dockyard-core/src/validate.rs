//! Label validation
//!
//! Decides whether the metadata declared by a recipe is acceptable, derives
//! the canonical publish tag, and posts non-fatal advisories.
//!
//! Required checks accumulate defects and never short-circuit. Advisory
//! checks only ever produce comments; lookup errors skip the advisory.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::advisory::AdvisorySource;
use crate::domain::labels::{LabelSet, keys};
use crate::domain::request::{BuildRequest, is_valid_container_name};
use crate::reporter::{Reporter, StatusState};

/// Minimum length of `about.summary`
pub const MIN_SUMMARY_CHARS: usize = 20;
/// Length of `about.summary` above which an advisory is posted
pub const LONG_SUMMARY_CHARS: usize = 200;
/// License value accepted without checking the reference list
pub const CUSTOM_LICENSE: &str = "Custom License";

/// Outcome of the required label checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelVerdict {
    pub passed: bool,
    pub defects: Vec<String>,
    /// Publish tag, `<software.version>_cv<version>`
    pub tag: String,
    /// Effective software name (falls back to a valid container name)
    pub software: String,
}

/// Derives the publish tag from the upstream version and recipe revision
pub fn derive_tag(software_version: &str, revision: Option<&str>) -> String {
    format!("{}_cv{}", software_version, revision.unwrap_or("1"))
}

/// Runs the required label checks; no I/O
pub fn check_labels(request: &BuildRequest, labels: &LabelSet) -> LabelVerdict {
    let mut defects = Vec::new();

    let software = match labels.non_empty(keys::SOFTWARE) {
        None => {
            defects.push("software label not present".to_string());
            request.container().to_string()
        }
        Some(name) if is_valid_container_name(name) => name.to_string(),
        Some(name) => {
            let fallback = labels
                .non_empty(keys::CONTAINER)
                .filter(|c| is_valid_container_name(c))
                .unwrap_or(request.container());
            warn!(
                "Software name {} is not a valid container name, using {}",
                name, fallback
            );
            fallback.to_string()
        }
    };

    if labels.non_empty(keys::BASE_IMAGE).is_none() {
        defects.push("base_image is missing in labels".to_string());
    }

    let software_version = match labels.non_empty(keys::SOFTWARE_VERSION) {
        None => {
            defects.push("software.version label not present (Upstream code version)".to_string());
            request.version()
        }
        Some(v) if v != request.version() => {
            defects.push("software.version label not matching directory version name".to_string());
            request.version()
        }
        Some(v) => v,
    };

    let revision = labels.non_empty(keys::VERSION);
    if revision.is_none() {
        defects.push("version label not present (Dockerfile version)".to_string());
    }

    let summary_ok = labels
        .non_empty(keys::SUMMARY)
        .is_some_and(|s| s.chars().count() >= MIN_SUMMARY_CHARS);
    if !summary_ok {
        defects.push("about.summary label not present or too short".to_string());
    }

    if labels.non_empty(keys::HOME).is_none() {
        defects.push("about.home label not present".to_string());
    }

    if labels.non_empty(keys::LICENSE).is_none() {
        defects.push("about.license label not present".to_string());
    }

    LabelVerdict {
        passed: defects.is_empty(),
        tag: derive_tag(software_version, revision),
        defects,
        software,
    }
}

/// Validates recipe labels and reports the verdict
pub struct LabelValidator {
    reporter: Arc<dyn Reporter>,
    advisories: Arc<dyn AdvisorySource>,
}

impl LabelValidator {
    pub fn new(reporter: Arc<dyn Reporter>, advisories: Arc<dyn AdvisorySource>) -> Self {
        Self {
            reporter,
            advisories,
        }
    }

    /// Checks labels, reports the status once, then posts advisories
    pub async fn validate(&self, request: &BuildRequest, labels: &LabelSet) -> LabelVerdict {
        let verdict = check_labels(request, labels);

        if verdict.passed {
            info!("Labels of {} are valid, tag {}", request, verdict.tag);
        } else {
            warn!(
                "Labels of {} have {} defect(s): {}",
                request,
                verdict.defects.len(),
                verdict.defects.join("; ")
            );
        }

        self.reporter
            .report_status(
                request.trigger_ref(),
                &verdict.software,
                StatusState::from(verdict.passed),
                &verdict.defects,
            )
            .await;

        for advisory in self.advisories(&verdict.software, labels).await {
            match request.comment_target() {
                Some(target) => self.reporter.report_comment(&target, &advisory).await,
                None => info!("Advisory for {}: {}", request, advisory),
            }
        }

        verdict
    }

    /// Collects advisory messages for `software`
    pub async fn advisories(&self, software: &str, labels: &LabelSet) -> Vec<String> {
        let mut advisories = Vec::new();

        if labels
            .get(keys::SUMMARY)
            .is_some_and(|s| s.chars().count() > LONG_SUMMARY_CHARS)
        {
            advisories.push(
                "about.summary is quite long, please keep it short < 200 chars.".to_string(),
            );
        }

        if let Some(license) = labels.non_empty(keys::LICENSE) {
            if license.starts_with("http") {
                advisories.push("about.license field is a URL. license should be the license identifier (GPL-3.0 for example).".to_string());
            }
            if !labels.contains(keys::LICENSE_FILE) {
                advisories.push("please specify in about.license_file the location of the license file in the container, or a url to license for this release of the software.".to_string());
            } else if license != CUSTOM_LICENSE {
                match self.advisories.license_ids().await {
                    Ok(ids) => {
                        let id = license.replace("SPDX:", "").replace("spdx:", "");
                        if !ids.contains(id.trim()) {
                            advisories.push("about.license field is not in spdx list: https://spdx.org/licenses/, if it is a typo error, please fix it. If this is not a standard license, please specify *Custom License* and use *about.license_file* label to specify license location (in container or url).".to_string());
                        }
                    }
                    Err(e) => warn!("Skipping license advisory: {}", e),
                }
            }
        }

        match labels.non_empty(keys::BIOTOOLS) {
            Some(identifier) => {
                let entry = identifier.rsplit('/').next().unwrap_or(identifier);
                match self.advisories.registry_entry_exists(entry).await {
                    Ok(true) => debug!("Registry entry {} found", entry),
                    Ok(false) => advisories.push(
                        "Could not find the defined biotools entry, please check its name on biotools"
                            .to_string(),
                    ),
                    Err(e) => warn!("Skipping registry entry advisory: {}", e),
                }
            }
            None => match self.advisories.registry_entry_exists(software).await {
                Ok(true) => advisories.push(format!(
                    "Found a biotools entry matching the software name ({}), if this is the same software, please add the extra.identifiers.biotools label to your Dockerfile",
                    self.advisories.registry_entry_url(software)
                )),
                Ok(false) => advisories.push("No biotools label defined, please check if tool is not already defined in biotools (https://bio.tools) and add extra.identifiers.biotools label if it exists. If it is not defined, you can ignore this comment.".to_string()),
                Err(e) => warn!("Skipping registry advisory: {}", e),
            },
        }

        match self.advisories.package_exists(software).await {
            Ok(true) => advisories.push(format!(
                "Found an existing bioconda package for this software ({}), is this the same, then you should update the recipe in bioconda to avoid duplicates.",
                self.advisories.package_url(software)
            )),
            Ok(false) => {}
            Err(e) => warn!("Skipping package advisory: {}", e),
        }

        advisories
    }
}
