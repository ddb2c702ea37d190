#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! High-level operations orchestration for fman
//!
//! This crate serves as the orchestration layer between the CLI and the
//! engine crates. Every configuration-changing operation clones the current
//! configuration, applies the change, appends the result to the history and
//! records exactly one activity, whether it succeeded or not.

mod context;
mod large_ops;
mod small_ops;
mod types;

pub use context::{OpsContextBuilder, OpsCtx};
pub use types::{
    ConfigurationInfo, ConfigureReport, FeatureInfo, InstallReport, InstallRequest, RemoveReport,
    RevertReport, SiteInfo,
};

// Re-export operation functions
pub use large_ops::{install, remove, revert};
pub use small_ops::{
    add_site, configure, feature_status, history, list_features, list_sites, preserve,
    reconcile, remove_preserved, remove_site, save, set_site_enabled, unconfigure,
};

use fman_errors::{Error, OpsError};
use fman_types::StatusReport;

/// Operation result that can be serialized for CLI output
#[derive(Clone, Debug, serde::Serialize)]
#[serde(tag = "type", content = "data")]
pub enum OperationResult {
    FeatureList(Vec<FeatureInfo>),
    SiteList(Vec<SiteInfo>),
    Site(SiteInfo),
    Status(StatusReport),
    History(Vec<ConfigurationInfo>),
    Configuration(ConfigurationInfo),
    InstallReport(InstallReport),
    RemoveReport(RemoveReport),
    ConfigureReport(ConfigureReport),
    RevertReport(RevertReport),
    /// Generic success message
    Success(String),
}

impl OperationResult {
    /// Convert to JSON string
    ///
    /// # Errors
    ///
    /// Returns `OpsError::SerializationError` if serialization fails.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(self).map_err(|e| {
            OpsError::SerializationError {
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Check if this is a success result
    #[must_use]
    pub fn is_success(&self) -> bool {
        match self {
            OperationResult::ConfigureReport(report) => !report.refused,
            OperationResult::Status(report) => {
                report.status != fman_types::FeatureStatus::Unhappy
            }
            _ => true,
        }
    }
}
