//! Types for operations and results

use chrono::{DateTime, Utc};
use fman_types::{Activity, FeatureStatus};
use serde::{Deserialize, Serialize};

/// What to install and where
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InstallRequest {
    /// Source site (URL or local path)
    pub source: String,
    /// Feature on the source, `id_version` or a bare id
    pub feature: String,
    /// Target configured site; the only configured site when absent
    pub target: Option<String>,
    /// Optional children to install; all of them when absent
    pub optional: Option<Vec<String>>,
}

/// Installation report
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstallReport {
    pub feature: String,
    pub site: String,
    /// Configuration recorded for the change
    pub configuration: String,
    /// Execution time in milliseconds
    pub duration_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoveReport {
    pub feature: String,
    pub site: String,
    pub plugins_removed: usize,
    pub configuration: String,
}

/// Result of configure or unconfigure
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigureReport {
    pub feature: String,
    pub site: String,
    /// False when the feature was already in the requested state
    pub changed: bool,
    /// Unconfigure refused because a configured feature includes it
    #[serde(default)]
    pub refused: bool,
    /// Configuration recorded for the change, if one was
    pub configuration: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RevertReport {
    pub target: String,
    pub created: String,
}

/// A feature on a configured site
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeatureInfo {
    pub site: String,
    pub id: String,
    pub version: String,
    pub label: Option<String>,
    pub configured: bool,
    pub status: FeatureStatus,
}

/// A configured site
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SiteInfo {
    pub url: String,
    pub enabled: bool,
    pub updatable: bool,
    pub configured: usize,
    pub unconfigured: usize,
}

/// A history or preserved configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigurationInfo {
    pub id: String,
    pub label: String,
    pub created: DateTime<Utc>,
    pub current: bool,
    pub preserved: bool,
    pub sites: usize,
    pub activities: Vec<Activity>,
}
