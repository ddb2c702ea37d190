use serde::{Deserialize, Serialize};

use super::FailureContext;

/// Install and remove transaction events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InstallEvent {
    /// Transaction accepted and work estimated
    Started {
        feature: String,
        site: String,
        plugins: usize,
        children: usize,
        total_units: u64,
    },

    /// Feature-level content fetched and verified
    FeatureVerified { feature: String },

    /// One plugin archive fetched and verified
    PluginFetched { feature: String, plugin: String },

    /// A plugin was left out of the batch after a recoverable failure
    PluginSkipped {
        feature: String,
        plugin: String,
        reason: String,
    },

    /// A plugin already registered by another install in this session
    PluginShared { feature: String, plugin: String },

    /// A non-mandatory included feature failed and was skipped
    ChildSkipped {
        feature: String,
        child: String,
        reason: String,
    },

    /// Data archive handling failed without aborting the feature
    DataEntryFailed {
        feature: String,
        entry: String,
        reason: String,
    },

    /// Feature manifest already present, registration skipped
    AlreadyInstalled { feature: String, site: String },

    /// Content committed to the target site
    Committed { feature: String, site: String },

    /// Transaction failed and partial content was rolled back
    RolledBack {
        feature: String,
        failure: FailureContext,
    },

    /// Feature content removed from a site
    Removed {
        feature: String,
        site: String,
        plugins_removed: usize,
    },
}

impl InstallEvent {
    #[must_use]
    pub fn feature(&self) -> &str {
        match self {
            Self::Started { feature, .. }
            | Self::FeatureVerified { feature }
            | Self::PluginFetched { feature, .. }
            | Self::PluginSkipped { feature, .. }
            | Self::PluginShared { feature, .. }
            | Self::ChildSkipped { feature, .. }
            | Self::DataEntryFailed { feature, .. }
            | Self::AlreadyInstalled { feature, .. }
            | Self::Committed { feature, .. }
            | Self::RolledBack { feature, .. }
            | Self::Removed { feature, .. } => feature,
        }
    }
}
