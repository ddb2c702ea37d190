use serde::{Deserialize, Serialize};

/// Configured-site state changes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SiteEvent {
    FeatureConfigured {
        site: String,
        feature: String,
    },

    FeatureUnconfigured {
        site: String,
        feature: String,
    },

    /// Unconfigure refused because a configured parent still includes the feature
    UnconfigureRefused {
        site: String,
        feature: String,
        parent: String,
    },

    /// Patch unconfigured because its target went away
    PatchUnconfigured {
        site: String,
        patch: String,
        target: String,
    },

    /// An optional or failed child was not configured
    ChildNotConfigured {
        site: String,
        feature: String,
        child: String,
        reason: String,
    },

    /// A listener callback failed; the transaction continued
    ListenerFailed {
        site: String,
        callback: String,
    },

    SiteAdded {
        site: String,
    },

    SiteRemoved {
        site: String,
    },

    SiteEnabled {
        site: String,
        enabled: bool,
    },
}
