use serde::{Deserialize, Serialize};

use super::FailureContext;

/// Configuration history events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StateEvent {
    /// A configuration was appended to the history and became current
    ConfigurationAdded { id: String, label: String },

    /// The oldest configuration was evicted to respect the history cap
    ConfigurationEvicted { id: String, path: String },

    /// Revert started towards `target`
    RevertStarted { target: String },

    /// Revert produced a new current configuration
    RevertCompleted { target: String, created: String },

    /// A feature failed validation during revert
    RevertProblem {
        site: String,
        feature: String,
        reason: String,
    },

    /// Revert failed
    RevertFailed {
        target: String,
        failure: FailureContext,
    },

    Preserved { id: String },

    PreservedRemoved { id: String },

    /// Persisted state was rebuilt from the live sites
    Reconciled {
        optimistic: bool,
        configured: usize,
        unhappy: usize,
    },

    /// Index file written
    Saved { path: String },
}
