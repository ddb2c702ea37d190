//! Feature health status

use crate::identifier::VersionedIdentifier;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Health of a feature in the current configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureStatus {
    Happy,
    Ambiguous,
    Unhappy,
    Disabled,
}

impl fmt::Display for FeatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Happy => "happy",
            Self::Ambiguous => "ambiguous",
            Self::Unhappy => "unhappy",
            Self::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

/// A status plus the reasons that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub feature: VersionedIdentifier,
    pub status: FeatureStatus,
    #[serde(default)]
    pub reasons: Vec<String>,
}

impl StatusReport {
    #[must_use]
    pub fn happy(feature: VersionedIdentifier) -> Self {
        Self {
            feature,
            status: FeatureStatus::Happy,
            reasons: Vec::new(),
        }
    }

    #[must_use]
    pub fn disabled(feature: VersionedIdentifier, reason: impl Into<String>) -> Self {
        Self {
            feature,
            status: FeatureStatus::Disabled,
            reasons: vec![reason.into()],
        }
    }

    /// Raise the status to `status` if it is worse, recording why
    pub fn degrade(&mut self, status: FeatureStatus, reason: impl Into<String>) {
        if status > self.status {
            self.status = status;
        }
        self.reasons.push(reason.into());
    }
}
