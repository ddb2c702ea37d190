//! Configured/unconfigured partition of a site's feature references

use fman_site::FeatureReference;
use serde::{Deserialize, Serialize};

/// How the user expressed the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Listed features are enabled
    #[default]
    UserInclude,
    /// Listed features are disabled
    UserExclude,
}

/// Every reference the policy knows is in exactly one of the two sets.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationPolicy {
    kind: PolicyKind,
    configured: Vec<FeatureReference>,
    unconfigured: Vec<FeatureReference>,
}

impl ConfigurationPolicy {
    #[must_use]
    pub fn new(kind: PolicyKind) -> Self {
        Self {
            kind,
            configured: Vec::new(),
            unconfigured: Vec::new(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> PolicyKind {
        self.kind
    }

    #[must_use]
    pub fn configured(&self) -> &[FeatureReference] {
        &self.configured
    }

    #[must_use]
    pub fn unconfigured(&self) -> &[FeatureReference] {
        &self.unconfigured
    }

    #[must_use]
    pub fn is_configured(&self, reference: &FeatureReference) -> bool {
        self.configured.contains(reference)
    }

    #[must_use]
    pub fn contains(&self, reference: &FeatureReference) -> bool {
        self.is_configured(reference) || self.unconfigured.contains(reference)
    }

    /// All known references, configured first
    pub fn all(&self) -> impl Iterator<Item = &FeatureReference> {
        self.configured.iter().chain(self.unconfigured.iter())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.configured.len() + self.unconfigured.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Move `reference` into the configured set; returns whether it moved
    pub fn mark_configured(&mut self, reference: &FeatureReference) -> bool {
        if self.is_configured(reference) {
            return false;
        }
        self.unconfigured.retain(|r| r != reference);
        self.configured.push(reference.clone());
        true
    }

    /// Move `reference` into the unconfigured set; returns whether it moved
    pub fn mark_unconfigured(&mut self, reference: &FeatureReference) -> bool {
        let was_configured = self.is_configured(reference);
        self.configured.retain(|r| r != reference);
        if !self.unconfigured.contains(reference) {
            self.unconfigured.push(reference.clone());
        }
        was_configured
    }

    /// Track a reference without changing its state; new ones start unconfigured
    pub fn track(&mut self, reference: &FeatureReference) {
        if !self.contains(reference) {
            self.unconfigured.push(reference.clone());
        }
    }

    /// Drop a reference from both sets, used once its content is removed
    pub fn forget(&mut self, reference: &FeatureReference) -> bool {
        let before = self.len();
        self.configured.retain(|r| r != reference);
        self.unconfigured.retain(|r| r != reference);
        self.len() != before
    }
}
