//! Session-wide registry of plugins claimed by install transactions

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use fman_types::{SiteUrl, VersionedIdentifier};
use std::sync::Arc;

/// Records which feature stored each plugin on each target site.
///
/// Concurrent installs that share a plugin consult the registry so only the
/// first one stages its content. A failed transaction releases its claims.
#[derive(Debug, Clone, Default)]
pub struct InstalledPluginRegistry {
    claims: Arc<DashMap<(SiteUrl, VersionedIdentifier), String>>,
}

impl InstalledPluginRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `plugin` on `site` for `owner`; false if already claimed
    pub fn try_register(&self, site: &SiteUrl, plugin: &VersionedIdentifier, owner: &str) -> bool {
        match self.claims.entry((site.clone(), plugin.clone())) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(owner.to_string());
                true
            }
        }
    }

    /// Release a claim held by `owner`
    pub fn unregister(&self, site: &SiteUrl, plugin: &VersionedIdentifier, owner: &str) {
        self.claims
            .remove_if(&(site.clone(), plugin.clone()), |_, held| held == owner);
    }

    /// Release a claim regardless of owner, used when content is removed
    pub fn forget(&self, site: &SiteUrl, plugin: &VersionedIdentifier) {
        self.claims.remove(&(site.clone(), plugin.clone()));
    }

    #[must_use]
    pub fn is_registered(&self, site: &SiteUrl, plugin: &VersionedIdentifier) -> bool {
        self.claims.contains_key(&(site.clone(), plugin.clone()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_claim_wins_and_owner_releases() {
        let registry = InstalledPluginRegistry::new();
        let site = SiteUrl::new("file:///tmp/site");
        let plugin: VersionedIdentifier = "p_1.0.0".parse().unwrap();

        assert!(registry.try_register(&site, &plugin, "a_1.0.0"));
        assert!(!registry.try_register(&site, &plugin, "b_1.0.0"));

        registry.unregister(&site, &plugin, "b_1.0.0");
        assert!(registry.is_registered(&site, &plugin));

        registry.unregister(&site, &plugin, "a_1.0.0");
        assert!(registry.is_empty());
        assert!(registry.try_register(&site, &plugin, "b_1.0.0"));
    }

    #[test]
    fn claims_are_per_site() {
        let registry = InstalledPluginRegistry::new();
        let plugin: VersionedIdentifier = "p_1.0.0".parse().unwrap();
        assert!(registry.try_register(&SiteUrl::new("file:///a"), &plugin, "f"));
        assert!(registry.try_register(&SiteUrl::new("file:///b"), &plugin, "f"));
        assert_eq!(registry.len(), 2);
        registry.forget(&SiteUrl::new("file:///a"), &plugin);
        assert_eq!(registry.len(), 1);
    }
}
