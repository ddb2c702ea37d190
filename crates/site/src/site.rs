//! Sites: repositories of installed or installable features

use fman_errors::Error;
use fman_types::{Feature, MatchRule, SiteUrl, VersionedIdentifier};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

use crate::content::ContentProvider;
use crate::directory::DirectoryContentProvider;
use crate::manifest::{read_site_manifest, SiteManifest};
use crate::reference::FeatureReference;

/// A repository of features; owns its feature references and delegates all
/// content I/O to a [`ContentProvider`].
#[derive(Debug)]
pub struct Site {
    url: SiteUrl,
    label: Option<String>,
    provider: Arc<dyn ContentProvider>,
    features: RwLock<Vec<FeatureReference>>,
    archives: BTreeMap<String, String>,
    categories: BTreeSet<String>,
    feature_categories: BTreeMap<String, Vec<String>>,
}

impl Site {
    /// Open a local directory site
    ///
    /// # Errors
    ///
    /// Returns an error if the directory does not exist or its manifests are malformed.
    pub async fn open(root: &Path) -> Result<Arc<Self>, Error> {
        let provider = DirectoryContentProvider::new(root).await?;
        let manifest = read_site_manifest(root).await?;
        Self::with_provider(Arc::new(provider), manifest).await
    }

    /// Build a site over any provider and load its feature references
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot list features.
    pub async fn with_provider(
        provider: Arc<dyn ContentProvider>,
        manifest: SiteManifest,
    ) -> Result<Arc<Self>, Error> {
        let site = Self {
            url: provider.url().clone(),
            label: manifest.label,
            provider,
            features: RwLock::new(Vec::new()),
            archives: manifest.archives,
            categories: manifest.categories,
            feature_categories: manifest.features,
        };
        site.refresh().await?;
        Ok(Arc::new(site))
    }

    #[must_use]
    pub fn url(&self) -> &SiteUrl {
        &self.url
    }

    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn ContentProvider> {
        &self.provider
    }

    #[must_use]
    pub fn root(&self) -> Option<&Path> {
        self.provider.root()
    }

    #[must_use]
    pub fn archives(&self) -> &BTreeMap<String, String> {
        &self.archives
    }

    #[must_use]
    pub fn categories(&self) -> &BTreeSet<String> {
        &self.categories
    }

    /// Snapshot of the feature references
    #[must_use]
    pub fn feature_references(&self) -> Vec<FeatureReference> {
        self.features
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Handle for a manifest URL on this site
    #[must_use]
    pub fn reference_for(&self, url: &str) -> FeatureReference {
        let mut reference = FeatureReference::new(url, Arc::clone(&self.provider));
        if let Some(cats) = reference
            .identifier_hint()
            .and_then(|id| self.feature_categories.get(&id.key()))
        {
            reference = reference.with_categories(cats.clone());
        }
        reference
    }

    /// Register a committed feature; returns the stored reference
    pub fn add_feature_reference(&self, url: &str) -> FeatureReference {
        let reference = self.reference_for(url);
        let mut features = self.features.write().unwrap_or_else(PoisonError::into_inner);
        if !features.contains(&reference) {
            features.push(reference.clone());
        }
        reference
    }

    /// Drop a reference; returns whether it was present
    pub fn remove_feature_reference(&self, reference: &FeatureReference) -> bool {
        let mut features = self.features.write().unwrap_or_else(PoisonError::into_inner);
        let before = features.len();
        features.retain(|r| r != reference);
        features.len() != before
    }

    #[must_use]
    pub fn contains(&self, reference: &FeatureReference) -> bool {
        self.features
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(reference)
    }

    /// Reload the reference list from the provider
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot list features.
    pub async fn refresh(&self) -> Result<(), Error> {
        let urls = self.provider.feature_urls().await?;
        let refs: Vec<FeatureReference> = urls.iter().map(|u| self.reference_for(u)).collect();
        *self.features.write().unwrap_or_else(PoisonError::into_inner) = refs;
        Ok(())
    }

    /// Reference whose feature is `identifier`
    pub async fn reference_by_identifier(
        &self,
        identifier: &VersionedIdentifier,
    ) -> Option<FeatureReference> {
        self.find_features(identifier, MatchRule::Perfect)
            .await
            .into_iter()
            .next()
    }

    /// Every reference whose feature satisfies `base` under `rule`,
    /// best version first
    pub async fn find_features(
        &self,
        base: &VersionedIdentifier,
        rule: MatchRule,
    ) -> Vec<FeatureReference> {
        let mut found = Vec::new();
        for reference in self.feature_references() {
            let Ok(id) = reference.identifier().await else {
                continue;
            };
            if rule.matches(&id, base) {
                found.push((id, reference));
            }
        }
        found.sort_by(|a, b| b.0.cmp(&a.0));
        found.into_iter().map(|(_, r)| r).collect()
    }

    /// Whether an equal feature is already present
    pub async fn has_feature(&self, identifier: &VersionedIdentifier) -> bool {
        self.reference_by_identifier(identifier).await.is_some()
    }

    /// Plugins present on the site
    ///
    /// # Errors
    ///
    /// Returns the provider error.
    pub async fn installed_plugins(&self) -> Result<Vec<VersionedIdentifier>, Error> {
        self.provider.installed_plugins().await
    }

    /// Number of features on the site that declare `plugin`
    pub async fn plugin_usage_count(&self, plugin: &VersionedIdentifier) -> usize {
        let mut count = 0;
        for reference in self.feature_references() {
            match reference.resolve().await {
                Ok(feature) => {
                    if feature
                        .plugin_entries
                        .iter()
                        .any(|p| p.identifier == *plugin)
                    {
                        count += 1;
                    }
                }
                Err(e) => {
                    tracing::debug!(reference = %reference, error = %e, "skipping unresolvable feature");
                }
            }
        }
        count
    }

    /// Resolve every reference, skipping the ones that fail
    pub async fn resolved_features(&self) -> Vec<(FeatureReference, Arc<Feature>)> {
        let mut out = Vec::new();
        for reference in self.feature_references() {
            if let Ok(feature) = reference.resolve().await {
                out.push((reference, feature));
            }
        }
        out
    }

    /// Whether the site accepts writes right now
    pub async fn probe_writable(&self) -> bool {
        let Some(root) = self.root() else {
            return false;
        };
        let probe = root.join(format!(".fman-probe-{}", Uuid::new_v4()));
        match tokio::fs::write(&probe, b"").await {
            Ok(()) => {
                let _ = tokio::fs::remove_file(&probe).await;
                true
            }
            Err(_) => false,
        }
    }

    /// Live change stamp of the site's content
    ///
    /// # Errors
    ///
    /// Returns the provider error.
    pub async fn change_stamp(&self) -> Result<i64, Error> {
        self.provider.change_stamp().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::fs;

    async fn feature(root: &Path, key: &str, id: &str, version: &str, plugins: &[&str]) {
        let dir = root.join("features").join(key);
        fs::create_dir_all(&dir).await.unwrap();
        let mut text = format!("identifier = {{ id = \"{id}\", version = \"{version}\" }}\n");
        for p in plugins {
            let (pid, pver) = p.rsplit_once('_').unwrap();
            text.push_str(&format!(
                "[[plugin_entries]]\nidentifier = {{ id = \"{pid}\", version = \"{pver}\" }}\n"
            ));
        }
        fs::write(dir.join("feature.toml"), text).await.unwrap();
    }

    #[tokio::test]
    async fn finds_features_by_rule() {
        let dir = tempfile::tempdir().unwrap();
        feature(dir.path(), "f_1.0.0", "f", "1.0.0", &["p_1.0.0"]).await;
        feature(dir.path(), "f_1.2.0", "f", "1.2.0", &["p_1.0.0", "q_1.0.0"]).await;
        let site = Site::open(dir.path()).await.unwrap();

        assert_eq!(site.feature_references().len(), 2);
        let base: VersionedIdentifier = "f_1.0.0".parse().unwrap();
        let found = site.find_features(&base, MatchRule::Compatible).await;
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].identifier_hint().unwrap().to_string(), "f_1.2.0");
        assert!(site.has_feature(&base).await);

        assert_eq!(site.plugin_usage_count(&"p_1.0.0".parse().unwrap()).await, 2);
        assert_eq!(site.plugin_usage_count(&"q_1.0.0".parse().unwrap()).await, 1);
        assert!(site.probe_writable().await);
    }

    #[tokio::test]
    async fn references_are_tracked() {
        let dir = tempfile::tempdir().unwrap();
        let site = Site::open(dir.path()).await.unwrap();
        assert!(site.feature_references().is_empty());

        let r = site.add_feature_reference("features/g_1.0.0/feature.toml");
        site.add_feature_reference("features/g_1.0.0/feature.toml");
        assert_eq!(site.feature_references().len(), 1);
        assert!(site.contains(&r));
        // manifest is absent: resolve fails per reference
        assert!(r.resolve().await.is_err());
        assert!(site.remove_feature_reference(&r));
        assert!(!site.remove_feature_reference(&r));
    }
}
