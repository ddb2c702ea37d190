//! Lazy handles to features on a site

use fman_errors::Error;
use fman_types::{Feature, SiteUrl, VersionedIdentifier};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::content::ContentProvider;

/// A handle to a feature manifest on a site.
///
/// Equality is by site and manifest URL. [`FeatureReference::resolve`] reads
/// the manifest each time it is called; a missing or malformed manifest is a
/// per-reference error, not a transaction abort.
#[derive(Clone)]
pub struct FeatureReference {
    url: String,
    site: SiteUrl,
    identifier: Option<VersionedIdentifier>,
    categories: Vec<String>,
    provider: Arc<dyn ContentProvider>,
}

impl FeatureReference {
    pub fn new(url: impl Into<String>, provider: Arc<dyn ContentProvider>) -> Self {
        let url = url.into();
        let identifier = provider.identifier_hint(&url);
        Self {
            site: provider.url().clone(),
            url,
            identifier,
            categories: Vec::new(),
            provider,
        }
    }

    #[must_use]
    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn site(&self) -> &SiteUrl {
        &self.site
    }

    #[must_use]
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Identifier known without reading the manifest, if the URL encodes one
    #[must_use]
    pub fn identifier_hint(&self) -> Option<&VersionedIdentifier> {
        self.identifier.as_ref()
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn ContentProvider> {
        &self.provider
    }

    /// Materialize the feature
    ///
    /// # Errors
    ///
    /// Returns a site error when the manifest is missing or unparsable.
    pub async fn resolve(&self) -> Result<Arc<Feature>, Error> {
        Ok(Arc::new(self.provider.load_feature(&self.url).await?))
    }

    /// Identifier from the hint, resolving the manifest when there is none
    ///
    /// # Errors
    ///
    /// Returns the resolve error when no hint exists and the manifest cannot be read.
    pub async fn identifier(&self) -> Result<VersionedIdentifier, Error> {
        match &self.identifier {
            Some(id) => Ok(id.clone()),
            None => Ok(self.resolve().await?.identifier.clone()),
        }
    }
}

impl PartialEq for FeatureReference {
    fn eq(&self, other: &Self) -> bool {
        self.site == other.site && self.url == other.url
    }
}

impl Eq for FeatureReference {}

impl Hash for FeatureReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.site.hash(state);
        self.url.hash(state);
    }
}

impl fmt::Debug for FeatureReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureReference")
            .field("site", &self.site)
            .field("url", &self.url)
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for FeatureReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identifier {
            Some(id) => write!(f, "{id}"),
            None => write!(f, "{}", self.url),
        }
    }
}
