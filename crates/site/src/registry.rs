//! Lookup table of opened sites

use dashmap::DashMap;
use fman_errors::{Error, SiteError};
use fman_types::SiteUrl;
use std::path::Path;
use std::sync::Arc;

use crate::site::Site;

/// Maps site URLs to opened sites so persisted configurations can be
/// rebound to live sites.
#[derive(Debug, Default, Clone)]
pub struct SiteRegistry {
    sites: Arc<DashMap<SiteUrl, Arc<Site>>>,
}

impl SiteRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or return the already opened) directory site at `root`
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be opened as a site.
    pub async fn open_directory(&self, root: &Path) -> Result<Arc<Site>, Error> {
        if let Ok(canonical) = tokio::fs::canonicalize(root).await {
            if let Some(site) = self.get(&SiteUrl::from_path(&canonical)) {
                return Ok(site);
            }
        }
        let site = Site::open(root).await?;
        self.insert(Arc::clone(&site));
        Ok(site)
    }

    /// Look up an opened site, opening `file://` URLs on demand
    ///
    /// # Errors
    ///
    /// Returns `SiteError::NotFound` for unknown non-file URLs or missing directories.
    pub async fn resolve(&self, url: &SiteUrl) -> Result<Arc<Site>, Error> {
        if let Some(site) = self.get(url) {
            return Ok(site);
        }
        match url.to_path() {
            Some(path) => self.open_directory(&path).await,
            None => Err(SiteError::NotFound {
                url: url.to_string(),
            }
            .into()),
        }
    }

    #[must_use]
    pub fn get(&self, url: &SiteUrl) -> Option<Arc<Site>> {
        self.sites.get(url).map(|entry| Arc::clone(entry.value()))
    }

    pub fn insert(&self, site: Arc<Site>) {
        self.sites.insert(site.url().clone(), site);
    }

    pub fn remove(&self, url: &SiteUrl) -> Option<Arc<Site>> {
        self.sites.remove(url).map(|(_, site)| site)
    }

    /// All opened sites, ordered by URL
    #[must_use]
    pub fn sites(&self) -> Vec<Arc<Site>> {
        let mut sites: Vec<_> = self.sites.iter().map(|e| Arc::clone(e.value())).collect();
        sites.sort_by(|a, b| a.url().cmp(b.url()));
        sites
    }

    /// Local roots of every opened site
    #[must_use]
    pub fn roots(&self) -> Vec<std::path::PathBuf> {
        self.sites
            .iter()
            .filter_map(|e| e.value().root().map(Path::to_path_buf))
            .collect()
    }
}
