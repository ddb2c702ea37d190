//! Install configurations: timestamped snapshots of every configured site

use chrono::{DateTime, Utc};
use fman_configure::{ConfiguredSite, ConfiguredSiteRecord};
use fman_errors::{Error, StateError};
use fman_events::EventSender;
use fman_install::InstallHandler;
use fman_site::SiteRegistry;
use fman_types::{Activity, SiteUrl};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::persist;

/// On-disk form of one configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationRecord {
    pub label: String,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub timeline: i64,
    #[serde(default)]
    pub sites: Vec<ConfiguredSiteRecord>,
    #[serde(default)]
    pub activities: Vec<Activity>,
}

/// A snapshot of which features are enabled on which sites.
///
/// Read-only once added to the history; further changes go into a clone.
/// Activities stay appendable on read-only configurations.
#[derive(Debug, Clone)]
pub struct InstallConfiguration {
    id: String,
    location: PathBuf,
    label: String,
    created: DateTime<Utc>,
    timeline: i64,
    sites: Vec<ConfiguredSite>,
    activities: Vec<Activity>,
    read_only: bool,
    current: bool,
}

impl InstallConfiguration {
    /// A fresh, empty configuration backed by `<dir>/<id>.json`
    pub fn new(dir: &Path, id: impl Into<String>, label: impl Into<String>, timeline: i64) -> Self {
        let id = id.into();
        Self {
            location: dir.join(format!("{id}.json")),
            id,
            label: label.into(),
            created: Utc::now(),
            timeline,
            sites: Vec::new(),
            activities: Vec::new(),
            read_only: false,
            current: false,
        }
    }

    /// Writable copy under a new id; activities are not carried over
    #[must_use]
    pub fn clone_as(&self, dir: &Path, id: impl Into<String>, label: impl Into<String>) -> Self {
        let mut copy = Self::new(dir, id, label, self.timeline);
        copy.sites = self.sites.clone();
        copy
    }

    /// Full copy under a new id, activities included
    #[must_use]
    pub(crate) fn snapshot_as(&self, dir: &Path, id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            location: dir.join(format!("{id}.json")),
            id,
            current: false,
            read_only: true,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn location(&self) -> &Path {
        &self.location
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    #[must_use]
    pub fn timeline(&self) -> i64 {
        self.timeline
    }

    pub(crate) fn set_timeline(&mut self, timeline: i64) {
        self.timeline = timeline;
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    #[must_use]
    pub fn is_current(&self) -> bool {
        self.current
    }

    pub(crate) fn set_current(&mut self, current: bool) {
        self.current = current;
    }

    pub fn mark_read_only(&mut self) {
        self.read_only = true;
    }

    #[must_use]
    pub fn sites(&self) -> &[ConfiguredSite] {
        &self.sites
    }

    #[must_use]
    pub fn site(&self, url: &SiteUrl) -> Option<&ConfiguredSite> {
        self.sites.iter().find(|s| s.url() == url)
    }

    /// Mutable access to a configured site
    ///
    /// # Errors
    ///
    /// Returns `StateError::ReadOnly` for a saved configuration and
    /// `StateError::SiteNotConfigured` when the site is absent.
    pub fn site_mut(&mut self, url: &SiteUrl) -> Result<&mut ConfiguredSite, Error> {
        self.ensure_writable()?;
        self.sites
            .iter_mut()
            .find(|s| s.url() == url)
            .ok_or_else(|| {
                StateError::SiteNotConfigured {
                    url: url.to_string(),
                }
                .into()
            })
    }

    /// Mutable access to every configured site
    ///
    /// # Errors
    ///
    /// Returns `StateError::ReadOnly` for a saved configuration.
    pub fn sites_mut(&mut self) -> Result<&mut [ConfiguredSite], Error> {
        self.ensure_writable()?;
        Ok(&mut self.sites)
    }

    /// # Errors
    ///
    /// Returns `StateError::SiteAlreadyConfigured` or `StateError::ReadOnly`.
    pub fn add_site(&mut self, site: ConfiguredSite) -> Result<(), Error> {
        self.ensure_writable()?;
        if self.site(site.url()).is_some() {
            return Err(StateError::SiteAlreadyConfigured {
                url: site.url().to_string(),
            }
            .into());
        }
        self.sites.push(site);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `StateError::SiteNotConfigured` or `StateError::ReadOnly`.
    pub fn remove_site(&mut self, url: &SiteUrl) -> Result<ConfiguredSite, Error> {
        self.ensure_writable()?;
        let index = self
            .sites
            .iter()
            .position(|s| s.url() == url)
            .ok_or_else(|| StateError::SiteNotConfigured {
                url: url.to_string(),
            })?;
        Ok(self.sites.remove(index))
    }

    #[must_use]
    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    pub fn add_activity(&mut self, activity: Activity) {
        self.activities.push(activity);
    }

    fn ensure_writable(&self) -> Result<(), Error> {
        if self.read_only {
            Err(StateError::ReadOnly {
                id: self.id.clone(),
            }
            .into())
        } else {
            Ok(())
        }
    }

    #[must_use]
    pub fn to_record(&self) -> ConfigurationRecord {
        ConfigurationRecord {
            label: self.label.clone(),
            created: self.created,
            timeline: self.timeline,
            sites: self.sites.iter().map(ConfiguredSite::to_record).collect(),
            activities: self.activities.clone(),
        }
    }

    /// Write the backing file
    ///
    /// # Errors
    ///
    /// Returns `StateError::PersistFailed` when the file cannot be written.
    pub async fn save(&self) -> Result<(), Error> {
        persist::write_json(&self.location, &self.to_record()).await
    }

    /// Read the persisted record for `id` without binding any site
    ///
    /// # Errors
    ///
    /// Returns `StateError::ConfigurationNotFound` when the file is missing
    /// and `StateError::StateCorrupted` when it cannot be parsed.
    pub async fn read_record(dir: &Path, id: &str) -> Result<ConfigurationRecord, Error> {
        persist::read_json(&dir.join(format!("{id}.json")))
            .await?
            .ok_or_else(|| StateError::ConfigurationNotFound { id: id.to_string() }.into())
    }

    /// Rebuild a read-only configuration from `record`, rebinding sites
    /// through `registry`. Sites that can no longer be opened are dropped
    /// with a warning.
    pub async fn from_record(
        dir: &Path,
        id: &str,
        record: ConfigurationRecord,
        registry: &SiteRegistry,
        managed_roots: &[PathBuf],
    ) -> Self {
        let mut sites = Vec::with_capacity(record.sites.len());
        for site_record in &record.sites {
            match registry.resolve(&site_record.url).await {
                Ok(site) => {
                    sites.push(ConfiguredSite::from_record(site_record, site, managed_roots).await);
                }
                Err(e) => {
                    tracing::warn!(configuration = id, site = %site_record.url, error = %e, "dropping unavailable site");
                }
            }
        }

        Self {
            id: id.to_string(),
            location: dir.join(format!("{id}.json")),
            label: record.label,
            created: record.created,
            timeline: record.timeline,
            sites,
            activities: record.activities,
            read_only: true,
            current: false,
        }
    }

    /// Read and rebind `<dir>/<id>.json`
    ///
    /// # Errors
    ///
    /// Same as [`InstallConfiguration::read_record`].
    pub async fn load(
        dir: &Path,
        id: &str,
        registry: &SiteRegistry,
        managed_roots: &[PathBuf],
    ) -> Result<Self, Error> {
        let record = Self::read_record(dir, id).await?;
        Ok(Self::from_record(dir, id, record, registry, managed_roots).await)
    }

    /// Route events and install handler hooks of every configured site
    pub(crate) fn attach(
        &mut self,
        sender: Option<&EventSender>,
        handler: Option<&Arc<dyn InstallHandler>>,
    ) {
        self.sites = std::mem::take(&mut self.sites)
            .into_iter()
            .map(|mut site| {
                if let Some(sender) = sender {
                    site = site.with_event_sender(sender.clone());
                }
                if let Some(handler) = handler {
                    site = site.with_handler(Arc::clone(handler));
                }
                site
            })
            .collect();
    }
}
