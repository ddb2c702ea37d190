//! Append-only configuration history rooted in a state directory

use chrono::Utc;
use fman_configure::ProblemHandler;
use fman_errors::{Error, StateError};
use fman_events::{EventEmitter, EventSender, FailureContext, StateEvent};
use fman_install::InstallHandler;
use fman_site::SiteRegistry;
use fman_types::{Activity, Environment, SiteUrl, VersionedIdentifier};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::configuration::{ConfigurationRecord, InstallConfiguration};
use crate::persist;

pub const INDEX_FILE: &str = "localsite.json";
pub const CONFIG_PREFIX: &str = "Config";
pub const PRESERVED_PREFIX: &str = "Preserved";

/// Contents of the index file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LocalSiteIndex {
    #[serde(default)]
    label: String,
    max_history_count: usize,
    #[serde(default)]
    stamp: i64,
    #[serde(default)]
    history: Vec<String>,
    #[serde(default)]
    preserved: Vec<String>,
}

/// Outcome of [`LocalSite::reconcile`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// A new configuration was added
    pub changed: bool,
    /// Features newly configured from the live sites
    pub configured: Vec<String>,
    /// Features found with missing plugins or manifests
    pub unhappy: Vec<String>,
    /// References whose content disappeared
    pub forgotten: Vec<String>,
}

/// The history root.
///
/// `history` is oldest first and its last entry is the current
/// configuration. Entries are read-only once added; changes go through
/// [`LocalSite::clone_current`] and [`LocalSite::add_configuration`].
/// Callers serialize mutating operations.
#[derive(Debug)]
pub struct LocalSite {
    dir: PathBuf,
    label: String,
    max_history: usize,
    history: Vec<InstallConfiguration>,
    preserved: Vec<InstallConfiguration>,
    stamp: i64,
    last_id_stamp: i64,
    /// Stamped on every configuration cloned in this session
    timeline: i64,
    registry: SiteRegistry,
    environment: Environment,
    event_sender: Option<EventSender>,
    handler: Option<Arc<dyn InstallHandler>>,
}

impl LocalSite {
    /// Open the history in `dir`, creating an empty initial configuration
    /// when none exists yet
    ///
    /// # Errors
    ///
    /// Returns an error if the index is corrupted or the initial
    /// configuration cannot be written.
    pub async fn open(
        dir: &Path,
        max_history: usize,
        registry: SiteRegistry,
    ) -> Result<Self, Error> {
        Self::open_with(dir, max_history, registry, None).await
    }

    /// Like [`LocalSite::open`], routing configured-site events to `sender`
    ///
    /// # Errors
    ///
    /// See [`LocalSite::open`].
    pub async fn open_with(
        dir: &Path,
        max_history: usize,
        registry: SiteRegistry,
        event_sender: Option<EventSender>,
    ) -> Result<Self, Error> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::io_with_path(&e, dir))?;

        let index: Option<LocalSiteIndex> = persist::read_json(&dir.join(INDEX_FILE)).await?;
        let index = index.unwrap_or_default();

        let mut local = Self {
            dir: dir.to_path_buf(),
            label: index.label.clone(),
            max_history: max_history.max(1),
            history: Vec::new(),
            preserved: Vec::new(),
            stamp: index.stamp,
            last_id_stamp: 0,
            timeline: 0,
            registry,
            environment: Environment::current(),
            event_sender,
            handler: None,
        };

        local.history = local.load_all(&index.history).await;
        local.preserved = local.load_all(&index.preserved).await;
        local.last_id_stamp = index
            .history
            .iter()
            .chain(&index.preserved)
            .filter_map(|id| id_stamp(id))
            .max()
            .unwrap_or(0);
        local.start_timeline();

        if local.history.is_empty() {
            let id = local.next_id(CONFIG_PREFIX);
            let initial = InstallConfiguration::new(&local.dir, id, "initial", local.timeline);
            local.add_configuration(initial).await?;
        } else {
            if let Some(last) = local.history.last_mut() {
                last.set_current(true);
            }
            local.trim().await?;
        }
        Ok(local)
    }

    /// Rebind every listed configuration. Sites are opened first so nested
    /// sites are detected against all managed roots.
    async fn load_all(&self, ids: &[String]) -> Vec<InstallConfiguration> {
        let mut records: Vec<(String, ConfigurationRecord)> = Vec::with_capacity(ids.len());
        for id in ids {
            match InstallConfiguration::read_record(&self.dir, id).await {
                Ok(record) => records.push((id.clone(), record)),
                Err(e) => tracing::warn!(configuration = %id, error = %e, "skipping unreadable configuration"),
            }
        }

        let urls: BTreeSet<&SiteUrl> = records
            .iter()
            .flat_map(|(_, r)| r.sites.iter().map(|s| &s.url))
            .collect();
        let opened = join_all(urls.iter().map(|url| self.registry.resolve(url))).await;
        for (url, outcome) in urls.iter().zip(opened) {
            if let Err(e) = outcome {
                tracing::debug!(site = %url, error = %e, "site unavailable");
            }
        }
        let roots = self.registry.roots();

        let mut loaded = Vec::with_capacity(records.len());
        for (id, record) in records {
            let mut configuration =
                InstallConfiguration::from_record(&self.dir, &id, record, &self.registry, &roots)
                    .await;
            configuration.attach(self.event_sender.as_ref(), self.handler.as_ref());
            loaded.push(configuration);
        }
        loaded
    }

    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Run `handler`'s configure and unconfigure hooks on every configured
    /// site, loaded or cloned from now on
    #[must_use]
    pub fn with_install_handler(mut self, handler: Arc<dyn InstallHandler>) -> Self {
        for configuration in self.history.iter_mut().chain(self.preserved.iter_mut()) {
            configuration.attach(None, Some(&handler));
        }
        self.handler = Some(handler);
        self
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn max_history(&self) -> usize {
        self.max_history
    }

    #[must_use]
    pub fn stamp(&self) -> i64 {
        self.stamp
    }

    #[must_use]
    pub fn registry(&self) -> &SiteRegistry {
        &self.registry
    }

    #[must_use]
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// The current configuration
    ///
    /// # Errors
    ///
    /// Returns `StateError::NoCurrentConfiguration` if the history is empty.
    pub fn current(&self) -> Result<&InstallConfiguration, Error> {
        self.history
            .last()
            .ok_or_else(|| StateError::NoCurrentConfiguration.into())
    }

    #[must_use]
    pub fn history(&self) -> &[InstallConfiguration] {
        &self.history
    }

    #[must_use]
    pub fn preserved(&self) -> &[InstallConfiguration] {
        &self.preserved
    }

    /// A history or preserved configuration by id
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&InstallConfiguration> {
        self.history
            .iter()
            .chain(&self.preserved)
            .find(|c| c.id() == id)
    }

    /// Unique, increasing id with the given prefix
    /// Timeline of the current session
    #[must_use]
    pub fn timeline(&self) -> i64 {
        self.timeline
    }

    /// Begin a new timeline, later than every one already in the history
    fn start_timeline(&mut self) {
        let latest = self
            .history
            .iter()
            .chain(&self.preserved)
            .map(InstallConfiguration::timeline)
            .max()
            .unwrap_or(0);
        self.timeline = Utc::now().timestamp_millis().max(latest + 1);
    }

    fn next_id(&mut self, prefix: &str) -> String {
        let now = Utc::now().timestamp_millis();
        self.last_id_stamp = now.max(self.last_id_stamp + 1);
        format!("{prefix}{}", self.last_id_stamp)
    }

    /// Writable copy of the current configuration under a fresh id
    ///
    /// # Errors
    ///
    /// Returns `StateError::NoCurrentConfiguration` if the history is empty.
    pub fn clone_current(&mut self, label: impl Into<String>) -> Result<InstallConfiguration, Error> {
        let id = self.next_id(CONFIG_PREFIX);
        let current = self.current()?;
        let mut copy = current.clone_as(&self.dir, id, label);
        copy.set_timeline(self.timeline);
        copy.attach(self.event_sender.as_ref(), self.handler.as_ref());
        Ok(copy)
    }

    /// Persist `configuration`, make it current and read-only, then evict
    /// history beyond the cap
    ///
    /// # Errors
    ///
    /// Returns `StateError::PersistFailed` when the configuration or the
    /// index cannot be written. Nothing is appended when the configuration
    /// itself fails to save.
    pub async fn add_configuration(
        &mut self,
        mut configuration: InstallConfiguration,
    ) -> Result<(), Error> {
        configuration.save().await?;
        configuration.mark_read_only();
        configuration.set_current(true);
        if let Some(previous) = self.history.last_mut() {
            previous.set_current(false);
        }

        let id = configuration.id().to_string();
        let label = configuration.label().to_string();
        self.history.push(configuration);
        self.trim().await?;
        self.save().await?;

        tracing::info!(configuration = %id, label = %label, "configuration added");
        self.emit_state(StateEvent::ConfigurationAdded { id, label });
        Ok(())
    }

    async fn trim(&mut self) -> Result<(), Error> {
        while self.history.len() > self.max_history {
            let evicted = self.history.remove(0);
            persist::remove_file(evicted.location()).await?;
            tracing::debug!(configuration = %evicted.id(), "configuration evicted");
            self.emit_state(StateEvent::ConfigurationEvicted {
                id: evicted.id().to_string(),
                path: evicted.location().display().to_string(),
            });
        }
        Ok(())
    }

    /// Append an activity to the current configuration and re-save it
    ///
    /// # Errors
    ///
    /// Returns an error if the current configuration cannot be written.
    pub async fn record_activity(&mut self, activity: Activity) -> Result<(), Error> {
        let current = self
            .history
            .last_mut()
            .ok_or(StateError::NoCurrentConfiguration)?;
        current.add_activity(activity);
        current.save().await
    }

    /// Copy a history entry into the preserved list under its own file
    ///
    /// # Errors
    ///
    /// Returns `StateError::ConfigurationNotFound` for an unknown id or a
    /// persistence error.
    pub async fn preserve(&mut self, id: &str) -> Result<String, Error> {
        let source = self
            .history
            .iter()
            .find(|c| c.id() == id)
            .cloned()
            .ok_or_else(|| StateError::ConfigurationNotFound { id: id.to_string() })?;
        let preserved_id = self.next_id(PRESERVED_PREFIX);
        let copy = source.snapshot_as(&self.dir, preserved_id.clone());
        copy.save().await?;
        self.preserved.push(copy);
        self.save().await?;

        tracing::info!(source = id, preserved = %preserved_id, "configuration preserved");
        self.emit_state(StateEvent::Preserved {
            id: preserved_id.clone(),
        });
        Ok(preserved_id)
    }

    /// # Errors
    ///
    /// Returns `StateError::ConfigurationNotFound` for an unknown id or a
    /// persistence error.
    pub async fn remove_preserved(&mut self, id: &str) -> Result<(), Error> {
        let index = self
            .preserved
            .iter()
            .position(|c| c.id() == id)
            .ok_or_else(|| StateError::ConfigurationNotFound { id: id.to_string() })?;
        let removed = self.preserved.remove(index);
        persist::remove_file(removed.location()).await?;
        self.save().await?;
        self.emit_state(StateEvent::PreservedRemoved { id: id.to_string() });
        Ok(())
    }

    /// Restore the configured sets of `id` into a new current configuration.
    ///
    /// Sites present in both are reverted feature by feature; sites that
    /// only exist now have everything unconfigured. The target and the
    /// existing history are left untouched.
    ///
    /// # Errors
    ///
    /// Returns `StateError::ConfigurationNotFound`, `StateError::Interrupted`
    /// when `handler` aborts, or a persistence error.
    pub async fn revert_to(
        &mut self,
        id: &str,
        handler: &dyn ProblemHandler,
    ) -> Result<&InstallConfiguration, Error> {
        let target = self
            .find(id)
            .cloned()
            .ok_or_else(|| StateError::ConfigurationNotFound { id: id.to_string() })?;
        self.emit_state(StateEvent::RevertStarted {
            target: id.to_string(),
        });

        match self.revert_into(&target, handler).await {
            Ok(next) => {
                let created = next.id().to_string();
                self.add_configuration(next).await?;
                tracing::info!(target = id, created = %created, "revert completed");
                self.emit_state(StateEvent::RevertCompleted {
                    target: id.to_string(),
                    created,
                });
                self.current()
            }
            Err(e) => {
                tracing::warn!(target = id, error = %e, "revert failed");
                self.emit_state(StateEvent::RevertFailed {
                    target: id.to_string(),
                    failure: FailureContext::from_error(&e),
                });
                Err(e)
            }
        }
    }

    async fn revert_into(
        &mut self,
        target: &InstallConfiguration,
        handler: &dyn ProblemHandler,
    ) -> Result<InstallConfiguration, Error> {
        let ever_configured = self.ever_configured();
        let environment = self.environment.clone();
        let mut next = self.clone_current(format!("revert to {}", target.id()))?;

        for site in next.sites_mut()? {
            match target.site(site.url()) {
                Some(old) => {
                    let ever = ever_configured
                        .get(site.url())
                        .map(|set| set.iter().cloned().collect::<Vec<_>>())
                        .unwrap_or_default();
                    site.revert_to(old, &ever, &environment, handler).await?;
                }
                None => {
                    tracing::debug!(site = %site.url(), "site absent from target, unconfiguring");
                    site.unconfigure_all().await?;
                }
            }
        }
        Ok(next)
    }

    /// Manifest URLs configured at any point, per site
    fn ever_configured(&self) -> BTreeMap<SiteUrl, BTreeSet<String>> {
        let mut map: BTreeMap<SiteUrl, BTreeSet<String>> = BTreeMap::new();
        for configuration in self.history.iter().chain(&self.preserved) {
            for site in configuration.sites() {
                map.entry(site.url().clone()).or_default().extend(
                    site.policy()
                        .configured()
                        .iter()
                        .map(|r| r.url().to_string()),
                );
            }
        }
        map
    }

    /// Write the index file
    ///
    /// # Errors
    ///
    /// Returns `StateError::PersistFailed` when the index cannot be written.
    pub async fn save(&self) -> Result<(), Error> {
        let index = LocalSiteIndex {
            label: self.label.clone(),
            max_history_count: self.max_history,
            stamp: self.stamp,
            history: self.history.iter().map(|c| c.id().to_string()).collect(),
            preserved: self.preserved.iter().map(|c| c.id().to_string()).collect(),
        };
        let path = self.dir.join(INDEX_FILE);
        persist::write_json(&path, &index).await?;
        self.emit_state(StateEvent::Saved {
            path: path.display().to_string(),
        });
        Ok(())
    }

    /// Newest change stamp across the current configuration's sites
    pub async fn live_stamp(&self) -> i64 {
        let Ok(current) = self.current() else {
            return 0;
        };
        let mut newest = 0;
        for site in current.sites() {
            match site.site().change_stamp().await {
                Ok(stamp) => newest = newest.max(stamp),
                Err(e) => tracing::debug!(site = %site.url(), error = %e, "no change stamp"),
            }
        }
        newest
    }

    /// Store the live stamp so the next start does not reconcile changes
    /// made through this process
    ///
    /// # Errors
    ///
    /// Returns `StateError::PersistFailed` when the index cannot be written.
    pub async fn sync_stamp(&mut self) -> Result<(), Error> {
        let live = self.live_stamp().await;
        if live != self.stamp {
            self.stamp = live;
            self.save().await?;
        }
        Ok(())
    }

    /// Bring the configured sets in line with what is actually on disk.
    ///
    /// Runs only when the live stamp differs from the stored one. New
    /// features are configured when `optimistic` and all their plugins are
    /// present, otherwise they are tracked as unconfigured. Features whose
    /// content vanished are forgotten.
    ///
    /// # Errors
    ///
    /// Returns a persistence error.
    pub async fn reconcile(&mut self, optimistic: bool) -> Result<ReconcileReport, Error> {
        let live = self.live_stamp().await;
        let mut report = ReconcileReport::default();
        if live == self.stamp {
            return Ok(report);
        }
        tracing::info!(stored = self.stamp, live, optimistic, "reconciling with live sites");
        self.start_timeline();

        let environment = self.environment.clone();
        let mut next = self.clone_current("reconcile")?;
        let mut touched = false;
        for site in next.sites_mut()? {
            if let Err(e) = site.site().refresh().await {
                tracing::warn!(site = %site.url(), error = %e, "site not refreshed");
                continue;
            }

            let stale: Vec<_> = site
                .policy()
                .all()
                .filter(|r| !site.site().contains(r))
                .cloned()
                .collect();
            for reference in stale {
                site.forget(&reference);
                report.forgotten.push(reference.to_string());
                touched = true;
            }

            let installed: HashSet<VersionedIdentifier> = match site.site().installed_plugins().await {
                Ok(plugins) => plugins.into_iter().collect(),
                Err(e) => {
                    tracing::warn!(site = %site.url(), error = %e, "cannot list plugins");
                    HashSet::new()
                }
            };

            for reference in site.site().feature_references() {
                if site.policy().contains(&reference) {
                    continue;
                }
                let healthy = match reference.resolve().await {
                    Ok(feature) => feature
                        .plugins_for(&environment)
                        .all(|p| installed.contains(&p.identifier)),
                    Err(e) => {
                        tracing::debug!(reference = %reference, error = %e, "unresolvable feature");
                        false
                    }
                };
                let configure = optimistic && healthy;
                site.adopt(&reference, configure);
                touched = true;
                if configure {
                    report.configured.push(reference.to_string());
                } else if !healthy {
                    report.unhappy.push(reference.to_string());
                }
                if !healthy {
                    tracing::warn!(reference = %reference, "feature content incomplete");
                }
            }
        }

        self.stamp = live;
        if touched {
            self.add_configuration(next).await?;
            report.changed = true;
        } else {
            self.save().await?;
        }

        self.emit_state(StateEvent::Reconciled {
            optimistic,
            configured: report.configured.len(),
            unhappy: report.unhappy.len(),
        });
        Ok(report)
    }
}

impl EventEmitter for LocalSite {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

/// Millisecond stamp encoded in a configuration id
fn id_stamp(id: &str) -> Option<i64> {
    id.strip_prefix(CONFIG_PREFIX)
        .or_else(|| id.strip_prefix(PRESERVED_PREFIX))
        .and_then(|digits| digits.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_stamp_parses_both_prefixes() {
        assert_eq!(id_stamp("Config1700000000000"), Some(1_700_000_000_000));
        assert_eq!(id_stamp("Preserved42"), Some(42));
        assert_eq!(id_stamp("other"), None);
    }

    #[tokio::test]
    async fn ids_are_strictly_increasing() {
        let dir = tempfile::tempdir().unwrap();
        let mut local = LocalSite::open(dir.path(), 3, SiteRegistry::new())
            .await
            .unwrap();
        let a = local.next_id(CONFIG_PREFIX);
        let b = local.next_id(CONFIG_PREFIX);
        assert!(id_stamp(&b) > id_stamp(&a));
    }
}
