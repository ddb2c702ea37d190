//! A site together with the policy of which of its features are enabled

use fman_errors::{Error, InstallError, SiteError, StateError};
use fman_events::{EventEmitter, EventSender, SiteEvent, StateEvent};
use fman_install::{InstallHandler, InstallTarget, Installer, RemoveResult};
use fman_site::{FeatureReference, Site};
use fman_types::{Environment, Feature, SiteUrl, VersionedIdentifier};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use crate::listener::ConfiguredSiteListener;
use crate::policy::{ConfigurationPolicy, PolicyKind};
use crate::problem::{ProblemHandler, ProblemResponse};

/// Persisted shape of a configured site: feature manifest URLs per set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfiguredSiteRecord {
    pub url: SiteUrl,
    #[serde(default)]
    pub policy: PolicyKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub updatable: bool,
    #[serde(default)]
    pub configured: Vec<String>,
    #[serde(default)]
    pub unconfigured: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct ConfiguredSite {
    site: Arc<Site>,
    policy: ConfigurationPolicy,
    updatable: bool,
    enabled: bool,
    listeners: Vec<Arc<dyn ConfiguredSiteListener>>,
    handler: Option<Arc<dyn InstallHandler>>,
    event_sender: Option<EventSender>,
}

impl ConfiguredSite {
    /// Wrap `site`, deciding once whether it accepts installs.
    ///
    /// A site is updatable when it is a writable local directory that is not
    /// nested inside another of the `managed_roots`.
    pub async fn open(site: Arc<Site>, managed_roots: &[PathBuf]) -> Self {
        let updatable = compute_updatable(&site, managed_roots).await;
        Self {
            site,
            policy: ConfigurationPolicy::default(),
            updatable,
            enabled: true,
            listeners: Vec::new(),
            handler: None,
            event_sender: None,
        }
    }

    /// Rebuild from a persisted record against the live `site`
    pub async fn from_record(
        record: &ConfiguredSiteRecord,
        site: Arc<Site>,
        managed_roots: &[PathBuf],
    ) -> Self {
        let mut configured_site = Self::open(site, managed_roots).await;
        configured_site.enabled = record.enabled;
        configured_site.policy = ConfigurationPolicy::new(record.policy);
        for url in &record.configured {
            let reference = configured_site.site.reference_for(url);
            configured_site.policy.mark_configured(&reference);
        }
        for url in &record.unconfigured {
            let reference = configured_site.site.reference_for(url);
            configured_site.policy.track(&reference);
        }
        configured_site
    }

    #[must_use]
    pub fn to_record(&self) -> ConfiguredSiteRecord {
        ConfiguredSiteRecord {
            url: self.site.url().clone(),
            policy: self.policy.kind(),
            enabled: self.enabled,
            updatable: self.updatable,
            configured: self
                .policy
                .configured()
                .iter()
                .map(|r| r.url().to_string())
                .collect(),
            unconfigured: self
                .policy
                .unconfigured()
                .iter()
                .map(|r| r.url().to_string())
                .collect(),
        }
    }

    /// Hooks run on every configure and unconfigure of this site
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn InstallHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    #[must_use]
    pub fn with_event_sender(mut self, sender: EventSender) -> Self {
        self.event_sender = Some(sender);
        self
    }

    pub fn add_listener(&mut self, listener: Arc<dyn ConfiguredSiteListener>) {
        self.listeners.push(listener);
    }

    #[must_use]
    pub fn site(&self) -> &Arc<Site> {
        &self.site
    }

    #[must_use]
    pub fn url(&self) -> &SiteUrl {
        self.site.url()
    }

    #[must_use]
    pub fn policy(&self) -> &ConfigurationPolicy {
        &self.policy
    }

    #[must_use]
    pub fn is_updatable(&self) -> bool {
        self.updatable
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            self.enabled = enabled;
            self.emit_site(SiteEvent::SiteEnabled {
                site: self.site.url().to_string(),
                enabled,
            });
        }
    }

    #[must_use]
    pub fn is_configured(&self, reference: &FeatureReference) -> bool {
        self.policy.is_configured(reference)
    }

    /// Take every feature currently on the site into the policy, either
    /// configured or unconfigured
    pub fn adopt_features(&mut self, configure: bool) {
        for reference in self.site.feature_references() {
            self.adopt(&reference, configure);
        }
    }

    /// Record `reference` without running hooks, recursion or checks
    pub fn adopt(&mut self, reference: &FeatureReference, configure: bool) {
        if configure {
            if self.policy.mark_configured(reference) {
                self.announce_configured(reference);
            }
        } else {
            self.policy.track(reference);
        }
    }

    /// Drop a reference whose content is gone
    pub fn forget(&mut self, reference: &FeatureReference) -> bool {
        self.policy.forget(reference)
    }

    /// Move every configured feature to the unconfigured set, running the
    /// handler's unconfigure hook for each
    ///
    /// # Errors
    ///
    /// Returns the first install handler failure; features before it stay
    /// unconfigured.
    pub async fn unconfigure_all(&mut self) -> Result<(), Error> {
        for reference in self.policy.configured().to_vec() {
            self.run_hook(&reference, false).await?;
            if self.policy.mark_unconfigured(&reference) {
                self.announce_unconfigured(&reference);
            }
        }
        Ok(())
    }

    /// Configured references that still resolve, with their features
    pub async fn configured_features(&self) -> Vec<(FeatureReference, Arc<Feature>)> {
        let mut out = Vec::new();
        for reference in self.policy.configured() {
            match reference.resolve().await {
                Ok(feature) => out.push((reference.clone(), feature)),
                Err(e) => {
                    tracing::debug!(reference = %reference, error = %e, "configured feature unresolvable");
                }
            }
        }
        out
    }

    /// Install into this site; the new reference starts unconfigured
    ///
    /// # Errors
    ///
    /// Returns the install transaction error.
    pub async fn install(
        &mut self,
        installer: &Installer,
        source_site: &Arc<Site>,
        source: &FeatureReference,
    ) -> Result<FeatureReference, Error> {
        let target = InstallTarget::new(Arc::clone(&self.site), self.updatable);
        let installed = installer.install(source_site, source, &target).await?;
        // included children committed alongside
        for reference in self.site.feature_references() {
            self.policy.track(&reference);
        }
        self.notify("feature_installed", &installed, |l, s, r| {
            l.feature_installed(s, r);
        });
        Ok(installed)
    }

    /// Unconfigure if needed, then remove the feature's content
    ///
    /// # Errors
    ///
    /// Returns `InstallError::ParentDependency` when a configured feature
    /// still includes it, or the remove transaction error.
    pub async fn remove(
        &mut self,
        installer: &Installer,
        reference: &FeatureReference,
    ) -> Result<RemoveResult, Error> {
        if self.policy.is_configured(reference) && !self.unconfigure(reference).await? {
            let parent = match reference.resolve().await {
                Ok(feature) => self
                    .configured_parent(&feature, reference)
                    .await
                    .map(|p| p.to_string()),
                Err(_) => None,
            };
            return Err(InstallError::ParentDependency {
                feature: reference.to_string(),
                parent: parent.unwrap_or_default(),
            }
            .into());
        }

        let target = InstallTarget::new(Arc::clone(&self.site), self.updatable);
        let result = installer.remove(reference, &target).await?;
        self.policy.forget(reference);
        self.notify("feature_removed", reference, |l, s, r| {
            l.feature_removed(s, r);
        });
        Ok(result)
    }

    /// Configure with the install handler, children first
    ///
    /// # Errors
    ///
    /// Returns an error if the feature cannot be resolved, a mandatory child
    /// cannot be configured, or the handler fails.
    pub async fn configure(&mut self, reference: &FeatureReference) -> Result<(), Error> {
        self.configure_with(reference, true, true, None).await
    }

    /// Configure `reference`. Included children found on this site are
    /// configured first when `children_first` is set; an optional child is
    /// skipped when `optional` is given and does not list it (by id or
    /// `id_version`).
    pub fn configure_with<'a>(
        &'a mut self,
        reference: &'a FeatureReference,
        run_handler: bool,
        children_first: bool,
        optional: Option<&'a [String]>,
    ) -> BoxFuture<'a, Result<(), Error>> {
        Box::pin(async move {
            if self.policy.is_configured(reference) {
                return Ok(());
            }
            let feature = reference.resolve().await?;

            if children_first {
                for decl in &feature.included {
                    let key = decl.identifier.to_string();
                    let selected = optional.is_none_or(|sel| {
                        sel.iter().any(|s| *s == key || *s == decl.identifier.id)
                    });
                    if decl.optional && !selected {
                        tracing::debug!(feature = %feature.identifier, child = %key, "optional child not selected");
                        continue;
                    }

                    let child = self
                        .site
                        .find_features(&decl.identifier, decl.match_rule)
                        .await
                        .into_iter()
                        .next();
                    let outcome = match child {
                        Some(child) => {
                            self.configure_with(&child, run_handler, true, optional)
                                .await
                        }
                        None => Err(SiteError::FeatureNotFound {
                            site: self.site.url().to_string(),
                            feature: key.clone(),
                        }
                        .into()),
                    };
                    if let Err(e) = outcome {
                        if !decl.optional {
                            return Err(e);
                        }
                        tracing::warn!(feature = %feature.identifier, child = %key, error = %e, "optional child not configured");
                        self.emit_site(SiteEvent::ChildNotConfigured {
                            site: self.site.url().to_string(),
                            feature: feature.identifier.to_string(),
                            child: key,
                            reason: e.to_string(),
                        });
                    }
                }
            }

            if run_handler {
                if let Some(handler) = &self.handler {
                    handler.configure(&feature).await?;
                }
            }
            if self.policy.mark_configured(reference) {
                self.announce_configured(reference);
            }
            Ok(())
        })
    }

    /// Unconfigure with patch cascade and parent protection; `Ok(false)`
    /// means a configured parent still includes the feature
    ///
    /// # Errors
    ///
    /// Returns an error if the install handler or a cascaded patch fails.
    pub async fn unconfigure(&mut self, reference: &FeatureReference) -> Result<bool, Error> {
        self.unconfigure_with(reference, true, true).await
    }

    /// Unconfigure `reference`, then its patches (when `cascade_patches`)
    /// and its configured children. Children skip the parent check.
    pub fn unconfigure_with<'a>(
        &'a mut self,
        reference: &'a FeatureReference,
        cascade_patches: bool,
        require_no_parent: bool,
    ) -> BoxFuture<'a, Result<bool, Error>> {
        Box::pin(async move {
            if !self.policy.is_configured(reference) {
                self.policy.track(reference);
                return Ok(true);
            }

            let feature = match reference.resolve().await {
                Ok(feature) => feature,
                Err(e) => {
                    tracing::warn!(reference = %reference, error = %e, "unconfiguring unresolvable feature");
                    if self.policy.mark_unconfigured(reference) {
                        self.announce_unconfigured(reference);
                    }
                    return Ok(true);
                }
            };

            if require_no_parent {
                if let Some(parent) = self.configured_parent(&feature, reference).await {
                    tracing::debug!(feature = %feature.identifier, parent = %parent, "unconfigure refused");
                    self.emit_site(SiteEvent::UnconfigureRefused {
                        site: self.site.url().to_string(),
                        feature: feature.identifier.to_string(),
                        parent: parent.to_string(),
                    });
                    return Ok(false);
                }
            }

            if let Some(handler) = &self.handler {
                handler.unconfigure(&feature).await?;
            }
            if self.policy.mark_unconfigured(reference) {
                self.announce_unconfigured(reference);
            }

            if cascade_patches {
                let patches: Vec<(FeatureReference, Arc<Feature>)> = self
                    .configured_features()
                    .await
                    .into_iter()
                    .filter(|(_, candidate)| candidate.patches(&feature.identifier))
                    .collect();
                for (patch_ref, patch) in patches {
                    self.unconfigure_with(&patch_ref, true, false).await?;
                    self.emit_site(SiteEvent::PatchUnconfigured {
                        site: self.site.url().to_string(),
                        patch: patch.identifier.to_string(),
                        target: feature.identifier.to_string(),
                    });
                }
            }

            for decl in &feature.included {
                let children: Vec<FeatureReference> = self
                    .site
                    .find_features(&decl.identifier, decl.match_rule)
                    .await
                    .into_iter()
                    .filter(|c| self.policy.is_configured(c))
                    .collect();
                for child in children {
                    if let Err(e) = self.unconfigure_with(&child, cascade_patches, false).await {
                        tracing::warn!(feature = %feature.identifier, child = %child, error = %e, "child not unconfigured");
                    }
                }
            }
            Ok(true)
        })
    }

    /// Set the configured set to the valid configured features of `old`.
    ///
    /// Features in `ever_configured` (manifest URLs configured anywhere in
    /// history) or configured now, but absent from the result, end up
    /// unconfigured.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Interrupted` when `handler` aborts on an invalid
    /// feature, the provider error when plugins cannot be listed, or an
    /// install handler failure.
    pub async fn revert_to(
        &mut self,
        old: &ConfiguredSite,
        ever_configured: &[String],
        environment: &Environment,
        handler: &dyn ProblemHandler,
    ) -> Result<(), Error> {
        let installed: HashSet<VersionedIdentifier> =
            self.site.installed_plugins().await?.into_iter().collect();

        let mut wanted = Vec::new();
        for old_ref in old.policy.configured() {
            let reference = self.site.reference_for(old_ref.url());
            if let Err(reason) = validate(&reference, &installed, environment).await {
                let feature = reference.to_string();
                self.emit_state(StateEvent::RevertProblem {
                    site: self.site.url().to_string(),
                    feature: feature.clone(),
                    reason: reason.clone(),
                });
                match handler.report(&feature, &reason) {
                    ProblemResponse::Continue => continue,
                    ProblemResponse::Abort => {
                        return Err(StateError::Interrupted { feature, reason }.into())
                    }
                }
            }
            wanted.push(reference);
        }

        let mut stale: Vec<FeatureReference> = self.policy.configured().to_vec();
        stale.extend(
            ever_configured
                .iter()
                .map(|url| self.site.reference_for(url))
                .filter(|r| self.site.contains(r) || self.policy.contains(r)),
        );
        for reference in stale.iter().filter(|r| !wanted.contains(r)) {
            if self.policy.is_configured(reference) {
                self.run_hook(reference, false).await?;
            }
            if self.policy.mark_unconfigured(reference) {
                self.announce_unconfigured(reference);
            }
        }
        for old_ref in old.policy.unconfigured() {
            let reference = self.site.reference_for(old_ref.url());
            if self.site.contains(&reference) && !wanted.contains(&reference) {
                self.policy.track(&reference);
            }
        }
        for reference in &wanted {
            if !self.policy.is_configured(reference) {
                self.run_hook(reference, true).await?;
            }
            if self.policy.mark_configured(reference) {
                self.announce_configured(reference);
            }
        }
        Ok(())
    }

    /// Install handler hook for a state change made without the recursive
    /// configure/unconfigure walk; unresolvable features have nothing to hook
    async fn run_hook(&self, reference: &FeatureReference, configure: bool) -> Result<(), Error> {
        let Some(handler) = &self.handler else {
            return Ok(());
        };
        match reference.resolve().await {
            Ok(feature) if configure => handler.configure(&feature).await,
            Ok(feature) => handler.unconfigure(&feature).await,
            Err(e) => {
                tracing::debug!(reference = %reference, error = %e, "no hook for unresolvable feature");
                Ok(())
            }
        }
    }

    /// A configured feature (other than `reference`) that includes `feature`
    /// as a mandatory child
    async fn configured_parent(
        &self,
        feature: &Feature,
        reference: &FeatureReference,
    ) -> Option<VersionedIdentifier> {
        for (candidate, parent) in self.configured_features().await {
            if candidate == *reference {
                continue;
            }
            let includes = parent.included.iter().any(|decl| {
                !decl.optional && decl.match_rule.matches(&feature.identifier, &decl.identifier)
            });
            if includes {
                return Some(parent.identifier.clone());
            }
        }
        None
    }

    fn announce_configured(&self, reference: &FeatureReference) {
        self.emit_site(SiteEvent::FeatureConfigured {
            site: self.site.url().to_string(),
            feature: reference.to_string(),
        });
        self.notify("feature_configured", reference, |l, s, r| {
            l.feature_configured(s, r);
        });
    }

    fn announce_unconfigured(&self, reference: &FeatureReference) {
        self.emit_site(SiteEvent::FeatureUnconfigured {
            site: self.site.url().to_string(),
            feature: reference.to_string(),
        });
        self.notify("feature_unconfigured", reference, |l, s, r| {
            l.feature_unconfigured(s, r);
        });
    }

    fn notify(
        &self,
        callback: &'static str,
        reference: &FeatureReference,
        call: impl Fn(&dyn ConfiguredSiteListener, &SiteUrl, &FeatureReference),
    ) {
        for listener in &self.listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                call(listener.as_ref(), self.site.url(), reference);
            }));
            if outcome.is_err() {
                tracing::warn!(site = %self.site.url(), callback, "listener panicked");
                self.emit_site(SiteEvent::ListenerFailed {
                    site: self.site.url().to_string(),
                    callback: callback.to_string(),
                });
            }
        }
    }
}

impl EventEmitter for ConfiguredSite {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

async fn compute_updatable(site: &Site, managed_roots: &[PathBuf]) -> bool {
    let Some(root) = site.root() else {
        return false;
    };
    if let Some(outer) = managed_roots
        .iter()
        .find(|other| other.as_path() != root && root.starts_with(other))
    {
        tracing::debug!(site = %site.url(), outer = %outer.display(), "nested site is not updatable");
        return false;
    }
    site.probe_writable().await
}

/// Why a configured feature cannot be restored, if it cannot
async fn validate(
    reference: &FeatureReference,
    installed: &HashSet<VersionedIdentifier>,
    environment: &Environment,
) -> Result<(), String> {
    let feature = reference
        .resolve()
        .await
        .map_err(|e| format!("manifest unavailable: {e}"))?;
    if let Some(missing) = feature
        .plugins_for(environment)
        .find(|p| !installed.contains(&p.identifier))
    {
        return Err(format!("plugin {} missing", missing.identifier));
    }
    Ok(())
}
