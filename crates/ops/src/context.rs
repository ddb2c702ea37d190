//! Operations context for dependency injection

use fman_config::Config;
use fman_configure::{ContinueOnProblem, ProblemHandler};
use fman_errors::{Error, OpsError, SiteError};
use fman_events::{EventEmitter, EventSender};
use fman_install::{DigestVerifier, InstallContext, PolicyListener};
use fman_site::{FeatureReference, Site, SiteRegistry};
use fman_state::LocalSite;
use fman_types::{Activity, ActivityAction, SiteUrl, VersionedIdentifier};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Operations context providing access to all system components
pub struct OpsCtx {
    /// Configuration history; the lock serializes configuration changes
    pub local: Mutex<LocalSite>,
    /// Opened sites
    pub registry: SiteRegistry,
    /// Template for every install transaction
    pub install: InstallContext,
    /// Decides on invalid features during revert
    pub problem_handler: Arc<dyn ProblemHandler>,
    /// Event sender for progress reporting
    pub tx: EventSender,
    /// System configuration
    pub config: Config,
}

impl OpsCtx {
    /// Canonical URL for a site given as a URL or a local path
    ///
    /// # Errors
    ///
    /// Returns `SiteError::NotFound` when a local path does not exist.
    pub async fn site_url(&self, spec: &str) -> Result<SiteUrl, Error> {
        if spec.contains("://") {
            return Ok(SiteUrl::new(spec));
        }
        let path = tokio::fs::canonicalize(spec)
            .await
            .map_err(|_| SiteError::NotFound {
                url: spec.to_string(),
            })?;
        Ok(SiteUrl::from_path(&path))
    }

    /// The configured site named by `spec`, or the only configured site when
    /// `spec` is absent
    ///
    /// # Errors
    ///
    /// Returns `OpsError::InvalidRequest` when no site is given and the
    /// current configuration does not have exactly one.
    pub async fn target_site(
        &self,
        local: &LocalSite,
        spec: Option<&str>,
    ) -> Result<SiteUrl, Error> {
        if let Some(spec) = spec {
            return self.site_url(spec).await;
        }
        match local.current()?.sites() {
            [only] => Ok(only.url().clone()),
            [] => Err(OpsError::InvalidRequest {
                message: "no configured site; run `fman site add <path>` first".to_string(),
            }
            .into()),
            _ => Err(OpsError::InvalidRequest {
                message: "several configured sites; pass --site".to_string(),
            }
            .into()),
        }
    }

    /// Find `spec` (`id_version` or a bare id, newest wins) on `site`
    ///
    /// # Errors
    ///
    /// Returns `SiteError::FeatureNotFound` when nothing matches.
    pub async fn find_feature(site: &Site, spec: &str) -> Result<FeatureReference, Error> {
        if let Ok(identifier) = spec.parse::<VersionedIdentifier>() {
            if let Some(reference) = site.reference_by_identifier(&identifier).await {
                return Ok(reference);
            }
        }

        let mut best: Option<(VersionedIdentifier, FeatureReference)> = None;
        for reference in site.feature_references() {
            let Ok(identifier) = reference.identifier().await else {
                continue;
            };
            if identifier.id == spec && best.as_ref().is_none_or(|(b, _)| identifier > *b) {
                best = Some((identifier, reference));
            }
        }
        best.map(|(_, reference)| reference).ok_or_else(|| {
            SiteError::FeatureNotFound {
                site: site.url().to_string(),
                feature: spec.to_string(),
            }
            .into()
        })
    }
}

/// Append one activity for `result` to the current configuration and, on
/// success, store the live change stamp. A persistence failure replaces a
/// successful result.
pub(crate) async fn record<T>(
    local: &mut LocalSite,
    action: ActivityAction,
    label: &str,
    result: Result<T, Error>,
) -> Result<T, Error> {
    let activity = Activity::from_result(action, label, &result);
    let recorded = local.record_activity(activity).await;
    match result {
        Ok(value) => {
            recorded?;
            local.sync_stamp().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(persist) = recorded {
                tracing::warn!(action = %action, error = %persist, "activity not recorded");
            }
            Err(e)
        }
    }
}

impl EventEmitter for OpsCtx {
    fn event_sender(&self) -> Option<&EventSender> {
        Some(&self.tx)
    }
}

/// Builder for operations context
pub struct OpsContextBuilder {
    local: Option<LocalSite>,
    registry: Option<SiteRegistry>,
    install: Option<InstallContext>,
    problem_handler: Option<Arc<dyn ProblemHandler>>,
    tx: Option<EventSender>,
    config: Option<Config>,
}

impl OpsContextBuilder {
    /// Create new context builder
    #[must_use]
    pub fn new() -> Self {
        Self {
            local: None,
            registry: None,
            install: None,
            problem_handler: None,
            tx: None,
            config: None,
        }
    }

    #[must_use]
    pub fn with_local_site(mut self, local: LocalSite) -> Self {
        self.local = Some(local);
        self
    }

    #[must_use]
    pub fn with_registry(mut self, registry: SiteRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    #[must_use]
    pub fn with_install_context(mut self, install: InstallContext) -> Self {
        self.install = Some(install);
        self
    }

    #[must_use]
    pub fn with_problem_handler(mut self, handler: Arc<dyn ProblemHandler>) -> Self {
        self.problem_handler = Some(handler);
        self
    }

    /// Set event sender
    #[must_use]
    pub fn with_event_sender(mut self, tx: EventSender) -> Self {
        self.tx = Some(tx);
        self
    }

    /// Set configuration
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the context. The install context defaults to one derived from
    /// the configuration and the problem handler to continuing.
    ///
    /// # Errors
    ///
    /// Returns an error if the local site, event sender or config is missing.
    pub fn build(self) -> Result<OpsCtx, Error> {
        let local = self.local.ok_or_else(|| OpsError::MissingComponent {
            component: "local_site".to_string(),
        })?;
        let tx = self.tx.ok_or_else(|| OpsError::MissingComponent {
            component: "event_sender".to_string(),
        })?;
        let config = self.config.ok_or_else(|| OpsError::MissingComponent {
            component: "config".to_string(),
        })?;

        let registry = self
            .registry
            .unwrap_or_else(|| local.registry().clone());
        let install = self.install.unwrap_or_else(|| {
            InstallContext::new()
                .with_verifier(Arc::new(DigestVerifier::new(config.install.require_digests)))
                .with_listener(Arc::new(PolicyListener::new(config.install.accept_unsigned)))
                .with_parallel_fetches(config.install.parallel_fetches)
                .with_environment(config.environment())
        });
        let install = install.with_event_sender(tx.clone());
        let local = local.with_install_handler(Arc::clone(&install.handler));

        Ok(OpsCtx {
            local: Mutex::new(local),
            registry,
            install,
            problem_handler: self
                .problem_handler
                .unwrap_or_else(|| Arc::new(ContinueOnProblem)),
            tx,
            config,
        })
    }
}

impl Default for OpsContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
