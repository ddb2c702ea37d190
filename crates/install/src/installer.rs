//! Install and remove transactions

use fman_errors::{Error, InstallError};
use fman_events::{EventEmitter, FailureContext, InstallEvent};
use fman_site::{ContentConsumer, ContentProvider, ContentRef, FeatureReference, Site};
use fman_types::{DataEntry, Feature, IncludedFeatureRef, PluginEntry, VersionedIdentifier};
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::context::InstallContext;
use crate::verification::VerificationResponse;

// Work units per phase
const FEATURE_UNITS: u64 = 2;
const PLUGIN_UNITS: u64 = 2;
const DATA_UNITS: u64 = 1;
const COMMIT_UNITS: u64 = 1;
const CHILD_UNITS: u64 = 5;

/// Site receiving installed content
#[derive(Debug, Clone)]
pub struct InstallTarget {
    pub site: Arc<Site>,
    /// Computed by the configuration layer; installs into a site that is
    /// not updatable are rejected up front
    pub updatable: bool,
}

impl InstallTarget {
    #[must_use]
    pub fn new(site: Arc<Site>, updatable: bool) -> Self {
        Self { site, updatable }
    }

    fn ensure_updatable(&self) -> Result<(), Error> {
        if self.updatable {
            Ok(())
        } else {
            Err(InstallError::SiteNotWritable {
                site: self.site.url().to_string(),
            }
            .into())
        }
    }
}

/// Outcome of a remove transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemoveResult {
    pub plugins_removed: usize,
}

type Fetched = Vec<(PluginEntry, Vec<ContentRef>)>;

/// Runs install and remove transactions against a target site
#[derive(Debug, Clone)]
pub struct Installer {
    ctx: InstallContext,
}

impl Installer {
    #[must_use]
    pub fn new(ctx: InstallContext) -> Self {
        Self { ctx }
    }

    #[must_use]
    pub fn context(&self) -> &InstallContext {
        &self.ctx
    }

    /// Install `source` from `source_site` into `target`, including its
    /// children. Returns the reference of the feature on the target site.
    ///
    /// Nothing of this feature is visible on the target unless the whole
    /// transaction commits. Children commit independently, before their
    /// parent.
    ///
    /// # Errors
    ///
    /// Returns `InstallError::SiteNotWritable` for a target that is not
    /// updatable, `InstallError::Aborted` on cancellation, and the highest
    /// priority failure of the transaction otherwise.
    pub async fn install(
        &self,
        source_site: &Arc<Site>,
        source: &FeatureReference,
        target: &InstallTarget,
    ) -> Result<FeatureReference, Error> {
        let ctx = self.ctx.for_transaction();
        self.install_with(&ctx, source_site, source, target).await
    }

    fn install_with<'a>(
        &'a self,
        ctx: &'a InstallContext,
        source_site: &'a Arc<Site>,
        source: &'a FeatureReference,
        target: &'a InstallTarget,
    ) -> BoxFuture<'a, Result<FeatureReference, Error>> {
        Box::pin(async move {
            target.ensure_updatable()?;
            ctx.progress.check_cancelled()?;

            let feature = source.resolve().await.map_err(|e| {
                tracing::debug!(reference = %source, error = %e, "feature manifest unreadable");
                InstallError::ManifestMissing {
                    url: source.to_string(),
                }
            })?;

            let result = self
                .run(ctx, source_site, source, &feature, target)
                .await;
            ctx.handler.completed(&feature, result.is_ok()).await;

            if let Err(e) = &result {
                tracing::warn!(feature = %feature.identifier, error = %e, "install rolled back");
                ctx.emit_install(InstallEvent::RolledBack {
                    feature: feature.identifier.to_string(),
                    failure: FailureContext::from_error(e),
                });
            }
            ctx.progress.done();
            result
        })
    }

    async fn run(
        &self,
        ctx: &InstallContext,
        source_site: &Arc<Site>,
        source: &FeatureReference,
        feature: &Arc<Feature>,
        target: &InstallTarget,
    ) -> Result<FeatureReference, Error> {
        ctx.handler.installation_started(feature).await?;
        let provider = source.provider();

        let present: HashSet<VersionedIdentifier> =
            target.site.installed_plugins().await?.into_iter().collect();
        let plugins: Vec<PluginEntry> = feature
            .plugins_for(&ctx.environment)
            .filter(|p| !present.contains(&p.identifier))
            .cloned()
            .collect();
        let data: Vec<DataEntry> = feature.data_for(&ctx.environment).cloned().collect();
        let children = self.resolve_children(ctx, source_site, feature).await?;

        let total = FEATURE_UNITS
            + PLUGIN_UNITS * plugins.len() as u64
            + DATA_UNITS * data.len() as u64
            + COMMIT_UNITS
            + CHILD_UNITS * children.len() as u64;
        ctx.progress
            .begin(format!("install {}", feature.identifier), total);
        ctx.emit_install(InstallEvent::Started {
            feature: feature.identifier.to_string(),
            site: target.site.url().to_string(),
            plugins: plugins.len(),
            children: children.len(),
            total_units: total,
        });

        let feature_refs = provider
            .feature_archive_refs(feature, &ctx.progress)
            .await?;
        for content in &feature_refs {
            verify_content(ctx, feature, content, true).await?;
        }
        ctx.progress.worked(FEATURE_UNITS);
        ctx.emit_install(InstallEvent::FeatureVerified {
            feature: feature.identifier.to_string(),
        });

        let fetched = fetch_plugins(ctx, provider, feature, plugins).await?;
        let fetched_entries: Vec<PluginEntry> = fetched.iter().map(|(p, _)| p.clone()).collect();
        ctx.handler
            .plugins_downloaded(feature, &fetched_entries)
            .await?;

        for entry in &data {
            ctx.progress.check_cancelled()?;
            let outcome = match provider
                .data_archive_refs(feature, entry, &ctx.progress)
                .await
            {
                Ok(refs) => {
                    ctx.handler
                        .non_plugin_data_downloaded(feature, entry, refs)
                        .await
                }
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                if e.is_aborted() {
                    return Err(e);
                }
                tracing::warn!(feature = %feature.identifier, entry = %entry.id, error = %e, "data entry skipped");
                ctx.emit_install(InstallEvent::DataEntryFailed {
                    feature: feature.identifier.to_string(),
                    entry: entry.id.clone(),
                    reason: e.to_string(),
                });
            }
            ctx.progress.worked(DATA_UNITS);
        }

        for (decl, child) in &children {
            let child_ctx = ctx.child(CHILD_UNITS);
            match self
                .install_with(&child_ctx, source_site, child, target)
                .await
            {
                Ok(_) => {}
                Err(e) if e.is_aborted() => return Err(e),
                Err(e) if decl.optional => {
                    tracing::warn!(feature = %feature.identifier, child = %decl.identifier, error = %e, "optional child skipped");
                    ctx.emit_install(InstallEvent::ChildSkipped {
                        feature: feature.identifier.to_string(),
                        child: decl.identifier.to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    return Err(InstallError::RequiredChildFailed {
                        parent: feature.identifier.to_string(),
                        child: decl.identifier.to_string(),
                        message: e.to_string(),
                    }
                    .into())
                }
            }
        }

        self.commit(ctx, feature, &feature_refs, &fetched, target)
            .await
    }

    /// Locate included features on the source site, dropping optional ones
    /// that are missing or not selected
    async fn resolve_children(
        &self,
        ctx: &InstallContext,
        source_site: &Site,
        feature: &Feature,
    ) -> Result<Vec<(IncludedFeatureRef, FeatureReference)>, Error> {
        let mut children = Vec::with_capacity(feature.included.len());
        for decl in &feature.included {
            let key = decl.identifier.to_string();
            if decl.optional && !(ctx.selects(&key) || ctx.selects(&decl.identifier.id)) {
                tracing::debug!(feature = %feature.identifier, child = %key, "optional child not selected");
                continue;
            }
            let found = source_site
                .find_features(&decl.identifier, decl.match_rule)
                .await
                .into_iter()
                .next();
            match found {
                Some(reference) => children.push((decl.clone(), reference)),
                None if decl.optional => {
                    ctx.emit_install(InstallEvent::ChildSkipped {
                        feature: feature.identifier.to_string(),
                        child: key,
                        reason: format!("not found on {}", source_site.url()),
                    });
                }
                None => {
                    return Err(InstallError::RequiredChildFailed {
                        parent: feature.identifier.to_string(),
                        child: key,
                        message: format!("not found on {}", source_site.url()),
                    }
                    .into())
                }
            }
        }
        Ok(children)
    }

    async fn commit(
        &self,
        ctx: &InstallContext,
        feature: &Feature,
        feature_refs: &[ContentRef],
        fetched: &Fetched,
        target: &InstallTarget,
    ) -> Result<FeatureReference, Error> {
        let owner = feature.identifier.to_string();
        let mut consumer = target.site.provider().open_consumer(feature).await?;
        let mut claimed = Vec::new();

        let staged = stage(ctx, feature, feature_refs, fetched, target, consumer.as_mut(), &mut claimed).await;
        let outcome = match staged.and_then(|()| ctx.progress.check_cancelled().map_err(Error::from)) {
            Ok(()) => consumer.commit().await.map_err(|e| {
                Error::from(InstallError::CommitFailed {
                    message: e.to_string(),
                })
            }),
            Err(e) => {
                if let Err(abort_error) = consumer.abort().await {
                    tracing::warn!(feature = %feature.identifier, error = %abort_error, "staging cleanup failed");
                }
                Err(e)
            }
        };

        match outcome {
            Ok(url) => {
                ctx.progress.worked(COMMIT_UNITS);
                let reference = target.site.add_feature_reference(&url);
                ctx.emit_install(InstallEvent::Committed {
                    feature: owner,
                    site: target.site.url().to_string(),
                });
                Ok(reference)
            }
            Err(e) => {
                for plugin in &claimed {
                    ctx.registry.unregister(target.site.url(), plugin, &owner);
                }
                Err(e)
            }
        }
    }

    /// Remove `reference` from `target`, along with every plugin no other
    /// feature on the site still declares
    ///
    /// # Errors
    ///
    /// Returns `InstallError::SiteNotWritable` for a target that is not
    /// updatable, or the provider error if content cannot be deleted.
    pub async fn remove(
        &self,
        reference: &FeatureReference,
        target: &InstallTarget,
    ) -> Result<RemoveResult, Error> {
        target.ensure_updatable()?;
        let ctx = &self.ctx.for_transaction();
        let site = &target.site;
        let provider = site.provider();
        let mut result = RemoveResult::default();

        match reference.resolve().await {
            Ok(feature) => {
                ctx.progress.begin(
                    format!("remove {}", feature.identifier),
                    feature.plugin_entries.len() as u64 + 1,
                );
                let present: HashSet<VersionedIdentifier> =
                    site.installed_plugins().await?.into_iter().collect();
                for plugin in &feature.plugin_entries {
                    ctx.progress.check_cancelled()?;
                    if present.contains(&plugin.identifier)
                        && site.plugin_usage_count(&plugin.identifier).await <= 1
                    {
                        provider.remove_plugin(&plugin.identifier).await?;
                        ctx.registry.forget(site.url(), &plugin.identifier);
                        result.plugins_removed += 1;
                    }
                    ctx.progress.worked(1);
                }
            }
            Err(e) => {
                tracing::warn!(reference = %reference, error = %e, "removing feature with unreadable manifest");
            }
        }

        provider.remove_feature(reference.url()).await?;
        site.remove_feature_reference(reference);
        ctx.progress.done();
        ctx.emit_install(InstallEvent::Removed {
            feature: reference
                .identifier_hint()
                .map_or_else(|| reference.url().to_string(), ToString::to_string),
            site: site.url().to_string(),
            plugins_removed: result.plugins_removed,
        });
        Ok(result)
    }
}

async fn stage(
    ctx: &InstallContext,
    feature: &Feature,
    feature_refs: &[ContentRef],
    fetched: &Fetched,
    target: &InstallTarget,
    consumer: &mut dyn ContentConsumer,
    claimed: &mut Vec<VersionedIdentifier>,
) -> Result<(), Error> {
    let owner = feature.identifier.to_string();
    for (plugin, refs) in fetched {
        ctx.progress.check_cancelled()?;
        if !ctx
            .registry
            .try_register(target.site.url(), &plugin.identifier, &owner)
        {
            ctx.emit_install(InstallEvent::PluginShared {
                feature: owner.clone(),
                plugin: plugin.identifier.to_string(),
            });
            continue;
        }
        claimed.push(plugin.identifier.clone());
        for content in refs {
            consumer.store_plugin(plugin, content).await?;
        }
    }

    if target.site.has_feature(&feature.identifier).await {
        ctx.emit_install(InstallEvent::AlreadyInstalled {
            feature: owner,
            site: target.site.url().to_string(),
        });
    } else {
        for content in feature_refs {
            consumer.store_feature(content).await?;
        }
    }

    ctx.handler
        .complete_install(feature, consumer)
        .await
        .map_err(|e| {
            if e.is_aborted() {
                e
            } else {
                InstallError::HandlerFailed {
                    message: e.to_string(),
                }
                .into()
            }
        })
}

/// Fetch and verify plugin archives with bounded parallelism.
///
/// An abort from any worker cancels the shared token so its siblings stop
/// at their next I/O boundary. Other failures drop the plugin from the batch
/// and only fail the batch when no plugin survives.
async fn fetch_plugins(
    ctx: &InstallContext,
    provider: &Arc<dyn ContentProvider>,
    feature: &Arc<Feature>,
    plugins: Vec<PluginEntry>,
) -> Result<Fetched, Error> {
    if plugins.is_empty() {
        return Ok(Vec::new());
    }

    let permits = Arc::new(Semaphore::new(ctx.parallel_fetches.max(1)));
    let mut tasks = JoinSet::new();
    for plugin in plugins {
        let permits = Arc::clone(&permits);
        let provider = Arc::clone(provider);
        let feature = Arc::clone(feature);
        let ctx = ctx.clone();
        tasks.spawn(async move {
            let outcome = tokio::select! {
                permit = permits.acquire_owned() => match permit {
                    Ok(_permit) => fetch_plugin(&ctx, provider.as_ref(), &feature, &plugin).await,
                    Err(e) => Err(InstallError::TaskError { message: e.to_string() }.into()),
                },
                () = ctx.progress.cancelled() => Err(InstallError::cancelled().into()),
            };
            (plugin, outcome)
        });
    }

    let mut fetched = Vec::new();
    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((plugin, Ok(refs))) => {
                ctx.emit_install(InstallEvent::PluginFetched {
                    feature: feature.identifier.to_string(),
                    plugin: plugin.identifier.to_string(),
                });
                fetched.push((plugin, refs));
            }
            Ok((plugin, Err(e))) => {
                if e.is_aborted() {
                    ctx.progress.cancel();
                } else {
                    tracing::warn!(feature = %feature.identifier, plugin = %plugin.identifier, error = %e, "plugin dropped from batch");
                    ctx.emit_install(InstallEvent::PluginSkipped {
                        feature: feature.identifier.to_string(),
                        plugin: plugin.identifier.to_string(),
                        reason: e.to_string(),
                    });
                }
                failures.push(e);
            }
            Err(join_error) => failures.push(
                InstallError::TaskError {
                    message: join_error.to_string(),
                }
                .into(),
            ),
        }
    }

    let aborted = failures.iter().any(Error::is_aborted);
    if aborted || (fetched.is_empty() && !failures.is_empty()) {
        return Err(Error::prioritize(failures).unwrap_or_else(|| InstallError::cancelled().into()));
    }
    fetched.sort_by(|a, b| a.0.identifier.cmp(&b.0.identifier));
    Ok(fetched)
}

async fn fetch_plugin(
    ctx: &InstallContext,
    provider: &dyn ContentProvider,
    feature: &Feature,
    plugin: &PluginEntry,
) -> Result<Vec<ContentRef>, Error> {
    ctx.progress.check_cancelled()?;
    let refs = provider
        .plugin_archive_refs(feature, plugin, &ctx.progress)
        .await?;
    ctx.progress.worked(1);
    for content in &refs {
        ctx.progress.check_cancelled()?;
        verify_content(ctx, feature, content, false).await?;
    }
    ctx.progress.worked(1);
    Ok(refs)
}

async fn verify_content(
    ctx: &InstallContext,
    feature: &Feature,
    content: &ContentRef,
    feature_level: bool,
) -> Result<(), Error> {
    let failed = |message: String| -> Error {
        InstallError::VerificationFailed {
            feature: feature.identifier.to_string(),
            reference: content.identifier.clone(),
            message,
        }
        .into()
    };

    let finding = ctx
        .verifier
        .verify(feature, content, feature_level, &ctx.progress)
        .await
        .map_err(|e| if e.is_aborted() { e } else { failed(e.to_string()) })?;
    let Some(finding) = finding else {
        return Ok(());
    };

    match ctx.listener.prompt(&finding) {
        VerificationResponse::Accept => {
            tracing::warn!(feature = %finding.feature, reference = %finding.reference, kind = %finding.kind, "accepted unverified content");
            Ok(())
        }
        VerificationResponse::Abort => Err(InstallError::Aborted {
            reason: format!("{} content declined: {}", finding.kind, finding.reference),
        }
        .into()),
        VerificationResponse::Error => Err(failed(format!("{}: {}", finding.kind, finding.message))),
    }
}
