//! Configuration, history and query operations

use crate::context::record;
use crate::large_ops::finish;
use crate::{ConfigurationInfo, ConfigureReport, FeatureInfo, OpsCtx, SiteInfo};
use fman_configure::ConfiguredSite;
use fman_errors::Error;
use fman_events::{EventEmitter, SiteEvent};
use fman_state::{feature_status as evaluate_status, InstallConfiguration, LocalSite, ReconcileReport};
use fman_types::{format_version, Activity, ActivityAction, ActivityStatus, StatusReport};
use std::sync::Arc;

/// Configure a feature (children first) on a configured site
///
/// # Errors
///
/// Returns an error if the feature is not found, a mandatory child cannot be
/// configured, or the new configuration cannot be persisted.
pub async fn configure(
    ctx: &OpsCtx,
    site: Option<&str>,
    feature: &str,
) -> Result<ConfigureReport, Error> {
    let label = format!("configure {feature}");
    ctx.emit_operation_started(&label);

    let mut local = ctx.local.lock().await;
    let result = configure_in(ctx, &mut local, site, feature).await;
    let result = record(&mut local, ActivityAction::Configure, &label, result).await;
    finish(ctx, &label, result)
}

async fn configure_in(
    ctx: &OpsCtx,
    local: &mut LocalSite,
    site: Option<&str>,
    feature: &str,
) -> Result<ConfigureReport, Error> {
    let url = ctx.target_site(local, site).await?;
    let mut next = local.clone_current(format!("configure {feature}"))?;
    let configured = next.site_mut(&url)?;
    let live = Arc::clone(configured.site());
    let reference = OpsCtx::find_feature(&live, feature).await?;

    let mut report = ConfigureReport {
        feature: reference.to_string(),
        site: url.to_string(),
        changed: false,
        refused: false,
        configuration: None,
    };
    if configured.is_configured(&reference) {
        return Ok(report);
    }
    configured.configure(&reference).await?;

    report.changed = true;
    report.configuration = Some(next.id().to_string());
    local.add_configuration(next).await?;
    Ok(report)
}

/// Unconfigure a feature. A refusal because a configured feature still
/// includes it is reported through `refused` and recorded as a failed
/// activity.
///
/// # Errors
///
/// Returns an error if the feature is not found, the install handler fails,
/// or the new configuration cannot be persisted.
pub async fn unconfigure(
    ctx: &OpsCtx,
    site: Option<&str>,
    feature: &str,
) -> Result<ConfigureReport, Error> {
    let label = format!("unconfigure {feature}");
    ctx.emit_operation_started(&label);

    let mut local = ctx.local.lock().await;
    let result = unconfigure_in(ctx, &mut local, site, feature).await;
    if matches!(&result, Ok(report) if report.refused) {
        local
            .record_activity(Activity::new(
                ActivityAction::Unconfigure,
                &label,
                ActivityStatus::Nok,
            ))
            .await?;
        ctx.emit_operation_completed(&label, false);
        return result;
    }
    let result = record(&mut local, ActivityAction::Unconfigure, &label, result).await;
    finish(ctx, &label, result)
}

async fn unconfigure_in(
    ctx: &OpsCtx,
    local: &mut LocalSite,
    site: Option<&str>,
    feature: &str,
) -> Result<ConfigureReport, Error> {
    let url = ctx.target_site(local, site).await?;
    let mut next = local.clone_current(format!("unconfigure {feature}"))?;
    let configured = next.site_mut(&url)?;
    let live = Arc::clone(configured.site());
    let reference = OpsCtx::find_feature(&live, feature).await?;

    let mut report = ConfigureReport {
        feature: reference.to_string(),
        site: url.to_string(),
        changed: false,
        refused: false,
        configuration: None,
    };
    if !configured.is_configured(&reference) {
        return Ok(report);
    }
    if !configured.unconfigure(&reference).await? {
        report.refused = true;
        return Ok(report);
    }

    report.changed = true;
    report.configuration = Some(next.id().to_string());
    local.add_configuration(next).await?;
    Ok(report)
}

/// Add a local directory as a configured site. Features already on it are
/// configured when optimistic reconciliation is enabled.
///
/// # Errors
///
/// Returns an error if the directory cannot be opened, is already
/// configured, or the configuration cannot be persisted.
pub async fn add_site(ctx: &OpsCtx, path: &str) -> Result<SiteInfo, Error> {
    let label = format!("site add {path}");
    ctx.emit_operation_started(&label);

    let mut local = ctx.local.lock().await;
    let result = add_site_in(ctx, &mut local, path).await;
    let result = record(&mut local, ActivityAction::SiteInstall, &label, result).await;
    finish(ctx, &label, result)
}

async fn add_site_in(ctx: &OpsCtx, local: &mut LocalSite, path: &str) -> Result<SiteInfo, Error> {
    let site = ctx
        .registry
        .open_directory(std::path::Path::new(path))
        .await?;
    let mut configured = ConfiguredSite::open(site, &ctx.registry.roots())
        .await
        .with_event_sender(ctx.tx.clone())
        .with_handler(Arc::clone(&ctx.install.handler));
    configured.adopt_features(ctx.config.history.optimistic_reconciliation);

    let info = site_info(&configured);
    let mut next = local.clone_current(format!("add site {}", configured.url()))?;
    next.add_site(configured)?;
    local.add_configuration(next).await?;
    ctx.emit_site(SiteEvent::SiteAdded {
        site: info.url.clone(),
    });
    Ok(info)
}

/// Drop a configured site from the configuration; its features end up
/// unconfigured
///
/// # Errors
///
/// Returns an error if the site is not configured or the configuration
/// cannot be persisted.
pub async fn remove_site(ctx: &OpsCtx, site: &str) -> Result<SiteInfo, Error> {
    let label = format!("site remove {site}");
    ctx.emit_operation_started(&label);

    let mut local = ctx.local.lock().await;
    let result = remove_site_in(ctx, &mut local, site).await;
    let result = record(&mut local, ActivityAction::SiteRemove, &label, result).await;
    finish(ctx, &label, result)
}

async fn remove_site_in(ctx: &OpsCtx, local: &mut LocalSite, site: &str) -> Result<SiteInfo, Error> {
    let url = ctx.site_url(site).await?;
    let mut next = local.clone_current(format!("remove site {url}"))?;
    let mut removed = next.remove_site(&url)?;
    removed.unconfigure_all().await?;
    local.add_configuration(next).await?;
    ctx.emit_site(SiteEvent::SiteRemoved {
        site: url.to_string(),
    });
    Ok(site_info(&removed))
}

/// Enable or disable a configured site
///
/// # Errors
///
/// Returns an error if the site is not configured or the configuration
/// cannot be persisted.
pub async fn set_site_enabled(ctx: &OpsCtx, site: &str, enabled: bool) -> Result<SiteInfo, Error> {
    let url = ctx.site_url(site).await?;
    let mut local = ctx.local.lock().await;
    let verb = if enabled { "enable" } else { "disable" };
    let mut next = local.clone_current(format!("{verb} site {url}"))?;
    let configured = next.site_mut(&url)?;
    configured.set_enabled(enabled);
    let info = site_info(configured);
    local.add_configuration(next).await?;
    Ok(info)
}

fn site_info(site: &ConfiguredSite) -> SiteInfo {
    SiteInfo {
        url: site.url().to_string(),
        enabled: site.is_enabled(),
        updatable: site.is_updatable(),
        configured: site.policy().configured().len(),
        unconfigured: site.policy().unconfigured().len(),
    }
}

/// Configured sites of the current configuration
///
/// # Errors
///
/// Returns an error if the history is not initialized.
pub async fn list_sites(ctx: &OpsCtx) -> Result<Vec<SiteInfo>, Error> {
    let local = ctx.local.lock().await;
    Ok(local.current()?.sites().iter().map(site_info).collect())
}

/// Every feature on the configured sites (or on `site`) with its status
///
/// # Errors
///
/// Returns an error if `site` cannot be resolved or the history is not
/// initialized.
pub async fn list_features(ctx: &OpsCtx, site: Option<&str>) -> Result<Vec<FeatureInfo>, Error> {
    let filter = match site {
        Some(spec) => Some(ctx.site_url(spec).await?),
        None => None,
    };
    let local = ctx.local.lock().await;
    let current = local.current()?;

    let mut features = Vec::new();
    for configured in current.sites() {
        if filter.as_ref().is_some_and(|url| url != configured.url()) {
            continue;
        }
        for (reference, feature) in configured.site().resolved_features().await {
            let status = evaluate_status(current, &reference, local.environment()).await?;
            features.push(FeatureInfo {
                site: configured.url().to_string(),
                id: feature.identifier.id.clone(),
                version: format_version(&feature.identifier.version),
                label: feature.label.clone(),
                configured: configured.is_configured(&reference),
                status: status.status,
            });
        }
    }
    features.sort_by(|a, b| (&a.site, &a.id, &a.version).cmp(&(&b.site, &b.id, &b.version)));
    Ok(features)
}

/// Health of one feature in the current configuration
///
/// # Errors
///
/// Returns an error if the site or feature cannot be found.
pub async fn feature_status(
    ctx: &OpsCtx,
    site: Option<&str>,
    feature: &str,
) -> Result<StatusReport, Error> {
    let local = ctx.local.lock().await;
    let url = ctx.target_site(&local, site).await?;
    let live = ctx.registry.resolve(&url).await?;
    let reference = OpsCtx::find_feature(&live, feature).await?;
    evaluate_status(local.current()?, &reference, local.environment()).await
}

fn configuration_info(configuration: &InstallConfiguration, preserved: bool) -> ConfigurationInfo {
    ConfigurationInfo {
        id: configuration.id().to_string(),
        label: configuration.label().to_string(),
        created: configuration.created(),
        current: configuration.is_current(),
        preserved,
        sites: configuration.sites().len(),
        activities: configuration.activities().to_vec(),
    }
}

/// History (oldest first) followed by preserved configurations
pub async fn history(ctx: &OpsCtx) -> Vec<ConfigurationInfo> {
    let local = ctx.local.lock().await;
    local
        .history()
        .iter()
        .map(|c| configuration_info(c, false))
        .chain(local.preserved().iter().map(|c| configuration_info(c, true)))
        .collect()
}

/// Keep a copy of a history configuration outside the history cap
///
/// # Errors
///
/// Returns an error if the configuration is unknown or cannot be copied.
pub async fn preserve(ctx: &OpsCtx, id: &str) -> Result<ConfigurationInfo, Error> {
    let label = format!("preserve {id}");
    ctx.emit_operation_started(&label);

    let mut local = ctx.local.lock().await;
    let result = match local.preserve(id).await {
        Ok(preserved) => local
            .find(&preserved)
            .map(|c| configuration_info(c, true))
            .ok_or_else(|| Error::internal(format!("preserved configuration {preserved} missing"))),
        Err(e) => Err(e),
    };
    let result = record(&mut local, ActivityAction::AddPreserved, &label, result).await;
    finish(ctx, &label, result)
}

/// # Errors
///
/// Returns an error if the preserved configuration is unknown.
pub async fn remove_preserved(ctx: &OpsCtx, id: &str) -> Result<(), Error> {
    let mut local = ctx.local.lock().await;
    local.remove_preserved(id).await
}

/// Reconcile the history with the live sites, using the configured mode
///
/// # Errors
///
/// Returns a persistence error.
pub async fn reconcile(ctx: &OpsCtx) -> Result<ReconcileReport, Error> {
    let mut local = ctx.local.lock().await;
    local
        .reconcile(ctx.config.history.optimistic_reconciliation)
        .await
}

/// Write the history index
///
/// # Errors
///
/// Returns a persistence error.
pub async fn save(ctx: &OpsCtx) -> Result<(), Error> {
    ctx.local.lock().await.save().await
}
