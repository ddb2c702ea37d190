//! Operations that run install transactions or rewrite the configured sets

use crate::context::record;
use crate::{InstallReport, InstallRequest, OpsCtx, RemoveReport, RevertReport};
use fman_errors::Error;
use fman_events::{EventEmitter, FailureContext};
use fman_install::Installer;
use fman_state::LocalSite;
use fman_types::ActivityAction;
use std::sync::Arc;
use std::time::Instant;

/// Install a feature from a source site into a configured site and
/// configure it there
///
/// # Errors
///
/// Returns an error if:
/// - The source site or feature cannot be found
/// - The target site is not configured
/// - The install transaction fails or a mandatory child cannot be configured
/// - The new configuration cannot be persisted
pub async fn install(ctx: &OpsCtx, request: &InstallRequest) -> Result<InstallReport, Error> {
    let label = format!("install {}", request.feature);
    ctx.emit_operation_started(&label);

    let mut local = ctx.local.lock().await;
    let result = install_into(ctx, &mut local, request).await;
    let result = record(&mut local, ActivityAction::Install, &label, result).await;
    finish(ctx, &label, result)
}

async fn install_into(
    ctx: &OpsCtx,
    local: &mut LocalSite,
    request: &InstallRequest,
) -> Result<InstallReport, Error> {
    let start = Instant::now();
    let source_url = ctx.site_url(&request.source).await?;
    let source_site = ctx.registry.resolve(&source_url).await?;
    let source = OpsCtx::find_feature(&source_site, &request.feature).await?;
    let target_url = ctx.target_site(local, request.target.as_deref()).await?;

    let installer = Installer::new(
        ctx.install
            .clone()
            .with_optional_selection(request.optional.clone()),
    );
    let mut next = local.clone_current(format!("install {}", request.feature))?;
    let site = next.site_mut(&target_url)?;
    let installed = site.install(&installer, &source_site, &source).await?;
    site.configure_with(&installed, true, true, request.optional.as_deref())
        .await?;

    let configuration = next.id().to_string();
    local.add_configuration(next).await?;
    Ok(InstallReport {
        feature: installed.to_string(),
        site: target_url.to_string(),
        configuration,
        duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
    })
}

/// Unconfigure and remove a feature from a configured site
///
/// # Errors
///
/// Returns an error if the feature is not found, a configured parent still
/// includes it, or the remove transaction fails.
pub async fn remove(
    ctx: &OpsCtx,
    site: Option<&str>,
    feature: &str,
) -> Result<RemoveReport, Error> {
    let label = format!("remove {feature}");
    ctx.emit_operation_started(&label);

    let mut local = ctx.local.lock().await;
    let result = remove_from(ctx, &mut local, site, feature).await;
    let result = record(&mut local, ActivityAction::Remove, &label, result).await;
    finish(ctx, &label, result)
}

async fn remove_from(
    ctx: &OpsCtx,
    local: &mut LocalSite,
    site: Option<&str>,
    feature: &str,
) -> Result<RemoveReport, Error> {
    let url = ctx.target_site(local, site).await?;
    let mut next = local.clone_current(format!("remove {feature}"))?;
    let configured = next.site_mut(&url)?;
    let live = Arc::clone(configured.site());
    let reference = OpsCtx::find_feature(&live, feature).await?;

    let installer = Installer::new(ctx.install.clone());
    let removed = configured.remove(&installer, &reference).await?;

    let configuration = next.id().to_string();
    local.add_configuration(next).await?;
    Ok(RemoveReport {
        feature: reference.to_string(),
        site: url.to_string(),
        plugins_removed: removed.plugins_removed,
        configuration,
    })
}

/// Restore the configured sets of a history or preserved configuration
///
/// # Errors
///
/// Returns an error if the configuration is unknown, the problem handler
/// aborts, or the result cannot be persisted.
pub async fn revert(ctx: &OpsCtx, id: &str) -> Result<RevertReport, Error> {
    let label = format!("revert to {id}");
    ctx.emit_operation_started(&label);

    let mut local = ctx.local.lock().await;
    let result = local
        .revert_to(id, ctx.problem_handler.as_ref())
        .await
        .map(|current| RevertReport {
            target: id.to_string(),
            created: current.id().to_string(),
        });
    let result = record(&mut local, ActivityAction::Revert, &label, result).await;
    finish(ctx, &label, result)
}

pub(crate) fn finish<T>(ctx: &OpsCtx, label: &str, result: Result<T, Error>) -> Result<T, Error> {
    match &result {
        Ok(_) => ctx.emit_operation_completed(label, true),
        Err(e) => {
            tracing::warn!(operation = label, error = %e, "operation failed");
            ctx.emit_operation_failed(label, FailureContext::from_error(e));
        }
    }
    result
}
