//! System setup and initialization

use crate::error::CliError;
use fman_config::Config;
use fman_events::{EventEmitter, EventSender};
use fman_ops::{OpsContextBuilder, OpsCtx};
use fman_site::SiteRegistry;
use fman_state::LocalSite;
use std::path::PathBuf;
use tracing::{debug, info};

/// Opens the configuration history and brings the managed sites in line
/// with it before any command runs
pub struct SystemSetup {
    config: Config,
    state_dir: PathBuf,
}

impl SystemSetup {
    pub fn new(config: Config) -> Self {
        let state_dir = config.state_path();
        Self { config, state_dir }
    }

    /// Open the history and build the operations context
    pub async fn initialize(&self, tx: EventSender) -> Result<OpsCtx, CliError> {
        info!(state_dir = %self.state_dir.display(), "initializing fman");
        tokio::fs::create_dir_all(&self.state_dir).await?;

        let registry = SiteRegistry::new();
        let local = LocalSite::open_with(
            &self.state_dir,
            self.config.history.max_history_count,
            registry.clone(),
            Some(tx.clone()),
        )
        .await?
        .with_environment(self.config.environment());

        let ctx = OpsContextBuilder::new()
            .with_local_site(local)
            .with_registry(registry)
            .with_event_sender(tx)
            .with_config(self.config.clone())
            .build()?;

        self.startup_maintenance(&ctx).await?;
        Ok(ctx)
    }

    /// Add the site directories listed in the configuration that the current
    /// configuration does not know yet, then reconcile with the live sites
    async fn startup_maintenance(&self, ctx: &OpsCtx) -> Result<(), CliError> {
        for path in &self.config.paths.sites {
            let spec = path.display().to_string();
            let url = match ctx.site_url(&spec).await {
                Ok(url) => url,
                Err(e) => {
                    ctx.emit_warning("managed site unavailable", Some(format!("{spec}: {e}")));
                    continue;
                }
            };
            let known = ctx.local.lock().await.current()?.site(&url).is_some();
            if !known {
                debug!(site = %url, "adding managed site");
                fman_ops::add_site(ctx, &spec).await?;
            }
        }

        let report = fman_ops::reconcile(ctx).await?;
        if report.changed {
            info!(
                configured = report.configured.len(),
                unhappy = report.unhappy.len(),
                forgotten = report.forgotten.len(),
                "reconciled with live sites"
            );
        }
        for feature in &report.unhappy {
            ctx.emit_warning(
                "feature left unconfigured after reconciliation",
                Some(feature.clone()),
            );
        }
        Ok(())
    }
}
