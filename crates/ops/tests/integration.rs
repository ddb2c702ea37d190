//! Integration tests for ops crate

use async_trait::async_trait;
use fman_config::Config;
use fman_errors::{Error, InstallError};
use fman_events::EventReceiver;
use fman_install::{InstallContext, InstallHandler};
use fman_ops::{InstallRequest, OperationResult, OpsContextBuilder, OpsCtx};
use fman_site::SiteRegistry;
use fman_state::LocalSite;
use fman_types::{ActivityStatus, Feature, FeatureStatus};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::fs;

async fn feature(root: &Path, key: &str, plugins: &[&str], included: &[&str]) {
    let (id, version) = key.rsplit_once('_').unwrap();
    let dir = root.join("features").join(key);
    fs::create_dir_all(&dir).await.unwrap();
    let mut text = format!("identifier = {{ id = \"{id}\", version = \"{version}\" }}\n");
    for plugin in plugins {
        let (pid, pver) = plugin.rsplit_once('_').unwrap();
        text.push_str(&format!(
            "[[plugin_entries]]\nidentifier = {{ id = \"{pid}\", version = \"{pver}\" }}\n"
        ));
        let plugin_dir = root.join("plugins").join(plugin);
        fs::create_dir_all(&plugin_dir).await.unwrap();
        fs::write(plugin_dir.join("plugin.jar"), b"jar").await.unwrap();
    }
    for child in included {
        let (cid, cver) = child.rsplit_once('_').unwrap();
        text.push_str(&format!(
            "[[included]]\nidentifier = {{ id = \"{cid}\", version = \"{cver}\" }}\n"
        ));
    }
    fs::write(dir.join("feature.toml"), text).await.unwrap();
}

struct Fixture {
    _state: TempDir,
    source: TempDir,
    target: TempDir,
    ctx: OpsCtx,
    _rx: EventReceiver,
}

impl Fixture {
    fn source(&self) -> String {
        self.source.path().display().to_string()
    }

    fn target(&self) -> String {
        self.target.path().display().to_string()
    }
}

async fn fixture() -> Fixture {
    fixture_with(None).await
}

async fn fixture_with(install: Option<InstallContext>) -> Fixture {
    let state = tempfile::tempdir().unwrap();
    let source = tempfile::tempdir().unwrap();
    let target = tempfile::tempdir().unwrap();
    feature(source.path(), "lib_1.0.0", &["q_1.0.0"], &[]).await;
    feature(source.path(), "app_1.0.0", &["p_1.0.0"], &["lib_1.0.0"]).await;

    let (tx, rx) = fman_events::channel();
    let registry = SiteRegistry::new();
    let local = LocalSite::open_with(state.path(), 50, registry.clone(), Some(tx.clone()))
        .await
        .unwrap();
    let mut builder = OpsContextBuilder::new()
        .with_local_site(local)
        .with_registry(registry)
        .with_event_sender(tx)
        .with_config(Config::default());
    if let Some(install) = install {
        builder = builder.with_install_context(install);
    }
    let ctx = builder.build().unwrap();
    Fixture {
        _state: state,
        source,
        target,
        ctx,
        _rx: rx,
    }
}

async fn activities(ctx: &OpsCtx) -> Vec<ActivityStatus> {
    fman_ops::history(ctx)
        .await
        .into_iter()
        .filter(|c| !c.preserved)
        .flat_map(|c| c.activities.into_iter().map(|a| a.status))
        .collect()
}

#[tokio::test]
async fn builder_requires_components() {
    let err = OpsContextBuilder::new().build().err().unwrap();
    assert!(err.to_string().contains("local_site"));
}

#[tokio::test]
async fn install_configure_unconfigure_revert() {
    let fx = fixture().await;
    let ctx = &fx.ctx;

    fman_ops::add_site(ctx, &fx.target()).await.unwrap();
    let installed = fman_ops::install(
        ctx,
        &InstallRequest {
            source: fx.source(),
            feature: "app".to_string(),
            ..InstallRequest::default()
        },
    )
    .await
    .unwrap();
    assert!(installed.feature.contains("app_1.0.0"));
    assert!(fx.target.path().join("plugins/p_1.0.0/plugin.jar").exists());
    assert!(fx.target.path().join("plugins/q_1.0.0/plugin.jar").exists());

    let features = fman_ops::list_features(ctx, None).await.unwrap();
    assert_eq!(features.len(), 2);
    assert!(features.iter().all(|f| f.configured));
    assert!(features.iter().all(|f| f.status == FeatureStatus::Happy));

    let refused = fman_ops::unconfigure(ctx, None, "lib").await.unwrap();
    assert!(refused.refused);
    assert!(!OperationResult::ConfigureReport(refused).is_success());

    let off = fman_ops::unconfigure(ctx, None, "app_1.0.0").await.unwrap();
    assert!(off.changed);
    let both_off = off.configuration.unwrap();
    let features = fman_ops::list_features(ctx, None).await.unwrap();
    assert!(features.iter().all(|f| !f.configured));

    let on = fman_ops::configure(ctx, None, "app").await.unwrap();
    assert!(on.changed);
    let status = fman_ops::feature_status(ctx, None, "lib").await.unwrap();
    assert_eq!(status.status, FeatureStatus::Happy);

    let err = fman_ops::remove(ctx, None, "lib").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Install(InstallError::ParentDependency { .. })
    ));

    let reverted = fman_ops::revert(ctx, &both_off).await.unwrap();
    assert_eq!(reverted.target, both_off);
    let features = fman_ops::list_features(ctx, None).await.unwrap();
    assert!(features.iter().all(|f| !f.configured));

    // one activity per top-level operation, failures included
    let statuses = activities(ctx).await;
    assert_eq!(statuses.len(), 7);
    assert_eq!(
        statuses.iter().filter(|s| **s == ActivityStatus::Nok).count(),
        2
    );
}

#[derive(Debug, Default)]
struct CountingHandler {
    configured: AtomicUsize,
    unconfigured: AtomicUsize,
}

#[async_trait]
impl InstallHandler for CountingHandler {
    async fn configure(&self, _feature: &Feature) -> Result<(), Error> {
        self.configured.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn unconfigure(&self, _feature: &Feature) -> Result<(), Error> {
        self.unconfigured.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn handler_hooks_follow_every_configuration_change() {
    let handler = Arc::new(CountingHandler::default());
    let fx = fixture_with(Some(InstallContext::new().with_handler(handler.clone()))).await;
    let ctx = &fx.ctx;
    let configured = || handler.configured.load(Ordering::SeqCst);
    let unconfigured = || handler.unconfigured.load(Ordering::SeqCst);

    fman_ops::add_site(ctx, &fx.target()).await.unwrap();
    let installed = fman_ops::install(
        ctx,
        &InstallRequest {
            source: fx.source(),
            feature: "app".to_string(),
            ..InstallRequest::default()
        },
    )
    .await
    .unwrap();
    assert_eq!((configured(), unconfigured()), (2, 0));

    fman_ops::unconfigure(ctx, None, "app").await.unwrap();
    assert_eq!((configured(), unconfigured()), (2, 2));

    // revert replays the delta through the same hooks
    fman_ops::revert(ctx, &installed.configuration).await.unwrap();
    assert_eq!((configured(), unconfigured()), (4, 2));

    fman_ops::remove_site(ctx, &fx.target()).await.unwrap();
    assert_eq!((configured(), unconfigured()), (4, 4));
}

#[tokio::test]
async fn failed_install_is_recorded_and_leaves_site_untouched() {
    let fx = fixture().await;
    let ctx = &fx.ctx;
    fman_ops::add_site(ctx, &fx.target()).await.unwrap();
    let before = fman_ops::history(ctx).await.len();

    let err = fman_ops::install(
        ctx,
        &InstallRequest {
            source: fx.source(),
            feature: "ghost".to_string(),
            ..InstallRequest::default()
        },
    )
    .await;
    assert!(err.is_err());
    assert_eq!(fman_ops::history(ctx).await.len(), before);
    assert_eq!(activities(ctx).await.last(), Some(&ActivityStatus::Nok));
    assert!(!fx.target.path().join("features").join("ghost").exists());
}

#[tokio::test]
async fn remove_deletes_content_and_unconfigures() {
    let fx = fixture().await;
    let ctx = &fx.ctx;
    fman_ops::add_site(ctx, &fx.target()).await.unwrap();
    fman_ops::install(
        ctx,
        &InstallRequest {
            source: fx.source(),
            feature: "lib_1.0.0".to_string(),
            ..InstallRequest::default()
        },
    )
    .await
    .unwrap();

    let report = fman_ops::remove(ctx, None, "lib").await.unwrap();
    assert_eq!(report.plugins_removed, 1);
    assert!(!fx.target.path().join("plugins/q_1.0.0").exists());
    assert!(fman_ops::list_features(ctx, None).await.unwrap().is_empty());
    let sites = fman_ops::list_sites(ctx).await.unwrap();
    assert_eq!(sites[0].configured + sites[0].unconfigured, 0);
}

#[tokio::test]
async fn sites_preserve_and_json_output() {
    let fx = fixture().await;
    let ctx = &fx.ctx;

    let site = fman_ops::add_site(ctx, &fx.source()).await.unwrap();
    // optimistic by default: existing features are configured
    assert_eq!(site.configured, 2);
    assert!(fman_ops::add_site(ctx, &fx.source()).await.is_err());

    let disabled = fman_ops::set_site_enabled(ctx, &fx.source(), false)
        .await
        .unwrap();
    assert!(!disabled.enabled);
    let status = fman_ops::feature_status(ctx, None, "app").await.unwrap();
    assert_eq!(status.status, FeatureStatus::Disabled);

    let history = fman_ops::history(ctx).await;
    let current = history.iter().find(|c| c.current).unwrap();
    let preserved = fman_ops::preserve(ctx, &current.id).await.unwrap();
    assert!(preserved.preserved);

    let json = OperationResult::History(fman_ops::history(ctx).await)
        .to_json()
        .unwrap();
    assert!(json.contains(&preserved.id));

    fman_ops::remove_site(ctx, &fx.source()).await.unwrap();
    assert!(fman_ops::list_sites(ctx).await.unwrap().is_empty());
    fman_ops::remove_preserved(ctx, &preserved.id).await.unwrap();
    fman_ops::save(ctx).await.unwrap();
}
