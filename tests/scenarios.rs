//! End-to-end scenarios across site, install, configure, state and ops
//!
//! Each test drives the operations layer the way the command-line front end
//! does and checks what ends up on disk and in the history.

mod common;

use common::{include, patch_of, SiteBuilder, TestEnvironment};
use fman_config::Config;
use fman_errors::{Error, InstallError};
use fman_events::{AppEvent, GeneralEvent, StateEvent};
use fman_hash::Digest;
use fman_ops::InstallRequest;
use fman_state::CONFIG_PREFIX;
use fman_types::{ActivityAction, ActivityStatus};
use std::time::Duration;

fn request(source: &SiteBuilder, feature: &str) -> InstallRequest {
    InstallRequest {
        source: source.spec(),
        feature: feature.to_string(),
        ..InstallRequest::default()
    }
}

#[tokio::test]
async fn reinstall_does_not_duplicate_content_or_configuration() {
    let env = TestEnvironment::new().await;
    let source = SiteBuilder::new();
    let target = SiteBuilder::new();
    source.feature("app_1.0.0", &["p1_1.0.0", "p2_1.0.0"]).await;
    fman_ops::add_site(&env.ctx, &target.spec()).await.unwrap();

    fman_ops::install(&env.ctx, &request(&source, "app")).await.unwrap();
    let plugins = target.plugin_dirs().await;
    let configured = env.configured().await;
    assert_eq!(plugins, vec!["p1_1.0.0", "p2_1.0.0"]);
    assert_eq!(configured, vec!["app_1.0.0"]);

    fman_ops::install(&env.ctx, &request(&source, "app_1.0.0"))
        .await
        .unwrap();
    assert_eq!(target.plugin_dirs().await, plugins);
    assert_eq!(target.feature_dirs().await, vec!["app_1.0.0"]);
    assert_eq!(env.configured().await, configured);
    assert_eq!(target.staging_dirs().await, 0);
}

#[tokio::test]
async fn failed_install_commits_nothing_and_is_audited() {
    let env = TestEnvironment::new().await;
    let source = SiteBuilder::new();
    let target = SiteBuilder::new();
    let wrong = Digest::of(b"tampered").to_hex();
    source
        .feature_with(
            "app_1.0.0",
            &["p2_1.0.0"],
            &format!("[digests]\n\"plugins/p2_1.0.0/plugin.jar\" = \"{wrong}\"\n"),
        )
        .await;
    fman_ops::add_site(&env.ctx, &target.spec()).await.unwrap();
    let history_len = env.history().await.len();

    let err = fman_ops::install(&env.ctx, &request(&source, "app"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Install(InstallError::VerificationFailed { .. })
    ));

    assert!(target.feature_dirs().await.is_empty());
    assert!(target.plugin_dirs().await.is_empty());
    assert_eq!(target.staging_dirs().await, 0);
    assert!(env.features().await.is_empty());
    assert_eq!(env.history().await.len(), history_len);

    let last = env.activities().await.pop().unwrap();
    assert_eq!(last.action, ActivityAction::Install);
    assert_eq!(last.status, ActivityStatus::Nok);
}

#[tokio::test]
async fn one_bad_plugin_is_dropped_from_the_batch() {
    let env = TestEnvironment::new().await;
    let source = SiteBuilder::new();
    let target = SiteBuilder::new();
    let wrong = Digest::of(b"tampered").to_hex();
    source
        .feature_with(
            "app_1.0.0",
            &["p1_1.0.0", "p2_1.0.0"],
            &format!("[digests]\n\"plugins/p2_1.0.0/plugin.jar\" = \"{wrong}\"\n"),
        )
        .await;
    fman_ops::add_site(&env.ctx, &target.spec()).await.unwrap();

    fman_ops::install(&env.ctx, &request(&source, "app")).await.unwrap();
    assert_eq!(target.plugin_dirs().await, vec!["p1_1.0.0"]);
    assert_eq!(target.feature_dirs().await, vec!["app_1.0.0"]);
    assert_eq!(target.staging_dirs().await, 0);
}

#[tokio::test]
async fn cancelled_install_is_reported_as_abort() {
    let env = TestEnvironment::new().await;
    let source = SiteBuilder::new();
    let target = SiteBuilder::new();
    source.feature("app_1.0.0", &["p1_1.0.0"]).await;
    fman_ops::add_site(&env.ctx, &target.spec()).await.unwrap();

    env.ctx.install.progress.cancel();
    let err = fman_ops::install(&env.ctx, &request(&source, "app"))
        .await
        .unwrap_err();

    assert!(err.is_aborted());
    assert!(target.feature_dirs().await.is_empty());
    assert!(target.plugin_dirs().await.is_empty());
    assert_eq!(
        env.activities().await.pop().map(|a| a.status),
        Some(ActivityStatus::Nok)
    );
}

#[tokio::test]
async fn revert_restores_configured_sets_end_to_end() {
    let env = TestEnvironment::new().await;
    let source = SiteBuilder::new();
    let target = SiteBuilder::new();
    target.feature("f1_1.0.0", &["a_1.0.0"]).await;
    source.feature("f2_1.0.0", &["b_1.0.0"]).await;

    // C0: the site with F1 configured
    fman_ops::add_site(&env.ctx, &target.spec()).await.unwrap();
    let c0 = env.current_id().await;
    assert_eq!(env.configured().await, vec!["f1_1.0.0"]);

    // C1: F2 installed and configured next to F1
    fman_ops::install(&env.ctx, &request(&source, "f2")).await.unwrap();
    let c1 = env.current_id().await;
    assert_eq!(env.configured().await, vec!["f1_1.0.0", "f2_1.0.0"]);

    // C2: only F2 configured
    fman_ops::unconfigure(&env.ctx, None, "f1").await.unwrap();
    let c2 = env.current_id().await;
    assert_eq!(env.configured().await, vec!["f2_1.0.0"]);

    let before = env.history().await;
    let report = fman_ops::revert(&env.ctx, &c0).await.unwrap();
    let after = env.history().await;

    assert_eq!(env.configured().await, vec!["f1_1.0.0"]);
    assert_eq!(after.len(), before.len() + 1);
    assert_eq!(after.last().unwrap().id, report.created);
    for id in [&c0, &c1, &c2] {
        let old = before.iter().find(|c| &c.id == id).unwrap();
        let kept = after.iter().find(|c| &c.id == id).unwrap();
        assert_eq!(old.sites, kept.sites);
        assert_eq!(old.label, kept.label);
    }
    // F2 content stays on disk, only its configured state changed
    assert!(target.feature_dirs().await.contains(&"f2_1.0.0".to_string()));
}

#[tokio::test]
async fn history_cap_applies_to_operations() {
    let mut config = Config::default();
    config.history.max_history_count = 3;
    let env = TestEnvironment::with_config(config).await;
    let site = SiteBuilder::new();
    site.feature("f_1.0.0", &["p_1.0.0"]).await;
    fman_ops::add_site(&env.ctx, &site.spec()).await.unwrap();

    for _ in 0..4 {
        fman_ops::unconfigure(&env.ctx, None, "f").await.unwrap();
        fman_ops::configure(&env.ctx, None, "f").await.unwrap();
    }

    assert_eq!(env.history().await.len(), 3);
    let mut files = 0;
    let mut rd = tokio::fs::read_dir(env.state.path()).await.unwrap();
    while let Some(entry) = rd.next_entry().await.unwrap() {
        if entry.file_name().to_string_lossy().starts_with(CONFIG_PREFIX) {
            files += 1;
        }
    }
    assert_eq!(files, 3);

    let evicted = env
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, AppEvent::State(StateEvent::ConfigurationEvicted { .. })))
        .count();
    // initial + site add + 8 toggles, minus the 3 kept
    assert_eq!(evicted, 7);
}

#[tokio::test]
async fn restart_restores_history_and_configured_features() {
    let env = TestEnvironment::new().await;
    let source = SiteBuilder::new();
    let target = SiteBuilder::new();
    source.feature("lib_1.0.0", &["q_1.0.0"]).await;
    source
        .feature_with("app_1.0.0", &["p_1.0.0"], &include("lib_1.0.0", true))
        .await;
    fman_ops::add_site(&env.ctx, &target.spec()).await.unwrap();
    fman_ops::install(&env.ctx, &request(&source, "app")).await.unwrap();
    fman_ops::unconfigure(&env.ctx, None, "app").await.unwrap();
    fman_ops::configure(&env.ctx, None, "lib").await.unwrap();

    let ids: Vec<String> = env.history().await.into_iter().map(|c| c.id).collect();
    let configured = env.configured().await;
    let activities = env.activities().await.len();
    assert_eq!(configured, vec!["lib_1.0.0"]);

    let env = env.reopen().await;
    let report = fman_ops::reconcile(&env.ctx).await.unwrap();
    assert!(!report.changed);
    let reopened: Vec<String> = env.history().await.into_iter().map(|c| c.id).collect();
    assert_eq!(reopened, ids);
    assert_eq!(env.configured().await, configured);
    assert_eq!(env.activities().await.len(), activities);
}

#[tokio::test]
async fn restart_reconciles_features_added_outside() {
    let env = TestEnvironment::new().await;
    let site = SiteBuilder::new();
    site.feature("f1_1.0.0", &["a_1.0.0"]).await;
    fman_ops::add_site(&env.ctx, &site.spec()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    site.feature("f3_1.0.0", &["c_1.0.0"]).await;
    site.broken_feature("f4_1.0.0", &["missing_1.0.0"]).await;

    let env = env.reopen().await;
    let report = fman_ops::reconcile(&env.ctx).await.unwrap();
    assert!(report.changed);
    assert!(report.configured.iter().any(|f| f.contains("f3_1.0.0")));
    assert!(report.unhappy.iter().any(|f| f.contains("f4_1.0.0")));

    assert_eq!(env.configured().await, vec!["f1_1.0.0", "f3_1.0.0"]);
    let features = env.features().await;
    let broken = features.iter().find(|f| f.id == "f4").unwrap();
    assert!(!broken.configured);
}

#[tokio::test]
async fn pessimistic_restart_leaves_new_features_unconfigured() {
    let mut config = Config::default();
    config.history.optimistic_reconciliation = false;
    let env = TestEnvironment::with_config(config).await;
    let site = SiteBuilder::new();
    site.feature("f1_1.0.0", &["a_1.0.0"]).await;
    fman_ops::add_site(&env.ctx, &site.spec()).await.unwrap();
    assert!(env.configured().await.is_empty());

    tokio::time::sleep(Duration::from_millis(20)).await;
    site.feature("f2_1.0.0", &["b_1.0.0"]).await;

    let env = env.reopen().await;
    fman_ops::reconcile(&env.ctx).await.unwrap();
    let features = env.features().await;
    assert_eq!(features.len(), 2);
    assert!(features.iter().all(|f| !f.configured));
}

#[tokio::test]
async fn unconfiguring_a_target_cascades_to_its_patch() {
    let env = TestEnvironment::new().await;
    let site = SiteBuilder::new();
    site.feature("base_1.0.0", &["b_1.0.0"]).await;
    site.feature_with("fix_1.0.0", &["x_1.0.0"], &patch_of("base_1.0.0"))
        .await;
    fman_ops::add_site(&env.ctx, &site.spec()).await.unwrap();
    assert_eq!(env.configured().await, vec!["base_1.0.0", "fix_1.0.0"]);

    let report = fman_ops::unconfigure(&env.ctx, None, "base").await.unwrap();
    assert!(report.changed);
    assert!(env.configured().await.is_empty());
}

#[tokio::test]
async fn parent_protection_holds_until_parent_is_unconfigured() {
    let env = TestEnvironment::new().await;
    let site = SiteBuilder::new();
    site.feature("lib_1.0.0", &["q_1.0.0"]).await;
    site.feature_with("app_1.0.0", &["p_1.0.0"], &include("lib_1.0.0", false))
        .await;
    fman_ops::add_site(&env.ctx, &site.spec()).await.unwrap();

    let refused = fman_ops::unconfigure(&env.ctx, None, "lib").await.unwrap();
    assert!(refused.refused);
    assert_eq!(env.configured().await, vec!["app_1.0.0", "lib_1.0.0"]);

    fman_ops::unconfigure(&env.ctx, None, "app").await.unwrap();
    fman_ops::configure(&env.ctx, None, "lib").await.unwrap();
    let report = fman_ops::unconfigure(&env.ctx, None, "lib").await.unwrap();
    assert!(report.changed && !report.refused);
    assert!(env.configured().await.is_empty());
}

#[tokio::test]
async fn every_operation_is_audited_once() {
    let env = TestEnvironment::new().await;
    let source = SiteBuilder::new();
    let target = SiteBuilder::new();
    source.feature("app_1.0.0", &["p_1.0.0"]).await;
    env.drain_events();

    fman_ops::add_site(&env.ctx, &target.spec()).await.unwrap();
    fman_ops::install(&env.ctx, &request(&source, "app")).await.unwrap();
    fman_ops::configure(&env.ctx, None, "app").await.unwrap();
    let _ = fman_ops::install(&env.ctx, &request(&source, "ghost")).await;
    fman_ops::remove(&env.ctx, None, "app").await.unwrap();

    let actions: Vec<(ActivityAction, ActivityStatus)> = env
        .activities()
        .await
        .into_iter()
        .map(|a| (a.action, a.status))
        .collect();
    assert_eq!(
        actions,
        vec![
            (ActivityAction::SiteInstall, ActivityStatus::Ok),
            (ActivityAction::Install, ActivityStatus::Ok),
            (ActivityAction::Configure, ActivityStatus::Ok),
            (ActivityAction::Install, ActivityStatus::Nok),
            (ActivityAction::Remove, ActivityStatus::Ok),
        ]
    );

    let events = env.drain_events();
    let started = events
        .iter()
        .filter(|e| matches!(e, AppEvent::General(GeneralEvent::OperationStarted { .. })))
        .count();
    let failed = events
        .iter()
        .filter(|e| matches!(e, AppEvent::General(GeneralEvent::OperationFailed { .. })))
        .count();
    assert_eq!(started, 5);
    assert_eq!(failed, 1);
    assert!(target.plugin_dirs().await.is_empty());
}
