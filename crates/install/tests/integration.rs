//! Integration tests for install crate

use async_trait::async_trait;
use fman_errors::{Error, InstallError, StorageError};
use fman_events::{AppEvent, InstallEvent, ProgressMonitor};
use fman_hash::Digest;
use fman_install::{
    DigestVerifier, InstallContext, InstallHandler, InstallTarget, InstalledPluginRegistry,
    Installer, PolicyListener,
};
use fman_site::{
    ContentConsumer, ContentProvider, ContentRef, DirectoryContentProvider, Site, SiteManifest,
};
use fman_types::{DataEntry, Feature, PluginEntry, SiteUrl, VersionedIdentifier};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::fs;

struct FeatureSpec<'a> {
    id: &'a str,
    version: &'a str,
    plugins: &'a [&'a str],
    included: &'a [(&'a str, bool)],
    data: &'a [&'a str],
}

impl<'a> FeatureSpec<'a> {
    fn new(id: &'a str, version: &'a str) -> Self {
        Self {
            id,
            version,
            plugins: &[],
            included: &[],
            data: &[],
        }
    }
}

async fn write_feature(root: &Path, spec: &FeatureSpec<'_>, extra: &str) {
    let dir = root
        .join("features")
        .join(format!("{}_{}", spec.id, spec.version));
    fs::create_dir_all(&dir).await.unwrap();

    let mut text = format!(
        "identifier = {{ id = \"{}\", version = \"{}\" }}\n{extra}\n",
        spec.id, spec.version
    );
    for plugin in spec.plugins {
        let (pid, pver) = plugin.rsplit_once('_').unwrap();
        text.push_str(&format!(
            "[[plugin_entries]]\nidentifier = {{ id = \"{pid}\", version = \"{pver}\" }}\n"
        ));
        let plugin_dir = root.join("plugins").join(plugin);
        fs::create_dir_all(&plugin_dir).await.unwrap();
        fs::write(plugin_dir.join("plugin.jar"), format!("jar of {plugin}"))
            .await
            .unwrap();
    }
    for (child, optional) in spec.included {
        let (cid, cver) = child.rsplit_once('_').unwrap();
        text.push_str(&format!(
            "[[included]]\nidentifier = {{ id = \"{cid}\", version = \"{cver}\" }}\noptional = {optional}\n"
        ));
    }
    for entry in spec.data {
        text.push_str(&format!("[[data_entries]]\nid = \"{entry}\"\n"));
        fs::write(dir.join(entry), b"data").await.unwrap();
    }
    fs::write(dir.join("feature.toml"), text).await.unwrap();
}

async fn sites() -> (TempDir, Arc<Site>, TempDir, Arc<Site>) {
    let source_dir = tempfile::tempdir().unwrap();
    let target_dir = tempfile::tempdir().unwrap();
    let source = Site::open(source_dir.path()).await.unwrap();
    let target = Site::open(target_dir.path()).await.unwrap();
    (source_dir, source, target_dir, target)
}

async fn reference(site: &Site, key: &str) -> fman_site::FeatureReference {
    site.refresh().await.unwrap();
    site.reference_by_identifier(&key.parse().unwrap())
        .await
        .unwrap()
}

async fn staging_dirs(root: &Path) -> usize {
    let mut count = 0;
    let mut rd = fs::read_dir(root).await.unwrap();
    while let Some(entry) = rd.next_entry().await.unwrap() {
        if entry.file_name().to_string_lossy().starts_with(".staging-") {
            count += 1;
        }
    }
    count
}

#[tokio::test]
async fn install_copies_feature_and_plugins() {
    let (src_dir, source, tgt_dir, target) = sites().await;
    write_feature(
        src_dir.path(),
        &FeatureSpec {
            plugins: &["p_1.0.0", "q_1.0.0"],
            ..FeatureSpec::new("f", "1.0.0")
        },
        "",
    )
    .await;

    let registry = InstalledPluginRegistry::new();
    let installer = Installer::new(InstallContext::new().with_registry(registry.clone()));
    let source_ref = reference(&source, "f_1.0.0").await;
    let installed = installer
        .install(&source, &source_ref, &InstallTarget::new(Arc::clone(&target), true))
        .await
        .unwrap();

    assert_eq!(installed.site(), target.url());
    assert!(target.contains(&installed));
    assert!(tgt_dir
        .path()
        .join("features/f_1.0.0/feature.toml")
        .exists());
    assert_eq!(
        fs::read_to_string(tgt_dir.path().join("plugins/q_1.0.0/plugin.jar"))
            .await
            .unwrap(),
        "jar of q_1.0.0"
    );
    assert_eq!(registry.len(), 2);
    assert_eq!(staging_dirs(tgt_dir.path()).await, 0);
}

#[tokio::test]
async fn reinstall_is_idempotent() {
    let (src_dir, source, tgt_dir, target) = sites().await;
    write_feature(
        src_dir.path(),
        &FeatureSpec {
            plugins: &["p_1.0.0"],
            ..FeatureSpec::new("f", "1.0.0")
        },
        "",
    )
    .await;

    let source_ref = reference(&source, "f_1.0.0").await;
    let target_spec = InstallTarget::new(Arc::clone(&target), true);
    let installer = Installer::new(InstallContext::new());
    let first = installer.install(&source, &source_ref, &target_spec).await.unwrap();
    let second = installer.install(&source, &source_ref, &target_spec).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(target.feature_references().len(), 1);
    assert_eq!(
        target.installed_plugins().await.unwrap(),
        vec!["p_1.0.0".parse::<VersionedIdentifier>().unwrap()]
    );
    assert_eq!(staging_dirs(tgt_dir.path()).await, 0);
}

#[tokio::test]
async fn read_only_target_is_rejected_before_any_write() {
    let (src_dir, source, tgt_dir, target) = sites().await;
    write_feature(src_dir.path(), &FeatureSpec::new("f", "1.0.0"), "").await;
    let source_ref = reference(&source, "f_1.0.0").await;

    let err = Installer::new(InstallContext::new())
        .install(&source, &source_ref, &InstallTarget::new(target, false))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Install(InstallError::SiteNotWritable { .. })
    ));
    assert!(!tgt_dir.path().join("features").exists());
}

#[tokio::test]
async fn digest_mismatch_rolls_back_everything() {
    let (src_dir, source, tgt_dir, target) = sites().await;
    let wrong = Digest::of(b"something else").to_hex();
    write_feature(
        src_dir.path(),
        &FeatureSpec {
            plugins: &["p_1.0.0"],
            ..FeatureSpec::new("f", "1.0.0")
        },
        &format!("[digests]\n\"plugins/p_1.0.0/plugin.jar\" = \"{wrong}\"\n"),
    )
    .await;

    let registry = InstalledPluginRegistry::new();
    let ctx = InstallContext::new()
        .with_verifier(Arc::new(DigestVerifier::new(false)))
        .with_registry(registry.clone());
    let source_ref = reference(&source, "f_1.0.0").await;
    let err = Installer::new(ctx)
        .install(&source, &source_ref, &InstallTarget::new(Arc::clone(&target), true))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Install(InstallError::VerificationFailed { .. })
    ));
    assert!(target.feature_references().is_empty());
    assert!(target.installed_plugins().await.unwrap().is_empty());
    assert!(registry.is_empty());
    assert_eq!(staging_dirs(tgt_dir.path()).await, 0);
}

#[tokio::test]
async fn digested_feature_installs_under_strict_policy() {
    let (src_dir, source, tgt_dir, target) = sites().await;
    let digest = Digest::of(b"jar of p_1.0.0").to_hex();
    write_feature(
        src_dir.path(),
        &FeatureSpec {
            plugins: &["p_1.0.0"],
            ..FeatureSpec::new("f", "1.0.0")
        },
        &format!("[digests]\n\"plugins/p_1.0.0/plugin.jar\" = \"{digest}\"\n"),
    )
    .await;

    let ctx = InstallContext::new()
        .with_verifier(Arc::new(DigestVerifier::new(true)))
        .with_listener(Arc::new(PolicyListener::new(false)));
    let source_ref = reference(&source, "f_1.0.0").await;
    Installer::new(ctx)
        .install(&source, &source_ref, &InstallTarget::new(Arc::clone(&target), true))
        .await
        .unwrap();

    assert!(tgt_dir.path().join("features/f_1.0.0/feature.toml").exists());
    assert!(tgt_dir.path().join("plugins/p_1.0.0/plugin.jar").exists());
}

#[tokio::test]
async fn children_install_before_parent() {
    let (src_dir, source, tgt_dir, target) = sites().await;
    write_feature(
        src_dir.path(),
        &FeatureSpec {
            plugins: &["c_1.0.0"],
            ..FeatureSpec::new("child", "1.0.0")
        },
        "",
    )
    .await;
    write_feature(
        src_dir.path(),
        &FeatureSpec {
            plugins: &["p_1.0.0"],
            included: &[("child_1.0.0", false)],
            ..FeatureSpec::new("parent", "1.0.0")
        },
        "",
    )
    .await;

    let (tx, mut rx) = fman_events::channel();
    let ctx = InstallContext::new().with_event_sender(tx);
    let source_ref = reference(&source, "parent_1.0.0").await;
    Installer::new(ctx)
        .install(&source, &source_ref, &InstallTarget::new(Arc::clone(&target), true))
        .await
        .unwrap();

    assert!(tgt_dir.path().join("features/child_1.0.0/feature.toml").exists());
    assert!(tgt_dir.path().join("plugins/c_1.0.0/plugin.jar").exists());
    assert_eq!(target.feature_references().len(), 2);

    let mut committed = Vec::new();
    while let Ok(message) = rx.try_recv() {
        if let AppEvent::Install(InstallEvent::Committed { feature, .. }) = message.event {
            committed.push(feature);
        }
    }
    assert_eq!(committed, vec!["child_1.0.0", "parent_1.0.0"]);
}

#[tokio::test]
async fn missing_required_child_fails_optional_is_skipped() {
    let (src_dir, source, _tgt_dir, target) = sites().await;
    write_feature(
        src_dir.path(),
        &FeatureSpec {
            included: &[("ghost_1.0.0", false)],
            ..FeatureSpec::new("strict", "1.0.0")
        },
        "",
    )
    .await;
    write_feature(
        src_dir.path(),
        &FeatureSpec {
            included: &[("ghost_1.0.0", true)],
            ..FeatureSpec::new("lenient", "1.0.0")
        },
        "",
    )
    .await;

    let installer = Installer::new(InstallContext::new());
    let target_spec = InstallTarget::new(Arc::clone(&target), true);

    let strict = reference(&source, "strict_1.0.0").await;
    let err = installer.install(&source, &strict, &target_spec).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Install(InstallError::RequiredChildFailed { .. })
    ));

    let lenient = reference(&source, "lenient_1.0.0").await;
    installer.install(&source, &lenient, &target_spec).await.unwrap();
    assert_eq!(target.feature_references().len(), 1);
}

#[tokio::test]
async fn data_entries_are_staged_by_default_handler() {
    let (src_dir, source, tgt_dir, target) = sites().await;
    write_feature(
        src_dir.path(),
        &FeatureSpec {
            data: &["extra.zip"],
            ..FeatureSpec::new("f", "1.0.0")
        },
        "",
    )
    .await;

    let source_ref = reference(&source, "f_1.0.0").await;
    Installer::new(InstallContext::new())
        .install(&source, &source_ref, &InstallTarget::new(target, true))
        .await
        .unwrap();
    assert!(tgt_dir.path().join("features/f_1.0.0/extra.zip").exists());
}

#[tokio::test]
async fn remove_keeps_shared_plugins() {
    let (src_dir, source, tgt_dir, target) = sites().await;
    write_feature(
        src_dir.path(),
        &FeatureSpec {
            plugins: &["p_1.0.0", "shared_1.0.0"],
            ..FeatureSpec::new("f", "1.0.0")
        },
        "",
    )
    .await;
    write_feature(
        src_dir.path(),
        &FeatureSpec {
            plugins: &["shared_1.0.0"],
            ..FeatureSpec::new("g", "1.0.0")
        },
        "",
    )
    .await;

    let installer = Installer::new(InstallContext::new());
    let target_spec = InstallTarget::new(Arc::clone(&target), true);
    let f = installer
        .install(&source, &reference(&source, "f_1.0.0").await, &target_spec)
        .await
        .unwrap();
    installer
        .install(&source, &reference(&source, "g_1.0.0").await, &target_spec)
        .await
        .unwrap();

    let result = installer.remove(&f, &target_spec).await.unwrap();
    assert_eq!(result.plugins_removed, 1);
    assert!(!tgt_dir.path().join("plugins/p_1.0.0").exists());
    assert!(tgt_dir.path().join("plugins/shared_1.0.0").exists());
    assert!(!tgt_dir.path().join("features/f_1.0.0").exists());
    assert_eq!(target.feature_references().len(), 1);
}

/// Directory provider whose plugin fetches can be made to fail or abort
#[derive(Debug)]
struct FaultyProvider {
    inner: DirectoryContentProvider,
    abort_on: &'static str,
    observed_cancel: Arc<AtomicUsize>,
}

#[async_trait]
impl ContentProvider for FaultyProvider {
    fn url(&self) -> &SiteUrl {
        self.inner.url()
    }

    fn root(&self) -> Option<&Path> {
        self.inner.root()
    }

    async fn feature_urls(&self) -> Result<Vec<String>, Error> {
        self.inner.feature_urls().await
    }

    async fn load_feature(&self, url: &str) -> Result<Feature, Error> {
        self.inner.load_feature(url).await
    }

    fn identifier_hint(&self, url: &str) -> Option<VersionedIdentifier> {
        self.inner.identifier_hint(url)
    }

    async fn feature_manifest_ref(&self, feature: &Feature) -> Result<ContentRef, Error> {
        self.inner.feature_manifest_ref(feature).await
    }

    async fn feature_archive_refs(
        &self,
        feature: &Feature,
        progress: &ProgressMonitor,
    ) -> Result<Vec<ContentRef>, Error> {
        self.inner.feature_archive_refs(feature, progress).await
    }

    async fn plugin_archive_refs(
        &self,
        feature: &Feature,
        plugin: &PluginEntry,
        progress: &ProgressMonitor,
    ) -> Result<Vec<ContentRef>, Error> {
        if plugin.identifier.to_string() == self.abort_on {
            tokio::time::sleep(Duration::from_millis(20)).await;
            return Err(InstallError::Aborted {
                reason: "declined by user".to_string(),
            }
            .into());
        }
        tokio::select! {
            () = progress.cancelled() => {
                self.observed_cancel.fetch_add(1, Ordering::SeqCst);
                Err(InstallError::cancelled().into())
            }
            () = tokio::time::sleep(Duration::from_secs(10)) => {
                self.inner.plugin_archive_refs(feature, plugin, progress).await
            }
        }
    }

    async fn data_archive_refs(
        &self,
        feature: &Feature,
        entry: &DataEntry,
        progress: &ProgressMonitor,
    ) -> Result<Vec<ContentRef>, Error> {
        self.inner.data_archive_refs(feature, entry, progress).await
    }

    async fn installed_plugins(&self) -> Result<Vec<VersionedIdentifier>, Error> {
        self.inner.installed_plugins().await
    }

    async fn open_consumer(&self, feature: &Feature) -> Result<Box<dyn ContentConsumer>, Error> {
        self.inner.open_consumer(feature).await
    }
}

#[tokio::test]
async fn abort_in_one_worker_cancels_the_batch() {
    let (src_dir, _, tgt_dir, target) = sites().await;
    let plugins = ["p1_1.0.0", "p2_1.0.0", "p3_1.0.0", "p4_1.0.0", "p5_1.0.0"];
    write_feature(
        src_dir.path(),
        &FeatureSpec {
            plugins: &plugins,
            ..FeatureSpec::new("f", "1.0.0")
        },
        "",
    )
    .await;

    let observed = Arc::new(AtomicUsize::new(0));
    let provider = FaultyProvider {
        inner: DirectoryContentProvider::new(src_dir.path()).await.unwrap(),
        abort_on: "p3_1.0.0",
        observed_cancel: Arc::clone(&observed),
    };
    let source = Site::with_provider(Arc::new(provider), SiteManifest::default())
        .await
        .unwrap();
    let source_ref = reference(&source, "f_1.0.0").await;

    let registry = InstalledPluginRegistry::new();
    let progress = ProgressMonitor::new();
    let ctx = InstallContext::new()
        .with_registry(registry.clone())
        .with_progress(progress.clone())
        .with_parallel_fetches(8);
    let installer = Installer::new(ctx);
    let target_site = InstallTarget::new(Arc::clone(&target), true);
    let err = tokio::time::timeout(
        Duration::from_secs(5),
        installer.install(&source, &source_ref, &target_site),
    )
    .await
    .expect("cancellation must not wait for slow siblings")
    .unwrap_err();

    assert!(err.is_aborted());
    assert!(!progress.is_cancelled());
    assert_eq!(observed.load(Ordering::SeqCst), 4);
    assert!(target.feature_references().is_empty());
    assert!(target.installed_plugins().await.unwrap().is_empty());
    assert!(registry.is_empty());
    assert_eq!(staging_dirs(tgt_dir.path()).await, 0);

    // the abort belonged to that transaction only
    let clean_dir = tempfile::tempdir().unwrap();
    write_feature(
        clean_dir.path(),
        &FeatureSpec {
            plugins: &["q_1.0.0"],
            ..FeatureSpec::new("g", "1.0.0")
        },
        "",
    )
    .await;
    let clean = Site::open(clean_dir.path()).await.unwrap();
    let clean_ref = reference(&clean, "g_1.0.0").await;
    installer
        .install(&clean, &clean_ref, &target_site)
        .await
        .unwrap();
    assert_eq!(
        target.installed_plugins().await.unwrap(),
        vec!["q_1.0.0".parse::<VersionedIdentifier>().unwrap()]
    );
}

#[tokio::test]
async fn session_cancel_reaches_every_transaction() {
    let (src_dir, source, _tgt_dir, target) = sites().await;
    write_feature(
        src_dir.path(),
        &FeatureSpec {
            plugins: &["p_1.0.0"],
            ..FeatureSpec::new("f", "1.0.0")
        },
        "",
    )
    .await;
    let progress = ProgressMonitor::new();
    let installer = Installer::new(InstallContext::new().with_progress(progress.clone()));
    let source_ref = reference(&source, "f_1.0.0").await;

    progress.cancel();
    let err = installer
        .install(&source, &source_ref, &InstallTarget::new(Arc::clone(&target), true))
        .await
        .unwrap_err();
    assert!(err.is_aborted());
    assert!(target.feature_references().is_empty());
}

/// Where a [`FailingTarget`] breaks the commit path
#[derive(Debug, Clone, Copy)]
enum FailAt {
    StorePlugin,
    StoreFeature,
    Commit,
}

/// Directory target whose consumer fails at one step
#[derive(Debug)]
struct FailingTarget {
    inner: DirectoryContentProvider,
    fail_at: FailAt,
}

struct FailingConsumer {
    inner: Box<dyn ContentConsumer>,
    fail_at: FailAt,
}

fn transfer_failed(reference: &str) -> Error {
    InstallError::ContentTransferFailed {
        reference: reference.to_string(),
        message: "disk went away".to_string(),
    }
    .into()
}

#[async_trait]
impl ContentConsumer for FailingConsumer {
    async fn store_feature(&mut self, content: &ContentRef) -> Result<(), Error> {
        self.inner.store_feature(content).await?;
        match self.fail_at {
            FailAt::StoreFeature => Err(transfer_failed(&content.identifier)),
            _ => Ok(()),
        }
    }

    async fn store_plugin(
        &mut self,
        plugin: &PluginEntry,
        content: &ContentRef,
    ) -> Result<(), Error> {
        self.inner.store_plugin(plugin, content).await?;
        match self.fail_at {
            FailAt::StorePlugin => Err(transfer_failed(&content.identifier)),
            _ => Ok(()),
        }
    }

    async fn store_data(&mut self, entry: &DataEntry, content: &ContentRef) -> Result<(), Error> {
        self.inner.store_data(entry, content).await
    }

    async fn commit(self: Box<Self>) -> Result<String, Error> {
        match self.fail_at {
            FailAt::Commit => {
                // a consumer that cannot commit cleans up after itself
                self.inner.abort().await?;
                Err(StorageError::AtomicRenameFailed {
                    message: "rename refused".to_string(),
                }
                .into())
            }
            _ => self.inner.commit().await,
        }
    }

    async fn abort(self: Box<Self>) -> Result<(), Error> {
        self.inner.abort().await
    }
}

#[async_trait]
impl ContentProvider for FailingTarget {
    fn url(&self) -> &SiteUrl {
        self.inner.url()
    }

    fn root(&self) -> Option<&Path> {
        self.inner.root()
    }

    async fn feature_urls(&self) -> Result<Vec<String>, Error> {
        self.inner.feature_urls().await
    }

    async fn load_feature(&self, url: &str) -> Result<Feature, Error> {
        self.inner.load_feature(url).await
    }

    fn identifier_hint(&self, url: &str) -> Option<VersionedIdentifier> {
        self.inner.identifier_hint(url)
    }

    async fn feature_manifest_ref(&self, feature: &Feature) -> Result<ContentRef, Error> {
        self.inner.feature_manifest_ref(feature).await
    }

    async fn feature_archive_refs(
        &self,
        feature: &Feature,
        progress: &ProgressMonitor,
    ) -> Result<Vec<ContentRef>, Error> {
        self.inner.feature_archive_refs(feature, progress).await
    }

    async fn plugin_archive_refs(
        &self,
        feature: &Feature,
        plugin: &PluginEntry,
        progress: &ProgressMonitor,
    ) -> Result<Vec<ContentRef>, Error> {
        self.inner.plugin_archive_refs(feature, plugin, progress).await
    }

    async fn data_archive_refs(
        &self,
        feature: &Feature,
        entry: &DataEntry,
        progress: &ProgressMonitor,
    ) -> Result<Vec<ContentRef>, Error> {
        self.inner.data_archive_refs(feature, entry, progress).await
    }

    async fn installed_plugins(&self) -> Result<Vec<VersionedIdentifier>, Error> {
        self.inner.installed_plugins().await
    }

    async fn open_consumer(&self, feature: &Feature) -> Result<Box<dyn ContentConsumer>, Error> {
        Ok(Box::new(FailingConsumer {
            inner: self.inner.open_consumer(feature).await?,
            fail_at: self.fail_at,
        }))
    }

    async fn remove_plugin(&self, plugin: &VersionedIdentifier) -> Result<(), Error> {
        self.inner.remove_plugin(plugin).await
    }

    async fn remove_feature(&self, url: &str) -> Result<(), Error> {
        self.inner.remove_feature(url).await
    }

    async fn change_stamp(&self) -> Result<i64, Error> {
        self.inner.change_stamp().await
    }
}

/// Fails the last hook before commit
#[derive(Debug)]
struct FailingHandler;

#[async_trait]
impl InstallHandler for FailingHandler {
    async fn complete_install(
        &self,
        _feature: &Feature,
        _consumer: &mut dyn ContentConsumer,
    ) -> Result<(), Error> {
        Err(Error::internal("hook refused"))
    }
}

async fn assert_nothing_committed(target: &Site, root: &Path, registry: &InstalledPluginRegistry) {
    assert!(target.feature_references().is_empty());
    assert!(target.installed_plugins().await.unwrap().is_empty());
    assert!(!root.join("plugins/p_1.0.0").exists());
    assert!(!root.join("features/f_1.0.0").exists());
    assert_eq!(staging_dirs(root).await, 0);
    assert!(registry.is_empty());
}

async fn failing_target(fail_at: FailAt) -> (TempDir, PathBuf, Arc<Site>) {
    let dir = tempfile::tempdir().unwrap();
    let inner = DirectoryContentProvider::new(dir.path()).await.unwrap();
    let root = inner.root().unwrap().to_path_buf();
    let provider = Arc::new(FailingTarget { inner, fail_at });
    let site = Site::with_provider(provider, SiteManifest::default())
        .await
        .unwrap();
    (dir, root, site)
}

#[tokio::test]
async fn failures_while_committing_leave_no_trace() {
    let (src_dir, source, _, _) = sites().await;
    write_feature(
        src_dir.path(),
        &FeatureSpec {
            plugins: &["p_1.0.0"],
            ..FeatureSpec::new("f", "1.0.0")
        },
        "",
    )
    .await;
    let source_ref = reference(&source, "f_1.0.0").await;

    for fail_at in [FailAt::StorePlugin, FailAt::StoreFeature, FailAt::Commit] {
        let (_dir, root, target) = failing_target(fail_at).await;
        let registry = InstalledPluginRegistry::new();
        let ctx = InstallContext::new().with_registry(registry.clone());
        let err = Installer::new(ctx)
            .install(&source, &source_ref, &InstallTarget::new(Arc::clone(&target), true))
            .await
            .unwrap_err();

        match fail_at {
            FailAt::StorePlugin | FailAt::StoreFeature => assert!(
                matches!(err, Error::Install(InstallError::ContentTransferFailed { .. })),
                "{fail_at:?}: {err}"
            ),
            FailAt::Commit => assert!(
                matches!(err, Error::Install(InstallError::CommitFailed { .. })),
                "{err}"
            ),
        }
        assert_nothing_committed(&target, &root, &registry).await;
    }
}

#[tokio::test]
async fn handler_failure_before_commit_rolls_back() {
    let (src_dir, source, tgt_dir, target) = sites().await;
    write_feature(
        src_dir.path(),
        &FeatureSpec {
            plugins: &["p_1.0.0"],
            ..FeatureSpec::new("f", "1.0.0")
        },
        "",
    )
    .await;
    let source_ref = reference(&source, "f_1.0.0").await;

    let registry = InstalledPluginRegistry::new();
    let ctx = InstallContext::new()
        .with_registry(registry.clone())
        .with_handler(Arc::new(FailingHandler));
    let err = Installer::new(ctx)
        .install(&source, &source_ref, &InstallTarget::new(Arc::clone(&target), true))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Install(InstallError::HandlerFailed { .. })
    ));
    assert_nothing_committed(&target, tgt_dir.path(), &registry).await;
}
