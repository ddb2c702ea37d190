//! Directory-backed content provider
//!
//! Layout of a local site:
//!
//! ```text
//! <root>/site.toml                         optional metadata
//! <root>/features/<id>_<version>/feature.toml
//! <root>/features/<id>_<version>/<files>   feature content and data entries
//! <root>/plugins/<id>_<version>/<files>    plugin content
//! ```
//!
//! Writes go through a [`DirectoryConsumer`] that stages files under
//! `<root>/.staging-<uuid>/` and moves them into place on commit.

use async_trait::async_trait;
use fman_errors::{Error, InstallError, SiteError, StorageError};
use fman_events::ProgressMonitor;
use fman_types::{DataEntry, Feature, PluginEntry, SiteUrl, VersionedIdentifier};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::content::{checked_relative, ContentConsumer, ContentProvider, ContentRef};
use crate::manifest::{read_feature, FEATURE_MANIFEST};

pub const FEATURES_DIR: &str = "features";
pub const PLUGINS_DIR: &str = "plugins";
const STAGING_PREFIX: &str = ".staging-";

/// Content provider for a site rooted at a local directory
#[derive(Debug, Clone)]
pub struct DirectoryContentProvider {
    root: PathBuf,
    url: SiteUrl,
}

impl DirectoryContentProvider {
    /// Create a provider for `root`, which must exist
    ///
    /// # Errors
    ///
    /// Returns `SiteError::NotFound` when `root` is not a directory.
    pub async fn new(root: &Path) -> Result<Self, Error> {
        let root = fs::canonicalize(root)
            .await
            .map_err(|_| SiteError::NotFound {
                url: root.display().to_string(),
            })?;
        if !fs::metadata(&root).await.is_ok_and(|m| m.is_dir()) {
            return Err(SiteError::NotFound {
                url: root.display().to_string(),
            }
            .into());
        }
        let url = SiteUrl::from_path(&root);
        Ok(Self { root, url })
    }

    /// Manifest URL for a feature key, relative to the site root
    #[must_use]
    pub fn feature_url(identifier: &VersionedIdentifier) -> String {
        format!("{FEATURES_DIR}/{}/{FEATURE_MANIFEST}", identifier.key())
    }

    fn feature_dir(&self, identifier: &VersionedIdentifier) -> PathBuf {
        self.root.join(FEATURES_DIR).join(identifier.key())
    }

    fn plugin_dir(&self, identifier: &VersionedIdentifier) -> PathBuf {
        self.root.join(PLUGINS_DIR).join(identifier.key())
    }

    fn resolve_url(&self, url: &str) -> Result<PathBuf, Error> {
        Ok(self.root.join(checked_relative(url)?))
    }

    /// Content refs for every file below `dir`, named relative to `dir`
    async fn refs_under(
        &self,
        dir: &Path,
        skip: impl Fn(&str) -> bool + Send,
    ) -> Result<Vec<ContentRef>, Error> {
        let mut refs = Vec::new();
        for path in walk_files(dir).await? {
            let Ok(rel) = path.strip_prefix(dir) else {
                continue;
            };
            let name = rel.to_string_lossy().replace('\\', "/");
            if skip(&name) {
                continue;
            }
            let site_rel = path
                .strip_prefix(&self.root)
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_else(|_| name.clone());
            let size = fs::metadata(&path).await.map(|m| m.len()).ok();
            let mut content = ContentRef::file(site_rel, name, path);
            content.size_hint = size;
            refs.push(content);
        }
        refs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(refs)
    }
}

#[async_trait]
impl ContentProvider for DirectoryContentProvider {
    fn url(&self) -> &SiteUrl {
        &self.url
    }

    fn root(&self) -> Option<&Path> {
        Some(&self.root)
    }

    async fn feature_urls(&self) -> Result<Vec<String>, Error> {
        let mut urls = Vec::new();
        for key in list_dirs(&self.root.join(FEATURES_DIR)).await? {
            let manifest = self.root.join(FEATURES_DIR).join(&key).join(FEATURE_MANIFEST);
            if fs::try_exists(&manifest).await.unwrap_or(false) {
                urls.push(format!("{FEATURES_DIR}/{key}/{FEATURE_MANIFEST}"));
            }
        }
        urls.sort();
        Ok(urls)
    }

    async fn load_feature(&self, url: &str) -> Result<Feature, Error> {
        let path = self.resolve_url(url)?;
        let mut feature = read_feature(&path).await.map_err(|e| match e {
            Error::Site(SiteError::FeatureNotFound { .. }) => SiteError::FeatureNotFound {
                site: self.url.to_string(),
                feature: url.to_string(),
            }
            .into(),
            other => other,
        })?;
        feature.set_site(self.url.clone())?;
        Ok(feature)
    }

    fn identifier_hint(&self, url: &str) -> Option<VersionedIdentifier> {
        url.strip_prefix(FEATURES_DIR)?
            .trim_start_matches('/')
            .split('/')
            .next()?
            .parse()
            .ok()
    }

    async fn feature_manifest_ref(&self, feature: &Feature) -> Result<ContentRef, Error> {
        let path = self.feature_dir(&feature.identifier).join(FEATURE_MANIFEST);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(InstallError::ManifestMissing {
                url: path.display().to_string(),
            }
            .into());
        }
        let site_rel = format!(
            "{FEATURES_DIR}/{}/{FEATURE_MANIFEST}",
            feature.identifier.key()
        );
        Ok(ContentRef::file(site_rel, FEATURE_MANIFEST, path))
    }

    async fn feature_archive_refs(
        &self,
        feature: &Feature,
        progress: &ProgressMonitor,
    ) -> Result<Vec<ContentRef>, Error> {
        progress.check_cancelled()?;
        let data_ids: Vec<&str> = feature.data_entries.iter().map(|d| d.id.as_str()).collect();
        let refs = self
            .refs_under(&self.feature_dir(&feature.identifier), |name| {
                data_ids.contains(&name)
            })
            .await?;
        if !refs.iter().any(|r| r.name == FEATURE_MANIFEST) {
            return Err(InstallError::ManifestMissing {
                url: Self::feature_url(&feature.identifier),
            }
            .into());
        }
        Ok(refs)
    }

    async fn plugin_archive_refs(
        &self,
        _feature: &Feature,
        plugin: &PluginEntry,
        progress: &ProgressMonitor,
    ) -> Result<Vec<ContentRef>, Error> {
        progress.check_cancelled()?;
        let dir = self.plugin_dir(&plugin.identifier);
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            return Err(InstallError::PluginNotFound {
                plugin: plugin.identifier.to_string(),
            }
            .into());
        }
        self.refs_under(&dir, |_| false).await
    }

    async fn data_archive_refs(
        &self,
        feature: &Feature,
        entry: &DataEntry,
        progress: &ProgressMonitor,
    ) -> Result<Vec<ContentRef>, Error> {
        progress.check_cancelled()?;
        let path = self
            .feature_dir(&feature.identifier)
            .join(checked_relative(&entry.id)?);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(InstallError::ContentTransferFailed {
                reference: entry.id.clone(),
                message: format!("data archive missing: {}", path.display()),
            }
            .into());
        }
        let site_rel = format!("{FEATURES_DIR}/{}/{}", feature.identifier.key(), entry.id);
        Ok(vec![ContentRef::file(site_rel, entry.id.clone(), path)])
    }

    async fn installed_plugins(&self) -> Result<Vec<VersionedIdentifier>, Error> {
        let mut plugins: Vec<VersionedIdentifier> = list_dirs(&self.root.join(PLUGINS_DIR))
            .await?
            .into_iter()
            .filter_map(|key| key.parse().ok())
            .collect();
        plugins.sort();
        Ok(plugins)
    }

    async fn open_consumer(&self, feature: &Feature) -> Result<Box<dyn ContentConsumer>, Error> {
        let staging = self
            .root
            .join(format!("{STAGING_PREFIX}{}", Uuid::new_v4()));
        fs::create_dir_all(&staging).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                Error::from(InstallError::SiteNotWritable {
                    site: self.url.to_string(),
                })
            } else {
                Error::io_with_path(&e, &staging)
            }
        })?;
        tracing::debug!(staging = %staging.display(), feature = %feature.identifier, "opened consumer");
        Ok(Box::new(DirectoryConsumer {
            root: self.root.clone(),
            staging,
            feature: feature.identifier.clone(),
            staged: Vec::new(),
        }))
    }

    async fn remove_plugin(&self, plugin: &VersionedIdentifier) -> Result<(), Error> {
        remove_dir_if_exists(&self.plugin_dir(plugin)).await
    }

    async fn remove_feature(&self, url: &str) -> Result<(), Error> {
        let manifest = self.resolve_url(url)?;
        match manifest.parent() {
            Some(dir) if dir.starts_with(self.root.join(FEATURES_DIR)) => {
                remove_dir_if_exists(dir).await
            }
            _ => Err(SiteError::FeatureNotFound {
                site: self.url.to_string(),
                feature: url.to_string(),
            }
            .into()),
        }
    }

    async fn change_stamp(&self) -> Result<i64, Error> {
        let mut stamp = 0i64;
        for dir in [FEATURES_DIR, PLUGINS_DIR] {
            let path = self.root.join(dir);
            let mut candidates = vec![path.clone()];
            candidates.extend(
                list_dirs(&path)
                    .await?
                    .into_iter()
                    .map(|name| path.join(name)),
            );
            for candidate in candidates {
                if let Ok(meta) = fs::metadata(&candidate).await {
                    if let Ok(modified) = meta.modified() {
                        let ms = modified
                            .duration_since(UNIX_EPOCH)
                            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
                            .unwrap_or(0);
                        stamp = stamp.max(ms);
                    }
                }
            }
        }
        Ok(stamp)
    }
}

/// Staging writer for one feature install into a directory site
#[derive(Debug)]
pub struct DirectoryConsumer {
    root: PathBuf,
    staging: PathBuf,
    feature: VersionedIdentifier,
    /// Site-relative paths written into staging
    staged: Vec<PathBuf>,
}

impl DirectoryConsumer {
    async fn stage(&mut self, site_rel: PathBuf, content: &ContentRef) -> Result<(), Error> {
        let dest = self.staging.join(&site_rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io_with_path(&e, parent))?;
        }
        let mut reader = content.open().await?;
        let mut file = fs::File::create(&dest)
            .await
            .map_err(|e| StorageError::from_io_with_path(&e, &dest))?;
        tokio::io::copy(&mut reader, &mut file).await.map_err(|e| {
            InstallError::ContentTransferFailed {
                reference: content.identifier.clone(),
                message: e.to_string(),
            }
        })?;
        file.flush().await?;
        if !self.staged.contains(&site_rel) {
            self.staged.push(site_rel);
        }
        Ok(())
    }

    /// Undo moves already performed by a failed commit, then drop the
    /// directories the commit created
    async fn roll_back(&self, moved: &[(PathBuf, Option<PathBuf>)], created: &[PathBuf]) {
        for (dest, backup) in moved.iter().rev() {
            if let Err(e) = fs::remove_file(dest).await {
                tracing::warn!(path = %dest.display(), error = %e, "rollback: remove failed");
            }
            if let Some(backup) = backup {
                if let Err(e) = fs::rename(backup, dest).await {
                    tracing::warn!(path = %dest.display(), error = %e, "rollback: restore failed");
                }
            }
        }
        for dir in created.iter().rev() {
            if let Err(e) = remove_dir_if_exists(dir).await {
                tracing::warn!(path = %dir.display(), error = %e, "rollback: directory not removed");
            }
        }
    }
}

#[async_trait]
impl ContentConsumer for DirectoryConsumer {
    async fn store_feature(&mut self, content: &ContentRef) -> Result<(), Error> {
        let rel = Path::new(FEATURES_DIR)
            .join(self.feature.key())
            .join(checked_relative(&content.name)?);
        self.stage(rel, content).await
    }

    async fn store_plugin(
        &mut self,
        plugin: &PluginEntry,
        content: &ContentRef,
    ) -> Result<(), Error> {
        let rel = Path::new(PLUGINS_DIR)
            .join(plugin.identifier.key())
            .join(checked_relative(&content.name)?);
        self.stage(rel, content).await
    }

    async fn store_data(&mut self, entry: &DataEntry, content: &ContentRef) -> Result<(), Error> {
        checked_relative(&entry.id)?;
        let rel = Path::new(FEATURES_DIR)
            .join(self.feature.key())
            .join(checked_relative(&content.name)?);
        self.stage(rel, content).await
    }

    async fn commit(self: Box<Self>) -> Result<String, Error> {
        let backups = self.staging.join(".replaced");
        let mut moved: Vec<(PathBuf, Option<PathBuf>)> = Vec::new();
        let mut created: Vec<PathBuf> = Vec::new();

        for rel in &self.staged {
            let src = self.staging.join(rel);
            let dest = self.root.join(rel);
            let step: Result<Option<PathBuf>, std::io::Error> = async {
                if let Some(parent) = dest.parent() {
                    let top = outermost_missing(&self.root, parent).await;
                    fs::create_dir_all(parent).await?;
                    created.extend(top);
                }
                let backup = if fs::try_exists(&dest).await.unwrap_or(false) {
                    let backup = backups.join(rel);
                    if let Some(parent) = backup.parent() {
                        fs::create_dir_all(parent).await?;
                    }
                    fs::rename(&dest, &backup).await?;
                    Some(backup)
                } else {
                    None
                };
                match fs::rename(&src, &dest).await {
                    Ok(()) => Ok(backup),
                    Err(e) => {
                        if let Some(backup) = &backup {
                            if let Err(restore) = fs::rename(backup, &dest).await {
                                tracing::warn!(path = %dest.display(), error = %restore, "commit: restore failed");
                            }
                        }
                        Err(e)
                    }
                }
            }
            .await;

            match step {
                Ok(backup) => moved.push((dest, backup)),
                Err(e) => {
                    self.roll_back(&moved, &created).await;
                    if let Err(cleanup) = remove_dir_if_exists(&self.staging).await {
                        tracing::warn!(staging = %self.staging.display(), error = %cleanup, "staging cleanup failed");
                    }
                    return Err(StorageError::AtomicRenameFailed {
                        message: format!("{}: {e}", dest.display()),
                    }
                    .into());
                }
            }
        }

        if let Err(e) = fs::remove_dir_all(&self.staging).await {
            tracing::warn!(staging = %self.staging.display(), error = %e, "staging cleanup failed");
        }
        Ok(DirectoryContentProvider::feature_url(&self.feature))
    }

    async fn abort(self: Box<Self>) -> Result<(), Error> {
        remove_dir_if_exists(&self.staging).await
    }
}

/// Outermost ancestor of `dir` below `root` that does not exist yet, which
/// is the top of what `create_dir_all(dir)` would create
async fn outermost_missing(root: &Path, dir: &Path) -> Option<PathBuf> {
    let mut missing = None;
    let mut current = dir;
    while current != root && current.starts_with(root) {
        if fs::try_exists(current).await.unwrap_or(true) {
            break;
        }
        missing = Some(current.to_path_buf());
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }
    missing
}

async fn list_dirs(dir: &Path) -> Result<Vec<String>, Error> {
    let mut names = Vec::new();
    let mut rd = match fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
        Err(e) => return Err(Error::io_with_path(&e, dir)),
    };
    while let Some(entry) = rd.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    names.push(name.to_string());
                }
            }
        }
    }
    Ok(names)
}

async fn walk_files(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let mut rd = match fs::read_dir(&current).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(Error::io_with_path(&e, &current)),
        };
        while let Some(entry) = rd.next_entry().await? {
            let kind = entry.file_type().await?;
            if kind.is_dir() {
                pending.push(entry.path());
            } else if kind.is_file() {
                files.push(entry.path());
            }
        }
    }
    Ok(files)
}

async fn remove_dir_if_exists(dir: &Path) -> Result<(), Error> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::from_io_with_path(&e, dir).into()),
    }
}
