//! Content references and the provider/consumer capabilities

use async_trait::async_trait;
use fman_errors::{Error, InstallError, SiteError, StorageError};
use fman_events::ProgressMonitor;
use fman_types::{DataEntry, Feature, PluginEntry, SiteUrl, VersionedIdentifier};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncRead;

/// Where the bytes of a content reference live
#[derive(Clone)]
pub enum ContentLocation {
    File(PathBuf),
    Memory(Arc<[u8]>),
}

impl fmt::Debug for ContentLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Memory(bytes) => write!(f, "Memory({} bytes)", bytes.len()),
        }
    }
}

/// A named byte stream produced by a content provider
#[derive(Debug, Clone)]
pub struct ContentRef {
    /// Site-relative path, also the key for declared digests
    pub identifier: String,
    /// Path relative to the owning unit (feature or plugin directory)
    pub name: String,
    pub location: ContentLocation,
    pub size_hint: Option<u64>,
}

/// Boxed async reader returned by [`ContentRef::open`]
pub type ContentStream = Box<dyn AsyncRead + Send + Unpin>;

impl ContentRef {
    pub fn file(identifier: impl Into<String>, name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            location: ContentLocation::File(path),
            size_hint: None,
        }
    }

    pub fn memory(identifier: impl Into<String>, name: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            location: ContentLocation::Memory(Arc::from(bytes)),
            size_hint: Some(bytes.len() as u64),
        }
    }

    #[must_use]
    pub fn with_size_hint(mut self, size: u64) -> Self {
        self.size_hint = Some(size);
        self
    }

    /// Open the content as a byte stream
    ///
    /// # Errors
    ///
    /// Returns `InstallError::ContentTransferFailed` when a file cannot be opened.
    pub async fn open(&self) -> Result<ContentStream, Error> {
        match &self.location {
            ContentLocation::File(path) => {
                let file = tokio::fs::File::open(path).await.map_err(|e| {
                    InstallError::ContentTransferFailed {
                        reference: self.identifier.clone(),
                        message: format!("{}: {e}", path.display()),
                    }
                })?;
                Ok(Box::new(file))
            }
            ContentLocation::Memory(bytes) => Ok(Box::new(std::io::Cursor::new(Arc::clone(bytes)))),
        }
    }
}

/// Source side of a site: turns features, plugins and data entries into
/// content references, and lists what is installed.
#[async_trait]
pub trait ContentProvider: Send + Sync + fmt::Debug {
    fn url(&self) -> &SiteUrl;

    /// Local root directory, when the site lives on the filesystem
    fn root(&self) -> Option<&Path> {
        None
    }

    /// Manifest URLs of every feature present on the site
    async fn feature_urls(&self) -> Result<Vec<String>, Error>;

    /// Materialize the feature behind a manifest URL
    async fn load_feature(&self, url: &str) -> Result<Feature, Error>;

    /// Identifier encoded in a manifest URL, without reading the manifest
    fn identifier_hint(&self, _url: &str) -> Option<VersionedIdentifier> {
        None
    }

    async fn feature_manifest_ref(&self, feature: &Feature) -> Result<ContentRef, Error>;

    /// Feature-level content, manifest included
    async fn feature_archive_refs(
        &self,
        feature: &Feature,
        progress: &ProgressMonitor,
    ) -> Result<Vec<ContentRef>, Error>;

    async fn plugin_archive_refs(
        &self,
        feature: &Feature,
        plugin: &PluginEntry,
        progress: &ProgressMonitor,
    ) -> Result<Vec<ContentRef>, Error>;

    async fn data_archive_refs(
        &self,
        feature: &Feature,
        entry: &DataEntry,
        progress: &ProgressMonitor,
    ) -> Result<Vec<ContentRef>, Error>;

    /// Plugins whose content is present on the site
    async fn installed_plugins(&self) -> Result<Vec<VersionedIdentifier>, Error>;

    /// Open a staging consumer for writing `feature` into this site
    async fn open_consumer(&self, _feature: &Feature) -> Result<Box<dyn ContentConsumer>, Error> {
        Err(SiteError::ReadOnly {
            url: self.url().to_string(),
        }
        .into())
    }

    async fn remove_plugin(&self, _plugin: &VersionedIdentifier) -> Result<(), Error> {
        Err(SiteError::ReadOnly {
            url: self.url().to_string(),
        }
        .into())
    }

    async fn remove_feature(&self, _url: &str) -> Result<(), Error> {
        Err(SiteError::ReadOnly {
            url: self.url().to_string(),
        }
        .into())
    }

    /// Modification stamp (ms) of the installed content
    async fn change_stamp(&self) -> Result<i64, Error> {
        Ok(0)
    }
}

/// Write side of a site for a single feature install.
///
/// Nothing stored through a consumer is visible on the site until
/// [`ContentConsumer::commit`] succeeds; [`ContentConsumer::abort`] discards it.
#[async_trait]
pub trait ContentConsumer: Send {
    async fn store_feature(&mut self, content: &ContentRef) -> Result<(), Error>;

    async fn store_plugin(&mut self, plugin: &PluginEntry, content: &ContentRef)
        -> Result<(), Error>;

    async fn store_data(&mut self, entry: &DataEntry, content: &ContentRef) -> Result<(), Error>;

    /// Make staged content visible and return the feature manifest URL
    async fn commit(self: Box<Self>) -> Result<String, Error>;

    /// Undo everything staged or moved so far
    async fn abort(self: Box<Self>) -> Result<(), Error>;
}

/// Reject content paths that would escape their unit directory
pub(crate) fn checked_relative(name: &str) -> Result<&Path, Error> {
    let path = Path::new(name);
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|c| !matches!(c, std::path::Component::Normal(_)));
    if escapes || name.is_empty() {
        return Err(StorageError::PermissionDenied {
            path: name.to_string(),
        }
        .into());
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn memory_refs_stream_their_bytes() {
        let content = ContentRef::memory("plugins/p_1.0.0/a.jar", "a.jar", b"abc");
        let mut buf = Vec::new();
        content.open().await.unwrap().read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"abc");
        assert_eq!(content.size_hint, Some(3));
    }

    #[tokio::test]
    async fn missing_file_is_transfer_failure() {
        let content = ContentRef::file("x", "x", PathBuf::from("/nonexistent/fman/x"));
        let err = content.open().await.err().unwrap();
        assert!(matches!(
            err,
            Error::Install(InstallError::ContentTransferFailed { .. })
        ));
    }

    #[test]
    fn relative_paths_are_checked() {
        assert!(checked_relative("lib/a.jar").is_ok());
        assert!(checked_relative("../a.jar").is_err());
        assert!(checked_relative("/etc/passwd").is_err());
        assert!(checked_relative("").is_err());
    }
}
