//! Install handler hooks
//!
//! A feature may ship content the installer does not understand (data
//! entries). The handler receives it during the fetch phase and gets a chance
//! to stage it through the open consumer before commit.

use async_trait::async_trait;
use dashmap::DashMap;
use fman_errors::Error;
use fman_site::{ContentConsumer, ContentRef};
use fman_types::{DataEntry, Feature, PluginEntry, VersionedIdentifier};
use std::fmt;
use std::sync::Arc;

/// Lifecycle hooks invoked by the installer and the configuration layer.
///
/// One handler is shared by a whole install tree, so implementations key any
/// state by feature identifier.
#[async_trait]
pub trait InstallHandler: Send + Sync + fmt::Debug {
    async fn installation_started(&self, _feature: &Feature) -> Result<(), Error> {
        Ok(())
    }

    async fn plugins_downloaded(
        &self,
        _feature: &Feature,
        _plugins: &[PluginEntry],
    ) -> Result<(), Error> {
        Ok(())
    }

    async fn non_plugin_data_downloaded(
        &self,
        _feature: &Feature,
        _entry: &DataEntry,
        _content: Vec<ContentRef>,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Last chance to stage content before commit
    async fn complete_install(
        &self,
        _feature: &Feature,
        _consumer: &mut dyn ContentConsumer,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Called exactly once per started install
    async fn completed(&self, _feature: &Feature, _success: bool) {}

    async fn configure(&self, _feature: &Feature) -> Result<(), Error> {
        Ok(())
    }

    async fn unconfigure(&self, _feature: &Feature) -> Result<(), Error> {
        Ok(())
    }
}

/// Stages data entries alongside the feature content
#[derive(Debug, Clone, Default)]
pub struct DefaultInstallHandler {
    pending: Arc<DashMap<VersionedIdentifier, Vec<(DataEntry, ContentRef)>>>,
}

impl DefaultInstallHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Data references waiting for `feature` to complete
    #[must_use]
    pub fn pending_for(&self, feature: &VersionedIdentifier) -> usize {
        self.pending.get(feature).map_or(0, |p| p.len())
    }
}

#[async_trait]
impl InstallHandler for DefaultInstallHandler {
    async fn non_plugin_data_downloaded(
        &self,
        feature: &Feature,
        entry: &DataEntry,
        content: Vec<ContentRef>,
    ) -> Result<(), Error> {
        self.pending
            .entry(feature.identifier.clone())
            .or_default()
            .extend(content.into_iter().map(|c| (entry.clone(), c)));
        Ok(())
    }

    async fn complete_install(
        &self,
        feature: &Feature,
        consumer: &mut dyn ContentConsumer,
    ) -> Result<(), Error> {
        let Some((_, staged)) = self.pending.remove(&feature.identifier) else {
            return Ok(());
        };
        for (entry, content) in &staged {
            consumer.store_data(entry, content).await?;
        }
        Ok(())
    }

    async fn completed(&self, feature: &Feature, _success: bool) {
        self.pending.remove(&feature.identifier);
    }
}
