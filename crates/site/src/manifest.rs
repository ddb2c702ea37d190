//! TOML manifests for directory sites
//!
//! `features/<id>_<version>/feature.toml` holds a serialized [`Feature`];
//! an optional `site.toml` at the site root carries the label, categories
//! and archive map.

use fman_errors::{Error, SiteError};
use fman_types::Feature;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

pub const FEATURE_MANIFEST: &str = "feature.toml";
pub const SITE_MANIFEST: &str = "site.toml";

/// Site-level metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub categories: BTreeSet<String>,
    /// Archive id to URL
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub archives: BTreeMap<String, String>,
    /// Feature key to the categories it is listed under
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub features: BTreeMap<String, Vec<String>>,
}

/// Parse a feature manifest from TOML text
///
/// # Errors
///
/// Returns `SiteError::ManifestParse` for malformed manifests, including patch
/// imports that do not target a feature with a perfect match.
pub fn parse_feature(path: &Path, contents: &str) -> Result<Feature, Error> {
    let feature: Feature = toml::from_str(contents).map_err(|e| SiteError::ManifestParse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    if let Some(bad) = feature.imports.iter().find(|i| {
        i.patch
            && (i.kind != fman_types::ImportKind::Feature
                || i.match_rule != fman_types::MatchRule::Perfect)
    }) {
        return Err(SiteError::ManifestParse {
            path: path.display().to_string(),
            message: format!(
                "patch import of {} must be a feature import with a perfect match",
                bad.identifier
            ),
        }
        .into());
    }
    Ok(feature)
}

/// Read `feature.toml`
///
/// # Errors
///
/// Returns `SiteError::FeatureNotFound` when the file is missing and
/// `SiteError::ManifestParse` when it does not parse.
pub async fn read_feature(path: &Path) -> Result<Feature, Error> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|_| SiteError::FeatureNotFound {
            site: path
                .parent()
                .and_then(Path::parent)
                .and_then(Path::parent)
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            feature: path.display().to_string(),
        })?;
    parse_feature(path, &contents)
}

/// Serialize a feature manifest
///
/// # Errors
///
/// Returns an error if TOML serialization fails.
pub fn feature_to_toml(feature: &Feature) -> Result<String, Error> {
    toml::to_string_pretty(feature).map_err(|e| Error::internal(format!("manifest encode: {e}")))
}

/// Read `site.toml`, defaulting when absent
///
/// # Errors
///
/// Returns `SiteError::ManifestParse` when the file exists but is malformed.
pub async fn read_site_manifest(root: &Path) -> Result<SiteManifest, Error> {
    let path = root.join(SITE_MANIFEST);
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => toml::from_str(&contents).map_err(|e| {
            SiteError::ManifestParse {
                path: path.display().to_string(),
                message: e.to_string(),
            }
            .into()
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SiteManifest::default()),
        Err(e) => Err(Error::io_with_path(&e, &path)),
    }
}
