//! In-memory feature model

use crate::identifier::{MatchRule, VersionedIdentifier};
use crate::platform::{Environment, PlatformFilters};
use fman_errors::SiteError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// URL of a site, `file://<absolute path>` for local directories
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteUrl(String);

impl SiteUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// URL for a local directory
    #[must_use]
    pub fn from_path(path: &std::path::Path) -> Self {
        Self(format!("file://{}", path.display()))
    }

    /// Local directory for a `file://` URL
    #[must_use]
    pub fn to_path(&self) -> Option<std::path::PathBuf> {
        self.0.strip_prefix("file://").map(std::path::PathBuf::from)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A plugin declared by a feature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginEntry {
    pub identifier: VersionedIdentifier,
    #[serde(default)]
    pub fragment: bool,
    #[serde(flatten)]
    pub filters: PlatformFilters,
    #[serde(default)]
    pub download_size: Option<u64>,
    #[serde(default)]
    pub install_size: Option<u64>,
}

impl PartialEq for PluginEntry {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
    }
}

impl Eq for PluginEntry {}

impl std::hash::Hash for PluginEntry {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.identifier.hash(state);
    }
}

/// A non-plugin data archive declared by a feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataEntry {
    pub id: String,
    #[serde(flatten)]
    pub filters: PlatformFilters,
    #[serde(default)]
    pub download_size: Option<u64>,
}

/// What an import requires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportKind {
    Feature,
    #[default]
    Plugin,
}

/// A prerequisite declared by a feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    pub identifier: VersionedIdentifier,
    #[serde(default)]
    pub match_rule: MatchRule,
    #[serde(default)]
    pub kind: ImportKind,
    /// The importing feature patches the imported one
    #[serde(default)]
    pub patch: bool,
}

impl Import {
    /// Whether an installed identifier satisfies this import
    #[must_use]
    pub fn is_satisfied_by(&self, candidate: &VersionedIdentifier) -> bool {
        self.match_rule.matches(candidate, &self.identifier)
    }
}

/// Where an included feature is looked up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchLocation {
    /// Any configured site
    #[default]
    Root,
    /// The site of the including feature
    #[serde(rename = "self")]
    SelfSite,
}

/// A nested feature included by another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludedFeatureRef {
    pub identifier: VersionedIdentifier,
    #[serde(default)]
    pub match_rule: MatchRule,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub search_location: SearchLocation,
}

/// A versioned bundle of plugins and data files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub identifier: VersionedIdentifier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub plugin_entries: Vec<PluginEntry>,
    #[serde(default)]
    pub data_entries: Vec<DataEntry>,
    #[serde(default)]
    pub imports: Vec<Import>,
    #[serde(default)]
    pub included: Vec<IncludedFeatureRef>,
    #[serde(default)]
    pub primary: bool,
    /// Declared BLAKE3 digests (hex), keyed by site-relative content path
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub digests: BTreeMap<String, String>,
    #[serde(skip)]
    site: Option<SiteUrl>,
}

impl PartialEq for Feature {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
    }
}

impl Eq for Feature {}

impl Feature {
    pub fn new(identifier: VersionedIdentifier) -> Self {
        Self {
            identifier,
            label: None,
            plugin_entries: Vec::new(),
            data_entries: Vec::new(),
            imports: Vec::new(),
            included: Vec::new(),
            primary: false,
            digests: BTreeMap::new(),
            site: None,
        }
    }

    /// The site this feature was loaded from
    #[must_use]
    pub fn site(&self) -> Option<&SiteUrl> {
        self.site.as_ref()
    }

    /// Attach the feature to a site.
    ///
    /// # Errors
    ///
    /// Returns `SiteError::FeatureAlreadyParented` when the feature already
    /// belongs to a different site.
    pub fn set_site(&mut self, site: SiteUrl) -> Result<(), SiteError> {
        match &self.site {
            Some(existing) if *existing != site => Err(SiteError::FeatureAlreadyParented {
                feature: self.identifier.to_string(),
                site: existing.to_string(),
            }),
            _ => {
                self.site = Some(site);
                Ok(())
            }
        }
    }

    /// A feature is a patch when it imports another feature with `patch = true`
    #[must_use]
    pub fn is_patch(&self) -> bool {
        self.imports.iter().any(|i| i.patch)
    }

    /// Whether this feature patches `target`
    #[must_use]
    pub fn patches(&self, target: &VersionedIdentifier) -> bool {
        self.imports
            .iter()
            .any(|i| i.patch && i.kind == ImportKind::Feature && i.is_satisfied_by(target))
    }

    /// Plugin entries applicable to the environment
    pub fn plugins_for<'a>(&'a self, env: &'a Environment) -> impl Iterator<Item = &'a PluginEntry> {
        self.plugin_entries
            .iter()
            .filter(move |p| env.matches(&p.filters))
    }

    /// Data entries applicable to the environment
    pub fn data_for<'a>(&'a self, env: &'a Environment) -> impl Iterator<Item = &'a DataEntry> {
        self.data_entries.iter().filter(move |d| env.matches(&d.filters))
    }

    /// Included feature declaration matching `child`, if any
    #[must_use]
    pub fn included_entry_for(&self, child: &VersionedIdentifier) -> Option<&IncludedFeatureRef> {
        self.included
            .iter()
            .find(|inc| inc.match_rule.matches(child, &inc.identifier))
    }

    /// Sum of declared download sizes
    #[must_use]
    pub fn download_size(&self) -> u64 {
        self.plugin_entries
            .iter()
            .filter_map(|p| p.download_size)
            .chain(self.data_entries.iter().filter_map(|d| d.download_size))
            .sum()
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{label} ({})", self.identifier),
            None => write!(f, "{}", self.identifier),
        }
    }
}
