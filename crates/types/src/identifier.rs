//! Versioned identifiers and import match rules

use fman_errors::VersionError;
use semver::{BuildMetadata, Version};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a feature or plugin: an id plus a version.
///
/// Versions are parsed leniently: missing minor/service segments default to
/// zero and a fourth dotted segment is kept as a qualifier (stored as semver
/// build metadata), so `2.1` reads as `2.1.0` and `2.1.0.v2024` as `2.1.0+v2024`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionedIdentifier {
    pub id: String,
    #[serde(with = "lenient_version")]
    pub version: Version,
}

impl VersionedIdentifier {
    pub fn new(id: impl Into<String>, version: Version) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }

    /// Build an identifier from an id and a lenient version string
    ///
    /// # Errors
    ///
    /// Returns `VersionError` when the id is empty or the version does not parse.
    pub fn parse(id: &str, version: &str) -> Result<Self, VersionError> {
        let id = id.trim();
        if id.is_empty() || id.contains(char::is_whitespace) {
            return Err(VersionError::InvalidIdentifier {
                input: id.to_string(),
            });
        }
        Ok(Self::new(id, parse_version(version)?))
    }

    /// Same id, any version
    #[must_use]
    pub fn is_same_id(&self, other: &Self) -> bool {
        self.id == other.id
    }

    /// Directory-safe key, `<id>_<version>`
    #[must_use]
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for VersionedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.id, format_version(&self.version))
    }
}

impl FromStr for VersionedIdentifier {
    type Err = VersionError;

    /// Parses `<id>_<version>`; the version follows the last underscore.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, version) = s
            .rsplit_once('_')
            .ok_or_else(|| VersionError::InvalidIdentifier {
                input: s.to_string(),
            })?;
        Self::parse(id, version)
    }
}

/// Parse a version leniently (`1`, `1.2`, `1.2.3`, `1.2.3.qualifier`, `1.2.3-pre`)
///
/// # Errors
///
/// Returns `VersionError::InvalidVersion` for non-numeric segments.
pub fn parse_version(input: &str) -> Result<Version, VersionError> {
    let input = input.trim();
    let invalid = || VersionError::InvalidVersion {
        input: input.to_string(),
    };
    if input.is_empty() {
        return Err(invalid());
    }
    if let Ok(v) = Version::parse(input) {
        return Ok(v);
    }

    let mut parts = input.splitn(4, '.');
    let mut numbers = [0u64; 3];
    for (i, slot) in numbers.iter_mut().enumerate() {
        match parts.next() {
            Some(part) => *slot = part.parse().map_err(|_| invalid())?,
            None if i == 0 => return Err(invalid()),
            None => break,
        }
    }
    let mut version = Version::new(numbers[0], numbers[1], numbers[2]);
    if let Some(qualifier) = parts.next() {
        let cleaned: String = qualifier
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        version.build = BuildMetadata::new(&cleaned).map_err(|_| invalid())?;
    }
    Ok(version)
}

/// Render a version the way it is written in manifests
#[must_use]
pub fn format_version(version: &Version) -> String {
    if version.build.is_empty() || !version.pre.is_empty() {
        return version.to_string();
    }
    format!(
        "{}.{}.{}.{}",
        version.major, version.minor, version.patch, version.build
    )
}

/// How a candidate version satisfies a declared base version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchRule {
    /// Exact id and version
    #[default]
    Perfect,
    /// Same major and minor, candidate not older
    Equivalent,
    /// Same major, candidate not older
    Compatible,
    /// Candidate not older
    GreaterOrEqual,
    /// Candidate id starts with the base id, candidate not older
    Prefix,
}

impl MatchRule {
    /// Whether `candidate` satisfies a constraint declared against `base`
    #[must_use]
    pub fn matches(self, candidate: &VersionedIdentifier, base: &VersionedIdentifier) -> bool {
        let c = &candidate.version;
        let b = &base.version;
        match self {
            Self::Perfect => candidate == base,
            Self::Equivalent => {
                candidate.is_same_id(base) && c.major == b.major && c.minor == b.minor && c >= b
            }
            Self::Compatible => candidate.is_same_id(base) && c.major == b.major && c >= b,
            Self::GreaterOrEqual => candidate.is_same_id(base) && c >= b,
            Self::Prefix => candidate.id.starts_with(&base.id) && c >= b,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Perfect => "perfect",
            Self::Equivalent => "equivalent",
            Self::Compatible => "compatible",
            Self::GreaterOrEqual => "greaterOrEqual",
            Self::Prefix => "prefix",
        }
    }
}

impl FromStr for MatchRule {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "perfect" => Ok(Self::Perfect),
            "equivalent" => Ok(Self::Equivalent),
            "compatible" => Ok(Self::Compatible),
            "greaterOrEqual" => Ok(Self::GreaterOrEqual),
            "prefix" => Ok(Self::Prefix),
            other => Err(VersionError::UnknownMatchRule {
                input: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) mod lenient_version {
    use semver::Version;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(version: &Version, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(&super::format_version(version))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Version, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_version(&raw).map_err(serde::de::Error::custom)
    }
}
