//! Site and feature-reference error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum SiteError {
    #[error("site not found: {url}")]
    NotFound { url: String },

    #[error("invalid site url: {url}")]
    InvalidUrl { url: String },

    #[error("feature not found on {site}: {feature}")]
    FeatureNotFound { site: String, feature: String },

    #[error("invalid manifest {path}: {message}")]
    ManifestParse { path: String, message: String },

    #[error("feature {feature} already belongs to site {site}")]
    FeatureAlreadyParented { feature: String, site: String },

    #[error("site does not accept content: {url}")]
    ReadOnly { url: String },
}

impl UserFacingError for SiteError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::NotFound { .. } => Some("Check that the site directory exists."),
            Self::ManifestParse { .. } => Some("Fix the feature.toml syntax and retry."),
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::NotFound { .. } => "site.not_found",
            Self::InvalidUrl { .. } => "site.invalid_url",
            Self::FeatureNotFound { .. } => "site.feature_not_found",
            Self::ManifestParse { .. } => "site.manifest_parse",
            Self::FeatureAlreadyParented { .. } => "site.feature_already_parented",
            Self::ReadOnly { .. } => "site.read_only",
        };
        Some(code)
    }
}
