//! Version and identifier parsing error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum VersionError {
    #[error("invalid version: {input}")]
    InvalidVersion { input: String },

    #[error("invalid versioned identifier: {input}")]
    InvalidIdentifier { input: String },

    #[error("unknown match rule: {input}")]
    UnknownMatchRule { input: String },

    #[error("version parse error: {message}")]
    ParseError { message: String },
}

impl UserFacingError for VersionError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidVersion { .. } | Self::ParseError { .. } => {
                Some("Use dotted versions like 1.2.3 or 1.2.3.qualifier.")
            }
            Self::InvalidIdentifier { .. } => Some("Identify features as <id>_<version>, e.g. org.example.core_1.0.0."),
            Self::UnknownMatchRule { .. } => {
                Some("Valid match rules are perfect, equivalent, compatible, greaterOrEqual and prefix.")
            }
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::InvalidVersion { .. } => "version.invalid_version",
            Self::InvalidIdentifier { .. } => "version.invalid_identifier",
            Self::UnknownMatchRule { .. } => "version.unknown_match_rule",
            Self::ParseError { .. } => "version.parse_error",
        };
        Some(code)
    }
}
