//! Configuration history error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum StateError {
    #[error("configuration not found: {id}")]
    ConfigurationNotFound { id: String },

    #[error("configuration is read-only: {id}")]
    ReadOnly { id: String },

    #[error("configured site not found: {url}")]
    SiteNotConfigured { url: String },

    #[error("site already configured: {url}")]
    SiteAlreadyConfigured { url: String },

    #[error("failed to persist {path}: {message}")]
    PersistFailed { path: String, message: String },

    #[error("state corrupted: {message}")]
    StateCorrupted { message: String },

    #[error("revert interrupted at {feature}: {reason}")]
    Interrupted { feature: String, reason: String },

    #[error("history not initialized")]
    NoCurrentConfiguration,
}

impl UserFacingError for StateError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::PersistFailed { .. } => {
                Some("Free disk space or fix permissions on the state directory; the snapshot was not recorded.")
            }
            Self::ConfigurationNotFound { .. } => Some("Run `fman history` to list configurations."),
            Self::StateCorrupted { .. } => Some("Remove the damaged file from the state directory."),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::PersistFailed { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::ConfigurationNotFound { .. } => "state.configuration_not_found",
            Self::ReadOnly { .. } => "state.read_only",
            Self::SiteNotConfigured { .. } => "state.site_not_configured",
            Self::SiteAlreadyConfigured { .. } => "state.site_already_configured",
            Self::PersistFailed { .. } => "state.persist_failed",
            Self::StateCorrupted { .. } => "state.corrupted",
            Self::Interrupted { .. } => "state.interrupted",
            Self::NoCurrentConfiguration => "state.no_current_configuration",
        };
        Some(code)
    }
}
