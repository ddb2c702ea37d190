//! Install/remove transaction error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum InstallError {
    #[error("site is not writable: {site}")]
    SiteNotWritable { site: String },

    #[error("installation aborted: {reason}")]
    Aborted { reason: String },

    #[error("verification failed for {reference} in {feature}: {message}")]
    VerificationFailed {
        feature: String,
        reference: String,
        message: String,
    },

    #[error("content transfer failed for {reference}: {message}")]
    ContentTransferFailed { reference: String, message: String },

    #[error("feature manifest missing: {url}")]
    ManifestMissing { url: String },

    #[error("plugin not found: {plugin}")]
    PluginNotFound { plugin: String },

    #[error("required included feature {child} of {parent} failed: {message}")]
    RequiredChildFailed {
        parent: String,
        child: String,
        message: String,
    },

    #[error("{feature} is still required by configured feature {parent}")]
    ParentDependency { feature: String, parent: String },

    #[error("install handler failed: {message}")]
    HandlerFailed { message: String },

    #[error("content commit failed: {message}")]
    CommitFailed { message: String },

    #[error("task execution failed: {message}")]
    TaskError { message: String },
}

impl InstallError {
    /// Abort raised by a cancelled progress monitor
    #[must_use]
    pub fn cancelled() -> Self {
        Self::Aborted {
            reason: "operation cancelled".to_string(),
        }
    }
}

impl UserFacingError for InstallError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::SiteNotWritable { .. } => {
                Some("Choose a writable local site that is not nested inside another managed site.")
            }
            Self::VerificationFailed { .. } => {
                Some("The content could not be verified; obtain it from a trusted site and retry.")
            }
            Self::ContentTransferFailed { .. } => Some("Check the source site and retry the install."),
            Self::ManifestMissing { .. } => {
                Some("The feature manifest is missing or unreadable; repair or remove the feature.")
            }
            Self::ParentDependency { .. } => {
                Some("Unconfigure the feature that includes it first.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::ContentTransferFailed { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::SiteNotWritable { .. } => "install.site_not_writable",
            Self::Aborted { .. } => "install.aborted",
            Self::VerificationFailed { .. } => "install.verification_failed",
            Self::ContentTransferFailed { .. } => "install.content_transfer_failed",
            Self::ManifestMissing { .. } => "install.manifest_missing",
            Self::PluginNotFound { .. } => "install.plugin_not_found",
            Self::RequiredChildFailed { .. } => "install.required_child_failed",
            Self::ParentDependency { .. } => "install.parent_dependency",
            Self::HandlerFailed { .. } => "install.handler_failed",
            Self::CommitFailed { .. } => "install.commit_failed",
            Self::TaskError { .. } => "install.task_error",
        };
        Some(code)
    }
}
