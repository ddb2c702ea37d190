#![warn(mismatched_lifetime_syntaxes)]
#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Error types for the fman feature manager
//!
//! One enum per domain, all `Clone` so a transaction can collect failures
//! from concurrent plugin workers and still pick the one to surface.

use std::borrow::Cow;
use std::path::Path;

use thiserror::Error;

pub mod config;
pub mod install;
pub mod ops;
pub mod site;
pub mod state;
pub mod storage;
pub mod version;

pub use config::ConfigError;
pub use install::InstallError;
pub use ops::OpsError;
pub use site::SiteError;
pub use state::StateError;
pub use storage::StorageError;
pub use version::VersionError;

/// Error crossing crate boundaries
#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Error {
    #[error("site error: {0}")]
    Site(#[from] SiteError),

    #[error("install error: {0}")]
    Install(#[from] InstallError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("version error: {0}")]
    Version(#[from] VersionError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("ops error: {0}")]
    Ops(#[from] OpsError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// I/O failure on `path`, classified by kind
    #[must_use]
    pub fn io_with_path(err: &std::io::Error, path: &Path) -> Self {
        StorageError::from_io_with_path(err, path).into()
    }

    /// True for a user decline or a cancelled progress monitor
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Install(InstallError::Aborted { .. }))
    }

    /// Pick the error to surface from several collected failures: the first
    /// abort if there is one, otherwise the first error.
    #[must_use]
    pub fn prioritize(errors: Vec<Error>) -> Option<Error> {
        match errors.iter().position(Error::is_aborted) {
            Some(pos) => errors.into_iter().nth(pos),
            None => errors.into_iter().next(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        StorageError::from(err).into()
    }
}

impl From<semver::Error> for Error {
    fn from(err: semver::Error) -> Self {
        VersionError::ParseError {
            message: err.to_string(),
        }
        .into()
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        StateError::StateCorrupted {
            message: err.to_string(),
        }
        .into()
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseError {
            message: err.to_string(),
        }
        .into()
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// What a front end needs to report an error to a person
pub trait UserFacingError {
    /// Short message suitable for CLI output.
    fn user_message(&self) -> Cow<'_, str>;

    /// Optional remediation hint.
    fn user_hint(&self) -> Option<&'static str> {
        None
    }

    /// Whether retrying the same operation is likely to succeed.
    fn is_retryable(&self) -> bool {
        false
    }

    /// Stable dotted code, e.g. `install.aborted`.
    fn user_code(&self) -> Option<&'static str> {
        None
    }
}

impl Error {
    fn domain(&self) -> Option<&dyn UserFacingError> {
        match self {
            Error::Site(e) => Some(e),
            Error::Install(e) => Some(e),
            Error::Storage(e) => Some(e),
            Error::State(e) => Some(e),
            Error::Version(e) => Some(e),
            Error::Config(e) => Some(e),
            Error::Ops(e) => Some(e),
            Error::Internal(_) => None,
        }
    }
}

impl UserFacingError for Error {
    fn user_message(&self) -> Cow<'_, str> {
        match self.domain() {
            Some(e) => e.user_message(),
            None => Cow::Owned(self.to_string()),
        }
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Error::Config(e) => e
                .user_hint()
                .or(Some("Check your fman configuration file.")),
            other => other.domain().and_then(UserFacingError::user_hint),
        }
    }

    fn is_retryable(&self) -> bool {
        self.domain().is_some_and(UserFacingError::is_retryable)
    }

    fn user_code(&self) -> Option<&'static str> {
        match self.domain() {
            Some(e) => e.user_code(),
            None => Some("error.internal"),
        }
    }
}
