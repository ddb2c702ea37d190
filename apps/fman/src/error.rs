//! CLI error handling

use std::fmt;

use fman_errors::{Error, InstallError, SiteError, StateError, StorageError, UserFacingError};

/// CLI-specific error type
#[derive(Debug)]
pub enum CliError {
    /// Configuration error
    Config(fman_errors::ConfigError),
    /// Operations error
    Ops(Error),
    /// System setup error
    Setup(String),
    /// I/O error
    Io(std::io::Error),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        let CliError::Ops(e) = self else {
            return 1;
        };
        if e.is_aborted() {
            return 3;
        }
        match e {
            Error::Install(InstallError::VerificationFailed { .. }) => 4,
            Error::Install(InstallError::SiteNotWritable { .. })
            | Error::Storage(StorageError::PermissionDenied { .. })
            | Error::Site(SiteError::ReadOnly { .. })
            | Error::State(StateError::ReadOnly { .. }) => 5,
            Error::Site(SiteError::NotFound { .. } | SiteError::FeatureNotFound { .. })
            | Error::State(
                StateError::ConfigurationNotFound { .. } | StateError::SiteNotConfigured { .. },
            ) => 6,
            _ => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "Configuration error: {e}"),
            CliError::Ops(e) => {
                let message = e.user_message();
                write!(f, "{message}")?;
                if let Some(code) = e.user_code() {
                    write!(f, "\n  Code: {code}")?;
                }
                if let Some(hint) = e.user_hint() {
                    write!(f, "\n  Hint: {hint}")?;
                }
                if e.is_retryable() {
                    write!(f, "\n  Retry: safe to retry this operation.")?;
                }
                Ok(())
            }
            CliError::Setup(msg) => write!(f, "System setup error: {msg}"),
            CliError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Ops(e) => Some(e),
            CliError::Io(e) => Some(e),
            CliError::Setup(_) => None,
        }
    }
}

impl From<fman_errors::ConfigError> for CliError {
    fn from(e: fman_errors::ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<Error> for CliError {
    fn from(e: Error) -> Self {
        match e {
            Error::Config(e) => CliError::Config(e),
            other => CliError::Ops(other),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_by_kind() {
        let aborted: CliError = Error::Install(InstallError::Aborted {
            reason: "cancelled".into(),
        })
        .into();
        assert_eq!(aborted.exit_code(), 3);

        let missing: CliError = Error::Site(SiteError::FeatureNotFound {
            site: "file:///s".into(),
            feature: "ghost".into(),
        })
        .into();
        assert_eq!(missing.exit_code(), 6);

        let read_only: CliError = Error::Install(InstallError::SiteNotWritable {
            site: "file:///s".into(),
        })
        .into();
        assert_eq!(read_only.exit_code(), 5);

        assert_eq!(CliError::Setup("boom".into()).exit_code(), 1);
        let denied: CliError = Error::io_with_path(
            &std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            std::path::Path::new("/ro"),
        )
        .into();
        assert_eq!(denied.exit_code(), 5);
    }
}
