use serde::{Deserialize, Serialize};

use crate::EventSource;
use fman_errors::UserFacingError;

/// Structured failure information shared across domains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Short user-facing message.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether retrying the operation might succeed.
    pub retryable: bool,
}

impl FailureContext {
    /// Construct a new failure context.
    #[must_use]
    pub fn new(
        code: Option<impl Into<String>>,
        message: impl Into<String>,
        hint: Option<impl Into<String>>,
        retryable: bool,
    ) -> Self {
        Self {
            code: code.map(Into::into),
            message: message.into(),
            hint: hint.map(Into::into),
            retryable,
        }
    }

    /// Build failure context from a `UserFacingError` implementation.
    #[must_use]
    pub fn from_error<E: UserFacingError + ?Sized>(error: &E) -> Self {
        Self::new(
            error.user_code(),
            error.user_message().into_owned(),
            error.user_hint(),
            error.is_retryable(),
        )
    }
}

pub mod general;
pub mod install;
pub mod progress;
pub mod site;
pub mod state;

pub use general::*;
pub use install::*;
pub use progress::*;
pub use site::*;
pub use state::*;

/// Top-level application event enum that aggregates all domain-specific events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// General utility events (warnings, errors, operations)
    General(GeneralEvent),

    /// Install/remove transactions
    Install(InstallEvent),

    /// Configure/unconfigure and configured-site changes
    Site(SiteEvent),

    /// Configuration history
    State(StateEvent),

    /// Progress monitor updates
    Progress(ProgressEvent),
}

impl AppEvent {
    /// Identify the source domain for this event (used for metadata/logging).
    #[must_use]
    pub fn event_source(&self) -> EventSource {
        match self {
            Self::General(_) => EventSource::General,
            Self::Install(_) => EventSource::Install,
            Self::Site(_) => EventSource::Site,
            Self::State(_) => EventSource::State,
            Self::Progress(_) => EventSource::Progress,
        }
    }

    /// Determine the appropriate tracing log level for this event
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        use tracing::Level;

        match self {
            Self::General(GeneralEvent::OperationFailed { .. })
            | Self::Install(InstallEvent::RolledBack { .. })
            | Self::State(StateEvent::RevertFailed { .. }) => Level::ERROR,

            Self::General(GeneralEvent::Warning { .. })
            | Self::Install(
                InstallEvent::PluginSkipped { .. }
                | InstallEvent::ChildSkipped { .. }
                | InstallEvent::DataEntryFailed { .. },
            )
            | Self::Site(SiteEvent::ListenerFailed { .. })
            | Self::State(StateEvent::RevertProblem { .. })
            | Self::Progress(ProgressEvent::Cancelled { .. }) => Level::WARN,

            Self::Install(
                InstallEvent::PluginFetched { .. } | InstallEvent::PluginShared { .. },
            )
            | Self::Site(SiteEvent::ChildNotConfigured { .. })
            | Self::Progress(ProgressEvent::Started { .. } | ProgressEvent::Completed { .. }) => {
                Level::DEBUG
            }

            Self::Progress(ProgressEvent::Updated { .. }) => Level::TRACE,

            _ => Level::INFO,
        }
    }

    /// Get the log target for this event (for structured logging)
    #[must_use]
    pub fn log_target(&self) -> &'static str {
        match self {
            Self::General(_) => "fman::events::general",
            Self::Install(_) => "fman::events::install",
            Self::Site(_) => "fman::events::site",
            Self::State(_) => "fman::events::state",
            Self::Progress(_) => "fman::events::progress",
        }
    }
}
