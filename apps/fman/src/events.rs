//! Event handling and progress display

use console::{Style, Term};
use fman_events::{
    AppEvent, EventMessage, GeneralEvent, InstallEvent, ProgressEvent, SiteEvent, StateEvent,
};

/// Renders user-facing status lines for events on stderr
pub struct EventHandler {
    term: Term,
    colors: bool,
    debug: bool,
}

impl EventHandler {
    pub fn new(colors: bool, debug: bool) -> Self {
        Self {
            term: Term::stderr(),
            colors,
            debug,
        }
    }

    /// Handle one drained event
    pub fn handle_event(&mut self, message: &EventMessage) {
        crate::logging::log_event_with_tracing(message);
        if let Some(line) = self.describe(&message.event) {
            let _ = self.term.write_line(&line);
        }
    }

    fn describe(&self, event: &AppEvent) -> Option<String> {
        let line = match event {
            AppEvent::General(GeneralEvent::OperationStarted { operation }) => {
                self.style(&Style::new().cyan(), &format!("==> {operation}"))
            }
            AppEvent::General(GeneralEvent::OperationFailed { operation, failure }) => self.style(
                &Style::new().red(),
                &format!("{operation} failed: {}", failure.message),
            ),
            AppEvent::General(GeneralEvent::Warning { message, context }) => self.style(
                &Style::new().yellow(),
                &match context {
                    Some(context) => format!("warning: {message}: {context}"),
                    None => format!("warning: {message}"),
                },
            ),

            AppEvent::Install(InstallEvent::Started {
                feature, plugins, ..
            }) => format!("  installing {feature} ({plugins} plugins)"),
            AppEvent::Install(InstallEvent::AlreadyInstalled { feature, .. }) => {
                format!("  {feature} already installed")
            }
            AppEvent::Install(InstallEvent::Committed { feature, site }) => {
                self.style(&Style::new().green(), &format!("  installed {feature} into {site}"))
            }
            AppEvent::Install(InstallEvent::RolledBack { feature, failure }) => self.style(
                &Style::new().red(),
                &format!("  rolled back {feature}: {}", failure.message),
            ),
            AppEvent::Install(InstallEvent::Removed {
                feature,
                plugins_removed,
                ..
            }) => format!("  removed {feature} ({plugins_removed} plugins)"),
            AppEvent::Install(InstallEvent::ChildSkipped { child, reason, .. }) => {
                self.style(&Style::new().yellow(), &format!("  skipped {child}: {reason}"))
            }

            AppEvent::Site(SiteEvent::FeatureConfigured { feature, .. }) => {
                format!("  configured {feature}")
            }
            AppEvent::Site(SiteEvent::FeatureUnconfigured { feature, .. }) => {
                format!("  unconfigured {feature}")
            }
            AppEvent::Site(SiteEvent::UnconfigureRefused {
                feature, parent, ..
            }) => self.style(
                &Style::new().yellow(),
                &format!("  {feature} is still included by configured {parent}"),
            ),

            AppEvent::State(StateEvent::RevertProblem {
                feature, reason, ..
            }) => self.style(&Style::new().yellow(), &format!("  {feature}: {reason}")),
            AppEvent::State(StateEvent::ConfigurationEvicted { id, .. }) if self.debug => {
                format!("  dropped configuration {id} from history")
            }

            AppEvent::Progress(ProgressEvent::Cancelled { .. }) => {
                self.style(&Style::new().yellow(), "cancelling...")
            }

            _ => return None,
        };
        Some(line)
    }

    fn style(&self, style: &Style, text: &str) -> String {
        if self.colors {
            style.apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }
}
