use fman_events::{EventEmitter, EventSender, ProgressMonitor};
use fman_types::Environment;
use std::sync::Arc;

use crate::handler::{DefaultInstallHandler, InstallHandler};
use crate::registry::InstalledPluginRegistry;
use crate::verification::{PolicyListener, TrustAllVerifier, VerificationListener, Verifier};

/// Default number of plugin archives fetched concurrently
const DEFAULT_PARALLEL_FETCHES: usize = 8;

/// Installation context
#[derive(Clone, Debug)]
pub struct InstallContext {
    /// Inspects every content reference before it is staged
    pub verifier: Arc<dyn Verifier>,
    /// Decides on verification findings
    pub listener: Arc<dyn VerificationListener>,
    /// Lifecycle hooks
    pub handler: Arc<dyn InstallHandler>,
    /// Plugins claimed in this session
    pub registry: InstalledPluginRegistry,
    /// Session monitor; every transaction runs under its own monitor whose
    /// token is a child of this one
    pub progress: ProgressMonitor,
    /// Platform the plugin and data filters are evaluated against
    pub environment: Environment,
    /// Upper bound on concurrent plugin fetches
    pub parallel_fetches: usize,
    /// Only non-optional children and children in this list are installed
    /// when set; identifiers use the `id_version` key form
    pub optional_selection: Option<Vec<String>>,

    /// Event sender for progress reporting
    pub event_sender: Option<EventSender>,
}

impl Default for InstallContext {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            verifier: Arc::new(TrustAllVerifier),
            listener: Arc::new(PolicyListener::default()),
            handler: Arc::new(DefaultInstallHandler::new()),
            registry: InstalledPluginRegistry::new(),
            progress: ProgressMonitor::new(),
            environment: Environment::current(),
            parallel_fetches: DEFAULT_PARALLEL_FETCHES,
            optional_selection: None,
            event_sender: None,
        }
    }

    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifier = verifier;
        self
    }

    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn VerificationListener>) -> Self {
        self.listener = listener;
        self
    }

    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn InstallHandler>) -> Self {
        self.handler = handler;
        self
    }

    #[must_use]
    pub fn with_registry(mut self, registry: InstalledPluginRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressMonitor) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    #[must_use]
    pub fn with_parallel_fetches(mut self, parallel_fetches: usize) -> Self {
        self.parallel_fetches = parallel_fetches.max(1);
        self
    }

    #[must_use]
    pub fn with_optional_selection(mut self, selection: Option<Vec<String>>) -> Self {
        self.optional_selection = selection;
        self
    }

    #[must_use]
    pub fn with_event_sender(mut self, event_sender: EventSender) -> Self {
        self.event_sender = Some(event_sender);
        self
    }

    /// Copy of this context with its own monitor for one transaction
    pub(crate) fn for_transaction(&self) -> Self {
        Self {
            progress: self.progress.transaction(),
            ..self.clone()
        }
    }

    /// Copy of this context reporting to a sub-monitor of `units`
    pub(crate) fn child(&self, units: u64) -> Self {
        Self {
            progress: self.progress.sub(units),
            ..self.clone()
        }
    }

    /// Whether an optional child identified by `key` was selected
    pub(crate) fn selects(&self, key: &str) -> bool {
        self.optional_selection
            .as_ref()
            .is_none_or(|keys| keys.iter().any(|k| k == key))
    }
}

impl EventEmitter for InstallContext {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}
