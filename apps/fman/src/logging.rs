//! Structured logging integration for events
//!
//! Every event drained from the channel is forwarded to `tracing` at the
//! level carried in its metadata, with the domain fields attached.

use fman_events::{
    AppEvent, EventMessage, GeneralEvent, InstallEvent, ProgressEvent, SiteEvent, StateEvent,
};
use tracing::Level;

macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            Level::ERROR => tracing::error!($($arg)+),
            Level::WARN => tracing::warn!($($arg)+),
            Level::INFO => tracing::info!($($arg)+),
            Level::DEBUG => tracing::debug!($($arg)+),
            _ => tracing::trace!($($arg)+),
        }
    };
}

/// Log an `EventMessage` using the tracing infrastructure with structured
/// fields
pub fn log_event_with_tracing(message: &EventMessage) {
    let meta = &message.meta;
    let level = meta.tracing_level();
    let source = meta.source.as_str();
    let event_id = meta.event_id;

    match &message.event {
        AppEvent::General(event) => match event {
            GeneralEvent::Warning { message, context } => {
                log_at!(level, source, %event_id, context = ?context, "{message}");
            }
            GeneralEvent::OperationStarted { operation } => {
                log_at!(level, source, %event_id, operation = %operation, "operation started");
            }
            GeneralEvent::OperationCompleted { operation, success } => {
                log_at!(level, source, %event_id, operation = %operation, success, "operation completed");
            }
            GeneralEvent::OperationFailed { operation, failure } => {
                log_at!(
                    level,
                    source,
                    %event_id,
                    operation = %operation,
                    code = ?failure.code,
                    hint = ?failure.hint,
                    retryable = failure.retryable,
                    "operation failed: {}",
                    failure.message
                );
            }
        },

        AppEvent::Install(event) => match event {
            InstallEvent::Started {
                feature,
                site,
                plugins,
                children,
                total_units,
            } => {
                log_at!(
                    level,
                    source,
                    %event_id,
                    feature = %feature,
                    site = %site,
                    plugins,
                    children,
                    total_units,
                    "install started"
                );
            }
            InstallEvent::FeatureVerified { feature } => {
                log_at!(level, source, %event_id, feature = %feature, "feature verified");
            }
            InstallEvent::PluginFetched { feature, plugin } => {
                log_at!(level, source, %event_id, feature = %feature, plugin = %plugin, "plugin fetched");
            }
            InstallEvent::PluginSkipped {
                feature,
                plugin,
                reason,
            } => {
                log_at!(level, source, %event_id, feature = %feature, plugin = %plugin, reason = %reason, "plugin skipped");
            }
            InstallEvent::PluginShared { feature, plugin } => {
                log_at!(level, source, %event_id, feature = %feature, plugin = %plugin, "plugin already on site");
            }
            InstallEvent::ChildSkipped {
                feature,
                child,
                reason,
            } => {
                log_at!(level, source, %event_id, feature = %feature, child = %child, reason = %reason, "child skipped");
            }
            InstallEvent::DataEntryFailed {
                feature,
                entry,
                reason,
            } => {
                log_at!(level, source, %event_id, feature = %feature, entry = %entry, reason = %reason, "data entry failed");
            }
            InstallEvent::AlreadyInstalled { feature, site } => {
                log_at!(level, source, %event_id, feature = %feature, site = %site, "already installed");
            }
            InstallEvent::Committed { feature, site } => {
                log_at!(level, source, %event_id, feature = %feature, site = %site, "install committed");
            }
            InstallEvent::RolledBack { feature, failure } => {
                log_at!(
                    level,
                    source,
                    %event_id,
                    feature = %feature,
                    code = ?failure.code,
                    "install rolled back: {}",
                    failure.message
                );
            }
            InstallEvent::Removed {
                feature,
                site,
                plugins_removed,
            } => {
                log_at!(level, source, %event_id, feature = %feature, site = %site, plugins_removed, "feature removed");
            }
        },

        AppEvent::Site(event) => match event {
            SiteEvent::FeatureConfigured { site, feature } => {
                log_at!(level, source, %event_id, site = %site, feature = %feature, "feature configured");
            }
            SiteEvent::FeatureUnconfigured { site, feature } => {
                log_at!(level, source, %event_id, site = %site, feature = %feature, "feature unconfigured");
            }
            SiteEvent::UnconfigureRefused {
                site,
                feature,
                parent,
            } => {
                log_at!(level, source, %event_id, site = %site, feature = %feature, parent = %parent, "unconfigure refused");
            }
            SiteEvent::PatchUnconfigured {
                site,
                patch,
                target,
            } => {
                log_at!(level, source, %event_id, site = %site, patch = %patch, target = %target, "patch unconfigured");
            }
            SiteEvent::ChildNotConfigured {
                site,
                feature,
                child,
                reason,
            } => {
                log_at!(level, source, %event_id, site = %site, feature = %feature, child = %child, reason = %reason, "child not configured");
            }
            SiteEvent::ListenerFailed { site, callback } => {
                log_at!(level, source, %event_id, site = %site, callback = %callback, "listener failed");
            }
            SiteEvent::SiteAdded { site } => {
                log_at!(level, source, %event_id, site = %site, "site added");
            }
            SiteEvent::SiteRemoved { site } => {
                log_at!(level, source, %event_id, site = %site, "site removed");
            }
            SiteEvent::SiteEnabled { site, enabled } => {
                log_at!(level, source, %event_id, site = %site, enabled, "site enablement changed");
            }
        },

        AppEvent::State(event) => match event {
            StateEvent::ConfigurationAdded { id, label } => {
                log_at!(level, source, %event_id, id = %id, label = %label, "configuration added");
            }
            StateEvent::ConfigurationEvicted { id, path } => {
                log_at!(level, source, %event_id, id = %id, path = %path, "configuration evicted");
            }
            StateEvent::RevertStarted { target } => {
                log_at!(level, source, %event_id, target = %target, "revert started");
            }
            StateEvent::RevertCompleted { target, created } => {
                log_at!(level, source, %event_id, target = %target, created = %created, "revert completed");
            }
            StateEvent::RevertProblem {
                site,
                feature,
                reason,
            } => {
                log_at!(level, source, %event_id, site = %site, feature = %feature, reason = %reason, "revert problem");
            }
            StateEvent::RevertFailed { target, failure } => {
                log_at!(level, source, %event_id, target = %target, code = ?failure.code, "revert failed: {}", failure.message);
            }
            StateEvent::Preserved { id } => {
                log_at!(level, source, %event_id, id = %id, "configuration preserved");
            }
            StateEvent::PreservedRemoved { id } => {
                log_at!(level, source, %event_id, id = %id, "preserved configuration removed");
            }
            StateEvent::Reconciled {
                optimistic,
                configured,
                unhappy,
            } => {
                log_at!(level, source, %event_id, optimistic, configured, unhappy, "reconciled");
            }
            StateEvent::Saved { path } => {
                log_at!(level, source, %event_id, path = %path, "history index saved");
            }
        },

        AppEvent::Progress(event) => match event {
            ProgressEvent::Started {
                id,
                operation,
                total,
                parent_id,
            } => {
                log_at!(level, source, %event_id, id = %id, operation = %operation, total, parent_id = ?parent_id, "progress started");
            }
            ProgressEvent::Updated { id, current, total } => {
                log_at!(level, source, %event_id, id = %id, current, total, "progress");
            }
            ProgressEvent::Completed { id } => {
                log_at!(level, source, %event_id, id = %id, "progress completed");
            }
            ProgressEvent::Cancelled { id } => {
                log_at!(level, source, %event_id, id = %id, "progress cancelled");
            }
        },
    }
}
