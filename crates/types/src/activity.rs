//! Activity log records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of configuration-changing action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    Install,
    Remove,
    Configure,
    Unconfigure,
    Revert,
    SiteInstall,
    SiteRemove,
    AddPreserved,
}

impl fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Install => "install",
            Self::Remove => "remove",
            Self::Configure => "configure",
            Self::Unconfigure => "unconfigure",
            Self::Revert => "revert",
            Self::SiteInstall => "site-install",
            Self::SiteRemove => "site-remove",
            Self::AddPreserved => "add-preserved",
        };
        f.write_str(s)
    }
}

/// Outcome of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Ok,
    Nok,
}

/// One audit-log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub action: ActivityAction,
    pub label: String,
    pub date: DateTime<Utc>,
    pub status: ActivityStatus,
}

impl Activity {
    pub fn new(action: ActivityAction, label: impl Into<String>, status: ActivityStatus) -> Self {
        Self {
            action,
            label: label.into(),
            date: Utc::now(),
            status,
        }
    }

    /// Record the outcome of `result`
    pub fn from_result<T, E>(
        action: ActivityAction,
        label: impl Into<String>,
        result: &Result<T, E>,
    ) -> Self {
        let status = if result.is_ok() {
            ActivityStatus::Ok
        } else {
            ActivityStatus::Nok
        };
        Self::new(action, label, status)
    }
}
