use serde::{Deserialize, Serialize};

/// Progress tracking events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEvent {
    /// Progress tracking started
    Started {
        id: String,
        operation: String,
        total: u64,
        parent_id: Option<String>,
    },

    /// Units worked so far
    Updated { id: String, current: u64, total: u64 },

    /// Progress completed
    Completed { id: String },

    /// The shared cancellation token was set
    Cancelled { id: String },
}

impl ProgressEvent {
    /// Create a progress started event
    pub fn started(
        id: impl Into<String>,
        operation: impl Into<String>,
        total: u64,
        parent_id: Option<String>,
    ) -> Self {
        Self::Started {
            id: id.into(),
            operation: operation.into(),
            total,
            parent_id,
        }
    }

    /// Create a progress update event
    pub fn updated(id: impl Into<String>, current: u64, total: u64) -> Self {
        Self::Updated {
            id: id.into(),
            current,
            total,
        }
    }
}
