use serde::{Deserialize, Serialize};

use super::FailureContext;

/// Operation lifecycle and free-form warnings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GeneralEvent {
    /// Something went wrong that did not fail the operation
    Warning {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        context: Option<String>,
    },

    /// A top-level management operation started
    OperationStarted { operation: String },

    /// A top-level management operation finished; `success` is false when
    /// it ran but its activity was recorded as failed
    OperationCompleted { operation: String, success: bool },

    /// A top-level management operation returned an error
    OperationFailed {
        operation: String,
        failure: FailureContext,
    },
}
