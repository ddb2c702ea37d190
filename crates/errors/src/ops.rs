//! Operation orchestration error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum OpsError {
    #[error("component not found: {component}")]
    MissingComponent { component: String },

    #[error("serialization error: {message}")]
    SerializationError { message: String },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("operation {operation} refused: {reason}")]
    Refused { operation: String, reason: String },
}

impl UserFacingError for OpsError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidRequest { .. } => Some("Run `fman --help` for usage."),
            Self::Refused { .. } => {
                Some("Unconfigure the including feature first, then retry.")
            }
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::MissingComponent { .. } => "ops.missing_component",
            Self::SerializationError { .. } => "ops.serialization",
            Self::InvalidRequest { .. } => "ops.invalid_request",
            Self::Refused { .. } => "ops.refused",
        };
        Some(code)
    }
}
