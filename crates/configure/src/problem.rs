//! Decisions on features that fail validation during a revert

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemResponse {
    /// Skip the feature and keep reverting
    Continue,
    /// Stop the revert with an interrupted error
    Abort,
}

pub trait ProblemHandler: Send + Sync + fmt::Debug {
    fn report(&self, feature: &str, reason: &str) -> ProblemResponse;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContinueOnProblem;

impl ProblemHandler for ContinueOnProblem {
    fn report(&self, feature: &str, reason: &str) -> ProblemResponse {
        tracing::warn!(feature, reason, "skipping invalid feature during revert");
        ProblemResponse::Continue
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AbortOnProblem;

impl ProblemHandler for AbortOnProblem {
    fn report(&self, _feature: &str, _reason: &str) -> ProblemResponse {
        ProblemResponse::Abort
    }
}
