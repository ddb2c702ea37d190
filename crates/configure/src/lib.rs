#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configured sites and the configure/unconfigure policy
//!
//! A [`ConfiguredSite`] pairs a [`Site`](fman_site::Site) with a
//! [`ConfigurationPolicy`] partitioning its feature references into
//! configured and unconfigured sets. Configure runs bottom-up through
//! included features; unconfigure runs top-down, refuses while a configured
//! parent still includes the feature, and cascades to patches.

mod configured_site;
mod listener;
mod policy;
mod problem;

pub use configured_site::{ConfiguredSite, ConfiguredSiteRecord};
pub use listener::ConfiguredSiteListener;
pub use policy::{ConfigurationPolicy, PolicyKind};
pub use problem::{AbortOnProblem, ContinueOnProblem, ProblemHandler, ProblemResponse};
