#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core type definitions for the fman feature manager
//!
//! This crate provides the identity, feature, activity and status types
//! shared by every other crate.

pub mod activity;
pub mod feature;
pub mod identifier;
pub mod platform;
pub mod status;

pub use activity::{Activity, ActivityAction, ActivityStatus};
pub use feature::{
    DataEntry, Feature, Import, ImportKind, IncludedFeatureRef, PluginEntry, SearchLocation,
    SiteUrl,
};
pub use identifier::{format_version, parse_version, MatchRule, VersionedIdentifier};
pub use platform::{Environment, PlatformFilters};
pub use semver::Version;
pub use status::{FeatureStatus, StatusReport};

use serde::{Deserialize, Serialize};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Plain,
    Tty,
    Json,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Tty
    }
}

/// Color output choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorChoice {
    Always,
    Auto,
    Never,
}

impl clap::ValueEnum for ColorChoice {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Always, Self::Auto, Self::Never]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::Always => clap::builder::PossibleValue::new("always"),
            Self::Auto => clap::builder::PossibleValue::new("auto"),
            Self::Never => clap::builder::PossibleValue::new("never"),
        })
    }
}

impl Default for ColorChoice {
    fn default() -> Self {
        Self::Auto
    }
}
