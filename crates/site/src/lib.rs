#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Sites, feature references and content capabilities for fman
//!
//! A [`Site`] owns its [`FeatureReference`]s and delegates every byte of I/O
//! to a [`ContentProvider`]. Local directories are served by
//! [`DirectoryContentProvider`]; other transports plug in as further
//! provider implementations.

pub mod content;
pub mod directory;
pub mod manifest;
pub mod reference;
pub mod registry;
pub mod site;

pub use content::{ContentConsumer, ContentLocation, ContentProvider, ContentRef, ContentStream};
pub use directory::{DirectoryConsumer, DirectoryContentProvider, FEATURES_DIR, PLUGINS_DIR};
pub use manifest::{feature_to_toml, SiteManifest, FEATURE_MANIFEST, SITE_MANIFEST};
pub use reference::FeatureReference;
pub use registry::SiteRegistry;
pub use site::Site;
