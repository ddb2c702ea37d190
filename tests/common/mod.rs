//! Common fixtures for the cross-crate scenario tests
//!
//! - `site_builder` writes directory-backed sites
//! - `test_helpers` opens a history plus operations context over a temporary
//!   state directory

#![allow(dead_code)]

pub mod site_builder;
pub mod test_helpers;

pub use site_builder::{include, patch_of, SiteBuilder};
pub use test_helpers::TestEnvironment;
