#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::missing_panics_doc, clippy::unused_async)]
#![allow(clippy::module_name_repetitions)]

//! Configuration history for fman
//!
//! Every configuration-changing operation produces a new
//! [`InstallConfiguration`] which is persisted as JSON and appended to the
//! [`LocalSite`] history. The history is capped; the oldest entries are
//! evicted together with their files. Preserved copies live outside the cap.

mod configuration;
mod local_site;
mod persist;
mod status;

pub use configuration::{ConfigurationRecord, InstallConfiguration};
pub use local_site::{LocalSite, ReconcileReport, CONFIG_PREFIX, INDEX_FILE, PRESERVED_PREFIX};
pub use status::feature_status;
