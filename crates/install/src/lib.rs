#![warn(clippy::pedantic)]
#![deny(clippy::all)]

//! Transactional feature installation for fman
//!
//! An install copies one feature, its filtered plugins and data entries from a
//! source site into a writable target site. Content is staged through a
//! [`ContentConsumer`](fman_site::ContentConsumer) and becomes visible only on
//! commit; any failure rolls staged content back. Included features are
//! installed recursively as independent sub-transactions.

mod context;
mod handler;
mod installer;
mod registry;
mod verification;

pub use context::InstallContext;
pub use handler::{DefaultInstallHandler, InstallHandler};
pub use installer::{InstallTarget, Installer, RemoveResult};
pub use registry::InstalledPluginRegistry;
pub use verification::{
    DigestVerifier, PolicyListener, TrustAllVerifier, VerificationKind, VerificationListener,
    VerificationResponse, VerificationResult, Verifier,
};

pub use fman_events::EventSender;
