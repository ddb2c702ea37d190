//! Content verification and the trust decision that follows it

use async_trait::async_trait;
use fman_errors::Error;
use fman_events::ProgressMonitor;
use fman_hash::Digest;
use fman_site::{ContentRef, FEATURE_MANIFEST};
use fman_types::Feature;
use std::fmt;

/// What a verifier found wrong with a piece of content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationKind {
    /// Content does not match its declared digest
    Corrupted,
    /// No digest is declared for the content
    Unsigned,
    /// The verifier could not reach a conclusion
    Unknown,
}

impl fmt::Display for VerificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Corrupted => "corrupted",
            Self::Unsigned => "unsigned",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Finding reported for one content reference
#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub kind: VerificationKind,
    pub feature: String,
    pub reference: String,
    pub feature_level: bool,
    pub message: String,
}

/// Decision returned by a [`VerificationListener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationResponse {
    /// Install the content anyway
    Accept,
    /// Abort the whole transaction
    Abort,
    /// Fail this content with a verification error
    Error,
}

/// Inspects content before it is staged
#[async_trait]
pub trait Verifier: Send + Sync + fmt::Debug {
    /// Verify `content` of `feature`. `Ok(None)` means the content is
    /// trusted; `Ok(Some(_))` is a finding for the listener to decide on.
    async fn verify(
        &self,
        feature: &Feature,
        content: &ContentRef,
        feature_level: bool,
        progress: &ProgressMonitor,
    ) -> Result<Option<VerificationResult>, Error>;
}

/// Decides what to do with a verification finding
pub trait VerificationListener: Send + Sync + fmt::Debug {
    fn prompt(&self, result: &VerificationResult) -> VerificationResponse;
}

/// Verifier that trusts everything
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustAllVerifier;

#[async_trait]
impl Verifier for TrustAllVerifier {
    async fn verify(
        &self,
        _feature: &Feature,
        _content: &ContentRef,
        _feature_level: bool,
        _progress: &ProgressMonitor,
    ) -> Result<Option<VerificationResult>, Error> {
        Ok(None)
    }
}

/// Recomputes BLAKE3 digests declared in the feature manifest
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestVerifier {
    require_digests: bool,
}

impl DigestVerifier {
    #[must_use]
    pub fn new(require_digests: bool) -> Self {
        Self { require_digests }
    }
}

#[async_trait]
impl Verifier for DigestVerifier {
    async fn verify(
        &self,
        feature: &Feature,
        content: &ContentRef,
        feature_level: bool,
        progress: &ProgressMonitor,
    ) -> Result<Option<VerificationResult>, Error> {
        progress.check_cancelled()?;

        let finding = |kind, message: String| VerificationResult {
            kind,
            feature: feature.identifier.to_string(),
            reference: content.identifier.clone(),
            feature_level,
            message,
        };

        let Some(declared) = feature.digests.get(&content.identifier) else {
            // the manifest holds the digest table and cannot list itself
            let manifest = feature_level && content.name == FEATURE_MANIFEST;
            if self.require_digests && !manifest {
                return Ok(Some(finding(
                    VerificationKind::Unsigned,
                    "no digest declared".to_string(),
                )));
            }
            return Ok(None);
        };

        let expected = Digest::parse(declared)?;
        let stream = content.open().await?;
        Ok(expected.check_stream(stream).await?.map(|actual| {
            finding(
                VerificationKind::Corrupted,
                format!("expected {expected}, got {actual}"),
            )
        }))
    }
}

/// Non-interactive listener driven by configuration
#[derive(Debug, Clone, Copy)]
pub struct PolicyListener {
    accept_unsigned: bool,
}

impl PolicyListener {
    #[must_use]
    pub fn new(accept_unsigned: bool) -> Self {
        Self { accept_unsigned }
    }
}

impl Default for PolicyListener {
    fn default() -> Self {
        Self::new(true)
    }
}

impl VerificationListener for PolicyListener {
    fn prompt(&self, result: &VerificationResult) -> VerificationResponse {
        match result.kind {
            VerificationKind::Unsigned if self.accept_unsigned => VerificationResponse::Accept,
            VerificationKind::Unsigned => VerificationResponse::Abort,
            VerificationKind::Corrupted | VerificationKind::Unknown => VerificationResponse::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature_with_digest(reference: &str, digest: &str) -> Feature {
        let mut feature = Feature::new("f_1.0.0".parse().unwrap());
        feature
            .digests
            .insert(reference.to_string(), digest.to_string());
        feature
    }

    #[tokio::test]
    async fn matching_digest_is_trusted() {
        let content = ContentRef::memory("plugins/p_1.0.0/a.jar", "a.jar", b"payload");
        let feature = feature_with_digest(&content.identifier, &Digest::of(b"payload").to_hex());
        let result = DigestVerifier::new(true)
            .verify(&feature, &content, false, &ProgressMonitor::new())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn mismatched_digest_is_corrupted() {
        let content = ContentRef::memory("plugins/p_1.0.0/a.jar", "a.jar", b"tampered");
        let feature = feature_with_digest(&content.identifier, &Digest::of(b"payload").to_hex());
        let result = DigestVerifier::default()
            .verify(&feature, &content, false, &ProgressMonitor::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.kind, VerificationKind::Corrupted);
        assert_eq!(
            PolicyListener::default().prompt(&result),
            VerificationResponse::Error
        );
    }

    #[tokio::test]
    async fn missing_digest_depends_on_policy() {
        let content = ContentRef::memory("features/f_1.0.0/about.html", "about.html", b"x");
        let feature = Feature::new("f_1.0.0".parse().unwrap());
        let monitor = ProgressMonitor::new();

        assert!(DigestVerifier::new(false)
            .verify(&feature, &content, true, &monitor)
            .await
            .unwrap()
            .is_none());

        let finding = DigestVerifier::new(true)
            .verify(&feature, &content, true, &monitor)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(finding.kind, VerificationKind::Unsigned);
        assert!(finding.feature_level);
        assert_eq!(
            PolicyListener::new(true).prompt(&finding),
            VerificationResponse::Accept
        );
        assert_eq!(
            PolicyListener::new(false).prompt(&finding),
            VerificationResponse::Abort
        );
    }

    #[tokio::test]
    async fn manifest_needs_no_digest_of_its_own() {
        let manifest = ContentRef::memory("features/f_1.0.0/feature.toml", FEATURE_MANIFEST, b"x");
        let feature = Feature::new("f_1.0.0".parse().unwrap());
        let monitor = ProgressMonitor::new();

        assert!(DigestVerifier::new(true)
            .verify(&feature, &manifest, true, &monitor)
            .await
            .unwrap()
            .is_none());

        // a plugin file of the same name is still held to the rule
        let plugin_file = ContentRef::memory("plugins/p_1.0.0/feature.toml", FEATURE_MANIFEST, b"x");
        assert!(DigestVerifier::new(true)
            .verify(&feature, &plugin_file, false, &monitor)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn cancelled_monitor_aborts_verification() {
        let content = ContentRef::memory("x", "x", b"x");
        let feature = Feature::new("f_1.0.0".parse().unwrap());
        let monitor = ProgressMonitor::new();
        monitor.cancel();
        let err = DigestVerifier::default()
            .verify(&feature, &content, false, &monitor)
            .await
            .unwrap_err();
        assert!(err.is_aborted());
    }
}
