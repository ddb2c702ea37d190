use fman_site::FeatureReference;
use fman_types::SiteUrl;
use std::fmt;

/// Observer of configured-site state changes.
///
/// Callbacks run after the change is applied. A panicking callback is logged
/// and otherwise ignored.
pub trait ConfiguredSiteListener: Send + Sync + fmt::Debug {
    fn feature_installed(&self, _site: &SiteUrl, _feature: &FeatureReference) {}

    fn feature_removed(&self, _site: &SiteUrl, _feature: &FeatureReference) {}

    fn feature_configured(&self, _site: &SiteUrl, _feature: &FeatureReference) {}

    fn feature_unconfigured(&self, _site: &SiteUrl, _feature: &FeatureReference) {}
}
