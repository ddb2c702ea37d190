//! Feature health against a configuration

use fman_errors::{Error, SiteError};
use fman_site::FeatureReference;
use fman_types::{
    Environment, Feature, FeatureStatus, ImportKind, MatchRule, SearchLocation, SiteUrl, StatusReport,
    VersionedIdentifier,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::configuration::InstallConfiguration;

/// Everything configured on the enabled sites, resolved once
struct ConfiguredView {
    features: Vec<(SiteUrl, Arc<Feature>)>,
    plugins: HashMap<SiteUrl, HashSet<VersionedIdentifier>>,
}

impl ConfiguredView {
    async fn build(configuration: &InstallConfiguration) -> Self {
        let mut features = Vec::new();
        let mut plugins = HashMap::new();
        for site in configuration.sites().iter().filter(|s| s.is_enabled()) {
            for (_, feature) in site.configured_features().await {
                features.push((site.url().clone(), feature));
            }
            let installed = match site.site().installed_plugins().await {
                Ok(list) => list.into_iter().collect(),
                Err(e) => {
                    tracing::debug!(site = %site.url(), error = %e, "cannot list plugins");
                    HashSet::new()
                }
            };
            plugins.insert(site.url().clone(), installed);
        }
        Self { features, plugins }
    }

    fn has_plugin(&self, site: &SiteUrl, plugin: &VersionedIdentifier) -> bool {
        self.plugins.get(site).is_some_and(|p| p.contains(plugin))
    }

    fn any_plugin(&self, pred: impl Fn(&VersionedIdentifier) -> bool) -> bool {
        self.plugins.values().flatten().any(pred)
    }

    /// Distinct configured features satisfying `base`, best version first
    fn children<'a>(
        &'a self,
        site: &SiteUrl,
        base: &VersionedIdentifier,
        rule: MatchRule,
        location: SearchLocation,
    ) -> Vec<&'a Arc<Feature>> {
        let mut found: Vec<&Arc<Feature>> = self
            .features
            .iter()
            .filter(|(url, _)| location == SearchLocation::Root || url == site)
            .map(|(_, f)| f)
            .filter(|f| rule.matches(&f.identifier, base))
            .collect();
        found.sort_by(|a, b| b.identifier.cmp(&a.identifier));
        found.dedup_by(|a, b| a.identifier == b.identifier);
        found
    }

    fn evaluate(
        &self,
        site: &SiteUrl,
        feature: &Feature,
        environment: &Environment,
        visiting: &mut HashSet<VersionedIdentifier>,
    ) -> StatusReport {
        let mut report = StatusReport::happy(feature.identifier.clone());
        if !visiting.insert(feature.identifier.clone()) {
            return report;
        }

        for plugin in feature.plugins_for(environment) {
            if !self.has_plugin(site, &plugin.identifier) {
                report.degrade(
                    FeatureStatus::Unhappy,
                    format!("plugin {} missing", plugin.identifier),
                );
            }
        }

        for import in &feature.imports {
            let satisfied = match import.kind {
                ImportKind::Feature => self
                    .features
                    .iter()
                    .any(|(_, f)| import.is_satisfied_by(&f.identifier)),
                ImportKind::Plugin => self.any_plugin(|p| import.is_satisfied_by(p)),
            };
            if !satisfied {
                report.degrade(
                    FeatureStatus::Unhappy,
                    format!("prerequisite {} not satisfied", import.identifier),
                );
            }
        }

        for decl in &feature.included {
            let found = self.children(site, &decl.identifier, decl.match_rule, decl.search_location);
            let Some(best) = found.first() else {
                if !decl.optional {
                    report.degrade(
                        FeatureStatus::Unhappy,
                        format!("included feature {} missing", decl.identifier),
                    );
                }
                continue;
            };

            if found.len() > 1 {
                report.degrade(
                    FeatureStatus::Ambiguous,
                    format!("{} versions of {} configured", found.len(), decl.identifier.id),
                );
            } else if best.identifier != decl.identifier {
                report.degrade(
                    FeatureStatus::Ambiguous,
                    format!("included feature {} matched {}", decl.identifier, best.identifier),
                );
            }

            let child_site = self
                .features
                .iter()
                .find(|(_, f)| Arc::ptr_eq(f, best))
                .map_or(site, |(url, _)| url);
            let child = self.evaluate(child_site, best, environment, visiting);
            if child.status == FeatureStatus::Unhappy && !decl.optional {
                report.degrade(
                    FeatureStatus::Unhappy,
                    format!("included feature {} is unhappy", best.identifier),
                );
            }
        }

        visiting.remove(&feature.identifier);
        report
    }
}

/// Status of `reference` in `configuration`
///
/// # Errors
///
/// Returns `SiteError::FeatureNotFound` when the manifest cannot be read and
/// the reference URL does not encode an identifier.
pub async fn feature_status(
    configuration: &InstallConfiguration,
    reference: &FeatureReference,
    environment: &Environment,
) -> Result<StatusReport, Error> {
    let resolved = reference.resolve().await;
    let identifier = match (&resolved, reference.identifier_hint()) {
        (Ok(feature), _) => feature.identifier.clone(),
        (Err(_), Some(hint)) => hint.clone(),
        (Err(_), None) => {
            return Err(SiteError::FeatureNotFound {
                site: reference.site().to_string(),
                feature: reference.url().to_string(),
            }
            .into())
        }
    };

    let Some(site) = configuration.site(reference.site()) else {
        return Ok(StatusReport::disabled(identifier, "site not configured"));
    };
    if !site.is_enabled() {
        return Ok(StatusReport::disabled(identifier, "site disabled"));
    }
    if !site.is_configured(reference) {
        return Ok(StatusReport::disabled(identifier, "feature not configured"));
    }

    let feature = match resolved {
        Ok(feature) => feature,
        Err(e) => {
            let mut report = StatusReport::happy(identifier);
            report.degrade(FeatureStatus::Unhappy, format!("manifest unavailable: {e}"));
            return Ok(report);
        }
    };

    let view = ConfiguredView::build(configuration).await;
    let mut visiting = HashSet::new();
    Ok(view.evaluate(site.url(), &feature, environment, &mut visiting))
}
