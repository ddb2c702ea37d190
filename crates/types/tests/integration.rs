//! Integration tests for types

use fman_types::*;
use proptest::prelude::*;

fn version_strategy() -> impl Strategy<Value = Version> {
    (0u64..5, 0u64..5, 0u64..5).prop_map(|(a, b, c)| Version::new(a, b, c))
}

proptest! {
    #[test]
    fn perfect_implies_every_rule(v in version_strategy()) {
        let id = VersionedIdentifier::new("org.example", v);
        for rule in [
            MatchRule::Perfect,
            MatchRule::Equivalent,
            MatchRule::Compatible,
            MatchRule::GreaterOrEqual,
            MatchRule::Prefix,
        ] {
            prop_assert!(rule.matches(&id, &id));
        }
    }

    #[test]
    fn rules_nest(base in version_strategy(), cand in version_strategy()) {
        let b = VersionedIdentifier::new("org.example", base);
        let c = VersionedIdentifier::new("org.example", cand);
        if MatchRule::Equivalent.matches(&c, &b) {
            prop_assert!(MatchRule::Compatible.matches(&c, &b));
        }
        if MatchRule::Compatible.matches(&c, &b) {
            prop_assert!(MatchRule::GreaterOrEqual.matches(&c, &b));
        }
        if MatchRule::GreaterOrEqual.matches(&c, &b) {
            prop_assert!(MatchRule::Prefix.matches(&c, &b));
        }
    }

    #[test]
    fn older_never_matches_non_perfect(base in version_strategy(), cand in version_strategy()) {
        prop_assume!(cand < base);
        let b = VersionedIdentifier::new("x", base);
        let c = VersionedIdentifier::new("x", cand);
        prop_assert!(!MatchRule::GreaterOrEqual.matches(&c, &b));
        prop_assert!(!MatchRule::Prefix.matches(&c, &b));
    }
}

#[test]
fn feature_deserializes_from_toml() {
    let raw = r#"
        identifier = { id = "org.example.editor", version = "2.1" }
        label = "Editor"
        primary = true

        [[plugin_entries]]
        identifier = { id = "org.example.editor.core", version = "2.1.0.v2024" }
        os = "linux,macos"
        download_size = 1024

        [[imports]]
        identifier = { id = "org.example.base", version = "1.0.0" }
        match_rule = "compatible"
        kind = "feature"

        [[included]]
        identifier = { id = "org.example.docs", version = "2.1.0" }
        optional = true
        search_location = "self"
    "#;
    let feature: Feature = toml::from_str(raw).unwrap();
    assert_eq!(feature.identifier.to_string(), "org.example.editor_2.1.0");
    assert_eq!(feature.plugin_entries.len(), 1);
    assert_eq!(feature.plugin_entries[0].filters.os.as_deref(), Some("linux,macos"));
    assert_eq!(feature.imports[0].match_rule, MatchRule::Compatible);
    assert_eq!(feature.included[0].search_location, SearchLocation::SelfSite);
    assert!(feature.included[0].optional);
    assert!(!feature.is_patch());
    assert!(feature.site().is_none());
}

#[test]
fn activity_serializes_snake_case() {
    let activity = Activity::new(ActivityAction::SiteInstall, "file:///s", ActivityStatus::Ok);
    let json = serde_json::to_string(&activity).unwrap();
    assert!(json.contains("\"site_install\""));
    assert!(json.contains("\"ok\""));
}

#[test]
fn test_output_format_default() {
    assert_eq!(OutputFormat::default(), OutputFormat::Tty);
}
