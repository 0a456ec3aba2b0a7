//! Scope-of-work consolidation.
//!
//! Free-text scope labels are mapped onto canonical trade categories by an
//! ordered keyword/exclusion rule list, first match wins. A previously saved
//! mapping table can be replayed instead of re-running the rules; both paths
//! go through [`resolve_scope`] so they agree on every label.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub const UNKNOWN_SCOPE: &str = "Unknown/Unspecified Scope";
pub const AC_PAVING_SCOPE: &str = "AC Paving & Asphalt Work (Consolidated)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationRule {
    pub key: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    pub name: String,
}

impl ConsolidationRule {
    pub fn new(key: &str, keywords: &[&str], exclude: &[&str], name: &str) -> Self {
        Self {
            key: key.to_string(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            exclude: exclude.iter().map(|e| e.to_lowercase()).collect(),
            name: name.to_string(),
        }
    }

    /// `scope` must already be lower-cased and trimmed.
    pub fn matches(&self, scope: &str) -> bool {
        let has_keyword = self
            .keywords
            .iter()
            .any(|keyword| scope.contains(keyword.to_lowercase().as_str()));
        let has_exclusion = self
            .exclude
            .iter()
            .any(|term| scope.contains(term.to_lowercase().as_str()));
        has_keyword && !has_exclusion
    }
}

/// The built-in trade categories in priority order.
pub fn default_rules() -> Vec<ConsolidationRule> {
    vec![
        ConsolidationRule::new(
            "AC_PAVING_WORK",
            &[
                "ac paving",
                "asphalt paving",
                "ac grinding",
                "ac mill",
                "asphalt grinding",
                "asphalt work",
                "asphalt concrete",
                "ac panel",
                "grinding & paving",
                "grinding, paving",
                "ac & grinding",
            ],
            &["design", "survey", "testing"],
            AC_PAVING_SCOPE,
        ),
        ConsolidationRule::new(
            "GRINDING_WORK",
            &["grinding"],
            &["ac", "asphalt", "paving", "design", "survey", "testing"],
            "Grinding Work (Consolidated)",
        ),
        ConsolidationRule::new(
            "CONCRETE_WORK",
            &["concrete", "cast in place"],
            &["ac", "asphalt", "design"],
            "Concrete Work (Consolidated)",
        ),
        ConsolidationRule::new(
            "TRAFFIC_CONTROL",
            &["traffic", "sawcutting"],
            &["design"],
            "Traffic Control & Sawcutting (Consolidated)",
        ),
        ConsolidationRule::new(
            "PIPELINE_WORK",
            &["cipp", "cipl", "pipeline", "sewer", "water"],
            &["design", "testing"],
            "Pipeline & Sewer Work (Consolidated)",
        ),
        ConsolidationRule::new(
            "TRUCKING_HAULING",
            &["trucking", "hauling", "transport"],
            &[],
            "Trucking & Hauling (Consolidated)",
        ),
        ConsolidationRule::new(
            "ENGINEERING_DESIGN",
            &["engineering", "design", "survey"],
            &[],
            "Engineering & Design Services (Consolidated)",
        ),
        ConsolidationRule::new(
            "ELECTRICAL_WORK",
            &["electrical", "electric"],
            &[],
            "Electrical Work (Consolidated)",
        ),
        ConsolidationRule::new(
            "STRUCTURAL_WORK",
            &["structural", "steel", "frame"],
            &[],
            "Structural Work (Consolidated)",
        ),
    ]
}

/// Anything that can turn a raw scope label into a canonical one.
pub trait ScopeResolver {
    /// Canonical name for a present, non-blank scope, or `None` to pass it through.
    fn lookup(&self, original: &str) -> Option<String>;

    fn resolve(&self, original: Option<&str>) -> String {
        resolve_scope(original, |scope| self.lookup(scope))
    }
}

/// Shared resolution: missing → unknown, matched → canonical, else trimmed original.
pub fn resolve_scope<F>(original: Option<&str>, lookup: F) -> String
where
    F: FnOnce(&str) -> Option<String>,
{
    match original.filter(|scope| !scope.trim().is_empty()) {
        None => UNKNOWN_SCOPE.to_string(),
        Some(scope) => lookup(scope).unwrap_or_else(|| scope.trim().to_string()),
    }
}

#[derive(Debug, Clone)]
pub struct ScopeClassifier {
    rules: Vec<ConsolidationRule>,
}

impl Default for ScopeClassifier {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl ScopeClassifier {
    pub fn new(rules: Vec<ConsolidationRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ConsolidationRule] {
        &self.rules
    }

    pub fn matching_rule(&self, original: &str) -> Option<&ConsolidationRule> {
        let normalized = original.to_lowercase();
        let normalized = normalized.trim();
        self.rules.iter().find(|rule| rule.matches(normalized))
    }

    /// Classify every scope in order, collecting the audit mapping as a side output.
    pub fn consolidate<'a, I>(&self, scopes: I) -> Consolidation
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let mut canonical = Vec::new();
        let mut mapping = MappingBuilder::default();
        for original in scopes {
            let name = self.resolve(original);
            mapping.record(original, &name);
            canonical.push(name);
        }

        let consolidation = Consolidation {
            canonical,
            mapping: mapping.finish(),
        };
        tracing::info!(
            records = consolidation.canonical.len(),
            distinct_originals = consolidation.mapping.len(),
            "classified scopes"
        );
        consolidation
    }
}

impl ScopeResolver for ScopeClassifier {
    fn lookup(&self, original: &str) -> Option<String> {
        self.matching_rule(original).map(|rule| rule.name.clone())
    }
}

#[derive(Debug, Clone)]
pub struct Consolidation {
    /// Canonical scope per input, in input order
    pub canonical: Vec<String>,
    pub mapping: ScopeMapping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeMappingEntry {
    #[serde(rename = "OriginalScope")]
    pub original: Option<String>,
    #[serde(rename = "ScopeOfWork")]
    pub canonical: String,
}

pub const MAPPING_HEADERS: [&str; 2] = ["OriginalScope", "ScopeOfWork"];

/// Distinct original → canonical pairs, ordered by canonical name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeMapping {
    entries: Vec<ScopeMappingEntry>,
    lookup: HashMap<String, String>,
}

impl ScopeMapping {
    /// Build from rows in file order; the first entry for an original wins.
    pub fn from_entries(entries: Vec<ScopeMappingEntry>) -> Self {
        let mut lookup = HashMap::new();
        for entry in &entries {
            if let Some(original) = &entry.original {
                lookup
                    .entry(original.clone())
                    .or_insert_with(|| entry.canonical.clone());
            }
        }
        Self { entries, lookup }
    }

    pub fn entries(&self) -> &[ScopeMappingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct present originals folded into each canonical scope,
    /// largest first; ties keep name order.
    pub fn summary(&self) -> Vec<(String, usize)> {
        let mut counts: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for entry in &self.entries {
            let originals = counts.entry(entry.canonical.as_str()).or_default();
            if let Some(original) = &entry.original {
                originals.insert(original.as_str());
            }
        }

        let mut summary: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(canonical, originals)| (canonical.to_string(), originals.len()))
            .collect();
        summary.sort_by(|a, b| b.1.cmp(&a.1));
        summary
    }
}

impl ScopeResolver for ScopeMapping {
    fn lookup(&self, original: &str) -> Option<String> {
        self.lookup.get(original).cloned()
    }
}

#[derive(Debug, Default)]
struct MappingBuilder {
    seen: BTreeSet<(Option<String>, String)>,
    entries: Vec<ScopeMappingEntry>,
}

impl MappingBuilder {
    fn record(&mut self, original: Option<&str>, canonical: &str) {
        let original = original.map(str::to_string);
        if self.seen.insert((original.clone(), canonical.to_string())) {
            self.entries.push(ScopeMappingEntry {
                original,
                canonical: canonical.to_string(),
            });
        }
    }

    fn finish(mut self) -> ScopeMapping {
        self.entries.sort_by(|a, b| a.canonical.cmp(&b.canonical));
        ScopeMapping::from_entries(self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn classify(scope: &str) -> String {
        ScopeClassifier::default().resolve(Some(scope))
    }

    #[test]
    fn electrical_keywords_map_to_electrical() {
        for scope in ["Electrical", "ELECTRIC SERVICE", "street lighting & electrical"] {
            assert_eq!(classify(scope), "Electrical Work (Consolidated)", "{scope}");
        }
    }

    #[test]
    fn ac_paving_variants_collapse() {
        for scope in ["AC Paving", "AC paving & Concrete flatwork", " asphalt concrete overlay "] {
            assert_eq!(classify(scope), AC_PAVING_SCOPE, "{scope}");
        }
    }

    #[test]
    fn ac_paving_exclusions_fall_through() {
        // Excluded from paving, caught later by the engineering rule
        assert_eq!(
            classify("AC Paving Design"),
            "Engineering & Design Services (Consolidated)"
        );
        assert_eq!(
            classify("Asphalt paving survey"),
            "Engineering & Design Services (Consolidated)"
        );
        // Excluded from paving, no later rule applies
        assert_eq!(classify("AC paving testing"), "AC paving testing");
    }

    #[test]
    fn declaration_order_decides_overlaps() {
        // Both concrete and pipeline keywords; concrete is declared first
        assert_eq!(classify("Concrete sewer boxes"), "Concrete Work (Consolidated)");
        // "ac" inside "surface" vetoes concrete, so pipeline wins
        assert_eq!(
            classify("Concrete surface water drains"),
            "Pipeline & Sewer Work (Consolidated)"
        );
        assert_eq!(classify("Grinding"), "Grinding Work (Consolidated)");
    }

    #[test]
    fn unmatched_scopes_pass_through_trimmed() {
        assert_eq!(classify("  Landscaping  "), "Landscaping");
        assert_eq!(classify("Striping"), "Striping");
    }

    #[test]
    fn missing_or_blank_scope_is_unknown() {
        let classifier = ScopeClassifier::default();
        assert_eq!(classifier.resolve(None), UNKNOWN_SCOPE);
        assert_eq!(classifier.resolve(Some("   ")), UNKNOWN_SCOPE);
    }

    #[test]
    fn custom_rules_replace_defaults() {
        let classifier = ScopeClassifier::new(vec![ConsolidationRule::new(
            "LANDSCAPE",
            &["Landscap"],
            &["design"],
            "Landscaping (Consolidated)",
        )]);
        assert_eq!(classifier.resolve(Some("landscaping")), "Landscaping (Consolidated)");
        assert_eq!(classifier.resolve(Some("Electrical")), "Electrical");
    }

    #[test]
    fn mapping_is_distinct_and_sorted_by_canonical() {
        let scopes = [
            Some("Traffic Control"),
            Some("AC Paving"),
            None,
            Some("AC Paving"),
            Some("ac paving "),
            Some("Landscaping"),
        ];
        let consolidation = ScopeClassifier::default().consolidate(scopes);

        let pairs: Vec<(Option<&str>, &str)> = consolidation
            .mapping
            .entries()
            .iter()
            .map(|e| (e.original.as_deref(), e.canonical.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (Some("AC Paving"), AC_PAVING_SCOPE),
                (Some("ac paving "), AC_PAVING_SCOPE),
                (Some("Landscaping"), "Landscaping"),
                (Some("Traffic Control"), "Traffic Control & Sawcutting (Consolidated)"),
                (None, UNKNOWN_SCOPE),
            ]
        );
        assert_eq!(consolidation.canonical.len(), scopes.len());
    }

    #[test]
    fn replaying_the_mapping_reproduces_classification() {
        let scopes = [
            Some("AC Paving"),
            Some("AC paving & Concrete flatwork"),
            Some("Electrical"),
            Some("Survey"),
            Some("Misc. Metals"),
            None,
            Some(""),
        ];
        let classifier = ScopeClassifier::default();
        let first = classifier.consolidate(scopes);

        let replayed = ScopeMapping::from_entries(first.mapping.entries().to_vec());
        let replay_labels: Vec<String> = scopes.iter().map(|s| replayed.resolve(*s)).collect();
        assert_eq!(replay_labels, first.canonical);

        let second = classifier.consolidate(scopes);
        assert_eq!(second.canonical, first.canonical);
        assert_eq!(second.mapping, first.mapping);
    }

    #[test]
    fn unmapped_scopes_pass_through_on_replay() {
        let mapping = ScopeMapping::from_entries(vec![ScopeMappingEntry {
            original: Some("Electrical".to_string()),
            canonical: "Electrical Work (Consolidated)".to_string(),
        }]);
        assert_eq!(mapping.resolve(Some("Electrical")), "Electrical Work (Consolidated)");
        assert_eq!(mapping.resolve(Some(" Fencing ")), "Fencing");
        assert_eq!(mapping.resolve(None), UNKNOWN_SCOPE);
    }

    #[test]
    fn summary_counts_distinct_originals() {
        let consolidation = ScopeClassifier::default().consolidate([
            Some("AC Paving"),
            Some("AC paving"),
            Some("Asphalt Work"),
            Some("Electrical"),
            None,
        ]);
        let summary = consolidation.mapping.summary();
        assert_eq!(summary[0], (AC_PAVING_SCOPE.to_string(), 3));
        assert!(summary.contains(&(UNKNOWN_SCOPE.to_string(), 0)));
    }

    const AC_PAVING_KEYWORDS: [&str; 11] = [
        "ac paving",
        "asphalt paving",
        "ac grinding",
        "ac mill",
        "asphalt grinding",
        "asphalt work",
        "asphalt concrete",
        "ac panel",
        "grinding & paving",
        "grinding, paving",
        "ac & grinding",
    ];

    fn mixed_case(text: &str, upper: bool) -> String {
        if upper {
            text.to_uppercase()
        } else {
            text.to_string()
        }
    }

    fn scope_label() -> impl Strategy<Value = Option<String>> {
        let known = prop::sample::select(vec![
            "AC Paving",
            "ac paving ",
            "Asphalt Work",
            "Electrical",
            "Traffic Control",
            "Sewer lateral",
            "Survey",
            "Striping",
            "   ",
            "",
        ])
        .prop_map(str::to_string);
        prop::option::of(prop_oneof![known, "\\PC{0,24}"])
    }

    proptest! {
        // Filler letters cannot spell any earlier rule's keyword
        #[test]
        fn electric_scopes_are_electrical(
            prefix in "[blmnoy0-9 &,/-]{0,12}",
            keyword in prop::sample::select(vec!["electric", "electrical", "Electric"]),
            suffix in "[blmnoy0-9 &,/-]{0,12}",
            upper in any::<bool>(),
        ) {
            let scope = mixed_case(&format!("{prefix}{keyword}{suffix}"), upper);
            prop_assert_eq!(classify(&scope), "Electrical Work (Consolidated)");
        }

        #[test]
        fn excluded_paving_never_lands_in_paving(
            keyword in prop::sample::select(AC_PAVING_KEYWORDS.to_vec()),
            exclusion in prop::sample::select(vec!["design", "survey", "testing"]),
            filler in "\\PC{0,16}",
            exclusion_first in any::<bool>(),
            upper in any::<bool>(),
        ) {
            let scope = if exclusion_first {
                format!("{exclusion} {filler} {keyword}")
            } else {
                format!("{keyword} {filler} {exclusion}")
            };
            let scope = mixed_case(&scope, upper);
            prop_assert_ne!(classify(&scope), AC_PAVING_SCOPE);
        }

        #[test]
        fn blank_scopes_are_unknown(blank in "[ \\t]{0,6}") {
            prop_assert_eq!(classify(&blank), UNKNOWN_SCOPE);
        }

        #[test]
        fn mapping_replay_matches_direct_classification(
            scopes in prop::collection::vec(scope_label(), 0..40),
        ) {
            let classifier = ScopeClassifier::default();
            let first = classifier.consolidate(scopes.iter().map(|s| s.as_deref()));

            let replayed = ScopeMapping::from_entries(first.mapping.entries().to_vec());
            let replay_labels: Vec<String> =
                scopes.iter().map(|s| replayed.resolve(s.as_deref())).collect();
            prop_assert_eq!(&replay_labels, &first.canonical);

            let second = classifier.consolidate(scopes.iter().map(|s| s.as_deref()));
            prop_assert_eq!(second.canonical, first.canonical);
            prop_assert_eq!(second.mapping, first.mapping);
        }
    }
}
