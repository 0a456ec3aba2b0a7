use crate::consolidation::ConsolidationRule;
use crate::error::{AnalysisError, AnalysisResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The "Contract Info" sheet of the bid workbook, exported as CSV
    pub bid_data_path: String,
    pub analysis_directory: String,
    pub lbe_directory: String,
    pub consolidated_directory: String,
    pub role_filter: RoleFilter,
    pub thresholds: Thresholds,
    pub columns: BidColumns,
    /// Replaces the built-in consolidation rules when present (order is priority)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<ConsolidationRule>>,
}

/// Which records feed the market aggregates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleFilter {
    #[default]
    #[serde(rename = "sub")]
    Sub,
    #[serde(rename = "prime")]
    Prime,
    #[serde(rename = "all")]
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Minimum share-of-scope for a firm to count as dominant
    pub dominance_share: f64,
    /// HHI at or above this is at least moderately concentrated
    pub moderate_hhi: f64,
    /// HHI strictly above this is highly concentrated
    pub high_hhi: f64,
    pub opportunity_min_dollars: f64,
    pub opportunity_max_lbe_rate: f64,
    pub competitive_min_dollars: f64,
    /// Relative difference tolerated between independently computed scope totals
    pub cross_check_tolerance: f64,
}

/// Header names of the raw bid table. Matched after trimming whitespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BidColumns {
    pub role: String,
    pub lbe: String,
    pub sub_amount: String,
    pub scope: String,
    pub contractor: String,
    pub contract_id: String,
    pub award_amount: String,
    pub engineers_estimate: String,
    pub lbe_requirement: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bid_data_path: "2020BidData.csv".to_string(),
            analysis_directory: "analysis_results".to_string(),
            lbe_directory: "lbe_analysis".to_string(),
            consolidated_directory: "consolidated_analysis".to_string(),
            role_filter: RoleFilter::Sub,
            thresholds: Thresholds::default(),
            columns: BidColumns::default(),
            rules: None,
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            dominance_share: 0.25,
            moderate_hhi: 1500.0,
            high_hhi: 2500.0,
            opportunity_min_dollars: 500_000.0,
            opportunity_max_lbe_rate: 0.3,
            competitive_min_dollars: 100_000.0,
            cross_check_tolerance: 0.005,
        }
    }
}

impl Default for BidColumns {
    fn default() -> Self {
        Self {
            role: "Sub/Prime".to_string(),
            lbe: "LBE?".to_string(),
            sub_amount: "SUB $$".to_string(),
            scope: "Scope of Work".to_string(),
            contractor: "Contractor Name".to_string(),
            contract_id: "Contract ID".to_string(),
            award_amount: "Contract Award Amount (Awarded)".to_string(),
            engineers_estimate: "Engineers Estimate".to_string(),
            lbe_requirement: "LBE Requirement".to_string(),
        }
    }
}

impl Config {
    pub fn load_from_file(file_path: &str) -> AnalysisResult<Self> {
        let content = std::fs::read_to_string(file_path).map_err(|source| AnalysisError::Io {
            path: file_path.into(),
            source,
        })?;
        let config: Config =
            toml::from_str(&content).map_err(|e| AnalysisError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, file_path: &str) -> AnalysisResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| AnalysisError::Config(e.to_string()))?;
        std::fs::write(file_path, content).map_err(|source| AnalysisError::Io {
            path: file_path.into(),
            source,
        })?;
        Ok(())
    }

    pub fn validate(&self) -> AnalysisResult<()> {
        if self.thresholds.moderate_hhi > self.thresholds.high_hhi {
            return Err(AnalysisError::Config(format!(
                "moderate_hhi ({}) exceeds high_hhi ({})",
                self.thresholds.moderate_hhi, self.thresholds.high_hhi
            )));
        }
        if let Some(rules) = &self.rules {
            if let Some(rule) = rules.iter().find(|rule| rule.keywords.is_empty()) {
                return Err(AnalysisError::Config(format!(
                    "consolidation rule `{}` has no keywords",
                    rule.key
                )));
            }
        }
        Ok(())
    }

    pub fn analysis_dir(&self) -> &Path {
        Path::new(&self.analysis_directory)
    }

    pub fn lbe_dir(&self) -> &Path {
        Path::new(&self.lbe_directory)
    }

    pub fn consolidated_dir(&self) -> &Path {
        Path::new(&self.consolidated_directory)
    }
}

/// One subcontract line item from the raw bid table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BidRecord {
    pub contract_id: Option<String>,
    pub contractor_name: Option<String>,
    pub scope_of_work: Option<String>,
    pub sub_amount: Option<f64>,
    pub award_amount: Option<f64>,
    pub engineers_estimate: Option<f64>,
    pub role_flag: Option<String>,
    pub lbe_flag: Option<String>,
    pub lbe_requirement: Option<f64>,
}

impl BidRecord {
    pub fn is_prime(&self) -> bool {
        flag_contains(self.role_flag.as_deref(), "prime")
    }

    pub fn is_sub(&self) -> bool {
        flag_contains(self.role_flag.as_deref(), "sub")
    }

    pub fn is_lbe(&self) -> bool {
        flag_contains(self.lbe_flag.as_deref(), "y")
    }

    pub fn matches_role(&self, filter: RoleFilter) -> bool {
        match filter {
            RoleFilter::Sub => self.is_sub(),
            RoleFilter::Prime => self.is_prime(),
            RoleFilter::All => true,
        }
    }

    /// Amount usable in market aggregates: present and strictly positive.
    pub fn positive_amount(&self) -> Option<f64> {
        self.sub_amount.filter(|amount| *amount > 0.0)
    }

    pub fn to_subcontractor_record(&self) -> Option<SubcontractorRecord> {
        Some(SubcontractorRecord {
            contract_id: self.contract_id.clone(),
            subcontractor_name: self.contractor_name.clone(),
            scope_of_work: self.scope_of_work.clone(),
            sub_amount: self.positive_amount()?,
            is_lbe: self.is_lbe(),
        })
    }
}

/// A subcontract line that survived role and amount filtering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubcontractorRecord {
    #[serde(rename = "ContractID")]
    pub contract_id: Option<String>,
    #[serde(rename = "SubcontractorName")]
    pub subcontractor_name: Option<String>,
    #[serde(rename = "ScopeOfWork")]
    pub scope_of_work: Option<String>,
    #[serde(rename = "SubAmount")]
    pub sub_amount: f64,
    #[serde(rename = "IsLBE")]
    pub is_lbe: bool,
}

pub const SUBCONTRACTOR_HEADERS: [&str; 5] =
    ["ContractID", "SubcontractorName", "ScopeOfWork", "SubAmount", "IsLBE"];

/// Case-insensitive substring test; missing flags never match.
pub fn flag_contains(flag: Option<&str>, needle: &str) -> bool {
    flag.map(|value| value.to_lowercase().contains(&needle.to_lowercase()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidation::{ScopeClassifier, ScopeResolver};

    fn record(role: Option<&str>, lbe: Option<&str>) -> BidRecord {
        BidRecord {
            role_flag: role.map(str::to_string),
            lbe_flag: lbe.map(str::to_string),
            ..BidRecord::default()
        }
    }

    #[test]
    fn role_flags_are_case_insensitive_and_not_exclusive() {
        let both = record(Some("PRIME / sub"), None);
        assert!(both.is_prime());
        assert!(both.is_sub());

        let neither = record(Some("Supplier"), None);
        assert!(!neither.is_prime());
        assert!(!neither.is_sub());
    }

    #[test]
    fn missing_flags_are_false() {
        let blank = record(None, None);
        assert!(!blank.is_prime());
        assert!(!blank.is_sub());
        assert!(!blank.is_lbe());
    }

    #[test]
    fn lbe_flag_matches_any_y() {
        assert!(record(None, Some("Y")).is_lbe());
        assert!(record(None, Some("yes")).is_lbe());
        assert!(!record(None, Some("N")).is_lbe());
    }

    #[test]
    fn non_positive_amounts_do_not_become_subcontractor_records() {
        let mut bid = record(Some("Sub"), Some("N"));
        bid.sub_amount = Some(-10.0);
        assert!(bid.to_subcontractor_record().is_none());
        bid.sub_amount = Some(10.0);
        assert_eq!(bid.to_subcontractor_record().map(|r| r.sub_amount), Some(10.0));
    }

    #[test]
    fn config_round_trips_through_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        let path = path.to_str().expect("utf8 path");

        let mut config = Config::default();
        config.thresholds.dominance_share = 0.3;
        config.role_filter = RoleFilter::All;
        config.save_to_file(path).expect("save");

        let loaded = Config::load_from_file(path).expect("load");
        assert_eq!(loaded.thresholds, config.thresholds);
        assert_eq!(loaded.role_filter, RoleFilter::All);
        assert!(loaded.rules.is_none());
    }

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let config: Config =
            toml::from_str("role_filter = \"prime\"\n[thresholds]\nhigh_hhi = 3000.0\n")
                .expect("parse");
        assert_eq!(config.role_filter, RoleFilter::Prime);
        assert_eq!(config.thresholds.high_hhi, 3000.0);
        assert_eq!(config.thresholds.moderate_hhi, 1500.0);
        assert_eq!(config.columns.sub_amount, "SUB $$");
    }

    #[test]
    fn role_filter_selects_records() {
        let sub = record(Some("Sub"), None);
        let prime = record(Some("Prime"), None);
        let supplier = record(Some("Supplier"), None);

        assert!(sub.matches_role(RoleFilter::Sub) && !prime.matches_role(RoleFilter::Sub));
        assert!(prime.matches_role(RoleFilter::Prime) && !sub.matches_role(RoleFilter::Prime));
        assert!([sub, prime, supplier].iter().all(|r| r.matches_role(RoleFilter::All)));
    }

    #[test]
    fn rules_from_toml_replace_the_built_in_table() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[[rules]]
key = "LANDSCAPE"
keywords = ["Landscap", "irrigation"]
name = "Landscaping (Consolidated)"

[[rules]]
key = "ELECTRICAL_WORK"
keywords = ["electric"]
exclude = ["design"]
name = "Electrical Work (Consolidated)"
"#,
        )
        .expect("write");

        let config = Config::load_from_file(path.to_str().expect("utf8 path")).expect("load");
        let rules = config.rules.clone().expect("rules present");
        assert_eq!(rules.len(), 2);
        assert!(rules[0].exclude.is_empty());

        let classifier = ScopeClassifier::new(rules);
        assert_eq!(classifier.resolve(Some("Irrigation repairs")), "Landscaping (Consolidated)");
        assert_eq!(classifier.resolve(Some("Street Electrical")), "Electrical Work (Consolidated)");
        assert_eq!(classifier.resolve(Some("Electrical design")), "Electrical design");
        // Built-in categories are gone
        assert_eq!(classifier.resolve(Some("AC Paving")), "AC Paving");
    }

    #[test]
    fn rules_without_keywords_are_rejected() {
        let config: Config =
            toml::from_str("[[rules]]\nkey = \"EMPTY\"\nkeywords = []\nname = \"Empty\"\n")
                .expect("parse");
        assert!(matches!(config.validate(), Err(AnalysisError::Config(_))));
    }

    #[test]
    fn inverted_hhi_breakpoints_are_rejected() {
        let mut config = Config::default();
        config.thresholds.moderate_hhi = 3000.0;
        assert!(matches!(config.validate(), Err(AnalysisError::Config(_))));
    }
}
