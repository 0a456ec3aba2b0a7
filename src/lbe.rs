//! Local Business Enterprise participation: who wins subcontract dollars, by
//! role, scope and firm, and how the per-scope LBE table is re-keyed onto
//! consolidated scopes.

use crate::analyzer::{ratio, ScopeConcentration, ScopeTotals};
use crate::consolidation::ScopeResolver;
use crate::currency::parse_number;
use crate::error::AnalysisResult;
use crate::models::{BidRecord, SubcontractorRecord, Thresholds};
use crate::table::Table;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LbeScopeRow {
    #[serde(rename = "Scope of Work")]
    pub scope: String,
    #[serde(rename = "LBE_Count")]
    pub lbe_count: u64,
    #[serde(rename = "Total_Subs")]
    pub total_subs: u64,
    #[serde(rename = "LBE_Rate")]
    pub lbe_rate: Option<f64>,
    #[serde(rename = "Total_Dollars")]
    pub total_dollars: f64,
    #[serde(rename = "LBE_Dollar_Share")]
    pub lbe_dollar_share: Option<f64>,
}

pub const LBE_SCOPE_HEADERS: [&str; 6] = [
    "Scope of Work",
    "LBE_Count",
    "Total_Subs",
    "LBE_Rate",
    "Total_Dollars",
    "LBE_Dollar_Share",
];

impl LbeScopeRow {
    /// Row of the base per-scope table. Rate and dollars are rounded to three
    /// places; the dollar share is taken from the unrounded sums.
    pub fn from_totals(totals: &ScopeTotals) -> Self {
        let share = if totals.total_dollars > 0.0 {
            totals.lbe_dollar_share.unwrap_or(0.0)
        } else {
            0.0
        };
        Self {
            scope: totals.scope.clone(),
            lbe_count: totals.lbe_count as u64,
            total_subs: totals.record_count as u64,
            lbe_rate: totals.lbe_rate.map(round3),
            total_dollars: round3(totals.total_dollars),
            lbe_dollar_share: Some(share),
        }
    }

    pub fn lbe_dollars(&self) -> f64 {
        self.lbe_dollar_share.map(|share| self.total_dollars * share).unwrap_or(0.0)
    }
}

pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Sort by `Total_Dollars` descending; equal totals keep their order.
pub fn sort_by_total_dollars(rows: &mut [LbeScopeRow]) {
    rows.sort_by(|a, b| b.total_dollars.total_cmp(&a.total_dollars));
}

pub fn lbe_scope_table(scope_totals: &[ScopeTotals]) -> Vec<LbeScopeRow> {
    let mut rows: Vec<LbeScopeRow> = scope_totals.iter().map(LbeScopeRow::from_totals).collect();
    sort_by_total_dollars(&mut rows);
    rows
}

pub fn read_lbe_scope_table(table: &Table) -> AnalysisResult<Vec<LbeScopeRow>> {
    let scope = table.require("Scope of Work")?;
    let lbe_count = table.require("LBE_Count")?;
    let total_subs = table.require("Total_Subs")?;
    let lbe_rate = table.require("LBE_Rate")?;
    let total_dollars = table.require("Total_Dollars")?;
    let lbe_dollar_share = table.require("LBE_Dollar_Share")?;

    let count = |value: Option<&str>| {
        parse_number(value)
            .map(|v| v.round().max(0.0) as u64)
            .unwrap_or(0)
    };

    Ok(table
        .rows()
        .filter_map(|row| {
            let Some(name) = row.get(scope) else {
                tracing::debug!("LBE table row without scope skipped");
                return None;
            };
            Some(LbeScopeRow {
                scope: name.to_string(),
                lbe_count: count(row.get(lbe_count)),
                total_subs: count(row.get(total_subs)),
                lbe_rate: parse_number(row.get(lbe_rate)),
                total_dollars: parse_number(row.get(total_dollars)).unwrap_or(0.0),
                lbe_dollar_share: parse_number(row.get(lbe_dollar_share)),
            })
        })
        .collect())
}

/// Re-key a per-scope LBE table onto canonical scopes.
///
/// Counts and dollars are summed. LBE dollars are reconstructed per input row
/// as `Total_Dollars × LBE_Dollar_Share` so large scopes carry their weight.
pub fn consolidate_lbe_table<R: ScopeResolver>(
    rows: &[LbeScopeRow],
    resolver: &R,
) -> Vec<LbeScopeRow> {
    #[derive(Default)]
    struct Acc {
        lbe_count: u64,
        total_subs: u64,
        total_dollars: f64,
        lbe_dollars: f64,
    }

    let mut groups: BTreeMap<String, Acc> = BTreeMap::new();
    for row in rows {
        let canonical = resolver.resolve(Some(row.scope.as_str()));
        let acc = groups.entry(canonical).or_default();
        acc.lbe_count += row.lbe_count;
        acc.total_subs += row.total_subs;
        acc.total_dollars += row.total_dollars;
        acc.lbe_dollars += row.lbe_dollars();
    }

    let mut consolidated: Vec<LbeScopeRow> = groups
        .into_iter()
        .map(|(scope, acc)| LbeScopeRow {
            scope,
            lbe_count: acc.lbe_count,
            total_subs: acc.total_subs,
            lbe_rate: ratio(acc.lbe_count as f64, acc.total_subs as f64),
            total_dollars: acc.total_dollars,
            lbe_dollar_share: ratio(acc.lbe_dollars, acc.total_dollars),
        })
        .collect();
    sort_by_total_dollars(&mut consolidated);

    tracing::info!(
        input_scopes = rows.len(),
        consolidated_scopes = consolidated.len(),
        "consolidated LBE scope table"
    );
    consolidated
}

#[derive(Debug, Clone, PartialEq)]
pub struct TotalsDiscrepancy {
    pub scope: String,
    pub lbe_table_dollars: f64,
    pub concentration_dollars: f64,
    pub relative_difference: f64,
}

/// Compare scope dollar totals between the LBE table and the concentration
/// table. Scopes present in only one of them are not compared.
pub fn cross_check_totals(
    lbe_rows: &[LbeScopeRow],
    concentration: &[ScopeConcentration],
    tolerance: f64,
) -> Vec<TotalsDiscrepancy> {
    let by_scope: BTreeMap<&str, f64> = concentration
        .iter()
        .map(|row| (row.scope.as_str(), row.scope_total_sub))
        .collect();

    let mut discrepancies = Vec::new();
    for row in lbe_rows {
        let Some(&concentration_dollars) = by_scope.get(row.scope.as_str()) else {
            continue;
        };
        let scale = row.total_dollars.abs().max(concentration_dollars.abs());
        let relative_difference = if scale == 0.0 {
            0.0
        } else {
            (row.total_dollars - concentration_dollars).abs() / scale
        };
        if relative_difference > tolerance {
            tracing::warn!(
                scope = %row.scope,
                lbe_table_dollars = row.total_dollars,
                concentration_dollars,
                relative_difference,
                "scope totals diverge between LBE and concentration tables"
            );
            discrepancies.push(TotalsDiscrepancy {
                scope: row.scope.clone(),
                lbe_table_dollars: row.total_dollars,
                concentration_dollars,
                relative_difference,
            });
        }
    }
    discrepancies
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoleParticipation {
    pub role: String,
    pub lbe_count: usize,
    pub total: usize,
}

impl RoleParticipation {
    pub fn rate(&self) -> Option<f64> {
        ratio(self.lbe_count as f64, self.total as f64)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubcontractSummary {
    pub lbe_count: usize,
    pub non_lbe_count: usize,
    pub lbe_dollars: f64,
    pub total_dollars: f64,
    pub lbe_scopes: usize,
    pub non_lbe_scopes: usize,
}

impl SubcontractSummary {
    pub fn total_count(&self) -> usize {
        self.lbe_count + self.non_lbe_count
    }

    pub fn non_lbe_dollars(&self) -> f64 {
        self.total_dollars - self.lbe_dollars
    }

    pub fn average_lbe_contract(&self) -> Option<f64> {
        ratio(self.lbe_dollars, self.lbe_count as f64)
    }

    pub fn average_non_lbe_contract(&self) -> Option<f64> {
        ratio(self.non_lbe_dollars(), self.non_lbe_count as f64)
    }

    /// How many times larger the average non-LBE subcontract is.
    pub fn size_gap(&self) -> Option<f64> {
        match (self.average_non_lbe_contract(), self.average_lbe_contract()) {
            (Some(non_lbe), Some(lbe)) => ratio(non_lbe, lbe),
            _ => None,
        }
    }

    pub fn lbe_market_share(&self) -> Option<f64> {
        ratio(self.lbe_dollars, self.total_dollars)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FirmSummary {
    #[serde(rename = "Contractor Name")]
    pub firm: String,
    #[serde(rename = "Total_Dollars")]
    pub total_dollars: f64,
    #[serde(rename = "Is_LBE")]
    pub is_lbe: bool,
    #[serde(rename = "Scope_Count")]
    pub scope_count: usize,
}

pub const FIRM_HEADERS: [&str; 4] = ["Contractor Name", "Total_Dollars", "Is_LBE", "Scope_Count"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompetitiveScope {
    #[serde(rename = "Scope")]
    pub scope: String,
    #[serde(rename = "Total_Value")]
    pub total_value: f64,
    #[serde(rename = "LBE_Share")]
    pub lbe_share: f64,
    #[serde(rename = "LBE_Count")]
    pub lbe_count: usize,
    #[serde(rename = "NonLBE_Count")]
    pub non_lbe_count: usize,
}

pub const COMPETITIVE_HEADERS: [&str; 5] =
    ["Scope", "Total_Value", "LBE_Share", "LBE_Count", "NonLBE_Count"];

#[derive(Debug, Clone, PartialEq)]
pub struct RequirementPerformance {
    pub requirement: f64,
    pub lbe_rate: f64,
    pub average_award: Option<f64>,
    pub average_estimate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    #[serde(rename = "Metric")]
    pub metric: &'static str,
    #[serde(rename = "LBE_Firms")]
    pub lbe: Option<f64>,
    #[serde(rename = "Non_LBE_Firms")]
    pub non_lbe: Option<f64>,
}

pub const COMPARISON_HEADERS: [&str; 3] = ["Metric", "LBE_Firms", "Non_LBE_Firms"];

#[derive(Debug, Clone)]
pub struct LbeReport {
    pub roles: Vec<RoleParticipation>,
    pub summary: SubcontractSummary,
    pub scopes: Vec<LbeScopeRow>,
    pub opportunities: Vec<LbeScopeRow>,
    pub firms: Vec<FirmSummary>,
    pub competitive: Vec<CompetitiveScope>,
    pub requirements: Vec<RequirementPerformance>,
}

impl LbeReport {
    pub fn comparison(&self) -> Vec<ComparisonRow> {
        let s = &self.summary;
        vec![
            ComparisonRow {
                metric: "Number of Subcontractors",
                lbe: Some(s.lbe_count as f64),
                non_lbe: Some(s.non_lbe_count as f64),
            },
            ComparisonRow {
                metric: "Total Dollar Volume",
                lbe: Some(s.lbe_dollars),
                non_lbe: Some(s.non_lbe_dollars()),
            },
            ComparisonRow {
                metric: "Average Contract Size",
                lbe: s.average_lbe_contract(),
                non_lbe: s.average_non_lbe_contract(),
            },
            ComparisonRow {
                metric: "Number of Scopes Served",
                lbe: Some(s.lbe_scopes as f64),
                non_lbe: Some(s.non_lbe_scopes as f64),
            },
            ComparisonRow {
                metric: "Market Share (%)",
                lbe: s.lbe_market_share().map(|share| share * 100.0),
                non_lbe: ratio(s.non_lbe_dollars(), s.total_dollars).map(|share| share * 100.0),
            },
        ]
    }

    pub fn top_firms(&self, lbe: bool, n: usize) -> impl Iterator<Item = &FirmSummary> {
        self.firms.iter().filter(move |firm| firm.is_lbe == lbe).take(n)
    }
}

pub struct LbeAnalyzer<'a> {
    pub thresholds: &'a Thresholds,
}

impl<'a> LbeAnalyzer<'a> {
    pub fn new(thresholds: &'a Thresholds) -> Self {
        Self { thresholds }
    }

    /// `bids` is the whole raw table; `subs` the role-filtered positive-amount lines.
    pub fn analyze(
        &self,
        bids: &[BidRecord],
        subs: &[SubcontractorRecord],
        scope_totals: &[ScopeTotals],
    ) -> LbeReport {
        let scopes = lbe_scope_table(scope_totals);
        let opportunities = self.opportunities(&scopes);
        LbeReport {
            roles: role_participation(bids),
            summary: subcontract_summary(subs),
            scopes,
            opportunities,
            firms: firm_summaries(subs),
            competitive: self.competitive_scopes(subs),
            requirements: requirement_performance(bids),
        }
    }

    /// High-value scopes with several competitors but little LBE participation.
    pub fn opportunities(&self, scopes: &[LbeScopeRow]) -> Vec<LbeScopeRow> {
        scopes
            .iter()
            .filter(|row| {
                row.total_dollars > self.thresholds.opportunity_min_dollars
                    && row
                        .lbe_rate
                        .is_some_and(|rate| rate < self.thresholds.opportunity_max_lbe_rate)
                    && row.total_subs > 1
            })
            .take(10)
            .cloned()
            .collect()
    }

    /// Scopes where LBE and non-LBE firms both hold work above the value floor.
    pub fn competitive_scopes(&self, subs: &[SubcontractorRecord]) -> Vec<CompetitiveScope> {
        let mut order: Vec<&str> = Vec::new();
        let mut groups: BTreeMap<&str, Vec<&SubcontractorRecord>> = BTreeMap::new();
        for sub in subs {
            let Some(scope) = sub.scope_of_work.as_deref() else {
                continue;
            };
            let group = groups.entry(scope).or_default();
            if group.is_empty() {
                order.push(scope);
            }
            group.push(sub);
        }

        let mut competitive: Vec<CompetitiveScope> = order
            .into_iter()
            .filter_map(|scope| {
                let records = groups.get(scope)?;
                let lbe_count = records.iter().filter(|r| r.is_lbe).count();
                let non_lbe_count = records.len() - lbe_count;
                let total_value: f64 = records.iter().map(|r| r.sub_amount).sum();
                if lbe_count == 0
                    || non_lbe_count == 0
                    || total_value <= self.thresholds.competitive_min_dollars
                {
                    return None;
                }
                let lbe_value: f64 = records
                    .iter()
                    .filter(|r| r.is_lbe)
                    .map(|r| r.sub_amount)
                    .sum();
                Some(CompetitiveScope {
                    scope: scope.to_string(),
                    total_value,
                    lbe_share: lbe_value / total_value,
                    lbe_count,
                    non_lbe_count,
                })
            })
            .collect();
        competitive.sort_by(|a, b| b.total_value.total_cmp(&a.total_value));
        competitive
    }
}

pub fn role_participation(bids: &[BidRecord]) -> Vec<RoleParticipation> {
    let mut groups: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for bid in bids {
        let Some(role) = bid.role_flag.as_deref() else {
            continue;
        };
        let (lbe, total) = groups.entry(role).or_default();
        *total += 1;
        if bid.is_lbe() {
            *lbe += 1;
        }
    }
    groups
        .into_iter()
        .map(|(role, (lbe_count, total))| RoleParticipation {
            role: role.to_string(),
            lbe_count,
            total,
        })
        .collect()
}

pub fn subcontract_summary(subs: &[SubcontractorRecord]) -> SubcontractSummary {
    let mut summary = SubcontractSummary::default();
    let mut lbe_scopes = BTreeSet::new();
    let mut non_lbe_scopes = BTreeSet::new();
    for sub in subs {
        summary.total_dollars += sub.sub_amount;
        if sub.is_lbe {
            summary.lbe_count += 1;
            summary.lbe_dollars += sub.sub_amount;
            lbe_scopes.extend(sub.scope_of_work.as_deref());
        } else {
            summary.non_lbe_count += 1;
            non_lbe_scopes.extend(sub.scope_of_work.as_deref());
        }
    }
    summary.lbe_scopes = lbe_scopes.len();
    summary.non_lbe_scopes = non_lbe_scopes.len();
    summary
}

/// Per-firm totals, largest first. A firm's LBE status is taken from its first line.
pub fn firm_summaries(subs: &[SubcontractorRecord]) -> Vec<FirmSummary> {
    let mut groups: BTreeMap<&str, (f64, bool, BTreeSet<&str>)> = BTreeMap::new();
    for sub in subs {
        let Some(firm) = sub.subcontractor_name.as_deref() else {
            continue;
        };
        let (total, _, scopes) = groups
            .entry(firm)
            .or_insert_with(|| (0.0, sub.is_lbe, BTreeSet::new()));
        *total += sub.sub_amount;
        scopes.extend(sub.scope_of_work.as_deref());
    }

    let mut firms: Vec<FirmSummary> = groups
        .into_iter()
        .map(|(firm, (total_dollars, is_lbe, scopes))| FirmSummary {
            firm: firm.to_string(),
            total_dollars,
            is_lbe,
            scope_count: scopes.len(),
        })
        .collect();
    firms.sort_by(|a, b| b.total_dollars.total_cmp(&a.total_dollars));
    firms
}

/// LBE participation, average award and average engineer's estimate for
/// each stated LBE requirement level.
pub fn requirement_performance(bids: &[BidRecord]) -> Vec<RequirementPerformance> {
    let mut with_requirement: Vec<(f64, &BidRecord)> = bids
        .iter()
        .filter_map(|bid| bid.lbe_requirement.filter(|r| *r > 0.0).map(|r| (r, bid)))
        .collect();
    with_requirement.sort_by(|a, b| a.0.total_cmp(&b.0));

    with_requirement
        .chunk_by(|a, b| a.0 == b.0)
        .map(|group| {
            let lbe = group.iter().filter(|(_, bid)| bid.is_lbe()).count();
            let average = |amount: fn(&BidRecord) -> Option<f64>| {
                let values: Vec<f64> = group.iter().filter_map(|(_, bid)| amount(bid)).collect();
                ratio(values.iter().sum(), values.len() as f64).map(round3)
            };
            RequirementPerformance {
                requirement: group[0].0,
                lbe_rate: round3(lbe as f64 / group.len() as f64),
                average_award: average(|bid| bid.award_amount),
                average_estimate: average(|bid| bid.engineers_estimate),
            }
        })
        .collect()
}
