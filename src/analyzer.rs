use crate::models::{SubcontractorRecord, Thresholds};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A subcontract line tagged with the scope it is aggregated under.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedRecord {
    pub scope: Option<String>,
    pub firm: Option<String>,
    pub contract_id: Option<String>,
    pub amount: f64,
    pub is_lbe: bool,
}

impl ScopedRecord {
    pub fn new(record: &SubcontractorRecord, scope: Option<String>) -> Self {
        Self {
            scope,
            firm: record.subcontractor_name.clone(),
            contract_id: record.contract_id.clone(),
            amount: record.sub_amount,
            is_lbe: record.is_lbe,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConcentrationLevel {
    #[serde(rename = "Unconcentrated")]
    Unconcentrated,
    #[serde(rename = "Moderately Concentrated")]
    Moderate,
    #[serde(rename = "Highly Concentrated")]
    High,
}

impl ConcentrationLevel {
    pub fn from_hhi(hhi: f64, thresholds: &Thresholds) -> Self {
        if hhi < thresholds.moderate_hhi {
            ConcentrationLevel::Unconcentrated
        } else if hhi <= thresholds.high_hhi {
            ConcentrationLevel::Moderate
        } else {
            ConcentrationLevel::High
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConcentrationLevel::Unconcentrated => "Unconcentrated",
            ConcentrationLevel::Moderate => "Moderately Concentrated",
            ConcentrationLevel::High => "Highly Concentrated",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::all()
            .into_iter()
            .find(|level| level.label().eq_ignore_ascii_case(label.trim()))
    }

    pub fn all() -> [ConcentrationLevel; 3] {
        [
            ConcentrationLevel::Unconcentrated,
            ConcentrationLevel::Moderate,
            ConcentrationLevel::High,
        ]
    }
}

impl fmt::Display for ConcentrationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Dollar and participation totals for one scope.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeTotals {
    pub scope: String,
    pub total_dollars: f64,
    pub record_count: usize,
    pub lbe_count: usize,
    pub lbe_rate: Option<f64>,
    pub lbe_dollar_share: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeFirmShare {
    #[serde(rename = "ScopeOfWork")]
    pub scope: String,
    #[serde(rename = "SubcontractorName")]
    pub firm: String,
    #[serde(rename = "TotalSubAmount")]
    pub total_sub_amount: f64,
    #[serde(rename = "ContractsCount")]
    pub contracts_count: usize,
    #[serde(rename = "ScopeTotalSub")]
    pub scope_total_sub: f64,
    #[serde(rename = "ShareOfScope")]
    pub share_of_scope: Option<f64>,
}

pub const SHARE_HEADERS: [&str; 6] = [
    "ScopeOfWork",
    "SubcontractorName",
    "TotalSubAmount",
    "ContractsCount",
    "ScopeTotalSub",
    "ShareOfScope",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DominantFirm {
    #[serde(rename = "ScopeOfWork")]
    pub scope: String,
    #[serde(rename = "SubcontractorName")]
    pub firm: String,
    #[serde(rename = "TotalSubAmount")]
    pub total_sub_amount: f64,
    #[serde(rename = "ContractsCount")]
    pub contracts_count: usize,
    #[serde(rename = "ScopeTotalSub")]
    pub scope_total_sub: f64,
    #[serde(rename = "ShareOfScope")]
    pub share_of_scope: f64,
    #[serde(rename = "RankInScope")]
    pub rank_in_scope: usize,
}

pub const DOMINANT_HEADERS: [&str; 7] = [
    "ScopeOfWork",
    "SubcontractorName",
    "TotalSubAmount",
    "ContractsCount",
    "ScopeTotalSub",
    "ShareOfScope",
    "RankInScope",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeConcentration {
    #[serde(rename = "ScopeOfWork")]
    pub scope: String,
    #[serde(rename = "ScopeHHI")]
    pub hhi: Option<f64>,
    #[serde(rename = "NumSubcontractors")]
    pub num_subcontractors: usize,
    #[serde(rename = "ScopeTotalSub")]
    pub scope_total_sub: f64,
    #[serde(rename = "ConcentrationLevel")]
    pub level: Option<ConcentrationLevel>,
}

pub const CONCENTRATION_HEADERS: [&str; 5] = [
    "ScopeOfWork",
    "ScopeHHI",
    "NumSubcontractors",
    "ScopeTotalSub",
    "ConcentrationLevel",
];

#[derive(Debug, Clone)]
pub struct MarketAnalysis {
    pub scope_totals: Vec<ScopeTotals>,
    pub firm_shares: Vec<ScopeFirmShare>,
    pub concentration: Vec<ScopeConcentration>,
    pub dominant_firms: Vec<DominantFirm>,
}

impl MarketAnalysis {
    pub fn count_at_level(&self, level: ConcentrationLevel) -> usize {
        count_at_level(&self.concentration, level)
    }

    pub fn firms_in_scope<'s>(
        &'s self,
        scope: &'s str,
    ) -> impl Iterator<Item = &'s ScopeFirmShare> {
        self.firm_shares.iter().filter(move |share| share.scope == scope)
    }
}

pub fn count_at_level(rows: &[ScopeConcentration], level: ConcentrationLevel) -> usize {
    rows.iter().filter(|row| row.level == Some(level)).count()
}

/// 10000 × Σ share². Shares are fractions in [0, 1].
pub fn hhi<I>(shares: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    shares.into_iter().map(|share| share * share).sum::<f64>() * 10_000.0
}

/// `numerator / denominator`, or `None` when the denominator is zero.
pub fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    (denominator != 0.0).then(|| numerator / denominator)
}

/// First `n` items by descending dollar value; equal values keep input order.
pub fn top_by_dollars<T, F>(items: &[T], n: usize, dollars: F) -> Vec<&T>
where
    F: Fn(&T) -> f64,
{
    let mut sorted: Vec<&T> = items.iter().collect();
    sorted.sort_by(|a, b| dollars(b).total_cmp(&dollars(a)));
    sorted.truncate(n);
    sorted
}

pub struct MarketAnalyzer<'a> {
    pub thresholds: &'a Thresholds,
}

impl<'a> MarketAnalyzer<'a> {
    pub fn new(thresholds: &'a Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn analyze(&self, records: &[ScopedRecord]) -> MarketAnalysis {
        let scope_totals = Self::scope_totals(records);
        let firm_shares = Self::firm_shares(records);
        let concentration = self.concentration(&firm_shares);
        let dominant_firms = self.dominant_firms(&firm_shares);

        tracing::info!(
            records = records.len(),
            scopes = concentration.len(),
            scope_firm_pairs = firm_shares.len(),
            dominant_positions = dominant_firms.len(),
            "aggregated market"
        );

        MarketAnalysis {
            scope_totals,
            firm_shares,
            concentration,
            dominant_firms,
        }
    }

    pub fn classify(&self, hhi: f64) -> ConcentrationLevel {
        ConcentrationLevel::from_hhi(hhi, self.thresholds)
    }

    /// Per-scope sums, record counts and LBE participation. Records without a
    /// scope are left out.
    pub fn scope_totals(records: &[ScopedRecord]) -> Vec<ScopeTotals> {
        #[derive(Default)]
        struct Acc {
            total: f64,
            count: usize,
            lbe_count: usize,
            lbe_dollars: f64,
        }

        let mut groups: BTreeMap<&str, Acc> = BTreeMap::new();
        for record in records {
            let Some(scope) = record.scope.as_deref() else {
                tracing::debug!(
                    amount = record.amount,
                    "record without scope left out of scope totals"
                );
                continue;
            };
            let acc = groups.entry(scope).or_default();
            acc.total += record.amount;
            acc.count += 1;
            if record.is_lbe {
                acc.lbe_count += 1;
                acc.lbe_dollars += record.amount;
            }
        }

        groups
            .into_iter()
            .map(|(scope, acc)| ScopeTotals {
                scope: scope.to_string(),
                total_dollars: acc.total,
                record_count: acc.count,
                lbe_count: acc.lbe_count,
                lbe_rate: ratio(acc.lbe_count as f64, acc.count as f64),
                lbe_dollar_share: ratio(acc.lbe_dollars, acc.total),
            })
            .collect()
    }

    /// Per (scope, firm) sums, distinct contracts and share of the scope total.
    pub fn firm_shares(records: &[ScopedRecord]) -> Vec<ScopeFirmShare> {
        let mut groups: BTreeMap<(&str, &str), (f64, BTreeSet<&str>)> = BTreeMap::new();
        for record in records {
            let (Some(scope), Some(firm)) = (record.scope.as_deref(), record.firm.as_deref()) else {
                tracing::debug!(
                    amount = record.amount,
                    "record without scope or firm left out of firm shares"
                );
                continue;
            };
            let (total, contracts) = groups.entry((scope, firm)).or_default();
            *total += record.amount;
            if let Some(contract_id) = record.contract_id.as_deref() {
                contracts.insert(contract_id);
            }
        }

        let mut scope_totals: BTreeMap<&str, f64> = BTreeMap::new();
        for ((scope, _), (total, _)) in &groups {
            *scope_totals.entry(*scope).or_default() += total;
        }

        groups
            .into_iter()
            .map(|((scope, firm), (total, contracts))| {
                let scope_total = scope_totals.get(scope).copied().unwrap_or_default();
                ScopeFirmShare {
                    scope: scope.to_string(),
                    firm: firm.to_string(),
                    total_sub_amount: total,
                    contracts_count: contracts.len(),
                    scope_total_sub: scope_total,
                    share_of_scope: ratio(total, scope_total),
                }
            })
            .collect()
    }

    pub fn concentration(&self, shares: &[ScopeFirmShare]) -> Vec<ScopeConcentration> {
        let mut groups: BTreeMap<&str, Vec<&ScopeFirmShare>> = BTreeMap::new();
        for share in shares {
            groups.entry(share.scope.as_str()).or_default().push(share);
        }

        groups
            .into_iter()
            .map(|(scope, firms)| {
                let defined: Vec<f64> = firms.iter().filter_map(|f| f.share_of_scope).collect();
                let scope_hhi = (!defined.is_empty()).then(|| hhi(defined));
                ScopeConcentration {
                    scope: scope.to_string(),
                    hhi: scope_hhi,
                    num_subcontractors: firms.len(),
                    scope_total_sub: firms.iter().map(|f| f.total_sub_amount).sum(),
                    level: scope_hhi.map(|value| self.classify(value)),
                }
            })
            .collect()
    }

    /// Firms at or above the dominance share, dense-ranked by share within
    /// their scope. Output keeps the order of `shares`.
    pub fn dominant_firms(&self, shares: &[ScopeFirmShare]) -> Vec<DominantFirm> {
        let dominant: Vec<(&ScopeFirmShare, f64)> = shares
            .iter()
            .filter_map(|share| {
                share
                    .share_of_scope
                    .filter(|value| *value >= self.thresholds.dominance_share)
                    .map(|value| (share, value))
            })
            .collect();

        let mut distinct: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for (share, value) in &dominant {
            distinct.entry(share.scope.as_str()).or_default().push(*value);
        }
        for values in distinct.values_mut() {
            values.sort_by(|a, b| b.total_cmp(a));
            values.dedup();
        }

        dominant
            .into_iter()
            .map(|(share, value)| {
                let rank = distinct
                    .get(share.scope.as_str())
                    .and_then(|values| values.iter().position(|v| *v == value))
                    .map(|position| position + 1)
                    .unwrap_or(1);
                DominantFirm {
                    scope: share.scope.clone(),
                    firm: share.firm.clone(),
                    total_sub_amount: share.total_sub_amount,
                    contracts_count: share.contracts_count,
                    scope_total_sub: share.scope_total_sub,
                    share_of_scope: value,
                    rank_in_scope: rank,
                }
            })
            .collect()
    }
}
