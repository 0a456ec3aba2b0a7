use crate::analyzer::{ConcentrationLevel, DominantFirm, ScopeConcentration};
use crate::consolidation::{ScopeMapping, ScopeMappingEntry};
use crate::currency::{clean_currency, parse_number};
use crate::error::AnalysisResult;
use crate::models::{BidColumns, BidRecord, SubcontractorRecord};
use crate::table::Table;
use std::path::Path;

/// Reads every tabular input of the pipeline, resolving columns by name.
pub struct TableLoader<'a> {
    columns: &'a BidColumns,
}

impl<'a> TableLoader<'a> {
    pub fn new(columns: &'a BidColumns) -> Self {
        Self { columns }
    }

    /// Raw bid-award rows with currency columns cleaned.
    pub fn load_bids(&self, path: &Path) -> AnalysisResult<Vec<BidRecord>> {
        let table = Table::from_path(path)?;
        let role = table.require(&self.columns.role)?;
        let lbe = table.require(&self.columns.lbe)?;
        let sub_amount = table.require(&self.columns.sub_amount)?;
        let scope = table.require(&self.columns.scope)?;
        let contractor = table.require(&self.columns.contractor)?;
        let contract_id = table.column(&self.columns.contract_id);
        let award_amount = table.column(&self.columns.award_amount);
        let engineers_estimate = table.column(&self.columns.engineers_estimate);
        let lbe_requirement = table.column(&self.columns.lbe_requirement);

        if contract_id.is_none() {
            tracing::warn!(
                column = %self.columns.contract_id,
                "contract id column absent; contract counts will be zero"
            );
        }

        let mut unparseable = 0usize;
        let bids: Vec<BidRecord> = table
            .rows()
            .map(|row| {
                let raw_amount = row.get(sub_amount);
                let amount = clean_currency(raw_amount);
                if raw_amount.is_some() && amount.is_none() {
                    unparseable += 1;
                }
                BidRecord {
                    contract_id: row.get_string(contract_id),
                    contractor_name: row.get(contractor).map(str::to_string),
                    scope_of_work: row.get(scope).map(str::to_string),
                    sub_amount: amount,
                    award_amount: clean_currency(row.get_opt(award_amount)),
                    engineers_estimate: clean_currency(row.get_opt(engineers_estimate)),
                    role_flag: row.get(role).map(str::to_string),
                    lbe_flag: row.get(lbe).map(str::to_string),
                    lbe_requirement: parse_number(row.get_opt(lbe_requirement)),
                }
            })
            .collect();

        if unparseable > 0 {
            tracing::warn!(
                rows = unparseable,
                "subcontract amounts could not be parsed and were treated as missing"
            );
        }
        tracing::info!(path = %path.display(), rows = bids.len(), "loaded bid records");
        Ok(bids)
    }

    /// Previously extracted subcontract lines. Non-positive or unparseable
    /// amounts are dropped.
    pub fn load_subcontractor_records(
        &self,
        path: &Path,
    ) -> AnalysisResult<Vec<SubcontractorRecord>> {
        let table = Table::from_path(path)?;
        let scope = table.require("ScopeOfWork")?;
        let firm = table.require("SubcontractorName")?;
        let amount = table.require("SubAmount")?;
        let contract_id = table.require("ContractID")?;
        let is_lbe = table.column("IsLBE");

        let records: Vec<SubcontractorRecord> = table
            .rows()
            .filter_map(|row| {
                let sub_amount = clean_currency(row.get(amount)).filter(|value| *value > 0.0)?;
                Some(SubcontractorRecord {
                    contract_id: row.get(contract_id).map(str::to_string),
                    subcontractor_name: row.get(firm).map(str::to_string),
                    scope_of_work: row.get(scope).map(str::to_string),
                    sub_amount,
                    is_lbe: row.get_opt(is_lbe).map(parse_bool).unwrap_or(false),
                })
            })
            .collect();

        tracing::info!(
            path = %path.display(),
            rows = table.len(),
            kept = records.len(),
            "loaded subcontractor records"
        );
        Ok(records)
    }

    pub fn load_mapping(&self, path: &Path) -> AnalysisResult<ScopeMapping> {
        let table = Table::from_path(path)?;
        let original = table.require("OriginalScope")?;
        let canonical = table.require("ScopeOfWork")?;

        // Raw cells: mapping keys must match originals byte for byte
        let entries = table
            .rows()
            .filter_map(|row| {
                let name = row.get(canonical)?;
                Some(ScopeMappingEntry {
                    original: row.get(original).map(str::to_string),
                    canonical: name.to_string(),
                })
            })
            .collect();

        let mapping = ScopeMapping::from_entries(entries);
        tracing::info!(path = %path.display(), entries = mapping.len(), "loaded scope mapping");
        Ok(mapping)
    }

    pub fn load_concentration(&self, path: &Path) -> AnalysisResult<Vec<ScopeConcentration>> {
        let table = Table::from_path(path)?;
        let scope = table.require("ScopeOfWork")?;
        let hhi = table.require("ScopeHHI")?;
        let firms = table.require("NumSubcontractors")?;
        let total = table.require("ScopeTotalSub")?;
        let level = table.require("ConcentrationLevel")?;

        Ok(table
            .rows()
            .filter_map(|row| {
                Some(ScopeConcentration {
                    scope: row.get(scope)?.to_string(),
                    hhi: parse_number(row.get(hhi)),
                    num_subcontractors: parse_count(row.get(firms)).unwrap_or(0),
                    scope_total_sub: parse_number(row.get(total)).unwrap_or(0.0),
                    level: row.get(level).and_then(ConcentrationLevel::from_label),
                })
            })
            .collect())
    }

    pub fn load_dominant_firms(&self, path: &Path) -> AnalysisResult<Vec<DominantFirm>> {
        let table = Table::from_path(path)?;
        let scope = table.require("ScopeOfWork")?;
        let firm = table.require("SubcontractorName")?;
        let share = table.require("ShareOfScope")?;
        let total = table.column("TotalSubAmount");
        let contracts = table.column("ContractsCount");
        let scope_total = table.column("ScopeTotalSub");
        let rank = table.column("RankInScope");

        Ok(table
            .rows()
            .filter_map(|row| {
                Some(DominantFirm {
                    scope: row.get(scope)?.to_string(),
                    firm: row.get(firm)?.to_string(),
                    total_sub_amount: parse_number(row.get_opt(total)).unwrap_or(0.0),
                    contracts_count: parse_count(row.get_opt(contracts)).unwrap_or(0),
                    scope_total_sub: parse_number(row.get_opt(scope_total)).unwrap_or(0.0),
                    share_of_scope: parse_number(row.get(share))?,
                    rank_in_scope: parse_count(row.get_opt(rank)).unwrap_or(0).max(1),
                })
            })
            .collect())
    }
}

fn parse_count(value: Option<&str>) -> Option<usize> {
    parse_number(value).map(|n| n.max(0.0) as usize)
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "y" | "yes")
}
