//! CSV exports and console summaries.

use crate::analyzer::{
    count_at_level, top_by_dollars, ConcentrationLevel, DominantFirm, MarketAnalysis,
    ScopeConcentration, CONCENTRATION_HEADERS, DOMINANT_HEADERS, SHARE_HEADERS,
};
use crate::consolidation::{ScopeMapping, AC_PAVING_SCOPE, MAPPING_HEADERS};
use crate::error::AnalysisResult;
use crate::lbe::{
    LbeReport, LbeScopeRow, TotalsDiscrepancy, COMPARISON_HEADERS, COMPETITIVE_HEADERS,
    FIRM_HEADERS, LBE_SCOPE_HEADERS,
};
use crate::models::{SubcontractorRecord, SUBCONTRACTOR_HEADERS};
use crate::table::write_table;
use std::path::{Path, PathBuf};

pub const SUBCONTRACTOR_RECORDS_FILE: &str = "02_subcontractor_records.csv";
pub const SCOPE_AGGREGATION_FILE: &str = "03_scope_subcontractor_aggregation.csv";
pub const CONCENTRATION_FILE: &str = "04_market_concentration_hhi.csv";
pub const DOMINANT_FILE: &str = "05_dominant_subcontractors.csv";

pub const LBE_SCOPE_FILE: &str = "lbe_scope_analysis.csv";
pub const FIRM_ANALYSIS_FILE: &str = "firm_analysis.csv";
pub const COMPETITIVE_FILE: &str = "competitive_scopes.csv";
pub const LBE_COMPARISON_FILE: &str = "lbe_vs_nonlbe_comparison.csv";

pub const CONSOLIDATED_AGGREGATION_FILE: &str = "scope_subcontractor_aggregation_consolidated.csv";
pub const CONSOLIDATED_CONCENTRATION_FILE: &str = "market_concentration_hhi_consolidated.csv";
pub const CONSOLIDATED_DOMINANT_FILE: &str = "dominant_subcontractors_consolidated.csv";
pub const MAPPING_FILE: &str = "scope_consolidation_mapping.csv";
pub const CONSOLIDATED_LBE_FILE: &str = "lbe_scope_analysis_consolidated.csv";

/// Concentration tables and dominant-firm lists.
pub fn write_market_tables(
    dir: &Path,
    analysis: &MarketAnalysis,
    aggregation_file: &str,
    concentration_file: &str,
    dominant_file: &str,
) -> AnalysisResult<Vec<PathBuf>> {
    let paths = vec![
        dir.join(aggregation_file),
        dir.join(concentration_file),
        dir.join(dominant_file),
    ];
    write_table(&paths[0], &SHARE_HEADERS, &analysis.firm_shares)?;
    write_table(&paths[1], &CONCENTRATION_HEADERS, &analysis.concentration)?;
    write_table(&paths[2], &DOMINANT_HEADERS, &analysis.dominant_firms)?;
    Ok(paths)
}

pub fn write_base_outputs(
    dir: &Path,
    records: &[SubcontractorRecord],
    analysis: &MarketAnalysis,
) -> AnalysisResult<Vec<PathBuf>> {
    let records_path = dir.join(SUBCONTRACTOR_RECORDS_FILE);
    write_table(&records_path, &SUBCONTRACTOR_HEADERS, records)?;

    let mut paths = vec![records_path];
    paths.extend(write_market_tables(
        dir,
        analysis,
        SCOPE_AGGREGATION_FILE,
        CONCENTRATION_FILE,
        DOMINANT_FILE,
    )?);
    Ok(paths)
}

pub fn write_lbe_outputs(dir: &Path, report: &LbeReport) -> AnalysisResult<Vec<PathBuf>> {
    let paths = vec![
        dir.join(LBE_SCOPE_FILE),
        dir.join(FIRM_ANALYSIS_FILE),
        dir.join(COMPETITIVE_FILE),
        dir.join(LBE_COMPARISON_FILE),
    ];
    write_table(&paths[0], &LBE_SCOPE_HEADERS, &report.scopes)?;
    write_table(&paths[1], &FIRM_HEADERS, &report.firms)?;
    write_table(&paths[2], &COMPETITIVE_HEADERS, &report.competitive)?;
    write_table(&paths[3], &COMPARISON_HEADERS, &report.comparison())?;
    Ok(paths)
}

pub fn write_consolidated_outputs(
    dir: &Path,
    analysis: &MarketAnalysis,
    mapping: &ScopeMapping,
) -> AnalysisResult<Vec<PathBuf>> {
    let mut paths = write_market_tables(
        dir,
        analysis,
        CONSOLIDATED_AGGREGATION_FILE,
        CONSOLIDATED_CONCENTRATION_FILE,
        CONSOLIDATED_DOMINANT_FILE,
    )?;
    let mapping_path = dir.join(MAPPING_FILE);
    write_table(&mapping_path, &MAPPING_HEADERS, mapping.entries())?;
    paths.push(mapping_path);
    Ok(paths)
}

pub fn write_consolidated_lbe(dir: &Path, rows: &[LbeScopeRow]) -> AnalysisResult<PathBuf> {
    let path = dir.join(CONSOLIDATED_LBE_FILE);
    write_table(&path, &LBE_SCOPE_HEADERS, rows)?;
    Ok(path)
}

/// `$1,234,568` style, rounded to whole dollars.
pub fn format_dollars(value: f64) -> String {
    let rounded = format!("{:.0}", value.abs());
    let mut grouped = String::with_capacity(rounded.len() + rounded.len() / 3);
    for (i, digit) in rounded.chars().enumerate() {
        if i > 0 && (rounded.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if value < 0.0 && rounded != "0" {
        format!("$-{}", grouped)
    } else {
        format!("${}", grouped)
    }
}

pub fn format_percent(fraction: Option<f64>) -> String {
    match fraction {
        Some(value) => format!("{:.1}%", value * 100.0),
        None => "n/a".to_string(),
    }
}

fn percent_of(part: usize, whole: usize) -> Option<f64> {
    (whole > 0).then(|| part as f64 / whole as f64)
}

fn truncate(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

pub fn print_written(paths: &[PathBuf]) {
    println!("Saved analysis files:");
    for path in paths {
        println!("  - {}", path.display());
    }
}

pub fn print_lbe_report(report: &LbeReport) {
    println!("=== LBE COMPETITION ANALYSIS ===\n");

    println!("1. LBE PARTICIPATION BY ROLE");
    println!("{}", "=".repeat(40));
    println!("LBE Participation Rates by Role:");
    for role in &report.roles {
        println!(
            "  {}: {}/{} ({})",
            role.role,
            role.lbe_count,
            role.total,
            format_percent(role.rate())
        );
    }

    let summary = &report.summary;
    let total = summary.total_count();
    println!("\n2. LBE SUBCONTRACTOR ANALYSIS");
    println!("{}", "=".repeat(40));
    println!(
        "LBE Subcontractors: {} ({})",
        summary.lbe_count,
        format_percent(percent_of(summary.lbe_count, total))
    );
    println!(
        "Non-LBE Subcontractors: {} ({})",
        summary.non_lbe_count,
        format_percent(percent_of(summary.non_lbe_count, total))
    );
    println!(
        "LBE Share of Subcontract Dollars: {} ({})",
        format_dollars(summary.lbe_dollars),
        format_percent(summary.lbe_market_share())
    );
    println!("Total Subcontract Dollars: {}", format_dollars(summary.total_dollars));
    let averages = (summary.average_lbe_contract(), summary.average_non_lbe_contract());
    if let (Some(lbe), Some(non_lbe)) = averages {
        println!("Average LBE Contract Size: {}", format_dollars(lbe));
        println!("Average Non-LBE Contract Size: {}", format_dollars(non_lbe));
    }
    if let Some(gap) = summary.size_gap() {
        println!("Size Gap: {:.1}x larger for non-LBE", gap);
    }

    println!("\n3. LBE PARTICIPATION BY SCOPE");
    println!("{}", "=".repeat(40));
    println!("Top 10 Scopes by Dollar Value - LBE Performance:");
    println!("Scope | Total $ | LBE Rate | LBE $ Share");
    println!("{}", "-".repeat(60));
    for row in report.scopes.iter().take(10) {
        println!(
            "{:<30} | {:>9} | {:>6} | {:>8}",
            truncate(&row.scope, 30),
            format_dollars(row.total_dollars),
            format_percent(row.lbe_rate),
            format_percent(row.lbe_dollar_share)
        );
    }

    println!("\n4. LBE OPPORTUNITY ANALYSIS");
    println!("{}", "=".repeat(40));
    println!("High-Value Scopes with Low LBE Participation (Opportunities):");
    println!("Scope | Total $ | LBE Rate | Current Competitors");
    println!("{}", "-".repeat(70));
    for row in &report.opportunities {
        println!(
            "{:<35} | {:>9} | {:>6} | {:>8}",
            truncate(&row.scope, 35),
            format_dollars(row.total_dollars),
            format_percent(row.lbe_rate),
            row.total_subs
        );
    }

    println!("\n5. LBE vs DOMINANT FIRMS ANALYSIS");
    println!("{}", "=".repeat(40));
    println!("Top 10 Non-LBE Subcontractors:");
    for firm in report.top_firms(false, 10) {
        println!(
            "  {}: {} across {} scopes",
            firm.firm,
            format_dollars(firm.total_dollars),
            firm.scope_count
        );
    }
    println!("\nTop 10 LBE Subcontractors:");
    for firm in report.top_firms(true, 10) {
        println!(
            "  {}: {} across {} scopes",
            firm.firm,
            format_dollars(firm.total_dollars),
            firm.scope_count
        );
    }

    println!("\n6. COMPETITIVE SCOPE ANALYSIS");
    println!("{}", "=".repeat(40));
    println!("Scopes with Direct LBE vs Non-LBE Competition:");
    println!("Scope | Value | LBE Share | LBE Firms | Non-LBE Firms");
    println!("{}", "-".repeat(80));
    for scope in report.competitive.iter().take(15) {
        println!(
            "{:<25} | {:>9} | {:>7} | {:>8} | {:>12}",
            truncate(&scope.scope, 25),
            format_dollars(scope.total_value),
            format_percent(Some(scope.lbe_share)),
            scope.lbe_count,
            scope.non_lbe_count
        );
    }

    println!("\n7. LBE REQUIREMENT vs PERFORMANCE");
    println!("{}", "=".repeat(40));
    println!("Requirement | Actual LBE Rate | Avg Contract Size | Avg Engineer Est.");
    println!("{}", "-".repeat(75));
    let dollars = |value: Option<f64>| {
        value
            .map(format_dollars)
            .unwrap_or_else(|| "n/a".to_string())
    };
    for level in &report.requirements {
        println!(
            "{:>10.0}% | {:>15} | {:>17} | {:>17}",
            level.requirement * 100.0,
            format_percent(Some(level.lbe_rate)),
            dollars(level.average_award),
            dollars(level.average_estimate)
        );
    }
}

pub fn print_consolidation_summary(mapping: &ScopeMapping) {
    println!("\nScope Consolidation Summary:");
    println!("Consolidated Scope -> Number of Original Scopes Combined");
    for (scope, count) in mapping.summary().into_iter().take(10) {
        if count > 1 {
            println!("  {}: {} original scopes", scope, count);
        }
    }
}

/// Headline numbers of an original-vs-consolidated run.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidationComparison {
    pub original_scopes: usize,
    pub consolidated_scopes: usize,
    pub original_highly_concentrated: usize,
    pub consolidated_highly_concentrated: usize,
    pub original_dominant_positions: usize,
    pub consolidated_dominant_positions: usize,
}

impl ConsolidationComparison {
    pub fn new(
        original: &[ScopeConcentration],
        original_dominant: &[DominantFirm],
        consolidated: &MarketAnalysis,
    ) -> Self {
        Self {
            original_scopes: original.len(),
            consolidated_scopes: consolidated.concentration.len(),
            original_highly_concentrated: count_at_level(original, ConcentrationLevel::High),
            consolidated_highly_concentrated: consolidated.count_at_level(ConcentrationLevel::High),
            original_dominant_positions: original_dominant.len(),
            consolidated_dominant_positions: consolidated.dominant_firms.len(),
        }
    }

    pub fn scope_reduction(&self) -> i64 {
        self.original_scopes as i64 - self.consolidated_scopes as i64
    }
}

pub fn print_comparison(comparison: &ConsolidationComparison) {
    println!("\n=== COMPARISON: BEFORE vs AFTER CONSOLIDATION ===");

    println!("\n📊 SCOPE COUNTS:");
    println!("  Original scopes: {}", comparison.original_scopes);
    println!("  Consolidated scopes: {}", comparison.consolidated_scopes);
    println!("  Reduction: {} scopes consolidated", comparison.scope_reduction());

    println!("\n📊 MARKET CONCENTRATION:");
    println!(
        "  Original highly concentrated: {}/{} ({})",
        comparison.original_highly_concentrated,
        comparison.original_scopes,
        format_percent(percent_of(
            comparison.original_highly_concentrated,
            comparison.original_scopes
        ))
    );
    println!(
        "  Consolidated highly concentrated: {}/{} ({})",
        comparison.consolidated_highly_concentrated,
        comparison.consolidated_scopes,
        format_percent(percent_of(
            comparison.consolidated_highly_concentrated,
            comparison.consolidated_scopes
        ))
    );

    println!("\n📊 DOMINANT SUBCONTRACTORS:");
    println!("  Original dominant positions: {}", comparison.original_dominant_positions);
    println!("  Consolidated dominant positions: {}", comparison.consolidated_dominant_positions);
}

pub fn print_consolidated_market(analysis: &MarketAnalysis) {
    println!("\n📊 TOP CONSOLIDATED SCOPES BY DOLLAR VALUE:");
    for row in top_by_dollars(&analysis.concentration, 10, |row| row.scope_total_sub) {
        println!(
            "  {}: {} (HHI: {}, {} subs)",
            row.scope,
            format_dollars(row.scope_total_sub),
            row.hhi.map(|hhi| format!("{:.0}", hhi)).unwrap_or_else(|| "n/a".to_string()),
            row.num_subcontractors
        );
    }

    if let Some(paving) = analysis.concentration.iter().find(|row| row.scope == AC_PAVING_SCOPE) {
        let firms: Vec<_> = analysis.firms_in_scope(AC_PAVING_SCOPE).collect();
        println!("\n🚨 AC PAVING CONSOLIDATION RESULTS:");
        println!("  Total Value: {}", format_dollars(paving.scope_total_sub));
        println!(
            "  HHI: {} ({})",
            paving.hhi.map(|hhi| format!("{:.0}", hhi)).unwrap_or_else(|| "n/a".to_string()),
            paving.level.map(|level| level.label()).unwrap_or("n/a")
        );
        println!("  Number of Subcontractors: {}", firms.len());
        println!("  Top Players:");
        for firm in top_by_dollars(&firms, 5, |firm| firm.share_of_scope.unwrap_or(0.0)) {
            println!(
                "    {}: {} ({})",
                firm.firm,
                format_percent(firm.share_of_scope),
                format_dollars(firm.total_sub_amount)
            );
        }
    }

    let total = analysis.concentration.len();
    println!("\n=== MARKET CONCENTRATION AFTER CONSOLIDATION ===");
    for level in ConcentrationLevel::all() {
        let count = analysis.count_at_level(level);
        println!(
            "  • {}: {}/{} scopes ({})",
            level,
            count,
            total,
            format_percent(percent_of(count, total))
        );
    }
}

pub fn print_lbe_consolidation(
    original: &[LbeScopeRow],
    consolidated: &[LbeScopeRow],
    discrepancies: &[TotalsDiscrepancy],
) {
    println!("Number of consolidated scopes: {}", consolidated.len());

    let electrical = |row: &&LbeScopeRow| row.scope.to_lowercase().contains("electrical");
    println!("\nElectrical Work Analysis:");
    println!("Original scopes:");
    for row in original.iter().filter(electrical) {
        println!("  {}: {}", row.scope, format_dollars(row.total_dollars));
    }
    println!("Consolidated:");
    for row in consolidated.iter().filter(electrical) {
        println!("  {}: {}", row.scope, format_dollars(row.total_dollars));
    }

    println!("\nTop 10 consolidated scopes by total spend:");
    for row in consolidated.iter().take(10) {
        println!(
            "  {}: {} ({} LBE)",
            row.scope,
            format_dollars(row.total_dollars),
            format_percent(Some(row.lbe_dollar_share.unwrap_or(0.0)))
        );
    }

    if !discrepancies.is_empty() {
        println!("\n⚠️  Scope totals that disagree with the consolidated concentration table:");
        for d in discrepancies {
            println!(
                "  {}: LBE table {} vs concentration {} ({} apart)",
                d.scope,
                format_dollars(d.lbe_table_dollars),
                format_dollars(d.concentration_dollars),
                format_percent(Some(d.relative_difference))
            );
        }
    }
}
