mod analyzer;
mod consolidation;
mod currency;
mod error;
mod lbe;
mod loader;
mod models;
mod report;
mod table;

use analyzer::{MarketAnalyzer, ScopedRecord};
use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use consolidation::{default_rules, ScopeClassifier};
use lbe::LbeAnalyzer;
use loader::TableLoader;
use models::{Config, SubcontractorRecord};
use report::ConsolidationComparison;
use std::path::Path;
use table::Table;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_env("BID_ANALYZER_LOG")
        .unwrap_or_else(|_| EnvFilter::new("bid_market_analyzer=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn cli() -> Command {
    Command::new("bid-market-analyzer")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Market concentration and LBE participation analysis for construction bid awards")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml")
                .global(true),
        )
        .subcommand(
            Command::new("analyze")
                .about("Extract subcontract lines and compute base HHI and LBE tables"),
        )
        .subcommand(
            Command::new("consolidate")
                .about("Consolidate fragmented scopes and recompute concentration"),
        )
        .subcommand(
            Command::new("consolidate-lbe")
                .about("Re-key the LBE scope table onto consolidated scopes"),
        )
        .subcommand(
            Command::new("all").about("Run analyze, consolidate and consolidate-lbe in order"),
        )
}

fn load_config(matches: &ArgMatches) -> Result<Config> {
    let config_file = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config.toml");

    if Path::new(config_file).exists() {
        println!("📋 Loading configuration from: {}", config_file);
        Config::load_from_file(config_file)
            .with_context(|| format!("Failed to load configuration from {}", config_file))
    } else {
        println!("📝 Creating default configuration file: {}", config_file);
        let config = Config::default();
        config
            .save_to_file(config_file)
            .with_context(|| format!("Failed to write default configuration to {}", config_file))?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    init_tracing();
    let matches = cli().get_matches();
    let config = load_config(&matches)?;

    match matches.subcommand_name() {
        Some("analyze") => run_analyze(&config)?,
        Some("consolidate") => run_consolidate(&config)?,
        Some("consolidate-lbe") => run_consolidate_lbe(&config)?,
        _ => {
            run_analyze(&config)?;
            run_consolidate(&config)?;
            run_consolidate_lbe(&config)?;
        }
    }

    println!("\n✅ Analysis complete!");
    Ok(())
}

/// Raw bids → subcontract lines, base concentration tables and LBE analysis.
fn run_analyze(config: &Config) -> Result<()> {
    let loader = TableLoader::new(&config.columns);
    let bid_path = Path::new(&config.bid_data_path);
    println!("🔍 Reading bid data from: {}", bid_path.display());
    let bids = loader
        .load_bids(bid_path)
        .with_context(|| format!("Failed to load bid data from {}", bid_path.display()))?;

    let subs: Vec<SubcontractorRecord> = bids
        .iter()
        .filter(|bid| bid.matches_role(config.role_filter))
        .filter_map(|bid| bid.to_subcontractor_record())
        .collect();
    println!(
        "   ✅ {} of {} rows are {:?} lines with a positive amount",
        subs.len(),
        bids.len(),
        config.role_filter
    );

    let scoped: Vec<ScopedRecord> = subs
        .iter()
        .map(|record| ScopedRecord::new(record, record.scope_of_work.clone()))
        .collect();
    let analysis = MarketAnalyzer::new(&config.thresholds).analyze(&scoped);
    let mut written = report::write_base_outputs(config.analysis_dir(), &subs, &analysis)
        .context("Failed to write base analysis tables")?;

    let lbe_report =
        LbeAnalyzer::new(&config.thresholds).analyze(&bids, &subs, &analysis.scope_totals);
    println!();
    report::print_lbe_report(&lbe_report);
    written.extend(
        report::write_lbe_outputs(config.lbe_dir(), &lbe_report)
            .context("Failed to write LBE tables")?,
    );

    println!();
    report::print_written(&written);
    Ok(())
}

/// Subcontract lines → consolidated scopes, concentration and comparison.
fn run_consolidate(config: &Config) -> Result<()> {
    println!("\n=== ENHANCED BID ANALYSIS WITH SCOPE CONSOLIDATION ===\n");
    let loader = TableLoader::new(&config.columns);
    let records_path = config.analysis_dir().join(report::SUBCONTRACTOR_RECORDS_FILE);
    let records = loader
        .load_subcontractor_records(&records_path)
        .with_context(|| {
            format!("Failed to load subcontractor records from {}", records_path.display())
        })?;
    println!("Loaded {} subcontractor records", records.len());

    let classifier = ScopeClassifier::new(config.rules.clone().unwrap_or_else(default_rules));
    tracing::debug!(
        rules = classifier.rules().len(),
        custom = config.rules.is_some(),
        "scope classifier ready"
    );
    println!("Consolidating artificially fragmented scopes...");
    let consolidation = classifier.consolidate(records.iter().map(|r| r.scope_of_work.as_deref()));
    report::print_consolidation_summary(&consolidation.mapping);

    println!("\nRe-computing aggregations with consolidated scopes...");
    let scoped: Vec<ScopedRecord> = records
        .iter()
        .zip(&consolidation.canonical)
        .map(|(record, scope)| ScopedRecord::new(record, Some(scope.clone())))
        .collect();
    let analysis = MarketAnalyzer::new(&config.thresholds).analyze(&scoped);

    let written = report::write_consolidated_outputs(
        config.consolidated_dir(),
        &analysis,
        &consolidation.mapping,
    )
    .context("Failed to write consolidated tables")?;

    let original_path = config.analysis_dir().join(report::CONCENTRATION_FILE);
    let original = loader
        .load_concentration(&original_path)
        .with_context(|| {
            format!("Failed to load original concentration table {}", original_path.display())
        })?;
    let dominant_path = config.analysis_dir().join(report::DOMINANT_FILE);
    let original_dominant = loader
        .load_dominant_firms(&dominant_path)
        .with_context(|| {
            format!("Failed to load original dominant firms {}", dominant_path.display())
        })?;

    let comparison = ConsolidationComparison::new(&original, &original_dominant, &analysis);
    report::print_comparison(&comparison);
    report::print_consolidated_market(&analysis);

    println!();
    report::print_written(&written);
    Ok(())
}

/// Base LBE scope table + mapping → consolidated LBE table, cross-checked
/// against the consolidated concentration totals when available.
fn run_consolidate_lbe(config: &Config) -> Result<()> {
    println!("\n=== CONSOLIDATING LBE DATA ===\n");
    let loader = TableLoader::new(&config.columns);

    let lbe_path = config.lbe_dir().join(report::LBE_SCOPE_FILE);
    println!("Loading LBE scope analysis data...");
    let table = Table::from_path(&lbe_path)
        .with_context(|| format!("Failed to load LBE scope table {}", lbe_path.display()))?;
    if table.is_empty() {
        tracing::warn!(path = %table.path().display(), "LBE scope table has no rows");
    }
    let rows = lbe::read_lbe_scope_table(&table)?;

    let mapping_path = config.consolidated_dir().join(report::MAPPING_FILE);
    println!("Loading consolidation mapping...");
    let mapping = loader
        .load_mapping(&mapping_path)
        .with_context(|| format!("Failed to load scope mapping {}", mapping_path.display()))?;
    if mapping.is_empty() {
        tracing::warn!(
            path = %mapping_path.display(),
            "scope mapping is empty; scopes pass through unchanged"
        );
    }

    println!("Consolidating LBE data...");
    let consolidated = lbe::consolidate_lbe_table(&rows, &mapping);
    let output = report::write_consolidated_lbe(config.consolidated_dir(), &consolidated)
        .context("Failed to write consolidated LBE table")?;
    println!("Consolidated LBE data saved to: {}", output.display());

    let concentration_path = config
        .consolidated_dir()
        .join(report::CONSOLIDATED_CONCENTRATION_FILE);
    let discrepancies = if concentration_path.exists() {
        let concentration = loader.load_concentration(&concentration_path)?;
        let tolerance = config.thresholds.cross_check_tolerance;
        lbe::cross_check_totals(&consolidated, &concentration, tolerance)
    } else {
        tracing::info!(
            path = %concentration_path.display(),
            "no consolidated concentration table; skipping cross-check"
        );
        Vec::new()
    };

    report::print_lbe_consolidation(&rows, &consolidated, &discrepancies);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RoleFilter;
    use std::fs;
    use tempfile::tempdir;

    const BIDS: &str = "\
Contract ID,Contractor Name,Sub/Prime,LBE? ,SUB $$ ,Scope of Work,LBE Requirement,Contract Award Amount (Awarded)
C-1,Prime Co,Prime,N,,General,0.2,\"$2,000,000\"
C-1,FirmA,Sub,N,\"$100,000\",AC Paving,0.2,\"$2,000,000\"
C-2,FirmB,Sub,Y,\"$50,000\",AC paving & Concrete flatwork,,\"$500,000\"
C-2,Sparky,Sub,Y,\"$40,000\",Electrical,,\"$500,000\"
C-3,Volt Inc,Sub,N,\"$60,000\",Electrical Work,,
C-3,Refund Co,Sub,N,($5),Striping,,
";

    fn config_in(dir: &Path) -> Config {
        config_with_bids(dir, BIDS)
    }

    fn config_with_bids(dir: &Path, contents: &str) -> Config {
        let bids = dir.join("bids.csv");
        fs::write(&bids, contents).expect("write bids");
        Config {
            bid_data_path: bids.display().to_string(),
            analysis_directory: dir.join("analysis_results").display().to_string(),
            lbe_directory: dir.join("lbe_analysis").display().to_string(),
            consolidated_directory: dir.join("consolidated_analysis").display().to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn full_pipeline_consolidates_paving_and_electrical() {
        let dir = tempdir().expect("tempdir");
        let config = config_in(dir.path());

        run_analyze(&config).expect("analyze");
        run_consolidate(&config).expect("consolidate");
        run_consolidate_lbe(&config).expect("consolidate lbe");

        let loader = TableLoader::new(&config.columns);
        let base = loader
            .load_concentration(&config.analysis_dir().join(report::CONCENTRATION_FILE))
            .expect("base hhi");
        // Refund line is negative and dropped; the prime line is not a sub
        assert_eq!(base.len(), 4);

        let consolidated = loader
            .load_concentration(
                &config
                    .consolidated_dir()
                    .join(report::CONSOLIDATED_CONCENTRATION_FILE),
            )
            .expect("consolidated hhi");
        let scopes: Vec<&str> = consolidated.iter().map(|row| row.scope.as_str()).collect();
        assert_eq!(
            scopes,
            vec!["AC Paving & Asphalt Work (Consolidated)", "Electrical Work (Consolidated)"]
        );
        assert_eq!(consolidated[0].scope_total_sub, 150_000.0);
        let hhi = consolidated[0].hhi.expect("hhi");
        assert!((hhi - 5555.56).abs() < 0.01);

        let table = Table::from_path(config.consolidated_dir().join(report::CONSOLIDATED_LBE_FILE))
            .expect("consolidated lbe table");
        let lbe_rows = lbe::read_lbe_scope_table(&table).expect("rows");
        assert_eq!(lbe_rows[0].scope, "AC Paving & Asphalt Work (Consolidated)");
        assert_eq!(lbe_rows[0].total_subs, 2);
        let electrical = &lbe_rows[1];
        assert_eq!(electrical.total_dollars, 100_000.0);
        assert_eq!(electrical.lbe_dollar_share, Some(0.4));

        // Both computations agree, so nothing is flagged
        let tolerance = config.thresholds.cross_check_tolerance;
        let discrepancies = lbe::cross_check_totals(&lbe_rows, &consolidated, tolerance);
        assert!(discrepancies.is_empty());
    }

    #[test]
    fn role_filter_decides_which_lines_are_extracted() {
        const MIXED: &str = "\
Contract ID,Contractor Name,Sub/Prime,LBE?,SUB $$,Scope of Work
C-1,Prime Co,Prime,N,\"$900,000\",General Construction
C-1,FirmA,Sub,Y,\"$100,000\",AC Paving
C-2,Supply Co,Supplier,N,\"$5,000\",Materials
";
        let extracted = |role_filter: RoleFilter| {
            let dir = tempdir().expect("tempdir");
            let config = Config {
                role_filter,
                ..config_with_bids(dir.path(), MIXED)
            };
            run_analyze(&config).expect("analyze");
            let records_path = config.analysis_dir().join(report::SUBCONTRACTOR_RECORDS_FILE);
            let records = TableLoader::new(&config.columns)
                .load_subcontractor_records(&records_path)
                .expect("records");
            records
                .into_iter()
                .filter_map(|record| record.subcontractor_name)
                .collect::<Vec<_>>()
        };

        assert_eq!(extracted(RoleFilter::Sub), vec!["FirmA"]);
        assert_eq!(extracted(RoleFilter::Prime), vec!["Prime Co"]);
        assert_eq!(extracted(RoleFilter::All), vec!["Prime Co", "FirmA", "Supply Co"]);
    }

    #[test]
    fn consolidate_fails_without_base_records() {
        let dir = tempdir().expect("tempdir");
        let config = config_in(dir.path());
        let err = run_consolidate(&config).expect_err("records file absent");
        assert!(err.to_string().contains("Failed to load subcontractor records"));
    }

    #[test]
    fn rerunning_produces_identical_outputs() {
        let dir = tempdir().expect("tempdir");
        let config = config_in(dir.path());
        let read = |config: &Config| {
            [
                config.consolidated_dir().join(report::CONSOLIDATED_AGGREGATION_FILE),
                config.consolidated_dir().join(report::MAPPING_FILE),
                config.lbe_dir().join(report::LBE_SCOPE_FILE),
            ]
            .iter()
            .map(|path| fs::read_to_string(path).expect("output exists"))
            .collect::<Vec<_>>()
        };

        run_analyze(&config).expect("analyze");
        run_consolidate(&config).expect("consolidate");
        let first = read(&config);
        run_analyze(&config).expect("analyze again");
        run_consolidate(&config).expect("consolidate again");
        assert_eq!(read(&config), first);
    }

    #[test]
    fn cli_accepts_known_subcommands() {
        let matches = cli()
            .try_get_matches_from(["bid-market-analyzer", "-c", "custom.toml", "consolidate-lbe"])
            .expect("parse");
        assert_eq!(matches.subcommand_name(), Some("consolidate-lbe"));
        assert_eq!(matches.get_one::<String>("config").map(String::as_str), Some("custom.toml"));
        assert!(cli().try_get_matches_from(["bid-market-analyzer", "bogus"]).is_err());
    }
}
