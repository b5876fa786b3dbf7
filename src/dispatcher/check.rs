use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::config::EngineConfig;
use crate::importers::import_trades;
use crate::models::{Warning, WashSaleMode};
use crate::tax::run_pipeline;

#[derive(Serialize)]
struct CheckOutput<'a> {
    year: i32,
    mode: &'a str,
    trades: usize,
    replay_ok: bool,
    fingerprint: &'a str,
    conservation_ok: bool,
    warnings: &'a [Warning],
    failed_accounts: &'a BTreeMap<String, String>,
}

/// Run the pipeline twice over the same input and report data quality:
/// replay fingerprints, quantity conservation, warnings, failed accounts.
pub fn dispatch_check(
    trades_path: &Path,
    year: i32,
    mode: WashSaleMode,
    config: &EngineConfig,
    json_output: bool,
) -> Result<()> {
    info!("Running data check for {}", year);

    let (trades, mut warnings) = import_trades(trades_path)?;
    let mut first = run_pipeline(trades.clone(), year, mode, config)?;
    let second = run_pipeline(trades, year, mode, config)?;

    let fingerprint = first.report.fingerprint()?;
    let replay_ok = fingerprint == second.report.fingerprint()?;
    let conservation_ok = first.ledger.verify_conservation().is_ok();
    warnings.append(&mut first.warnings);

    if json_output {
        let output = CheckOutput {
            year,
            mode: mode.as_str(),
            trades: first.trades.len(),
            replay_ok,
            fingerprint: &fingerprint,
            conservation_ok,
            warnings: &warnings,
            failed_accounts: &first.failed_accounts,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!(
            "\n{} Data check {} ({})\n",
            "🔍".cyan().bold(),
            year,
            mode.as_str()
        );
        println!("  Trades accepted: {}", first.trades.len());
        if replay_ok {
            println!(
                "  {} Replay fingerprints match: {}",
                "✓".green().bold(),
                fingerprint
            );
        } else {
            println!("  {} Replay fingerprints differ", "✗".red().bold());
        }
        if conservation_ok {
            println!("  {} Quantity conservation verified", "✓".green().bold());
        } else {
            println!("  {} Quantity conservation failed", "✗".red().bold());
        }
        super::print_warnings(&warnings);
        super::print_failed_accounts(&first.failed_accounts);
    }

    if !replay_ok {
        anyhow::bail!("replay produced different fingerprints for identical input");
    }
    Ok(())
}
