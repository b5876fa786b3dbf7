use anyhow::Result;
use colored::Colorize;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::cli::formatters;
use crate::config::EngineConfig;
use crate::importers::import_trades;
use crate::models::WashSaleMode;
use crate::tax::report::export_to_csv;
use crate::tax::run_pipeline;

pub fn dispatch_report(
    trades_path: &Path,
    year: i32,
    mode: WashSaleMode,
    config: &EngineConfig,
    export: Option<&Path>,
    json_output: bool,
) -> Result<()> {
    info!("Generating tax-year report for {}", year);

    let (trades, mut warnings) = import_trades(trades_path)?;
    let mut run = run_pipeline(trades, year, mode, config)?;
    warnings.append(&mut run.warnings);

    if json_output {
        println!("{}", formatters::format_report_json(&run.report));
    } else {
        println!("{}", formatters::format_report_table(&run.report));
        super::print_warnings(&warnings);
        super::print_failed_accounts(&run.failed_accounts);
        println!(
            "\n{} Fingerprint: {}",
            "ℹ".blue().bold(),
            run.report.fingerprint()?
        );
    }

    if let Some(path) = export {
        fs::write(path, export_to_csv(&run.report))?;
        if !json_output {
            println!(
                "{} Exported detail rows to {}",
                "✓".green().bold(),
                path.display()
            );
        }
    }

    Ok(())
}
