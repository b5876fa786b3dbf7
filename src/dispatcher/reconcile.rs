use anyhow::Result;
use std::path::Path;
use tracing::info;

use crate::cli::formatters;
use crate::config::EngineConfig;
use crate::importers::{import_broker_rows, import_signals, import_trades};
use crate::models::WashSaleMode;
use crate::tax::reconcile::reconcile;
use crate::tax::run_pipeline;

#[allow(clippy::too_many_arguments)]
pub fn dispatch_reconcile(
    trades_path: &Path,
    broker_path: &Path,
    year: i32,
    mode: WashSaleMode,
    signals_path: Option<&Path>,
    config: &EngineConfig,
    json_output: bool,
) -> Result<()> {
    info!("Reconciling {} against broker totals", year);

    let (trades, mut warnings) = import_trades(trades_path)?;
    let (broker_rows, mut broker_warnings) = import_broker_rows(broker_path)?;
    let (signals, mut signal_warnings) = match signals_path {
        Some(path) => import_signals(path)?,
        None => (Vec::new(), Vec::new()),
    };

    let mut run = run_pipeline(trades, year, mode, config)?;
    let (result, mut diff_warnings) = reconcile(
        &run.ledger,
        &run.report,
        &broker_rows,
        &run.trades,
        &run.broker_pass,
        &run.irs_pass,
        &signals,
        config,
        &run.skip_accounts,
    );

    warnings.append(&mut broker_warnings);
    warnings.append(&mut signal_warnings);
    warnings.append(&mut run.warnings);
    warnings.append(&mut diff_warnings);

    if json_output {
        println!("{}", formatters::format_reconciliation_json(&result));
    } else {
        println!("{}", formatters::format_reconciliation_table(&result));
        super::print_warnings(&warnings);
        super::print_failed_accounts(&run.failed_accounts);
    }

    Ok(())
}
