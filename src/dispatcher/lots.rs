use anyhow::Result;
use chrono::{Datelike, Local, NaiveDate};
use std::path::Path;
use tracing::info;

use crate::cli::formatters;
use crate::config::EngineConfig;
use crate::importers::import_trades;
use crate::models::WashSaleMode;
use crate::tax::report::open_lots_as_of;
use crate::tax::run_pipeline;

pub fn dispatch_lots(
    trades_path: &Path,
    as_of: Option<NaiveDate>,
    account: Option<&str>,
    mode: WashSaleMode,
    config: &EngineConfig,
    json_output: bool,
) -> Result<()> {
    let as_of = as_of.unwrap_or_else(|| Local::now().date_naive());
    info!("Building open-lot snapshot as of {}", as_of);

    let (trades, mut warnings) = import_trades(trades_path)?;
    // The wash-sale scan must run before basis adjustments are visible
    let mut run = run_pipeline(trades, as_of.year(), mode, config)?;
    warnings.append(&mut run.warnings);

    let rows = open_lots_as_of(&run.ledger, as_of, mode, config, account, &run.skip_accounts);

    if json_output {
        println!("{}", formatters::format_open_lots_json(&rows));
    } else {
        if rows.is_empty() {
            println!("{}", formatters::format_empty_lots(as_of));
        } else {
            println!("{}", formatters::format_open_lots_table(&rows, as_of));
        }
        super::print_warnings(&warnings);
        super::print_failed_accounts(&run.failed_accounts);
    }

    Ok(())
}
